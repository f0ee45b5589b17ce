// Testing utilities and mock implementations for the domain layer
// This module is only available to unit tests and with the "mock" feature

// Re-export the log repository mock from the data layer
pub use rafeeq_data::repository::tests::MockEscalationLogRepository;

use crate::entities::VitalSnapshot;
use crate::error::{CallError, SourceError};
use crate::health::{ComponentStatus, HealthComponent, HealthServiceTrait, SystemHealth, SystemStatus};
use crate::services::dispatcher::CallProviderTrait;
use crate::services::sources::VitalSource;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Call provider that replays scripted responses, then succeeds
#[derive(Debug, Default)]
pub struct ScriptedCallProvider {
    responses: Mutex<VecDeque<Result<String, CallError>>>,
    calls: Mutex<Vec<(String, String)>>,
    delay: Option<Duration>,
    panics: bool,
}

impl ScriptedCallProvider {
    /// Provider whose every call succeeds
    pub fn new() -> Self {
        Self::default()
    }

    /// Provider that answers with `responses` in order before succeeding
    pub fn with_responses(responses: Vec<Result<String, CallError>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            ..Self::default()
        }
    }

    /// Sleep before answering each call
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Panic inside every call
    pub fn panicking(mut self) -> Self {
        self.panics = true;
        self
    }

    /// Every (contact, message) pair the provider was asked to call
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl CallProviderTrait for ScriptedCallProvider {
    async fn place_call(&self, contact: &str, message: &str) -> Result<String, CallError> {
        let n = {
            let mut calls = self.calls.lock().unwrap();
            calls.push((contact.to_string(), message.to_string()));
            calls.len()
        };

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.panics {
            panic!("scripted provider failure");
        }

        let scripted = self.responses.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| Ok(format!("CA-scripted-{}", n)))
    }
}

/// Vital source that replays scripted batches, then reports nothing
#[derive(Debug, Default)]
pub struct ScriptedVitalSource {
    batches: VecDeque<Result<Vec<VitalSnapshot>, SourceError>>,
    reconnects: Arc<AtomicUsize>,
}

impl ScriptedVitalSource {
    pub fn new(batches: Vec<Result<Vec<VitalSnapshot>, SourceError>>) -> Self {
        Self {
            batches: batches.into(),
            reconnects: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Counter of reconnect attempts, shared with the source
    pub fn reconnects(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.reconnects)
    }
}

#[async_trait]
impl VitalSource for ScriptedVitalSource {
    async fn sample(&mut self) -> Result<Vec<VitalSnapshot>, SourceError> {
        self.batches.pop_front().unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn reconnect(&mut self) -> Result<(), SourceError> {
        self.reconnects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Mock implementation of health services for testing system health
#[derive(Debug)]
pub struct MockHealthService {
    /// Database component status
    database_status: ComponentStatus,
    /// System status
    system_status: SystemStatus,
    /// Additional components
    components: HashMap<String, HealthComponent>,
}

impl Default for MockHealthService {
    fn default() -> Self {
        Self::new()
    }
}

impl MockHealthService {
    /// Create a new mock health service with all components healthy
    pub fn new() -> Self {
        Self {
            database_status: ComponentStatus::Healthy,
            system_status: SystemStatus::Healthy,
            components: HashMap::new(),
        }
    }

    /// Configure the mock with a degraded database
    pub fn with_degraded_database(mut self) -> Self {
        self.database_status = ComponentStatus::Degraded;
        self.system_status = SystemStatus::Degraded;
        self
    }

    /// Configure the mock with an unhealthy database
    pub fn with_unhealthy_database(mut self) -> Self {
        self.database_status = ComponentStatus::Unhealthy;
        self.system_status = SystemStatus::Unhealthy;
        self
    }

    /// Add a custom component with a specific status
    pub fn with_component(mut self, name: &str, status: ComponentStatus, details: Option<String>) -> Self {
        self.components.insert(name.to_string(), HealthComponent { status, details });
        self
    }
}

#[async_trait]
impl HealthServiceTrait for MockHealthService {
    async fn get_system_health(&self) -> SystemHealth {
        let mut components = HashMap::new();

        components.insert(
            "database".to_string(),
            HealthComponent {
                status: self.database_status.clone(),
                details: match self.database_status {
                    ComponentStatus::Healthy => None,
                    ComponentStatus::Degraded => Some("Escalation log kept in memory".to_string()),
                    ComponentStatus::Unhealthy => Some("Database connection failed".to_string()),
                },
            },
        );

        components.insert(
            "monitor".to_string(),
            HealthComponent {
                status: ComponentStatus::Healthy,
                details: None,
            },
        );

        for (name, component) in &self.components {
            components.insert(name.clone(), component.clone());
        }

        SystemHealth {
            status: self.system_status.clone(),
            components,
        }
    }

    async fn check_database_status(&self) -> Result<bool, String> {
        match self.database_status {
            ComponentStatus::Healthy => Ok(true),
            ComponentStatus::Degraded => Ok(false),
            ComponentStatus::Unhealthy => Err("Database connection failed".to_string()),
        }
    }
}
