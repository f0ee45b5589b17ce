//! Domain layer health check functionality
//! Reports on the escalation log storage and on the monitoring loop itself.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use rafeeq_data::database::{self, DatabasePool};
use std::collections::HashMap;

use crate::services::status::StatusBoard;

/// System health status
#[derive(Debug, Clone, PartialEq)]
pub enum SystemStatus {
    /// All components are healthy
    Healthy,
    /// Some components are degraded but the system is functional
    Degraded,
    /// System is not functioning properly
    Unhealthy,
}

/// Component health status
#[derive(Debug, Clone, PartialEq)]
pub enum ComponentStatus {
    /// Component is functioning normally
    Healthy,
    /// Component is functioning but with reduced guarantees
    Degraded,
    /// Component is not functioning
    Unhealthy,
}

/// Represents a health component with status and optional details
#[derive(Debug, Clone)]
pub struct HealthComponent {
    /// Status of the component
    pub status: ComponentStatus,
    /// Optional details about the component status
    pub details: Option<String>,
}

/// Represents the overall health of the system
#[derive(Debug, Clone)]
pub struct SystemHealth {
    /// Overall system status
    pub status: SystemStatus,
    /// Map of component names to their health status
    pub components: HashMap<String, HealthComponent>,
}

/// Trait for health services
#[async_trait]
pub trait HealthServiceTrait: Send + Sync + std::fmt::Debug {
    /// Get the overall system health
    async fn get_system_health(&self) -> SystemHealth;

    /// Check the status of the database
    /// Returns true if the database is durable, false if it is degraded
    /// Returns an error if the database cannot be reached
    async fn check_database_status(&self) -> Result<bool, String>;
}

/// Health of the storage backend and the monitoring loop
#[derive(Debug, Clone)]
pub struct EngineHealthService {
    pool: Option<DatabasePool>,
    board: StatusBoard,
    /// A dispatch failure newer than this keeps the monitor degraded
    failure_window: Duration,
}

impl EngineHealthService {
    pub fn new(pool: Option<DatabasePool>, board: StatusBoard, failure_window: Duration) -> Self {
        Self {
            pool,
            board,
            failure_window,
        }
    }

    fn database_component(&self, status: Result<bool, String>) -> HealthComponent {
        match status {
            Ok(true) => HealthComponent {
                status: ComponentStatus::Healthy,
                details: self
                    .pool
                    .as_ref()
                    .and_then(|pool| database::get_connection_info(pool).ok()),
            },
            Ok(false) => HealthComponent {
                status: ComponentStatus::Degraded,
                details: Some("Escalation log is not durable; records are kept in memory".to_string()),
            },
            Err(e) => HealthComponent {
                status: ComponentStatus::Unhealthy,
                details: Some(e),
            },
        }
    }

    fn monitor_component(&self) -> HealthComponent {
        if !self.board.is_running() {
            return HealthComponent {
                status: ComponentStatus::Unhealthy,
                details: Some("Monitoring loop is not running".to_string()),
            };
        }

        match self.board.last_dispatch_failure() {
            Some(at) if Utc::now() - at < self.failure_window => HealthComponent {
                status: ComponentStatus::Degraded,
                details: Some(format!("Emergency call failed at {}", at.to_rfc3339())),
            },
            _ => HealthComponent {
                status: ComponentStatus::Healthy,
                details: None,
            },
        }
    }
}

#[async_trait]
impl HealthServiceTrait for EngineHealthService {
    async fn get_system_health(&self) -> SystemHealth {
        let database = self.database_component(self.check_database_status().await);
        let monitor = self.monitor_component();

        let overall_status = overall_status(&[&database, &monitor]);

        SystemHealth {
            status: overall_status,
            components: vec![("database".to_string(), database), ("monitor".to_string(), monitor)]
                .into_iter()
                .collect(),
        }
    }

    async fn check_database_status(&self) -> Result<bool, String> {
        let Some(pool) = &self.pool else {
            return Ok(false);
        };

        match pool.get() {
            Ok(_) => Ok(!pool.is_in_memory()),
            Err(e) => Err(format!("Database connection error: {}", e)),
        }
    }
}

fn overall_status(components: &[&HealthComponent]) -> SystemStatus {
    if components.iter().any(|c| c.status == ComponentStatus::Unhealthy) {
        SystemStatus::Unhealthy
    } else if components.iter().any(|c| c.status == ComponentStatus::Degraded) {
        SystemStatus::Degraded
    } else {
        SystemStatus::Healthy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::status::{AlertKind, OperatorAlert};
    use rafeeq_data::database::{initialize_database_pool, DatabaseConfig};

    #[tokio::test]
    async fn test_in_memory_database_is_degraded() {
        let pool = initialize_database_pool(&DatabaseConfig::in_memory()).unwrap();
        let service = EngineHealthService::new(Some(pool), StatusBoard::new(), Duration::seconds(300));

        assert_eq!(service.check_database_status().await, Ok(false));
        let health = service.get_system_health().await;
        assert_eq!(health.status, SystemStatus::Degraded);
        assert_eq!(health.components["database"].status, ComponentStatus::Degraded);
        assert_eq!(health.components["monitor"].status, ComponentStatus::Healthy);
    }

    #[tokio::test]
    async fn test_stopped_monitor_is_unhealthy() {
        let board = StatusBoard::new();
        board.set_running(false);
        let service = EngineHealthService::new(None, board, Duration::seconds(300));

        let health = service.get_system_health().await;
        assert_eq!(health.status, SystemStatus::Unhealthy);
        assert_eq!(health.components["monitor"].status, ComponentStatus::Unhealthy);
    }

    #[tokio::test]
    async fn test_recent_dispatch_failure_degrades_monitor() {
        let board = StatusBoard::new();
        board.raise(OperatorAlert {
            kind: AlertKind::DispatchFailed,
            patient_id: None,
            message: "provider down".to_string(),
            timestamp: Utc::now(),
        });
        let service = EngineHealthService::new(None, board.clone(), Duration::seconds(300));
        assert_eq!(service.monitor_component().status, ComponentStatus::Degraded);

        let stale = EngineHealthService::new(None, board, Duration::seconds(0));
        assert_eq!(stale.monitor_component().status, ComponentStatus::Healthy);
    }

    #[test]
    fn test_overall_status_takes_the_worst() {
        let healthy = HealthComponent {
            status: ComponentStatus::Healthy,
            details: None,
        };
        let degraded = HealthComponent {
            status: ComponentStatus::Degraded,
            details: None,
        };
        assert_eq!(overall_status(&[&healthy, &healthy]), SystemStatus::Healthy);
        assert_eq!(overall_status(&[&healthy, &degraded]), SystemStatus::Degraded);
    }
}
