//! Monitor configuration loaded from the environment

use std::env;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;
use validator::{Validate, ValidationError};

use crate::entities::{EmotionalState, PatientId};
use crate::error::EngineError;
use crate::services::dispatcher::RetryPolicy;
use crate::services::escalation::EscalationPolicy;
use crate::services::messages::MessageTemplates;
use crate::services::persistence::PersistencePolicy;
use crate::services::thresholds::VitalThresholds;

/// Contact used when no caregiver number is configured; calls only go to the dry-run provider
pub const PLACEHOLDER_CONTACT: &str = "+000";

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Validate)]
#[validate(schema(function = "validate_escalation_level"))]
pub struct MonitorConfig {
    #[validate]
    pub thresholds: VitalThresholds,
    #[validate(range(min = 1, max = 3600))]
    pub sample_interval_secs: u64,
    #[validate(range(min = 1, max = 1000))]
    pub hysteresis_samples: u32,
    #[validate(range(min = 1, max = 86400))]
    pub cooldown_secs: u64,
    pub escalate_at: EmotionalState,
    #[validate(range(min = 1, max = 10))]
    pub dispatch_attempts: u32,
    pub dispatch_backoff_ms: u64,
    pub dispatch_max_backoff_ms: u64,
    #[validate(range(min = 1, max = 300))]
    pub call_timeout_secs: u64,
    #[validate(range(min = 1, max = 10))]
    pub persistence_attempts: u32,
    pub persistence_backoff_ms: u64,
    #[validate(length(min = 1))]
    pub caregiver_contact: String,
    #[validate(custom = "validate_locale")]
    pub message_locale: String,
    #[validate(length(min = 1))]
    pub patients: Vec<String>,
    pub simulate: bool,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            thresholds: VitalThresholds::default(),
            sample_interval_secs: 3,
            hysteresis_samples: 3,
            cooldown_secs: 300,
            escalate_at: EmotionalState::ModerateDistress,
            dispatch_attempts: 3,
            dispatch_backoff_ms: 2000,
            dispatch_max_backoff_ms: 30000,
            call_timeout_secs: 30,
            persistence_attempts: 3,
            persistence_backoff_ms: 500,
            caregiver_contact: PLACEHOLDER_CONTACT.to_string(),
            message_locale: "ar".to_string(),
            patients: vec!["patient-1".to_string()],
            simulate: true,
        }
    }
}

fn validate_locale(locale: &str) -> Result<(), ValidationError> {
    match MessageTemplates::for_locale(locale) {
        Some(_) => Ok(()),
        None => Err(ValidationError::new("unsupported_locale")),
    }
}

fn validate_escalation_level(config: &MonitorConfig) -> Result<(), ValidationError> {
    if config.escalate_at == EmotionalState::Stable {
        return Err(ValidationError::new("escalate_at_must_be_above_stable"));
    }
    if config.dispatch_backoff_ms > config.dispatch_max_backoff_ms {
        return Err(ValidationError::new("dispatch_backoff_above_max"));
    }
    Ok(())
}

fn env_or<T>(key: &str, default: T) -> Result<T, EngineError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| EngineError::Configuration(format!("{} has invalid value {:?}: {}", key, raw, e))),
        Err(_) => Ok(default),
    }
}

impl MonitorConfig {
    /// Load configuration from environment variables, falling back to defaults
    pub fn from_env() -> Result<Self, EngineError> {
        let defaults = Self::default();
        let thresholds = VitalThresholds {
            heart_rate_warning: env_or("RAFEEQ_HR_WARNING_BPM", defaults.thresholds.heart_rate_warning)?,
            heart_rate_critical: env_or("RAFEEQ_HR_CRITICAL_BPM", defaults.thresholds.heart_rate_critical)?,
            spo2_warning: env_or("RAFEEQ_SPO2_WARNING_PCT", defaults.thresholds.spo2_warning)?,
            spo2_critical: env_or("RAFEEQ_SPO2_CRITICAL_PCT", defaults.thresholds.spo2_critical)?,
            temperature_warning: env_or("RAFEEQ_TEMP_WARNING_C", defaults.thresholds.temperature_warning)?,
            temperature_critical: env_or("RAFEEQ_TEMP_CRITICAL_C", defaults.thresholds.temperature_critical)?,
        };

        let patients = env::var("RAFEEQ_PATIENTS")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|id| !id.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or(defaults.patients);

        let config = Self {
            thresholds,
            sample_interval_secs: env_or("RAFEEQ_SAMPLE_INTERVAL_SECS", defaults.sample_interval_secs)?,
            hysteresis_samples: env_or("RAFEEQ_HYSTERESIS_SAMPLES", defaults.hysteresis_samples)?,
            cooldown_secs: env_or("RAFEEQ_COOLDOWN_SECS", defaults.cooldown_secs)?,
            escalate_at: env_or("RAFEEQ_ESCALATE_AT", defaults.escalate_at)?,
            dispatch_attempts: env_or("RAFEEQ_DISPATCH_ATTEMPTS", defaults.dispatch_attempts)?,
            dispatch_backoff_ms: env_or("RAFEEQ_DISPATCH_BACKOFF_MS", defaults.dispatch_backoff_ms)?,
            dispatch_max_backoff_ms: env_or("RAFEEQ_DISPATCH_MAX_BACKOFF_MS", defaults.dispatch_max_backoff_ms)?,
            call_timeout_secs: env_or("RAFEEQ_CALL_TIMEOUT_SECS", defaults.call_timeout_secs)?,
            persistence_attempts: env_or("RAFEEQ_PERSISTENCE_ATTEMPTS", defaults.persistence_attempts)?,
            persistence_backoff_ms: env_or("RAFEEQ_PERSISTENCE_BACKOFF_MS", defaults.persistence_backoff_ms)?,
            caregiver_contact: env::var("CAREGIVER_PHONE").unwrap_or(defaults.caregiver_contact),
            message_locale: env::var("RAFEEQ_MESSAGE_LOCALE").unwrap_or(defaults.message_locale),
            patients,
            simulate: env_or("RAFEEQ_SIMULATE", defaults.simulate)?,
        };

        config.validate_config()?;

        info!(
            sample_interval_secs = config.sample_interval_secs,
            cooldown_secs = config.cooldown_secs,
            hysteresis_samples = config.hysteresis_samples,
            escalate_at = %config.escalate_at,
            locale = %config.message_locale,
            patients = config.patients.len(),
            "Monitor configuration loaded"
        );

        Ok(config)
    }

    pub fn validate_config(&self) -> Result<(), EngineError> {
        self.validate()
            .map_err(|e| EngineError::Configuration(e.to_string()))
    }

    /// Whether calls target a real caregiver number
    pub fn has_caregiver_contact(&self) -> bool {
        self.caregiver_contact != PLACEHOLDER_CONTACT
    }

    pub fn sample_interval(&self) -> Duration {
        Duration::from_secs(self.sample_interval_secs)
    }

    pub fn cooldown(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.cooldown_secs as i64)
    }

    pub fn escalation_policy(&self) -> EscalationPolicy {
        EscalationPolicy {
            hysteresis_samples: self.hysteresis_samples,
            cooldown: self.cooldown(),
            escalate_at: self.escalate_at,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.dispatch_attempts,
            initial_backoff: Duration::from_millis(self.dispatch_backoff_ms),
            max_backoff: Duration::from_millis(self.dispatch_max_backoff_ms),
            call_timeout: Duration::from_secs(self.call_timeout_secs),
        }
    }

    pub fn persistence_policy(&self) -> PersistencePolicy {
        PersistencePolicy {
            max_attempts: self.persistence_attempts,
            backoff: Duration::from_millis(self.persistence_backoff_ms),
        }
    }

    pub fn templates(&self) -> Result<MessageTemplates, EngineError> {
        MessageTemplates::for_locale(&self.message_locale)
            .ok_or_else(|| EngineError::Configuration(format!("unsupported message locale {}", self.message_locale)))
    }

    pub fn patient_ids(&self) -> Vec<PatientId> {
        self.patients.iter().map(|id| PatientId::new(id.as_str())).collect()
    }
}
