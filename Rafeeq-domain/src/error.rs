//! Error types shared by the engine components

use std::time::Duration;
use thiserror::Error;

use crate::entities::{CauseCategory, Metric};

/// Errors raised by the escalation engine
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    /// A sensor value outside its physical domain; the reading is rejected
    #[error("invalid {metric} reading {value}: {reason}")]
    InvalidReading {
        metric: Metric,
        value: f64,
        reason: String,
    },

    /// The state machine was driven into a combination it cannot represent.
    /// This is a logic defect and stops the monitoring loop.
    #[error("classification defect: {0}")]
    Classification(String),

    /// The call provider kept failing until the retry budget ran out
    #[error("{category} call failed after {attempts} attempt(s): {reason}")]
    DispatchFailed {
        category: CauseCategory,
        attempts: u32,
        reason: String,
    },

    /// An append to the escalation log failed after retries
    #[error("persistence failed: {0}")]
    PersistenceFailed(String),

    /// Invalid configuration value
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The monitoring loop no longer accepts input
    #[error("monitoring loop is closed")]
    MonitorClosed,

    /// Input for a patient the monitor was not configured with
    #[error("patient {0} is not monitored")]
    UnknownPatient(String),
}

impl From<rafeeq_data::repository::RepositoryError> for EngineError {
    fn from(error: rafeeq_data::repository::RepositoryError) -> Self {
        EngineError::PersistenceFailed(error.to_string())
    }
}

/// Failure reported by a voice-call provider
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CallError {
    #[error("call timed out after {0:?}")]
    Timeout(Duration),

    #[error("call rejected by provider: {0}")]
    Rejected(String),

    #[error("call transport error: {0}")]
    Transport(String),
}

/// Failure reported by a sensor source
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    #[error("sensor source disconnected: {0}")]
    Disconnected(String),
}
