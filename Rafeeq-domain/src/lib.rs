// Rafeeq Domain
// This crate contains the escalation engine: threshold evaluation,
// distress classification, the per-patient escalation state machine,
// call dispatch and the monitoring loop that ties them together.

// Engine error taxonomy
pub mod error;

// Monitor configuration
pub mod config;

// Domain entities
pub mod entities;

// Services that implement the engine
pub mod services;

// Health checks and system status
pub mod health;

// Re-export the database module from rafeeq-data for convenience
pub use rafeeq_data::database;

pub use config::MonitorConfig;
pub use error::{CallError, EngineError, SourceError};

// Testing utilities - available to unit tests and with the mock feature
#[cfg(any(test, feature = "mock"))]
pub mod testing;
