// Domain services
// The escalation pipeline, from threshold evaluation to call dispatch.

pub mod classifier;
pub mod dispatcher;
pub mod escalation;
pub mod messages;
pub mod monitor;
pub mod normalizer;
pub mod persistence;
pub mod sources;
pub mod status;
pub mod thresholds;

// Re-export the pieces callers wire together
pub use classifier::{assess, classify, Assessment};
pub use dispatcher::{CallDispatcher, CallProviderTrait, RetryPolicy};
pub use escalation::{EscalationPolicy, EscalationStateMachine};
pub use messages::MessageTemplates;
pub use monitor::{MonitorHandle, MonitorInput, MonitoringLoop};
pub use normalizer::{normalize, NormalizedEvent};
pub use persistence::{LogRecord, PersistencePolicy, PersistenceWriter};
pub use sources::{SimulatedVitalSource, VitalSource};
pub use status::{AlertKind, OperatorAlert, PatientStatus, StatusBoard};
pub use thresholds::{evaluate, VitalThresholds};
