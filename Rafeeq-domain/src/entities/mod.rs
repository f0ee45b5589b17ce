// Domain entities and value objects
pub mod vitals;
pub mod risk;
pub mod escalation;
pub mod conversions;

// Re-export common types for easier imports
pub use vitals::{Metric, MetricSeverities, MetricSeverity, PatientId, VitalSnapshot};
pub use risk::{EmotionalState, PatientRiskState};
pub use escalation::{
    CallRequest, CauseCategory, DiscreteEvent, DiscreteEventKind, DispatchOutcome, DispatchReport, EscalationCause,
    EscalationEvent,
};
