// Storage models for the escalation log
pub mod escalation_log;

pub use escalation_log::{DispatchRecord, EscalationRecord, VitalRecord};
