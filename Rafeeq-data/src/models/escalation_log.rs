use serde::{Deserialize, Serialize};

/// Storage model for a single risk-state transition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EscalationRecord {
    /// Unique identifier of the escalation event
    pub id: String,

    /// Patient the transition belongs to
    pub patient_id: String,

    /// Risk state before the transition
    pub from_state: String,

    /// Risk state after the transition
    pub to_state: String,

    /// Serialized cause of the transition (JSON)
    pub cause: String,

    /// Cause category used for call debouncing, if any
    pub category: Option<String>,

    /// When the transition happened (RFC 3339, nanosecond precision)
    pub timestamp: String,
}

/// Storage model for an accepted vital-sign reading
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VitalRecord {
    /// Unique identifier for the reading
    pub id: String,

    /// Patient the reading belongs to
    pub patient_id: String,

    /// Heart rate in beats per minute
    pub heart_rate: f64,

    /// Blood oxygen saturation in percent
    pub spo2: f64,

    /// Body temperature in degrees Celsius
    pub temperature: f64,

    /// Optional emotional state label derived from the reading
    pub emotional_state: Option<String>,

    /// When the reading was sampled
    pub timestamp: String,
}

/// Storage model for an emergency call decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchRecord {
    /// Unique identifier for the record
    pub id: String,

    /// Patient the call was made for
    pub patient_id: String,

    /// Escalation event that triggered the dispatch
    pub event_id: String,

    /// Cause category (vitals, fall, help_request)
    pub category: String,

    /// Outcome (sent, suppressed, failed)
    pub outcome: String,

    /// Number of call attempts made
    pub attempts: u32,

    /// Provider reference of the placed call
    pub reference: Option<String>,

    /// Failure or suppression detail
    pub detail: Option<String>,

    /// Localized message submitted to the provider
    pub message: Option<String>,

    /// When the decision was recorded
    pub timestamp: String,
}
