use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::risk::{EmotionalState, PatientRiskState};
use super::vitals::{Metric, PatientId};

/// Kind of a discrete signal raised outside the vitals stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscreteEventKind {
    FallDetected,
    HelpRequested,
}

impl DiscreteEventKind {
    pub fn category(&self) -> CauseCategory {
        match self {
            DiscreteEventKind::FallDetected => CauseCategory::Fall,
            DiscreteEventKind::HelpRequested => CauseCategory::HelpRequest,
        }
    }
}

/// A fall or help request reported for a patient
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscreteEvent {
    pub patient_id: PatientId,
    pub kind: DiscreteEventKind,
    pub timestamp: DateTime<Utc>,
}

impl DiscreteEvent {
    pub fn new(patient_id: impl Into<PatientId>, kind: DiscreteEventKind, timestamp: DateTime<Utc>) -> Self {
        Self {
            patient_id: patient_id.into(),
            kind,
            timestamp,
        }
    }
}

/// Cause category used to debounce calls independently
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CauseCategory {
    Vitals,
    Fall,
    HelpRequest,
}

impl CauseCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            CauseCategory::Vitals => "vitals",
            CauseCategory::Fall => "fall",
            CauseCategory::HelpRequest => "help_request",
        }
    }
}

impl fmt::Display for CauseCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CauseCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "vitals" => Ok(CauseCategory::Vitals),
            "fall" => Ok(CauseCategory::Fall),
            "help_request" => Ok(CauseCategory::HelpRequest),
            other => Err(format!("unknown cause category: {}", other)),
        }
    }
}

/// Why a transition happened
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EscalationCause {
    /// Classified vitals; `metrics` are the readings that drove the classification
    VitalSigns {
        state: EmotionalState,
        metrics: Vec<Metric>,
    },
    FallDetected,
    HelpRequested,
    /// A dispatch attempt finished and the patient entered cooldown
    DispatchCompleted { outcome: DispatchOutcome },
}

impl EscalationCause {
    /// Debounce category, `None` for transitions that never place a call
    pub fn category(&self) -> Option<CauseCategory> {
        match self {
            EscalationCause::VitalSigns { .. } => Some(CauseCategory::Vitals),
            EscalationCause::FallDetected => Some(CauseCategory::Fall),
            EscalationCause::HelpRequested => Some(CauseCategory::HelpRequest),
            EscalationCause::DispatchCompleted { .. } => None,
        }
    }
}

/// Immutable record of one state transition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EscalationEvent {
    id: Uuid,
    patient_id: PatientId,
    from: PatientRiskState,
    to: PatientRiskState,
    cause: EscalationCause,
    timestamp: DateTime<Utc>,
}

impl EscalationEvent {
    pub(crate) fn new(
        patient_id: PatientId,
        from: PatientRiskState,
        to: PatientRiskState,
        cause: EscalationCause,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self::from_parts(Uuid::new_v4(), patient_id, from, to, cause, timestamp)
    }

    pub(crate) fn from_parts(
        id: Uuid,
        patient_id: PatientId,
        from: PatientRiskState,
        to: PatientRiskState,
        cause: EscalationCause,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            patient_id,
            from,
            to,
            cause,
            timestamp,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn patient_id(&self) -> &PatientId {
        &self.patient_id
    }

    pub fn from(&self) -> PatientRiskState {
        self.from
    }

    pub fn to(&self) -> PatientRiskState {
        self.to
    }

    pub fn cause(&self) -> &EscalationCause {
        &self.cause
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Whether this transition asks for a call
    pub fn is_emergency(&self) -> bool {
        self.to == PatientRiskState::EmergencyDispatched
    }
}

/// Result of handing an emergency transition to the dispatcher
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchOutcome {
    Sent,
    Suppressed,
    Failed,
}

impl DispatchOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            DispatchOutcome::Sent => "sent",
            DispatchOutcome::Suppressed => "suppressed",
            DispatchOutcome::Failed => "failed",
        }
    }
}

impl fmt::Display for DispatchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DispatchOutcome {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sent" => Ok(DispatchOutcome::Sent),
            "suppressed" => Ok(DispatchOutcome::Suppressed),
            "failed" => Ok(DispatchOutcome::Failed),
            other => Err(format!("unknown dispatch outcome: {}", other)),
        }
    }
}

/// A call handed to the voice provider. Consumed by the call executor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallRequest {
    pub reason: CauseCategory,
    pub message: String,
    pub contact: String,
}

/// What happened to one emergency transition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchReport {
    pub patient_id: PatientId,
    pub event_id: Uuid,
    pub category: CauseCategory,
    pub outcome: DispatchOutcome,
    pub attempts: u32,
    /// Provider call reference when the call went out
    pub reference: Option<String>,
    /// Suppression reason or last provider error
    pub detail: Option<String>,
    pub message: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cause_categories() {
        let vitals = EscalationCause::VitalSigns {
            state: EmotionalState::ModerateDistress,
            metrics: vec![Metric::HeartRate],
        };
        assert_eq!(vitals.category(), Some(CauseCategory::Vitals));
        assert_eq!(EscalationCause::FallDetected.category(), Some(CauseCategory::Fall));
        assert_eq!(
            DiscreteEventKind::HelpRequested.category(),
            CauseCategory::HelpRequest
        );
        assert_eq!(
            EscalationCause::DispatchCompleted { outcome: DispatchOutcome::Sent }.category(),
            None
        );
    }

    #[test]
    fn test_cause_json_shape() {
        let cause = EscalationCause::VitalSigns {
            state: EmotionalState::CriticalDistress,
            metrics: vec![Metric::Spo2, Metric::Temperature],
        };
        let json = serde_json::to_value(&cause).unwrap();
        assert_eq!(json["kind"], "vital_signs");
        assert_eq!(json["state"], "critical_distress");
        assert_eq!(json["metrics"][0], "spo2");

        let fall = serde_json::to_string(&EscalationCause::FallDetected).unwrap();
        assert_eq!(fall, r#"{"kind":"fall_detected"}"#);
    }
}
