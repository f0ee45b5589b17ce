//! Event normalizer: discrete signals in the classifier's vocabulary

use chrono::{DateTime, Utc};

use crate::entities::{DiscreteEvent, DiscreteEventKind, EmotionalState, EscalationCause, PatientId};

/// A discrete event mapped onto the distress scale, tagged with its cause
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedEvent {
    pub patient_id: PatientId,
    pub state: EmotionalState,
    pub cause: EscalationCause,
    pub timestamp: DateTime<Utc>,
}

/// Falls and help requests are always critical distress, whatever the vitals say
pub fn normalize(event: &DiscreteEvent) -> NormalizedEvent {
    let cause = match event.kind {
        DiscreteEventKind::FallDetected => EscalationCause::FallDetected,
        DiscreteEventKind::HelpRequested => EscalationCause::HelpRequested,
    };

    NormalizedEvent {
        patient_id: event.patient_id.clone(),
        state: EmotionalState::CriticalDistress,
        cause,
        timestamp: event.timestamp,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::CauseCategory;

    #[test]
    fn test_events_normalize_to_critical_distress() {
        let now = Utc::now();
        let fall = normalize(&DiscreteEvent::new("p1", DiscreteEventKind::FallDetected, now));
        let help = normalize(&DiscreteEvent::new("p1", DiscreteEventKind::HelpRequested, now));

        assert_eq!(fall.state, EmotionalState::CriticalDistress);
        assert_eq!(help.state, EmotionalState::CriticalDistress);
        assert_eq!(fall.cause.category(), Some(CauseCategory::Fall));
        assert_eq!(help.cause, EscalationCause::HelpRequested);
        assert_eq!(help.timestamp, now);
    }
}
