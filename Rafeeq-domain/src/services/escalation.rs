//! Per-patient escalation state machine
//!
//! One machine exists per monitored patient and is owned by the monitoring
//! loop. Every transition yields exactly one [`EscalationEvent`]; a single
//! sample may cascade through several states, e.g. a critical reading moves
//! Stable -> Warning -> Critical -> EmergencyDispatched and yields three events.

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info};

use crate::entities::{
    DispatchOutcome, EmotionalState, EscalationCause, EscalationEvent, PatientId, PatientRiskState,
};
use crate::error::EngineError;
use crate::services::classifier::Assessment;
use crate::services::normalizer::NormalizedEvent;

/// Tunables of the state machine
#[derive(Debug, Clone, PartialEq)]
pub struct EscalationPolicy {
    /// Consecutive stable samples needed to leave Warning
    pub hysteresis_samples: u32,
    /// Minimum time spent in Cooldown before returning to Stable
    pub cooldown: Duration,
    /// Lowest classification that escalates to Critical
    pub escalate_at: EmotionalState,
}

impl Default for EscalationPolicy {
    fn default() -> Self {
        Self {
            hysteresis_samples: 3,
            cooldown: Duration::seconds(300),
            escalate_at: EmotionalState::ModerateDistress,
        }
    }
}

#[derive(Debug)]
pub struct EscalationStateMachine {
    patient_id: PatientId,
    policy: EscalationPolicy,
    state: PatientRiskState,
    stable_streak: u32,
    pending_dispatches: u32,
    cooldown_started_at: Option<DateTime<Utc>>,
}

impl EscalationStateMachine {
    pub fn new(patient_id: PatientId, policy: EscalationPolicy) -> Self {
        Self {
            patient_id,
            policy,
            state: PatientRiskState::Stable,
            stable_streak: 0,
            pending_dispatches: 0,
            cooldown_started_at: None,
        }
    }

    pub fn patient_id(&self) -> &PatientId {
        &self.patient_id
    }

    pub fn state(&self) -> PatientRiskState {
        self.state
    }

    /// Dispatches requested but not yet completed
    pub fn pending_dispatches(&self) -> u32 {
        self.pending_dispatches
    }

    /// Feed the classification of one sample
    pub fn observe(&mut self, assessment: &Assessment, at: DateTime<Utc>) -> Vec<EscalationEvent> {
        let level = assessment.state;
        let cause = EscalationCause::VitalSigns {
            state: level,
            metrics: assessment.metrics.clone(),
        };
        let escalates = level >= self.policy.escalate_at;
        let elevated = level > EmotionalState::Stable;
        let mut events = Vec::new();

        match self.state {
            PatientRiskState::Stable => {
                if elevated {
                    events.push(self.transition(PatientRiskState::Warning, cause.clone(), at));
                    if escalates {
                        self.escalate(cause, at, &mut events);
                    }
                }
            }
            PatientRiskState::Warning => {
                if escalates {
                    self.escalate(cause, at, &mut events);
                } else if elevated {
                    self.stable_streak = 0;
                } else {
                    self.stable_streak += 1;
                    debug!(
                        patient_id = %self.patient_id,
                        streak = self.stable_streak,
                        "Stable sample while in warning"
                    );
                    if self.stable_streak >= self.policy.hysteresis_samples {
                        events.push(self.transition(PatientRiskState::Stable, cause, at));
                    }
                }
            }
            PatientRiskState::Critical => {
                events.push(self.enter_emergency(cause, at));
            }
            PatientRiskState::EmergencyDispatched => {
                // Waiting for the dispatch to complete
            }
            PatientRiskState::Cooldown => {
                if escalates {
                    self.escalate(cause, at, &mut events);
                } else if elevated {
                    events.push(self.transition(PatientRiskState::Warning, cause, at));
                } else if self.cooldown_elapsed(at) {
                    events.push(self.transition(PatientRiskState::Stable, cause, at));
                }
            }
        }

        events
    }

    /// Feed a normalized fall or help request. Always ends in EmergencyDispatched.
    pub fn signal(&mut self, event: &NormalizedEvent) -> EscalationEvent {
        self.enter_emergency(event.cause.clone(), event.timestamp)
    }

    /// Report that one requested dispatch finished, whatever its outcome.
    /// The machine enters Cooldown once no dispatch is pending.
    pub fn complete_dispatch(
        &mut self,
        outcome: DispatchOutcome,
        at: DateTime<Utc>,
    ) -> Result<Option<EscalationEvent>, EngineError> {
        if self.pending_dispatches == 0 || self.state != PatientRiskState::EmergencyDispatched {
            return Err(EngineError::Classification(format!(
                "dispatch completed for patient {} in state {} with {} pending",
                self.patient_id, self.state, self.pending_dispatches
            )));
        }

        self.pending_dispatches -= 1;
        if self.pending_dispatches > 0 {
            return Ok(None);
        }

        self.cooldown_started_at = Some(at);
        Ok(Some(self.transition(
            PatientRiskState::Cooldown,
            EscalationCause::DispatchCompleted { outcome },
            at,
        )))
    }

    fn escalate(&mut self, cause: EscalationCause, at: DateTime<Utc>, events: &mut Vec<EscalationEvent>) {
        events.push(self.transition(PatientRiskState::Critical, cause.clone(), at));
        events.push(self.enter_emergency(cause, at));
    }

    fn enter_emergency(&mut self, cause: EscalationCause, at: DateTime<Utc>) -> EscalationEvent {
        self.pending_dispatches += 1;
        self.transition(PatientRiskState::EmergencyDispatched, cause, at)
    }

    fn cooldown_elapsed(&self, at: DateTime<Utc>) -> bool {
        match self.cooldown_started_at {
            Some(started) => at < started || at - started >= self.policy.cooldown,
            None => true,
        }
    }

    fn transition(&mut self, to: PatientRiskState, cause: EscalationCause, at: DateTime<Utc>) -> EscalationEvent {
        let from = self.state;
        self.state = to;
        self.stable_streak = 0;

        info!(
            patient_id = %self.patient_id,
            from = %from,
            to = %to,
            "Risk state transition"
        );

        EscalationEvent::new(self.patient_id.clone(), from, to, cause, at)
    }
}
