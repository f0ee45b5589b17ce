//! Call debouncer and dispatcher
//!
//! The dispatcher decides synchronously whether an emergency transition may
//! place a call (the gate) and hands the actual provider call to a
//! [`CallExecutor`] that can run on its own task. Debounce state is keyed by
//! patient and cause category, so a fall never waits behind a vitals call.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::entities::{
    CallRequest, CauseCategory, DispatchOutcome, DispatchReport, EmotionalState, EscalationCause, EscalationEvent,
    PatientId, VitalSnapshot,
};
use crate::error::{CallError, EngineError};
use crate::services::messages::MessageTemplates;

/// Outbound voice-call capability
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CallProviderTrait: Send + Sync {
    /// Place a call and return the provider's call reference
    async fn place_call(&self, contact: &str, message: &str) -> Result<String, CallError>;
}

/// Bounded retry with exponential backoff
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    /// Upper bound for a single provider call
    pub call_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_secs(2),
            max_backoff: Duration::from_secs(30),
            call_timeout: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Delay after the given failed attempt (1-based)
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff.saturating_mul(factor).min(self.max_backoff)
    }
}

/// Successful provider call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallReceipt {
    pub reference: String,
    pub attempts: u32,
}

/// Bookkeeping for a call that passed the gate
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchTicket {
    pub patient_id: PatientId,
    pub event_id: Uuid,
    pub category: CauseCategory,
    pub requested_at: DateTime<Utc>,
    pub message: String,
}

/// Decision of the debounce gate for one escalation event
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchGate {
    /// The transition does not ask for a call
    NotApplicable,
    Suppressed { category: CauseCategory, reason: String },
    Proceed { ticket: DispatchTicket, request: CallRequest },
}

#[derive(Debug, Clone, Default)]
struct DebounceEntry {
    last_success: Option<DateTime<Utc>>,
    in_flight: bool,
}

/// Gatekeeper in front of the voice-call provider
pub struct CallDispatcher {
    provider: Arc<dyn CallProviderTrait>,
    templates: MessageTemplates,
    contact: String,
    cooldown: chrono::Duration,
    retry: RetryPolicy,
    ledger: HashMap<(PatientId, CauseCategory), DebounceEntry>,
}

impl CallDispatcher {
    pub fn new(
        provider: Arc<dyn CallProviderTrait>,
        templates: MessageTemplates,
        contact: impl Into<String>,
        cooldown: chrono::Duration,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            provider,
            templates,
            contact: contact.into(),
            cooldown,
            retry,
            ledger: HashMap::new(),
        }
    }

    pub fn templates(&self) -> &MessageTemplates {
        &self.templates
    }

    /// Last successful call for a patient and category
    pub fn last_success(&self, patient_id: &PatientId, category: CauseCategory) -> Option<DateTime<Utc>> {
        self.ledger
            .get(&(patient_id.clone(), category))
            .and_then(|entry| entry.last_success)
    }

    /// Decide whether an escalation event places a call.
    /// A `Proceed` marks the call in flight until [`CallDispatcher::complete`] is called.
    pub fn gate(&mut self, event: &EscalationEvent, snapshot: Option<&VitalSnapshot>) -> DispatchGate {
        if !event.is_emergency() {
            return DispatchGate::NotApplicable;
        }
        let Some(category) = event.cause().category() else {
            return DispatchGate::NotApplicable;
        };

        let entry = self
            .ledger
            .entry((event.patient_id().clone(), category))
            .or_default();

        if entry.in_flight {
            return suppress(event, category, "a call for this cause is already in flight".to_string());
        }

        if let Some(last) = entry.last_success {
            let since = event.timestamp() - last;
            // a success stamped later than this event does not debounce it
            if since >= chrono::Duration::zero() && since < self.cooldown {
                return suppress(
                    event,
                    category,
                    format!(
                        "call sent {}s ago, inside the {}s cooldown",
                        since.num_seconds(),
                        self.cooldown.num_seconds()
                    ),
                );
            }
        }

        entry.in_flight = true;
        // Discrete events carry critical distress by definition
        let emotion = match event.cause() {
            EscalationCause::VitalSigns { state, .. } => *state,
            _ => EmotionalState::CriticalDistress,
        };
        let message = self.templates.render(event.cause(), snapshot, emotion);

        DispatchGate::Proceed {
            ticket: DispatchTicket {
                patient_id: event.patient_id().clone(),
                event_id: event.id(),
                category,
                requested_at: event.timestamp(),
                message: message.clone(),
            },
            request: CallRequest {
                reason: category,
                message,
                contact: self.contact.clone(),
            },
        }
    }

    /// Executor that can run a gated call off the owner's task
    pub fn executor(&self) -> CallExecutor {
        CallExecutor {
            provider: Arc::clone(&self.provider),
            retry: self.retry.clone(),
        }
    }

    /// Record the result of a gated call and build its report
    pub fn complete(
        &mut self,
        ticket: &DispatchTicket,
        result: &Result<CallReceipt, EngineError>,
        at: DateTime<Utc>,
    ) -> DispatchReport {
        let entry = self
            .ledger
            .entry((ticket.patient_id.clone(), ticket.category))
            .or_default();
        entry.in_flight = false;

        let (outcome, attempts, reference, detail) = match result {
            Ok(receipt) => {
                entry.last_success = Some(at);
                info!(
                    patient_id = %ticket.patient_id,
                    category = %ticket.category,
                    attempts = receipt.attempts,
                    reference = %receipt.reference,
                    "Emergency call placed"
                );
                (DispatchOutcome::Sent, receipt.attempts, Some(receipt.reference.clone()), None)
            }
            Err(e) => {
                error!(
                    patient_id = %ticket.patient_id,
                    category = %ticket.category,
                    error = %e,
                    "Emergency call failed"
                );
                let attempts = match e {
                    EngineError::DispatchFailed { attempts, .. } => *attempts,
                    _ => 0,
                };
                (DispatchOutcome::Failed, attempts, None, Some(e.to_string()))
            }
        };

        DispatchReport {
            patient_id: ticket.patient_id.clone(),
            event_id: ticket.event_id,
            category: ticket.category,
            outcome,
            attempts,
            reference,
            detail,
            message: Some(ticket.message.clone()),
            timestamp: at,
        }
    }

    /// Gate, execute and record in one step.
    ///
    /// Returns `None` for transitions that do not ask for a call and surfaces
    /// `DispatchFailed` once retries are exhausted.
    pub async fn maybe_dispatch(
        &mut self,
        event: &EscalationEvent,
        snapshot: Option<&VitalSnapshot>,
    ) -> Result<Option<DispatchOutcome>, EngineError> {
        match self.gate(event, snapshot) {
            DispatchGate::NotApplicable => Ok(None),
            DispatchGate::Suppressed { .. } => Ok(Some(DispatchOutcome::Suppressed)),
            DispatchGate::Proceed { ticket, request } => {
                let started = tokio::time::Instant::now();
                let result = self.executor().execute(request).await;
                let at = ticket.requested_at + elapsed_since(started);
                let report = self.complete(&ticket, &result, at);
                result.map(|_| Some(report.outcome))
            }
        }
    }
}

impl std::fmt::Debug for CallDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallDispatcher")
            .field("contact", &self.contact)
            .field("cooldown", &self.cooldown)
            .field("retry", &self.retry)
            .field("tracked", &self.ledger.len())
            .finish()
    }
}

/// Report for a suppressed emergency transition
pub fn suppressed_report(event: &EscalationEvent, category: CauseCategory, reason: &str) -> DispatchReport {
    DispatchReport {
        patient_id: event.patient_id().clone(),
        event_id: event.id(),
        category,
        outcome: DispatchOutcome::Suppressed,
        attempts: 0,
        reference: None,
        detail: Some(reason.to_string()),
        message: None,
        timestamp: event.timestamp(),
    }
}

fn suppress(event: &EscalationEvent, category: CauseCategory, reason: String) -> DispatchGate {
    warn!(
        patient_id = %event.patient_id(),
        category = %category,
        reason = %reason,
        "Emergency call suppressed"
    );
    DispatchGate::Suppressed { category, reason }
}

/// Wall-clock time spent since `started`, on the event timeline
pub fn elapsed_since(started: tokio::time::Instant) -> chrono::Duration {
    chrono::Duration::from_std(started.elapsed()).unwrap_or_else(|_| chrono::Duration::zero())
}

/// Runs one call against the provider with timeout and retries
#[derive(Clone)]
pub struct CallExecutor {
    provider: Arc<dyn CallProviderTrait>,
    retry: RetryPolicy,
}

impl CallExecutor {
    pub async fn execute(&self, request: CallRequest) -> Result<CallReceipt, EngineError> {
        let max_attempts = self.retry.max_attempts.max(1);
        let mut last_error = CallError::Transport("no attempt made".to_string());

        for attempt in 1..=max_attempts {
            let call = self.provider.place_call(&request.contact, &request.message);
            match tokio::time::timeout(self.retry.call_timeout, call).await {
                Ok(Ok(reference)) => {
                    return Ok(CallReceipt {
                        reference,
                        attempts: attempt,
                    })
                }
                Ok(Err(e)) => last_error = e,
                Err(_) => last_error = CallError::Timeout(self.retry.call_timeout),
            }

            warn!(
                category = %request.reason,
                attempt,
                max_attempts,
                error = %last_error,
                "Call attempt failed"
            );

            if attempt < max_attempts {
                tokio::time::sleep(self.retry.backoff_for(attempt)).await;
            }
        }

        Err(EngineError::DispatchFailed {
            category: request.reason,
            attempts: max_attempts,
            reason: last_error.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{Metric, PatientRiskState};
    use crate::testing::ScriptedCallProvider;
    use chrono::TimeZone;

    fn t(seconds: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap() + chrono::Duration::seconds(seconds)
    }

    fn fast_retry() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(4),
            call_timeout: Duration::from_secs(5),
        }
    }

    fn dispatcher(provider: Arc<dyn CallProviderTrait>) -> CallDispatcher {
        CallDispatcher::new(
            provider,
            MessageTemplates::english(),
            "+15550100",
            chrono::Duration::minutes(5),
            fast_retry(),
        )
    }

    fn emergency(cause: EscalationCause, at: DateTime<Utc>) -> EscalationEvent {
        EscalationEvent::new(
            PatientId::new("p1"),
            PatientRiskState::Critical,
            PatientRiskState::EmergencyDispatched,
            cause,
            at,
        )
    }

    fn heart() -> EscalationCause {
        EscalationCause::VitalSigns {
            state: EmotionalState::ModerateDistress,
            metrics: vec![Metric::HeartRate],
        }
    }

    #[test]
    fn test_backoff_grows_and_is_capped() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff_for(1), Duration::from_secs(2));
        assert_eq!(policy.backoff_for(2), Duration::from_secs(4));
        assert_eq!(policy.backoff_for(3), Duration::from_secs(8));
        assert_eq!(policy.backoff_for(10), Duration::from_secs(30));
    }

    #[tokio::test]
    async fn test_non_emergency_transitions_place_no_call() {
        let mut mock = MockCallProviderTrait::new();
        mock.expect_place_call().times(0);
        let mut dispatcher = dispatcher(Arc::new(mock));

        let event = EscalationEvent::new(
            PatientId::new("p1"),
            PatientRiskState::Stable,
            PatientRiskState::Warning,
            heart(),
            t(0),
        );
        let outcome = dispatcher.maybe_dispatch(&event, None).await;
        assert_eq!(outcome, Ok(None));
    }

    #[tokio::test]
    async fn test_sends_call_with_contact_and_message() {
        let mut mock = MockCallProviderTrait::new();
        mock.expect_place_call().times(1).returning(|contact, message| {
            assert_eq!(contact, "+15550100");
            assert!(message.contains("Heart rate 145"));
            Ok("CA100".to_string())
        });
        let mut dispatcher = dispatcher(Arc::new(mock));

        let snapshot = VitalSnapshot::new("p1", 145.0, 98.0, 36.8, t(0));
        let outcome = dispatcher.maybe_dispatch(&emergency(heart(), t(0)), Some(&snapshot)).await;

        assert_eq!(outcome, Ok(Some(DispatchOutcome::Sent)));
        assert!(dispatcher.last_success(&PatientId::new("p1"), CauseCategory::Vitals).is_some());
    }

    #[tokio::test]
    async fn test_same_category_is_debounced_within_cooldown() {
        let provider = Arc::new(ScriptedCallProvider::new());
        let mut dispatcher = dispatcher(provider.clone());

        let first = dispatcher.maybe_dispatch(&emergency(heart(), t(0)), None).await;
        let second = dispatcher.maybe_dispatch(&emergency(heart(), t(10)), None).await;
        let later = dispatcher.maybe_dispatch(&emergency(heart(), t(301)), None).await;

        assert_eq!(first, Ok(Some(DispatchOutcome::Sent)));
        assert_eq!(second, Ok(Some(DispatchOutcome::Suppressed)));
        assert_eq!(later, Ok(Some(DispatchOutcome::Sent)));
        assert_eq!(provider.call_count(), 2);
    }

    #[tokio::test]
    async fn test_fall_dispatches_despite_recent_vitals_call() {
        let provider = Arc::new(ScriptedCallProvider::new());
        let mut dispatcher = dispatcher(provider.clone());

        dispatcher.maybe_dispatch(&emergency(heart(), t(0)), None).await.unwrap();
        let fall = dispatcher
            .maybe_dispatch(&emergency(EscalationCause::FallDetected, t(1)), None)
            .await;

        assert_eq!(fall, Ok(Some(DispatchOutcome::Sent)));
        assert_eq!(provider.call_count(), 2);
        assert!(provider.calls()[1].1.contains("Fall detected"));
    }

    #[tokio::test]
    async fn test_future_dated_success_does_not_debounce_earlier_events() {
        let provider = Arc::new(ScriptedCallProvider::new());
        let mut dispatcher = dispatcher(provider.clone());

        // sensor clock a day ahead
        let skewed = dispatcher
            .maybe_dispatch(&emergency(EscalationCause::FallDetected, t(86_400)), None)
            .await;
        let real = dispatcher
            .maybe_dispatch(&emergency(EscalationCause::FallDetected, t(3_600)), None)
            .await;

        assert_eq!(skewed, Ok(Some(DispatchOutcome::Sent)));
        assert_eq!(real, Ok(Some(DispatchOutcome::Sent)));
        assert_eq!(provider.call_count(), 2);
    }

    #[test]
    fn test_in_flight_call_suppresses_duplicate() {
        let mut dispatcher = dispatcher(Arc::new(ScriptedCallProvider::new()));
        let help = EscalationCause::HelpRequested;

        let first = dispatcher.gate(&emergency(help.clone(), t(0)), None);
        assert!(matches!(first, DispatchGate::Proceed { .. }));

        let second = dispatcher.gate(&emergency(help, t(1)), None);
        assert!(matches!(
            second,
            DispatchGate::Suppressed { category: CauseCategory::HelpRequest, .. }
        ));
    }

    #[tokio::test]
    async fn test_retries_until_success() {
        let provider = Arc::new(ScriptedCallProvider::with_responses(vec![
            Err(CallError::Rejected("busy".to_string())),
            Err(CallError::Transport("reset".to_string())),
            Ok("CA3".to_string()),
        ]));
        let mut dispatcher = dispatcher(provider.clone());

        let event = emergency(EscalationCause::FallDetected, t(0));
        let DispatchGate::Proceed { ticket, request } = dispatcher.gate(&event, None) else {
            panic!("expected the call to proceed");
        };

        let result = dispatcher.executor().execute(request).await;
        assert_eq!(
            result,
            Ok(CallReceipt {
                reference: "CA3".to_string(),
                attempts: 3
            })
        );

        let report = dispatcher.complete(&ticket, &result, t(1));
        assert_eq!(report.outcome, DispatchOutcome::Sent);
        assert_eq!(report.attempts, 3);
        assert_eq!(report.reference.as_deref(), Some("CA3"));
    }

    #[tokio::test]
    async fn test_exhausted_retries_surface_dispatch_failed() {
        let provider = Arc::new(ScriptedCallProvider::with_responses(vec![
            Err(CallError::Rejected("no answer".to_string())),
            Err(CallError::Rejected("no answer".to_string())),
            Err(CallError::Rejected("no answer".to_string())),
        ]));
        let mut dispatcher = dispatcher(provider.clone());

        let result = dispatcher
            .maybe_dispatch(&emergency(heart(), t(0)), None)
            .await;
        match result {
            Err(EngineError::DispatchFailed { category, attempts, reason }) => {
                assert_eq!(category, CauseCategory::Vitals);
                assert_eq!(attempts, 3);
                assert!(reason.contains("no answer"));
            }
            other => panic!("expected DispatchFailed, got {:?}", other),
        }

        // a failed call does not start the debounce window
        let retry = dispatcher
            .maybe_dispatch(&emergency(heart(), t(5)), None)
            .await;
        assert_eq!(retry, Ok(Some(DispatchOutcome::Sent)));
        assert_eq!(provider.call_count(), 4);
    }

    #[tokio::test]
    async fn test_slow_provider_times_out() {
        let provider = Arc::new(ScriptedCallProvider::new().with_delay(Duration::from_millis(500)));
        let mut dispatcher = CallDispatcher::new(
            provider,
            MessageTemplates::english(),
            "+15550100",
            chrono::Duration::minutes(5),
            RetryPolicy {
                max_attempts: 1,
                call_timeout: Duration::from_millis(20),
                ..fast_retry()
            },
        );

        let result = dispatcher
            .maybe_dispatch(&emergency(heart(), t(0)), None)
            .await;
        assert!(matches!(result, Err(EngineError::DispatchFailed { reason, .. }) if reason.contains("timed out")));
    }
}
