//! Monitoring loop
//!
//! The loop is the single owner of every patient's state machine and of the
//! dispatcher's debounce ledger. Readings and events are applied strictly in
//! arrival order; provider calls run on a `JoinSet` so a slow call never
//! delays the next sample, and their completions come back through the same
//! loop.

use chrono::{DateTime, Utc};
use futures::FutureExt;
use rafeeq_data::repository::EscalationLogRepositoryTrait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinError, JoinSet};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::config::MonitorConfig;
use crate::entities::{
    DiscreteEvent, DispatchOutcome, DispatchReport, EscalationEvent, PatientId, PatientRiskState, VitalSnapshot,
};
use crate::error::{EngineError, SourceError};
use crate::services::classifier::{assess, Assessment};
use crate::services::dispatcher::{
    elapsed_since, suppressed_report, CallDispatcher, CallProviderTrait, CallReceipt, DispatchGate, DispatchTicket,
};
use crate::services::escalation::{EscalationPolicy, EscalationStateMachine};
use crate::services::normalizer::normalize;
use crate::services::persistence::{LogRecord, PersistenceWriter};
use crate::services::sources::VitalSource;
use crate::services::status::{AlertKind, OperatorAlert, StatusBoard};
use crate::services::thresholds::{evaluate, VitalThresholds};

/// Pushed inputs buffered before senders wait
pub const INPUT_CHANNEL_CAPACITY: usize = 256;

/// Timestamps further ahead of the local clock than this are logged
const MAX_CLOCK_SKEW_SECS: i64 = 5;

/// Input pushed into the loop from outside
#[derive(Debug, Clone, PartialEq)]
pub enum MonitorInput {
    Vitals(VitalSnapshot),
    Event(DiscreteEvent),
}

/// Cloneable handle used to feed and stop a running loop
#[derive(Debug, Clone)]
pub struct MonitorHandle {
    inputs: mpsc::Sender<MonitorInput>,
    shutdown: Arc<watch::Sender<bool>>,
    board: StatusBoard,
    patients: Arc<HashSet<PatientId>>,
}

impl MonitorHandle {
    /// Whether the loop was configured with this patient
    pub fn is_monitored(&self, patient_id: &PatientId) -> bool {
        self.patients.contains(patient_id)
    }

    fn check_patient(&self, patient_id: &PatientId) -> Result<(), EngineError> {
        if self.is_monitored(patient_id) {
            Ok(())
        } else {
            Err(EngineError::UnknownPatient(patient_id.to_string()))
        }
    }

    pub async fn submit_vitals(&self, snapshot: VitalSnapshot) -> Result<(), EngineError> {
        self.check_patient(&snapshot.patient_id)?;
        self.inputs
            .send(MonitorInput::Vitals(snapshot))
            .await
            .map_err(|_| EngineError::MonitorClosed)
    }

    pub async fn report_event(&self, event: DiscreteEvent) -> Result<(), EngineError> {
        self.check_patient(&event.patient_id)?;
        self.inputs
            .send(MonitorInput::Event(event))
            .await
            .map_err(|_| EngineError::MonitorClosed)
    }

    pub fn status(&self) -> &StatusBoard {
        &self.board
    }

    /// Ask the loop to stop; in-flight calls still finish
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    pub fn is_closed(&self) -> bool {
        self.inputs.is_closed()
    }
}

struct PatientSession {
    machine: EscalationStateMachine,
    last_snapshot: Option<VitalSnapshot>,
    last_assessment: Option<Assessment>,
}

impl PatientSession {
    fn new(patient_id: PatientId, policy: EscalationPolicy) -> Self {
        Self {
            machine: EscalationStateMachine::new(patient_id, policy),
            last_snapshot: None,
            last_assessment: None,
        }
    }
}

struct DispatchCompletion {
    ticket: DispatchTicket,
    result: Result<CallReceipt, EngineError>,
    completed_at: DateTime<Utc>,
}

/// Hands a ticket back to the loop if its dispatch task is dropped before
/// it produces a completion, so the call can still be reported as failed.
struct LostTicket {
    ticket: Option<DispatchTicket>,
    lost: mpsc::UnboundedSender<DispatchTicket>,
}

impl LostTicket {
    fn disarm(mut self) {
        self.ticket = None;
    }
}

impl Drop for LostTicket {
    fn drop(&mut self) {
        if let Some(ticket) = self.ticket.take() {
            let _ = self.lost.send(ticket);
        }
    }
}

pub struct MonitoringLoop {
    thresholds: VitalThresholds,
    policy: EscalationPolicy,
    sample_interval: Duration,
    sessions: HashMap<PatientId, PatientSession>,
    dispatcher: CallDispatcher,
    writer: PersistenceWriter,
    inflight: JoinSet<DispatchCompletion>,
    lost_tx: mpsc::UnboundedSender<DispatchTicket>,
    lost_rx: mpsc::UnboundedReceiver<DispatchTicket>,
    board: StatusBoard,
    inputs: mpsc::Receiver<MonitorInput>,
    shutdown: watch::Receiver<bool>,
}

impl MonitoringLoop {
    /// Build the loop and its handle. Must be called inside a Tokio runtime
    /// because the persistence writer starts immediately.
    pub fn new(
        config: &MonitorConfig,
        provider: Arc<dyn CallProviderTrait>,
        repository: Arc<dyn EscalationLogRepositoryTrait>,
    ) -> Result<(Self, MonitorHandle), EngineError> {
        config.validate_config()?;

        let board = StatusBoard::new();
        let (input_tx, input_rx) = mpsc::channel(INPUT_CHANNEL_CAPACITY);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let dispatcher = CallDispatcher::new(
            provider,
            config.templates()?,
            config.caregiver_contact.clone(),
            config.cooldown(),
            config.retry_policy(),
        );
        let writer = PersistenceWriter::spawn(repository, config.persistence_policy(), board.clone());
        let (lost_tx, lost_rx) = mpsc::unbounded_channel();

        let mut monitor = Self {
            thresholds: config.thresholds.clone(),
            policy: config.escalation_policy(),
            sample_interval: config.sample_interval(),
            sessions: HashMap::new(),
            dispatcher,
            writer,
            inflight: JoinSet::new(),
            lost_tx,
            lost_rx,
            board: board.clone(),
            inputs: input_rx,
            shutdown: shutdown_rx,
        };

        let now = Utc::now();
        let patients = config.patient_ids();
        for patient_id in &patients {
            monitor
                .sessions
                .insert(patient_id.clone(), PatientSession::new(patient_id.clone(), monitor.policy.clone()));
            monitor.board.update(patient_id, now, |_| {});
        }

        let handle = MonitorHandle {
            inputs: input_tx,
            shutdown: Arc::new(shutdown_tx),
            board,
            patients: Arc::new(patients.into_iter().collect()),
        };

        Ok((monitor, handle))
    }

    pub fn board(&self) -> &StatusBoard {
        &self.board
    }

    pub fn risk_state(&self, patient_id: &PatientId) -> Option<PatientRiskState> {
        self.sessions.get(patient_id).map(|s| s.machine.state())
    }

    /// Classification of the patient's last valid reading
    pub fn last_assessment(&self, patient_id: &PatientId) -> Option<&Assessment> {
        self.sessions.get(patient_id).and_then(|s| s.last_assessment.as_ref())
    }

    /// Provider calls still running
    pub fn in_flight(&self) -> usize {
        self.inflight.len()
    }

    /// Sessions are fixed at construction; input for anyone else is refused
    fn session(&mut self, patient_id: &PatientId) -> Result<&mut PatientSession, EngineError> {
        self.sessions
            .get_mut(patient_id)
            .ok_or_else(|| EngineError::UnknownPatient(patient_id.to_string()))
    }

    fn warn_if_future(patient_id: &PatientId, at: DateTime<Utc>) {
        let ahead = at - Utc::now();
        if ahead > chrono::Duration::seconds(MAX_CLOCK_SKEW_SECS) {
            warn!(
                patient_id = %patient_id,
                ahead_seconds = ahead.num_seconds(),
                "Input timestamp is ahead of the local clock"
            );
        }
    }

    /// Evaluate one reading and apply the resulting transitions.
    /// A rejected reading leaves the patient's state untouched.
    pub fn process_snapshot(&mut self, snapshot: VitalSnapshot) -> Result<Vec<EscalationEvent>, EngineError> {
        let patient_id = snapshot.patient_id.clone();
        let at = snapshot.timestamp;
        self.session(&patient_id)?;
        Self::warn_if_future(&patient_id, at);

        let severities = match evaluate(&snapshot, &self.thresholds) {
            Ok(severities) => severities,
            Err(e) => {
                warn!(patient_id = %patient_id, error = %e, "Rejected reading");
                self.board.raise(OperatorAlert {
                    kind: AlertKind::InvalidReading,
                    patient_id: Some(patient_id),
                    message: e.to_string(),
                    timestamp: at,
                });
                return Err(e);
            }
        };
        let assessment = assess(severities);

        debug!(
            patient_id = %patient_id,
            heart_rate = snapshot.heart_rate,
            spo2 = snapshot.spo2,
            temperature = snapshot.temperature,
            emotional_state = %assessment.state,
            "Reading classified"
        );

        self.writer.record(LogRecord::Vitals {
            snapshot: snapshot.clone(),
            emotional_state: Some(assessment.state),
        });

        let session = self.session(&patient_id)?;
        let events = session.machine.observe(&assessment, at);
        session.last_snapshot = Some(snapshot.clone());
        session.last_assessment = Some(assessment.clone());

        self.board.update(&patient_id, at, |status| {
            status.emotional_state = Some(assessment.state);
            status.severities = Some(assessment.severities);
            status.last_snapshot = Some(snapshot);
        });

        self.apply(&patient_id, events, at)
    }

    /// Apply a fall or help request; always ends in an emergency transition
    pub fn process_event(&mut self, event: DiscreteEvent) -> Result<Vec<EscalationEvent>, EngineError> {
        self.session(&event.patient_id)?;
        Self::warn_if_future(&event.patient_id, event.timestamp);
        let normalized = normalize(&event);
        info!(
            patient_id = %event.patient_id,
            kind = ?event.kind,
            "Discrete event received"
        );

        let escalation = self.session(&event.patient_id)?.machine.signal(&normalized);
        self.apply(&event.patient_id, vec![escalation], event.timestamp)
    }

    /// Log transitions in order and start a dispatch for every emergency transition
    fn apply(
        &mut self,
        patient_id: &PatientId,
        events: Vec<EscalationEvent>,
        at: DateTime<Utc>,
    ) -> Result<Vec<EscalationEvent>, EngineError> {
        let mut queue: VecDeque<EscalationEvent> = events.into();
        let mut applied = Vec::with_capacity(queue.len());

        while let Some(event) = queue.pop_front() {
            self.writer.record(LogRecord::Escalation(event.clone()));
            if event.is_emergency() {
                if let Some(follow_up) = self.start_dispatch(&event)? {
                    queue.push_back(follow_up);
                }
            }
            applied.push(event);
        }

        if let Some(state) = self.risk_state(patient_id) {
            self.board.update(patient_id, at, |status| status.risk_state = state);
        }

        Ok(applied)
    }

    fn start_dispatch(&mut self, event: &EscalationEvent) -> Result<Option<EscalationEvent>, EngineError> {
        let snapshot = self
            .sessions
            .get(event.patient_id())
            .and_then(|s| s.last_snapshot.clone());

        match self.dispatcher.gate(event, snapshot.as_ref()) {
            DispatchGate::NotApplicable => Ok(None),
            DispatchGate::Suppressed { category, reason } => {
                self.record_report(suppressed_report(event, category, &reason));
                self.complete_for(event.patient_id(), DispatchOutcome::Suppressed, event.timestamp())
            }
            DispatchGate::Proceed { ticket, request } => {
                let executor = self.dispatcher.executor();
                let guard = LostTicket {
                    ticket: Some(ticket.clone()),
                    lost: self.lost_tx.clone(),
                };
                info!(
                    patient_id = %ticket.patient_id,
                    category = %ticket.category,
                    "Dispatching emergency call"
                );

                self.inflight.spawn(async move {
                    let started = tokio::time::Instant::now();
                    let category = ticket.category;
                    let result = match AssertUnwindSafe(executor.execute(request)).catch_unwind().await {
                        Ok(result) => result,
                        Err(_) => Err(EngineError::DispatchFailed {
                            category,
                            attempts: 1,
                            reason: "call provider panicked".to_string(),
                        }),
                    };
                    let completed_at = ticket.requested_at + elapsed_since(started);
                    guard.disarm();
                    DispatchCompletion {
                        ticket,
                        result,
                        completed_at,
                    }
                });
                Ok(None)
            }
        }
    }

    fn complete_for(
        &mut self,
        patient_id: &PatientId,
        outcome: DispatchOutcome,
        at: DateTime<Utc>,
    ) -> Result<Option<EscalationEvent>, EngineError> {
        let session = self.sessions.get_mut(patient_id).ok_or_else(|| {
            EngineError::Classification(format!("dispatch completed for unknown patient {}", patient_id))
        })?;
        session.machine.complete_dispatch(outcome, at)
    }

    fn record_report(&self, report: DispatchReport) {
        let outcome = report.outcome;
        self.board.update(&report.patient_id, report.timestamp, |status| {
            status.last_outcome = Some(outcome);
            if outcome == DispatchOutcome::Sent {
                status.total_calls += 1;
            }
        });
        self.writer.record(LogRecord::Dispatch(report));
    }

    fn handle_completion(&mut self, completion: DispatchCompletion) -> Result<Vec<EscalationEvent>, EngineError> {
        let DispatchCompletion {
            ticket,
            result,
            completed_at,
        } = completion;

        let report = self.dispatcher.complete(&ticket, &result, completed_at);
        if let Err(e) = &result {
            self.board.raise(OperatorAlert {
                kind: AlertKind::DispatchFailed,
                patient_id: Some(ticket.patient_id.clone()),
                message: e.to_string(),
                timestamp: completed_at,
            });
        }
        let outcome = report.outcome;
        self.record_report(report);

        let follow_up = self.complete_for(&ticket.patient_id, outcome, completed_at)?;
        self.apply(&ticket.patient_id, follow_up.into_iter().collect(), completed_at)
    }

    fn on_joined(
        &mut self,
        joined: Result<DispatchCompletion, JoinError>,
    ) -> Result<Vec<EscalationEvent>, EngineError> {
        match joined {
            Ok(completion) => self.handle_completion(completion),
            Err(e) => {
                error!(error = %e, "Dispatch task ended without a result");
                let mut events = Vec::new();
                while let Ok(ticket) = self.lost_rx.try_recv() {
                    let completion = DispatchCompletion {
                        result: Err(EngineError::DispatchFailed {
                            category: ticket.category,
                            attempts: 0,
                            reason: format!("dispatch task lost: {}", e),
                        }),
                        completed_at: ticket.requested_at,
                        ticket,
                    };
                    events.extend(self.handle_completion(completion)?);
                }
                Ok(events)
            }
        }
    }

    /// Wait for every in-flight call and apply its completion
    pub async fn settle(&mut self) -> Result<Vec<EscalationEvent>, EngineError> {
        let mut events = Vec::new();
        while let Some(joined) = self.inflight.join_next().await {
            events.extend(self.on_joined(joined)?);
        }
        Ok(events)
    }

    /// Settle in-flight calls, then flush the log
    pub async fn finish(mut self) -> Result<(), EngineError> {
        let settled = self.settle().await;
        self.board.set_running(false);
        self.writer.close().await;
        info!("Monitoring loop finished");
        settled.map(|_| ())
    }

    fn ingest(&mut self, input: MonitorInput) -> Result<(), EngineError> {
        let result = match input {
            MonitorInput::Vitals(snapshot) => self.process_snapshot(snapshot),
            MonitorInput::Event(event) => self.process_event(event),
        };
        match result {
            // already logged and published; the last valid state stays
            Err(EngineError::InvalidReading { .. }) => Ok(()),
            Err(EngineError::UnknownPatient(patient_id)) => {
                warn!(patient_id = %patient_id, "Dropped input for unmonitored patient");
                Ok(())
            }
            Err(e) => Err(e),
            Ok(_) => Ok(()),
        }
    }

    /// Refuse new input and apply everything already queued
    fn drain_inputs(&mut self) -> Result<(), EngineError> {
        self.inputs.close();
        let mut drained = 0usize;
        while let Ok(input) = self.inputs.try_recv() {
            self.ingest(input)?;
            drained += 1;
        }
        if drained > 0 {
            info!(drained, "Applied input queued before shutdown");
        }
        Ok(())
    }

    async fn poll_source(&mut self, source: &mut dyn VitalSource) -> Result<(), EngineError> {
        match source.sample().await {
            Ok(snapshots) => {
                for snapshot in snapshots {
                    self.ingest(MonitorInput::Vitals(snapshot))?;
                }
            }
            Err(SourceError::Disconnected(reason)) => {
                warn!(reason = %reason, "Sensor source disconnected, reconnecting");
                if let Err(e) = source.reconnect().await {
                    warn!(error = %e, "Sensor reconnect failed, retrying on next tick");
                }
            }
        }
        Ok(())
    }

    /// Drive the loop until shutdown is requested or every handle is dropped.
    ///
    /// Returns an error only for a classification defect; in-flight calls
    /// are settled and the log is flushed in every case.
    pub async fn run(mut self, mut source: Option<Box<dyn VitalSource>>) -> Result<(), EngineError> {
        info!(
            patients = self.sessions.len(),
            sample_interval = ?self.sample_interval,
            sampling = source.is_some(),
            "Monitoring loop started"
        );

        let mut ticker = tokio::time::interval(self.sample_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut inputs_open = true;

        let outcome = loop {
            tokio::select! {
                biased;

                changed = self.shutdown.changed() => {
                    if changed.is_err() || *self.shutdown.borrow() {
                        info!("Shutdown requested, draining queued input");
                        break self.drain_inputs();
                    }
                }
                Some(joined) = self.inflight.join_next(), if !self.inflight.is_empty() => {
                    if let Err(e) = self.on_joined(joined) {
                        break Err(e);
                    }
                }
                _ = ticker.tick(), if source.is_some() => {
                    if let Some(source) = source.as_mut() {
                        if let Err(e) = self.poll_source(&mut **source).await {
                            break Err(e);
                        }
                    }
                }
                input = self.inputs.recv(), if inputs_open => {
                    match input {
                        Some(input) => {
                            if let Err(e) = self.ingest(input) {
                                break Err(e);
                            }
                        }
                        None => inputs_open = false,
                    }
                }
            }
        };

        if let Err(e) = &outcome {
            error!(error = %e, "Monitoring loop stopped on a logic defect");
        }

        let finished = self.finish().await;
        outcome.and(finished)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::conversions::convert_to_domain_escalation;
    use crate::entities::{CauseCategory, DiscreteEventKind};
    use crate::error::CallError;
    use crate::testing::{MockEscalationLogRepository, ScriptedCallProvider, ScriptedVitalSource};
    use chrono::TimeZone;
    use crate::entities::PatientRiskState::*;
    use std::sync::Once;

    static INIT: Once = Once::new();

    fn init_tracing() {
        INIT.call_once(|| {
            let _ = tracing_subscriber::fmt().with_test_writer().try_init();
        });
    }

    fn t(seconds: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap() + chrono::Duration::seconds(seconds)
    }

    fn config() -> MonitorConfig {
        MonitorConfig {
            dispatch_attempts: 2,
            dispatch_backoff_ms: 1,
            dispatch_max_backoff_ms: 4,
            persistence_backoff_ms: 1,
            caregiver_contact: "+15550100".to_string(),
            message_locale: "en".to_string(),
            patients: vec!["p1".to_string(), "p2".to_string()],
            ..MonitorConfig::default()
        }
    }

    struct Fixture {
        monitor: MonitoringLoop,
        handle: MonitorHandle,
        provider: Arc<ScriptedCallProvider>,
        repository: Arc<MockEscalationLogRepository>,
    }

    fn fixture(provider: ScriptedCallProvider) -> Fixture {
        init_tracing();
        let provider = Arc::new(provider);
        let repository = Arc::new(MockEscalationLogRepository::new());
        let (monitor, handle) = MonitoringLoop::new(&config(), provider.clone(), repository.clone()).unwrap();
        Fixture {
            monitor,
            handle,
            provider,
            repository,
        }
    }

    fn reading(heart_rate: f64, spo2: f64, temperature: f64, at: DateTime<Utc>) -> VitalSnapshot {
        VitalSnapshot::new("p1", heart_rate, spo2, temperature, at)
    }

    fn path(events: &[EscalationEvent]) -> Vec<(PatientRiskState, PatientRiskState)> {
        events.iter().map(|e| (e.from(), e.to())).collect()
    }

    #[tokio::test]
    async fn test_critical_heart_rate_places_one_call() {
        let mut f = fixture(ScriptedCallProvider::new());

        let events = f.monitor.process_snapshot(reading(145.0, 98.0, 36.8, t(0))).unwrap();
        assert_eq!(
            path(&events),
            vec![(Stable, Warning), (Warning, Critical), (Critical, EmergencyDispatched)]
        );

        let completed = f.monitor.settle().await.unwrap();
        assert_eq!(path(&completed), vec![(EmergencyDispatched, Cooldown)]);

        let calls = f.provider.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "+15550100");
        assert!(calls[0].1.contains("Heart rate 145. Above the normal range"));

        let status = f.handle.status().patient(&PatientId::new("p1")).unwrap();
        assert_eq!(status.risk_state, Cooldown);
        assert_eq!(status.total_calls, 1);
        assert_eq!(status.last_outcome, Some(DispatchOutcome::Sent));
    }

    #[tokio::test]
    async fn test_help_request_bypasses_vitals() {
        let mut f = fixture(ScriptedCallProvider::new());

        assert!(f.monitor.process_snapshot(reading(80.0, 98.0, 37.0, t(0))).unwrap().is_empty());

        let events = f
            .monitor
            .process_event(DiscreteEvent::new("p1", DiscreteEventKind::HelpRequested, t(2)))
            .unwrap();
        assert_eq!(path(&events), vec![(Stable, EmergencyDispatched)]);

        f.monitor.settle().await.unwrap();
        let calls = f.provider.calls();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].1.contains("The patient is asking for help"));
        assert!(!calls[0].1.contains("Automatic alert"));
    }

    #[tokio::test]
    async fn test_second_critical_sample_inside_cooldown_is_suppressed() {
        let mut f = fixture(ScriptedCallProvider::new());

        f.monitor.process_snapshot(reading(150.0, 98.0, 36.8, t(0))).unwrap();
        f.monitor.settle().await.unwrap();

        let events = f.monitor.process_snapshot(reading(150.0, 98.0, 36.8, t(10))).unwrap();
        assert_eq!(
            path(&events),
            vec![(Cooldown, Critical), (Critical, EmergencyDispatched), (EmergencyDispatched, Cooldown)]
        );
        assert_eq!(f.monitor.in_flight(), 0);
        assert_eq!(f.provider.call_count(), 1);

        let status = f.handle.status().patient(&PatientId::new("p1")).unwrap();
        assert_eq!(status.last_outcome, Some(DispatchOutcome::Suppressed));
        assert_eq!(status.total_calls, 1);

        f.monitor.finish().await.unwrap();
        let outcomes: Vec<String> = f.repository.dispatches().into_iter().map(|d| d.outcome).collect();
        assert_eq!(outcomes, vec!["sent".to_string(), "suppressed".to_string()]);
    }

    #[tokio::test]
    async fn test_persistent_critical_condition_calls_once_per_cooldown() {
        let mut f = fixture(ScriptedCallProvider::new());

        for n in 0..40 {
            f.monitor.process_snapshot(reading(150.0, 88.0, 36.8, t(n * 3))).unwrap();
            f.monitor.settle().await.unwrap();
        }

        // 40 samples, 3 s apart, all inside one 300 s window
        assert_eq!(f.provider.call_count(), 1);
    }

    #[tokio::test]
    async fn test_fall_is_sent_despite_recent_vitals_call() {
        let mut f = fixture(ScriptedCallProvider::new());

        f.monitor.process_snapshot(reading(150.0, 98.0, 36.8, t(0))).unwrap();
        f.monitor.settle().await.unwrap();

        let events = f
            .monitor
            .process_event(DiscreteEvent::new("p1", DiscreteEventKind::FallDetected, t(1)))
            .unwrap();
        assert_eq!(path(&events), vec![(Cooldown, EmergencyDispatched)]);
        f.monitor.settle().await.unwrap();

        assert_eq!(f.provider.call_count(), 2);
        let status = f.handle.status().patient(&PatientId::new("p1")).unwrap();
        assert_eq!(status.last_outcome, Some(DispatchOutcome::Sent));
        assert_eq!(status.total_calls, 2);
    }

    #[tokio::test]
    async fn test_invalid_reading_keeps_last_state() {
        let mut f = fixture(ScriptedCallProvider::new());
        f.monitor.process_snapshot(reading(125.0, 98.0, 36.8, t(0))).unwrap();
        assert_eq!(f.monitor.risk_state(&PatientId::new("p1")), Some(Warning));

        let result = f.monitor.process_snapshot(reading(-4.0, 98.0, 36.8, t(3)));
        assert!(matches!(result, Err(EngineError::InvalidReading { .. })));
        assert_eq!(f.monitor.risk_state(&PatientId::new("p1")), Some(Warning));
        let kept = f.monitor.last_assessment(&PatientId::new("p1")).unwrap();
        assert_eq!(kept.metrics, vec![crate::entities::Metric::HeartRate]);

        let alerts = f.handle.status().alerts();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].kind, AlertKind::InvalidReading);

        f.monitor.finish().await.unwrap();
        assert_eq!(f.repository.vitals().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_dispatch_still_reaches_cooldown() {
        let mut f = fixture(ScriptedCallProvider::with_responses(vec![
            Err(CallError::Rejected("invalid number".to_string())),
            Err(CallError::Rejected("invalid number".to_string())),
        ]));

        f.monitor.process_snapshot(reading(150.0, 98.0, 36.8, t(0))).unwrap();
        let completed = f.monitor.settle().await.unwrap();
        assert_eq!(path(&completed), vec![(EmergencyDispatched, Cooldown)]);

        let board = f.handle.status();
        let status = board.patient(&PatientId::new("p1")).unwrap();
        assert_eq!(status.last_outcome, Some(DispatchOutcome::Failed));
        assert_eq!(status.total_calls, 0);
        assert_eq!(board.alerts()[0].kind, AlertKind::DispatchFailed);
        assert!(board.last_dispatch_failure().is_some());

        // monitoring continues and the next emergency is not debounced
        f.monitor.process_snapshot(reading(150.0, 98.0, 36.8, t(10))).unwrap();
        f.monitor.settle().await.unwrap();
        assert_eq!(f.provider.call_count(), 3);
        assert_eq!(
            board.patient(&PatientId::new("p1")).unwrap().last_outcome,
            Some(DispatchOutcome::Sent)
        );
    }

    #[tokio::test]
    async fn test_slow_call_does_not_block_sampling() {
        let mut f = fixture(ScriptedCallProvider::new().with_delay(Duration::from_millis(300)));

        f.monitor.process_snapshot(reading(150.0, 98.0, 36.8, t(0))).unwrap();
        assert_eq!(f.monitor.in_flight(), 1);

        let other = VitalSnapshot::new("p2", 75.0, 97.0, 36.8, t(1));
        assert!(f.monitor.process_snapshot(other).unwrap().is_empty());
        assert_eq!(f.provider.call_count(), 0);
        assert_eq!(f.monitor.risk_state(&PatientId::new("p1")), Some(EmergencyDispatched));

        f.monitor.settle().await.unwrap();
        assert_eq!(f.provider.call_count(), 1);
        assert_eq!(f.monitor.risk_state(&PatientId::new("p1")), Some(Cooldown));
    }

    #[tokio::test]
    async fn test_panicking_provider_is_reported_as_failure() {
        let mut f = fixture(ScriptedCallProvider::new().panicking());

        f.monitor
            .process_event(DiscreteEvent::new("p1", DiscreteEventKind::FallDetected, t(0)))
            .unwrap();
        f.monitor.settle().await.unwrap();

        assert_eq!(f.monitor.risk_state(&PatientId::new("p1")), Some(Cooldown));
        let alerts = f.handle.status().alerts();
        assert_eq!(alerts[0].kind, AlertKind::DispatchFailed);
        assert!(alerts[0].message.contains("panicked"));
    }

    #[tokio::test]
    async fn test_logged_escalations_round_trip() {
        let mut f = fixture(ScriptedCallProvider::new());

        let mut events = f.monitor.process_snapshot(reading(145.0, 98.0, 36.8, t(0))).unwrap();
        events.extend(f.monitor.settle().await.unwrap());
        f.monitor.finish().await.unwrap();

        let stored: Vec<EscalationEvent> = f
            .repository
            .escalations()
            .into_iter()
            .map(|record| convert_to_domain_escalation(record).unwrap())
            .collect();
        assert_eq!(stored, events);
        assert_eq!(stored.len(), 4);
        assert_eq!(stored[2].cause().category(), Some(CauseCategory::Vitals));
    }

    #[tokio::test]
    async fn test_run_processes_pushed_inputs_until_shutdown() {
        let f = fixture(ScriptedCallProvider::new());
        let handle = f.handle.clone();
        let task = tokio::spawn(f.monitor.run(None));

        handle.submit_vitals(reading(150.0, 98.0, 36.8, Utc::now())).await.unwrap();

        let p1 = PatientId::new("p1");
        for _ in 0..200 {
            if handle.status().patient(&p1).map(|s| s.risk_state) == Some(Cooldown) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(handle.status().patient(&p1).unwrap().risk_state, Cooldown);

        handle.shutdown();
        task.await.unwrap().unwrap();

        assert!(!handle.status().is_running());
        assert!(handle.is_closed());
        assert_eq!(
            handle.submit_vitals(reading(75.0, 97.0, 36.8, Utc::now())).await,
            Err(EngineError::MonitorClosed)
        );
        assert_eq!(f.provider.call_count(), 1);
        assert_eq!(f.repository.vitals().len(), 1);
    }

    #[tokio::test]
    async fn test_shutdown_waits_for_in_flight_call() {
        let f = fixture(ScriptedCallProvider::new().with_delay(Duration::from_millis(200)));
        let handle = f.handle.clone();

        let mut monitor = f.monitor;
        monitor
            .process_event(DiscreteEvent::new("p1", DiscreteEventKind::HelpRequested, Utc::now()))
            .unwrap();
        assert_eq!(monitor.in_flight(), 1);

        handle.shutdown();
        monitor.run(None).await.unwrap();

        assert_eq!(f.provider.call_count(), 1);
        assert_eq!(
            handle.status().patient(&PatientId::new("p1")).unwrap().risk_state,
            Cooldown
        );
        assert_eq!(f.repository.dispatches().len(), 1);
    }

    #[tokio::test]
    async fn test_future_dated_fall_does_not_silence_later_falls() {
        let mut f = fixture(ScriptedCallProvider::new());
        let now = Utc::now();

        f.monitor
            .process_event(DiscreteEvent::new("p1", DiscreteEventKind::FallDetected, now + chrono::Duration::days(1)))
            .unwrap();
        f.monitor.settle().await.unwrap();

        let events = f
            .monitor
            .process_event(DiscreteEvent::new("p1", DiscreteEventKind::FallDetected, now + chrono::Duration::hours(1)))
            .unwrap();
        assert_eq!(path(&events), vec![(Cooldown, EmergencyDispatched)]);
        f.monitor.settle().await.unwrap();

        assert_eq!(f.provider.call_count(), 2);
        let status = f.handle.status().patient(&PatientId::new("p1")).unwrap();
        assert_eq!(status.last_outcome, Some(DispatchOutcome::Sent));
        assert_eq!(status.total_calls, 2);
    }

    #[tokio::test]
    async fn test_shutdown_applies_input_queued_before_it() {
        let f = fixture(ScriptedCallProvider::new());
        let handle = f.handle.clone();

        handle
            .report_event(DiscreteEvent::new("p1", DiscreteEventKind::HelpRequested, Utc::now()))
            .await
            .unwrap();
        handle.shutdown();
        f.monitor.run(None).await.unwrap();

        assert_eq!(f.provider.call_count(), 1);
        assert_eq!(
            handle.status().patient(&PatientId::new("p1")).unwrap().risk_state,
            Cooldown
        );
        let logged: Vec<(String, String)> = f
            .repository
            .escalations()
            .into_iter()
            .map(|e| (e.from_state, e.to_state))
            .collect();
        assert_eq!(
            logged,
            vec![
                ("stable".to_string(), "emergency_dispatched".to_string()),
                ("emergency_dispatched".to_string(), "cooldown".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_input_for_unmonitored_patient_is_refused() {
        let mut f = fixture(ScriptedCallProvider::new());
        let ghost = PatientId::new("ghost");

        assert!(!f.handle.is_monitored(&ghost));
        assert_eq!(
            f.handle.submit_vitals(VitalSnapshot::new("ghost", 150.0, 98.0, 36.8, t(0))).await,
            Err(EngineError::UnknownPatient("ghost".to_string()))
        );
        assert_eq!(
            f.handle
                .report_event(DiscreteEvent::new("ghost", DiscreteEventKind::FallDetected, t(0)))
                .await,
            Err(EngineError::UnknownPatient("ghost".to_string()))
        );

        let direct = f.monitor.process_snapshot(VitalSnapshot::new("ghost", 150.0, 98.0, 36.8, t(0)));
        assert_eq!(direct, Err(EngineError::UnknownPatient("ghost".to_string())));
        assert!(f.monitor.risk_state(&ghost).is_none());
        assert!(f.handle.status().patient(&ghost).is_none());
        assert_eq!(f.provider.call_count(), 0);
    }

    #[tokio::test]
    async fn test_lost_dispatch_task_completes_as_failed() {
        let mut f = fixture(ScriptedCallProvider::new().with_delay(Duration::from_secs(30)));

        f.monitor
            .process_event(DiscreteEvent::new("p1", DiscreteEventKind::FallDetected, t(0)))
            .unwrap();
        f.monitor.inflight.abort_all();

        let completed = f.monitor.settle().await.unwrap();
        assert_eq!(path(&completed), vec![(EmergencyDispatched, Cooldown)]);
        let board = f.handle.status();
        assert_eq!(
            board.patient(&PatientId::new("p1")).unwrap().last_outcome,
            Some(DispatchOutcome::Failed)
        );
        assert_eq!(board.alerts()[0].kind, AlertKind::DispatchFailed);

        // the category is free again, so the next fall starts a new call
        let events = f
            .monitor
            .process_event(DiscreteEvent::new("p1", DiscreteEventKind::FallDetected, t(5)))
            .unwrap();
        assert_eq!(path(&events), vec![(Cooldown, EmergencyDispatched)]);
        assert_eq!(f.monitor.in_flight(), 1);
        f.monitor.inflight.abort_all();
        f.monitor.settle().await.unwrap();
    }

    #[tokio::test]
    async fn test_run_samples_source_and_reconnects() {
        let f = fixture(ScriptedCallProvider::new());
        let handle = f.handle.clone();
        let source = ScriptedVitalSource::new(vec![
            Err(SourceError::Disconnected("serial port closed".to_string())),
            Ok(vec![reading(75.0, 97.0, 36.8, Utc::now())]),
        ]);
        let reconnects = source.reconnects();

        let mut monitor = f.monitor;
        let mut boxed: Box<dyn VitalSource> = Box::new(source);
        monitor.poll_source(boxed.as_mut()).await.unwrap();
        assert_eq!(reconnects.load(std::sync::atomic::Ordering::SeqCst), 1);

        let task = tokio::spawn(monitor.run(Some(boxed)));
        let p1 = PatientId::new("p1");
        for _ in 0..200 {
            if handle.status().patient(&p1).and_then(|s| s.last_snapshot).is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        handle.shutdown();
        task.await.unwrap().unwrap();

        assert_eq!(f.repository.vitals().len(), 1);
        assert_eq!(handle.status().patient(&p1).unwrap().risk_state, Stable);
    }
}
