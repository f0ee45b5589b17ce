//! Read-only projection of the monitor for dashboards and health checks

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::entities::{
    DispatchOutcome, EmotionalState, MetricSeverities, PatientId, PatientRiskState, VitalSnapshot,
};

/// Alerts kept in the operator feed
pub const ALERT_FEED_CAPACITY: usize = 100;

/// Latest known status of one patient
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatientStatus {
    pub patient_id: PatientId,
    pub risk_state: PatientRiskState,
    pub emotional_state: Option<EmotionalState>,
    pub severities: Option<MetricSeverities>,
    pub last_snapshot: Option<VitalSnapshot>,
    pub last_outcome: Option<DispatchOutcome>,
    /// Calls that reached the caregiver
    pub total_calls: u64,
    pub updated_at: DateTime<Utc>,
}

impl PatientStatus {
    fn new(patient_id: PatientId, at: DateTime<Utc>) -> Self {
        Self {
            patient_id,
            risk_state: PatientRiskState::Stable,
            emotional_state: None,
            severities: None,
            last_snapshot: None,
            last_outcome: None,
            total_calls: 0,
            updated_at: at,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    DispatchFailed,
    InvalidReading,
    PersistenceFailed,
}

/// Something an operator should look at
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OperatorAlert {
    pub kind: AlertKind,
    pub patient_id: Option<PatientId>,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug)]
struct BoardState {
    patients: BTreeMap<PatientId, PatientStatus>,
    alerts: VecDeque<OperatorAlert>,
    running: bool,
    last_dispatch_failure: Option<DateTime<Utc>>,
}

/// Shared status board. Written by the monitoring loop, read by everyone else.
#[derive(Debug, Clone)]
pub struct StatusBoard {
    inner: Arc<RwLock<BoardState>>,
}

impl Default for StatusBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusBoard {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(BoardState {
                patients: BTreeMap::new(),
                alerts: VecDeque::new(),
                running: true,
                last_dispatch_failure: None,
            })),
        }
    }

    // A poisoned board still holds the last consistent projection
    fn read(&self) -> RwLockReadGuard<'_, BoardState> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, BoardState> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn patient(&self, patient_id: &PatientId) -> Option<PatientStatus> {
        self.read().patients.get(patient_id).cloned()
    }

    /// All patients ordered by id
    pub fn patients(&self) -> Vec<PatientStatus> {
        self.read().patients.values().cloned().collect()
    }

    /// Operator alerts, oldest first
    pub fn alerts(&self) -> Vec<OperatorAlert> {
        self.read().alerts.iter().cloned().collect()
    }

    pub fn is_running(&self) -> bool {
        self.read().running
    }

    pub fn last_dispatch_failure(&self) -> Option<DateTime<Utc>> {
        self.read().last_dispatch_failure
    }

    pub(crate) fn set_running(&self, running: bool) {
        self.write().running = running;
    }

    /// Apply a change to one patient's status, creating it on first use
    pub(crate) fn update<F>(&self, patient_id: &PatientId, at: DateTime<Utc>, change: F)
    where
        F: FnOnce(&mut PatientStatus),
    {
        let mut state = self.write();
        let status = state
            .patients
            .entry(patient_id.clone())
            .or_insert_with(|| PatientStatus::new(patient_id.clone(), at));
        change(status);
        status.updated_at = at;
    }

    pub(crate) fn raise(&self, alert: OperatorAlert) {
        let mut state = self.write();
        if alert.kind == AlertKind::DispatchFailed {
            state.last_dispatch_failure = Some(alert.timestamp);
        }
        if state.alerts.len() == ALERT_FEED_CAPACITY {
            state.alerts.pop_front();
        }
        state.alerts.push_back(alert);
    }
}
