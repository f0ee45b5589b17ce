use std::sync::{Arc, Mutex};

use crate::models::escalation_log::{DispatchRecord, EscalationRecord, VitalRecord};
use super::errors::RepositoryError;

/// In-memory storage for the escalation log
#[derive(Debug, Clone, Default)]
pub struct InMemoryStorage {
    escalations: Arc<Mutex<Vec<EscalationRecord>>>,
    vitals: Arc<Mutex<Vec<VitalRecord>>>,
    dispatches: Arc<Mutex<Vec<DispatchRecord>>>,
}

impl InMemoryStorage {
    /// Create a new in-memory storage
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an escalation record
    pub async fn append_escalation(&self, record: &EscalationRecord) -> Result<(), RepositoryError> {
        self.escalations.lock()?.push(record.clone());
        Ok(())
    }

    /// Append a vital reading
    pub async fn append_vital(&self, record: &VitalRecord) -> Result<(), RepositoryError> {
        self.vitals.lock()?.push(record.clone());
        Ok(())
    }

    /// Append a dispatch record
    pub async fn append_dispatch(&self, record: &DispatchRecord) -> Result<(), RepositoryError> {
        self.dispatches.lock()?.push(record.clone());
        Ok(())
    }

    /// Most recent escalation records for a patient, oldest first
    pub async fn get_escalations(&self, patient_id: &str, limit: Option<usize>) -> Result<Vec<EscalationRecord>, RepositoryError> {
        let store = self.escalations.lock()?;
        Ok(tail(store.iter().filter(|r| r.patient_id == patient_id), limit))
    }

    /// Most recent vital readings for a patient, oldest first
    pub async fn get_vitals(&self, patient_id: &str, limit: Option<usize>) -> Result<Vec<VitalRecord>, RepositoryError> {
        let store = self.vitals.lock()?;
        Ok(tail(store.iter().filter(|r| r.patient_id == patient_id), limit))
    }

    /// Most recent dispatch records for a patient, oldest first
    pub async fn get_dispatches(&self, patient_id: &str, limit: Option<usize>) -> Result<Vec<DispatchRecord>, RepositoryError> {
        let store = self.dispatches.lock()?;
        Ok(tail(store.iter().filter(|r| r.patient_id == patient_id), limit))
    }
}

/// Keep the last `limit` items of an insertion-ordered sequence
pub(crate) fn tail<'a, T: Clone + 'a>(items: impl Iterator<Item = &'a T>, limit: Option<usize>) -> Vec<T> {
    let all: Vec<T> = items.cloned().collect();
    let skip = limit.map(|l| all.len().saturating_sub(l)).unwrap_or(0);
    all.into_iter().skip(skip).collect()
}
