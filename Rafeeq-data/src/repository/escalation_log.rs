use async_trait::async_trait;
use tracing::{debug, error};

use crate::database::DatabasePool;
use crate::models::escalation_log::{DispatchRecord, EscalationRecord, VitalRecord};
use super::errors::RepositoryError;
use super::in_memory::InMemoryStorage;
use super::storage::DatabaseStorage;

/// Repository trait for the append-only escalation log
#[async_trait]
pub trait EscalationLogRepositoryTrait: Send + Sync {
    /// Append a state transition
    async fn append_escalation(&self, record: EscalationRecord) -> Result<(), RepositoryError>;

    /// Append an accepted vital snapshot
    async fn append_vital(&self, record: VitalRecord) -> Result<(), RepositoryError>;

    /// Append the outcome of a call dispatch
    async fn append_dispatch(&self, record: DispatchRecord) -> Result<(), RepositoryError>;

    /// Most recent escalation events for a patient, oldest first
    async fn get_escalations(&self, patient_id: &str, limit: Option<usize>) -> Result<Vec<EscalationRecord>, RepositoryError>;

    /// Most recent vital readings for a patient, oldest first
    async fn get_vitals(&self, patient_id: &str, limit: Option<usize>) -> Result<Vec<VitalRecord>, RepositoryError>;

    /// Most recent dispatch records for a patient, oldest first
    async fn get_dispatches(&self, patient_id: &str, limit: Option<usize>) -> Result<Vec<DispatchRecord>, RepositoryError>;
}

/// Repository for the escalation log.
/// Writes go to SQLite when a pool is configured and fall back to memory otherwise.
#[derive(Debug, Clone, Default)]
pub struct EscalationLogRepository {
    pool: Option<DatabasePool>,
    /// In-memory storage for when database is not available
    storage: InMemoryStorage,
}

impl EscalationLogRepository {
    /// Create a new repository backed by the given pool
    pub fn new(pool: Option<DatabasePool>) -> Self {
        Self {
            pool,
            storage: InMemoryStorage::new(),
        }
    }

    /// Create a repository that only keeps records in memory
    pub fn in_memory() -> Self {
        Self::new(None)
    }

    /// Pool used by this repository, if any
    pub fn pool(&self) -> Option<&DatabasePool> {
        self.pool.as_ref()
    }
}

#[async_trait]
impl EscalationLogRepositoryTrait for EscalationLogRepository {
    async fn append_escalation(&self, record: EscalationRecord) -> Result<(), RepositoryError> {
        match &self.pool {
            Some(pool) => match DatabaseStorage::append_escalation(pool, &record).await {
                Ok(()) => Ok(()),
                Err(e) => {
                    error!("Failed to store escalation event in database: {}", e);
                    // Fall back to in-memory storage
                    self.storage.append_escalation(&record).await
                }
            },
            None => {
                debug!("Database not configured, storing escalation event {} in memory", record.id);
                self.storage.append_escalation(&record).await
            }
        }
    }

    async fn append_vital(&self, record: VitalRecord) -> Result<(), RepositoryError> {
        match &self.pool {
            Some(pool) => match DatabaseStorage::append_vital(pool, &record).await {
                Ok(()) => Ok(()),
                Err(e) => {
                    error!("Failed to store vital reading in database: {}", e);
                    self.storage.append_vital(&record).await
                }
            },
            None => {
                debug!("Database not configured, storing vital reading {} in memory", record.id);
                self.storage.append_vital(&record).await
            }
        }
    }

    async fn append_dispatch(&self, record: DispatchRecord) -> Result<(), RepositoryError> {
        match &self.pool {
            Some(pool) => match DatabaseStorage::append_dispatch(pool, &record).await {
                Ok(()) => Ok(()),
                Err(e) => {
                    error!("Failed to store dispatch record in database: {}", e);
                    self.storage.append_dispatch(&record).await
                }
            },
            None => {
                debug!("Database not configured, storing dispatch record {} in memory", record.id);
                self.storage.append_dispatch(&record).await
            }
        }
    }

    async fn get_escalations(&self, patient_id: &str, limit: Option<usize>) -> Result<Vec<EscalationRecord>, RepositoryError> {
        match &self.pool {
            Some(pool) => match DatabaseStorage::get_escalations(pool, patient_id, limit).await {
                Ok(records) => Ok(records),
                Err(e) => {
                    error!("Failed to get escalation events from database: {}", e);
                    self.storage.get_escalations(patient_id, limit).await
                }
            },
            None => self.storage.get_escalations(patient_id, limit).await,
        }
    }

    async fn get_vitals(&self, patient_id: &str, limit: Option<usize>) -> Result<Vec<VitalRecord>, RepositoryError> {
        match &self.pool {
            Some(pool) => match DatabaseStorage::get_vitals(pool, patient_id, limit).await {
                Ok(records) => Ok(records),
                Err(e) => {
                    error!("Failed to get vital readings from database: {}", e);
                    self.storage.get_vitals(patient_id, limit).await
                }
            },
            None => self.storage.get_vitals(patient_id, limit).await,
        }
    }

    async fn get_dispatches(&self, patient_id: &str, limit: Option<usize>) -> Result<Vec<DispatchRecord>, RepositoryError> {
        match &self.pool {
            Some(pool) => match DatabaseStorage::get_dispatches(pool, patient_id, limit).await {
                Ok(records) => Ok(records),
                Err(e) => {
                    error!("Failed to get dispatch records from database: {}", e);
                    self.storage.get_dispatches(patient_id, limit).await
                }
            },
            None => self.storage.get_dispatches(patient_id, limit).await,
        }
    }
}

/// Mock escalation log repository for testing
#[cfg(any(test, feature = "mock"))]
pub mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Mock implementation of EscalationLogRepository for testing.
    /// Appends can be made to fail a fixed number of times.
    #[derive(Debug, Default)]
    pub struct MockEscalationLogRepository {
        escalations: Mutex<Vec<EscalationRecord>>,
        vitals: Mutex<Vec<VitalRecord>>,
        dispatches: Mutex<Vec<DispatchRecord>>,
        failures_remaining: AtomicUsize,
        append_attempts: AtomicUsize,
    }

    impl MockEscalationLogRepository {
        /// Create a new empty mock repository
        pub fn new() -> Self {
            Self::default()
        }

        /// Make the next `count` appends fail with `Unavailable`
        pub fn fail_next(&self, count: usize) {
            self.failures_remaining.store(count, Ordering::SeqCst);
        }

        /// Number of append calls seen, failed ones included
        pub fn append_attempts(&self) -> usize {
            self.append_attempts.load(Ordering::SeqCst)
        }

        /// Snapshot of stored escalation records across all patients
        pub fn escalations(&self) -> Vec<EscalationRecord> {
            self.escalations.lock().map(|v| v.clone()).unwrap_or_default()
        }

        /// Snapshot of stored vital records across all patients
        pub fn vitals(&self) -> Vec<VitalRecord> {
            self.vitals.lock().map(|v| v.clone()).unwrap_or_default()
        }

        /// Snapshot of stored dispatch records across all patients
        pub fn dispatches(&self) -> Vec<DispatchRecord> {
            self.dispatches.lock().map(|v| v.clone()).unwrap_or_default()
        }

        fn check_failure(&self) -> Result<(), RepositoryError> {
            self.append_attempts.fetch_add(1, Ordering::SeqCst);
            let injected = self
                .failures_remaining
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if injected {
                Err(RepositoryError::Unavailable("injected failure".to_string()))
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl EscalationLogRepositoryTrait for MockEscalationLogRepository {
        async fn append_escalation(&self, record: EscalationRecord) -> Result<(), RepositoryError> {
            self.check_failure()?;
            self.escalations.lock()?.push(record);
            Ok(())
        }

        async fn append_vital(&self, record: VitalRecord) -> Result<(), RepositoryError> {
            self.check_failure()?;
            self.vitals.lock()?.push(record);
            Ok(())
        }

        async fn append_dispatch(&self, record: DispatchRecord) -> Result<(), RepositoryError> {
            self.check_failure()?;
            self.dispatches.lock()?.push(record);
            Ok(())
        }

        async fn get_escalations(&self, patient_id: &str, limit: Option<usize>) -> Result<Vec<EscalationRecord>, RepositoryError> {
            let store = self.escalations.lock()?;
            Ok(super::super::in_memory::tail(store.iter().filter(|r| r.patient_id == patient_id), limit))
        }

        async fn get_vitals(&self, patient_id: &str, limit: Option<usize>) -> Result<Vec<VitalRecord>, RepositoryError> {
            let store = self.vitals.lock()?;
            Ok(super::super::in_memory::tail(store.iter().filter(|r| r.patient_id == patient_id), limit))
        }

        async fn get_dispatches(&self, patient_id: &str, limit: Option<usize>) -> Result<Vec<DispatchRecord>, RepositoryError> {
            let store = self.dispatches.lock()?;
            Ok(super::super::in_memory::tail(store.iter().filter(|r| r.patient_id == patient_id), limit))
        }
    }
}
