//! Background writer for the escalation log
//!
//! Appends never block the monitoring loop: records go through an unbounded
//! channel to a single task that writes them in order, retrying with backoff.

use chrono::Utc;
use rafeeq_data::repository::EscalationLogRepositoryTrait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::entities::conversions::{convert_to_data_dispatch, convert_to_data_escalation, convert_to_data_vital};
use crate::entities::{DispatchReport, EmotionalState, EscalationEvent, PatientId, VitalSnapshot};
use crate::error::EngineError;
use crate::services::status::{AlertKind, OperatorAlert, StatusBoard};

/// One record for the append-only log
#[derive(Debug, Clone, PartialEq)]
pub enum LogRecord {
    Escalation(EscalationEvent),
    Vitals {
        snapshot: VitalSnapshot,
        emotional_state: Option<EmotionalState>,
    },
    Dispatch(DispatchReport),
}

impl LogRecord {
    fn patient_id(&self) -> &PatientId {
        match self {
            LogRecord::Escalation(event) => event.patient_id(),
            LogRecord::Vitals { snapshot, .. } => &snapshot.patient_id,
            LogRecord::Dispatch(report) => &report.patient_id,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            LogRecord::Escalation(_) => "escalation",
            LogRecord::Vitals { .. } => "vitals",
            LogRecord::Dispatch(_) => "dispatch",
        }
    }
}

/// Retry budget for log appends
#[derive(Debug, Clone, PartialEq)]
pub struct PersistencePolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl Default for PersistencePolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_millis(500),
        }
    }
}

pub struct PersistenceWriter {
    sender: mpsc::UnboundedSender<LogRecord>,
    task: JoinHandle<()>,
}

impl PersistenceWriter {
    /// Start the writer task. Must be called inside a Tokio runtime.
    pub fn spawn(
        repository: Arc<dyn EscalationLogRepositoryTrait>,
        policy: PersistencePolicy,
        board: StatusBoard,
    ) -> Self {
        let (sender, mut receiver) = mpsc::unbounded_channel::<LogRecord>();

        let task = tokio::spawn(async move {
            while let Some(record) = receiver.recv().await {
                if let Err(e) = append_with_retry(repository.as_ref(), &policy, &record).await {
                    error!(
                        patient_id = %record.patient_id(),
                        record = record.kind(),
                        error = %e,
                        "Dropping log record"
                    );
                    board.raise(OperatorAlert {
                        kind: AlertKind::PersistenceFailed,
                        patient_id: Some(record.patient_id().clone()),
                        message: e.to_string(),
                        timestamp: Utc::now(),
                    });
                }
            }
            debug!("Persistence writer drained");
        });

        Self { sender, task }
    }

    /// Queue a record; never waits on storage
    pub fn record(&self, record: LogRecord) {
        if let Err(e) = self.sender.send(record) {
            error!(record = e.0.kind(), "Persistence writer is gone, record lost");
        }
    }

    /// Stop accepting records and wait until everything queued is written
    pub async fn close(self) {
        drop(self.sender);
        if let Err(e) = self.task.await {
            error!(error = %e, "Persistence writer task failed");
        }
    }
}

async fn append_with_retry(
    repository: &dyn EscalationLogRepositoryTrait,
    policy: &PersistencePolicy,
    record: &LogRecord,
) -> Result<(), EngineError> {
    let max_attempts = policy.max_attempts.max(1);
    let mut last_error = None;

    for attempt in 1..=max_attempts {
        let result = match record {
            LogRecord::Escalation(event) => {
                let data = convert_to_data_escalation(event)?;
                repository.append_escalation(data).await
            }
            LogRecord::Vitals {
                snapshot,
                emotional_state,
            } => repository.append_vital(convert_to_data_vital(snapshot, *emotional_state)).await,
            LogRecord::Dispatch(report) => repository.append_dispatch(convert_to_data_dispatch(report)).await,
        };

        match result {
            Ok(()) => return Ok(()),
            Err(e) => {
                warn!(
                    patient_id = %record.patient_id(),
                    record = record.kind(),
                    attempt,
                    error = %e,
                    "Log append failed"
                );
                last_error = Some(e);
            }
        }

        if attempt < max_attempts {
            tokio::time::sleep(policy.backoff * attempt).await;
        }
    }

    Err(EngineError::PersistenceFailed(format!(
        "{} record not stored after {} attempt(s): {}",
        record.kind(),
        max_attempts,
        last_error.map(|e| e.to_string()).unwrap_or_default()
    )))
}
