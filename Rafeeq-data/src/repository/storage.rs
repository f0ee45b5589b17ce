use rusqlite::params;
use tracing::debug;

use crate::database::DatabasePool;
use crate::models::escalation_log::{DispatchRecord, EscalationRecord, VitalRecord};
use super::errors::RepositoryError;

/// Database storage operations for the escalation log
pub struct DatabaseStorage;

impl DatabaseStorage {
    /// Store an escalation record in the database
    pub async fn append_escalation(pool: &DatabasePool, record: &EscalationRecord) -> Result<(), RepositoryError> {
        debug!("Storing escalation event in database: id={}", record.id);

        let conn = pool.get()?;
        conn.execute(
            "INSERT INTO escalation_events
             (id, patient_id, from_state, to_state, cause, category, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                &record.id,
                &record.patient_id,
                &record.from_state,
                &record.to_state,
                &record.cause,
                &record.category,
                &record.timestamp,
            ],
        )?;

        Ok(())
    }

    /// Store a vital reading in the database
    pub async fn append_vital(pool: &DatabasePool, record: &VitalRecord) -> Result<(), RepositoryError> {
        debug!("Storing vital reading in database: id={}", record.id);

        let conn = pool.get()?;
        conn.execute(
            "INSERT INTO vital_readings
             (id, patient_id, heart_rate, spo2, temperature, emotional_state, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                &record.id,
                &record.patient_id,
                record.heart_rate,
                record.spo2,
                record.temperature,
                &record.emotional_state,
                &record.timestamp,
            ],
        )?;

        Ok(())
    }

    /// Store a dispatch record in the database
    pub async fn append_dispatch(pool: &DatabasePool, record: &DispatchRecord) -> Result<(), RepositoryError> {
        debug!("Storing dispatch record in database: id={}", record.id);

        let conn = pool.get()?;
        conn.execute(
            "INSERT INTO dispatch_records
             (id, patient_id, event_id, category, outcome, attempts, reference, detail, message, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                &record.id,
                &record.patient_id,
                &record.event_id,
                &record.category,
                &record.outcome,
                record.attempts,
                &record.reference,
                &record.detail,
                &record.message,
                &record.timestamp,
            ],
        )?;

        Ok(())
    }

    /// Get the most recent escalation records for a patient, oldest first
    pub async fn get_escalations(
        pool: &DatabasePool,
        patient_id: &str,
        limit: Option<usize>,
    ) -> Result<Vec<EscalationRecord>, RepositoryError> {
        debug!("Getting escalation events from database: patient_id={}", patient_id);

        let conn = pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT id, patient_id, from_state, to_state, cause, category, timestamp FROM (
                SELECT seq, id, patient_id, from_state, to_state, cause, category, timestamp
                FROM escalation_events WHERE patient_id = ?1
                ORDER BY seq DESC LIMIT ?2
             ) ORDER BY seq ASC",
        )?;

        let rows = stmt.query_map(params![patient_id, sql_limit(limit)], |row| {
            Ok(EscalationRecord {
                id: row.get(0)?,
                patient_id: row.get(1)?,
                from_state: row.get(2)?,
                to_state: row.get(3)?,
                cause: row.get(4)?,
                category: row.get(5)?,
                timestamp: row.get(6)?,
            })
        })?;

        let mut result = Vec::new();
        for record in rows {
            result.push(record?);
        }

        Ok(result)
    }

    /// Get the most recent vital readings for a patient, oldest first
    pub async fn get_vitals(
        pool: &DatabasePool,
        patient_id: &str,
        limit: Option<usize>,
    ) -> Result<Vec<VitalRecord>, RepositoryError> {
        debug!("Getting vital readings from database: patient_id={}", patient_id);

        let conn = pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT id, patient_id, heart_rate, spo2, temperature, emotional_state, timestamp FROM (
                SELECT seq, id, patient_id, heart_rate, spo2, temperature, emotional_state, timestamp
                FROM vital_readings WHERE patient_id = ?1
                ORDER BY seq DESC LIMIT ?2
             ) ORDER BY seq ASC",
        )?;

        let rows = stmt.query_map(params![patient_id, sql_limit(limit)], |row| {
            Ok(VitalRecord {
                id: row.get(0)?,
                patient_id: row.get(1)?,
                heart_rate: row.get(2)?,
                spo2: row.get(3)?,
                temperature: row.get(4)?,
                emotional_state: row.get(5)?,
                timestamp: row.get(6)?,
            })
        })?;

        let mut result = Vec::new();
        for record in rows {
            result.push(record?);
        }

        Ok(result)
    }

    /// Get the most recent dispatch records for a patient, oldest first
    pub async fn get_dispatches(
        pool: &DatabasePool,
        patient_id: &str,
        limit: Option<usize>,
    ) -> Result<Vec<DispatchRecord>, RepositoryError> {
        debug!("Getting dispatch records from database: patient_id={}", patient_id);

        let conn = pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT id, patient_id, event_id, category, outcome, attempts, reference, detail, message, timestamp FROM (
                SELECT seq, id, patient_id, event_id, category, outcome, attempts, reference, detail, message, timestamp
                FROM dispatch_records WHERE patient_id = ?1
                ORDER BY seq DESC LIMIT ?2
             ) ORDER BY seq ASC",
        )?;

        let rows = stmt.query_map(params![patient_id, sql_limit(limit)], |row| {
            Ok(DispatchRecord {
                id: row.get(0)?,
                patient_id: row.get(1)?,
                event_id: row.get(2)?,
                category: row.get(3)?,
                outcome: row.get(4)?,
                attempts: row.get(5)?,
                reference: row.get(6)?,
                detail: row.get(7)?,
                message: row.get(8)?,
                timestamp: row.get(9)?,
            })
        })?;

        let mut result = Vec::new();
        for record in rows {
            result.push(record?);
        }

        Ok(result)
    }
}

/// SQLite treats a negative LIMIT as "no limit"
fn sql_limit(limit: Option<usize>) -> i64 {
    limit.map(|l| l.min(i64::MAX as usize) as i64).unwrap_or(-1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{initialize_database_pool, DatabaseConfig};

    fn escalation(patient_id: &str, n: u32) -> EscalationRecord {
        EscalationRecord {
            id: format!("evt-{}-{}", patient_id, n),
            patient_id: patient_id.to_string(),
            from_state: "stable".to_string(),
            to_state: "warning".to_string(),
            cause: r#"{"fall_detected":null}"#.to_string(),
            category: Some("fall".to_string()),
            timestamp: format!("2024-03-01T10:00:0{}.123456789Z", n),
        }
    }

    #[test]
    fn test_escalations_round_trip_through_sqlite() {
        let pool = initialize_database_pool(&DatabaseConfig::in_memory()).unwrap();

        tokio_test::block_on(async {
            for n in 0..4 {
                DatabaseStorage::append_escalation(&pool, &escalation("p1", n)).await.unwrap();
            }
            DatabaseStorage::append_escalation(&pool, &escalation("p2", 0)).await.unwrap();

            let all = DatabaseStorage::get_escalations(&pool, "p1", None).await.unwrap();
            assert_eq!(all.len(), 4);
            assert_eq!(all[0], escalation("p1", 0));

            let recent = DatabaseStorage::get_escalations(&pool, "p1", Some(2)).await.unwrap();
            assert_eq!(recent, vec![escalation("p1", 2), escalation("p1", 3)]);
        });
    }

    #[test]
    fn test_duplicate_event_id_is_rejected() {
        let pool = initialize_database_pool(&DatabaseConfig::in_memory()).unwrap();

        tokio_test::block_on(async {
            DatabaseStorage::append_escalation(&pool, &escalation("p1", 0)).await.unwrap();
            let duplicate = DatabaseStorage::append_escalation(&pool, &escalation("p1", 0)).await;
            assert!(matches!(duplicate, Err(RepositoryError::Sqlite(_))));
        });
    }

    #[test]
    fn test_dispatch_records_keep_all_fields() {
        let pool = initialize_database_pool(&DatabaseConfig::in_memory()).unwrap();
        let record = DispatchRecord {
            id: "d-1".to_string(),
            patient_id: "p1".to_string(),
            event_id: "evt-1".to_string(),
            category: "vitals".to_string(),
            outcome: "sent".to_string(),
            attempts: 2,
            reference: Some("CA123".to_string()),
            detail: None,
            message: Some("دقات القلب 150".to_string()),
            timestamp: "2024-03-01T10:00:00Z".to_string(),
        };

        tokio_test::block_on(async {
            DatabaseStorage::append_dispatch(&pool, &record).await.unwrap();
            let stored = DatabaseStorage::get_dispatches(&pool, "p1", Some(10)).await.unwrap();
            assert_eq!(stored, vec![record.clone()]);
        });
    }
}
