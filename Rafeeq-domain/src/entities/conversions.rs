use chrono::{DateTime, SecondsFormat, Utc};
use rafeeq_data::models::escalation_log::{DispatchRecord, EscalationRecord, VitalRecord};
use uuid::Uuid;

use super::escalation::{DispatchReport, EscalationCause, EscalationEvent};
use super::risk::{EmotionalState, PatientRiskState};
use super::vitals::{PatientId, VitalSnapshot};
use crate::error::EngineError;

/// Conversion functions between domain entities and data models
/// These functions follow the pattern convert_to_[target_layer]_[model_name]

/// Helper function to safely parse a string ID to UUID
pub fn parse_string_to_uuid(id: &str) -> Result<Uuid, String> {
    Uuid::parse_str(id).map_err(|_| format!("Invalid UUID format: {}", id))
}

/// Timestamps are stored with nanosecond precision so a re-read is exact
pub fn format_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| format!("Invalid timestamp {}: {}", raw, e))
}

/// Convert from domain entity to data model for an escalation event
pub fn convert_to_data_escalation(event: &EscalationEvent) -> Result<EscalationRecord, EngineError> {
    let cause = serde_json::to_string(event.cause())
        .map_err(|e| EngineError::PersistenceFailed(format!("cannot encode cause: {}", e)))?;

    Ok(EscalationRecord {
        id: event.id().to_string(),
        patient_id: event.patient_id().to_string(),
        from_state: event.from().as_str().to_string(),
        to_state: event.to().as_str().to_string(),
        cause,
        category: event.cause().category().map(|c| c.as_str().to_string()),
        timestamp: format_timestamp(&event.timestamp()),
    })
}

/// Convert from data model to domain entity for an escalation event
pub fn convert_to_domain_escalation(record: EscalationRecord) -> Result<EscalationEvent, EngineError> {
    let corrupt = |detail: String| EngineError::PersistenceFailed(format!("corrupt escalation record {}: {}", record.id, detail));

    let id = parse_string_to_uuid(&record.id).map_err(corrupt)?;
    let from = record.from_state.parse::<PatientRiskState>().map_err(corrupt)?;
    let to = record.to_state.parse::<PatientRiskState>().map_err(corrupt)?;
    let cause: EscalationCause = serde_json::from_str(&record.cause).map_err(|e| corrupt(e.to_string()))?;
    let timestamp = parse_timestamp(&record.timestamp).map_err(corrupt)?;

    Ok(EscalationEvent::from_parts(
        id,
        PatientId::new(record.patient_id.clone()),
        from,
        to,
        cause,
        timestamp,
    ))
}

/// Convert from domain entity to data model for an accepted vital snapshot
pub fn convert_to_data_vital(snapshot: &VitalSnapshot, emotional_state: Option<EmotionalState>) -> VitalRecord {
    VitalRecord {
        id: Uuid::new_v4().to_string(),
        patient_id: snapshot.patient_id.to_string(),
        heart_rate: snapshot.heart_rate,
        spo2: snapshot.spo2,
        temperature: snapshot.temperature,
        emotional_state: emotional_state.map(|s| s.as_str().to_string()),
        timestamp: format_timestamp(&snapshot.timestamp),
    }
}

/// Convert from domain entity to data model for a dispatch report
pub fn convert_to_data_dispatch(report: &DispatchReport) -> DispatchRecord {
    DispatchRecord {
        id: Uuid::new_v4().to_string(),
        patient_id: report.patient_id.to_string(),
        event_id: report.event_id.to_string(),
        category: report.category.as_str().to_string(),
        outcome: report.outcome.as_str().to_string(),
        attempts: report.attempts,
        reference: report.reference.clone(),
        detail: report.detail.clone(),
        message: report.message.clone(),
        timestamp: format_timestamp(&report.timestamp),
    }
}
