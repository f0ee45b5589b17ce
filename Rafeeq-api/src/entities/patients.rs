use chrono::{DateTime, Utc};
use rafeeq_data::models::EscalationRecord;
use rafeeq_domain::entities::{DiscreteEventKind, MetricSeverities, VitalSnapshot};
use rafeeq_domain::services::{OperatorAlert, PatientStatus};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

/// A vital-sign reading as published to the dashboard
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct VitalsResponse {
    /// Heart rate in beats per minute
    pub heart_rate: f64,
    /// Blood oxygen saturation in percent
    pub spo2: f64,
    /// Body temperature in degrees Celsius
    pub temperature: f64,
    pub timestamp: DateTime<Utc>,
}

impl From<&VitalSnapshot> for VitalsResponse {
    fn from(snapshot: &VitalSnapshot) -> Self {
        Self {
            heart_rate: snapshot.heart_rate,
            spo2: snapshot.spo2,
            temperature: snapshot.temperature,
            timestamp: snapshot.timestamp,
        }
    }
}

/// Severity of each metric in the latest valid reading
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SeveritiesResponse {
    /// "normal", "warning" or "critical"
    pub heart_rate: String,
    pub spo2: String,
    pub temperature: String,
}

impl From<&MetricSeverities> for SeveritiesResponse {
    fn from(severities: &MetricSeverities) -> Self {
        Self {
            heart_rate: severities.heart_rate.as_str().to_string(),
            spo2: severities.spo2.as_str().to_string(),
            temperature: severities.temperature.as_str().to_string(),
        }
    }
}

/// Current status of one monitored patient
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PatientStatusResponse {
    pub patient_id: String,
    /// stable, warning, critical, emergency_dispatched or cooldown
    pub risk_state: String,
    /// stable, mild_stress, moderate_distress or critical_distress
    #[serde(skip_serializing_if = "Option::is_none")]
    pub emotional_state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severities: Option<SeveritiesResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_reading: Option<VitalsResponse>,
    /// sent, suppressed or failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_dispatch: Option<String>,
    /// Calls that reached the caregiver
    pub total_calls: u64,
    pub updated_at: DateTime<Utc>,
}

impl From<PatientStatus> for PatientStatusResponse {
    fn from(status: PatientStatus) -> Self {
        Self {
            patient_id: status.patient_id.to_string(),
            risk_state: status.risk_state.as_str().to_string(),
            emotional_state: status.emotional_state.map(|s| s.as_str().to_string()),
            severities: status.severities.as_ref().map(SeveritiesResponse::from),
            last_reading: status.last_snapshot.as_ref().map(VitalsResponse::from),
            last_dispatch: status.last_outcome.map(|o| o.as_str().to_string()),
            total_calls: status.total_calls,
            updated_at: status.updated_at,
        }
    }
}

/// Request payload for pushing a reading
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SubmitVitalsRequest {
    pub heart_rate: f64,
    pub spo2: f64,
    pub temperature: f64,
    /// When the reading was taken. Defaults to the time of receipt.
    pub timestamp: Option<DateTime<Utc>>,
}

/// Discrete event kinds accepted from devices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    FallDetected,
    HelpRequested,
}

impl From<EventKind> for DiscreteEventKind {
    fn from(kind: EventKind) -> Self {
        match kind {
            EventKind::FallDetected => DiscreteEventKind::FallDetected,
            EventKind::HelpRequested => DiscreteEventKind::HelpRequested,
        }
    }
}

/// Request payload for reporting a fall or help request
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ReportEventRequest {
    pub kind: EventKind,
    /// When the event happened. Defaults to the time of receipt.
    pub timestamp: Option<DateTime<Utc>>,
}

/// Query parameters for the escalation log
#[derive(Debug, Deserialize, Validate, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct EscalationQueryParams {
    /// Most recent entries to return (default: 100, max: 1000)
    #[validate(range(min = 1, max = 1000, message = "Limit must be between 1 and 1000"))]
    pub limit: Option<usize>,
}

/// One logged risk-state transition
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct EscalationEntry {
    pub id: String,
    pub patient_id: String,
    pub from_state: String,
    pub to_state: String,
    /// Cause of the transition as logged
    #[schema(value_type = Object)]
    pub cause: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    pub timestamp: String,
}

impl From<EscalationRecord> for EscalationEntry {
    fn from(record: EscalationRecord) -> Self {
        let cause = serde_json::from_str(&record.cause).unwrap_or(serde_json::Value::String(record.cause));
        Self {
            id: record.id,
            patient_id: record.patient_id,
            from_state: record.from_state,
            to_state: record.to_state,
            cause,
            category: record.category,
            timestamp: record.timestamp,
        }
    }
}

/// Entry of the operator alert feed
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AlertResponse {
    /// dispatch_failed, invalid_reading or persistence_failed
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patient_id: Option<String>,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl From<OperatorAlert> for AlertResponse {
    fn from(alert: OperatorAlert) -> Self {
        let kind = serde_json::to_value(alert.kind)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default();
        Self {
            kind,
            patient_id: alert.patient_id.map(|id| id.to_string()),
            message: alert.message,
            timestamp: alert.timestamp,
        }
    }
}
