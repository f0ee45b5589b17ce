use axum::{
    extract::{Json, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use rafeeq_domain::entities::{DiscreteEvent, PatientId, VitalSnapshot};
use rafeeq_domain::EngineError;
use tracing::{error, info, instrument, warn};
use validator::Validate;

use crate::api::routes::AppState;
use crate::entities::common::{AcceptedResponse, ErrorResponse};
use crate::entities::patients::{
    AlertResponse, EscalationEntry, EscalationQueryParams, PatientStatusResponse, ReportEventRequest,
    SubmitVitalsRequest,
};

/// Default number of log entries returned
const DEFAULT_ESCALATION_LIMIT: usize = 100;

/// How far ahead of the server clock a client timestamp may be
const MAX_FUTURE_SKEW_SECONDS: i64 = 60;

/// Resolve the input time, refusing timestamps from the future
fn input_timestamp(timestamp: Option<DateTime<Utc>>) -> Result<DateTime<Utc>, Response> {
    let now = Utc::now();
    match timestamp {
        None => Ok(now),
        Some(at) if at - now > chrono::Duration::seconds(MAX_FUTURE_SKEW_SECONDS) => {
            warn!(timestamp = %at, "Rejected input dated in the future");
            let details = serde_json::json!({ "timestamp": at.to_rfc3339(), "server_time": now.to_rfc3339() });
            Err(ErrorResponse::validation_error("timestamp is ahead of the server clock", Some(details))
                .into_response())
        }
        Some(at) => Ok(at),
    }
}

fn rejected_input(e: EngineError) -> Response {
    match e {
        EngineError::UnknownPatient(id) => {
            info!(patient_id = %id, "Input for unmonitored patient");
            ErrorResponse::not_found("patient").into_response()
        }
        e => {
            warn!(error = %e, "Input rejected, monitoring loop is closed");
            ErrorResponse::unavailable("The monitoring loop is not accepting input").into_response()
        }
    }
}

/// Status of every monitored patient
#[utoipa::path(
    get,
    path = "/api/v1/patients",
    responses(
        (status = 200, description = "Patient statuses ordered by id", body = [PatientStatusResponse]),
    ),
    tag = "patients"
)]
#[instrument(skip(state))]
pub async fn list_patients(State(state): State<AppState>) -> Json<Vec<PatientStatusResponse>> {
    let patients = state
        .monitor
        .status()
        .patients()
        .into_iter()
        .map(PatientStatusResponse::from)
        .collect();
    Json(patients)
}

/// Status of one patient
#[utoipa::path(
    get,
    path = "/api/v1/patients/{id}",
    params(
        ("id" = String, Path, description = "Patient identifier")
    ),
    responses(
        (status = 200, description = "Patient found", body = PatientStatusResponse),
        (status = 404, description = "Patient is not monitored", body = ErrorResponse),
    ),
    tag = "patients"
)]
#[instrument(skip(state))]
pub async fn get_patient(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<PatientStatusResponse>, Response> {
    match state.monitor.status().patient(&PatientId::new(id.as_str())) {
        Some(status) => Ok(Json(status.into())),
        None => {
            info!(patient_id = %id, "Unknown patient requested");
            Err(ErrorResponse::not_found("patient").into_response())
        }
    }
}

/// Push a vital-sign reading to the monitor
///
/// Readings are evaluated asynchronously; implausible values show up in the
/// alert feed as `invalid_reading`.
#[utoipa::path(
    post,
    path = "/api/v1/patients/{id}/vitals",
    params(
        ("id" = String, Path, description = "Patient identifier")
    ),
    request_body = SubmitVitalsRequest,
    responses(
        (status = 202, description = "Reading queued", body = AcceptedResponse),
        (status = 400, description = "Timestamp ahead of the server clock", body = ErrorResponse),
        (status = 404, description = "Patient is not monitored", body = ErrorResponse),
        (status = 503, description = "Monitor is shutting down", body = ErrorResponse),
    ),
    tag = "patients"
)]
#[instrument(skip(state, request))]
pub async fn submit_vitals(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<SubmitVitalsRequest>,
) -> Result<impl IntoResponse, Response> {
    let snapshot = VitalSnapshot::new(
        id.as_str(),
        request.heart_rate,
        request.spo2,
        request.temperature,
        input_timestamp(request.timestamp)?,
    );

    state.monitor.submit_vitals(snapshot).await.map_err(rejected_input)?;
    Ok((StatusCode::ACCEPTED, Json(AcceptedResponse::new(&id))))
}

/// Report a fall or a help request
#[utoipa::path(
    post,
    path = "/api/v1/patients/{id}/events",
    params(
        ("id" = String, Path, description = "Patient identifier")
    ),
    request_body = ReportEventRequest,
    responses(
        (status = 202, description = "Event queued", body = AcceptedResponse),
        (status = 400, description = "Timestamp ahead of the server clock", body = ErrorResponse),
        (status = 404, description = "Patient is not monitored", body = ErrorResponse),
        (status = 503, description = "Monitor is shutting down", body = ErrorResponse),
    ),
    tag = "patients"
)]
#[instrument(skip(state, request))]
pub async fn report_event(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<ReportEventRequest>,
) -> Result<impl IntoResponse, Response> {
    info!(patient_id = %id, kind = ?request.kind, "Discrete event reported");
    let event = DiscreteEvent::new(id.as_str(), request.kind.into(), input_timestamp(request.timestamp)?);

    state.monitor.report_event(event).await.map_err(rejected_input)?;
    Ok((StatusCode::ACCEPTED, Json(AcceptedResponse::new(&id))))
}

/// Logged risk-state transitions of one patient, oldest first
#[utoipa::path(
    get,
    path = "/api/v1/patients/{id}/escalations",
    params(
        ("id" = String, Path, description = "Patient identifier"),
        EscalationQueryParams
    ),
    responses(
        (status = 200, description = "Most recent transitions", body = [EscalationEntry]),
        (status = 400, description = "Invalid query", body = ErrorResponse),
        (status = 500, description = "Log could not be read", body = ErrorResponse),
    ),
    tag = "patients"
)]
#[instrument(skip(state))]
pub async fn get_escalations(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<EscalationQueryParams>,
) -> Result<Json<Vec<EscalationEntry>>, Response> {
    if let Err(errors) = params.validate() {
        let details = serde_json::to_value(&errors).ok();
        return Err(ErrorResponse::validation_error("Invalid query parameters", details).into_response());
    }

    let limit = params.limit.unwrap_or(DEFAULT_ESCALATION_LIMIT);
    match state.repository.get_escalations(&id, Some(limit)).await {
        Ok(records) => Ok(Json(records.into_iter().map(EscalationEntry::from).collect())),
        Err(e) => {
            error!(patient_id = %id, error = %e, "Failed to read escalation log");
            Err(ErrorResponse::internal_error().into_response())
        }
    }
}

/// Operator alert feed, oldest first
#[utoipa::path(
    get,
    path = "/api/v1/alerts",
    responses(
        (status = 200, description = "Recent operator alerts", body = [AlertResponse]),
    ),
    tag = "alerts"
)]
#[instrument(skip(state))]
pub async fn list_alerts(State(state): State<AppState>) -> Json<Vec<AlertResponse>> {
    Json(state.monitor.status().alerts().into_iter().map(AlertResponse::from).collect())
}
