use axum::{routing::get, routing::post, Extension, Router};
use rafeeq_data::repository::EscalationLogRepositoryTrait;
use rafeeq_domain::services::MonitorHandle;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::debug;

use crate::api::handlers::{health, patients};
use crate::openapi::openapi_routes;

/// Shared state of the patient routes
#[derive(Clone)]
pub struct AppState {
    /// Handle into the running monitoring loop
    pub monitor: MonitorHandle,
    /// Read side of the escalation log
    pub repository: Arc<dyn EscalationLogRepositoryTrait>,
}

/// Create the application router
pub fn create_app(state: AppState, health_service: health::HealthService) -> Router {
    debug!("Creating application router");

    let api_routes = Router::new()
        .route("/patients", get(patients::list_patients))
        .route("/patients/:id", get(patients::get_patient))
        .route("/patients/:id/vitals", post(patients::submit_vitals))
        .route("/patients/:id/events", post(patients::report_event))
        .route("/patients/:id/escalations", get(patients::get_escalations))
        .route("/alerts", get(patients::list_alerts))
        .with_state(state);

    debug!("API routes configured");

    let public_routes = Router::new()
        .route("/health", get(health::health_check))
        .layer(Extension(health_service));

    health::initialize_server_start_time();

    Router::new()
        .merge(public_routes)
        .nest("/api/v1", api_routes)
        .merge(openapi_routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
