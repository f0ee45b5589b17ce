use axum::{routing::get, Json, Router};
use utoipa::OpenApi;

/// Serve the OpenAPI document as JSON
pub fn openapi_routes() -> Router {
    Router::new().route("/api-docs/openapi.json", get(|| async { Json(ApiDoc::openapi()) }))
}

// API Documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        // Health endpoints
        crate::api::handlers::health::health_check,

        // Patient endpoints
        crate::api::handlers::patients::list_patients,
        crate::api::handlers::patients::get_patient,
        crate::api::handlers::patients::submit_vitals,
        crate::api::handlers::patients::report_event,
        crate::api::handlers::patients::get_escalations,
        crate::api::handlers::patients::list_alerts
    ),
    components(
        schemas(
            // Entities
            crate::entities::common::ErrorResponse,
            crate::entities::common::AcceptedResponse,
            crate::entities::patients::PatientStatusResponse,
            crate::entities::patients::VitalsResponse,
            crate::entities::patients::SeveritiesResponse,
            crate::entities::patients::SubmitVitalsRequest,
            crate::entities::patients::ReportEventRequest,
            crate::entities::patients::EventKind,
            crate::entities::patients::EscalationEntry,
            crate::entities::patients::AlertResponse,

            // Health handlers
            crate::api::handlers::health::HealthResponse,
            crate::api::handlers::health::ComponentStatus,
            crate::api::handlers::health::ComponentHealthStatus
        )
    ),
    tags(
        (name = "health", description = "Health check endpoint"),
        (name = "patients", description = "Patient status, pushed readings and discrete events"),
        (name = "alerts", description = "Operator alert feed")
    ),
    info(
        title = "Rafeeq Monitor API",
        version = "0.1.0",
        description = "Vital-sign risk classification and emergency escalation",
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        ),
    ),
    servers(
        (url = "/", description = "Local development server")
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_doc_generation() {
        let openapi = ApiDoc::openapi();

        assert_eq!(openapi.info.title, "Rafeeq Monitor API");
        assert_eq!(openapi.info.version, "0.1.0");

        let tags = openapi.tags.as_ref().unwrap();
        assert!(tags.iter().any(|tag| tag.name == "patients"));

        assert!(openapi.paths.paths.contains_key("/health"));
        assert!(openapi.paths.paths.contains_key("/api/v1/patients"));
        assert!(openapi.paths.paths.contains_key("/api/v1/patients/{id}"));
        assert!(openapi.paths.paths.contains_key("/api/v1/patients/{id}/vitals"));
        assert!(openapi.paths.paths.contains_key("/api/v1/patients/{id}/events"));
        assert!(openapi.paths.paths.contains_key("/api/v1/patients/{id}/escalations"));
        assert!(openapi.paths.paths.contains_key("/api/v1/alerts"));
    }
}
