#[cfg(test)]
mod health_tests {
    use crate::api::handlers::health::{health_check, initialize_server_start_time, HealthResponse, HealthService};
    use axum::body::to_bytes;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;
    use axum::Extension;
    use rafeeq_domain::health::ComponentStatus;
    use rafeeq_domain::testing::MockHealthService;
    use std::sync::Arc;

    async fn call(service: MockHealthService) -> (StatusCode, HealthResponse) {
        initialize_server_start_time();
        let service: HealthService = Arc::new(service);

        let response = health_check(Extension(service)).await.into_response();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn test_healthy_service_returns_ok() {
        let (status, body) = call(MockHealthService::new()).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.status, "ok");
        assert_eq!(body.components.database.status, "ok");
        assert_eq!(body.components.monitor.status, "ok");
        assert!(body.components.additional.is_none());
        assert!(body.uptime.is_some());
    }

    #[tokio::test]
    async fn test_degraded_database_returns_service_unavailable() {
        let (status, body) = call(MockHealthService::new().with_degraded_database()).await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body.status, "degraded");
        assert_eq!(body.components.database.status, "degraded");
        assert_eq!(
            body.components.database.message.as_deref(),
            Some("Escalation log kept in memory")
        );
    }

    #[tokio::test]
    async fn test_unhealthy_database_returns_internal_error() {
        let (status, body) = call(MockHealthService::new().with_unhealthy_database()).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body.status, "error");
        assert_eq!(body.components.database.status, "error");
    }

    #[tokio::test]
    async fn test_additional_components_are_reported() {
        let service = MockHealthService::new().with_component(
            "call_provider",
            ComponentStatus::Degraded,
            Some("dry run".to_string()),
        );
        let (_, body) = call(service).await;

        let additional = body.components.additional.expect("additional components");
        assert_eq!(additional["call_provider"]["status"], "degraded");
        assert_eq!(additional["call_provider"]["message"], "dry run");
    }
}
