use crate::infra::AppState;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Extension;
use axum::Json;
use enterprise_registry::workflows::registration::{
    registration_router, Directory, NotificationSender, RegistrationRepository, RegistryServices,
    SequenceRepository,
};
use serde_json::json;
use std::sync::Arc;

pub(crate) fn with_registry_routes<R, D, N>(services: Arc<RegistryServices<R, D, N>>) -> axum::Router
where
    R: RegistrationRepository + SequenceRepository + 'static,
    D: Directory + 'static,
    N: NotificationSender + 'static,
{
    registration_router(services)
        .route("/health", axum::routing::get(healthcheck))
        .route("/ready", axum::routing::get(readiness_endpoint))
        .route("/metrics", axum::routing::get(metrics_endpoint))
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::{
        seeded_agent_id, InMemoryDirectory, InMemoryRegistry, LoggingNotifier, DEMO_FOUNDER,
        DEMO_MANAGER,
    };
    use axum::body::Body;
    use axum::http::Request;
    use enterprise_registry::workflows::registration::{
        AgentRole, RegistrySettings, SystemClock,
    };
    use serde_json::Value;
    use std::sync::atomic::AtomicBool;
    use tower::ServiceExt;

    fn router(ready: bool) -> axum::Router {
        let services = Arc::new(RegistryServices::new(
            Arc::new(InMemoryRegistry::default()),
            Arc::new(InMemoryDirectory::default()),
            Arc::new(LoggingNotifier::default()),
            Arc::new(SystemClock::default()),
            RegistrySettings::default(),
        ));
        let recorder = metrics_exporter_prometheus::PrometheusBuilder::new().build_recorder();
        let state = AppState {
            readiness: Arc::new(AtomicBool::new(ready)),
            metrics: Arc::new(recorder.handle()),
        };
        with_registry_routes(services).layer(Extension(state))
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), 64 * 1024)
            .await
            .expect("read body");
        serde_json::from_slice(&bytes).expect("json body")
    }

    #[tokio::test]
    async fn healthcheck_reports_ok() {
        let Json(body) = healthcheck().await;
        assert_eq!(body, json!({ "status": "ok" }));
    }

    #[tokio::test]
    async fn readiness_reflects_flag() {
        let response = router(false)
            .oneshot(Request::get("/ready").body(Body::empty()).unwrap())
            .await
            .expect("route executes");
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let response = router(true)
            .oneshot(Request::get("/ready").body(Body::empty()).unwrap())
            .await
            .expect("route executes");
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn registration_routes_are_mounted_next_to_probes() {
        let app = router(true);
        let submission = json!({
            "legal_name": "Sahel Conseil",
            "capital": "500 000",
            "kind": "company",
            "creation_status": "pending",
            "step": "reception",
            "legal_form": "SARL",
            "primary_activity": "conseil",
            "locality_code": "NKC-TVZ",
            "participants": [
                {
                    "person_id": DEMO_FOUNDER,
                    "role": "founder",
                    "percentage": "70",
                    "start_date": "2026-01-01",
                    "end_date": "2031-01-01"
                },
                {
                    "person_id": DEMO_MANAGER,
                    "role": "manager",
                    "percentage": "30",
                    "start_date": "2026-01-01",
                    "end_date": "2031-01-01"
                }
            ]
        });

        let response = app
            .clone()
            .oneshot(
                Request::post("/api/v1/registrations")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(submission.to_string()))
                    .unwrap(),
            )
            .await
            .expect("route executes");
        assert_eq!(response.status(), StatusCode::CREATED);
        let created = body_json(response).await;
        assert_eq!(created["registration"]["total_fee"], json!("14500"));

        let reception = seeded_agent_id(AgentRole::ReceptionAgent);
        let response = app
            .oneshot(
                Request::get(format!("/api/v1/agents/{reception}/registrations"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .expect("route executes");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["total"], json!(0));
    }
}
