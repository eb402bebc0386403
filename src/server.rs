use crate::app::run_service::{RunHandle, RunService};
use crate::error::PipelineError;
use axum::{
    extract::{Path, State},
    http::{Method, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use hyper::Server;
use std::net::SocketAddr;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

/// Health check endpoint
async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "bulk-record-validator",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

struct ApiError(PipelineError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            PipelineError::Listing(_) => StatusCode::SERVICE_UNAVAILABLE,
            PipelineError::UnknownRun(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(serde_json::json!({ "error": self.0.to_string() }))).into_response()
    }
}

async fn start_run(State(service): State<RunService>) -> Result<Response, ApiError> {
    let handle = service.start_run().await.map_err(ApiError)?;
    let body = serde_json::json!({
        "run_id": handle,
        "status_url": format!("/runs/{}", handle),
    });
    Ok((StatusCode::ACCEPTED, Json(body)).into_response())
}

async fn run_status(
    State(service): State<RunService>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let handle: RunHandle = id.parse().map_err(ApiError)?;
    let status = service.status(&handle).map_err(ApiError)?;
    Ok(Json(status).into_response())
}

/// Create the HTTP router for starting runs and polling their status
pub fn create_server(service: RunService) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/runs", post(start_run))
        .route("/runs/:id", get(run_status))
        .with_state(service)
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(cors))
}

/// Start the HTTP server on the specified port
pub async fn start_server(service: RunService, port: u16) -> anyhow::Result<()> {
    let app = create_server(service);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("HTTP server running on http://localhost:{}", port);
    info!("Start a run with: POST http://localhost:{}/runs", port);
    Server::bind(&addr).serve(app.into_make_service()).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::ports::SchemaValidatorPort;
    use crate::infra::memory::{InMemoryAuditStore, InMemoryRecordStore};
    use crate::pipeline::Orchestrator;
    use crate::types::ValidationOutcome;
    use axum::body::Body;
    use axum::http::Request;
    use serde_json::Value;
    use std::sync::Arc;
    use tower::ServiceExt;

    struct AlwaysValid;

    impl SchemaValidatorPort for AlwaysValid {
        fn validate(&self, _record: &Value) -> ValidationOutcome {
            ValidationOutcome::valid()
        }
    }

    fn app_with(store: Arc<InMemoryRecordStore>) -> (Router, RunService) {
        let orchestrator = Orchestrator::new(
            store,
            Arc::new(InMemoryAuditStore::new()),
            Arc::new(AlwaysValid),
            2,
            "/customerTechnicalHeader/correlationId",
        );
        let service = RunService::new(Arc::new(orchestrator));
        (create_server(service.clone()), service)
    }

    async fn json_body(response: Response) -> Value {
        let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_reports_healthy() {
        let (app, _) = app_with(Arc::new(InMemoryRecordStore::new()));
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["status"], "healthy");
    }

    #[tokio::test]
    async fn post_runs_accepts_and_status_is_queryable() {
        let store = Arc::new(InMemoryRecordStore::new());
        store.add_input("a.json", r#"[{"customerTechnicalHeader":{"correlationId":"A"}}]"#);
        let (app, service) = app_with(store);

        let response = app
            .clone()
            .oneshot(Request::builder().method("POST").uri("/runs").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let body = json_body(response).await;
        let run_id = body["run_id"].as_str().unwrap().to_string();
        assert_eq!(body["status_url"], format!("/runs/{}", run_id));

        service.wait(&run_id.parse().unwrap()).await.unwrap();
        let response = app
            .oneshot(Request::builder().uri(format!("/runs/{}", run_id)).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let status = json_body(response).await;
        assert_eq!(status["state"], "completed");
        assert_eq!(status["summary"]["records_valid"], 1);
    }

    #[tokio::test]
    async fn listing_failure_maps_to_service_unavailable() {
        let store = Arc::new(InMemoryRecordStore::new());
        store.fail_listing();
        let (app, _) = app_with(store);

        let response = app
            .oneshot(Request::builder().method("POST").uri("/runs").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn unknown_run_is_not_found() {
        let (app, _) = app_with(Arc::new(InMemoryRecordStore::new()));
        for id in ["not-a-uuid", "7f0c3c1e-9a53-4a43-a0de-2b0b1a1f7c55"] {
            let response = app
                .clone()
                .oneshot(Request::builder().uri(format!("/runs/{}", id)).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::NOT_FOUND);
        }
    }
}
