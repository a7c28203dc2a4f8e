//! Insightful REST API
//!
//! HTTP API layer, built with Axum.
//!
//! # Endpoints
//!
//! - `GET /` - Banner
//! - `POST /add` - Ingest one event or an array (`?collection=` optional)
//! - `POST /query` - Execute a list or chart query
//!
//! ## Health
//! - `GET /health/live` - Liveness probe
//! - `GET /health/ready` - Readiness probe
//! - `GET /health` - Full health status
//!
//! # Example
//!
//! ```rust,ignore
//! use insightful::api::{serve, ApiConfig, AppState};
//! use insightful::ingest::Ingestor;
//! use insightful::storage::{Engine, StorageConfig};
//! use std::collections::HashMap;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let engine = Arc::new(Engine::open(StorageConfig::new("./data")).await?);
//!     let ingestor = Arc::new(Ingestor::new(Arc::clone(&engine), HashMap::new()));
//!     let config = ApiConfig::default();
//!
//!     let state = AppState::new(engine, ingestor, config.clone());
//!     serve(state, &config).await?;
//!
//!     Ok(())
//! }
//! ```

pub mod dto;
pub mod error;
pub mod routes;
pub mod state;

pub use error::{ApiError, ApiResult};
pub use state::{ApiConfig, AppState};

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Build the API router with all routes and middleware
pub fn build_router(state: AppState) -> Router {
    let health_routes = Router::new()
        .route("/live", get(routes::health::liveness))
        .route("/ready", get(routes::health::readiness))
        .route("/", get(routes::health::full_health));

    let body_limit = state.config.max_body_size;
    let shared_state = Arc::new(state);

    Router::new()
        .route("/", get(routes::banner))
        .route("/add", post(routes::add::add_events))
        .route("/query", post(routes::query::execute_query))
        .nest("/health", health_routes)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(shared_state)
}

/// Start the API server
///
/// Flushes the engine once the server has stopped.
pub async fn serve(state: AppState, config: &ApiConfig) -> Result<(), ApiError> {
    let engine = Arc::clone(&state.engine);
    let router = build_router(state);

    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Insightful API listening on {}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| ApiError::Internal(format!("Server error: {}", e)))?;

    engine.shutdown().await?;
    tracing::info!("Insightful API shut down gracefully");
    Ok(())
}

/// Wait for shutdown signal
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::Ingestor;
    use crate::schema::{Schema, Validator};
    use crate::storage::{CollectionSpec, Engine, StorageConfig};
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
        response::Response,
    };
    use serde_json::{json, Value};
    use std::collections::HashMap;
    use tempfile::tempdir;
    use tower::util::ServiceExt;

    async fn create_test_app() -> (Router, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let schema = Schema::events().unwrap();
        let spec = CollectionSpec::new("events").skeleton(schema.skeleton());
        let config = StorageConfig::new(dir.path()).with_collections(vec![spec]);
        let engine = Arc::new(Engine::open(config).await.unwrap());

        let mut validators = HashMap::new();
        validators.insert("events".to_string(), Validator::new(schema).unwrap());
        let ingestor = Arc::new(Ingestor::new(Arc::clone(&engine), validators));

        let state = AppState::new(engine, ingestor, ApiConfig::default());
        (build_router(state), dir)
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn json_body(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health_live() {
        let (app, _dir) = create_test_app().await;

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/health/live")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_health_full() {
        let (app, _dir) = create_test_app().await;

        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["collections"][0]["name"], "events");
    }

    #[tokio::test]
    async fn test_banner() {
        let (app, _dir) = create_test_app().await;

        let response = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_add_event() {
        let (app, _dir) = create_test_app().await;
        let event = json!({"event": {"action": "signup", "when": "2020-01-01T00:00:00Z"}});

        let response = app.oneshot(post_json("/add", event)).await.unwrap();

        assert_eq!(response.status(), StatusCode::CREATED);
        let body = json_body(response).await;
        assert_eq!(body["accepted"], 1);
    }

    #[tokio::test]
    async fn test_add_invalid_json() {
        let (app, _dir) = create_test_app().await;

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/add")
                    .header("Content-Type", "application/json")
                    .body(Body::from("not json"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_add_unknown_collection() {
        let (app, _dir) = create_test_app().await;

        let response = app
            .oneshot(post_json("/add?collection=orders", json!({})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_query_validation_error() {
        let (app, _dir) = create_test_app().await;
        let body = json!({"collection": "events", "type": "list", "to": "2020-01-02"});

        let response = app.oneshot(post_json("/query", body)).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["type"], "ValidationError");
        assert_eq!(body["details"][0]["path"], "from");
    }

    #[tokio::test]
    async fn test_query_range_exceeded() {
        let (app, _dir) = create_test_app().await;
        let body = json!({
            "collection": "events",
            "type": "chart",
            "from": "2020-01-01T00:00:00Z",
            "to": "2020-01-01T00:05:01Z",
            "x": {"type": "dateHistogram", "field": "event.when", "interval": "second"},
            "y": {"agg": "count"}
        });

        let response = app.oneshot(post_json("/query", body)).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["error"]["code"], "RANGE_EXCEEDED");
    }
}
