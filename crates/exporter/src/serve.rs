//! HTTP surface — the scrape endpoint plus health/info routes.

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::error;

use crate::snapshot;
use crate::state::SharedState;

pub fn router(state: SharedState) -> Router {
    let mut router = Router::new().route(&state.config.metrics_path, get(metrics_handler));
    if state.config.metrics_path != "/" {
        router = router.route("/", get(root_handler));
    }
    if state.config.metrics_path != "/health" {
        router = router.route("/health", get(health_handler));
    }
    router.layer(TraceLayer::new_for_http()).with_state(state)
}

async fn root_handler(State(state): State<SharedState>) -> Json<serde_json::Value> {
    Json(json!({
        "name": "rancher-lifecycle-exporter",
        "version": env!("CARGO_PKG_VERSION"),
        "project": state.project.name,
        "endpoints": {
            "metrics": state.config.metrics_path,
            "health": "/health",
        }
    }))
}

async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({"status": "ok"})))
}

/// The scrape: refresh the snapshot gauges, then expose the registry.
/// Collection failures have already degraded to warnings inside the
/// snapshot pass; only a registry encoding failure turns into a 500.
async fn metrics_handler(State(state): State<SharedState>) -> Response {
    snapshot::refresh(&state).await;

    match state.metrics.render() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics encoding failed").into_response()
        }
    }
}
