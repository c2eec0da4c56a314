//! HTTP API surface consumed by the map frontend
//!
//! Thin axum layer over the aggregation service: a status endpoint plus one
//! proxy endpoint per target. Data responses carry the served snapshot's
//! timestamp in an `X-Last-Updated` header; any per-request failure becomes
//! a 500 with a JSON error envelope while the rest of the service keeps
//! running. Everything outside `/api` falls back to the static frontend
//! bundle.

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::SecondsFormat;
use serde_json::json;
use tower_http::services::ServeDir;
use tracing::error;

use crate::fetch::Fetcher;
use crate::service::AggregationService;

/// Builds the application router around a shared service instance
pub fn router<F: Fetcher + 'static>(service: Arc<AggregationService<F>>) -> Router {
    let static_dir = service.config().static_dir.clone();

    Router::new()
        .route("/api/status", get(status::<F>))
        .route("/api/air-quality", get(air_quality::<F>))
        .route("/api/air-quality-time", get(air_quality_time::<F>))
        .route("/api/traffic", get(traffic::<F>))
        .fallback_service(ServeDir::new(static_dir))
        .with_state(service)
}

/// Artifact presence and age for every target, no fetching involved
async fn status<F: Fetcher + 'static>(
    State(service): State<Arc<AggregationService<F>>>,
) -> impl IntoResponse {
    Json(service.status_all().await)
}

/// Raw cached/fetched air quality payload, no normalization
async fn air_quality<F: Fetcher + 'static>(
    State(service): State<Arc<AggregationService<F>>>,
) -> Response {
    serve_target(&service, "air-quality", "Failed to fetch air quality data").await
}

/// Time-series air quality as a canonical feature collection
async fn air_quality_time<F: Fetcher + 'static>(
    State(service): State<Arc<AggregationService<F>>>,
) -> Response {
    serve_target(&service, "air-quality-time", "Failed to fetch air quality data").await
}

/// Traffic sensors as a canonical feature collection
async fn traffic<F: Fetcher + 'static>(
    State(service): State<Arc<AggregationService<F>>>,
) -> Response {
    serve_target(&service, "traffic", "Failed to fetch traffic data").await
}

async fn serve_target<F: Fetcher>(
    service: &AggregationService<F>,
    key: &str,
    error_message: &'static str,
) -> Response {
    match service.fetch_for(key).await {
        Ok(served) => {
            let last_updated = served
                .last_updated
                .to_rfc3339_opts(SecondsFormat::Millis, true);
            ([("X-Last-Updated", last_updated)], Json(served.body)).into_response()
        }
        Err(err) => {
            error!(key, error = %err, "request failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": error_message })),
            )
                .into_response()
        }
    }
}
