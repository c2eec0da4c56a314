//! Integration tests for the HTTP API surface
//!
//! Drives the axum router directly with a stub fetcher, so no network or
//! real upstreams are involved.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

use sensormap::config::Config;
use sensormap::fetch::{FetchError, Fetcher};
use sensormap::server;
use sensormap::service::AggregationService;

/// Stub fetcher answering per-URL; unconfigured URLs behave like a dead upstream
struct StubFetcher {
    responses: HashMap<String, Value>,
}

#[async_trait]
impl Fetcher for StubFetcher {
    async fn fetch(&self, url: &str) -> Result<Value, FetchError> {
        self.responses
            .get(url)
            .cloned()
            .ok_or_else(|| FetchError::Status {
                status: reqwest::StatusCode::BAD_GATEWAY,
                url: url.to_string(),
            })
    }
}

fn upstream_payloads() -> HashMap<String, Value> {
    HashMap::from([
        (
            "http://upstream/aq".to_string(),
            json!({ "stations": [{ "pm10": 21.5 }] }),
        ),
        (
            "http://upstream/aqt".to_string(),
            json!({
                "features1": [{
                    "properties": {
                        "geometry": { "type": "Point", "coordinates": [27.47, 42.50] },
                        "name": "Meden Rudnik",
                        "data": { "pm10": [1, 2, 3] }
                    }
                }]
            }),
        ),
        (
            "http://upstream/traffic".to_string(),
            json!({
                "features1": [{
                    "properties": {
                        "geometry": { "type": "Point", "coordinates": [42.50, 27.47] },
                        "name": "Transportna",
                        "description": "southbound",
                        "data": { "count": 112 }
                    }
                }]
            }),
        ),
    ])
}

/// Builds a router over a fresh temp cache directory
fn app(responses: HashMap<String, Value>) -> (Router, TempDir) {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");

    let env = HashMap::from([
        ("AIR_QUALITY_URL", "http://upstream/aq"),
        ("AIR_QUALITY_TIME_URL", "http://upstream/aqt"),
        ("TRAFFIC_URL", "http://upstream/traffic"),
        ("CACHE_DURATION_AIR_QUALITY_MS", "60000"),
        ("CACHE_DURATION_AIR_QUALITY_TIME_MS", "60000"),
        ("CACHE_DURATION_TRAFFIC_MS", "60000"),
    ]);
    let mut config =
        Config::from_lookup(|var| env.get(var).map(|v| v.to_string())).expect("Config loads");
    config.cache_dir = temp_dir.path().join("cache");
    config.static_dir = temp_dir.path().join("public");

    let service = AggregationService::new(config, StubFetcher { responses })
        .expect("Service should build");
    (server::router(Arc::new(service)), temp_dir)
}

async fn get(router: &Router, path: &str) -> (StatusCode, axum::http::HeaderMap, Value) {
    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .uri(path)
                .body(Body::empty())
                .expect("Request builds"),
        )
        .await
        .expect("Request succeeds");

    let status = response.status();
    let headers = response.headers().clone();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("Body reads");
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, headers, body)
}

#[tokio::test]
async fn test_status_lists_every_target() {
    let (router, _dir) = app(upstream_payloads());

    let (status, _, body) = get(&router, "/api/status").await;

    assert_eq!(status, StatusCode::OK);
    for key in ["air-quality", "air-quality-time", "traffic"] {
        assert_eq!(body[key]["exists"], json!(false));
        assert_eq!(body[key]["lastUpdated"], json!(0));
    }
}

#[tokio::test]
async fn test_air_quality_returns_raw_payload_with_header() {
    let (router, _dir) = app(upstream_payloads());

    let (status, headers, body) = get(&router, "/api/air-quality").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "stations": [{ "pm10": 21.5 }] }));

    let last_updated = headers
        .get("X-Last-Updated")
        .expect("Header must be set")
        .to_str()
        .unwrap();
    // RFC 3339 / ISO-8601 with millisecond precision
    assert!(
        chrono::DateTime::parse_from_rfc3339(last_updated).is_ok(),
        "unparseable X-Last-Updated: {}",
        last_updated
    );
}

#[tokio::test]
async fn test_air_quality_time_is_normalized() {
    let (router, _dir) = app(upstream_payloads());

    let (status, headers, body) = get(&router, "/api/air-quality-time").await;

    assert_eq!(status, StatusCode::OK);
    assert!(headers.contains_key("X-Last-Updated"));
    assert_eq!(body["type"], "FeatureCollection");

    let feature = &body["features"][0];
    assert_eq!(feature["type"], "Feature");
    assert_eq!(feature["geometry"]["coordinates"], json!([27.47, 42.50]));
    assert_eq!(feature["properties"]["name"], "Meden Rudnik");
}

#[tokio::test]
async fn test_traffic_swaps_reversed_coordinates() {
    let (router, _dir) = app(upstream_payloads());

    let (status, _, body) = get(&router, "/api/traffic").await;

    assert_eq!(status, StatusCode::OK);
    // upstream sent [42.50, 27.47]; canonical output is latitude-first
    assert_eq!(
        body["features"][0]["geometry"]["coordinates"],
        json!([27.47, 42.50])
    );
    assert_eq!(body["features"][0]["properties"]["description"], "southbound");
}

#[tokio::test]
async fn test_missing_container_key_yields_500_envelope() {
    let mut responses = upstream_payloads();
    responses.insert(
        "http://upstream/traffic".to_string(),
        json!({ "rows": [1, 2] }),
    );
    let (router, _dir) = app(responses);

    let (status, _, body) = get(&router, "/api/traffic").await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, json!({ "error": "Failed to fetch traffic data" }));
}

#[tokio::test]
async fn test_air_quality_time_error_message_mentions_air_quality() {
    let mut responses = upstream_payloads();
    responses.remove("http://upstream/aqt");
    let (router, _dir) = app(responses);

    let (status, _, body) = get(&router, "/api/air-quality-time").await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, json!({ "error": "Failed to fetch air quality data" }));
}

#[tokio::test]
async fn test_dead_upstream_with_no_cache_is_500_but_others_still_serve() {
    let mut responses = upstream_payloads();
    responses.remove("http://upstream/aq");
    let (router, _dir) = app(responses);

    let (status, _, _) = get(&router, "/api/air-quality").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);

    // The failure is per-target; the service keeps serving the others
    let (status, _, body) = get(&router, "/api/traffic").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["type"], "FeatureCollection");
}

#[tokio::test]
async fn test_status_reflects_artifact_after_first_fetch() {
    let (router, _dir) = app(upstream_payloads());

    let (status, _, _) = get(&router, "/api/air-quality").await;
    assert_eq!(status, StatusCode::OK);

    // The artifact write is fire-and-forget; give it a moment to land
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;

    let (_, _, body) = get(&router, "/api/status").await;
    assert_eq!(body["air-quality"]["exists"], json!(true));
    assert!(body["air-quality"]["lastUpdated"].as_i64().unwrap() > 0);
    assert_eq!(body["traffic"]["exists"], json!(false));
}
