//! HTTP API Tests
//!
//! Drives the router in-process with `tower::ServiceExt::oneshot`; no socket
//! is bound and no remote dataset is contacted.

mod common;

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use common::{mid_july, FakeDataset, FakeSource};
use exceedance_service::datasets::Registry;
use exceedance_service::engine::ProbabilityEngine;
use exceedance_service::server;

fn app() -> Router {
    let registry = Registry::builtin().expect("built-in registry");
    let sst_url = registry
        .get("sst_high")
        .unwrap()
        .source
        .resolve(1991, 7, 15)
        .unwrap();
    let values: Vec<f64> = (0..30).map(|i| 20.0 + f64::from(i)).collect();
    let source = FakeSource::new().with_dataset(
        sst_url,
        FakeDataset::at_dates(mid_july(1991..=2020)).with_var("sst", values),
    );

    server::router(Arc::new(ProbabilityEngine::new(Arc::new(registry), source)))
}

async fn send(method: Method, uri: &str, body: Option<&str>) -> (StatusCode, Value) {
    send_as(method, uri, "application/json", body).await
}

async fn send_as(method: Method, uri: &str, content_type: &str, body: Option<&str>) -> (StatusCode, Value) {
    let body = body.map(|b| Body::from(b.to_string())).unwrap_or_else(Body::empty);
    let mut builder = Request::builder().method(method).uri(uri);
    if !content_type.is_empty() {
        builder = builder.header("content-type", content_type);
    }
    let request = builder.body(body).unwrap();

    let response = app().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

async fn calculate(body: &str) -> (StatusCode, Value) {
    send(Method::POST, "/calculate_probability", Some(body)).await
}

// ============================================================================
// /calculate_probability
// ============================================================================

#[tokio::test]
async fn test_calculate_from_real_extraction() {
    let (status, json) = calculate(r#"{"lat": 40.0, "lon": 30.0, "month": 7, "day": 15, "events": ["sst_high"]}"#).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], true);
    assert_eq!(json["data"]["probabilities"]["sst_high"], 0.8);
    assert_eq!(json["data"]["location"], json!({"lat": 40.0, "lon": 30.0}));
    assert_eq!(json["data"]["date"], json!({"month": 7, "day": 15}));
    assert_eq!(
        json["data"]["metadata"],
        json!({"total_events": 1, "custom_thresholds": false, "synthetic_data": false})
    );
}

#[tokio::test]
async fn test_calculate_with_custom_threshold() {
    let (status, json) = calculate(
        r#"{"lat": 40.0, "lon": 30.0, "month": 7, "day": 15,
            "events": ["sst_high"], "thresholds": {"sst_high": 40.0}}"#,
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["probabilities"]["sst_high"], 0.3);
    assert_eq!(json["data"]["metadata"]["custom_thresholds"], true);
}

#[tokio::test]
async fn test_calculate_synthetic_all_events() {
    let (status, json) = calculate(
        r#"{"lat": 41.0, "lon": 29.0, "month": 7, "day": 15, "use_synthetic": true,
            "events": ["wind_high", "rain_high", "wave_high", "storm_high", "fog_low",
                       "sst_high", "current_strong", "tide_high", "ssha_high"]}"#,
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let probabilities = json["data"]["probabilities"].as_object().unwrap();
    assert_eq!(probabilities.len(), 9);
    for (event, p) in probabilities {
        let p = p.as_f64().unwrap_or_else(|| panic!("{} should be a number", event));
        assert!((0.0..=1.0).contains(&p));
    }
    assert_eq!(json["data"]["metadata"]["synthetic_data"], true);
}

#[tokio::test]
async fn test_out_of_range_latitude_is_400() {
    let (status, json) = calculate(r#"{"lat": 100.0, "lon": 30.0, "month": 7, "day": 15, "events": ["wind_high"]}"#).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["success"], false);
    assert!(json["error"].as_str().unwrap().contains("lat"));
}

#[tokio::test]
async fn test_unknown_event_is_400_with_valid_list() {
    let (status, json) = calculate(r#"{"lat": 40.0, "lon": 30.0, "month": 7, "day": 15, "events": ["tsunami"]}"#).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    let error = json["error"].as_str().unwrap();
    assert!(error.starts_with("Invalid events: tsunami."));
    assert!(error.contains("Valid events: wind_high"));
}

#[tokio::test]
async fn test_empty_events_is_400() {
    let (status, json) = calculate(r#"{"lat": 40.0, "lon": 30.0, "month": 7, "day": 15, "events": []}"#).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "events must be a non-empty list");
}

#[tokio::test]
async fn test_missing_fields_and_bad_body_are_400() {
    let (status, json) = calculate(r#"{"lat": 40.0}"#).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "Missing required fields: lon, month, day, events");

    let (status, json) = calculate("not json").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "Request body must be JSON");
}

#[tokio::test]
async fn test_body_not_declared_as_json_is_400() {
    let body = r#"{"lat": 40.0, "lon": 30.0, "month": 7, "day": 15, "events": ["sst_high"]}"#;

    let (status, json) = send_as(Method::POST, "/calculate_probability", "text/plain", Some(body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json, json!({"success": false, "error": "Request body must be JSON"}));

    let (status, _) = send_as(Method::POST, "/calculate_probability", "", Some(body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send_as(Method::POST, "/calculate_probability", "application/json; charset=utf-8", Some(body)).await;
    assert_eq!(status, StatusCode::OK);
}

// ============================================================================
// Other routes
// ============================================================================

#[tokio::test]
async fn test_events_lists_registry() {
    let (status, json) = send(Method::GET, "/events", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], true);
    assert_eq!(json["total_events"], 9);
    assert_eq!(json["events"]["wave_high"]["year_range"], json!([1993, 2020]));
    assert_eq!(json["events"]["wind_high"]["threshold"], 10.0);
    assert_eq!(json["events"]["ssha_high"]["temporal_resolution"], "5day");
}

#[tokio::test]
async fn test_health() {
    let (status, json) = send(Method::GET, "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["service"], server::SERVICE_NAME);
    assert_eq!(json["version"], server::SERVICE_VERSION);
}

#[tokio::test]
async fn test_unknown_path_is_404() {
    let (status, json) = send(Method::GET, "/nowhere", None).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json, json!({"success": false, "error": "Endpoint not found"}));
}

#[tokio::test]
async fn test_wrong_method_is_405() {
    let (status, json) = send(Method::GET, "/calculate_probability", None).await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(json, json!({"success": false, "error": "Method not allowed"}));

    let (status, _) = send(Method::POST, "/health", Some("{}")).await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
}
