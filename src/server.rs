//! HTTP transport.
//!
//! Thin JSON layer over [`ProbabilityEngine`]:
//!
//! - `POST /calculate_probability`: validate the body, run the engine on the
//!   blocking pool, wrap the result in `{success, data}`
//! - `GET /events`: registry contents
//! - `GET /health`: liveness probe
//!
//! Every error leaves as `{success: false, error}` with a 4xx/5xx status.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Map, Value};

use crate::datasets::Registry;
use crate::engine::{validate_request, ProbabilityEngine};
use crate::ingest::GridSource;
use crate::logging::{self, Component};
use crate::model::{check_range, CalculationRequest, ProbabilityError, DAY_RANGE, LAT_RANGE, LON_RANGE, MONTH_RANGE};

pub const SERVICE_NAME: &str = "Climate Exceedance Probability API";
pub const SERVICE_VERSION: &str = env!("CARGO_PKG_VERSION");

const REQUIRED_FIELDS: [&str; 5] = ["lat", "lon", "month", "day", "events"];

const NOT_JSON: &str = "Request body must be JSON";

/// Builds the application router around a shared engine.
pub fn router<S>(engine: Arc<ProbabilityEngine<S>>) -> Router
where
    S: GridSource + Send + Sync + 'static,
{
    Router::new()
        .route(
            "/calculate_probability",
            post(calculate_probability::<S>).fallback(method_not_allowed),
        )
        .route("/events", get(list_events::<S>).fallback(method_not_allowed))
        .route("/health", get(health).fallback(method_not_allowed))
        .fallback(not_found)
        .with_state(engine)
}

// ============================================================================
// Handlers
// ============================================================================

async fn calculate_probability<S>(
    State(engine): State<Arc<ProbabilityEngine<S>>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response
where
    S: GridSource + Send + Sync + 'static,
{
    if !is_json(&headers) {
        logging::warn(Component::Http, None, "rejected request: body is not declared as JSON");
        return failure(StatusCode::BAD_REQUEST, NOT_JSON);
    }

    let request = match parse_request(&body, engine.registry()) {
        Ok(request) => request,
        Err(e) => {
            logging::warn(Component::Http, None, &format!("rejected request: {}", e));
            return error_response(&e);
        }
    };

    let worker = Arc::clone(&engine);
    let job = request.clone();
    let outcome = tokio::task::spawn_blocking(move || worker.calculate(&job)).await;

    let probabilities = match outcome {
        Ok(Ok(probabilities)) => probabilities,
        Ok(Err(e)) => {
            logging::error(Component::Http, None, &e.to_string());
            return error_response(&e);
        }
        Err(join_error) => {
            let e = ProbabilityError::Internal(join_error.to_string());
            logging::error(Component::Http, None, &e.to_string());
            return error_response(&e);
        }
    };

    let body = json!({
        "success": true,
        "data": {
            "location": { "lat": request.lat, "lon": request.lon },
            "date": { "month": request.month, "day": request.day },
            "probabilities": probabilities,
            "metadata": {
                "total_events": request.events.len(),
                "custom_thresholds": request.thresholds.is_some(),
                "synthetic_data": request.use_synthetic,
            },
        },
    });

    (StatusCode::OK, Json(body)).into_response()
}

async fn list_events<S>(State(engine): State<Arc<ProbabilityEngine<S>>>) -> Response
where
    S: GridSource + Send + Sync + 'static,
{
    let events = events_payload(engine.registry());
    let body = json!({
        "success": true,
        "total_events": events.len(),
        "events": events,
    });
    (StatusCode::OK, Json(body)).into_response()
}

async fn health() -> Response {
    let body = json!({
        "status": "healthy",
        "service": SERVICE_NAME,
        "version": SERVICE_VERSION,
    });
    (StatusCode::OK, Json(body)).into_response()
}

async fn not_found() -> Response {
    failure(StatusCode::NOT_FOUND, "Endpoint not found")
}

async fn method_not_allowed() -> Response {
    failure(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed")
}

// ============================================================================
// Responses
// ============================================================================

fn failure(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "success": false, "error": message }))).into_response()
}

fn error_response(err: &ProbabilityError) -> Response {
    let status = match err {
        ProbabilityError::InvalidParameter { .. } | ProbabilityError::UnknownEvent { .. } => StatusCode::BAD_REQUEST,
        ProbabilityError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    failure(status, &err.to_string())
}

/// One entry per registered event, keyed by id.
pub fn events_payload(registry: &Registry) -> Map<String, Value> {
    registry
        .iter()
        .map(|spec| {
            let entry = json!({
                "name": spec.display_name,
                "threshold": spec.default_threshold,
                "unit": spec.unit,
                "year_range": [spec.valid_years.0, spec.valid_years.1],
                "temporal_resolution": spec.temporal_resolution,
                "description": format!("{} - Default threshold: {} {}", spec.display_name, spec.default_threshold, spec.unit),
            });
            (spec.id.to_string(), entry)
        })
        .collect()
}

// ============================================================================
// Boundary validation
// ============================================================================

/// Whether `Content-Type` names JSON: `application/json` or an
/// `application/*+json` subtype, parameters ignored.
pub fn is_json(headers: &HeaderMap) -> bool {
    let Some(content_type) = headers.get(header::CONTENT_TYPE).and_then(|v| v.to_str().ok()) else {
        return false;
    };
    let mime = content_type.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
    mime == "application/json" || (mime.starts_with("application/") && mime.ends_with("+json"))
}

fn invalid(field: &'static str, message: impl Into<String>) -> ProbabilityError {
    ProbabilityError::InvalidParameter {
        field,
        message: message.into(),
    }
}

/// Turns a raw request body into a validated [`CalculationRequest`].
///
/// Checks run in a fixed order and the first failure wins: JSON object,
/// required fields present, field types, event list shape, registered event
/// ids, thresholds shape, synthetic flag, value ranges. The `Content-Type`
/// check belongs to the caller.
pub fn parse_request(body: &[u8], registry: &Registry) -> Result<CalculationRequest, ProbabilityError> {
    let value: Value = serde_json::from_slice(body).map_err(|_| invalid("body", NOT_JSON))?;
    let object = value.as_object().ok_or_else(|| invalid("body", NOT_JSON))?;

    let missing: Vec<&str> = REQUIRED_FIELDS
        .iter()
        .copied()
        .filter(|field| !object.contains_key(*field))
        .collect();
    if !missing.is_empty() {
        return Err(invalid("body", format!("Missing required fields: {}", missing.join(", "))));
    }

    let type_error = || {
        invalid(
            "body",
            "lat and lon must be numbers, month and day must be integers",
        )
    };
    let lat = object["lat"].as_f64().ok_or_else(type_error)?;
    let lon = object["lon"].as_f64().ok_or_else(type_error)?;
    let month = object["month"].as_i64().ok_or_else(type_error)?;
    let day = object["day"].as_i64().ok_or_else(type_error)?;

    let events = parse_events(&object["events"])?;

    let unknown = registry.unknown_ids(&events);
    if !unknown.is_empty() {
        return Err(ProbabilityError::UnknownEvent {
            unknown: unknown.into_iter().map(String::from).collect(),
            valid: registry.all_ids().into_iter().map(String::from).collect(),
        });
    }

    let thresholds = parse_thresholds(object.get("thresholds"))?;
    let use_synthetic = match object.get("use_synthetic") {
        None | Some(Value::Null) => false,
        Some(Value::Bool(flag)) => *flag,
        Some(_) => return Err(invalid("use_synthetic", "use_synthetic must be a boolean")),
    };

    check_range("lat", lat, LAT_RANGE)?;
    check_range("lon", lon, LON_RANGE)?;
    check_range("month", month, (i64::from(MONTH_RANGE.0), i64::from(MONTH_RANGE.1)))?;
    check_range("day", day, (i64::from(DAY_RANGE.0), i64::from(DAY_RANGE.1)))?;

    // Both in range, so the narrowing cannot fail.
    let month = u32::try_from(month).map_err(|_| type_error())?;
    let day = u32::try_from(day).map_err(|_| type_error())?;

    let mut request = CalculationRequest::new(lat, lon, month, day, events).synthetic(use_synthetic);
    if let Some(thresholds) = thresholds {
        request = request.with_thresholds(thresholds);
    }

    validate_request(registry, &request)?;
    Ok(request)
}

fn parse_events(value: &Value) -> Result<Vec<String>, ProbabilityError> {
    let list = match value.as_array() {
        Some(list) if !list.is_empty() => list,
        _ => return Err(invalid("events", "events must be a non-empty list")),
    };

    list.iter()
        .map(|item| {
            item.as_str()
                .map(String::from)
                .ok_or_else(|| invalid("events", "events must be a list of event id strings"))
        })
        .collect()
}

fn parse_thresholds(value: Option<&Value>) -> Result<Option<BTreeMap<String, f64>>, ProbabilityError> {
    let object = match value {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::Object(object)) => object,
        Some(_) => return Err(invalid("thresholds", "thresholds must be a dictionary")),
    };

    object
        .iter()
        .map(|(event, threshold)| {
            threshold
                .as_f64()
                .map(|t| (event.clone(), t))
                .ok_or_else(|| invalid("thresholds", format!("threshold for {} must be a number", event)))
        })
        .collect::<Result<BTreeMap<_, _>, _>>()
        .map(Some)
}

// ============================================================================
// Tests
// ============================================================================
