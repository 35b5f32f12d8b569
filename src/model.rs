//! Core data types for the exceedance probability service.
//!
//! This module defines the shared domain model imported by all other modules:
//! the strongly-typed calculation request, the per-year sample produced by the
//! extractor, the probability result handed back to callers, and the error
//! taxonomy. It contains no I/O.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::Serialize;
use thiserror::Error;

// ---------------------------------------------------------------------------
// Parameter bounds
// ---------------------------------------------------------------------------

/// Inclusive latitude bounds, in degrees north.
pub const LAT_RANGE: (f64, f64) = (-90.0, 90.0);

/// Inclusive longitude bounds, in degrees east.
pub const LON_RANGE: (f64, f64) = (-180.0, 180.0);

/// Inclusive calendar month bounds.
pub const MONTH_RANGE: (u32, u32) = (1, 12);

/// Inclusive day-of-month bounds. Whether a given day exists in a given
/// year (Feb 29, Apr 31) is decided per year by the extractor.
pub const DAY_RANGE: (u32, u32) = (1, 31);

// ---------------------------------------------------------------------------
// Request
// ---------------------------------------------------------------------------

/// One probability calculation: a location, a calendar date, and the events
/// to evaluate there.
///
/// Constructed fresh per call and never persisted. `thresholds` stays
/// `None` when the caller supplied no override table at all, so the
/// transport layer can report whether custom thresholds were used.
#[derive(Debug, Clone, PartialEq)]
pub struct CalculationRequest {
    pub lat: f64,
    pub lon: f64,
    pub month: u32,
    pub day: u32,
    pub events: Vec<String>,
    pub thresholds: Option<BTreeMap<String, f64>>,
    pub use_synthetic: bool,
}

impl CalculationRequest {
    pub fn new<I, S>(lat: f64, lon: f64, month: u32, day: u32, events: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            lat,
            lon,
            month,
            day,
            events: events.into_iter().map(Into::into).collect(),
            thresholds: None,
            use_synthetic: false,
        }
    }

    pub fn with_thresholds(mut self, thresholds: BTreeMap<String, f64>) -> Self {
        self.thresholds = Some(thresholds);
        self
    }

    pub fn synthetic(mut self, use_synthetic: bool) -> Self {
        self.use_synthetic = use_synthetic;
        self
    }

    /// Effective threshold for `event_id`: the caller's override when one
    /// was given for that exact event, otherwise `default`.
    pub fn threshold_for(&self, event_id: &str, default: f64) -> f64 {
        self.thresholds
            .as_ref()
            .and_then(|t| t.get(event_id))
            .copied()
            .unwrap_or(default)
    }

    /// Checks the coordinate, date and event-list constraints.
    ///
    /// Event ids are checked against the registry separately, see
    /// `engine::validate_request`.
    pub fn validate_ranges(&self) -> Result<(), ProbabilityError> {
        check_range("lat", self.lat, LAT_RANGE)?;
        check_range("lon", self.lon, LON_RANGE)?;
        check_range("month", self.month, MONTH_RANGE)?;
        check_range("day", self.day, DAY_RANGE)?;

        if self.events.is_empty() {
            return Err(ProbabilityError::InvalidParameter {
                field: "events",
                message: "events must be a non-empty list".to_string(),
            });
        }

        if let Some(thresholds) = &self.thresholds {
            if let Some((event, value)) = thresholds.iter().find(|(_, v)| !v.is_finite()) {
                return Err(ProbabilityError::InvalidParameter {
                    field: "thresholds",
                    message: format!("threshold for {} must be a finite number, got {}", event, value),
                });
            }
        }

        Ok(())
    }
}

/// Inclusive range check producing the caller-facing message
/// `"<field> must be between A and B, got V"`.
pub fn check_range<T>(field: &'static str, value: T, (low, high): (T, T)) -> Result<(), ProbabilityError>
where
    T: PartialOrd + std::fmt::Display + Copy,
{
    // Written as a positive range check so NaN coordinates are rejected too.
    if value >= low && value <= high {
        Ok(())
    } else {
        Err(ProbabilityError::InvalidParameter {
            field,
            message: format!("{} must be between {} and {}, got {}", field, low, high, value),
        })
    }
}

// ---------------------------------------------------------------------------
// Samples
// ---------------------------------------------------------------------------

/// One year's scalar value for one event at the requested location/date,
/// or the reason that year could not contribute.
#[derive(Debug, Clone, PartialEq)]
pub struct YearlySample {
    pub year: i32,
    pub outcome: Result<f64, SkipReason>,
}

impl YearlySample {
    pub fn valid(year: i32, value: f64) -> Self {
        Self { year, outcome: Ok(value) }
    }

    pub fn skipped(year: i32, reason: SkipReason) -> Self {
        Self { year, outcome: Err(reason) }
    }

    /// The usable value, if any.
    pub fn value(&self) -> Option<f64> {
        self.outcome.as_ref().ok().copied()
    }
}

/// Collects the usable values of a sample series, in year order.
pub fn valid_values(samples: &[YearlySample]) -> Vec<f64> {
    samples.iter().filter_map(YearlySample::value).collect()
}

/// Why a year was excluded from both numerator and denominator.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SkipReason {
    /// The requested day does not exist in this year (e.g. Feb 29).
    #[error("{year}-{month:02}-{day:02} is not a calendar date")]
    InvalidDate { year: i32, month: u32, day: u32 },
    /// The remote source could not be opened or read.
    #[error(transparent)]
    Source(#[from] SourceError),
    /// The source answered but the value at the grid point is a fill or NaN.
    #[error("value is not a number")]
    NotANumber,
    /// A synthetic series deliberately left this year empty.
    #[error("synthetic data gap")]
    SyntheticGap,
}

// ---------------------------------------------------------------------------
// Result
// ---------------------------------------------------------------------------

/// Event id → probability in [0, 1] rounded to 4 decimals, or `None` when the
/// event could not be computed at all.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ProbabilityResult(BTreeMap<String, Option<f64>>);

impl ProbabilityResult {
    pub fn insert(&mut self, event_id: impl Into<String>, probability: Option<f64>) {
        self.0.insert(event_id.into(), probability);
    }

    /// `None` if the event was not part of the request, `Some(None)` if it
    /// was requested but failed.
    pub fn get(&self, event_id: &str) -> Option<Option<f64>> {
        self.0.get(event_id).copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<f64>)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Request-level failures surfaced to the caller.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProbabilityError {
    /// Out-of-range or ill-typed request parameter.
    #[error("{message}")]
    InvalidParameter { field: &'static str, message: String },
    /// One or more requested event ids are not in the registry.
    #[error("Invalid events: {}. Valid events: {}", unknown.join(", "), valid.join(", "))]
    UnknownEvent { unknown: Vec<String>, valid: Vec<String> },
    /// Anything unanticipated.
    #[error("Internal server error: {0}")]
    Internal(String),
}

/// Errors that can arise when opening or reading a remote gridded dataset.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SourceError {
    /// Non-2xx HTTP response other than an auth refusal.
    #[error("HTTP error: {status} from {url}")]
    Http { status: u16, url: String },
    /// The server refused our credentials (or we sent none).
    #[error("unauthorized ({status}) for {url}")]
    Unauthorized { status: u16, url: String },
    /// Connection, timeout or body-read failure.
    #[error("request failed: {0}")]
    Request(String),
    /// The dataset does not declare the named variable.
    #[error("variable not found: {0}")]
    MissingVariable(String),
    /// The dataset does not declare the named coordinate axis.
    #[error("axis not found: {0}")]
    MissingAxis(String),
    /// The response body could not be understood.
    #[error("parse error: {0}")]
    Parse(String),
    /// A selection fell outside the declared dimension size.
    #[error("index {index} out of range for dimension {dimension} (size {size})")]
    IndexOutOfRange { dimension: String, index: usize, size: usize },
    /// The time axis has no step for the date at the dataset's resolution.
    #[error("no time step for {date}")]
    NoTimeStep { date: NaiveDate },
}

impl From<reqwest::Error> for SourceError {
    fn from(err: reqwest::Error) -> Self {
        SourceError::Request(err.to_string())
    }
}

/// Per-event failure that leaves a `null` slot in the result.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EventFailure {
    #[error("synthetic sample generation failed: {0}")]
    Synthetic(String),
    /// The event's computation panicked, usually inside a grid backend.
    #[error("computation panicked: {0}")]
    Panicked(String),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> CalculationRequest {
        CalculationRequest::new(40.0, 30.0, 7, 15, ["wind_high"])
    }

    #[test]
    fn test_valid_request_passes_range_checks() {
        assert!(request().validate_ranges().is_ok());
    }

    #[test]
    fn test_boundaries_are_inclusive() {
        let edge = CalculationRequest::new(-90.0, 180.0, 12, 31, ["wind_high"]);
        assert!(edge.validate_ranges().is_ok(), "range ends should be accepted");
    }

    #[test]
    fn test_out_of_range_latitude_names_lat() {
        let mut req = request();
        req.lat = 100.0;
        match req.validate_ranges() {
            Err(ProbabilityError::InvalidParameter { field, message }) => {
                assert_eq!(field, "lat");
                assert!(message.contains("lat"), "message should mention lat: {}", message);
            }
            other => panic!("expected InvalidParameter, got {:?}", other),
        }
    }

    #[test]
    fn test_nan_longitude_is_rejected() {
        let mut req = request();
        req.lon = f64::NAN;
        assert!(matches!(
            req.validate_ranges(),
            Err(ProbabilityError::InvalidParameter { field: "lon", .. })
        ));
    }

    #[test]
    fn test_month_zero_and_day_32_are_rejected() {
        let mut req = request();
        req.month = 0;
        assert!(matches!(
            req.validate_ranges(),
            Err(ProbabilityError::InvalidParameter { field: "month", .. })
        ));

        let mut req = request();
        req.day = 32;
        assert!(matches!(
            req.validate_ranges(),
            Err(ProbabilityError::InvalidParameter { field: "day", .. })
        ));
    }

    #[test]
    fn test_empty_event_list_is_rejected() {
        let req = CalculationRequest::new(40.0, 30.0, 7, 15, Vec::<String>::new());
        assert!(matches!(
            req.validate_ranges(),
            Err(ProbabilityError::InvalidParameter { field: "events", .. })
        ));
    }

    #[test]
    fn test_threshold_override_applies_only_to_its_event() {
        let mut overrides = BTreeMap::new();
        overrides.insert("wind_high".to_string(), 12.0);
        let req = request().with_thresholds(overrides);

        assert_eq!(req.threshold_for("wind_high", 10.0), 12.0);
        assert_eq!(req.threshold_for("sst_high", 25.0), 25.0);
        assert_eq!(request().threshold_for("wind_high", 10.0), 10.0);
    }

    #[test]
    fn test_valid_values_drops_skipped_years() {
        let samples = vec![
            YearlySample::valid(2000, 1.5),
            YearlySample::skipped(2001, SkipReason::NotANumber),
            YearlySample::valid(2002, 3.0),
            YearlySample::skipped(2003, SkipReason::SyntheticGap),
        ];
        assert_eq!(valid_values(&samples), vec![1.5, 3.0]);
    }

    #[test]
    fn test_unknown_event_message_lists_valid_ids() {
        let err = ProbabilityError::UnknownEvent {
            unknown: vec!["tsunami".to_string()],
            valid: vec!["wind_high".to_string(), "sst_high".to_string()],
        };
        let msg = err.to_string();
        assert!(msg.contains("tsunami"));
        assert!(msg.contains("wind_high, sst_high"));
    }

    #[test]
    fn test_probability_result_serializes_failures_as_null() {
        let mut result = ProbabilityResult::default();
        result.insert("wind_high", Some(0.25));
        result.insert("tide_high", None);
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["wind_high"], serde_json::json!(0.25));
        assert!(json["tide_high"].is_null());
    }
}
