//! Per-year value extraction.
//!
//! For one event and one year: resolve the dataset locator, open it, pick the
//! nearest grid point (and time step), read the value fields, derive the
//! compared scalar. Every failure along the way becomes a [`SkipReason`] on
//! that year's sample; nothing here aborts the multi-year loop.

use chrono::NaiveDate;

use crate::datasets::{calendar_date, EventSpec, TemporalResolution};
use crate::ingest::{align_longitude, nearest_index, select_time, GridHandle, GridSource};
use crate::logging;
use crate::model::{SkipReason, SourceError, YearlySample};

/// Walks an event's valid years against one [`GridSource`].
#[derive(Debug, Clone)]
pub struct YearExtractor<S> {
    source: S,
}

impl<S: GridSource> YearExtractor<S> {
    pub fn new(source: S) -> Self {
        Self { source }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// One year's sample for `spec` at (lat, lon) on (month, day).
    pub fn extract(
        &self,
        spec: &EventSpec,
        lat: f64,
        lon: f64,
        month: u32,
        day: u32,
        year: i32,
    ) -> YearlySample {
        match self.read_year(spec, lat, lon, month, day, year) {
            Ok(value) => YearlySample::valid(year, value),
            Err(reason) => {
                logging::log_year_skip(spec.id, year, &reason);
                YearlySample::skipped(year, reason)
            }
        }
    }

    /// Samples for every year in the event's valid range, in year order.
    pub fn collect(
        &self,
        spec: &EventSpec,
        lat: f64,
        lon: f64,
        month: u32,
        day: u32,
    ) -> Vec<YearlySample> {
        let samples: Vec<YearlySample> = spec
            .years()
            .map(|year| self.extract(spec, lat, lon, month, day, year))
            .collect();

        let usable = samples.iter().filter(|s| s.outcome.is_ok()).count();
        logging::log_collection_summary(spec.id, samples.len(), usable);

        samples
    }

    fn read_year(
        &self,
        spec: &EventSpec,
        lat: f64,
        lon: f64,
        month: u32,
        day: u32,
        year: i32,
    ) -> Result<f64, SkipReason> {
        let locator = spec.source.resolve(year, month, day)?;

        // Harmonic constants have no time axis, so any (month, day) works.
        let date = match spec.temporal_resolution {
            TemporalResolution::HarmonicConstant => None,
            _ => Some(calendar_date(year, month, day)?),
        };

        let handle = self.source.open(&locator)?;
        let value = read_point_value(&handle, spec, lat, lon, date);
        drop(handle);

        let value = value?;
        if value.is_finite() {
            Ok(value)
        } else {
            Err(SkipReason::NotANumber)
        }
    }
}

/// Reads and derives the value at the grid point nearest (lat, lon).
fn read_point_value<H: GridHandle>(
    handle: &H,
    spec: &EventSpec,
    lat: f64,
    lon: f64,
    date: Option<NaiveDate>,
) -> Result<f64, SkipReason> {
    let axes = spec.axes;

    let lat_axis = handle.axis(axes.lat)?;
    let lat_index =
        nearest_index(&lat_axis, lat).ok_or_else(|| SourceError::MissingAxis(axes.lat.to_string()))?;

    let lon_axis = handle.axis(axes.lon)?;
    let lon_index = nearest_index(&lon_axis, align_longitude(lon, &lon_axis))
        .ok_or_else(|| SourceError::MissingAxis(axes.lon.to_string()))?;

    let mut selection = vec![(axes.lat, lat_index), (axes.lon, lon_index)];

    if let Some(date) = date {
        let times = handle.time_axis(axes.time)?;
        if times.is_empty() {
            return Err(SourceError::MissingAxis(axes.time.to_string()).into());
        }
        let time_index = select_time(&times, date, spec.temporal_resolution)
            .ok_or(SourceError::NoTimeStep { date })?;
        selection.push((axes.time, time_index));
    }

    let mut fields = Vec::with_capacity(spec.value_fields.len());
    for &field in spec.value_fields {
        if !handle.has_variable(field) {
            return Err(SourceError::MissingVariable(field.to_string()).into());
        }
        fields.push(handle.read_point(field, &selection)?);
    }

    spec.derived.apply(&fields).ok_or_else(|| {
        SourceError::Parse(format!(
            "{} value field(s) do not fit {:?}",
            fields.len(),
            spec.derived
        ))
        .into()
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
