//! Remote gridded-data access.
//!
//! The extractor talks to remote datasets only through [`GridSource`] and
//! [`GridHandle`], so the yearly loop can run against the live OPeNDAP client
//! or an in-memory grid in tests. The free functions here implement the
//! selection rules shared by every backend: nearest-neighbor on coordinate
//! axes and resolution-aware date matching on time axes.
//!
//! Submodules:
//! - `opendap`: DAP2 client over blocking HTTP.

pub mod opendap;

use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta};

use crate::datasets::TemporalResolution;
use crate::model::SourceError;

// ---------------------------------------------------------------------------
// Source traits
// ---------------------------------------------------------------------------

/// Opens datasets by resolved locator.
pub trait GridSource {
    type Handle: GridHandle;

    /// Opens the dataset at `locator`. Dropping the returned handle closes it.
    fn open(&self, locator: &str) -> Result<Self::Handle, SourceError>;
}

/// An open dataset.
pub trait GridHandle {
    /// Whether the dataset declares `name` as a variable.
    fn has_variable(&self, name: &str) -> bool;

    /// Coordinate values of a one-dimensional axis, in storage order.
    fn axis(&self, name: &str) -> Result<Vec<f64>, SourceError>;

    /// Time axis decoded to timestamps, in storage order.
    fn time_axis(&self, name: &str) -> Result<Vec<NaiveDateTime>, SourceError>;

    /// One decoded value of `variable` at the given per-dimension indices.
    ///
    /// Dimensions of the variable not named in `selection` are pinned to
    /// index 0. Fill values come back as NaN.
    fn read_point(&self, variable: &str, selection: &[(&str, usize)]) -> Result<f64, SourceError>;
}

// ---------------------------------------------------------------------------
// Selection helpers
// ---------------------------------------------------------------------------

/// Index of the axis value closest to `target`. Ties go to the first index.
///
/// Returns `None` for an empty axis or one with no comparable values.
pub fn nearest_index(axis: &[f64], target: f64) -> Option<usize> {
    axis.iter()
        .enumerate()
        .filter(|(_, v)| !v.is_nan())
        .map(|(i, v)| (i, (v - target).abs()))
        .fold(None, |best: Option<(usize, f64)>, (i, d)| match best {
            Some((_, best_d)) if best_d <= d => best,
            _ => Some((i, d)),
        })
        .map(|(i, _)| i)
}

/// Maps a longitude in [-180, 180] onto the axis convention: datasets whose
/// longitudes run 0..360 get negative longitudes shifted by 360.
pub fn align_longitude(lon: f64, axis: &[f64]) -> f64 {
    let uses_0_360 = axis.iter().any(|&v| v > 180.0);
    if uses_0_360 && lon < 0.0 { lon + 360.0 } else { lon }
}

/// Largest gap between a 5-day step and the requested date.
const FIVE_DAY_TOLERANCE_SECS: u64 = 3 * 86_400;

/// Index of the time step holding `date` at the dataset's resolution.
///
/// Daily data needs a step on that calendar day. Monthly data needs a step
/// in the same year and month. 5-day data takes the step nearest the date's
/// midnight, at most three days away. Time-invariant data never matches.
/// `None` means the dataset does not cover the date.
pub fn select_time(axis: &[NaiveDateTime], date: NaiveDate, resolution: TemporalResolution) -> Option<usize> {
    match resolution {
        TemporalResolution::Daily => axis.iter().position(|t| t.date() == date),
        TemporalResolution::Monthly => axis
            .iter()
            .position(|t| t.year() == date.year() && t.month() == date.month()),
        TemporalResolution::FiveDay => {
            let target = date.and_time(NaiveTime::MIN);
            axis.iter()
                .enumerate()
                .map(|(i, t)| (i, (*t - target).num_seconds().unsigned_abs()))
                .filter(|&(_, gap)| gap <= FIVE_DAY_TOLERANCE_SECS)
                .min_by_key(|&(_, gap)| gap)
                .map(|(i, _)| i)
        }
        TemporalResolution::HarmonicConstant => None,
    }
}

// ---------------------------------------------------------------------------
// CF time decoding
// ---------------------------------------------------------------------------

/// Parsed `"<unit> since <epoch>"` time units attribute.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeUnits {
    pub seconds_per_unit: f64,
    pub epoch: NaiveDateTime,
}

impl TimeUnits {
    /// Parses CF units such as `days since 1800-01-01 00:00:00` or
    /// `seconds since 1970-1-1T00:00:00Z`.
    pub fn parse(units: &str) -> Result<Self, SourceError> {
        let bad = || SourceError::Parse(format!("unsupported time units '{}'", units));

        let (unit, epoch) = units.split_once(" since ").ok_or_else(bad)?;
        let seconds_per_unit = match unit.trim().to_ascii_lowercase().as_str() {
            "days" | "day" | "d" => 86_400.0,
            "hours" | "hour" | "hrs" | "h" => 3_600.0,
            "minutes" | "minute" | "min" => 60.0,
            "seconds" | "second" | "secs" | "s" => 1.0,
            _ => return Err(bad()),
        };

        let epoch = parse_epoch(epoch.trim()).ok_or_else(bad)?;
        Ok(Self { seconds_per_unit, epoch })
    }

    /// Converts one raw axis value to a timestamp.
    pub fn decode(&self, value: f64) -> Option<NaiveDateTime> {
        let millis = value * self.seconds_per_unit * 1_000.0;
        // Anything beyond ±100k years is a fill value, not a time.
        if !millis.is_finite() || millis.abs() > 3.2e18 {
            return None;
        }
        let delta = TimeDelta::try_milliseconds(millis.round() as i64)?;
        self.epoch.checked_add_signed(delta)
    }
}

fn parse_epoch(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim_end_matches('Z');
    let (date_part, time_part) = match text.split_once(['T', ' ']) {
        Some((d, t)) => (d, Some(t.trim())),
        None => (text, None),
    };

    let mut ymd = date_part.split('-').map(|p| p.trim().parse::<i64>().ok());
    let year = ymd.next()??;
    let month = ymd.next()??;
    let day = ymd.next()??;
    let date = NaiveDate::from_ymd_opt(
        i32::try_from(year).ok()?,
        u32::try_from(month).ok()?,
        u32::try_from(day).ok()?,
    )?;

    let time = match time_part {
        None | Some("") => NaiveTime::MIN,
        Some(t) => {
            // Drop a trailing numeric UTC offset such as "+00:00".
            let t = t.split(['+', ' ']).next().unwrap_or(t);
            let mut hms = t.split(':').map(|p| p.trim().parse::<f64>().ok());
            let h = hms.next().flatten().unwrap_or(0.0);
            let m = hms.next().flatten().unwrap_or(0.0);
            let s = hms.next().flatten().unwrap_or(0.0);
            NaiveTime::from_num_seconds_from_midnight_opt((h * 3600.0 + m * 60.0 + s) as u32, 0)?
        }
    };

    Some(date.and_time(time))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
