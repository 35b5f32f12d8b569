//! Dataset registry for the exceedance probability service.
//!
//! Defines the canonical list of climate datasets the service can evaluate,
//! one entry per event id, along with where each dataset lives, which
//! variables carry the value, how that value is derived, the default
//! threshold, and the years the source mission covers. This is the single
//! source of truth for event ids; all other modules look datasets up through
//! a [`Registry`] rather than matching on id strings.

use std::collections::HashSet;
use std::ops::RangeInclusive;

use chrono::{Datelike, NaiveDate};
use serde::Serialize;
use thiserror::Error;

use crate::model::SkipReason;

// ---------------------------------------------------------------------------
// Dataset description types
// ---------------------------------------------------------------------------

/// How the per-year scalar is obtained from the dataset's value fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Derivation {
    /// One field, used as-is.
    None,
    /// Two orthogonal components (u, v); the value is their magnitude.
    VectorMagnitude,
    /// M2 real/imag and S2 real/imag harmonic constants; the value is the
    /// day's highest reconstructed tide.
    TidalHarmonic,
}

impl Derivation {
    /// Number of value fields this derivation consumes.
    pub const fn arity(self) -> usize {
        match self {
            Derivation::None => 1,
            Derivation::VectorMagnitude => 2,
            Derivation::TidalHarmonic => 4,
        }
    }
}

/// Time step of the source data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TemporalResolution {
    #[serde(rename = "daily")]
    Daily,
    #[serde(rename = "monthly")]
    Monthly,
    #[serde(rename = "5day")]
    FiveDay,
    /// Time-invariant harmonic model; no time axis.
    #[serde(rename = "harmonic")]
    HarmonicConstant,
}

/// Where a dataset lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceLocator {
    /// One resource holding every year.
    Fixed(&'static str),
    /// One resource per year/month/day. Supported fields: `{year}`,
    /// `{month}`, `{day}` and `{doy}` (day of year).
    Template(&'static str),
}

const TEMPLATE_FIELDS: &[&str] = &["year", "month", "day", "doy"];

impl SourceLocator {
    /// Resolves the locator for one year of a (month, day) request.
    ///
    /// Templates need a real calendar date; a fixed locator never fails.
    pub fn resolve(&self, year: i32, month: u32, day: u32) -> Result<String, SkipReason> {
        match self {
            SourceLocator::Fixed(url) => Ok((*url).to_string()),
            SourceLocator::Template(template) => {
                let date = calendar_date(year, month, day)?;
                Ok(render_template(template, date))
            }
        }
    }

    fn unknown_template_field(&self) -> Option<String> {
        let SourceLocator::Template(template) = self else {
            return None;
        };
        let mut rest = *template;
        while let Some(open) = rest.find('{') {
            let after = &rest[open + 1..];
            let Some(close) = after.find('}') else {
                return Some(after.to_string());
            };
            let field = &after[..close];
            if !TEMPLATE_FIELDS.contains(&field) {
                return Some(field.to_string());
            }
            rest = &after[close + 1..];
        }
        None
    }
}

/// The calendar date for `year`, or the skip reason when the (month, day)
/// pair does not exist in that year.
pub fn calendar_date(year: i32, month: u32, day: u32) -> Result<NaiveDate, SkipReason> {
    NaiveDate::from_ymd_opt(year, month, day).ok_or(SkipReason::InvalidDate { year, month, day })
}

fn render_template(template: &str, date: NaiveDate) -> String {
    template
        .replace("{year}", &format!("{:04}", date.year()))
        .replace("{month}", &format!("{:02}", date.month()))
        .replace("{day}", &format!("{:02}", date.day()))
        .replace("{doy}", &format!("{:03}", date.ordinal()))
}

/// Names of the coordinate axes inside a dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AxisNames {
    pub lat: &'static str,
    pub lon: &'static str,
    pub time: &'static str,
}

pub const DEFAULT_AXES: AxisNames = AxisNames {
    lat: "lat",
    lon: "lon",
    time: "time",
};

/// One registry entry.
#[derive(Debug, Clone, PartialEq)]
pub struct EventSpec {
    /// Event id used by callers, e.g. `wind_high`.
    pub id: &'static str,
    /// Human-readable dataset name.
    pub display_name: &'static str,
    /// Physical unit of the value and its threshold.
    pub unit: &'static str,
    pub source: SourceLocator,
    /// Variables read at the grid point, in the order the derivation expects.
    pub value_fields: &'static [&'static str],
    pub derived: Derivation,
    pub default_threshold: f64,
    /// Inclusive (start, end) years the source mission covers.
    pub valid_years: (i32, i32),
    pub temporal_resolution: TemporalResolution,
    pub axes: AxisNames,
}

impl EventSpec {
    pub fn years(&self) -> RangeInclusive<i32> {
        self.valid_years.0..=self.valid_years.1
    }

    pub fn year_count(&self) -> usize {
        (self.valid_years.1 - self.valid_years.0 + 1).max(0) as usize
    }
}

// ---------------------------------------------------------------------------
// Built-in datasets
// ---------------------------------------------------------------------------

/// All datasets served by this service.
///
/// Sources:
///   - JPL PO.DAAC THREDDS (CCMP, merged altimetry, OSCAR, MEaSUREs SSHA, TPXO9)
///   - GES DISC (GPCP), GHRC (TRMM TCPF), LAADS (MODIS), NOAA PSL (OISST)
pub static DATASET_REGISTRY: &[EventSpec] = &[
    EventSpec {
        id: "wind_high",
        display_name: "CCMP Wind Speed",
        unit: "m/s",
        source: SourceLocator::Template(
            "https://thredds.jpl.nasa.gov/thredds/dodsC/gds2/ccmp/L3m/MONTHLY/equatorial/{year}/{month}/CCMPv2.0_MSLR_Vx_wind_10m_{year}{month}_L3m_MON_GLO_0.25deg_EQ.nc",
        ),
        value_fields: &["uwnd", "vwnd"],
        derived: Derivation::VectorMagnitude,
        default_threshold: 10.0,
        valid_years: (1991, 2020),
        temporal_resolution: TemporalResolution::Monthly,
        axes: DEFAULT_AXES,
    },
    EventSpec {
        id: "rain_high",
        display_name: "GPCP Daily Precipitation",
        unit: "mm/day",
        source: SourceLocator::Fixed("https://disc.gsfc.nasa.gov/thredds/dodsC/GPCP/gpcp_daily_v3.2.nc4"),
        value_fields: &["precip"],
        derived: Derivation::None,
        default_threshold: 10.0,
        valid_years: (1991, 2020),
        temporal_resolution: TemporalResolution::Daily,
        axes: DEFAULT_AXES,
    },
    EventSpec {
        id: "wave_high",
        display_name: "Merged Altimeter SWH",
        unit: "m",
        source: SourceLocator::Template(
            "https://thredds.jpl.nasa.gov/thredds/dodsC/gds2/merged_alt/L4/global/merged_alt_swh_{year}{month}{day}.nc",
        ),
        value_fields: &["swh"],
        derived: Derivation::None,
        default_threshold: 2.0,
        valid_years: (1993, 2020), // altimetry record starts 1993
        temporal_resolution: TemporalResolution::Daily,
        axes: DEFAULT_AXES,
    },
    EventSpec {
        id: "storm_high",
        display_name: "TRMM/GPM TCPF",
        unit: "mm/h",
        source: SourceLocator::Template(
            "https://data.ghrc.earthdata.nasa.gov/thredds/dodsC/TRMM/TCPF/{year}/TCPF_{year}{month}{day}.nc",
        ),
        value_fields: &["rain_rate"],
        derived: Derivation::None,
        default_threshold: 20.0,
        valid_years: (1998, 2020), // TRMM launched late 1997
        temporal_resolution: TemporalResolution::Daily,
        axes: DEFAULT_AXES,
    },
    EventSpec {
        id: "fog_low",
        display_name: "MODIS AOD",
        unit: "AOD",
        source: SourceLocator::Template(
            "https://opendap.ladsweb.org/opendap/allData/61/MOD04_L2/{year}/{doy}/MOD04_L2.A{year}{doy}.nc",
        ),
        value_fields: &["Optical_Depth_Land_And_Ocean"],
        derived: Derivation::None,
        default_threshold: 0.5,
        valid_years: (2000, 2020), // MODIS Terra
        temporal_resolution: TemporalResolution::Daily,
        axes: DEFAULT_AXES,
    },
    EventSpec {
        id: "sst_high",
        display_name: "NOAA OI SST V2",
        unit: "degC",
        source: SourceLocator::Fixed(
            "https://psl.noaa.gov/thredds/dodsC/Datasets/noaa.oisst.v2.highres/sst.day.mean.nc",
        ),
        value_fields: &["sst"],
        derived: Derivation::None,
        default_threshold: 25.0,
        valid_years: (1991, 2020),
        temporal_resolution: TemporalResolution::Daily,
        axes: DEFAULT_AXES,
    },
    EventSpec {
        id: "current_strong",
        display_name: "OSCAR Surface Currents",
        unit: "m/s",
        source: SourceLocator::Template(
            "https://thredds.jpl.nasa.gov/thredds/dodsC/gds2/oscar/L4/oscar_currents/oscar_v2.0_L4_oc_final_{year}{month}{day}.nc",
        ),
        value_fields: &["u", "v"],
        derived: Derivation::VectorMagnitude,
        default_threshold: 0.5,
        valid_years: (1993, 2020),
        temporal_resolution: TemporalResolution::Daily,
        axes: DEFAULT_AXES,
    },
    EventSpec {
        id: "tide_high",
        display_name: "TPXO9 Tide Model",
        unit: "m",
        source: SourceLocator::Fixed(
            "https://thredds.jpl.nasa.gov/thredds/dodsC/gds2/tpxo9_atlas_v5/tpxo9_atlas_v5.nc",
        ),
        value_fields: &["h_m2_real", "h_m2_imag", "h_s2_real", "h_s2_imag"],
        derived: Derivation::TidalHarmonic,
        default_threshold: 1.0,
        valid_years: (1991, 2020),
        temporal_resolution: TemporalResolution::HarmonicConstant,
        axes: DEFAULT_AXES,
    },
    EventSpec {
        id: "ssha_high",
        display_name: "MEaSUREs Gridded SSHA",
        unit: "m",
        source: SourceLocator::Template(
            "https://thredds.jpl.nasa.gov/thredds/dodsC/gds2/ssh/alt_grids/L4/jpl_meaures/sea_surface_height_alt_grids_L4_2sats_5day_6thdeg_v_jpl2205_{year}{month}{day}.nc",
        ),
        value_fields: &["ssha"],
        derived: Derivation::None,
        default_threshold: 0.05,
        valid_years: (1993, 2020),
        temporal_resolution: TemporalResolution::FiveDay,
        axes: DEFAULT_AXES,
    },
];

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Problems found while validating registry entries.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RegistryError {
    #[error("registry has no entries")]
    Empty,
    #[error("duplicate event id '{0}'")]
    DuplicateId(String),
    #[error("event '{id}': {derived:?} needs {expected} value field(s), found {found}")]
    ArityMismatch {
        id: String,
        derived: Derivation,
        expected: usize,
        found: usize,
    },
    #[error("event '{id}': harmonic-constant resolution and tidal derivation must go together")]
    ResolutionMismatch { id: String },
    #[error("event '{id}': year range {start}..={end} is inverted")]
    InvertedYearRange { id: String, start: i32, end: i32 },
    #[error("event '{id}': unknown template field '{field}'")]
    UnknownTemplateField { id: String, field: String },
}

/// Read-only, validated view over a set of [`EventSpec`]s.
///
/// Built once at process start and shared by reference; nothing mutates it
/// afterwards.
#[derive(Debug, Clone)]
pub struct Registry {
    entries: Vec<EventSpec>,
}

impl Registry {
    pub fn new(entries: Vec<EventSpec>) -> Result<Self, RegistryError> {
        if entries.is_empty() {
            return Err(RegistryError::Empty);
        }

        let mut seen = HashSet::new();
        for spec in &entries {
            if !seen.insert(spec.id) {
                return Err(RegistryError::DuplicateId(spec.id.to_string()));
            }
            validate_entry(spec)?;
        }

        Ok(Self { entries })
    }

    /// The built-in [`DATASET_REGISTRY`].
    pub fn builtin() -> Result<Self, RegistryError> {
        Self::new(DATASET_REGISTRY.to_vec())
    }

    /// Looks up an event by id. Returns `None` if not found.
    pub fn get(&self, event_id: &str) -> Option<&EventSpec> {
        self.entries.iter().find(|s| s.id == event_id)
    }

    /// Every event id, in registry order.
    pub fn all_ids(&self) -> Vec<&'static str> {
        self.entries.iter().map(|s| s.id).collect()
    }

    /// The ids in `requested` that are not registered, in request order.
    pub fn unknown_ids<'a>(&self, requested: &'a [String]) -> Vec<&'a str> {
        requested
            .iter()
            .map(String::as_str)
            .filter(|id| self.get(id).is_none())
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &EventSpec> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn validate_entry(spec: &EventSpec) -> Result<(), RegistryError> {
    let expected = spec.derived.arity();
    if spec.value_fields.len() != expected {
        return Err(RegistryError::ArityMismatch {
            id: spec.id.to_string(),
            derived: spec.derived,
            expected,
            found: spec.value_fields.len(),
        });
    }

    let harmonic = spec.temporal_resolution == TemporalResolution::HarmonicConstant;
    if harmonic != (spec.derived == Derivation::TidalHarmonic) {
        return Err(RegistryError::ResolutionMismatch { id: spec.id.to_string() });
    }

    if spec.valid_years.0 > spec.valid_years.1 {
        return Err(RegistryError::InvertedYearRange {
            id: spec.id.to_string(),
            start: spec.valid_years.0,
            end: spec.valid_years.1,
        });
    }

    if let Some(field) = spec.source.unknown_template_field() {
        return Err(RegistryError::UnknownTemplateField {
            id: spec.id.to_string(),
            field,
        });
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
