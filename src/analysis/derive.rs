//! Derivation of the compared scalar from raw value fields.
//!
//! Each [`Derivation`] variant dispatches to one pure function here. Adding a
//! dataset with a new kind of derived quantity means adding a variant and one
//! function, never a branch keyed on an event id.

use std::f64::consts::PI;

use crate::datasets::Derivation;

// ---------------------------------------------------------------------------
// Tidal constants
// ---------------------------------------------------------------------------

/// Principal lunar semidiurnal constituent period, in hours.
pub const M2_PERIOD_HOURS: f64 = 12.42;

/// Principal solar semidiurnal constituent period, in hours.
pub const S2_PERIOD_HOURS: f64 = 12.00;

/// Number of hourly samples used to find the day's highest tide.
pub const TIDE_SAMPLES_PER_DAY: u32 = 24;

/// Complex harmonic constant of one tidal constituent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Constituent {
    pub real: f64,
    pub imag: f64,
}

impl Constituent {
    pub fn new(real: f64, imag: f64) -> Self {
        Self { real, imag }
    }

    pub fn amplitude(&self) -> f64 {
        self.real.hypot(self.imag)
    }

    /// Phase in radians, in (-π, π].
    pub fn phase(&self) -> f64 {
        self.imag.atan2(self.real)
    }

    fn is_finite(&self) -> bool {
        self.real.is_finite() && self.imag.is_finite()
    }
}

// ---------------------------------------------------------------------------
// Derivation functions
// ---------------------------------------------------------------------------

/// Speed from two orthogonal components (wind or current).
pub fn vector_magnitude(u: f64, v: f64) -> f64 {
    (u * u + v * v).sqrt()
}

/// Tidal height at `hour` hours into the day from the M2 and S2 constituents:
///
/// ```text
/// h(t) = |M2|·cos(ω_M2·t + arg M2) + |S2|·cos(ω_S2·t + arg S2)
/// ```
pub fn tidal_height(m2: Constituent, s2: Constituent, hour: f64) -> f64 {
    let omega_m2 = 2.0 * PI / M2_PERIOD_HOURS;
    let omega_s2 = 2.0 * PI / S2_PERIOD_HOURS;

    m2.amplitude() * (omega_m2 * hour + m2.phase()).cos()
        + s2.amplitude() * (omega_s2 * hour + s2.phase()).cos()
}

/// Highest of the day's hourly tidal heights (hours 0..24).
///
/// Returns NaN if any harmonic constant is missing.
pub fn daily_max_tide(m2: Constituent, s2: Constituent) -> f64 {
    if !m2.is_finite() || !s2.is_finite() {
        return f64::NAN;
    }

    (0..TIDE_SAMPLES_PER_DAY)
        .map(|hour| tidal_height(m2, s2, f64::from(hour)))
        .fold(f64::NEG_INFINITY, f64::max)
}

impl Derivation {
    /// Applies this derivation to the fields read at the grid point, in
    /// registry order.
    ///
    /// Returns `None` when the number of fields does not match
    /// [`Derivation::arity`].
    pub fn apply(self, fields: &[f64]) -> Option<f64> {
        match (self, fields) {
            (Derivation::None, [value]) => Some(*value),
            (Derivation::VectorMagnitude, [u, v]) => Some(vector_magnitude(*u, *v)),
            (Derivation::TidalHarmonic, [m2_re, m2_im, s2_re, s2_im]) => Some(daily_max_tide(
                Constituent::new(*m2_re, *m2_im),
                Constituent::new(*s2_re, *s2_im),
            )),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
