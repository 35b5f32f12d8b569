//! Synthetic sample generation.
//!
//! Produces a statistically shaped stand-in series for an event: one sample
//! per valid year, normally distributed around a fraction of the event's
//! default threshold, floored at zero, with a share of years left empty to
//! look like real gaps. Used for `use_synthetic` requests and as the one-shot
//! fallback when real extraction yields nothing usable.

use rand::Rng;
use rand_distr::{Distribution, Normal};

use crate::datasets::EventSpec;
use crate::logging::{self, Component};
use crate::model::{EventFailure, SkipReason, YearlySample};

/// Mean of the generated values, as a fraction of the default threshold.
pub const MEAN_FRACTION: f64 = 0.7;

/// Standard deviation of the generated values, as a fraction of the default
/// threshold.
pub const SPREAD_FRACTION: f64 = 0.4;

/// Chance that any one year is left as a gap.
pub const GAP_PROBABILITY: f64 = 0.1;

/// One sample per year of `spec.valid_years`, in year order.
pub fn generate_samples<R: Rng + ?Sized>(
    spec: &EventSpec,
    rng: &mut R,
) -> Result<Vec<YearlySample>, EventFailure> {
    let threshold = spec.default_threshold;
    let normal = Normal::new(MEAN_FRACTION * threshold, SPREAD_FRACTION * threshold.abs())
        .map_err(|e| EventFailure::Synthetic(format!("{}: {}", spec.id, e)))?;

    let mut samples = Vec::with_capacity(spec.year_count());
    for year in spec.years() {
        if rng.gen_bool(GAP_PROBABILITY) {
            samples.push(YearlySample::skipped(year, SkipReason::SyntheticGap));
        } else {
            // Physical magnitudes; never negative.
            let value = normal.sample(rng).max(0.0);
            samples.push(YearlySample::valid(year, value));
        }
    }

    let gaps = samples.iter().filter(|s| s.outcome.is_err()).count();
    logging::debug(
        Component::Synthetic,
        Some(spec.id),
        &format!("generated {} samples ({} gaps)", samples.len(), gaps),
    );

    Ok(samples)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasets::Registry;
    use crate::model::valid_values;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn wind() -> EventSpec {
        Registry::builtin().unwrap().get("wind_high").unwrap().clone()
    }

    #[test]
    fn test_one_sample_per_valid_year() {
        let spec = wind();
        let mut rng = StdRng::seed_from_u64(7);
        let samples = generate_samples(&spec, &mut rng).unwrap();

        assert_eq!(samples.len(), spec.year_count());
        assert_eq!(samples.first().unwrap().year, 1991);
        assert_eq!(samples.last().unwrap().year, 2020);
    }

    #[test]
    fn test_values_are_never_negative() {
        let spec = wind();
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..100 {
            let samples = generate_samples(&spec, &mut rng).unwrap();
            assert!(valid_values(&samples).iter().all(|&v| v >= 0.0));
        }
    }

    #[test]
    fn test_gap_rate_and_mean_follow_threshold() {
        let spec = wind();
        let mut rng = StdRng::seed_from_u64(42);

        let mut total = 0usize;
        let mut gaps = 0usize;
        let mut values = Vec::new();
        for _ in 0..200 {
            let samples = generate_samples(&spec, &mut rng).unwrap();
            total += samples.len();
            gaps += samples.iter().filter(|s| s.outcome == Err(SkipReason::SyntheticGap)).count();
            values.extend(valid_values(&samples));
        }

        let gap_rate = gaps as f64 / total as f64;
        assert!((0.07..0.13).contains(&gap_rate), "gap rate {} not near 10%", gap_rate);

        let mean = values.iter().sum::<f64>() / values.len() as f64;
        assert!((6.6..7.4).contains(&mean), "mean {} not near 0.7 x 10.0", mean);
    }

    #[test]
    fn test_same_seed_same_series() {
        let spec = wind();
        let a = generate_samples(&spec, &mut StdRng::seed_from_u64(3)).unwrap();
        let b = generate_samples(&spec, &mut StdRng::seed_from_u64(3)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_non_finite_threshold_fails_the_event() {
        let mut spec = wind();
        spec.default_threshold = f64::NAN;
        let err = generate_samples(&spec, &mut StdRng::seed_from_u64(1)).unwrap_err();
        assert!(matches!(err, EventFailure::Synthetic(_)));
    }
}
