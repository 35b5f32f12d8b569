//! Probability engine.
//!
//! One call per request. Each requested event is evaluated independently:
//! gather one sample per valid year (real extraction or synthetic), fall back
//! to synthetic once if nothing real was usable, and reduce the surviving
//! values to an exceedance ratio. An event whose computation fails gets a
//! `null` slot; the rest of the request is unaffected.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use rand::Rng;

use crate::analysis::exceedance::{exceedance_ratio, round_probability, SampleSummary};
use crate::datasets::{EventSpec, Registry};
use crate::extract::YearExtractor;
use crate::ingest::GridSource;
use crate::logging::{self, Component};
use crate::model::{
    valid_values, CalculationRequest, EventFailure, ProbabilityError, ProbabilityResult, YearlySample,
};
use crate::synthetic;

/// Full request validation: ranges, non-empty event list, and registered ids.
///
/// The HTTP layer runs this before building the engine call; the engine runs
/// it again so it is safe to call directly.
pub fn validate_request(registry: &Registry, request: &CalculationRequest) -> Result<(), ProbabilityError> {
    request.validate_ranges()?;

    let unknown = registry.unknown_ids(&request.events);
    if !unknown.is_empty() {
        return Err(ProbabilityError::UnknownEvent {
            unknown: unknown.into_iter().map(String::from).collect(),
            valid: registry.all_ids().into_iter().map(String::from).collect(),
        });
    }

    Ok(())
}

pub struct ProbabilityEngine<S> {
    registry: Arc<Registry>,
    extractor: YearExtractor<S>,
}

impl<S: GridSource> ProbabilityEngine<S> {
    pub fn new(registry: Arc<Registry>, source: S) -> Self {
        Self {
            registry,
            extractor: YearExtractor::new(source),
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn source(&self) -> &S {
        self.extractor.source()
    }

    pub fn calculate(&self, request: &CalculationRequest) -> Result<ProbabilityResult, ProbabilityError> {
        self.calculate_with_rng(request, &mut rand::thread_rng())
    }

    /// [`calculate`](Self::calculate) with a caller-supplied random source
    /// for synthetic samples.
    pub fn calculate_with_rng<R: Rng + ?Sized>(
        &self,
        request: &CalculationRequest,
        rng: &mut R,
    ) -> Result<ProbabilityResult, ProbabilityError> {
        validate_request(&self.registry, request)?;

        logging::info(
            Component::Engine,
            None,
            &format!(
                "calculating {} event(s) at ({}, {}) on {:02}-{:02}{}",
                request.events.len(),
                request.lat,
                request.lon,
                request.month,
                request.day,
                if request.use_synthetic { " [synthetic]" } else { "" }
            ),
        );

        let mut result = ProbabilityResult::default();
        for event_id in &request.events {
            if result.get(event_id).is_some() {
                continue;
            }

            let spec = self
                .registry
                .get(event_id)
                .ok_or_else(|| ProbabilityError::Internal(format!("event '{}' vanished from registry", event_id)))?;
            let threshold = request.threshold_for(spec.id, spec.default_threshold);

            let computed = panic::catch_unwind(AssertUnwindSafe(|| {
                self.event_probability(spec, request, threshold, &mut *rng)
            }))
            .unwrap_or_else(|payload| Err(EventFailure::Panicked(panic_message(payload.as_ref()))));

            let probability = match computed {
                Ok(p) => {
                    logging::info(
                        Component::Engine,
                        Some(spec.id),
                        &format!("P(value > {}) = {}", threshold, p),
                    );
                    Some(p)
                }
                Err(e) => {
                    logging::error(Component::Engine, Some(spec.id), &e.to_string());
                    None
                }
            };
            result.insert(spec.id, probability);
        }

        Ok(result)
    }

    fn event_probability<R: Rng + ?Sized>(
        &self,
        spec: &EventSpec,
        request: &CalculationRequest,
        threshold: f64,
        rng: &mut R,
    ) -> Result<f64, EventFailure> {
        let samples = if request.use_synthetic {
            synthetic::generate_samples(spec, rng)?
        } else {
            self.real_or_fallback(spec, request, rng)?
        };

        let values = valid_values(&samples);
        if let Some(summary) = SampleSummary::from_values(&values) {
            logging::info(
                Component::Engine,
                Some(spec.id),
                &format!(
                    "{} values: min={:.3} max={:.3} mean={:.3} std={:.3} {}",
                    summary.count, summary.min, summary.max, summary.mean, summary.std_dev, spec.unit
                ),
            );
        }

        Ok(round_probability(exceedance_ratio(&values, threshold)))
    }

    fn real_or_fallback<R: Rng + ?Sized>(
        &self,
        spec: &EventSpec,
        request: &CalculationRequest,
        rng: &mut R,
    ) -> Result<Vec<YearlySample>, EventFailure> {
        let samples = self
            .extractor
            .collect(spec, request.lat, request.lon, request.month, request.day);

        if samples.iter().any(|s| s.outcome.is_ok()) {
            return Ok(samples);
        }

        logging::warn(
            Component::Engine,
            Some(spec.id),
            &format!("no usable years in {}..={}, substituting synthetic samples", spec.valid_years.0, spec.valid_years.1),
        );
        synthetic::generate_samples(spec, rng)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
