//! In-memory grid source shared by the integration tests.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

use exceedance_service::datasets::EventSpec;
use exceedance_service::ingest::{GridHandle, GridSource};
use exceedance_service::model::SourceError;

/// A single-cell dataset at (40N, 30E). Variables hold one value per time
/// step, or a single value when there is no time axis.
#[derive(Debug, Clone, Default)]
pub struct FakeDataset {
    times: Vec<NaiveDateTime>,
    vars: HashMap<String, Vec<f64>>,
}

impl FakeDataset {
    pub fn at_dates(dates: impl IntoIterator<Item = NaiveDate>) -> Self {
        Self {
            times: dates.into_iter().map(|d| d.and_time(NaiveTime::MIN)).collect(),
            vars: HashMap::new(),
        }
    }

    /// Time-invariant dataset (harmonic constants).
    pub fn constant() -> Self {
        Self::default()
    }

    pub fn with_var(mut self, name: &str, values: Vec<f64>) -> Self {
        self.vars.insert(name.to_string(), values);
        self
    }
}

#[derive(Debug, Default)]
pub struct FakeSource {
    datasets: HashMap<String, FakeDataset>,
    opened: Arc<AtomicUsize>,
    closed: Arc<AtomicUsize>,
}

impl FakeSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_dataset(mut self, locator: impl Into<String>, dataset: FakeDataset) -> Self {
        self.datasets.insert(locator.into(), dataset);
        self
    }

    /// One dataset per year, at the locator `spec` resolves to for that
    /// year's (month, day), holding a single time step with `value` in
    /// `field`. Years mapped to `None` get no dataset.
    pub fn with_yearly(
        mut self,
        spec: &EventSpec,
        month: u32,
        day: u32,
        field: &str,
        values: impl IntoIterator<Item = (i32, Option<f64>)>,
    ) -> Self {
        for (year, value) in values {
            let Some(value) = value else { continue };
            let locator = spec.source.resolve(year, month, day).expect("test date must exist");
            let date = NaiveDate::from_ymd_opt(year, month, day).expect("test date must exist");
            let dataset = FakeDataset::at_dates([date]).with_var(field, vec![value]);
            self.datasets.insert(locator, dataset);
        }
        self
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

pub struct FakeHandle {
    dataset: FakeDataset,
    closed: Arc<AtomicUsize>,
}

impl GridSource for FakeSource {
    type Handle = FakeHandle;

    fn open(&self, locator: &str) -> Result<FakeHandle, SourceError> {
        let dataset = self.datasets.get(locator).cloned().ok_or_else(|| SourceError::Http {
            status: 404,
            url: locator.to_string(),
        })?;
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(FakeHandle {
            dataset,
            closed: Arc::clone(&self.closed),
        })
    }
}

impl GridHandle for FakeHandle {
    fn has_variable(&self, name: &str) -> bool {
        self.dataset.vars.contains_key(name)
    }

    fn axis(&self, name: &str) -> Result<Vec<f64>, SourceError> {
        match name {
            "lat" => Ok(vec![40.0]),
            "lon" => Ok(vec![30.0]),
            other => Err(SourceError::MissingAxis(other.to_string())),
        }
    }

    fn time_axis(&self, name: &str) -> Result<Vec<NaiveDateTime>, SourceError> {
        if self.dataset.times.is_empty() {
            return Err(SourceError::MissingAxis(name.to_string()));
        }
        Ok(self.dataset.times.clone())
    }

    fn read_point(&self, variable: &str, selection: &[(&str, usize)]) -> Result<f64, SourceError> {
        let values = self
            .dataset
            .vars
            .get(variable)
            .ok_or_else(|| SourceError::MissingVariable(variable.to_string()))?;
        let time = selection
            .iter()
            .find(|(dim, _)| *dim == "time")
            .map(|(_, i)| *i)
            .unwrap_or(0);
        values.get(time).copied().ok_or_else(|| SourceError::IndexOutOfRange {
            dimension: "time".to_string(),
            index: time,
            size: values.len(),
        })
    }
}

impl Drop for FakeHandle {
    fn drop(&mut self) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}

/// July 15 of every year in `years`.
pub fn mid_july(years: std::ops::RangeInclusive<i32>) -> Vec<NaiveDate> {
    years
        .map(|y| NaiveDate::from_ymd_opt(y, 7, 15).expect("valid date"))
        .collect()
}
