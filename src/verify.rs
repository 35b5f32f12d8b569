//! Dataset Verification Module
//!
//! Checks every registered dataset against its live source: can the
//! resolved locator be opened, and does it expose the coordinate axes and
//! value fields the registry says it does.
//!
//! Run this before adding or re-pointing a dataset.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::datasets::{EventSpec, Registry, TemporalResolution};
use crate::ingest::{GridHandle, GridSource};

/// Probe date used when none is given: mid-July of the last year most
/// datasets cover.
pub const DEFAULT_PROBE: (i32, u32, u32) = (2019, 7, 15);

// ============================================================================
// Verification Results
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationReport {
    pub timestamp: String,
    pub probe_date: String,
    pub results: Vec<DatasetVerification>,
    pub summary: VerificationSummary,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct VerificationSummary {
    pub total: usize,
    pub working: usize,
    pub partial: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetVerification {
    pub event_id: String,
    pub name: String,
    pub locator: Option<String>,
    pub status: VerificationStatus,
    pub opened: bool,
    pub axes_found: Vec<String>,
    pub fields_found: Vec<String>,
    pub fields_missing: Vec<String>,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum VerificationStatus {
    Success,
    PartialSuccess,
    Failed,
}

// ============================================================================
// Single Dataset
// ============================================================================

/// Opens one dataset for the probe date and inventories what it exposes.
///
/// `Success` means every axis and value field is present; `PartialSuccess`
/// means it opened but something is missing.
pub fn verify_dataset<S: GridSource>(
    source: &S,
    spec: &EventSpec,
    probe_year: i32,
    month: u32,
    day: u32,
) -> DatasetVerification {
    let mut result = DatasetVerification {
        event_id: spec.id.to_string(),
        name: spec.display_name.to_string(),
        locator: None,
        status: VerificationStatus::Failed,
        opened: false,
        axes_found: Vec::new(),
        fields_found: Vec::new(),
        fields_missing: Vec::new(),
        error_message: None,
    };

    let locator = match spec.source.resolve(probe_year, month, day) {
        Ok(locator) => locator,
        Err(e) => {
            result.error_message = Some(format!("Cannot resolve locator: {}", e));
            return result;
        }
    };
    result.locator = Some(locator.clone());

    let handle = match source.open(&locator) {
        Ok(handle) => handle,
        Err(e) => {
            result.error_message = Some(format!("Open failed: {}", e));
            return result;
        }
    };
    result.opened = true;

    let mut problems = Vec::new();

    for axis in [spec.axes.lat, spec.axes.lon] {
        match handle.axis(axis) {
            Ok(values) if !values.is_empty() => result.axes_found.push(axis.to_string()),
            Ok(_) => problems.push(format!("axis {} is empty", axis)),
            Err(e) => problems.push(e.to_string()),
        }
    }

    if spec.temporal_resolution != TemporalResolution::HarmonicConstant {
        match handle.time_axis(spec.axes.time) {
            Ok(times) if !times.is_empty() => result.axes_found.push(spec.axes.time.to_string()),
            Ok(_) => problems.push(format!("axis {} is empty", spec.axes.time)),
            Err(e) => problems.push(e.to_string()),
        }
    }

    for &field in spec.value_fields {
        if handle.has_variable(field) {
            result.fields_found.push(field.to_string());
        } else {
            result.fields_missing.push(field.to_string());
        }
    }
    if !result.fields_missing.is_empty() {
        problems.push(format!("missing fields: {}", result.fields_missing.join(", ")));
    }

    if problems.is_empty() {
        result.status = VerificationStatus::Success;
    } else {
        result.status = VerificationStatus::PartialSuccess;
        result.error_message = Some(problems.join("; "));
    }

    result
}

// ============================================================================
// Full Verification Runner
// ============================================================================

pub fn run_full_verification<S: GridSource>(
    source: &S,
    registry: &Registry,
    (probe_year, month, day): (i32, u32, u32),
) -> VerificationReport {
    let mut report = VerificationReport {
        timestamp: Utc::now().to_rfc3339(),
        probe_date: format!("{:04}-{:02}-{:02}", probe_year, month, day),
        results: Vec::new(),
        summary: VerificationSummary::default(),
    };

    println!("🔍 Verifying datasets ({})...", report.probe_date);

    for spec in registry.iter() {
        // Datasets that end before the probe year are checked at their last year.
        let year = probe_year.clamp(spec.valid_years.0, spec.valid_years.1);

        print!("  {} ... ", spec.id);
        let result = verify_dataset(source, spec, year, month, day);

        match result.status {
            VerificationStatus::Success => {
                println!("✓ OK ({} fields)", result.fields_found.len());
                report.summary.working += 1;
            }
            VerificationStatus::PartialSuccess => {
                println!("⚠ Partial: {}", result.error_message.as_deref().unwrap_or("Unknown"));
                report.summary.partial += 1;
            }
            VerificationStatus::Failed => {
                println!("✗ FAILED: {}", result.error_message.as_deref().unwrap_or("Unknown"));
                report.summary.failed += 1;
            }
        }

        report.results.push(result);
    }

    report.summary.total = report.results.len();
    report
}

pub fn print_summary(report: &VerificationReport) {
    println!("\n═══════════════════════════════════════════════════════════");
    println!("📊 VERIFICATION SUMMARY");
    println!("═══════════════════════════════════════════════════════════");
    println!();
    println!("Probe date:      {}", report.probe_date);
    println!(
        "Datasets:        {}/{} working  ({} partial, {} failed)",
        report.summary.working, report.summary.total, report.summary.partial, report.summary.failed
    );
    println!();

    let success_rate = if report.summary.total > 0 {
        (report.summary.working as f64 / report.summary.total as f64) * 100.0
    } else {
        0.0
    };

    println!(
        "Overall Success Rate: {:.1}% ({}/{})",
        success_rate, report.summary.working, report.summary.total
    );
    println!("═══════════════════════════════════════════════════════════");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SourceError;
    use chrono::{NaiveDate, NaiveDateTime};

    /// Opens every locator; exposes lat/lon/time and the variables listed.
    struct Stub {
        variables: &'static [&'static str],
        refuse: bool,
    }

    struct StubHandle {
        variables: &'static [&'static str],
    }

    impl GridSource for Stub {
        type Handle = StubHandle;

        fn open(&self, locator: &str) -> Result<StubHandle, SourceError> {
            if self.refuse {
                return Err(SourceError::Unauthorized { status: 401, url: locator.to_string() });
            }
            Ok(StubHandle { variables: self.variables })
        }
    }

    impl GridHandle for StubHandle {
        fn has_variable(&self, name: &str) -> bool {
            self.variables.iter().any(|v| *v == name)
        }

        fn axis(&self, _name: &str) -> Result<Vec<f64>, SourceError> {
            Ok(vec![0.0, 1.0])
        }

        fn time_axis(&self, _name: &str) -> Result<Vec<NaiveDateTime>, SourceError> {
            Ok(vec![NaiveDate::from_ymd_opt(2019, 7, 15).unwrap().and_hms_opt(0, 0, 0).unwrap()])
        }

        fn read_point(&self, _variable: &str, _selection: &[(&str, usize)]) -> Result<f64, SourceError> {
            Ok(1.0)
        }
    }

    fn registry() -> Registry {
        Registry::builtin().unwrap()
    }

    #[test]
    fn test_all_fields_present_is_success() {
        let source = Stub { variables: &["uwnd", "vwnd"], refuse: false };
        let registry = registry();
        let result = verify_dataset(&source, registry.get("wind_high").unwrap(), 2019, 7, 15);

        assert_eq!(result.status, VerificationStatus::Success);
        assert_eq!(result.axes_found, vec!["lat", "lon", "time"]);
        assert!(result.locator.unwrap().contains("201907"));
    }

    #[test]
    fn test_missing_field_is_partial() {
        let source = Stub { variables: &["uwnd"], refuse: false };
        let registry = registry();
        let result = verify_dataset(&source, registry.get("wind_high").unwrap(), 2019, 7, 15);

        assert_eq!(result.status, VerificationStatus::PartialSuccess);
        assert_eq!(result.fields_missing, vec!["vwnd"]);
    }

    #[test]
    fn test_refused_open_is_failed() {
        let source = Stub { variables: &[], refuse: true };
        let registry = registry();
        let result = verify_dataset(&source, registry.get("sst_high").unwrap(), 2019, 7, 15);

        assert_eq!(result.status, VerificationStatus::Failed);
        assert!(!result.opened);
        assert!(result.error_message.unwrap().contains("401"));
    }

    #[test]
    fn test_full_run_counts_every_dataset() {
        let source = Stub { variables: &[], refuse: true };
        let report = run_full_verification(&source, &registry(), DEFAULT_PROBE);

        assert_eq!(report.summary.total, 9);
        assert_eq!(report.summary.failed, 9);
        assert_eq!(report.probe_date, "2019-07-15");
        assert!(serde_json::to_string(&report).is_ok());
    }
}
