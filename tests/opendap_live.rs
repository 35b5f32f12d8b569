//! Live OPeNDAP Tests
//!
//! These hit the real data servers and several need Earthdata credentials
//! (`EARTHDATA_USERNAME` / `EARTHDATA_PASSWORD`, read from `.env`). They are
//! ignored by default:
//!
//! ```text
//! cargo test --test opendap_live -- --ignored --nocapture
//! ```

use std::time::Duration;

use exceedance_service::config::Config;
use exceedance_service::datasets::Registry;
use exceedance_service::extract::YearExtractor;
use exceedance_service::ingest::opendap::OpendapSource;
use exceedance_service::ingest::{GridHandle, GridSource};
use exceedance_service::verify::{print_summary, run_full_verification, VerificationStatus, DEFAULT_PROBE};

fn live_source() -> OpendapSource {
    let config = Config::from_env().expect("config should load");
    OpendapSource::new(Duration::from_secs(60), &config.source.user_agent, config.credentials.clone())
        .expect("HTTP client should build")
}

#[test]
#[ignore]
fn test_noaa_sst_opens_without_credentials() {
    let registry = Registry::builtin().unwrap();
    let spec = registry.get("sst_high").unwrap();
    let locator = spec.source.resolve(2019, 7, 15).unwrap();

    let handle = live_source().open(&locator).expect("NOAA PSL should serve the SST dataset");
    assert!(handle.has_variable("sst"));

    let lat = handle.axis("lat").expect("lat axis");
    println!("lat axis: {} points from {} to {}", lat.len(), lat[0], lat[lat.len() - 1]);
    assert!(!lat.is_empty());
}

#[test]
#[ignore]
fn test_sst_single_year_value_is_plausible() {
    let registry = Registry::builtin().unwrap();
    let spec = registry.get("sst_high").unwrap();
    let extractor = YearExtractor::new(live_source());

    // Sea of Marmara, mid-July.
    let sample = extractor.extract(spec, 40.7, 28.0, 7, 15, 2019);
    println!("2019-07-15 SST at (40.7, 28.0): {:?}", sample.outcome);

    let value = sample.value().expect("SST should be readable");
    assert!((10.0..35.0).contains(&value), "implausible SST {}", value);
}

#[test]
#[ignore]
fn test_full_dataset_verification() {
    let registry = Registry::builtin().unwrap();
    let report = run_full_verification(&live_source(), &registry, DEFAULT_PROBE);
    print_summary(&report);

    let working = report
        .results
        .iter()
        .filter(|r| r.status != VerificationStatus::Failed)
        .count();

    // At least the open NOAA dataset should be reachable
    assert!(working > 0, "No datasets are reachable!");
}
