//! Checks every registered dataset against its live source and writes a
//! JSON report.
//!
//! Usage: `verify_datasets [YEAR MONTH DAY] [--out PATH]`

use std::process::ExitCode;

use exceedance_service::config::Config;
use exceedance_service::datasets::Registry;
use exceedance_service::ingest::opendap::OpendapSource;
use exceedance_service::logging;
use exceedance_service::verify::{print_summary, run_full_verification, DEFAULT_PROBE};

const DEFAULT_REPORT_PATH: &str = "verification_report.json";

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("✗ {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<(), String> {
    let (probe, out_path) = parse_args(std::env::args().skip(1).collect())?;

    let config = Config::from_env().map_err(|e| e.to_string())?;
    let level = config.log_level().map_err(|e| e.to_string())?;
    logging::init_logger(level, config.logging.file.as_deref(), false);

    let registry = Registry::builtin().map_err(|e| e.to_string())?;
    let source = OpendapSource::new(
        config.source_timeout(),
        &config.source.user_agent,
        config.credentials.clone(),
    )
    .map_err(|e| e.to_string())?;

    let report = run_full_verification(&source, &registry, probe);
    print_summary(&report);

    let json = serde_json::to_string_pretty(&report).map_err(|e| e.to_string())?;
    std::fs::write(&out_path, json).map_err(|e| format!("cannot write {}: {}", out_path, e))?;
    println!("\n📄 JSON report saved to: {}\n", out_path);

    Ok(())
}

fn parse_args(args: Vec<String>) -> Result<((i32, u32, u32), String), String> {
    let mut out_path = DEFAULT_REPORT_PATH.to_string();
    let mut positional = Vec::new();

    let mut iter = args.into_iter();
    while let Some(arg) = iter.next() {
        if arg == "--out" {
            out_path = iter.next().ok_or("--out needs a path")?;
        } else {
            positional.push(arg);
        }
    }

    let probe = match positional.as_slice() {
        [] => DEFAULT_PROBE,
        [year, month, day] => (
            year.parse().map_err(|_| format!("bad year '{}'", year))?,
            month.parse().map_err(|_| format!("bad month '{}'", month))?,
            day.parse().map_err(|_| format!("bad day '{}'", day))?,
        ),
        _ => return Err("usage: verify_datasets [YEAR MONTH DAY] [--out PATH]".to_string()),
    };

    Ok((probe, out_path))
}
