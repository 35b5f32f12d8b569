/// Structured logging for the exceedance probability service
///
/// Provides context-rich logging with component and event identifiers,
/// timestamps, and severity levels. Supports both console output and
/// file-based logging for long-running server operation.

use chrono::Utc;
use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::sync::{Mutex, MutexGuard};

use crate::model::{SkipReason, SourceError};

// ---------------------------------------------------------------------------
// Log Levels
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::Debug => write!(f, "DEBUG"),
            LogLevel::Info => write!(f, "INFO"),
            LogLevel::Warning => write!(f, "WARN"),
            LogLevel::Error => write!(f, "ERROR"),
        }
    }
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warning),
            "error" => Ok(LogLevel::Error),
            other => Err(format!("unknown log level '{}'", other)),
        }
    }
}

// ---------------------------------------------------------------------------
// Components
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Component {
    Engine,
    OpenDap,
    Synthetic,
    Http,
    System,
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Component::Engine => write!(f, "ENGINE"),
            Component::OpenDap => write!(f, "DAP"),
            Component::Synthetic => write!(f, "SYNTH"),
            Component::Http => write!(f, "HTTP"),
            Component::System => write!(f, "SYS"),
        }
    }
}

// ---------------------------------------------------------------------------
// Failure Classification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureType {
    /// Expected failure - the year is simply absent (no file, no such date, fill value)
    Expected,
    /// Unexpected failure - indicates an auth, network or format problem worth attention
    Unexpected,
    /// Unknown - cannot determine if this is expected or not
    Unknown,
}

impl fmt::Display for FailureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureType::Expected => write!(f, "EXPECTED"),
            FailureType::Unexpected => write!(f, "UNEXPECTED"),
            FailureType::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

// ---------------------------------------------------------------------------
// Logger Configuration
// ---------------------------------------------------------------------------

/// Global logger instance
static LOGGER: Mutex<Option<Logger>> = Mutex::new(None);

pub struct Logger {
    /// Minimum log level to display
    min_level: LogLevel,
    /// Optional file path for logging
    log_file: Option<String>,
    /// Whether to include timestamps in console output
    console_timestamps: bool,
}

impl Logger {
    /// Initialize the global logger
    pub fn init(min_level: LogLevel, log_file: Option<String>, console_timestamps: bool) {
        let logger = Logger {
            min_level,
            log_file,
            console_timestamps,
        };

        *global() = Some(logger);
    }

    fn log(&self, level: LogLevel, component: Component, event_id: Option<&str>, message: &str) {
        if level < self.min_level {
            return;
        }

        let timestamp = Utc::now().format("%Y-%m-%d %H:%M:%S UTC");

        let event_part = event_id.map(|e| format!(" [{}]", e)).unwrap_or_default();
        let log_entry = format!(
            "{} {} {}{}: {}",
            timestamp,
            level,
            component,
            event_part,
            message
        );

        // Console output
        if self.console_timestamps {
            match level {
                LogLevel::Error | LogLevel::Warning => eprintln!("{}", log_entry),
                LogLevel::Info | LogLevel::Debug => println!("{}", log_entry),
            }
        } else {
            match level {
                LogLevel::Error => eprintln!("   ✗ {}{}: {}", component, event_part, message),
                LogLevel::Warning => eprintln!("   ⚠ {}{}: {}", component, event_part, message),
                LogLevel::Info => println!("   {}{}: {}", component, event_part, message),
                LogLevel::Debug => println!("   [DEBUG] {}{}: {}", component, event_part, message),
            }
        }

        // File output
        if let Some(ref path) = self.log_file {
            if let Err(e) = Self::append_to_file(path, &log_entry) {
                eprintln!("Failed to write to log file {}: {}", path, e);
            }
        }
    }

    fn append_to_file(path: &str, entry: &str) -> std::io::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        writeln!(file, "{}", entry)?;
        Ok(())
    }
}

/// A panic while logging must not disable logging for the rest of the process.
fn global() -> MutexGuard<'static, Option<Logger>> {
    LOGGER.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn emit(level: LogLevel, component: Component, event_id: Option<&str>, message: &str) {
    if let Some(logger) = global().as_ref() {
        logger.log(level, component, event_id, message);
    }
}

// ---------------------------------------------------------------------------
// Public Logging Functions
// ---------------------------------------------------------------------------

/// Initialize the global logger
pub fn init_logger(min_level: LogLevel, log_file: Option<&str>, console_timestamps: bool) {
    Logger::init(min_level, log_file.map(String::from), console_timestamps);
}

/// Log a general informational message
pub fn info(component: Component, event_id: Option<&str>, message: &str) {
    emit(LogLevel::Info, component, event_id, message);
}

/// Log a warning message
pub fn warn(component: Component, event_id: Option<&str>, message: &str) {
    emit(LogLevel::Warning, component, event_id, message);
}

/// Log an error message
pub fn error(component: Component, event_id: Option<&str>, message: &str) {
    emit(LogLevel::Error, component, event_id, message);
}

/// Log a debug message
pub fn debug(component: Component, event_id: Option<&str>, message: &str) {
    emit(LogLevel::Debug, component, event_id, message);
}

// ---------------------------------------------------------------------------
// Failure Classification Helpers
// ---------------------------------------------------------------------------

/// Classify a remote source failure.
pub fn classify_source_failure(err: &SourceError) -> FailureType {
    match err {
        // Per-year files that were never produced come back as 404
        SourceError::Http { status: 404, .. } => FailureType::Expected,
        SourceError::Http { status, .. } if *status >= 500 => FailureType::Unexpected,
        SourceError::Http { .. } => FailureType::Unknown,
        SourceError::Unauthorized { .. } => FailureType::Unexpected,
        SourceError::Request(_) => FailureType::Unexpected,
        SourceError::Parse(_) => FailureType::Unexpected,
        SourceError::MissingVariable(_) | SourceError::MissingAxis(_) => FailureType::Unexpected,
        SourceError::IndexOutOfRange { .. } => FailureType::Unknown,
        // Fixed-URL datasets that start later than their registered range
        SourceError::NoTimeStep { .. } => FailureType::Expected,
    }
}

/// Classify why a year was skipped.
pub fn classify_skip(reason: &SkipReason) -> FailureType {
    match reason {
        SkipReason::InvalidDate { .. } => FailureType::Expected,
        SkipReason::NotANumber => FailureType::Expected,
        SkipReason::SyntheticGap => FailureType::Expected,
        SkipReason::Source(err) => classify_source_failure(err),
    }
}

// ---------------------------------------------------------------------------
// Structured Failure Logging
// ---------------------------------------------------------------------------

/// Log a skipped year with automatic classification
pub fn log_year_skip(event_id: &str, year: i32, reason: &SkipReason) {
    let failure_type = classify_skip(reason);

    let message = format!("{} skipped [{}]: {}", year, failure_type, reason);

    match failure_type {
        FailureType::Expected => debug(Component::OpenDap, Some(event_id), &message),
        FailureType::Unexpected => error(Component::OpenDap, Some(event_id), &message),
        FailureType::Unknown => warn(Component::OpenDap, Some(event_id), &message),
    }
}

// ---------------------------------------------------------------------------
// Collection Summary Logging
// ---------------------------------------------------------------------------

/// Log a summary of one event's yearly collection
pub fn log_collection_summary(event_id: &str, total: usize, usable: usize) {
    let skipped = total - usable.min(total);
    let message = format!(
        "Collection complete: {}/{} years usable, {} skipped",
        usable,
        total,
        skipped
    );

    if skipped == 0 {
        info(Component::Engine, Some(event_id), &message);
    } else if usable == 0 {
        error(Component::Engine, Some(event_id), &message);
    } else {
        warn(Component::Engine, Some(event_id), &message);
    }
}
