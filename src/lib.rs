//! Historical exceedance probabilities for climate variables.
//!
//! Given a location and a calendar date, estimates how often each requested
//! variable (wind speed, wave height, sea-surface temperature, ...) exceeded
//! a threshold on that date across its ~30-year satellite record, reading
//! one grid point per year from remote OPeNDAP datasets.

pub mod analysis;
pub mod config;
pub mod datasets;
pub mod engine;
pub mod extract;
pub mod ingest;
pub mod logging;
pub mod model;
pub mod server;
pub mod synthetic;
pub mod verify;
