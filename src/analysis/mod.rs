//! Numeric core of the probability calculation.
//!
//! Everything here is pure: no I/O, no logging, no randomness.
//!
//! Submodules:
//! - `derive`: turns the raw value fields read at a grid point into the
//!   single scalar compared against the threshold.
//! - `exceedance`: reduces a series of yearly values to an exceedance ratio.

pub mod derive;
pub mod exceedance;
