//! # Configuration
//!
//! Centralized constants for page geometry, record framing, free-space
//! thresholds, and on-disk file names. Import constants from
//! [`constants`] rather than redefining them locally.

mod constants;

pub use constants::*;
