//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - sites, metadata and the per-row fire-weather records (`types`)
//! - ensemble / merged time-series containers (`series`)

pub mod series;
pub mod types;

pub use series::*;
pub use types::*;
