//! Input/output helpers.
//!
//! - run/partition CSV ingest + validation (`ingest`)
//! - archive directory discovery (`archive`)
//! - JSON manifests (`manifest`)
//! - `.dat`, script and summary exports (`export`)

pub mod archive;
pub mod export;
pub mod ingest;
pub mod manifest;

pub use archive::*;
pub use export::*;
pub use ingest::*;
pub use manifest::*;
