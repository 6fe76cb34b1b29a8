//! `fire-graphs` library crate.
//!
//! The binary (`fwx`) is a thin wrapper around this library so that:
//!
//! - loading, merging and script generation are testable without spawning processes
//! - the TUI and the batch subcommands share one pipeline

pub mod app;
pub mod cli;
pub mod domain;
pub mod error;
pub mod io;
pub mod plot;
pub mod report;
pub mod tui;
