//! Command-line parsing for the fire-weather graph generator.
//!
//! The goal of this module is to keep **argument parsing** and **command dispatch**
//! separate from loading and plotting code.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::domain::PlotField;

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "fwx", version, about = "Fire-weather ensemble graphs from model-run analyses")]
pub struct Cli {
    /// Log debug output (overridden by RUST_LOG).
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Plot every ensemble with gnuplot (or write the scripts with --script-only).
    Plot(PlotArgs),
    /// Save the ensemble, merged and heat-map data as gnuplot `.dat` files.
    Save(SaveArgs),
    /// Print a summary table, optionally with a terminal plot per ensemble.
    Summary(SummaryArgs),
    /// Browse ensembles in an interactive terminal viewer.
    Tui(TuiArgs),
}

/// Where the model runs come from and which ones to keep.
#[derive(Debug, Args, Clone)]
pub struct SourceArgs {
    /// Archive root laid out as `<site>/<model>/<YYYYMMDDHH>.csv`.
    #[arg(long, env = "FWX_ARCHIVE", value_name = "DIR")]
    pub archive: Option<PathBuf>,

    /// JSON manifest listing ensembles and their run files. Takes precedence over `--archive`.
    #[arg(long, value_name = "FILE")]
    pub manifest: Option<PathBuf>,

    /// Site id to include (repeatable; default all).
    #[arg(long = "site", value_name = "ID")]
    pub sites: Vec<String>,

    /// Model to include (repeatable; default all).
    #[arg(long = "model", value_name = "NAME")]
    pub models: Vec<String>,

    /// Reference time, e.g. 2017-09-02-12 or 2017-09-02T12:00 (default: current UTC hour).
    #[arg(long, value_name = "TIME")]
    pub now: Option<String>,

    /// Days before `now` to include.
    #[arg(long, default_value_t = 2)]
    pub days_back: i64,

    /// Forecast days for models without a known forecast length.
    #[arg(long, default_value_t = 3)]
    pub default_forecast_days: i64,
}

/// Output directory shared by commands that write files.
#[derive(Debug, Args, Clone)]
pub struct OutputArgs {
    /// Directory for images, scripts and `.dat` files.
    #[arg(short, long, env = "FWX_OUTPUT_DIR", default_value = ".", value_name = "DIR")]
    pub output_dir: PathBuf,
}

#[derive(Debug, Args, Clone)]
pub struct PlotArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    #[command(flatten)]
    pub output: OutputArgs,

    /// gnuplot executable.
    #[arg(long, env = "FWX_GNUPLOT", default_value = "gnuplot")]
    pub gnuplot: String,

    /// Write standalone `.gp` scripts instead of running gnuplot.
    #[arg(long)]
    pub script_only: bool,
}

#[derive(Debug, Args, Clone)]
pub struct SaveArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    #[command(flatten)]
    pub output: OutputArgs,
}

#[derive(Debug, Args, Clone)]
pub struct SummaryArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    /// Render an ASCII plot per ensemble.
    #[arg(long)]
    pub plot: bool,

    /// Value to plot.
    #[arg(long, value_enum, default_value_t = PlotField::Hdw)]
    pub field: PlotField,

    /// Plot width (columns).
    #[arg(long, default_value_t = 100)]
    pub width: usize,

    /// Plot height (rows).
    #[arg(long, default_value_t = 20)]
    pub height: usize,

    /// Also write the summaries as JSON.
    #[arg(long = "export-json", value_name = "FILE")]
    pub export_json: Option<PathBuf>,
}

#[derive(Debug, Args, Clone)]
pub struct TuiArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    #[command(flatten)]
    pub output: OutputArgs,

    /// Field shown first.
    #[arg(long, value_enum, default_value_t = PlotField::Hdw)]
    pub field: PlotField,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_repeatable_filters() {
        let cli = Cli::parse_from([
            "fwx", "summary", "--manifest", "m.json", "--site", "kmso", "--site", "c18", "--model", "gfs",
            "--field", "de-ratio",
        ]);
        let Command::Summary(args) = cli.command else {
            panic!("expected summary");
        };
        assert_eq!(args.source.sites, vec!["kmso", "c18"]);
        assert_eq!(args.source.models, vec!["gfs"]);
        assert_eq!(args.field, PlotField::DeRatio);
        assert_eq!(args.source.days_back, 2);
    }
}
