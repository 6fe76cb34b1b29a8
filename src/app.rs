//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - loads `.env` and parses CLI arguments
//! - sets up logging
//! - runs the shared ensemble pipeline
//! - hands the results to gnuplot, files, the terminal or the TUI

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{NaiveDateTime, Timelike, Utc};
use clap::Parser;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use crate::cli::{Command, PlotArgs, SaveArgs, SourceArgs, SummaryArgs, TuiArgs};
use crate::domain::{PlotField, RunConfig, SourceSpec};
use crate::error::AppError;
use crate::plot::{FigureSink, Gnuplot, ScriptFiles, ensemble_figure, merged_figure};

pub mod pipeline;

use pipeline::PreparedEnsemble;

/// How many row errors `fwx summary` lists before summarizing the rest.
const ROW_ERROR_LIMIT: usize = 10;

/// Entry point for the `fwx` binary.
pub fn run() -> Result<(), AppError> {
    // FWX_* defaults may live in a .env file.
    dotenvy::dotenv().ok();
    let cli = crate::cli::Cli::parse();

    // Log lines would corrupt the alternate screen.
    let is_tui = matches!(cli.command, Command::Tui(_));
    init_logging(cli.verbose, is_tui);

    match cli.command {
        Command::Plot(args) => handle_plot(args),
        Command::Save(args) => handle_save(args),
        Command::Summary(args) => handle_summary(args),
        Command::Tui(args) => handle_tui(args),
    }
}

fn init_logging(verbose: bool, only_with_rust_log: bool) {
    if only_with_rust_log && std::env::var_os("RUST_LOG").is_none() {
        return;
    }
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn handle_plot(args: PlotArgs) -> Result<(), AppError> {
    let mut config = run_config(&args.source, args.output.output_dir)?;
    config.gnuplot = args.gnuplot;
    config.script_only = args.script_only;

    let prepared = pipeline::run_pipeline(&config)?;
    let output_prefix = config.output_dir.to_string_lossy().into_owned();

    let mut sink: Box<dyn FigureSink> = if config.script_only {
        Box::new(ScriptFiles::new(config.output_dir.clone(), output_prefix))
    } else {
        ensure_output_dir(&config.output_dir)?;
        Box::new(Gnuplot::launch(&config.gnuplot, &output_prefix)?)
    };

    let plotted = plot_all(sink.as_mut(), &prepared)?;
    info!(ensembles = plotted, failed = prepared.len() - plotted, "done");
    Ok(())
}

/// Plot every ensemble, carrying on past failures. Returns how many succeeded;
/// exit code 4 when none did.
fn plot_all(sink: &mut dyn FigureSink, prepared: &[PreparedEnsemble]) -> Result<usize, AppError> {
    let mut failed = 0usize;
    for prep in prepared {
        if let Err(e) = plot_ensemble(sink, prep) {
            warn!(ensemble = %prep.ensemble.meta.file_stem(), error = %e, "plotting failed");
            failed += 1;
        }
    }
    sink.finish()?;

    if failed == prepared.len() {
        return Err(AppError::runtime(format!("Failed to plot all {failed} ensemble(s).")));
    }
    Ok(prepared.len() - failed)
}

/// Draw the plume figure and, when there is heat-map data, the merged figure.
fn plot_ensemble(sink: &mut dyn FigureSink, prep: &PreparedEnsemble) -> Result<(), AppError> {
    sink.draw(&ensemble_figure(&prep.ensemble)?)?;

    match &prep.partitions {
        Some(parts) => sink.draw(&merged_figure(&prep.merged, parts)?),
        None => {
            warn!(
                ensemble = %prep.merged.meta.file_stem(),
                "no CAPE partition data; skipping merged figure"
            );
            Ok(())
        }
    }
}

fn handle_save(args: SaveArgs) -> Result<(), AppError> {
    let config = run_config(&args.source, args.output.output_dir)?;
    let prepared = pipeline::run_pipeline(&config)?;

    for prep in &prepared {
        let written = crate::io::export::save_ensemble(
            &config.output_dir,
            &prep.ensemble,
            &prep.merged,
            prep.partitions.as_ref(),
        )?;
        for path in written {
            info!(path = %path.display(), "saved");
        }
    }
    Ok(())
}

fn handle_summary(args: SummaryArgs) -> Result<(), AppError> {
    let mut config = run_config(&args.source, PathBuf::from("."))?;
    config.field = args.field;
    config.plot = args.plot;
    config.plot_width = args.width;
    config.plot_height = args.height;
    config.export_json = args.export_json;

    let prepared = pipeline::run_pipeline(&config)?;
    let summaries: Vec<_> = prepared.iter().map(crate::report::summarize).collect();

    println!("{}", crate::report::format_summary(&summaries));

    let row_errors: Vec<_> = prepared.iter().flat_map(|p| p.row_errors.iter().cloned()).collect();
    let errors_txt = crate::report::format_row_errors(&row_errors, ROW_ERROR_LIMIT);
    if !errors_txt.is_empty() {
        println!("{errors_txt}");
    }

    if config.plot {
        for prep in &prepared {
            let plot = crate::plot::render_ascii_plot(
                &prep.ensemble,
                &prep.merged,
                config.field,
                config.plot_width,
                config.plot_height,
            );
            println!("{plot}");
        }
    }

    if let Some(path) = &config.export_json {
        crate::io::export::write_summary_json(path, &summaries)?;
        info!(path = %path.display(), "wrote summary JSON");
    }

    Ok(())
}

fn handle_tui(args: TuiArgs) -> Result<(), AppError> {
    let mut config = run_config(&args.source, args.output.output_dir)?;
    config.field = args.field;

    // Load before taking over the terminal so errors print normally.
    let prepared = pipeline::run_pipeline(&config)?;
    crate::tui::run(prepared, &config)
}

/// Build the pipeline configuration shared by all subcommands.
pub fn run_config(source: &SourceArgs, output_dir: PathBuf) -> Result<RunConfig, AppError> {
    Ok(RunConfig {
        source: source_spec(source, current_hour)?,
        output_dir,
        gnuplot: "gnuplot".to_string(),
        script_only: false,
        field: PlotField::Hdw,
        plot: false,
        plot_width: 100,
        plot_height: 20,
        export_json: None,
    })
}

/// Resolve the source flags. A manifest wins over an archive (which may come
/// from `FWX_ARCHIVE`).
fn source_spec(args: &SourceArgs, default_now: fn() -> NaiveDateTime) -> Result<SourceSpec, AppError> {
    if let Some(path) = &args.manifest {
        if args.archive.is_some() {
            debug!("--manifest given; ignoring archive setting");
        }
        return Ok(SourceSpec::Manifest {
            path: path.clone(),
            sites: args.sites.clone(),
            models: args.models.clone(),
        });
    }

    let Some(root) = &args.archive else {
        return Err(AppError::input(
            "No input: pass --archive DIR (or set FWX_ARCHIVE) or --manifest FILE.",
        ));
    };

    if args.days_back < 0 {
        return Err(AppError::input("--days-back must not be negative."));
    }
    if args.default_forecast_days < 0 {
        return Err(AppError::input("--default-forecast-days must not be negative."));
    }

    let now = match &args.now {
        Some(raw) => crate::io::ingest::parse_time(raw)
            .ok_or_else(|| AppError::input(format!("Invalid --now '{raw}'. Use e.g. 2017-09-02-12.")))?,
        None => default_now(),
    };

    Ok(SourceSpec::Archive {
        root: root.clone(),
        sites: args.sites.clone(),
        models: args.models.clone(),
        now,
        days_back: args.days_back,
        default_forecast_days: args.default_forecast_days,
    })
}

fn current_hour() -> NaiveDateTime {
    let now = Utc::now().naive_utc();
    now.date().and_hms_opt(now.hour(), 0, 0).unwrap_or(now)
}

fn ensure_output_dir(dir: &Path) -> Result<(), AppError> {
    fs::create_dir_all(dir)
        .map_err(|e| AppError::runtime(format!("Failed to create output directory '{}': {e}", dir.display())))
}
