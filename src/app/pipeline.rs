//! Shared "ensemble pipeline" logic used by every subcommand and the TUI.
//!
//! Keeping this in one place avoids duplicating the core workflow:
//! discover sources -> parse runs (parallel) -> build ensembles -> merge
//!
//! The front-ends can then focus on presentation (gnuplot, files, tables, widgets).

use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::domain::{
    AnalyzedData, EnsembleList, EnsembleSeries, MergedSeries, MetaData, PartitionProfile, RunConfig, SourceSpec,
    TimeSeries,
};
use crate::error::AppError;
use crate::io::archive::{ArchiveQuery, EnsembleSource, discover, matches_filter};
use crate::io::ingest::{LoadedRun, RowError, TimeWindow, load_run};
use crate::io::manifest::read_manifest;

/// Every run of one site/model pair as read from disk.
#[derive(Debug, Clone)]
pub struct LoadedEnsemble {
    pub meta: MetaData,
    pub runs: Vec<LoadedRun>,
    /// Row problems plus whole files that could not be read.
    pub row_errors: Vec<RowError>,
}

/// An ensemble ready to plot, save or summarize.
#[derive(Debug, Clone)]
pub struct PreparedEnsemble {
    pub ensemble: EnsembleSeries<AnalyzedData>,
    pub merged: MergedSeries<AnalyzedData>,
    /// `None` when no run had partition data in the window.
    pub partitions: Option<MergedSeries<PartitionProfile>>,
    pub row_errors: Vec<RowError>,
    pub rows_read: usize,
}

/// Resolve the configured source into per-ensemble file lists.
pub fn resolve_sources(source: &SourceSpec) -> Result<Vec<EnsembleSource>, AppError> {
    match source {
        SourceSpec::Archive {
            root,
            sites,
            models,
            now,
            days_back,
            default_forecast_days,
        } => {
            let query = ArchiveQuery {
                sites: sites.clone(),
                models: models.clone(),
                now: *now,
                days_back: *days_back,
                default_forecast_days: *default_forecast_days,
            };
            discover(root, &query)
        }
        SourceSpec::Manifest { path, sites, models } => {
            let sources: Vec<EnsembleSource> = read_manifest(path)?
                .into_iter()
                .filter(|src| matches_filter(&src.meta.site.id, sites) && matches_filter(&src.meta.model, models))
                .collect();
            debug!(ensembles = sources.len(), "manifest ensembles after filters");
            Ok(sources)
        }
    }
}

/// Parse every run file of every source.
///
/// A file that cannot be read is logged and recorded as a row error on its
/// ensemble; it does not abort the others.
pub fn load_sources(sources: Vec<EnsembleSource>) -> Vec<LoadedEnsemble> {
    sources
        .into_par_iter()
        .map(|source| {
            let window = TimeWindow {
                start: source.meta.start,
                end: source.meta.end,
            };

            let results: Vec<_> = source
                .files
                .par_iter()
                .map(|path| (path, load_run(path, &window)))
                .collect();

            let mut runs = Vec::with_capacity(results.len());
            let mut row_errors = Vec::new();
            for (path, result) in results {
                match result {
                    Ok(run) => runs.push(run),
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "skipping unreadable run");
                        row_errors.push(RowError {
                            file: Some(path.clone()),
                            line: 0,
                            message: e.message().to_string(),
                        });
                    }
                }
            }

            LoadedEnsemble {
                meta: source.meta,
                runs,
                row_errors,
            }
        })
        .collect()
}

/// Build the ensemble and merged series. `None` if no run has data in the window.
pub fn prepare(loaded: LoadedEnsemble) -> Option<PreparedEnsemble> {
    let LoadedEnsemble {
        meta,
        runs,
        mut row_errors,
    } = loaded;

    let mut rows_read = 0;
    let mut analyzed = Vec::with_capacity(runs.len());
    let mut profiles = Vec::new();

    for run in runs {
        rows_read += run.rows_read;
        row_errors.extend(run.row_errors);

        if run.rows.is_empty() {
            debug!(path = %run.path.display(), "run has no rows in window");
            continue;
        }
        if !run.partitions.is_empty() {
            profiles.push((run.init_time, TimeSeries::new(run.partitions)));
        }
        analyzed.push((run.init_time, TimeSeries::new(run.rows)));
    }

    if analyzed.is_empty() {
        return None;
    }

    let mut ensemble = EnsembleList {
        meta: meta.clone(),
        data: analyzed,
    };
    ensemble.sort_by_init_time();
    let merged = ensemble.clone().merge();

    let partitions = if profiles.is_empty() {
        None
    } else {
        let mut parts = EnsembleList { meta, data: profiles };
        parts.sort_by_init_time();
        Some(parts.merge())
    };

    Some(PreparedEnsemble {
        ensemble,
        merged,
        partitions,
        row_errors,
        rows_read,
    })
}

/// Discover, load and prepare every ensemble of the configured source.
///
/// Fails with exit code 3 when nothing usable is left.
pub fn run_pipeline(config: &RunConfig) -> Result<Vec<PreparedEnsemble>, AppError> {
    let sources = resolve_sources(&config.source)?;
    if sources.is_empty() {
        return Err(AppError::no_data("No model runs found for the requested sites, models and window."));
    }
    info!(ensembles = sources.len(), "loading model runs");

    let loaded = load_sources(sources);

    // `collect` keeps the source order (archive: site, model; manifest: as listed).
    let prepared: Vec<PreparedEnsemble> = loaded
        .into_par_iter()
        .filter_map(|l| {
            let stem = l.meta.file_stem();
            let prep = prepare(l);
            if prep.is_none() {
                warn!(ensemble = %stem, "no usable data in window");
            }
            prep
        })
        .collect();

    if prepared.is_empty() {
        return Err(AppError::no_data("No ensemble has usable data in its window."));
    }

    for p in &prepared {
        info!(
            ensemble = %p.ensemble.meta.file_stem(),
            runs = p.ensemble.len(),
            merged = p.merged.len(),
            row_errors = p.row_errors.len(),
            "prepared"
        );
    }

    Ok(prepared)
}
