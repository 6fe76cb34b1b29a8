//! Write results to disk: gnuplot data files, standalone scripts, JSON summaries.
//!
//! The `.dat` files use the same writers as the inline plot data blocks, so
//! they can be fed back to the templates by hand.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::domain::{AnalyzedData, EnsembleSeries, MergedSeries, PartitionProfile};
use crate::error::AppError;
use crate::plot::datablock::{write_ensemble_data, write_heat_map_data, write_merged_data};
use crate::plot::script::{Figure, session_preamble};
use crate::report::EnsembleSummary;

/// Write `<stem>_ens.dat`, `<stem>_mrg.dat` and, when there is heat-map data,
/// `<stem>_hm.dat` into `dir`. Returns the written paths.
pub fn save_ensemble(
    dir: &Path,
    ensemble: &EnsembleSeries<AnalyzedData>,
    merged: &MergedSeries<AnalyzedData>,
    partitions: Option<&MergedSeries<PartitionProfile>>,
) -> Result<Vec<PathBuf>, AppError> {
    ensure_dir(dir)?;
    let stem = ensemble.meta.file_stem();
    let mut written = Vec::with_capacity(3);

    let path = dir.join(format!("{stem}_ens.dat"));
    write_with(&path, |w| write_ensemble_data(ensemble, w))?;
    written.push(path);

    let path = dir.join(format!("{stem}_mrg.dat"));
    write_with(&path, |w| write_merged_data(merged, w))?;
    written.push(path);

    if let Some(parts) = partitions.filter(|p| !p.is_empty()) {
        let path = dir.join(format!("{stem}_hm.dat"));
        write_with(&path, |w| write_heat_map_data(parts, w))?;
        written.push(path);
    }

    Ok(written)
}

/// Write a figure as a self-contained gnuplot script: `<dir>/<stem>.gp`.
pub fn write_script(dir: &Path, output_prefix: &str, figure: &Figure) -> Result<PathBuf, AppError> {
    ensure_dir(dir)?;
    let path = dir.join(format!("{}.gp", figure.stem()));
    write_with(&path, |w| {
        w.write_all(&session_preamble(output_prefix))?;
        w.write_all(&figure.script)
    })?;
    Ok(path)
}

#[derive(Serialize)]
struct SummaryFile<'a> {
    tool: &'static str,
    ensembles: &'a [EnsembleSummary],
}

/// Write ensemble summaries as pretty JSON.
pub fn write_summary_json(path: &Path, summaries: &[EnsembleSummary]) -> Result<(), AppError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        ensure_dir(parent)?;
    }
    let file = File::create(path)
        .map_err(|e| AppError::runtime(format!("Failed to create summary JSON '{}': {e}", path.display())))?;

    let doc = SummaryFile {
        tool: "fwx",
        ensembles: summaries,
    };
    serde_json::to_writer_pretty(BufWriter::new(file), &doc)
        .map_err(|e| AppError::runtime(format!("Failed to write summary JSON: {e}")))?;

    Ok(())
}

fn ensure_dir(dir: &Path) -> Result<(), AppError> {
    fs::create_dir_all(dir)
        .map_err(|e| AppError::runtime(format!("Failed to create directory '{}': {e}", dir.display())))
}

fn write_with<F>(path: &Path, body: F) -> Result<(), AppError>
where
    F: FnOnce(&mut BufWriter<File>) -> std::io::Result<()>,
{
    let file = File::create(path)
        .map_err(|e| AppError::runtime(format!("Failed to create '{}': {e}", path.display())))?;
    let mut w = BufWriter::new(file);
    body(&mut w)
        .and_then(|_| w.flush())
        .map_err(|e| AppError::runtime(format!("Failed to write '{}': {e}", path.display())))
}
