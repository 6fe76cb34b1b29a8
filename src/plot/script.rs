//! Assemble the gnuplot input for one figure.
//!
//! A figure is: scalar variables, inline data blocks, then a static template.
//! The templates themselves are plain directive lists embedded at build time.

use std::io::{self, Write};

use crate::domain::{AnalyzedData, EnsembleSeries, GP_DATE_FORMAT, MergedSeries, MetaData, PartitionProfile};
use crate::error::AppError;
use crate::plot::datablock::{write_ensemble_data, write_heat_map_data, write_merged_data};

/// Terminal, time format and palettes; sent once per session.
pub const GP_INIT: &str = include_str!("templates/init.gp");
/// Three stacked panels of ensemble plumes.
pub const GP_PLOT_ENS: &str = include_str!("templates/ensemble.gp");
/// Merged series panels plus the wet/dry heat map.
pub const GP_PLOT_MRG: &str = include_str!("templates/merged.gp");

/// Which figure a script draws.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FigureKind {
    Ensemble,
    Merged,
}

/// Everything gnuplot needs to draw one image, minus the session setup.
#[derive(Debug, Clone)]
pub struct Figure {
    pub kind: FigureKind,
    pub output_name: String,
    pub script: Vec<u8>,
}

impl Figure {
    /// `output_name` without the image extension.
    pub fn stem(&self) -> &str {
        self.output_name
            .strip_suffix(".png")
            .unwrap_or(&self.output_name)
    }
}

/// `<site>_<MODEL>_ens.png`
pub fn ensemble_output_name(meta: &MetaData) -> String {
    format!("{}_ens.png", meta.file_stem())
}

/// `<site>_<MODEL>.png`
pub fn merged_output_name(meta: &MetaData) -> String {
    format!("{}.png", meta.file_stem())
}

/// Build the ensemble plume figure.
pub fn ensemble_figure(ens: &EnsembleSeries<AnalyzedData>) -> Result<Figure, AppError> {
    let output_name = ensemble_output_name(&ens.meta);
    let mut script = Vec::new();

    let res = (|| -> io::Result<()> {
        write_variables(&ens.meta, &output_name, &mut script)?;
        writeln!(script, "$data << EOD")?;
        write_ensemble_data(ens, &mut script)?;
        writeln!(script, "EOD")?;
        script.write_all(GP_PLOT_ENS.as_bytes())
    })();
    res.map_err(|e| AppError::runtime(format!("Failed to build ensemble script: {e}")))?;

    Ok(Figure {
        kind: FigureKind::Ensemble,
        output_name,
        script,
    })
}

/// Build the merged figure with its heat map.
///
/// Both series must describe the same site, model and window.
pub fn merged_figure(
    mrg: &MergedSeries<AnalyzedData>,
    parts: &MergedSeries<PartitionProfile>,
) -> Result<Figure, AppError> {
    if mrg.meta != parts.meta {
        return Err(AppError::runtime(format!(
            "Metadata mismatch between merged data ({}) and heat map data ({}).",
            mrg.meta.file_stem(),
            parts.meta.file_stem()
        )));
    }

    let output_name = merged_output_name(&mrg.meta);
    let mut script = Vec::new();

    let res = (|| -> io::Result<()> {
        write_variables(&mrg.meta, &output_name, &mut script)?;
        writeln!(script, "$data << EOD")?;
        write_merged_data(mrg, &mut script)?;
        writeln!(script, "EOD")?;
        writeln!(script, "$wet_dry_data << EOD")?;
        write_heat_map_data(parts, &mut script)?;
        writeln!(script, "EOD")?;
        script.write_all(GP_PLOT_MRG.as_bytes())
    })();
    res.map_err(|e| AppError::runtime(format!("Failed to build merged script: {e}")))?;

    Ok(Figure {
        kind: FigureKind::Merged,
        output_name,
        script,
    })
}

/// Session preamble: init template plus the output directory.
pub fn session_preamble(output_prefix: &str) -> Vec<u8> {
    let mut out = GP_INIT.as_bytes().to_vec();
    out.extend_from_slice(format!("output_prefix=\"{}\"\n", gp_escape(output_prefix)).as_bytes());
    out
}

/// Scalar variables read by the templates.
fn write_variables<W: Write>(meta: &MetaData, output_name: &str, dest: &mut W) -> io::Result<()> {
    writeln!(dest, "num_hours={}", meta.num_hours())?;
    writeln!(dest, "now_time=\"{}\"", meta.now.format(GP_DATE_FORMAT))?;
    writeln!(dest, "start_time=\"{}\"", meta.start.format(GP_DATE_FORMAT))?;
    writeln!(dest, "end_time=\"{}\"", meta.end.format(GP_DATE_FORMAT))?;
    writeln!(dest, "main_title=\"{}\"", gp_escape(&meta.title()))?;
    writeln!(dest, "output_name=\"{}\"", gp_escape(output_name))
}

/// Escape a value for a double-quoted gnuplot string.
pub fn gp_escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}
