//! Gnuplot-readable data blocks.
//!
//! The same writers feed inline `$data << EOD` blocks and the `.dat` files of
//! `fwx save`, so a saved file can be plotted by hand with the same template.

use std::io::{self, Write};

use crate::domain::{
    AnalyzedData, CapePartition, EnsembleSeries, GP_DATE_FORMAT, MergedSeries, MetaData, PartitionProfile,
};

/// Ensemble members in block format: one block per model run.
pub fn write_ensemble_data<W: Write>(ens: &EnsembleSeries<AnalyzedData>, dest: &mut W) -> io::Result<()> {
    write_meta_data_header(&ens.meta, dest)?;
    writeln!(dest, "valid_time lead_time e0 de hdw")?;

    for (init_time, series) in &ens.data {
        writeln!(dest, "# init_time: {}", init_time.format(GP_DATE_FORMAT))?;
        for row in series.as_ref() {
            writeln!(
                dest,
                "{} {} {} {} {}",
                row.valid_time.format(GP_DATE_FORMAT),
                row.lead_time,
                row.e0,
                row.de,
                row.hdw
            )?;
        }
        // Block separator
        writeln!(dest)?;
    }
    Ok(())
}

/// The merged series, one line per valid time.
pub fn write_merged_data<W: Write>(mrg: &MergedSeries<AnalyzedData>, dest: &mut W) -> io::Result<()> {
    write_meta_data_header(&mrg.meta, dest)?;
    writeln!(dest, "valid_time lead_time dt0 e0 de hdw")?;

    for row in mrg.data.as_ref() {
        writeln!(
            dest,
            "{} {} {} {} {} {}",
            row.valid_time.format(GP_DATE_FORMAT),
            row.lead_time,
            row.dt0,
            row.e0,
            row.de,
            row.hdw
        )?;
    }
    Ok(())
}

/// Merged CAPE partitions in grid format: one block per valid time.
pub fn write_heat_map_data<W: Write>(parts: &MergedSeries<PartitionProfile>, dest: &mut W) -> io::Result<()> {
    write_meta_data_header(&parts.meta, dest)?;
    writeln!(dest, "valid_time dt dry_cape wet_cape")?;

    for profile in parts.data.as_ref() {
        for CapePartition {
            valid_time,
            dt,
            dry,
            wet,
        } in &profile.rows
        {
            writeln!(dest, "{} {} {} {}", valid_time.format(GP_DATE_FORMAT), dt, dry, wet)?;
        }
        writeln!(dest)?;
    }
    Ok(())
}

/// Metadata as gnuplot comments.
pub fn write_meta_data_header<W: Write>(meta: &MetaData, dest: &mut W) -> io::Result<()> {
    writeln!(
        dest,
        "# Site: {}\n# Model: {}\n# Start: {}\n# Now: {}\n# End: {}\n",
        meta.site.id,
        meta.model,
        meta.start.format(GP_DATE_FORMAT),
        meta.now.format(GP_DATE_FORMAT),
        meta.end.format(GP_DATE_FORMAT)
    )
}
