//! Formatted terminal output.
//!
//! We keep formatting code in one place so output changes are localized
//! (and covered by the snapshot tests below).

use crate::domain::GP_DATE_FORMAT;
use crate::io::ingest::RowError;
use crate::report::EnsembleSummary;

/// Table with one line per ensemble.
pub fn format_summary(summaries: &[EnsembleSummary]) -> String {
    let mut out = String::new();

    out.push_str("=== fwx - Fire Weather Ensembles ===\n");
    if let Some(first) = summaries.first() {
        out.push_str(&format!("Now: {}\n", first.now.format(GP_DATE_FORMAT)));
    }
    out.push('\n');

    out.push_str(
        format!(
            "{:<20} {:<8} {:>4} {:>6} {:>5} {:>8} {:<13} {:>8} {:>7} {:>6}\n",
            "site", "model", "runs", "points", "parts", "peak HDW", "at", "max E0", "min dT0", "errors"
        )
        .trim_end(),
    );
    out.push('\n');

    out.push_str(
        format!(
            "{:-<20} {:-<8} {:-<4} {:-<6} {:-<5} {:-<8} {:-<13} {:-<8} {:-<7} {:-<6}\n",
            "", "", "", "", "", "", "", "", "", ""
        )
        .trim_end(),
    );
    out.push('\n');

    for s in summaries {
        let (peak, peak_at) = match s.peak_hdw {
            Some((t, v)) => (format!("{v:.1}"), t.format(GP_DATE_FORMAT).to_string()),
            None => ("-".to_string(), "-".to_string()),
        };
        out.push_str(
            format!(
                "{:<20} {:<8} {:>4} {:>6} {:>5} {:>8} {:<13} {:>8} {:>7} {:>6}\n",
                truncate(&s.site_name, 20),
                truncate(&s.model.to_uppercase(), 8),
                s.runs,
                s.merged_points,
                s.partitions,
                peak,
                peak_at,
                fmt_opt(s.max_e0, 0),
                fmt_opt(s.min_dt0, 1),
                s.row_errors,
            )
            .trim_end(),
        );
        out.push('\n');
    }

    out
}

/// The first `limit` row errors, plus a count of the rest.
pub fn format_row_errors(errors: &[RowError], limit: usize) -> String {
    let mut out = String::new();
    if errors.is_empty() {
        return out;
    }

    out.push_str(&format!("Skipped rows ({}):\n", errors.len()));
    for e in errors.iter().take(limit) {
        out.push_str(&format!("  {e}\n"));
    }
    if errors.len() > limit {
        out.push_str(&format!("  ... and {} more\n", errors.len() - limit));
    }
    out
}

fn fmt_opt(v: Option<f64>, decimals: usize) -> String {
    match v {
        Some(v) => format!("{v:.decimals$}"),
        None => "-".to_string(),
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out = String::new();
    for (i, ch) in s.chars().enumerate() {
        if i + 1 >= max {
            break;
        }
        out.push(ch);
    }
    out.push('.');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveDateTime};
    use std::path::PathBuf;

    fn at(d: u32, h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2017, 9, d)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    fn summary() -> EnsembleSummary {
        EnsembleSummary {
            site: "kmso".to_string(),
            site_name: "Missoula".to_string(),
            model: "gfs".to_string(),
            start: at(1, 0),
            now: at(3, 0),
            end: at(10, 0),
            runs: 8,
            latest_init: Some(at(3, 0)),
            merged_points: 81,
            partitions: 60,
            peak_hdw: Some((at(4, 21), 312.44)),
            max_e0: Some(1523.7),
            min_dt0: None,
            row_errors: 2,
        }
    }

    #[test]
    fn summary_table_snapshot() {
        let txt = format_summary(&[summary()]);
        let expected = concat!(
            "=== fwx - Fire Weather Ensembles ===\n",
            "Now: 2017-09-03-00\n",
            "\n",
            "site                 model    runs points parts peak HDW at              max E0 min dT0 errors\n",
            "-------------------- -------- ---- ------ ----- -------- ------------- -------- ------- ------\n",
            "Missoula             GFS         8     81    60    312.4 2017-09-04-21     1524       -      2\n",
        );
        assert_eq!(txt, expected);
    }

    #[test]
    fn row_errors_are_capped() {
        let errors: Vec<RowError> = (1..=4)
            .map(|line| RowError {
                file: Some(PathBuf::from("run.csv")),
                line,
                message: "bad hdw".to_string(),
            })
            .collect();
        let txt = format_row_errors(&errors, 2);
        assert_eq!(
            txt,
            "Skipped rows (4):\n  run.csv:1: bad hdw\n  run.csv:2: bad hdw\n  ... and 2 more\n"
        );
        assert!(format_row_errors(&[], 5).is_empty());
    }

    #[test]
    fn truncate_marks_cut() {
        assert_eq!(truncate("Missoula County Airport Area", 10), "Missoula .");
    }
}
