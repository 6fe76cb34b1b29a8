//! Reporting utilities: per-ensemble summaries and formatted terminal output.

use chrono::NaiveDateTime;
use serde::Serialize;

use crate::app::pipeline::PreparedEnsemble;

pub mod format;

pub use format::*;

/// Headline numbers for one ensemble.
///
/// Peaks and extremes are taken from the merged series, the best available
/// forecast for each valid time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnsembleSummary {
    pub site: String,
    pub site_name: String,
    pub model: String,
    pub start: NaiveDateTime,
    pub now: NaiveDateTime,
    pub end: NaiveDateTime,
    pub runs: usize,
    pub latest_init: Option<NaiveDateTime>,
    pub merged_points: usize,
    pub partitions: usize,
    pub peak_hdw: Option<(NaiveDateTime, f64)>,
    pub max_e0: Option<f64>,
    pub min_dt0: Option<f64>,
    pub row_errors: usize,
}

pub fn summarize(prep: &PreparedEnsemble) -> EnsembleSummary {
    let meta = &prep.merged.meta;
    let rows = prep.merged.data.as_ref();

    let peak_hdw = rows
        .iter()
        .filter(|r| r.hdw.is_finite())
        .fold(None, |best: Option<(NaiveDateTime, f64)>, r| match best {
            Some((_, v)) if v >= r.hdw => best,
            _ => Some((r.valid_time, r.hdw)),
        });

    EnsembleSummary {
        site: meta.site.id.clone(),
        site_name: meta.site.display_name().to_string(),
        model: meta.model.clone(),
        start: meta.start,
        now: meta.now,
        end: meta.end,
        runs: prep.ensemble.len(),
        latest_init: prep.ensemble.init_times().max(),
        merged_points: prep.merged.len(),
        partitions: prep.partitions.as_ref().map(|p| p.len()).unwrap_or(0),
        peak_hdw,
        max_e0: finite_extreme(rows.iter().map(|r| r.e0), f64::max),
        min_dt0: finite_extreme(rows.iter().map(|r| r.dt0), f64::min),
        row_errors: prep.row_errors.len(),
    }
}

fn finite_extreme<I, F>(values: I, pick: F) -> Option<f64>
where
    I: Iterator<Item = f64>,
    F: Fn(f64, f64) -> f64,
{
    values
        .filter(|v| v.is_finite())
        .fold(None, |acc, v| Some(acc.map_or(v, |a| pick(a, v))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AnalyzedData, EnsembleSeries, MetaData, Site, TimeSeries};
    use chrono::NaiveDate;

    fn at(h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2017, 9, 2)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    fn row(h: u32, lead: i32, hdw: f64, e0: f64, dt0: f64) -> AnalyzedData {
        AnalyzedData {
            valid_time: at(h),
            lead_time: lead,
            hdw,
            t0: 25.0,
            dt0,
            e0,
            de: 1.0,
        }
    }

    #[test]
    fn summary_uses_merged_values() {
        let meta = MetaData {
            site: Site {
                id: "kmso".to_string(),
                name: Some("Missoula".to_string()),
            },
            model: "gfs".to_string(),
            start: at(0),
            now: at(6),
            end: at(23),
        };
        let ensemble = EnsembleSeries {
            meta: meta.clone(),
            data: vec![
                // Older run has a bigger HDW at 12Z, but the newer run wins the merge.
                (at(0), TimeSeries::new(vec![row(6, 6, 80.0, 900.0, 1.0), row(12, 12, 500.0, 100.0, 0.5)])),
                (at(6), TimeSeries::new(vec![row(12, 6, 150.0, f64::NAN, 2.0), row(18, 12, 90.0, 300.0, f64::NAN)])),
            ],
        };
        let merged = ensemble.clone().merge();
        let prep = PreparedEnsemble {
            ensemble,
            merged,
            partitions: None,
            row_errors: Vec::new(),
            rows_read: 4,
        };

        let s = summarize(&prep);
        assert_eq!(s.runs, 2);
        assert_eq!(s.latest_init, Some(at(6)));
        assert_eq!(s.merged_points, 3);
        assert_eq!(s.partitions, 0);
        assert_eq!(s.peak_hdw, Some((at(12), 150.0)));
        assert_eq!(s.max_e0, Some(900.0));
        assert_eq!(s.min_dt0, Some(1.0));
        assert_eq!(s.site_name, "Missoula");
    }

    #[test]
    fn all_missing_values_give_none() {
        assert_eq!(finite_extreme([f64::NAN, f64::INFINITY].into_iter(), f64::max), None);
        assert_eq!(finite_extreme([2.0, f64::NAN, 5.0].into_iter(), f64::min), Some(2.0));
    }
}
