//! Shared domain types.
//!
//! These types are kept lightweight so they can be:
//!
//! - produced in parallel while ingesting model runs
//! - written out as gnuplot data blocks or JSON
//! - displayed in the terminal report and TUI

use std::path::PathBuf;

use chrono::{Duration, NaiveDateTime};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::domain::series::{ModelTimes, ValidTime};

/// Date format shared by gnuplot variables, data blocks and file names.
pub const GP_DATE_FORMAT: &str = "%Y-%m-%d-%H";

/// Forecast length (days) used for models we have no table entry for.
pub const DEFAULT_FORECAST_DAYS: i64 = 3;

/// A forecast location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Site {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Site {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
        }
    }

    /// Name if known, otherwise the id.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }
}

/// Where and when a set of series is valid.
///
/// `start..=end` bounds the plotted valid times and `now` is the reference
/// time marked on every figure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetaData {
    pub site: Site,
    pub model: String,
    pub start: NaiveDateTime,
    pub now: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl MetaData {
    /// Whole hours between `now` and `end`.
    pub fn num_hours(&self) -> i64 {
        (self.end - self.now).num_hours()
    }

    pub fn contains(&self, time: NaiveDateTime) -> bool {
        time >= self.start && time <= self.end
    }

    /// `<site>_<MODEL>`, the stem of every file produced for this ensemble.
    pub fn file_stem(&self) -> String {
        format!("{}_{}", self.site.id, self.model.to_uppercase())
    }

    pub fn title(&self) -> String {
        format!(
            "Fire Weather Parameters - {} - {}",
            self.site.display_name(),
            self.model.to_uppercase()
        )
    }
}

/// Fire-weather indices for one valid time of one model run.
///
/// Values the upstream analysis could not produce are `NaN`.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalyzedData {
    pub valid_time: NaiveDateTime,
    /// Hours since the model initialization.
    pub lead_time: i32,
    /// Hot-Dry-Windy index.
    pub hdw: f64,
    /// Plume initiation temperature (°C).
    pub t0: f64,
    /// Plume initiation temperature minus the environment (°C).
    pub dt0: f64,
    /// Plume energy at initiation (J/kg).
    pub e0: f64,
    /// Extra energy released by moisture (J/kg).
    pub de: f64,
}

impl AnalyzedData {
    pub fn field(&self, field: PlotField) -> f64 {
        match field {
            PlotField::Hdw => self.hdw,
            PlotField::E0 => self.e0,
            PlotField::De => self.de,
            PlotField::Dt0 => self.dt0,
            PlotField::T0 => self.t0,
            PlotField::DeRatio => {
                if self.e0 == 0.0 {
                    f64::NAN
                } else {
                    self.de / self.e0
                }
            }
        }
    }
}

impl ValidTime for AnalyzedData {
    fn valid_time(&self) -> Option<NaiveDateTime> {
        Some(self.valid_time)
    }
}

impl ModelTimes for AnalyzedData {
    fn lead_time(&self) -> Option<Duration> {
        Some(Duration::hours(i64::from(self.lead_time)))
    }
}

/// Dry and wet CAPE for a parcel warmed by `dt` over the mixed layer.
#[derive(Debug, Clone, PartialEq)]
pub struct CapePartition {
    pub valid_time: NaiveDateTime,
    pub dt: f64,
    pub dry: f64,
    pub wet: f64,
}

impl ValidTime for CapePartition {
    fn valid_time(&self) -> Option<NaiveDateTime> {
        Some(self.valid_time)
    }
}

/// Every CAPE partition of one model run at one valid time, ordered by `dt`.
#[derive(Debug, Clone, PartialEq)]
pub struct PartitionProfile {
    pub valid_time: NaiveDateTime,
    pub lead_time: i32,
    pub rows: Vec<CapePartition>,
}

impl ValidTime for PartitionProfile {
    fn valid_time(&self) -> Option<NaiveDateTime> {
        Some(self.valid_time)
    }
}

impl ModelTimes for PartitionProfile {
    fn lead_time(&self) -> Option<Duration> {
        Some(Duration::hours(i64::from(self.lead_time)))
    }
}

/// Which value to show in terminal output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PlotField {
    Hdw,
    E0,
    De,
    Dt0,
    T0,
    /// `de / e0`
    #[value(name = "de-ratio")]
    DeRatio,
}

impl PlotField {
    pub const ALL: [PlotField; 6] = [
        PlotField::Hdw,
        PlotField::E0,
        PlotField::De,
        PlotField::Dt0,
        PlotField::T0,
        PlotField::DeRatio,
    ];

    pub fn label(self) -> &'static str {
        match self {
            PlotField::Hdw => "HDW",
            PlotField::E0 => "E0 (J/kg)",
            PlotField::De => "dE (J/kg)",
            PlotField::Dt0 => "dT0 (C)",
            PlotField::T0 => "T0 (C)",
            PlotField::DeRatio => "dE/E0",
        }
    }

    pub fn next(self) -> Self {
        let idx = Self::ALL.iter().position(|f| *f == self).unwrap_or(0);
        Self::ALL[(idx + 1) % Self::ALL.len()]
    }

    pub fn prev(self) -> Self {
        let idx = Self::ALL.iter().position(|f| *f == self).unwrap_or(0);
        Self::ALL[(idx + Self::ALL.len() - 1) % Self::ALL.len()]
    }
}

/// Days of forecast data each model provides.
pub fn forecast_days(model: &str, default_days: i64) -> i64 {
    match model.to_ascii_lowercase().as_str() {
        "gfs" => 7,
        "nam" => 4,
        "nam4km" => 3,
        _ => default_days,
    }
}

/// Where the model runs come from.
#[derive(Debug, Clone)]
pub enum SourceSpec {
    /// `<root>/<site>/<model>/<YYYYMMDDHH>.csv`
    Archive {
        root: PathBuf,
        sites: Vec<String>,
        models: Vec<String>,
        now: NaiveDateTime,
        days_back: i64,
        default_forecast_days: i64,
    },
    /// Explicit list of ensembles in a JSON manifest, filtered like the archive.
    Manifest {
        path: PathBuf,
        sites: Vec<String>,
        models: Vec<String>,
    },
}

/// A full run's configuration as understood by the pipeline.
///
/// This is derived from CLI flags, environment and defaults.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub source: SourceSpec,
    pub output_dir: PathBuf,
    pub gnuplot: String,
    pub script_only: bool,

    pub field: PlotField,
    pub plot: bool,
    pub plot_width: usize,
    pub plot_height: usize,
    pub export_json: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(d: u32, h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2017, 9, d)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    #[test]
    fn forecast_days_known_models() {
        assert_eq!(forecast_days("GFS", 3), 7);
        assert_eq!(forecast_days("nam", 3), 4);
        assert_eq!(forecast_days("NAM4KM", 3), 3);
        assert_eq!(forecast_days("LocalWrf", 2), 2);
    }

    #[test]
    fn meta_naming() {
        let meta = MetaData {
            site: Site {
                id: "kmso".to_string(),
                name: Some("Missoula".to_string()),
            },
            model: "nam4km".to_string(),
            start: at(1, 12),
            now: at(2, 12),
            end: at(5, 12),
        };
        assert_eq!(meta.num_hours(), 72);
        assert_eq!(meta.file_stem(), "kmso_NAM4KM");
        assert_eq!(meta.title(), "Fire Weather Parameters - Missoula - NAM4KM");
        assert!(meta.contains(at(1, 12)));
        assert!(meta.contains(at(5, 12)));
        assert!(!meta.contains(at(5, 13)));
    }

    #[test]
    fn de_ratio_handles_zero_energy() {
        let row = AnalyzedData {
            valid_time: at(1, 0),
            lead_time: 0,
            hdw: 10.0,
            t0: 30.0,
            dt0: 2.0,
            e0: 0.0,
            de: 5.0,
        };
        assert!(row.field(PlotField::DeRatio).is_nan());
        let row = AnalyzedData { e0: 10.0, ..row };
        assert!((row.field(PlotField::DeRatio) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn field_cycle_wraps() {
        assert_eq!(PlotField::DeRatio.next(), PlotField::Hdw);
        assert_eq!(PlotField::Hdw.prev(), PlotField::DeRatio);
    }
}
