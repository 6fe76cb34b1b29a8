//! Model-run archive on disk.
//!
//! Layout:
//!
//! ```text
//! <root>/<site_id>/site.json                 optional: {"name": "Missoula"}
//! <root>/<site_id>/<model>/<YYYYMMDDHH>.csv   one file per model run
//! <root>/<site_id>/<model>/<YYYYMMDDHH>_cape.csv
//! ```
//!
//! Discovery is deterministic (sorted by site, then model, then init time) and
//! never opens the run files themselves; parsing happens later in parallel.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{Duration, NaiveDateTime};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::domain::{MetaData, Site, forecast_days};
use crate::error::AppError;
use crate::io::ingest::{init_time_from_path, is_partition_file};

/// Run files of one site/model pair, plus the metadata they will be plotted with.
#[derive(Debug, Clone, PartialEq)]
pub struct EnsembleSource {
    pub meta: MetaData,
    pub files: Vec<PathBuf>,
}

/// Which part of the archive to load.
#[derive(Debug, Clone)]
pub struct ArchiveQuery {
    /// Site ids to keep (case-insensitive). Empty keeps all.
    pub sites: Vec<String>,
    /// Model names to keep (case-insensitive). Empty keeps all.
    pub models: Vec<String>,
    pub now: NaiveDateTime,
    pub days_back: i64,
    pub default_forecast_days: i64,
}

#[derive(Debug, Deserialize)]
struct SiteFile {
    name: Option<String>,
}

/// Find every site/model pair with at least one run initialized inside its window.
///
/// The window is `now - days_back ..= now + forecast_days(model)`.
pub fn discover(root: &Path, query: &ArchiveQuery) -> Result<Vec<EnsembleSource>, AppError> {
    if !root.is_dir() {
        return Err(AppError::input(format!(
            "Archive directory not found: {}",
            root.display()
        )));
    }
    if query.days_back < 0 {
        return Err(AppError::input("--days-back must not be negative."));
    }

    let mut out = Vec::new();

    for site_dir in sorted_subdirs(root)? {
        let site_id = dir_name(&site_dir);
        if !matches_filter(&site_id, &query.sites) {
            continue;
        }
        let site = Site {
            name: read_site_name(&site_dir),
            id: site_id,
        };

        for model_dir in sorted_subdirs(&site_dir)? {
            let model = dir_name(&model_dir);
            if !matches_filter(&model, &query.models) {
                continue;
            }

            let (start, end) = window(query.now, query.days_back, forecast_days(&model, query.default_forecast_days))?;

            let mut runs: Vec<(NaiveDateTime, PathBuf)> = list_run_files(&model_dir)?
                .into_iter()
                .filter_map(|path| match init_time_from_path(&path) {
                    Some(init) => Some((init, path)),
                    None => {
                        debug!(path = %path.display(), "skipping file without YYYYMMDDHH prefix");
                        None
                    }
                })
                .filter(|(init, _)| *init >= start && *init <= end)
                .collect();
            runs.sort();

            if runs.is_empty() {
                debug!(site = %site.id, %model, "no runs in window");
                continue;
            }

            out.push(EnsembleSource {
                meta: MetaData {
                    site: site.clone(),
                    model,
                    start,
                    now: query.now,
                    end,
                },
                files: runs.into_iter().map(|(_, path)| path).collect(),
            });
        }
    }

    Ok(out)
}

/// `now - days_back ..= now + days_ahead`, or an input error when it leaves chrono's range.
fn window(now: NaiveDateTime, days_back: i64, days_ahead: i64) -> Result<(NaiveDateTime, NaiveDateTime), AppError> {
    let start = Duration::try_days(days_back)
        .and_then(|d| now.checked_sub_signed(d))
        .ok_or_else(|| AppError::input(format!("--days-back {days_back} is out of range.")))?;
    let end = Duration::try_days(days_ahead)
        .and_then(|d| now.checked_add_signed(d))
        .ok_or_else(|| AppError::input(format!("Forecast length of {days_ahead} days is out of range.")))?;
    Ok((start, end))
}

fn read_site_name(site_dir: &Path) -> Option<String> {
    let path = site_dir.join("site.json");
    let text = fs::read_to_string(&path).ok()?;
    match serde_json::from_str::<SiteFile>(&text) {
        Ok(site) => site.name.filter(|n| !n.trim().is_empty()),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "ignoring invalid site.json");
            None
        }
    }
}

fn sorted_subdirs(dir: &Path) -> Result<Vec<PathBuf>, AppError> {
    let entries = fs::read_dir(dir)
        .map_err(|e| AppError::input(format!("Failed to read directory '{}': {e}", dir.display())))?;

    let mut out: Vec<PathBuf> = entries
        .flatten()
        .filter(|entry| entry.file_type().map(|ft| ft.is_dir()).unwrap_or(false))
        .map(|entry| entry.path())
        .filter(|path| !should_skip_dir(path))
        .collect();
    out.sort();
    Ok(out)
}

fn list_run_files(dir: &Path) -> Result<Vec<PathBuf>, AppError> {
    let entries = fs::read_dir(dir)
        .map_err(|e| AppError::input(format!("Failed to read directory '{}': {e}", dir.display())))?;

    Ok(entries
        .flatten()
        .filter(|entry| entry.file_type().map(|ft| ft.is_file()).unwrap_or(false))
        .map(|entry| entry.path())
        .filter(|path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| ext.eq_ignore_ascii_case("csv"))
                == Some(true)
        })
        .filter(|path| !is_partition_file(path))
        .collect())
}

fn should_skip_dir(path: &Path) -> bool {
    let name = path.file_name().and_then(|s| s.to_str()).unwrap_or("");
    name.starts_with('.') || name == "target"
}

fn dir_name(path: &Path) -> String {
    path.file_name()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_string()
}

/// Case-insensitive membership test; an empty filter keeps everything.
pub fn matches_filter(value: &str, filter: &[String]) -> bool {
    filter.is_empty() || filter.iter().any(|f| f.trim().eq_ignore_ascii_case(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::fs::File;

    fn at(d: u32, h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2017, 9, d)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        File::create(path).unwrap();
    }

    fn query() -> ArchiveQuery {
        ArchiveQuery {
            sites: Vec::new(),
            models: Vec::new(),
            now: at(5, 12),
            days_back: 2,
            default_forecast_days: 3,
        }
    }

    #[test]
    fn discovers_runs_inside_window() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        touch(&root.join("kmso/gfs/2017090212.csv"));
        touch(&root.join("kmso/gfs/2017090312.csv"));
        touch(&root.join("kmso/gfs/2017090312_cape.csv"));
        touch(&root.join("kmso/gfs/2017090600.csv"));
        touch(&root.join("kmso/gfs/notes.csv"));
        touch(&root.join("kmso/nam/2017090100.csv"));
        touch(&root.join(".git/gfs/2017090312.csv"));
        fs::write(root.join("kmso/site.json"), r#"{"name": "Missoula"}"#).unwrap();

        let sources = discover(root, &query()).unwrap();
        assert_eq!(sources.len(), 1);
        let src = &sources[0];
        assert_eq!(src.meta.site.display_name(), "Missoula");
        assert_eq!(src.meta.model, "gfs");
        assert_eq!(src.meta.start, at(3, 12));
        assert_eq!(src.meta.end, at(12, 12));
        let names: Vec<String> = src
            .files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["2017090312.csv", "2017090600.csv"]);
    }

    #[test]
    fn filters_sites_and_models_case_insensitively() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        touch(&root.join("kmso/gfs/2017090412.csv"));
        touch(&root.join("kmso/nam/2017090412.csv"));
        touch(&root.join("c18/gfs/2017090412.csv"));

        let q = ArchiveQuery {
            sites: vec!["KMSO".to_string()],
            models: vec!["NAM".to_string()],
            ..query()
        };
        let sources = discover(root, &q).unwrap();
        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0].meta.site.id, "kmso");
        assert_eq!(sources[0].meta.model, "nam");
        assert_eq!(sources[0].meta.site.name, None);
    }

    #[test]
    fn huge_window_is_input_error() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        touch(&root.join("kmso/gfs/2017090412.csv"));
        touch(&root.join("kmso/wrf/2017090412.csv"));

        let q = ArchiveQuery {
            days_back: 200_000_000,
            ..query()
        };
        let err = discover(root, &q).unwrap_err();
        assert_eq!(err.exit_code(), 2);
        assert!(err.message().contains("--days-back"));

        let q = ArchiveQuery {
            models: vec!["wrf".to_string()],
            default_forecast_days: i64::MAX,
            ..query()
        };
        assert_eq!(discover(root, &q).unwrap_err().exit_code(), 2);
    }

    #[test]
    fn missing_root_is_input_error() {
        let err = discover(Path::new("/no/such/archive"), &query()).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }
}
