//! CSV ingest and normalization.
//!
//! This module turns the per-run CSV files produced by the upstream analysis
//! into `AnalyzedData` rows and `PartitionProfile`s that are safe to merge and
//! plot.
//!
//! Design goals:
//! - **Strict schema** for required columns (clear errors + exit code 2)
//! - **Row-level validation** (skip bad rows, but report what happened)
//! - **Missing values stay visible**: empty or sentinel cells become `NaN`
//!   rather than dropping the row, so gaps show up in the figures

use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use chrono::{NaiveDate, NaiveDateTime};
use csv::StringRecord;
use tracing::debug;

use crate::domain::{AnalyzedData, CapePartition, PartitionProfile};
use crate::error::AppError;

/// Suffix (before `.csv`) marking a CAPE partition file.
pub const PARTITION_SUFFIX: &str = "_cape";

/// Inclusive range of valid times to keep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl TimeWindow {
    pub fn contains(&self, time: NaiveDateTime) -> bool {
        time >= self.start && time <= self.end
    }
}

/// A row-level error encountered during ingest.
#[derive(Debug, Clone, PartialEq)]
pub struct RowError {
    pub file: Option<PathBuf>,
    pub line: usize,
    pub message: String,
}

impl std::fmt::Display for RowError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.file {
            Some(file) => write!(f, "{}:{}: {}", file.display(), self.line, self.message),
            None => write!(f, "line {}: {}", self.line, self.message),
        }
    }
}

/// Parsed contents of one run file.
#[derive(Debug, Clone)]
pub struct RunTable {
    pub init_time: NaiveDateTime,
    /// Rows inside the window, sorted by valid time.
    pub rows: Vec<AnalyzedData>,
    pub row_errors: Vec<RowError>,
    pub rows_read: usize,
}

/// Parsed contents of one partition file.
#[derive(Debug, Clone)]
pub struct PartitionTable {
    pub profiles: Vec<PartitionProfile>,
    pub row_errors: Vec<RowError>,
    pub rows_read: usize,
}

/// A model run loaded from disk.
#[derive(Debug, Clone)]
pub struct LoadedRun {
    pub path: PathBuf,
    pub init_time: NaiveDateTime,
    pub rows: Vec<AnalyzedData>,
    pub partitions: Vec<PartitionProfile>,
    pub row_errors: Vec<RowError>,
    pub rows_read: usize,
}

struct RawRow {
    line: usize,
    valid_time: NaiveDateTime,
    lead_time: Option<i32>,
    hdw: f64,
    t0: f64,
    dt0: f64,
    e0: f64,
    de: f64,
}

/// Load a run file and, when present, its `<stem>_cape.csv` sibling.
pub fn load_run(path: &Path, window: &TimeWindow) -> Result<LoadedRun, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::input(format!("Failed to open run file '{}': {e}", path.display())))?;

    let table = parse_run_csv(file, init_time_from_path(path), window)
        .map_err(|e| AppError::new(e.exit_code(), format!("{}: {e}", path.display())))?;

    let mut row_errors = tag_errors(table.row_errors, path);
    let mut rows_read = table.rows_read;

    let cape_path = partition_path_for(path);
    let partitions = if cape_path.is_file() {
        let file = File::open(&cape_path).map_err(|e| {
            AppError::input(format!(
                "Failed to open partition file '{}': {e}",
                cape_path.display()
            ))
        })?;
        let parts = parse_partition_csv(file, table.init_time, window)
            .map_err(|e| AppError::new(e.exit_code(), format!("{}: {e}", cape_path.display())))?;
        rows_read += parts.rows_read;
        row_errors.extend(tag_errors(parts.row_errors, &cape_path));
        parts.profiles
    } else {
        debug!(path = %cape_path.display(), "no partition file");
        Vec::new()
    };

    Ok(LoadedRun {
        path: path.to_path_buf(),
        init_time: table.init_time,
        rows: table.rows,
        partitions,
        row_errors,
        rows_read,
    })
}

/// Parse a run CSV.
///
/// `init_hint` usually comes from the file name. Without it the init time is
/// inferred from the first row that carries a `lead_time`.
pub fn parse_run_csv<R: Read>(
    reader: R,
    init_hint: Option<NaiveDateTime>,
    window: &TimeWindow,
) -> Result<RunTable, AppError> {
    let mut reader = csv_reader(reader);
    let headers = reader
        .headers()
        .map_err(|e| AppError::input(format!("Failed to read CSV headers: {e}")))?
        .clone();
    let header_map = build_header_map(&headers);

    if !header_map.contains_key("valid_time") {
        return Err(AppError::input("Missing required column: `valid_time`"));
    }
    if init_hint.is_none() && !header_map.contains_key("lead_time") {
        return Err(AppError::input(
            "Cannot determine the init time: file name has no YYYYMMDDHH prefix and there is no `lead_time` column.",
        ));
    }

    let mut raw_rows = Vec::new();
    let mut row_errors = Vec::new();
    let mut rows_read = 0usize;

    for (idx, result) in reader.records().enumerate() {
        // records() starts after the header line and lines are 1-based.
        let line = idx + 2;
        rows_read += 1;

        let record = match result {
            Ok(r) => r,
            Err(e) => {
                row_errors.push(row_error(line, format!("CSV parse error: {e}")));
                continue;
            }
        };

        match parse_run_row(&record, &header_map, line) {
            Ok(row) => raw_rows.push(row),
            Err(message) => row_errors.push(row_error(line, message)),
        }
    }

    let init_time = match init_hint {
        Some(t) => t,
        None => raw_rows
            .iter()
            .find_map(|r| {
                r.lead_time
                    .map(|lt| r.valid_time - chrono::Duration::hours(i64::from(lt)))
            })
            .ok_or_else(|| AppError::input("Cannot determine the init time: no row has a `lead_time`."))?,
    };

    let mut rows = Vec::with_capacity(raw_rows.len());
    for raw in raw_rows {
        if !window.contains(raw.valid_time) {
            continue;
        }
        let lead_time = match raw.lead_time {
            Some(lt) => lt,
            None => match lead_hours(init_time, raw.valid_time) {
                Some(lt) => lt,
                None => {
                    row_errors.push(row_error(
                        raw.line,
                        "valid_time is before the model init time.".to_string(),
                    ));
                    continue;
                }
            },
        };
        rows.push(AnalyzedData {
            valid_time: raw.valid_time,
            lead_time,
            hdw: raw.hdw,
            t0: raw.t0,
            dt0: raw.dt0,
            e0: raw.e0,
            de: raw.de,
        });
    }
    rows.sort_by_key(|r| r.valid_time);

    Ok(RunTable {
        init_time,
        rows,
        row_errors,
        rows_read,
    })
}

/// Parse a CAPE partition CSV, grouping rows into one profile per valid time.
pub fn parse_partition_csv<R: Read>(
    reader: R,
    init_time: NaiveDateTime,
    window: &TimeWindow,
) -> Result<PartitionTable, AppError> {
    let mut reader = csv_reader(reader);
    let headers = reader
        .headers()
        .map_err(|e| AppError::input(format!("Failed to read CSV headers: {e}")))?
        .clone();
    let header_map = build_header_map(&headers);

    for name in ["valid_time", "dt"] {
        if !header_map.contains_key(name) {
            return Err(AppError::input(format!("Missing required column: `{name}`")));
        }
    }
    let dry_col = first_present(&header_map, &["dry_cape", "dry"])
        .ok_or_else(|| AppError::input("Missing required column: `dry_cape`"))?;
    let wet_col = first_present(&header_map, &["wet_cape", "wet"])
        .ok_or_else(|| AppError::input("Missing required column: `wet_cape`"))?;

    let mut grouped: BTreeMap<NaiveDateTime, Vec<CapePartition>> = BTreeMap::new();
    let mut row_errors = Vec::new();
    let mut rows_read = 0usize;

    for (idx, result) in reader.records().enumerate() {
        let line = idx + 2;
        rows_read += 1;

        let record = match result {
            Ok(r) => r,
            Err(e) => {
                row_errors.push(row_error(line, format!("CSV parse error: {e}")));
                continue;
            }
        };

        let parsed = (|| -> Result<CapePartition, String> {
            let raw_time = get_required(&record, &header_map, "valid_time")?;
            let valid_time = parse_time(raw_time).ok_or_else(|| format!("Invalid valid_time '{raw_time}'."))?;
            let dt = parse_value(get_optional(&record, &header_map, "dt"), "dt")?;
            if dt.is_nan() {
                return Err("Missing `dt` value.".to_string());
            }
            Ok(CapePartition {
                valid_time,
                dt,
                dry: parse_value(get_optional(&record, &header_map, dry_col), dry_col)?,
                wet: parse_value(get_optional(&record, &header_map, wet_col), wet_col)?,
            })
        })();

        match parsed {
            Ok(part) if window.contains(part.valid_time) => {
                grouped.entry(part.valid_time).or_default().push(part);
            }
            Ok(_) => {}
            Err(message) => row_errors.push(row_error(line, message)),
        }
    }

    let mut profiles = Vec::with_capacity(grouped.len());
    for (valid_time, mut rows) in grouped {
        let Some(lead_time) = lead_hours(init_time, valid_time) else {
            row_errors.push(row_error(
                0,
                format!(
                    "Partition valid_time {} is before the model init time.",
                    valid_time.format(crate::domain::GP_DATE_FORMAT)
                ),
            ));
            continue;
        };
        rows.sort_by(|a, b| a.dt.total_cmp(&b.dt));
        profiles.push(PartitionProfile {
            valid_time,
            lead_time,
            rows,
        });
    }

    Ok(PartitionTable {
        profiles,
        row_errors,
        rows_read,
    })
}

/// Init time encoded as a `YYYYMMDDHH` prefix of the file stem.
pub fn init_time_from_path(path: &Path) -> Option<NaiveDateTime> {
    let stem = path.file_stem()?.to_str()?;
    let prefix = stem.get(..10)?;
    parse_compact_hour(prefix)
}

/// `<dir>/<stem>_cape.csv` for a run file `<dir>/<stem>.csv`.
pub fn partition_path_for(path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default();
    path.with_file_name(format!("{stem}{PARTITION_SUFFIX}.csv"))
}

pub fn is_partition_file(path: &Path) -> bool {
    path.file_stem()
        .and_then(|s| s.to_str())
        .map(|s| s.ends_with(PARTITION_SUFFIX))
        .unwrap_or(false)
}

/// Parse a timestamp in any of the accepted layouts.
///
/// Accepted: `YYYY-MM-DD-HH` (the gnuplot layout), ISO-8601 with `T` or a
/// space and optional seconds, and compact `YYYYMMDDHH`.
pub fn parse_time(s: &str) -> Option<NaiveDateTime> {
    const FMTS: [&str; 4] = [
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d %H:%M",
    ];
    let s = s.trim();
    for fmt in FMTS {
        if let Ok(t) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(t);
        }
    }

    if let Some((date, hour)) = s.rsplit_once('-') {
        if (1..=2).contains(&hour.len()) && hour.bytes().all(|b| b.is_ascii_digit()) {
            let date = NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()?;
            return date.and_hms_opt(hour.parse().ok()?, 0, 0);
        }
    }

    parse_compact_hour(s)
}

fn parse_compact_hour(s: &str) -> Option<NaiveDateTime> {
    if s.len() != 10 || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let year: i32 = s[0..4].parse().ok()?;
    let month: u32 = s[4..6].parse().ok()?;
    let day: u32 = s[6..8].parse().ok()?;
    let hour: u32 = s[8..10].parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(hour, 0, 0)
}

fn lead_hours(init_time: NaiveDateTime, valid_time: NaiveDateTime) -> Option<i32> {
    let hours = (valid_time - init_time).num_hours();
    if hours < 0 {
        return None;
    }
    i32::try_from(hours).ok()
}

fn parse_run_row(
    record: &StringRecord,
    header_map: &HashMap<String, usize>,
    line: usize,
) -> Result<RawRow, String> {
    let raw_time = get_required(record, header_map, "valid_time")?;
    let valid_time = parse_time(raw_time).ok_or_else(|| format!("Invalid valid_time '{raw_time}'."))?;

    let lead_time = match get_optional(record, header_map, "lead_time") {
        Some(s) => {
            let lt = s
                .parse::<i32>()
                .map_err(|_| format!("Invalid lead_time '{s}' (expected whole hours)."))?;
            if lt < 0 {
                return Err(format!("Negative lead_time {lt}."));
            }
            Some(lt)
        }
        None => None,
    };

    Ok(RawRow {
        line,
        valid_time,
        lead_time,
        hdw: parse_value(get_optional(record, header_map, "hdw"), "hdw")?,
        t0: parse_value(get_optional(record, header_map, "t0"), "t0")?,
        dt0: parse_value(get_optional(record, header_map, "dt0"), "dt0")?,
        e0: parse_value(get_optional(record, header_map, "e0"), "e0")?,
        de: parse_value(get_optional(record, header_map, "de"), "de")?,
    })
}

/// Parse a numeric cell. Empty cells and the usual missing-value sentinels map to `NaN`.
fn parse_value(s: Option<&str>, name: &str) -> Result<f64, String> {
    let Some(s) = s else { return Ok(f64::NAN) };
    if s == "." || s.eq_ignore_ascii_case("nan") || s.eq_ignore_ascii_case("na") {
        return Ok(f64::NAN);
    }
    let v = s
        .parse::<f64>()
        .map_err(|_| format!("Invalid `{name}` value '{s}'."))?;
    if !v.is_finite() || v == -9999.0 {
        return Ok(f64::NAN);
    }
    Ok(v)
}

fn csv_reader<R: Read>(reader: R) -> csv::Reader<R> {
    csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .comment(Some(b'#'))
        .from_reader(reader)
}

fn build_header_map(headers: &StringRecord) -> HashMap<String, usize> {
    headers
        .iter()
        .enumerate()
        .map(|(idx, name)| (normalize_header_name(name), idx))
        .collect()
}

fn normalize_header_name(name: &str) -> String {
    // Spreadsheet exports sometimes prefix the first header with a UTF-8 BOM.
    let name = name.trim().trim_start_matches('\u{feff}');
    name.to_ascii_lowercase()
}

fn first_present<'a>(header_map: &HashMap<String, usize>, names: &[&'a str]) -> Option<&'a str> {
    names.iter().copied().find(|n| header_map.contains_key(*n))
}

fn get_required<'a>(
    record: &'a StringRecord,
    header_map: &HashMap<String, usize>,
    name: &str,
) -> Result<&'a str, String> {
    let idx = header_map
        .get(name)
        .ok_or_else(|| format!("Missing required column: `{name}`"))?;
    record
        .get(*idx)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| format!("Missing required value: `{name}`"))
}

fn get_optional<'a>(record: &'a StringRecord, header_map: &HashMap<String, usize>, name: &str) -> Option<&'a str> {
    let idx = header_map.get(name)?;
    record.get(*idx).map(str::trim).filter(|s| !s.is_empty())
}

fn row_error(line: usize, message: String) -> RowError {
    RowError {
        file: None,
        line,
        message,
    }
}

fn tag_errors(errors: Vec<RowError>, path: &Path) -> Vec<RowError> {
    errors
        .into_iter()
        .map(|e| RowError {
            file: Some(path.to_path_buf()),
            ..e
        })
        .collect()
}
