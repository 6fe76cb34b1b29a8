//! Read ensemble manifests.
//!
//! A manifest lists run files explicitly, for data that does not live in an
//! archive (research runs, local WRF output, ...):
//!
//! ```json
//! {
//!   "ensembles": [
//!     {
//!       "site": { "id": "krr1", "name": "KRR1" },
//!       "model": "LocalWrf",
//!       "start": "2017-09-02T12:00:00",
//!       "end": "2017-09-05T12:00:00",
//!       "files": ["local_arw_krr1/2017090212.csv", "local_arw_krr1/2017090312.csv"]
//!     }
//!   ]
//! }
//! ```
//!
//! Relative file paths resolve against the manifest's directory. `now`
//! defaults to `start`. Each site/model pair may appear once, since it names
//! the output files; ensembles keep the order they are listed in.

use std::fs::File;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::domain::{MetaData, Site};
use crate::error::AppError;
use crate::io::archive::EnsembleSource;
use crate::io::ingest::is_partition_file;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub ensembles: Vec<ManifestEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub site: Site,
    pub model: String,
    pub start: NaiveDateTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub now: Option<NaiveDateTime>,
    pub end: NaiveDateTime,
    pub files: Vec<PathBuf>,
}

/// Read and validate a manifest file.
pub fn read_manifest(path: &Path) -> Result<Vec<EnsembleSource>, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::input(format!("Failed to open manifest '{}': {e}", path.display())))?;
    let manifest: Manifest = serde_json::from_reader(file)
        .map_err(|e| AppError::input(format!("Invalid manifest '{}': {e}", path.display())))?;

    let base = path.parent().unwrap_or_else(|| Path::new("."));
    let mut out: Vec<EnsembleSource> = Vec::with_capacity(manifest.ensembles.len());
    for (idx, entry) in manifest.ensembles.into_iter().enumerate() {
        let fail = |msg: String| AppError::input(format!("Manifest '{}', ensemble #{}: {msg}", path.display(), idx + 1));

        let source = entry_to_source(entry, base).map_err(fail)?;
        if let Some(first) = out.iter().position(|s| same_pair(&s.meta, &source.meta)) {
            return Err(fail(format!(
                "{} duplicates ensemble #{} (both would write {}*).",
                source.meta.file_stem(),
                first + 1,
                source.meta.file_stem()
            )));
        }
        out.push(source);
    }
    Ok(out)
}

fn same_pair(a: &MetaData, b: &MetaData) -> bool {
    a.site.id.trim().eq_ignore_ascii_case(b.site.id.trim()) && a.model.trim().eq_ignore_ascii_case(b.model.trim())
}

fn entry_to_source(entry: ManifestEntry, base: &Path) -> Result<EnsembleSource, String> {
    if entry.site.id.trim().is_empty() {
        return Err("site id must not be empty.".to_string());
    }
    if entry.model.trim().is_empty() {
        return Err("model must not be empty.".to_string());
    }
    if entry.end <= entry.start {
        return Err("end must be after start.".to_string());
    }
    let now = entry.now.unwrap_or(entry.start);
    if now < entry.start || now > entry.end {
        return Err("now must lie between start and end.".to_string());
    }
    if entry.files.is_empty() {
        return Err("no files listed.".to_string());
    }
    if let Some(part) = entry.files.iter().find(|f| is_partition_file(f)) {
        return Err(format!(
            "'{}' is a CAPE partition file; list the run file and its partitions are found next to it.",
            part.display()
        ));
    }

    let files = entry
        .files
        .into_iter()
        .map(|f| if f.is_absolute() { f } else { base.join(f) })
        .collect();

    Ok(EnsembleSource {
        meta: MetaData {
            site: entry.site,
            model: entry.model,
            start: entry.start,
            now,
            end: entry.end,
        },
        files,
    })
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
    fn reads_manifest_and_resolves_paths() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fires.json");
        std::fs::write(
            &path,
            r#"{"ensembles": [{
                "site": {"id": "krr1", "name": "KRR1"},
                "model": "LocalWrf",
                "start": "2017-09-02T12:00:00",
                "end": "2017-09-05T12:00:00",
                "files": ["arw/2017090212.csv", "/abs/2017090312.csv"]
            }]}"#,
        )
        .unwrap();

        let sources = read_manifest(&path).unwrap();
        assert_eq!(sources.len(), 1);
        let src = &sources[0];
        assert_eq!(src.meta.now, at(2, 12));
        assert_eq!(src.meta.end, at(5, 12));
        assert_eq!(src.files[0], dir.path().join("arw/2017090212.csv"));
        assert_eq!(src.files[1], PathBuf::from("/abs/2017090312.csv"));
    }

    #[test]
    fn rejects_inverted_window() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(
            &path,
            r#"{"ensembles": [{
                "site": {"id": "krr1"},
                "model": "LocalWrf",
                "start": "2017-09-05T12:00:00",
                "end": "2017-09-02T12:00:00",
                "files": ["a.csv"]
            }]}"#,
        )
        .unwrap();

        let err = read_manifest(&path).unwrap_err();
        assert_eq!(err.exit_code(), 2);
        assert!(err.message().contains("ensemble #1"));
    }

    #[test]
    fn rejects_now_outside_window() {
        let entry = ManifestEntry {
            site: Site::new("x"),
            model: "gfs".to_string(),
            start: at(2, 0),
            now: Some(at(9, 0)),
            end: at(3, 0),
            files: vec![PathBuf::from("a.csv")],
        };
        assert!(entry_to_source(entry, Path::new(".")).is_err());
    }

    fn entry(site: &str, model: &str, files: &[&str]) -> ManifestEntry {
        ManifestEntry {
            site: Site::new(site),
            model: model.to_string(),
            start: at(2, 0),
            now: None,
            end: at(4, 0),
            files: files.iter().map(PathBuf::from).collect(),
        }
    }

    #[test]
    fn rejects_empty_file_list() {
        let err = entry_to_source(entry("kmso", "gfs", &[]), Path::new(".")).unwrap_err();
        assert!(err.contains("no files"));
    }

    #[test]
    fn rejects_partition_file_listed_as_run() {
        let e = entry("kmso", "gfs", &["gfs/2017090200.csv", "gfs/2017090200_cape.csv"]);
        let err = entry_to_source(e, Path::new(".")).unwrap_err();
        assert!(err.contains("2017090200_cape.csv"));
    }

    #[test]
    fn rejects_duplicate_site_model_pairs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dup.json");
        let manifest = Manifest {
            ensembles: vec![
                entry("kmso", "gfs", &["a/2017090200.csv"]),
                entry("c18", "gfs", &["b/2017090200.csv"]),
                entry("KMSO", "GFS", &["c/2017090200.csv"]),
            ],
        };
        std::fs::write(&path, serde_json::to_string(&manifest).unwrap()).unwrap();

        let err = read_manifest(&path).unwrap_err();
        assert_eq!(err.exit_code(), 2);
        assert!(err.message().contains("ensemble #3"));
        assert!(err.message().contains("duplicates ensemble #1"));
    }
}
