//! Atomic JSON store for all on-disk metadata: lock records, lifecycle
//! records, and the repo-lock sentinel.
//!
//! Readers never see a torn file: writes go to a unique temp name in the
//! destination directory and rename over the target.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::errors::Result;

/// Outcome of reading a persisted record.
///
/// - missing file: `exists: false, valid: true, record: None`
/// - unparseable or failed validation: `exists: true, valid: false`
/// - parseable and valid: `exists: true, valid: true, record: Some(..)`
#[derive(Debug)]
pub struct ReadOutcome<T> {
    pub exists: bool,
    pub valid: bool,
    pub record: Option<T>,
    pub path: PathBuf,
}

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

fn temp_path_for(path: &Path) -> PathBuf {
    let counter = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    let pid = std::process::id();
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "record".to_string());
    path.with_file_name(format!("{file_name}.tmp-{pid}-{counter}"))
}

fn to_json_line<T: Serialize>(payload: &T) -> Result<String> {
    let mut body = serde_json::to_string_pretty(payload)?;
    body.push('\n');
    Ok(body)
}

/// Read and validate a record. `validate` gets the parsed value and the
/// expected schema version check belongs in it.
pub fn read_record<T: DeserializeOwned>(
    path: &Path,
    validate: impl Fn(&T) -> bool,
) -> Result<ReadOutcome<T>> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Ok(ReadOutcome {
                exists: false,
                valid: true,
                record: None,
                path: path.to_path_buf(),
            });
        }
        Err(e) => return Err(e.into()),
    };

    match serde_json::from_str::<T>(&raw) {
        Ok(record) if validate(&record) => Ok(ReadOutcome {
            exists: true,
            valid: true,
            record: Some(record),
            path: path.to_path_buf(),
        }),
        Ok(_) | Err(_) => Ok(ReadOutcome {
            exists: true,
            valid: false,
            record: None,
            path: path.to_path_buf(),
        }),
    }
}

/// Serialize `payload` and rename it over `path`. With `ensure_dir`, parent
/// directories are created first. Any failure removes the temp file
/// best-effort and re-raises.
pub fn write_atomically<T: Serialize>(path: &Path, payload: &T, ensure_dir: bool) -> Result<()> {
    if ensure_dir
        && let Some(parent) = path.parent()
    {
        fs::create_dir_all(parent)?;
    }

    let body = to_json_line(payload)?;
    let temp = temp_path_for(path);

    let write_result = fs::write(&temp, &body).and_then(|()| fs::rename(&temp, path));
    if let Err(e) = write_result {
        let _ = fs::remove_file(&temp);
        return Err(e.into());
    }
    Ok(())
}

/// Create `path` exclusively with `payload`. Returns `false` when the file
/// already exists (the lock is held); re-raises other I/O errors.
pub fn write_exclusively<T: Serialize>(path: &Path, payload: &T) -> Result<bool> {
    let body = to_json_line(payload)?;
    let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => return Ok(false),
        Err(e) => return Err(e.into()),
    };
    if let Err(e) = file.write_all(body.as_bytes()) {
        drop(file);
        let _ = fs::remove_file(path);
        return Err(e.into());
    }
    Ok(true)
}

/// Delete a record, treating "already gone" as success.
pub fn delete_record(path: &Path) -> Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::TempDir;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Sample {
        #[serde(rename = "schemaVersion")]
        schema_version: u32,
        name: String,
    }

    #[test]
    fn missing_file_reads_as_absent_but_valid() {
        let dir = TempDir::new().unwrap();
        let outcome: ReadOutcome<Sample> =
            read_record(&dir.path().join("nope.json"), |_| true).unwrap();
        assert!(!outcome.exists);
        assert!(outcome.valid);
        assert!(outcome.record.is_none());
    }

    #[test]
    fn round_trip_preserves_value_and_trailing_newline() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sample.json");
        let value = Sample {
            schema_version: 1,
            name: "feature/foo".into(),
        };
        write_atomically(&path, &value, false).unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.ends_with('\n'));

        let outcome: ReadOutcome<Sample> =
            read_record(&path, |r: &Sample| r.schema_version == 1).unwrap();
        assert!(outcome.exists && outcome.valid);
        assert_eq!(outcome.record.unwrap(), value);
    }

    #[test]
    fn garbage_reads_as_invalid() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{not json").unwrap();
        let outcome: ReadOutcome<Sample> = read_record(&path, |_| true).unwrap();
        assert!(outcome.exists);
        assert!(!outcome.valid);
    }

    #[test]
    fn failed_validation_reads_as_invalid() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("v0.json");
        write_atomically(
            &path,
            &Sample {
                schema_version: 0,
                name: "x".into(),
            },
            false,
        )
        .unwrap();
        let outcome: ReadOutcome<Sample> =
            read_record(&path, |r: &Sample| r.schema_version == 1).unwrap();
        assert!(outcome.exists);
        assert!(!outcome.valid);
    }

    #[test]
    fn ensure_dir_creates_parents() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a/b/c.json");
        let value = Sample {
            schema_version: 1,
            name: "deep".into(),
        };
        write_atomically(&path, &value, true).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn exclusive_create_reports_collision() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("lock.json");
        let value = Sample {
            schema_version: 1,
            name: "holder".into(),
        };
        assert!(write_exclusively(&path, &value).unwrap());
        assert!(!write_exclusively(&path, &value).unwrap());
    }

    #[test]
    fn delete_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("gone.json");
        std::fs::write(&path, "{}\n").unwrap();
        assert!(delete_record(&path).unwrap());
        assert!(!delete_record(&path).unwrap());
    }

    #[test]
    fn no_temp_files_left_behind() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("clean.json");
        write_atomically(
            &path,
            &Sample {
                schema_version: 1,
                name: "x".into(),
            },
            false,
        )
        .unwrap();
        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().contains(".tmp-"))
            .collect();
        assert!(leftovers.is_empty());
    }
}
