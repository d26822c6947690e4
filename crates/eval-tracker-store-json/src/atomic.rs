use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use ulid::Ulid;

/// Serializes `value` as pretty JSON and replaces `path` atomically.
///
/// The temp file is removed again if any step fails.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(value)
        .with_context(|| format!("failed to serialize {}", path.display()))?;
    let temp_path = temp_path_for(path)?;

    let result = write_and_sync(&temp_path, &bytes).and_then(|()| {
        fs::rename(&temp_path, path).with_context(|| {
            format!(
                "failed to rename {} to {}",
                temp_path.display(),
                path.display()
            )
        })
    });

    if result.is_err() {
        if let Err(err) = fs::remove_file(&temp_path) {
            if err.kind() != ErrorKind::NotFound {
                tracing::warn!(path = %temp_path.display(), error = %err, "failed to remove temp file");
            }
        }
    }
    result
}

/// Reads and decodes a JSON document. A missing file yields `Ok(None)`.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
        Err(err) => {
            return Err(err).with_context(|| format!("failed to read {}", path.display()));
        }
    };
    let value = serde_json::from_slice(&bytes)
        .with_context(|| format!("failed to decode {}", path.display()))?;
    Ok(Some(value))
}

fn write_and_sync(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut file =
        File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    file.write_all(bytes)
        .with_context(|| format!("failed to write {}", path.display()))?;
    file.sync_all()
        .with_context(|| format!("failed to sync {}", path.display()))
}

fn temp_path_for(path: &Path) -> Result<PathBuf> {
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| anyhow!("invalid destination path {}", path.display()))?;
    Ok(path.with_file_name(format!(".{file_name}.{}.tmp", Ulid::new())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn must<T>(result: Result<T>) -> T {
        match result {
            Ok(value) => value,
            Err(err) => panic!("test failure: {err:#}"),
        }
    }

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("eval-tracker-atomic-{}", Ulid::new()));
        must(fs::create_dir_all(&dir).map_err(anyhow::Error::from));
        dir
    }

    #[test]
    fn write_replaces_file_and_leaves_no_temp_files() {
        let dir = temp_dir();
        let path = dir.join("doc.json");
        must(write_json_atomic(&path, &json!({"version": 1})));
        must(write_json_atomic(&path, &json!({"version": 2})));

        let value: Option<Value> = must(read_json(&path));
        assert_eq!(value, Some(json!({"version": 2})));

        let entries = must(fs::read_dir(&dir).map_err(anyhow::Error::from)).count();
        assert_eq!(entries, 1);
    }

    #[test]
    fn failed_write_cleans_up_temp_file() {
        let dir = temp_dir();
        let target = dir.join("occupied");
        must(fs::create_dir_all(target.join("child")).map_err(anyhow::Error::from));

        assert!(write_json_atomic(&target, &json!({"a": 1})).is_err());
        let leftovers: Vec<_> = must(fs::read_dir(&dir).map_err(anyhow::Error::from))
            .filter_map(std::result::Result::ok)
            .filter(|entry| entry.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn missing_file_reads_as_none() {
        let dir = temp_dir();
        let value: Option<Value> = must(read_json(&dir.join("absent.json")));
        assert_eq!(value, None);
    }
}
