// Projector configuration manifest
// JSON document listing every materialized tensor, read by the renderer.


use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{ProjectorError, Result};

const ENTRIES_KEY: &str = "embeddings";
const LEGACY_ENTRIES_KEY: &str = "tensorData";
const NAME_KEYS: [&str; 2] = ["tensorName", "name"];

/// One materialized tensor as the renderer expects it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TensorEntry {
    pub tensor_name: String,
    /// `[rows, dimension]`
    pub tensor_shape: [usize; 2],
    pub tensor_path: String,
    pub metadata_path: String,
}

/// The manifest document.
///
/// Entries are kept as raw JSON so that entries written by hand or by other
/// tools survive a rewrite untouched; only the entry being upserted is ever
/// replaced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Manifest {
    entries: Vec<Value>,
    /// Top-level keys this program does not manage, kept as found
    extra: Map<String, Value>,
}

impl Serialize for Manifest {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.extra.len() + 1))?;
        map.serialize_entry(ENTRIES_KEY, &self.entries)?;
        for (key, value) in &self.extra {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

impl Manifest {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Read the manifest at `path`.
    ///
    /// A missing file yields an empty manifest. A file that is not a JSON
    /// object is logged and replaced by an empty manifest on the next save.
    #[inline]
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("No manifest at {}, starting empty", path.display());
            return Ok(Self::new());
        }

        let content = fs::read_to_string(path)?;
        let mut document = match serde_json::from_str::<Value>(&content) {
            Ok(Value::Object(document)) => document,
            Ok(_) => {
                warn!(
                    "Manifest {} is not a JSON object; starting a fresh one",
                    path.display()
                );
                return Ok(Self::new());
            }
            Err(e) => {
                warn!(
                    "Manifest {} is not valid JSON ({}); starting a fresh one",
                    path.display(),
                    e
                );
                return Ok(Self::new());
            }
        };

        let raw_entries = document
            .remove(ENTRIES_KEY)
            .or_else(|| document.remove(LEGACY_ENTRIES_KEY));
        let entries = match raw_entries {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(entries)) => entries,
            Some(other) => {
                warn!(
                    "Manifest {} has a non-list '{}' ({}); it will be replaced",
                    path.display(),
                    ENTRIES_KEY,
                    other
                );
                Vec::new()
            }
        };

        Ok(Self {
            entries,
            extra: document,
        })
    }

    /// Name of a raw entry, from `tensorName` or `name`
    #[inline]
    pub fn entry_name(entry: &Value) -> Option<&str> {
        NAME_KEYS
            .iter()
            .find_map(|key| entry.get(key).and_then(Value::as_str))
    }

    /// Insert `entry` at the front, replacing any entry with the same name
    #[inline]
    pub fn upsert(&mut self, entry: TensorEntry) -> Result<()> {
        let value = serde_json::to_value(&entry)
            .map_err(|e| ProjectorError::Manifest(format!("Failed to serialize entry: {}", e)))?;
        self.entries
            .retain(|existing| Self::entry_name(existing) != Some(entry.tensor_name.as_str()));
        self.entries.insert(0, value);
        Ok(())
    }

    /// Raw entries in manifest order
    #[inline]
    pub fn entries(&self) -> &[Value] {
        &self.entries
    }

    /// The named entry, when it has the shape this program writes
    #[inline]
    pub fn get(&self, tensor_name: &str) -> Option<TensorEntry> {
        self.entries
            .iter()
            .find(|entry| Self::entry_name(entry) == Some(tensor_name))
            .and_then(|entry| serde_json::from_value(entry.clone()).ok())
    }

    /// Names of other entries pointing at either artifact of `entry`
    #[inline]
    pub fn sharing_artifacts(&self, entry: &TensorEntry) -> Vec<String> {
        let paths = [entry.tensor_path.as_str(), entry.metadata_path.as_str()];
        self.entries
            .iter()
            .filter(|existing| Self::entry_name(existing) != Some(entry.tensor_name.as_str()))
            .filter(|existing| {
                ["tensorPath", "metadataPath"].iter().any(|key| {
                    existing
                        .get(key)
                        .and_then(Value::as_str)
                        .is_some_and(|path| paths.contains(&path))
                })
            })
            .map(|existing| Self::entry_name(existing).unwrap_or("<unnamed>").to_string())
            .collect()
    }

    /// Write pretty JSON through a temporary sibling renamed into place
    #[inline]
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ProjectorError::Manifest(format!("Failed to serialize manifest: {}", e)))?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        write_atomic(path, content.as_bytes())
    }
}

/// Content written next to its destination, not yet visible under its final name
#[derive(Debug)]
pub(crate) struct StagedFile {
    temp_path: PathBuf,
    path: PathBuf,
}

impl StagedFile {
    pub(crate) fn write(path: &Path, bytes: &[u8]) -> Result<Self> {
        let temp_path = sibling(path, "tmp");
        if let Err(e) = fs::write(&temp_path, bytes) {
            let _ = fs::remove_file(&temp_path);
            return Err(e.into());
        }
        debug!("Staged {} bytes for {}", bytes.len(), path.display());
        Ok(Self {
            temp_path,
            path: path.to_path_buf(),
        })
    }

    pub(crate) fn discard(self) {
        let _ = fs::remove_file(&self.temp_path);
    }
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{}.{}.{}", file_name, Uuid::new_v4(), suffix))
}

/// Move every staged file into place, or leave all destinations as they were.
///
/// Existing destinations are set aside first and restored if any later step
/// fails.
pub(crate) fn commit_all(staged: Vec<StagedFile>) -> Result<()> {
    let mut backups: Vec<(PathBuf, PathBuf)> = Vec::new();
    let mut placed: Vec<PathBuf> = Vec::new();
    let mut pending = staged.into_iter();

    while let Some(file) = pending.next() {
        if let Err(e) = place(&file, &mut backups, &mut placed) {
            warn!(
                "Failed to move {} into place ({}); restoring previous files",
                file.path.display(),
                e
            );
            file.discard();
            pending.for_each(StagedFile::discard);
            for path in placed {
                let _ = fs::remove_file(path);
            }
            for (backup, original) in backups.into_iter().rev() {
                let _ = fs::rename(backup, original);
            }
            return Err(e);
        }
    }

    for (backup, _) in backups {
        let _ = fs::remove_file(backup);
    }
    Ok(())
}

fn place(
    file: &StagedFile,
    backups: &mut Vec<(PathBuf, PathBuf)>,
    placed: &mut Vec<PathBuf>,
) -> Result<()> {
    if file.path.is_file() {
        let backup = sibling(&file.path, "bak");
        fs::rename(&file.path, &backup)?;
        backups.push((backup, file.path.clone()));
    }
    fs::rename(&file.temp_path, &file.path)?;
    placed.push(file.path.clone());
    Ok(())
}

/// Write `bytes` to a uniquely named sibling of `path`, then rename it over `path`
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let staged = StagedFile::write(path, bytes)?;
    if let Err(e) = fs::rename(&staged.temp_path, path) {
        staged.discard();
        return Err(e.into());
    }
    debug!("Wrote {} bytes to {}", bytes.len(), path.display());
    Ok(())
}
