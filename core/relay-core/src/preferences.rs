//! Client-side preference store with per-entry expiry.
//!
//! A small JSON file of key → { value, expires_at }. Expired entries read as
//! absent and are dropped on the next save.
//!
//! # Defensive Loading
//!
//! - Missing file → empty store
//! - Empty or corrupt file → empty store, warning logged
//!
//! # Atomic Writes
//!
//! Temp file in the same directory + rename, so a crash mid-write never leaves
//! a truncated file behind.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tempfile::NamedTempFile;
use tracing::warn;

use crate::error::{RelayError, Result};

/// Skip the "exports may contain sensitive content" confirmation.
pub const SUPPRESS_EXPORT_WARNING: &str = "suppress_export_warning";

pub fn suppress_export_warning_ttl() -> Duration {
    Duration::days(365)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct PreferenceEntry {
    value: Value,
    expires_at: DateTime<Utc>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct PreferenceFile {
    #[serde(default)]
    entries: BTreeMap<String, PreferenceEntry>,
}

pub struct PreferenceStore {
    entries: BTreeMap<String, PreferenceEntry>,
    file_path: Option<PathBuf>,
}

impl PreferenceStore {
    pub fn new_in_memory() -> Self {
        Self {
            entries: BTreeMap::new(),
            file_path: None,
        }
    }

    pub fn load(file_path: &Path) -> Result<Self> {
        let empty = || Self {
            entries: BTreeMap::new(),
            file_path: Some(file_path.to_path_buf()),
        };

        if !file_path.exists() {
            return Ok(empty());
        }

        let content = fs_err::read_to_string(file_path)
            .map_err(|err| RelayError::io("reading preferences", err))?;

        if content.trim().is_empty() {
            warn!(path = %file_path.display(), "Empty preferences file, starting fresh");
            return Ok(empty());
        }

        match serde_json::from_str::<PreferenceFile>(&content) {
            Ok(file) => Ok(Self {
                entries: file.entries,
                file_path: Some(file_path.to_path_buf()),
            }),
            Err(err) => {
                warn!(
                    path = %file_path.display(),
                    error = %err,
                    "Failed to parse preferences file, starting fresh"
                );
                Ok(empty())
            }
        }
    }

    pub fn get(&self, key: &str, now: DateTime<Utc>) -> Option<&Value> {
        self.entries
            .get(key)
            .filter(|entry| entry.expires_at > now)
            .map(|entry| &entry.value)
    }

    pub fn get_bool(&self, key: &str, now: DateTime<Utc>) -> Option<bool> {
        self.get(key, now).and_then(Value::as_bool)
    }

    pub fn set(&mut self, key: &str, value: Value, ttl: Duration, now: DateTime<Utc>) {
        self.entries.insert(
            key.to_string(),
            PreferenceEntry {
                value,
                expires_at: now.checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC),
            },
        );
    }

    pub fn set_bool(&mut self, key: &str, value: bool, ttl: Duration, now: DateTime<Utc>) {
        self.set(key, Value::Bool(value), ttl, now);
    }

    pub fn remove(&mut self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Drops expired entries and writes the rest.
    pub fn save(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.entries.retain(|_, entry| entry.expires_at > now);

        let Some(file_path) = self.file_path.as_ref() else {
            return Ok(());
        };

        let file = PreferenceFile {
            entries: self.entries.clone(),
        };
        let content = serde_json::to_string_pretty(&file).map_err(|source| RelayError::Json {
            context: "serializing preferences".to_string(),
            source,
        })?;

        let parent_dir = file_path
            .parent()
            .ok_or_else(|| RelayError::ConfigInvalid("preferences path has no parent".to_string()))?;
        fs_err::create_dir_all(parent_dir)
            .map_err(|err| RelayError::io("creating preferences dir", err))?;

        let mut temp_file = NamedTempFile::new_in(parent_dir)
            .map_err(|err| RelayError::io("creating temp preferences file", err))?;
        temp_file
            .write_all(content.as_bytes())
            .map_err(|err| RelayError::io("writing temp preferences file", err))?;
        temp_file
            .flush()
            .map_err(|err| RelayError::io("flushing temp preferences file", err))?;
        temp_file
            .persist(file_path)
            .map_err(|err| RelayError::io("persisting preferences file", err.error))?;
        Ok(())
    }
}

/// Startup read of the export-warning preference.
pub fn export_warning_suppressed(store: &PreferenceStore, now: DateTime<Utc>) -> bool {
    store
        .get_bool(SUPPRESS_EXPORT_WARNING, now)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_loads_empty() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let store = PreferenceStore::load(&temp_dir.path().join("prefs.json")).unwrap();
        assert!(!export_warning_suppressed(&store, Utc::now()));
    }

    #[test]
    fn corrupt_file_loads_empty() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let path = temp_dir.path().join("prefs.json");
        fs_err::write(&path, "{not json").unwrap();
        let store = PreferenceStore::load(&path).unwrap();
        assert!(store.get(SUPPRESS_EXPORT_WARNING, Utc::now()).is_none());
    }

    #[test]
    fn value_survives_round_trip_through_disk() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let path = temp_dir.path().join("nested").join("prefs.json");
        let now = Utc::now();

        let mut store = PreferenceStore::load(&path).unwrap();
        store.set_bool(
            SUPPRESS_EXPORT_WARNING,
            true,
            suppress_export_warning_ttl(),
            now,
        );
        store.save(now).unwrap();

        let reloaded = PreferenceStore::load(&path).unwrap();
        assert!(export_warning_suppressed(&reloaded, now + Duration::days(30)));
    }

    #[test]
    fn entry_expires_after_ttl() {
        let now = Utc::now();
        let mut store = PreferenceStore::new_in_memory();
        store.set_bool(
            SUPPRESS_EXPORT_WARNING,
            true,
            suppress_export_warning_ttl(),
            now,
        );

        assert!(export_warning_suppressed(&store, now + Duration::days(364)));
        assert!(!export_warning_suppressed(&store, now + Duration::days(366)));
    }

    #[test]
    fn save_prunes_expired_entries() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let path = temp_dir.path().join("prefs.json");
        let now = Utc::now();

        let mut store = PreferenceStore::load(&path).unwrap();
        store.set_bool("short", true, Duration::seconds(5), now);
        store.set_bool("long", true, Duration::days(1), now);
        store.save(now + Duration::seconds(10)).unwrap();

        let content = fs_err::read_to_string(&path).unwrap();
        assert!(!content.contains("\"short\""));
        assert!(content.contains("\"long\""));
    }
}
