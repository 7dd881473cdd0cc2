//! Durable session records.
//!
//! The file holds a JSON array of records, one per affordance. It is read once
//! when the store is opened and rewritten in full after every mutation; reads
//! are served from the in-memory copy.

use crate::error::StoreError;
use crate::model::{AffordanceRef, ChunkRegion, Dimension};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreRecord {
    pub message_id: u64,
    pub channel_id: u64,
    pub name: String,
    /// Set once the session has been stopped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimension: Option<Dimension>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<ChunkRegion>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

impl StoreRecord {
    pub fn affordance(&self) -> AffordanceRef {
        AffordanceRef {
            channel_id: self.channel_id,
            message_id: self.message_id,
        }
    }
}

/// Persistence seam for the controller. Implementations serialize mutations;
/// at most one record exists per affordance.
pub trait SessionStore: Send + Sync {
    fn load(&self) -> Vec<StoreRecord>;
    /// Add a record, dropping any earlier record for the same affordance.
    fn append(&self, record: StoreRecord) -> Result<(), StoreError>;
    /// Remove the record for `record`'s affordance, then append `record`, as one mutation.
    fn replace(&self, record: StoreRecord) -> Result<(), StoreError>;
}

fn upsert(records: &mut Vec<StoreRecord>, record: StoreRecord) {
    let key = record.affordance();
    records.retain(|r| r.affordance() != key);
    records.push(record);
}

/// Keep only the last record seen for each affordance, preserving order.
fn dedupe_latest(records: Vec<StoreRecord>) -> Vec<StoreRecord> {
    let mut out: Vec<StoreRecord> = Vec::with_capacity(records.len());
    for record in records {
        upsert(&mut out, record);
    }
    out
}

pub struct JsonFileStore {
    path: PathBuf,
    records: Mutex<Vec<StoreRecord>>,
}

impl JsonFileStore {
    /// Open the store at `path`. A missing or unreadable file yields an empty store.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let records = read_records(&path);
        Self {
            path,
            records: Mutex::new(records),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Apply `f` to a copy of the records, flush the copy, then publish it.
    /// On a failed flush the cache keeps matching what is on disk.
    fn mutate<F>(&self, f: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut Vec<StoreRecord>),
    {
        let mut guard = self
            .records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut next = guard.clone();
        f(&mut next);
        if let Err(e) = write_records(&self.path, &next) {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to persist sessions");
            return Err(e);
        }
        *guard = next;
        Ok(())
    }
}

impl SessionStore for JsonFileStore {
    fn load(&self) -> Vec<StoreRecord> {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn append(&self, record: StoreRecord) -> Result<(), StoreError> {
        self.mutate(|records| upsert(records, record))
    }

    fn replace(&self, record: StoreRecord) -> Result<(), StoreError> {
        self.mutate(|records| upsert(records, record))
    }
}

fn read_records(path: &Path) -> Vec<StoreRecord> {
    if !path.exists() {
        return Vec::new();
    }
    let data = match fs::read(path) {
        Ok(data) => data,
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "failed to read session store");
            return Vec::new();
        }
    };
    let values = match serde_json::from_slice::<Vec<serde_json::Value>>(&data) {
        Ok(values) => values,
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "session store is corrupt, starting empty");
            return Vec::new();
        }
    };

    let mut records = Vec::with_capacity(values.len());
    for value in values {
        match serde_json::from_value::<StoreRecord>(value) {
            Ok(record) => records.push(record),
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "skipping malformed session record");
            }
        }
    }
    dedupe_latest(records)
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> StoreError {
    let path = path.display().to_string();
    move |source| StoreError::Io { path, source }
}

fn write_records(path: &Path, records: &[StoreRecord]) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(io_err(parent))?;
        }
    }

    let bytes = serde_json::to_vec_pretty(records)?;
    let mut temp_name = path.as_os_str().to_os_string();
    temp_name.push(".tmp");
    let temp_path = PathBuf::from(temp_name);
    fs::write(&temp_path, bytes).map_err(io_err(&temp_path))?;
    fs::rename(&temp_path, path).map_err(io_err(path))
}

/// Store that never touches disk.
#[cfg(test)]
#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<Vec<StoreRecord>>,
}

#[cfg(test)]
impl MemoryStore {
    pub fn with_records(records: Vec<StoreRecord>) -> Self {
        Self {
            records: Mutex::new(dedupe_latest(records)),
        }
    }
}

#[cfg(test)]
impl SessionStore for MemoryStore {
    fn load(&self) -> Vec<StoreRecord> {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn append(&self, record: StoreRecord) -> Result<(), StoreError> {
        let mut guard = self
            .records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        upsert(&mut guard, record);
        Ok(())
    }

    fn replace(&self, record: StoreRecord) -> Result<(), StoreError> {
        self.append(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ChunkCoord;

    fn record(channel_id: u64, message_id: u64, name: &str, filename: Option<&str>) -> StoreRecord {
        StoreRecord {
            message_id,
            channel_id,
            name: name.into(),
            filename: filename.map(Into::into),
            dimension: None,
            region: None,
            created_at: None,
        }
    }

    #[test]
    fn missing_file_is_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::open(dir.path().join("nested/sessions.json"));
        assert!(store.load().is_empty());
    }

    #[test]
    fn corrupt_file_is_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sessions.json");
        fs::write(&path, b"{ not json").unwrap();
        assert!(JsonFileStore::open(&path).load().is_empty());
    }

    #[test]
    fn reload_after_replace_has_no_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state/sessions.json");

        let store = JsonFileStore::open(&path);
        store.append(record(1, 10, "run1", None)).unwrap();
        store.append(record(1, 11, "run2", None)).unwrap();
        store
            .replace(record(1, 10, "run1", Some("run1_2024.mcrr")))
            .unwrap();

        let expected = vec![
            record(1, 11, "run2", None),
            record(1, 10, "run1", Some("run1_2024.mcrr")),
        ];
        assert_eq!(store.load(), expected);

        let reopened = JsonFileStore::open(&path);
        assert_eq!(reopened.load(), expected);
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn legacy_records_and_duplicates_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sessions.json");
        fs::write(
            &path,
            r#"[
                {"message_id": 5, "channel_id": 9, "name": "old"},
                {"message_id": 6, "channel_id": 9},
                {"message_id": 5, "channel_id": 9, "name": "old", "filename": "old.mcrr"}
            ]"#,
        )
        .unwrap();
        assert_eq!(
            JsonFileStore::open(&path).load(),
            vec![record(9, 5, "old", Some("old.mcrr"))]
        );
    }

    #[test]
    fn extended_fields_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sessions.json");
        let mut rec = record(3, 4, "full", None);
        rec.dimension = Some(Dimension::Nether);
        rec.region = Some(ChunkRegion {
            start: ChunkCoord { x: -1, z: 2 },
            end: ChunkCoord { x: 3, z: -4 },
        });
        rec.created_at = Some("2026-10-15T08:00:00Z".into());
        JsonFileStore::open(&path).append(rec.clone()).unwrap();
        assert_eq!(JsonFileStore::open(&path).load(), vec![rec]);
    }

    #[test]
    fn failed_flush_leaves_cache_untouched() {
        let dir = tempfile::tempdir().unwrap();
        // A directory where the file should be makes the rename fail.
        let path = dir.path().join("sessions.json");
        fs::create_dir_all(path.join("blocker")).unwrap();
        let store = JsonFileStore::open(&path);
        assert!(store.append(record(1, 1, "x", None)).is_err());
        assert!(store.load().is_empty());
    }
}
