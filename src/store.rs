//! Record store: where visitor and cell rows live.
//!
//! [`RecordStore`] is the seam between the HTTP layer and persistence. The
//! aggregation code never talks to a store directly; it only sees the
//! [`Snapshot`] returned by [`load_snapshot`].

use crate::visitor::{CellGroup, VisitorRecord, parse_timestamp};
use async_trait::async_trait;
use chrono::{Offset, Utc};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fs::{self, File, create_dir_all};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed store data: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Visitor not found: {0}")]
    NotFound(String),

    #[error("{name} is already registered with the same phone number")]
    Duplicate { name: String },

    #[error("Record store error (HTTP {status}): {message}")]
    Remote { status: u16, message: String },

    #[cfg(feature = "web")]
    #[error("Cannot reach record store at {url}: {source}")]
    Unreachable { url: String, source: reqwest::Error },

    #[error("Store lock poisoned")]
    Poisoned,
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Every visitor, newest first.
    async fn fetch_all(&self) -> Result<Vec<VisitorRecord>, StoreError>;

    async fn fetch_one(&self, id: &str) -> Result<VisitorRecord, StoreError>;

    /// Stores a new visitor. The store owns id uniqueness: a blank or
    /// already used id is replaced.
    async fn insert(&self, record: VisitorRecord) -> Result<VisitorRecord, StoreError>;

    /// Overwrites the mutable fields of an existing visitor. `id` and
    /// `created_at` keep their stored values.
    async fn update(&self, id: &str, record: VisitorRecord) -> Result<VisitorRecord, StoreError>;

    async fn delete(&self, id: &str) -> Result<(), StoreError>;

    async fn fetch_cells(&self) -> Result<Vec<CellGroup>, StoreError>;

    async fn insert_cell(&self, cell: CellGroup) -> Result<CellGroup, StoreError>;

    /// Counts one more visit for `id`.
    async fn record_visit(&self, id: &str) -> Result<VisitorRecord, StoreError> {
        let mut record = self.fetch_one(id).await?;
        record.register_visit();
        self.update(id, record).await
    }

    /// Upserts records read from a backup. Returns how many were written.
    async fn import(&self, records: Vec<VisitorRecord>) -> Result<usize, StoreError> {
        let mut written = 0;
        for record in records {
            match self.fetch_one(&record.id).await {
                Ok(_) => {
                    let id = record.id.clone();
                    self.update(&id, record).await?;
                }
                Err(StoreError::NotFound(_)) => {
                    self.insert(record).await?;
                }
                Err(e) => return Err(e),
            }
            written += 1;
        }
        Ok(written)
    }
}

/// Records fetched for one render, plus the reason they are empty when the
/// fetch failed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub records: Vec<VisitorRecord>,
    pub error: Option<String>,
}

/// Fetch boundary of every view. A failing store yields an empty snapshot
/// carrying the error message instead of an error.
pub async fn load_snapshot(store: &dyn RecordStore) -> Snapshot {
    match store.fetch_all().await {
        Ok(records) => Snapshot {
            records,
            error: None,
        },
        Err(e) => {
            warn!("Failed to fetch visitors, continuing with an empty set: {e}");
            Snapshot {
                records: Vec::new(),
                error: Some(e.to_string()),
            }
        }
    }
}

/// Decodes stored rows one at a time. Rows that do not fit `T` are logged
/// and handed back untouched instead of failing the whole batch.
pub fn split_rows<T: DeserializeOwned>(rows: Vec<Value>, source: &str) -> (Vec<T>, Vec<Value>) {
    let mut decoded = Vec::with_capacity(rows.len());
    let mut rejected = Vec::new();
    for (index, row) in rows.into_iter().enumerate() {
        match T::deserialize(&row) {
            Ok(value) => decoded.push(value),
            Err(e) => {
                warn!("Skipping malformed row {index} from {source}: {e}");
                rejected.push(row);
            }
        }
    }
    (decoded, rejected)
}

/// Like [`split_rows`], dropping the rejected rows.
pub fn decode_rows<T: DeserializeOwned>(rows: Vec<Value>, source: &str) -> Vec<T> {
    split_rows(rows, source).0
}

fn duplicate_key(record: &VisitorRecord) -> (String, String) {
    (
        record.name.trim().to_lowercase(),
        record
            .phone()
            .unwrap_or("")
            .chars()
            .filter(char::is_ascii_digit)
            .collect(),
    )
}

/// Inserts a visitor, rejecting it when duplicates are not allowed and a
/// visitor with the same name and phone already exists.
pub async fn insert_visitor(
    store: &dyn RecordStore,
    record: VisitorRecord,
    allow_duplicates: bool,
) -> Result<VisitorRecord, StoreError> {
    if !allow_duplicates {
        let key = duplicate_key(&record);
        let existing = store.fetch_all().await?;
        if existing.iter().any(|r| duplicate_key(r) == key) {
            return Err(StoreError::Duplicate {
                name: record.name.clone(),
            });
        }
    }
    let stored = store.insert(record).await?;
    info!("Registered visitor {} ({})", stored.name, stored.id);
    Ok(stored)
}

/// Orders records newest first. Unparseable timestamps sort last.
pub fn sort_newest_first(records: &mut [VisitorRecord]) {
    let utc = Utc.fix();
    records.sort_by_cached_key(|r| std::cmp::Reverse(parse_timestamp(&r.created_at, utc)));
}

fn assign_id(id: &mut String, taken: impl Fn(&str) -> bool) {
    if id.trim().is_empty() || taken(id) {
        *id = Uuid::new_v4().to_string();
    }
}

/// Keeps the stored identity of a row on overwrite.
fn carry_identity(stored: &VisitorRecord, mut incoming: VisitorRecord) -> VisitorRecord {
    incoming.id = stored.id.clone();
    incoming.created_at = stored.created_at.clone();
    incoming
}

/// In-process store, used by tests and demos.
#[derive(Debug, Default)]
pub struct MemoryStore {
    visitors: RwLock<Vec<VisitorRecord>>,
    cells: RwLock<Vec<CellGroup>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: Vec<VisitorRecord>) -> Self {
        MemoryStore {
            visitors: RwLock::new(records),
            cells: RwLock::new(Vec::new()),
        }
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn fetch_all(&self) -> Result<Vec<VisitorRecord>, StoreError> {
        let mut records = self.visitors.read().map_err(|_| StoreError::Poisoned)?.clone();
        sort_newest_first(&mut records);
        Ok(records)
    }

    async fn fetch_one(&self, id: &str) -> Result<VisitorRecord, StoreError> {
        let visitors = self.visitors.read().map_err(|_| StoreError::Poisoned)?;
        visitors
            .iter()
            .find(|r| r.id == id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    async fn insert(&self, mut record: VisitorRecord) -> Result<VisitorRecord, StoreError> {
        let mut visitors = self.visitors.write().map_err(|_| StoreError::Poisoned)?;
        assign_id(&mut record.id, |id| visitors.iter().any(|r| r.id == id));
        visitors.push(record.clone());
        Ok(record)
    }

    async fn update(&self, id: &str, record: VisitorRecord) -> Result<VisitorRecord, StoreError> {
        let mut visitors = self.visitors.write().map_err(|_| StoreError::Poisoned)?;
        let slot = visitors
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        let merged = carry_identity(slot, record);
        *slot = merged;
        Ok(slot.clone())
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        let mut visitors = self.visitors.write().map_err(|_| StoreError::Poisoned)?;
        let before = visitors.len();
        visitors.retain(|r| r.id != id);
        if visitors.len() == before {
            return Err(StoreError::NotFound(id.to_string()));
        }
        Ok(())
    }

    async fn fetch_cells(&self) -> Result<Vec<CellGroup>, StoreError> {
        Ok(self.cells.read().map_err(|_| StoreError::Poisoned)?.clone())
    }

    async fn insert_cell(&self, mut cell: CellGroup) -> Result<CellGroup, StoreError> {
        let mut cells = self.cells.write().map_err(|_| StoreError::Poisoned)?;
        assign_id(&mut cell.id, |id| cells.iter().any(|c| c.id == id));
        cells.push(cell.clone());
        Ok(cell)
    }
}

pub const VISITORS_FILE: &str = "visitors.json";
pub const CELLS_FILE: &str = "cells.json";

/// JSON files under a data directory, rewritten on every mutation.
///
/// Every read goes back to disk, so edits made by another process are
/// picked up on the next fetch.
#[derive(Debug)]
pub struct FileStore {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl FileStore {
    /// Opens (and creates, if needed) the data directory.
    ///
    /// # Errors
    /// * Returns `StoreError::Io` if the directory or its files cannot be
    ///   created
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let dir = dir.as_ref().to_path_buf();
        create_dir_all(&dir)?;
        for name in [VISITORS_FILE, CELLS_FILE] {
            let path = dir.join(name);
            if !path.exists() {
                let mut file = File::create(&path)?;
                file.write_all(b"[]")?;
            }
        }
        info!("Using file store at {}", dir.display());
        Ok(FileStore {
            dir,
            write_lock: Mutex::new(()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn read_raw(&self, name: &str) -> Result<Vec<Value>, StoreError> {
        let path = self.dir.join(name);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let reader = BufReader::new(File::open(path)?);
        Ok(serde_json::from_reader(reader)?)
    }

    fn read<T: DeserializeOwned>(&self, name: &str) -> Result<Vec<T>, StoreError> {
        Ok(decode_rows(self.read_raw(name)?, name))
    }

    fn write<T: Serialize>(&self, name: &str, rows: &[T]) -> Result<(), StoreError> {
        let path = self.dir.join(name);
        let tmp = self.dir.join(format!("{name}.tmp"));
        {
            let mut writer = BufWriter::new(File::create(&tmp)?);
            serde_json::to_writer_pretty(&mut writer, rows)?;
            writer.flush()?;
        }
        fs::rename(tmp, path)?;
        Ok(())
    }

    fn modify<T, R>(
        &self,
        name: &str,
        change: impl FnOnce(&mut Vec<T>) -> Result<R, StoreError>,
    ) -> Result<R, StoreError>
    where
        T: Serialize + DeserializeOwned,
    {
        let _guard = self.write_lock.lock().map_err(|_| StoreError::Poisoned)?;
        let (mut rows, rejected) = split_rows::<T>(self.read_raw(name)?, name);
        let result = change(&mut rows)?;

        // Rows that failed to decode are written back as they were.
        let mut out = rows
            .iter()
            .map(serde_json::to_value)
            .collect::<Result<Vec<Value>, _>>()?;
        out.extend(rejected);
        self.write(name, &out)?;
        Ok(result)
    }
}

#[async_trait]
impl RecordStore for FileStore {
    async fn fetch_all(&self) -> Result<Vec<VisitorRecord>, StoreError> {
        let mut records: Vec<VisitorRecord> = self.read(VISITORS_FILE)?;
        sort_newest_first(&mut records);
        Ok(records)
    }

    async fn fetch_one(&self, id: &str) -> Result<VisitorRecord, StoreError> {
        let records: Vec<VisitorRecord> = self.read(VISITORS_FILE)?;
        records
            .into_iter()
            .find(|r| r.id == id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    async fn insert(&self, mut record: VisitorRecord) -> Result<VisitorRecord, StoreError> {
        self.modify(VISITORS_FILE, |rows: &mut Vec<VisitorRecord>| {
            assign_id(&mut record.id, |id| rows.iter().any(|r| r.id == id));
            rows.push(record.clone());
            Ok(record)
        })
    }

    async fn update(&self, id: &str, record: VisitorRecord) -> Result<VisitorRecord, StoreError> {
        let updated = self.modify(VISITORS_FILE, |rows: &mut Vec<VisitorRecord>| {
            let slot = rows
                .iter_mut()
                .find(|r| r.id == id)
                .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
            let merged = carry_identity(slot, record);
            *slot = merged;
            Ok(slot.clone())
        })?;
        info!("Updated visitor {id}");
        Ok(updated)
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        self.modify(VISITORS_FILE, |rows: &mut Vec<VisitorRecord>| {
            let before = rows.len();
            rows.retain(|r| r.id != id);
            if rows.len() == before {
                return Err(StoreError::NotFound(id.to_string()));
            }
            Ok(())
        })?;
        info!("Deleted visitor {id}");
        Ok(())
    }

    async fn fetch_cells(&self) -> Result<Vec<CellGroup>, StoreError> {
        self.read(CELLS_FILE)
    }

    async fn insert_cell(&self, mut cell: CellGroup) -> Result<CellGroup, StoreError> {
        self.modify(CELLS_FILE, |rows: &mut Vec<CellGroup>| {
            assign_id(&mut cell.id, |id| rows.iter().any(|c| c.id == id));
            rows.push(cell.clone());
            Ok(cell)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::fixtures::record;

    /// Always fails, like an unreachable backend.
    struct BrokenStore;

    #[async_trait]
    impl RecordStore for BrokenStore {
        async fn fetch_all(&self) -> Result<Vec<VisitorRecord>, StoreError> {
            Err(StoreError::Remote {
                status: 503,
                message: "unavailable".into(),
            })
        }
        async fn fetch_one(&self, id: &str) -> Result<VisitorRecord, StoreError> {
            Err(StoreError::NotFound(id.into()))
        }
        async fn insert(&self, r: VisitorRecord) -> Result<VisitorRecord, StoreError> {
            Ok(r)
        }
        async fn update(&self, _id: &str, r: VisitorRecord) -> Result<VisitorRecord, StoreError> {
            Ok(r)
        }
        async fn delete(&self, _id: &str) -> Result<(), StoreError> {
            Ok(())
        }
        async fn fetch_cells(&self) -> Result<Vec<CellGroup>, StoreError> {
            Ok(Vec::new())
        }
        async fn insert_cell(&self, c: CellGroup) -> Result<CellGroup, StoreError> {
            Ok(c)
        }
    }

    #[tokio::test]
    async fn failed_fetch_degrades_to_empty_snapshot() {
        let snapshot = load_snapshot(&BrokenStore).await;
        assert!(snapshot.records.is_empty());
        assert!(snapshot.error.unwrap().contains("503"));
    }

    #[tokio::test]
    async fn memory_store_orders_newest_first() {
        let store = MemoryStore::with_records(vec![
            record("old", "2024-01-01T10:00:00Z", 1),
            record("bad", "not a date", 1),
            record("new", "2024-03-01T10:00:00Z", 1),
        ]);
        let ids: Vec<_> = store
            .fetch_all()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, ["new", "old", "bad"]);
    }

    #[tokio::test]
    async fn insert_replaces_taken_ids() {
        let store = MemoryStore::new();
        let first = store.insert(record("same", "2024-03-01T10:00:00Z", 1)).await.unwrap();
        let second = store.insert(record("same", "2024-03-02T10:00:00Z", 1)).await.unwrap();
        assert_eq!(first.id, "same");
        assert_ne!(second.id, "same");
    }

    #[tokio::test]
    async fn update_keeps_identity_and_visit_increments() {
        let store = MemoryStore::with_records(vec![record("a", "2024-03-01T10:00:00Z", 1)]);
        let mut edit = record("ignored", "2030-01-01T00:00:00Z", 1);
        edit.name = "Ana Paula".into();
        let updated = store.update("a", edit).await.unwrap();
        assert_eq!(updated.id, "a");
        assert_eq!(updated.created_at, "2024-03-01T10:00:00Z");
        assert_eq!(updated.name, "Ana Paula");

        let visited = store.record_visit("a").await.unwrap();
        assert_eq!(visited.visit_count, 2);
        assert!(!visited.is_new_visitor);

        assert!(matches!(
            store.update("missing", record("x", "", 1)).await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn duplicates_rejected_unless_allowed() {
        let store = MemoryStore::new();
        let mut ana = record("a", "2024-03-01T10:00:00Z", 1);
        ana.name = "Ana".into();
        ana.metadata.telefone = Some("(11) 99999-0000".into());
        insert_visitor(&store, ana.clone(), false).await.unwrap();

        let mut again = ana.clone();
        again.id = String::new();
        again.name = "  ANA ".into();
        again.metadata.telefone = Some("11999990000".into());
        assert!(matches!(
            insert_visitor(&store, again.clone(), false).await,
            Err(StoreError::Duplicate { .. })
        ));
        insert_visitor(&store, again, true).await.unwrap();
        assert_eq!(store.fetch_all().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn import_upserts_by_id() {
        let store = MemoryStore::with_records(vec![record("a", "2024-03-01T10:00:00Z", 1)]);
        let mut changed = record("a", "2024-03-01T10:00:00Z", 4);
        changed.name = "Changed".into();
        let written = store
            .import(vec![changed, record("b", "2024-03-02T10:00:00Z", 1)])
            .await
            .unwrap();
        assert_eq!(written, 2);
        assert_eq!(store.fetch_one("a").await.unwrap().visit_count, 4);
        assert!(store.fetch_one("b").await.is_ok());
    }
}
