//! Persistence collaborators.
//!
//! ```text
//! ┌──────────────┐  append_update   ┌───────────────────────────┐
//! │ Session      │ ───────────────► │ Persistence               │
//! │ (live doc)   │  save_snapshot   │  MemoryStore │ RocksStore │
//! └──────┬───────┘ ───────────────► └─────────────┬─────────────┘
//!        ▲                                        │
//!        └──────────────── load ──────────────────┘
//! ```
//! A store keeps the latest snapshot plus the updates appended after it;
//! `load` merges them into one update.

pub mod rocks;

use std::collections::HashMap;
use std::sync::Mutex;

use canopy_core::DocumentSummary;
use serde_json::{json, Map, Value};
use thiserror::Error;
use yrs::updates::decoder::Decode;
use yrs::{Doc, ReadTxn, StateVector, Transact, Update};

pub use rocks::{RocksStore, StoreConfig};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rocksdb::Error),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("compression error: {0}")]
    Compression(String),
    #[error("stored update for {doc_id} is corrupt: {reason}")]
    Corrupt { doc_id: String, reason: String },
    #[error("column family '{0}' not found")]
    MissingColumnFamily(&'static str),
    #[error("store lock poisoned")]
    Poisoned,
}

/// Durable home of document state.  Calls are synchronous and short.
pub trait Persistence: Send + Sync {
    /// Merged state of `doc_id`, or `None` if nothing is stored.
    fn load(&self, doc_id: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Record one committed update.
    fn append_update(&self, doc_id: &str, update: &[u8]) -> Result<(), StoreError>;

    /// Replace everything stored for `doc_id` with a full-state snapshot.
    fn save_snapshot(
        &self,
        doc_id: &str,
        snapshot: &[u8],
        summary: &DocumentSummary,
    ) -> Result<(), StoreError>;

    fn list(&self) -> Result<Vec<DocumentSummary>, StoreError>;

    /// Returns whether anything was stored.
    fn delete(&self, doc_id: &str) -> Result<bool, StoreError>;

    fn on_created(&self, _doc_id: &str, _summary: &DocumentSummary) -> Result<(), StoreError> {
        Ok(())
    }

    /// Extra fields for the health response.
    fn health_metadata(&self) -> Map<String, Value> {
        Map::new()
    }
}

/// Merge stored updates into one full-state update.
pub fn merge_updates(doc_id: &str, updates: &[Vec<u8>]) -> Result<Vec<u8>, StoreError> {
    let corrupt = |reason: String| StoreError::Corrupt {
        doc_id: doc_id.to_string(),
        reason,
    };
    let doc = Doc::new();
    {
        let mut txn = doc.transact_mut();
        for bytes in updates {
            let update = Update::decode_v1(bytes).map_err(|e| corrupt(e.to_string()))?;
            txn.apply_update(update).map_err(|e| corrupt(e.to_string()))?;
        }
    }
    let txn = doc.transact();
    Ok(txn.encode_state_as_update_v1(&StateVector::default()))
}

#[derive(Default)]
struct MemoryEntry {
    updates: Vec<Vec<u8>>,
    summary: Option<DocumentSummary>,
}

/// Process-local store; contents vanish with the process.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, MemoryEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, MemoryEntry>>, StoreError> {
        self.entries.lock().map_err(|_| StoreError::Poisoned)
    }

    /// Updates held for `doc_id` since its last snapshot, snapshot included.
    pub fn stored_updates(&self, doc_id: &str) -> usize {
        self.entries()
            .map(|e| e.get(doc_id).map_or(0, |entry| entry.updates.len()))
            .unwrap_or(0)
    }
}

impl Persistence for MemoryStore {
    fn load(&self, doc_id: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let updates = match self.entries()?.get(doc_id) {
            Some(entry) if !entry.updates.is_empty() => entry.updates.clone(),
            _ => return Ok(None),
        };
        merge_updates(doc_id, &updates).map(Some)
    }

    fn append_update(&self, doc_id: &str, update: &[u8]) -> Result<(), StoreError> {
        self.entries()?
            .entry(doc_id.to_string())
            .or_default()
            .updates
            .push(update.to_vec());
        Ok(())
    }

    fn save_snapshot(
        &self,
        doc_id: &str,
        snapshot: &[u8],
        summary: &DocumentSummary,
    ) -> Result<(), StoreError> {
        let mut entries = self.entries()?;
        let entry = entries.entry(doc_id.to_string()).or_default();
        entry.updates = vec![snapshot.to_vec()];
        entry.summary = Some(summary.clone());
        Ok(())
    }

    fn list(&self) -> Result<Vec<DocumentSummary>, StoreError> {
        let entries = self.entries()?;
        let mut list: Vec<DocumentSummary> = entries
            .values()
            .filter_map(|e| e.summary.clone())
            .collect();
        list.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then_with(|| a.id.cmp(&b.id)));
        Ok(list)
    }

    fn delete(&self, doc_id: &str) -> Result<bool, StoreError> {
        Ok(self.entries()?.remove(doc_id).is_some())
    }

    fn on_created(&self, doc_id: &str, summary: &DocumentSummary) -> Result<(), StoreError> {
        self.entries()?
            .entry(doc_id.to_string())
            .or_default()
            .summary = Some(summary.clone());
        Ok(())
    }

    fn health_metadata(&self) -> Map<String, Value> {
        let documents = self.entries().map(|e| e.len()).unwrap_or(0);
        match json!({ "persistence": "memory", "documents": documents }) {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use canopy_core::ops::documents;
    use canopy_core::{SharedDocument, UpdateOrigin};
    use std::sync::Arc;

    fn summary(id: &str, updated_at: u64) -> DocumentSummary {
        DocumentSummary {
            id: id.into(),
            title: "Untitled Project".into(),
            folder: None,
            page_count: 1,
            updated_at,
        }
    }

    /// A document whose updates are captured as they commit.
    fn recorded() -> (SharedDocument, Arc<Mutex<Vec<Vec<u8>>>>) {
        let doc = SharedDocument::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = log.clone();
        doc.on_update(move |u| sink.lock().unwrap().push(u.update.to_vec()));
        (doc, log)
    }

    #[test]
    fn test_memory_load_merges_updates() {
        let (doc, log) = recorded();
        doc.transact(UpdateOrigin::Local, |g| {
            documents::create(g, "d", documents::CreateDocument::default())
        })
        .unwrap();
        doc.transact(UpdateOrigin::Local, |g| {
            documents::update(
                g,
                documents::UpdateDocument {
                    title: Some("Renamed".into()),
                    ..Default::default()
                },
            )
        })
        .unwrap();

        let store = MemoryStore::new();
        for update in log.lock().unwrap().iter() {
            store.append_update("d", update).unwrap();
        }
        assert_eq!(store.stored_updates("d"), 2);

        let state = store.load("d").unwrap().unwrap();
        let restored = SharedDocument::from_state(&state).unwrap();
        let title = restored.read(|g| Ok(g.meta()?.unwrap().title)).unwrap();
        assert_eq!(title, "Renamed");
    }

    #[test]
    fn test_memory_snapshot_compacts() {
        let store = MemoryStore::new();
        let doc = SharedDocument::new();
        doc.transact(UpdateOrigin::Local, |g| {
            documents::create(g, "d", documents::CreateDocument::default())
        })
        .unwrap();
        store.append_update("d", &doc.encode_state().unwrap()).unwrap();
        store.append_update("d", &doc.encode_state().unwrap()).unwrap();
        store
            .save_snapshot("d", &doc.encode_state().unwrap(), &summary("d", 5))
            .unwrap();
        assert_eq!(store.stored_updates("d"), 1);
        assert_eq!(store.list().unwrap(), vec![summary("d", 5)]);
    }

    #[test]
    fn test_memory_missing_and_delete() {
        let store = MemoryStore::new();
        assert!(store.load("nope").unwrap().is_none());
        assert!(!store.delete("nope").unwrap());
        store.on_created("a", &summary("a", 1)).unwrap();
        store.on_created("b", &summary("b", 2)).unwrap();
        let ids: Vec<String> = store.list().unwrap().into_iter().map(|s| s.id).collect();
        assert_eq!(ids, vec!["b", "a"]);
        assert!(store.delete("a").unwrap());
        assert_eq!(store.health_metadata()["documents"], 1);
    }

    #[test]
    fn test_merge_rejects_garbage() {
        let err = merge_updates("d", &[vec![0xff, 0xff, 0xff]]).unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { .. }));
    }
}
