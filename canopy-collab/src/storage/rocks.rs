//! RocksDB-backed persistence.
//!
//! Column families:
//! - `documents`: latest full-state snapshot per document (LZ4)
//! - `deltas`: updates appended after that snapshot (LZ4), keyed by
//!   document prefix and a big-endian sequence number
//! - `metadata`: bincode-encoded [`StoredMetadata`]
//!
//! Updates for one document arrive serialized by that document's
//! transaction gate, so the read-modify-write of its metadata never races.

use std::path::{Path, PathBuf};

use canopy_core::model::now_millis;
use canopy_core::DocumentSummary;
use rocksdb::{
    BlockBasedOptions, Cache, ColumnFamily, ColumnFamilyDescriptor, DBCompressionType,
    DBWithThreadMode, Direction, IteratorMode, Options, SingleThreaded, WriteBatch, WriteOptions,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use super::{merge_updates, Persistence, StoreError};

const CF_DOCUMENTS: &str = "documents";
const CF_DELTAS: &str = "deltas";
const CF_METADATA: &str = "metadata";

const COLUMN_FAMILIES: &[&str] = &[CF_DOCUMENTS, CF_DELTAS, CF_METADATA];

#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub path: PathBuf,
    /// Block cache size in bytes.
    pub block_cache_size: usize,
    pub bloom_filter_bits: i32,
    /// fsync on every write.
    pub sync_writes: bool,
    pub max_open_files: i32,
    /// Write buffer size per column family.
    pub write_buffer_size: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("canopy_data"),
            block_cache_size: 64 * 1024 * 1024,
            bloom_filter_bits: 10,
            sync_writes: false,
            max_open_files: 512,
            write_buffer_size: 32 * 1024 * 1024,
        }
    }
}

impl StoreConfig {
    /// Small caches for tests.
    pub fn for_testing(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            block_cache_size: 8 * 1024 * 1024,
            bloom_filter_bits: 10,
            sync_writes: false,
            max_open_files: 64,
            write_buffer_size: 4 * 1024 * 1024,
        }
    }
}

/// Per-document bookkeeping.  Fields are never skipped when serializing:
/// bincode is not self-describing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoredMetadata {
    pub doc_id: String,
    pub title: String,
    pub folder: Option<String>,
    pub page_count: usize,
    /// Sequence number of the newest delta.
    pub last_sequence: u64,
    /// Deltas stored since the last snapshot.
    pub delta_count: u64,
    pub snapshot_size: u64,
    pub compressed_size: u64,
    pub created_at: u64,
    pub updated_at: u64,
}

impl StoredMetadata {
    fn new(doc_id: &str) -> Self {
        let now = now_millis();
        Self {
            doc_id: doc_id.to_string(),
            title: canopy_core::model::DEFAULT_TITLE.to_string(),
            folder: None,
            page_count: 0,
            last_sequence: 0,
            delta_count: 0,
            snapshot_size: 0,
            compressed_size: 0,
            created_at: now,
            updated_at: now,
        }
    }

    fn apply_summary(&mut self, summary: &DocumentSummary) {
        self.title = summary.title.clone();
        self.folder = summary.folder.clone();
        self.page_count = summary.page_count;
    }

    fn summary(&self) -> DocumentSummary {
        DocumentSummary {
            id: self.doc_id.clone(),
            title: self.title.clone(),
            folder: self.folder.clone(),
            page_count: self.page_count,
            updated_at: self.updated_at,
        }
    }

    fn encode(&self) -> Result<Vec<u8>, StoreError> {
        bincode::serde::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| StoreError::Serialization(e.to_string()))
    }

    fn decode(bytes: &[u8]) -> Result<Self, StoreError> {
        let (meta, _) = bincode::serde::decode_from_slice(bytes, bincode::config::standard())
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(meta)
    }
}

pub struct RocksStore {
    db: DBWithThreadMode<SingleThreaded>,
    config: StoreConfig,
}

impl RocksStore {
    /// Open or create the database at `config.path`.
    pub fn open(config: StoreConfig) -> Result<Self, StoreError> {
        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);
        db_opts.set_max_open_files(config.max_open_files);
        db_opts.set_keep_log_file_num(5);
        db_opts.increase_parallelism(num_cpus());

        let descriptors: Vec<ColumnFamilyDescriptor> = COLUMN_FAMILIES
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Self::cf_options(name, &config)))
            .collect();

        let db = DBWithThreadMode::<SingleThreaded>::open_cf_descriptors(
            &db_opts,
            &config.path,
            descriptors,
        )?;
        log::info!("opened document store at {}", config.path.display());
        Ok(Self { db, config })
    }

    fn cf_options(name: &str, config: &StoreConfig) -> Options {
        let mut opts = Options::default();

        let mut block_opts = BlockBasedOptions::default();
        let cache = Cache::new_lru_cache(config.block_cache_size);
        block_opts.set_block_cache(&cache);
        block_opts.set_bloom_filter(config.bloom_filter_bits as f64, false);
        block_opts.set_block_size(16 * 1024);
        opts.set_block_based_table_factory(&block_opts);

        // Values are LZ4-compressed before they reach RocksDB.
        opts.set_compression_type(DBCompressionType::None);
        opts.set_write_buffer_size(config.write_buffer_size);

        match name {
            CF_DOCUMENTS | CF_METADATA => {
                opts.set_max_write_buffer_number(2);
                opts.optimize_for_point_lookup(config.block_cache_size as u64);
            }
            CF_DELTAS => {
                opts.set_max_write_buffer_number(4);
            }
            _ => {}
        }
        opts
    }

    fn cf(&self, name: &'static str) -> Result<&ColumnFamily, StoreError> {
        self.db
            .cf_handle(name)
            .ok_or(StoreError::MissingColumnFamily(name))
    }

    fn write_options(&self) -> WriteOptions {
        let mut opts = WriteOptions::default();
        opts.set_sync(self.config.sync_writes);
        opts
    }

    /// Length-prefixed document id, so no id is a prefix of another.
    fn doc_prefix(doc_id: &str) -> Vec<u8> {
        let mut key = Vec::with_capacity(doc_id.len() + 2);
        key.extend_from_slice(&(doc_id.len() as u16).to_be_bytes());
        key.extend_from_slice(doc_id.as_bytes());
        key
    }

    fn delta_key(doc_id: &str, sequence: u64) -> Vec<u8> {
        let mut key = Self::doc_prefix(doc_id);
        key.extend_from_slice(&sequence.to_be_bytes());
        key
    }

    pub fn metadata(&self, doc_id: &str) -> Result<Option<StoredMetadata>, StoreError> {
        let cf = self.cf(CF_METADATA)?;
        match self.db.get_cf(cf, doc_id.as_bytes())? {
            Some(bytes) => StoredMetadata::decode(&bytes).map(Some),
            None => Ok(None),
        }
    }

    fn load_snapshot(&self, doc_id: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let cf = self.cf(CF_DOCUMENTS)?;
        match self.db.get_cf(cf, doc_id.as_bytes())? {
            Some(compressed) => lz4_flex::decompress_size_prepended(&compressed)
                .map(Some)
                .map_err(|e| StoreError::Compression(e.to_string())),
            None => Ok(None),
        }
    }

    /// Deltas in sequence order, decompressed.
    pub fn load_deltas(&self, doc_id: &str) -> Result<Vec<(u64, Vec<u8>)>, StoreError> {
        let cf = self.cf(CF_DELTAS)?;
        let prefix = Self::doc_prefix(doc_id);
        let mut deltas = Vec::new();
        for item in self
            .db
            .iterator_cf(cf, IteratorMode::From(&prefix, Direction::Forward))
        {
            let (key, value) = item?;
            if !key.starts_with(&prefix) || key.len() != prefix.len() + 8 {
                break;
            }
            let mut seq = [0u8; 8];
            seq.copy_from_slice(&key[prefix.len()..]);
            let delta = lz4_flex::decompress_size_prepended(&value)
                .map_err(|e| StoreError::Compression(e.to_string()))?;
            deltas.push((u64::from_be_bytes(seq), delta));
        }
        Ok(deltas)
    }

    /// Queue deletion of every delta of `doc_id` with sequence <= `up_to`.
    fn delete_deltas(&self, batch: &mut WriteBatch, doc_id: &str, up_to: u64) -> Result<u64, StoreError> {
        let cf = self.cf(CF_DELTAS)?;
        let prefix = Self::doc_prefix(doc_id);
        let mut count = 0;
        for item in self
            .db
            .iterator_cf(cf, IteratorMode::From(&prefix, Direction::Forward))
        {
            let (key, _) = item?;
            if !key.starts_with(&prefix) || key.len() != prefix.len() + 8 {
                break;
            }
            let mut seq = [0u8; 8];
            seq.copy_from_slice(&key[prefix.len()..]);
            if u64::from_be_bytes(seq) > up_to {
                break;
            }
            batch.delete_cf(cf, &key);
            count += 1;
        }
        Ok(count)
    }

    pub fn flush(&self) -> Result<(), StoreError> {
        self.db.flush()?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.config.path
    }
}

impl Persistence for RocksStore {
    fn load(&self, doc_id: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let snapshot = self.load_snapshot(doc_id)?;
        let deltas = self.load_deltas(doc_id)?;
        match (snapshot, deltas.is_empty()) {
            (None, true) => Ok(None),
            (Some(snapshot), true) => Ok(Some(snapshot)),
            (snapshot, false) => {
                let mut parts: Vec<Vec<u8>> = snapshot.into_iter().collect();
                parts.extend(deltas.into_iter().map(|(_, d)| d));
                merge_updates(doc_id, &parts).map(Some)
            }
        }
    }

    fn append_update(&self, doc_id: &str, update: &[u8]) -> Result<(), StoreError> {
        let cf_deltas = self.cf(CF_DELTAS)?;
        let cf_meta = self.cf(CF_METADATA)?;

        let mut meta = self
            .metadata(doc_id)?
            .unwrap_or_else(|| StoredMetadata::new(doc_id));
        meta.last_sequence += 1;
        meta.delta_count += 1;
        meta.updated_at = now_millis();

        let compressed = lz4_flex::compress_prepend_size(update);
        let mut batch = WriteBatch::default();
        batch.put_cf(cf_deltas, Self::delta_key(doc_id, meta.last_sequence), &compressed);
        batch.put_cf(cf_meta, doc_id.as_bytes(), meta.encode()?);
        self.db.write_opt(batch, &self.write_options())?;
        Ok(())
    }

    fn save_snapshot(
        &self,
        doc_id: &str,
        snapshot: &[u8],
        summary: &DocumentSummary,
    ) -> Result<(), StoreError> {
        let cf_docs = self.cf(CF_DOCUMENTS)?;
        let cf_meta = self.cf(CF_METADATA)?;

        let compressed = lz4_flex::compress_prepend_size(snapshot);
        let mut meta = self
            .metadata(doc_id)?
            .unwrap_or_else(|| StoredMetadata::new(doc_id));
        meta.apply_summary(summary);
        meta.snapshot_size = snapshot.len() as u64;
        meta.compressed_size = compressed.len() as u64;
        meta.updated_at = now_millis();

        // Snapshot, metadata and compaction of the deltas it covers land
        // in one atomic batch.
        let mut batch = WriteBatch::default();
        let compacted = self.delete_deltas(&mut batch, doc_id, meta.last_sequence)?;
        meta.delta_count = 0;
        batch.put_cf(cf_docs, doc_id.as_bytes(), &compressed);
        batch.put_cf(cf_meta, doc_id.as_bytes(), meta.encode()?);
        self.db.write_opt(batch, &self.write_options())?;

        log::debug!(
            "snapshot for {doc_id}: {} bytes ({} compressed), {compacted} deltas compacted",
            meta.snapshot_size,
            meta.compressed_size
        );
        Ok(())
    }

    fn list(&self) -> Result<Vec<DocumentSummary>, StoreError> {
        let cf = self.cf(CF_METADATA)?;
        let mut list = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (_, value) = item?;
            list.push(StoredMetadata::decode(&value)?.summary());
        }
        list.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then_with(|| a.id.cmp(&b.id)));
        Ok(list)
    }

    fn delete(&self, doc_id: &str) -> Result<bool, StoreError> {
        let existed = self.metadata(doc_id)?.is_some();
        let cf_docs = self.cf(CF_DOCUMENTS)?;
        let cf_meta = self.cf(CF_METADATA)?;

        let mut batch = WriteBatch::default();
        self.delete_deltas(&mut batch, doc_id, u64::MAX)?;
        batch.delete_cf(cf_docs, doc_id.as_bytes());
        batch.delete_cf(cf_meta, doc_id.as_bytes());
        self.db.write_opt(batch, &self.write_options())?;
        Ok(existed)
    }

    fn on_created(&self, doc_id: &str, summary: &DocumentSummary) -> Result<(), StoreError> {
        let cf_meta = self.cf(CF_METADATA)?;
        let mut meta = self
            .metadata(doc_id)?
            .unwrap_or_else(|| StoredMetadata::new(doc_id));
        meta.apply_summary(summary);
        self.db
            .put_cf_opt(cf_meta, doc_id.as_bytes(), meta.encode()?, &self.write_options())?;
        Ok(())
    }

    fn health_metadata(&self) -> Map<String, Value> {
        match json!({
            "persistence": "rocksdb",
            "path": self.config.path.display().to_string(),
        }) {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }
}

fn num_cpus() -> i32 {
    std::thread::available_parallelism()
        .map(|n| n.get() as i32)
        .unwrap_or(4)
}

#[cfg(test)]
mod tests {
    use super::*;
    use canopy_core::ops::documents;
    use canopy_core::{SharedDocument, UpdateOrigin};
    use std::sync::{Arc, Mutex};

    fn open(dir: &tempfile::TempDir) -> RocksStore {
        RocksStore::open(StoreConfig::for_testing(dir.path().join("db"))).unwrap()
    }

    fn summary(id: &str, title: &str) -> DocumentSummary {
        DocumentSummary {
            id: id.into(),
            title: title.into(),
            folder: Some("team".into()),
            page_count: 1,
            updated_at: 0,
        }
    }

    /// Create a document, capturing each committed update.
    fn edited_document() -> (SharedDocument, Vec<Vec<u8>>) {
        let doc = SharedDocument::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = log.clone();
        doc.on_update(move |u| sink.lock().unwrap().push(u.update.to_vec()));
        doc.transact(UpdateOrigin::Local, |g| {
            documents::create(g, "doc", documents::CreateDocument::default())
        })
        .unwrap();
        doc.transact(UpdateOrigin::Local, |g| {
            documents::update(
                g,
                documents::UpdateDocument {
                    title: Some("Edited".into()),
                    ..Default::default()
                },
            )
        })
        .unwrap();
        let updates = log.lock().unwrap().clone();
        (doc, updates)
    }

    #[test]
    fn test_open_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(&dir);
        assert!(store.path().exists());
    }

    #[test]
    fn test_load_missing() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(&dir);
        assert!(store.load("ghost").unwrap().is_none());
        assert!(!store.delete("ghost").unwrap());
    }

    #[test]
    fn test_deltas_merge_on_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(&dir);
        let (_, updates) = edited_document();
        for u in &updates {
            store.append_update("doc", u).unwrap();
        }
        assert_eq!(store.load_deltas("doc").unwrap().len(), 2);

        let restored = SharedDocument::from_state(&store.load("doc").unwrap().unwrap()).unwrap();
        let title = restored.read(|g| Ok(g.meta()?.unwrap().title)).unwrap();
        assert_eq!(title, "Edited");
    }

    #[test]
    fn test_snapshot_compacts_deltas() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(&dir);
        let (doc, updates) = edited_document();
        for u in &updates {
            store.append_update("doc", u).unwrap();
        }
        store
            .save_snapshot("doc", &doc.encode_state().unwrap(), &summary("doc", "Edited"))
            .unwrap();

        assert!(store.load_deltas("doc").unwrap().is_empty());
        let meta = store.metadata("doc").unwrap().unwrap();
        assert_eq!(meta.delta_count, 0);
        assert_eq!(meta.last_sequence, 2);
        assert!(meta.compressed_size > 0);

        let restored = SharedDocument::from_state(&store.load("doc").unwrap().unwrap()).unwrap();
        assert!(restored.is_initialized());
    }

    #[test]
    fn test_prefix_isolation() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(&dir);
        let (_, updates) = edited_document();
        store.append_update("a", &updates[0]).unwrap();
        store.append_update("ab", &updates[0]).unwrap();
        store.append_update("ab", &updates[1]).unwrap();
        assert_eq!(store.load_deltas("a").unwrap().len(), 1);
        assert_eq!(store.load_deltas("ab").unwrap().len(), 2);

        assert!(store.delete("ab").unwrap());
        assert_eq!(store.load_deltas("a").unwrap().len(), 1);
        assert!(store.load("ab").unwrap().is_none());
    }

    #[test]
    fn test_list_and_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = open(&dir);
            store.on_created("one", &summary("one", "First")).unwrap();
            store.flush().unwrap();
        }
        let store = open(&dir);
        let list = store.list().unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].title, "First");
        assert_eq!(list[0].folder.as_deref(), Some("team"));
        assert_eq!(store.health_metadata()["persistence"], "rocksdb");
    }
}
