//! In-memory record store

use crate::cache::RecordCache;
use crate::config::StoreConfig;
use crate::error::{Result, StoreError};
use crate::record::{CommitBatch, IndexDefinition, IndexWrite, RecordWrite, StoredRecord};
use crate::store::RecordStore;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use tessera_common::Rid;

type IndexEntries = BTreeMap<Option<Vec<u8>>, Vec<Rid>>;

#[derive(Debug, Clone)]
struct IndexState {
    definition: IndexDefinition,
    entries: IndexEntries,
}

#[derive(Default)]
struct Inner {
    records: BTreeMap<Rid, StoredRecord>,
    indexes: HashMap<String, IndexState>,
    /// Next free position per cluster
    next_position: HashMap<i32, i64>,
}

impl Inner {
    fn observe_position(&mut self, rid: Rid) {
        let next = self.next_position.entry(rid.cluster_id).or_insert(0);
        if rid.position >= *next {
            *next = rid.position + 1;
        }
    }
}

/// Record store kept entirely in memory
pub struct MemoryStore {
    inner: RwLock<Inner>,
    cache: RecordCache,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(StoreConfig::default())
    }
}

impl MemoryStore {
    pub fn new(config: StoreConfig) -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            cache: RecordCache::new(config.cache_enabled),
        }
    }

    pub fn cache(&self) -> &RecordCache {
        &self.cache
    }

    pub fn create_index(&self, name: impl Into<String>, unique: bool) -> Result<()> {
        let name = name.into();
        let mut inner = self.inner.write();
        if inner.indexes.contains_key(&name) {
            return Err(StoreError::IndexExists(name));
        }
        let definition = IndexDefinition {
            name: name.clone(),
            unique,
        };
        inner.indexes.insert(
            name,
            IndexState {
                definition,
                entries: BTreeMap::new(),
            },
        );
        Ok(())
    }

    /// Store a record directly, bypassing version checks
    pub fn insert(&self, record: StoredRecord) -> Result<()> {
        if record.identity.is_temporary() {
            return Err(StoreError::TemporaryIdentity(record.identity));
        }
        let rid = record.identity;
        let mut inner = self.inner.write();
        inner.observe_position(rid);
        inner.records.insert(rid, record);
        self.cache.invalidate(&rid);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.inner.read().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All records in identity order
    pub fn records(&self) -> Vec<StoredRecord> {
        self.inner.read().records.values().cloned().collect()
    }

    /// Full contents of an index as (key, identities) pairs
    pub fn index_entries(&self, name: &str) -> Result<Vec<(Option<Vec<u8>>, Vec<Rid>)>> {
        let inner = self.inner.read();
        let state = inner
            .indexes
            .get(name)
            .ok_or_else(|| StoreError::UnknownIndex(name.to_string()))?;
        Ok(state
            .entries
            .iter()
            .map(|(key, rids)| (key.clone(), rids.clone()))
            .collect())
    }
}

/// Replay record writes over the committed records without touching them
fn stage_records(
    committed: &BTreeMap<Rid, StoredRecord>,
    writes: Vec<RecordWrite>,
) -> Result<HashMap<Rid, Option<StoredRecord>>> {
    let mut staged: HashMap<Rid, Option<StoredRecord>> = HashMap::new();

    for write in writes {
        let rid = write.identity();
        if rid.is_temporary() {
            return Err(StoreError::TemporaryIdentity(rid));
        }
        let current = match staged.get(&rid) {
            Some(record) => record.clone(),
            None => committed.get(&rid).cloned(),
        };

        match write {
            RecordWrite::Create {
                identity,
                version,
                record_format,
                content,
            } => {
                if current.is_some() {
                    return Err(StoreError::RecordExists(identity));
                }
                staged.insert(
                    identity,
                    Some(StoredRecord {
                        identity,
                        version,
                        record_format,
                        content,
                    }),
                );
            }
            RecordWrite::Update {
                identity,
                expected_version,
                new_version,
                record_format,
                content,
            } => {
                let mut record = current.ok_or(StoreError::RecordNotFound(identity))?;
                if record.version != expected_version {
                    return Err(StoreError::VersionMismatch {
                        rid: identity,
                        expected: expected_version,
                        actual: record.version,
                    });
                }
                record.version = new_version;
                record.record_format = record_format;
                if let Some(content) = content {
                    record.content = content;
                }
                staged.insert(identity, Some(record));
            }
            RecordWrite::Delete {
                identity,
                expected_version,
            } => {
                let record = current.ok_or(StoreError::RecordNotFound(identity))?;
                if record.version != expected_version {
                    return Err(StoreError::VersionMismatch {
                        rid: identity,
                        expected: expected_version,
                        actual: record.version,
                    });
                }
                staged.insert(identity, None);
            }
        }
    }

    Ok(staged)
}

fn stage_index_write(state: &mut IndexState, write: IndexWrite) -> Result<()> {
    match write {
        IndexWrite::Put { key, value, .. } => {
            let rids = state.entries.entry(key).or_default();
            if rids.contains(&value) {
                return Ok(());
            }
            if state.definition.unique && !rids.is_empty() {
                return Err(StoreError::UniqueViolation(state.definition.name.clone()));
            }
            rids.push(value);
        }
        IndexWrite::Remove { key, value, .. } => match value {
            Some(value) => {
                if let Some(rids) = state.entries.get_mut(&key) {
                    rids.retain(|rid| *rid != value);
                    if rids.is_empty() {
                        state.entries.remove(&key);
                    }
                }
            }
            None => {
                state.entries.remove(&key);
            }
        },
        IndexWrite::Clear { .. } => state.entries.clear(),
    }
    Ok(())
}

impl RecordStore for MemoryStore {
    fn get(&self, rid: &Rid) -> Result<Option<StoredRecord>> {
        if let Some(record) = self.cache.get(rid) {
            return Ok(Some(record));
        }
        // Cache under the read lock so a concurrent apply invalidates after us
        let inner = self.inner.read();
        let record = inner.records.get(rid).cloned();
        if let Some(record) = &record {
            self.cache.put(record.clone());
        }
        Ok(record)
    }

    fn version_of(&self, rid: &Rid) -> Result<Option<i32>> {
        Ok(self.inner.read().records.get(rid).map(|r| r.version))
    }

    fn index(&self, name: &str) -> Option<IndexDefinition> {
        self.inner
            .read()
            .indexes
            .get(name)
            .map(|state| state.definition.clone())
    }

    fn lookup(&self, index: &str, key: Option<&[u8]>) -> Result<Vec<Rid>> {
        let inner = self.inner.read();
        let state = inner
            .indexes
            .get(index)
            .ok_or_else(|| StoreError::UnknownIndex(index.to_string()))?;
        Ok(state
            .entries
            .get(&key.map(|k| k.to_vec()))
            .cloned()
            .unwrap_or_default())
    }

    fn allocate(&self, cluster_id: i32, count: usize) -> Result<Vec<Rid>> {
        if cluster_id < 0 {
            return Err(StoreError::InvalidCluster(cluster_id));
        }
        let mut inner = self.inner.write();
        let next = inner.next_position.entry(cluster_id).or_insert(0);
        let start = *next;
        *next += count as i64;
        Ok((start..start + count as i64)
            .map(|position| Rid::new(cluster_id, position))
            .collect())
    }

    fn apply(&self, batch: CommitBatch) -> Result<()> {
        let mut inner = self.inner.write();

        let staged = stage_records(&inner.records, batch.records)?;

        let mut staged_indexes: HashMap<String, IndexState> = HashMap::new();
        for write in batch.indexes {
            let name = write.index().to_string();
            if !staged_indexes.contains_key(&name) {
                let state = inner
                    .indexes
                    .get(&name)
                    .cloned()
                    .ok_or_else(|| StoreError::UnknownIndex(name.clone()))?;
                staged_indexes.insert(name.clone(), state);
            }
            if let Some(state) = staged_indexes.get_mut(&name) {
                stage_index_write(state, write)?;
            }
        }

        // Every check passed; publish
        for (rid, record) in staged {
            self.cache.invalidate(&rid);
            match record {
                Some(record) => {
                    inner.observe_position(rid);
                    inner.records.insert(rid, record);
                }
                None => {
                    inner.records.remove(&rid);
                }
            }
        }
        for (name, state) in staged_indexes {
            inner.indexes.insert(name, state);
        }

        tracing::debug!("Applied batch; {} records stored", inner.records.len());
        Ok(())
    }
}
