//! Storage capability consumed by the node executor

use crate::error::Result;
use crate::record::{CommitBatch, IndexDefinition, StoredRecord};
use tessera_common::Rid;

/// Narrow read and compare-and-set interface over durable records
///
/// Implementations must apply a `CommitBatch` atomically: every expected
/// version is checked before anything is written.
pub trait RecordStore: Send + Sync {
    fn get(&self, rid: &Rid) -> Result<Option<StoredRecord>>;

    /// Committed version of a record, `None` if it does not exist
    fn version_of(&self, rid: &Rid) -> Result<Option<i32>> {
        Ok(self.get(rid)?.map(|record| record.version))
    }

    fn index(&self, name: &str) -> Option<IndexDefinition>;

    /// Identities stored under `key` in the named index
    fn lookup(&self, index: &str, key: Option<&[u8]>) -> Result<Vec<Rid>>;

    /// Reserve `count` fresh positions in `cluster_id`
    fn allocate(&self, cluster_id: i32, count: usize) -> Result<Vec<Rid>>;

    fn apply(&self, batch: CommitBatch) -> Result<()>;
}
