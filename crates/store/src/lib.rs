//! Record storage collaborator
//!
//! The transaction core consumes storage only through `RecordStore`: read a
//! record's committed version, read index entries, reserve positions, and
//! apply a batch of writes with compare-and-set semantics.

pub mod cache;
pub mod config;
pub mod error;
pub mod memory;
pub mod record;
pub mod store;

pub use cache::RecordCache;
pub use config::StoreConfig;
pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use record::{CommitBatch, IndexDefinition, IndexWrite, RecordWrite, StoredRecord};
pub use store::RecordStore;
