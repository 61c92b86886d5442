//! Stored records and the write batches applied to them

use serde::{Deserialize, Serialize};
use tessera_common::Rid;

/// A durably committed record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub identity: Rid,
    pub version: i32,
    pub record_format: u8,
    pub content: Vec<u8>,
}

/// Declared index and its constraint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDefinition {
    pub name: String,
    pub unique: bool,
}

/// One record mutation with the version it expects to replace
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordWrite {
    Create {
        identity: Rid,
        version: i32,
        record_format: u8,
        content: Vec<u8>,
    },
    /// `content` is `None` when only metadata changed
    Update {
        identity: Rid,
        expected_version: i32,
        new_version: i32,
        record_format: u8,
        content: Option<Vec<u8>>,
    },
    Delete {
        identity: Rid,
        expected_version: i32,
    },
}

impl RecordWrite {
    pub fn identity(&self) -> Rid {
        match self {
            Self::Create { identity, .. }
            | Self::Update { identity, .. }
            | Self::Delete { identity, .. } => *identity,
        }
    }
}

/// One resolved index mutation; all identities are persisted
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexWrite {
    Put {
        index: String,
        key: Option<Vec<u8>>,
        value: Rid,
    },
    /// Removes only `value` under the key when given, otherwise the whole key
    Remove {
        index: String,
        key: Option<Vec<u8>>,
        value: Option<Rid>,
    },
    Clear {
        index: String,
    },
}

impl IndexWrite {
    pub fn index(&self) -> &str {
        match self {
            Self::Put { index, .. } | Self::Remove { index, .. } | Self::Clear { index } => index,
        }
    }
}

/// Writes applied atomically: all of them or none
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitBatch {
    pub records: Vec<RecordWrite>,
    pub indexes: Vec<IndexWrite>,
}

impl CommitBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty() && self.indexes.is_empty()
    }
}
