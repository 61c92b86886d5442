//! Error types for record storage

use tessera_common::Rid;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("Record not found: {0}")]
    RecordNotFound(Rid),

    #[error("Record already exists: {0}")]
    RecordExists(Rid),

    #[error("Record {rid} version mismatch: expected {expected}, stored {actual}")]
    VersionMismatch { rid: Rid, expected: i32, actual: i32 },

    #[error("Unknown index: {0}")]
    UnknownIndex(String),

    #[error("Index already defined: {0}")]
    IndexExists(String),

    #[error("Unique constraint violated on index {0}")]
    UniqueViolation(String),

    #[error("Temporary identity cannot be stored: {0}")]
    TemporaryIdentity(Rid),

    #[error("Invalid cluster: {0}")]
    InvalidCluster(i32),
}

pub type Result<T> = std::result::Result<T, StoreError>;
