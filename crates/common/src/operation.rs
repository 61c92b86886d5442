//! Record operations carried by a transaction

use crate::Rid;
use serde::{Deserialize, Serialize};

/// Kind of mutation a record operation performs
///
/// The discriminants are the single-byte wire values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum OperationKind {
    /// Record was only read; never sent on the wire
    Loaded = 0,
    Updated = 1,
    Deleted = 2,
    Created = 3,
}

impl OperationKind {
    /// Parse from the wire byte
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Self::Loaded),
            1 => Some(Self::Updated),
            2 => Some(Self::Deleted),
            3 => Some(Self::Created),
            _ => None,
        }
    }

    pub fn as_byte(&self) -> u8 {
        *self as u8
    }

    /// Check if operations of this kind carry record content
    pub fn carries_payload(&self) -> bool {
        matches!(self, Self::Created | Self::Updated)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Loaded => "loaded",
            Self::Updated => "updated",
            Self::Deleted => "deleted",
            Self::Created => "created",
        }
    }
}

/// Record content sent with CREATED and UPDATED operations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordPayload {
    /// False when only record metadata was touched
    pub content_changed: bool,
    /// Serialized record, opaque to the transaction core
    pub content: Vec<u8>,
}

impl RecordPayload {
    pub fn new(content: Vec<u8>) -> Self {
        Self {
            content_changed: true,
            content,
        }
    }

    /// Payload for a record whose metadata changed but not its content
    pub fn metadata_only(content: Vec<u8>) -> Self {
        Self {
            content_changed: false,
            content,
        }
    }
}

/// One mutation inside a transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordOperation {
    pub kind: OperationKind,
    pub identity: Rid,
    /// Optimistic concurrency counter the client expects to be stored
    pub version: i32,
    /// Tag identifying how the payload bytes are structured
    pub record_format: u8,
    /// Present exactly for CREATED and UPDATED operations
    pub payload: Option<RecordPayload>,
}

impl RecordOperation {
    pub fn created(identity: Rid, record_format: u8, payload: RecordPayload) -> Self {
        Self {
            kind: OperationKind::Created,
            identity,
            version: 0,
            record_format,
            payload: Some(payload),
        }
    }

    pub fn updated(identity: Rid, version: i32, record_format: u8, payload: RecordPayload) -> Self {
        Self {
            kind: OperationKind::Updated,
            identity,
            version,
            record_format,
            payload: Some(payload),
        }
    }

    pub fn deleted(identity: Rid, version: i32, record_format: u8) -> Self {
        Self {
            kind: OperationKind::Deleted,
            identity,
            version,
            record_format,
            payload: None,
        }
    }

    pub fn loaded(identity: Rid, version: i32, record_format: u8) -> Self {
        Self {
            kind: OperationKind::Loaded,
            identity,
            version,
            record_format,
            payload: None,
        }
    }

    /// Check if this operation belongs on the wire
    pub fn is_transmitted(&self) -> bool {
        self.kind != OperationKind::Loaded
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_bytes() {
        for kind in [
            OperationKind::Loaded,
            OperationKind::Updated,
            OperationKind::Deleted,
            OperationKind::Created,
        ] {
            assert_eq!(OperationKind::from_byte(kind.as_byte()), Some(kind));
        }
        assert_eq!(OperationKind::from_byte(9), None);
    }

    #[test]
    fn test_constructors() {
        let op = RecordOperation::created(Rid::temporary(0), b'd', RecordPayload::new(vec![1]));
        assert!(op.kind.carries_payload());
        assert!(op.is_transmitted());

        let op = RecordOperation::deleted(Rid::new(10, 5), 3, b'd');
        assert!(op.payload.is_none());

        let op = RecordOperation::loaded(Rid::new(10, 5), 3, b'd');
        assert!(!op.is_transmitted());
    }

    #[test]
    fn test_operation_serde() {
        let op = RecordOperation::updated(
            Rid::new(10, 5),
            3,
            b'd',
            RecordPayload::metadata_only(b"{}".to_vec()),
        );
        let json = serde_json::to_string(&op).unwrap();
        let back: RecordOperation = serde_json::from_str(&json).unwrap();
        assert_eq!(op, back);
    }
}
