//! Index-key deltas carried by a transaction

use crate::Rid;
use serde::{Deserialize, Serialize};

/// Kind of key-level index mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum KeyOperation {
    /// Add an entry mapping the key to the value reference
    Put = 0,
    /// Remove the key's entry (or only the given value reference)
    Remove = 1,
    /// Remove every entry of the index
    Clear = 2,
}

impl KeyOperation {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Self::Put),
            1 => Some(Self::Remove),
            2 => Some(Self::Clear),
            _ => None,
        }
    }

    pub fn as_byte(&self) -> u8 {
        *self as u8
    }
}

/// One key-level delta; `None` key is the null key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyDelta {
    pub key: Option<Vec<u8>>,
    pub operation: KeyOperation,
    pub value: Option<Rid>,
}

impl KeyDelta {
    pub fn put(key: impl Into<Vec<u8>>, value: Rid) -> Self {
        Self {
            key: Some(key.into()),
            operation: KeyOperation::Put,
            value: Some(value),
        }
    }

    pub fn remove(key: impl Into<Vec<u8>>, value: Option<Rid>) -> Self {
        Self {
            key: Some(key.into()),
            operation: KeyOperation::Remove,
            value,
        }
    }

    pub fn clear() -> Self {
        Self {
            key: None,
            operation: KeyOperation::Clear,
            value: None,
        }
    }
}

/// Ordered key deltas for one named index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexChange {
    pub index_name: String,
    pub deltas: Vec<KeyDelta>,
}

impl IndexChange {
    pub fn new(index_name: impl Into<String>, deltas: Vec<KeyDelta>) -> Self {
        Self {
            index_name: index_name.into(),
            deltas,
        }
    }
}
