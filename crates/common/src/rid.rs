//! Record identity

use serde::{Deserialize, Serialize};
use std::fmt;

/// Cluster id reserved for records that have not been persisted yet
pub const TEMPORARY_CLUSTER: i32 = -1;

/// Record identity: a (cluster id, position) pair
///
/// A negative cluster id marks a temporary identity. Temporary identities are
/// only unique within one client transaction, disambiguated by the position,
/// which then holds a client-local sequence number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Rid {
    pub cluster_id: i32,
    pub position: i64,
}

impl Rid {
    pub const fn new(cluster_id: i32, position: i64) -> Self {
        Self {
            cluster_id,
            position,
        }
    }

    /// Temporary identity for the `sequence`-th new record of a transaction
    pub const fn temporary(sequence: i64) -> Self {
        Self::new(TEMPORARY_CLUSTER, sequence)
    }

    /// Check if this identity has not been persisted yet
    pub fn is_temporary(&self) -> bool {
        self.cluster_id < 0
    }

    /// Check if this identity refers to a persisted record
    pub fn is_persistent(&self) -> bool {
        !self.is_temporary()
    }
}

impl fmt::Display for Rid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}:{}", self.cluster_id, self.position)
    }
}
