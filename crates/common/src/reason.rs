//! Client-visible transaction failure reasons

use crate::{MemberId, Rid};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why a transaction (or one member's vote on it) failed
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum ErrorReason {
    #[error("Record {rid} version mismatch: expected {expected}, stored {actual}")]
    ConcurrentModification { rid: Rid, expected: i32, actual: i32 },

    /// Another unresolved transaction has staged the record
    #[error("Record {rid} is staged by transaction {holder}")]
    RecordClaimed { rid: Rid, holder: u64 },

    #[error("Unique constraint violated on index {index}")]
    UniqueConstraint { index: String, key: Option<Vec<u8>> },

    #[error("Member {0} did not answer in time")]
    MemberUnreachable(MemberId),

    #[error("Transaction {0} already resolved")]
    StaleTransaction(u64),

    #[error("Local failure: {0}")]
    LocalFailure(String),
}

impl ErrorReason {
    /// Stable kind string used on the client wire
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ConcurrentModification { .. } | Self::RecordClaimed { .. } => {
                "ConcurrentModification"
            }
            Self::UniqueConstraint { .. } => "UniqueConstraint",
            Self::MemberUnreachable(_) => "MemberUnreachable",
            Self::StaleTransaction(_) => "StaleTransaction",
            Self::LocalFailure(_) => "LocalFailure",
        }
    }

    /// Check if the client may resubmit the same transaction unchanged
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::MemberUnreachable(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_strings() {
        let reason = ErrorReason::ConcurrentModification {
            rid: Rid::new(10, 5),
            expected: 3,
            actual: 4,
        };
        assert_eq!(reason.kind(), "ConcurrentModification");
        assert_eq!(
            reason.to_string(),
            "Record #10:5 version mismatch: expected 3, stored 4"
        );
        assert!(!reason.is_retryable());

        let reason = ErrorReason::RecordClaimed {
            rid: Rid::new(10, 5),
            holder: 7,
        };
        assert_eq!(reason.kind(), "ConcurrentModification");
        assert_eq!(reason.to_string(), "Record #10:5 is staged by transaction 7");

        let reason = ErrorReason::MemberUnreachable(MemberId::new("node-2"));
        assert_eq!(reason.kind(), "MemberUnreachable");
        assert!(reason.is_retryable());
    }
}
