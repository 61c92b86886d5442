//! Error types for the coordinator

use crate::reconcile::ReconcileError;
use tessera_common::{LogId, MemberId, Rid};
use tessera_network::NetworkError;
use tessera_protocol::ProtocolError;
use thiserror::Error;

/// Coordinator error types
///
/// Transaction aborts are not errors: they come back as a failed
/// `TransactionResponse`. These variants cover rejected input, transport
/// trouble and commits whose durability could not be confirmed.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoordinatorError {
    #[error("Transaction has no members")]
    EmptyMemberSet,

    #[error("Member {0} listed twice")]
    DuplicateMember(MemberId),

    #[error("Loaded operation on {0} cannot be submitted")]
    LoadedOperation(Rid),

    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Reconciliation failed: {0}")]
    Reconciliation(#[from] ReconcileError),

    #[error("Log {log_id} committed but member {member} did not confirm: {last_error}")]
    DurabilityRisk {
        log_id: LogId,
        member: MemberId,
        last_error: String,
    },

    #[error("No open session")]
    NoSession,

    #[error("Invalid session: {0}")]
    InvalidSession(String),

    #[error("Transaction task failed: {0}")]
    TaskFailed(String),
}

/// Result type for coordinator operations
pub type Result<T> = std::result::Result<T, CoordinatorError>;
