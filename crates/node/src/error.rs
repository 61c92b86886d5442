//! Error types for the node executor

use tessera_network::NetworkError;
use tessera_protocol::ProtocolError;
use tessera_store::StoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum NodeError {
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Server already running for {0}")]
    AlreadyRunning(String),
}

pub type Result<T> = std::result::Result<T, NodeError>;
