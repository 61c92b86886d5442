//! In-memory member network for testing distributed transactions
//!
//! This crate stands in for the transport between a coordinator and the
//! members of a transaction: request/reply delivery to named members, plus
//! partitions and delays for failure testing.

use thiserror::Error;

pub mod client;
pub mod message;
pub mod network;

pub use client::NetworkClient;
pub use message::{FROM_HEADER, LOG_ID_HEADER, Message};
pub use network::{Envelope, MockNetwork};

/// Network errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NetworkError {
    #[error("Unknown member: {0}")]
    UnknownMember(String),

    #[error("Operation timed out")]
    Timeout,

    #[error("Channel closed")]
    ChannelClosed,
}

pub type Result<T> = std::result::Result<T, NetworkError>;
