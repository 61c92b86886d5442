//! Wire envelope for the tessera transaction protocol
//!
//! This crate serializes transactions between a client and the node it talks
//! to, and between that node and its peers:
//! - the operation envelope (record operations and index-key deltas)
//! - the begin-transaction request and transaction response
//! - phase-1/phase-2 node requests and responses
//!
//! All integers are big-endian; strings and byte arrays are length-prefixed.

pub mod begin;
pub mod codec;
pub mod envelope;
pub mod error;
pub mod node;
pub mod open;
pub mod response;

pub use begin::BeginTransactionRequest;
pub use envelope::{decode_operation, decode_transaction, encode_operation, encode_transaction};
pub use error::{ProtocolError, Result};
pub use node::{AppliedRecord, CommitOutcome, NodeRequest, NodeResponse};
pub use open::OpenRequest;
pub use response::{
    CreatedRecord, DeletedRecord, TransactionError, TransactionResponse, UpdatedRecord,
};
