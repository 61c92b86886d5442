//! Common types for the tessera transaction core
//!
//! This crate defines:
//! - Record identities (`Rid`) and their temporary/persisted forms
//! - Coordinator-assigned transaction log ids
//! - Record operations and index-key deltas that make up a transaction
//! - The client-visible error taxonomy (`ErrorReason`)

mod index;
mod log_id;
mod member;
mod operation;
mod reason;
mod rid;

pub use index::{IndexChange, KeyDelta, KeyOperation};
pub use log_id::LogId;
pub use member::MemberId;
pub use operation::{OperationKind, RecordOperation, RecordPayload};
pub use reason::ErrorReason;
pub use rid::Rid;
