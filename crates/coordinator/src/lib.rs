//! Distributed transaction coordinator
//!
//! Runs the two-phase agreement for client transactions over a member set,
//! reconciles temporary identities with the final ones chosen by the owning
//! member, and serves the client byte protocol.

pub mod config;
pub mod coordinator;
pub mod endpoint;
pub mod error;
pub mod log;
pub mod reconcile;
pub mod transport;

pub use config::CoordinatorConfig;
pub use coordinator::{Coordinator, DurabilityRisk, TransactionState};
pub use endpoint::{ClientEndpoint, SessionContext};
pub use error::{CoordinatorError, Result};
pub use log::{Decision, LogEntry, TransactionLog};
pub use reconcile::{ReconcileError, reconcile};
pub use transport::{MemberTransport, NetworkTransport};
