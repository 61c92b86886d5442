//! Node Executor for two-phase distributed transactions
//!
//! Each member of a transaction's member set runs a `NodeExecutor`. It
//! validates a transaction against its committed records in phase 1, keeps a
//! staged view under the transaction's log id, and applies or discards that
//! view in phase 2. `NodeServer` serves the executor on the member network.

mod claims;
pub mod config;
pub mod error;
pub mod executor;
pub mod server;
mod staging;

pub use config::NodeConfig;
pub use error::{NodeError, Result};
pub use executor::NodeExecutor;
pub use server::NodeServer;
