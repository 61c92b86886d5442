//! Audit log of transaction decisions

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tessera_common::{LogId, MemberId};

/// Outcome of a transaction's phase 1
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Decision {
    Commit,
    Abort,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub log_id: LogId,
    pub client_tx_id: i32,
    pub decision: Decision,
    pub members: Vec<MemberId>,
}

/// Decisions of transactions submitted with `using_log`, in decision order
#[derive(Debug, Default)]
pub struct TransactionLog {
    entries: Mutex<Vec<LogEntry>>,
}

impl TransactionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&self, entry: LogEntry) {
        tracing::debug!(
            "Logged {:?} for log {} (client tx {})",
            entry.decision,
            entry.log_id,
            entry.client_tx_id
        );
        self.entries.lock().push(entry);
    }

    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries.lock().clone()
    }

    pub fn find(&self, log_id: LogId) -> Option<LogEntry> {
        self.entries
            .lock()
            .iter()
            .find(|entry| entry.log_id == log_id)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
