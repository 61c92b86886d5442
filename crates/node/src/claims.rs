//! Exclusive claims held by staged transactions
//!
//! A record identity or unique index key staged by one log id stays claimed
//! until that transaction's phase 2 resolves. Other log ids cannot stage it.

use std::collections::HashMap;
use tessera_common::{LogId, Rid};

/// Unique index key: (index name, key bytes)
pub(crate) type KeyClaim = (String, Option<Vec<u8>>);

#[derive(Debug, Default)]
pub(crate) struct ClaimTable {
    records: HashMap<Rid, LogId>,
    keys: HashMap<KeyClaim, LogId>,
}

impl ClaimTable {
    /// Other log id holding the record, if any
    pub fn record_holder(&self, rid: &Rid, log_id: LogId) -> Option<LogId> {
        self.records
            .get(rid)
            .copied()
            .filter(|holder| *holder != log_id)
    }

    pub fn key_holder(&self, key: &KeyClaim, log_id: LogId) -> Option<LogId> {
        self.keys.get(key).copied().filter(|holder| *holder != log_id)
    }

    pub fn claim(&mut self, log_id: LogId, records: &[Rid], keys: &[KeyClaim]) {
        for rid in records {
            self.records.insert(*rid, log_id);
        }
        for key in keys {
            self.keys.insert(key.clone(), log_id);
        }
    }

    /// Drop the claims `log_id` holds; claims of other log ids are untouched
    pub fn release(&mut self, log_id: LogId, records: &[Rid], keys: &[KeyClaim]) {
        for rid in records {
            if self.records.get(rid) == Some(&log_id) {
                self.records.remove(rid);
            }
        }
        for key in keys {
            if self.keys.get(key) == Some(&log_id) {
                self.keys.remove(key);
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty() && self.keys.is_empty()
    }
}
