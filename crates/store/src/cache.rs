//! Identity-map cache of recently read records
//!
//! The cache can be switched off at runtime. Switching it off drops every
//! entry, and while it is off all operations are no-ops.

use crate::record::StoredRecord;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tessera_common::Rid;

pub struct RecordCache {
    enabled: AtomicBool,
    entries: Mutex<HashMap<Rid, StoredRecord>>,
}

impl RecordCache {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled: AtomicBool::new(enabled),
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Turn the cache on; returns false if it was already on
    pub fn enable(&self) -> bool {
        self.enabled
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Turn the cache off and drop its entries; returns false if it was already off
    pub fn disable(&self) -> bool {
        if self
            .enabled
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        self.entries.lock().clear();
        true
    }

    pub fn get(&self, rid: &Rid) -> Option<StoredRecord> {
        if !self.is_enabled() {
            return None;
        }
        self.entries.lock().get(rid).cloned()
    }

    pub fn put(&self, record: StoredRecord) {
        if !self.is_enabled() {
            return;
        }
        self.entries.lock().insert(record.identity, record);
    }

    pub fn invalidate(&self, rid: &Rid) {
        if !self.is_enabled() {
            return;
        }
        self.entries.lock().remove(rid);
    }

    pub fn clear(&self) {
        if !self.is_enabled() {
            return;
        }
        self.entries.lock().clear();
    }

    /// Snapshot of the cached identities
    pub fn keys(&self) -> Vec<Rid> {
        let mut keys: Vec<_> = self.entries.lock().keys().copied().collect();
        keys.sort();
        keys
    }

    pub fn size(&self) -> usize {
        self.entries.lock().len()
    }
}
