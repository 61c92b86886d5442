//! Phase-1 validation and the staged view it produces
//!
//! Validation reads committed state only. It walks the operations in
//! submission order, then the index changes, and stops at the first
//! violation.

use crate::claims::{ClaimTable, KeyClaim};
use std::collections::HashMap;
use tessera_common::{
    ErrorReason, IndexChange, KeyOperation, LogId, OperationKind, RecordOperation, Rid,
};
use tessera_protocol::{AppliedRecord, CommitOutcome};
use tessera_store::{CommitBatch, IndexWrite, RecordStore, RecordWrite};

/// One validated record operation waiting for phase 2
#[derive(Debug, Clone)]
pub(crate) struct PlannedRecord {
    pub kind: OperationKind,
    pub submitted: Rid,
    /// Version the store must hold before this write
    pub expected_version: i32,
    /// Version after this write
    pub version: i32,
    pub record_format: u8,
    pub content: Option<Vec<u8>>,
}

/// A transaction's staged view on one member
#[derive(Debug, Clone)]
pub(crate) struct StagedTransaction {
    pub using_log: bool,
    pub records: Vec<PlannedRecord>,
    /// Index writes whose values may still be temporary identities
    pub indexes: Vec<IndexWrite>,
    pub claimed_records: Vec<Rid>,
    pub claimed_keys: Vec<KeyClaim>,
}

#[derive(Debug, Clone, Copy)]
enum Touched {
    Live(i32),
    Deleted,
}

/// Unique index state as seen from inside the transaction
struct IndexView {
    unique: bool,
    cleared: bool,
    keys: HashMap<Option<Vec<u8>>, Vec<Rid>>,
}

impl IndexView {
    fn entries(
        &mut self,
        store: &dyn RecordStore,
        index: &str,
        key: &Option<Vec<u8>>,
    ) -> Result<&mut Vec<Rid>, ErrorReason> {
        if !self.keys.contains_key(key) {
            let committed = if self.cleared {
                Vec::new()
            } else {
                store
                    .lookup(index, key.as_deref())
                    .map_err(|e| ErrorReason::LocalFailure(e.to_string()))?
            };
            self.keys.insert(key.clone(), committed);
        }
        self.keys
            .get_mut(key)
            .ok_or_else(|| ErrorReason::LocalFailure(format!("Index {} view lost", index)))
    }
}

fn local(message: String) -> ErrorReason {
    ErrorReason::LocalFailure(message)
}

/// Validate a transaction against committed state and build its staged view
pub(crate) fn stage(
    store: &dyn RecordStore,
    claims: &ClaimTable,
    log_id: LogId,
    using_log: bool,
    operations: &[RecordOperation],
    index_changes: &[IndexChange],
) -> Result<StagedTransaction, ErrorReason> {
    let mut staged = StagedTransaction {
        using_log,
        records: Vec::with_capacity(operations.len()),
        indexes: Vec::new(),
        claimed_records: Vec::new(),
        claimed_keys: Vec::new(),
    };

    let mut temporaries: HashMap<Rid, Touched> = HashMap::new();
    let mut persisted: HashMap<Rid, Touched> = HashMap::new();

    for op in operations {
        let rid = op.identity;
        match op.kind {
            OperationKind::Loaded => {
                return Err(local(format!("Loaded operation on {} cannot be staged", rid)));
            }
            OperationKind::Created => {
                if rid.is_persistent() {
                    return Err(local(format!(
                        "Created record {} must carry a temporary identity",
                        rid
                    )));
                }
                if temporaries.contains_key(&rid) {
                    return Err(local(format!("Temporary identity {} created twice", rid)));
                }
                let payload = op
                    .payload
                    .as_ref()
                    .ok_or_else(|| local(format!("Created record {} has no payload", rid)))?;

                temporaries.insert(rid, Touched::Live(1));
                staged.records.push(PlannedRecord {
                    kind: OperationKind::Created,
                    submitted: rid,
                    expected_version: 0,
                    version: 1,
                    record_format: op.record_format,
                    content: Some(payload.content.clone()),
                });
            }
            OperationKind::Updated | OperationKind::Deleted => {
                let touched = if rid.is_temporary() {
                    temporaries.get(&rid).copied()
                } else {
                    persisted.get(&rid).copied()
                };

                let current = match touched {
                    Some(Touched::Live(version)) => version,
                    Some(Touched::Deleted) => {
                        return Err(local(format!("Record {} already deleted", rid)));
                    }
                    None if rid.is_temporary() => {
                        return Err(local(format!("Unknown temporary identity {}", rid)));
                    }
                    None => {
                        // First touch of a persisted record
                        let committed = store
                            .version_of(&rid)
                            .map_err(|e| local(e.to_string()))?
                            .ok_or_else(|| local(format!("Record {} not found", rid)))?;

                        if committed != op.version {
                            return Err(ErrorReason::ConcurrentModification {
                                rid,
                                expected: op.version,
                                actual: committed,
                            });
                        }
                        if let Some(holder) = claims.record_holder(&rid, log_id) {
                            tracing::debug!(
                                "Log {} cannot stage {}: claimed by log {}",
                                log_id,
                                rid,
                                holder
                            );
                            return Err(ErrorReason::RecordClaimed {
                                rid,
                                holder: holder.as_u64(),
                            });
                        }
                        staged.claimed_records.push(rid);
                        committed
                    }
                };

                let view = if rid.is_temporary() {
                    &mut temporaries
                } else {
                    &mut persisted
                };

                if op.kind == OperationKind::Updated {
                    let payload = op
                        .payload
                        .as_ref()
                        .ok_or_else(|| local(format!("Updated record {} has no payload", rid)))?;
                    let version = current
                        .checked_add(1)
                        .ok_or_else(|| local(format!("Record {} version overflow", rid)))?;
                    view.insert(rid, Touched::Live(version));
                    staged.records.push(PlannedRecord {
                        kind: OperationKind::Updated,
                        submitted: rid,
                        expected_version: current,
                        version,
                        record_format: op.record_format,
                        content: payload.content_changed.then(|| payload.content.clone()),
                    });
                } else {
                    view.insert(rid, Touched::Deleted);
                    staged.records.push(PlannedRecord {
                        kind: OperationKind::Deleted,
                        submitted: rid,
                        expected_version: current,
                        version: current,
                        record_format: op.record_format,
                        content: None,
                    });
                }
            }
        }
    }

    let mut views: HashMap<String, IndexView> = HashMap::new();

    for change in index_changes {
        let name = &change.index_name;
        let definition = store
            .index(name)
            .ok_or_else(|| local(format!("Unknown index {}", name)))?;
        let view = views.entry(name.clone()).or_insert_with(|| IndexView {
            unique: definition.unique,
            cleared: false,
            keys: HashMap::new(),
        });

        for delta in &change.deltas {
            match delta.operation {
                KeyOperation::Put => {
                    let value = delta
                        .value
                        .ok_or_else(|| local(format!("Put on index {} without a value", name)))?;
                    if value.is_temporary() && !temporaries.contains_key(&value) {
                        return Err(local(format!("Unknown temporary identity {}", value)));
                    }

                    if view.unique {
                        let entries = view.entries(store, name, &delta.key)?;
                        if entries.iter().any(|rid| *rid != value) {
                            return Err(ErrorReason::UniqueConstraint {
                                index: name.clone(),
                                key: delta.key.clone(),
                            });
                        }
                        if !entries.contains(&value) {
                            entries.push(value);
                        }

                        let claim = (name.clone(), delta.key.clone());
                        if let Some(holder) = claims.key_holder(&claim, log_id) {
                            tracing::debug!(
                                "Log {} cannot stage key on {}: claimed by log {}",
                                log_id,
                                name,
                                holder
                            );
                            return Err(ErrorReason::UniqueConstraint {
                                index: name.clone(),
                                key: delta.key.clone(),
                            });
                        }
                        if !staged.claimed_keys.contains(&claim) {
                            staged.claimed_keys.push(claim);
                        }
                    }

                    staged.indexes.push(IndexWrite::Put {
                        index: name.clone(),
                        key: delta.key.clone(),
                        value,
                    });
                }
                KeyOperation::Remove => {
                    if view.unique {
                        let entries = view.entries(store, name, &delta.key)?;
                        match delta.value {
                            Some(value) => entries.retain(|rid| *rid != value),
                            None => entries.clear(),
                        }
                    }
                    staged.indexes.push(IndexWrite::Remove {
                        index: name.clone(),
                        key: delta.key.clone(),
                        value: delta.value,
                    });
                }
                KeyOperation::Clear => {
                    view.cleared = true;
                    view.keys.clear();
                    staged.indexes.push(IndexWrite::Clear {
                        index: name.clone(),
                    });
                }
            }
        }
    }

    Ok(staged)
}

impl StagedTransaction {
    /// Temporary identities created by this transaction, in submission order
    pub fn created(&self) -> Vec<Rid> {
        self.records
            .iter()
            .filter(|r| r.kind == OperationKind::Created)
            .map(|r| r.submitted)
            .collect()
    }

    /// Build the store batch and the outcome under the given final identities
    pub fn commit_batch(
        &self,
        assignments: &HashMap<Rid, Rid>,
    ) -> Result<(CommitBatch, CommitOutcome), ErrorReason> {
        let resolve = |rid: Rid| -> Result<Rid, ErrorReason> {
            if rid.is_persistent() {
                return Ok(rid);
            }
            assignments
                .get(&rid)
                .copied()
                .ok_or_else(|| local(format!("No final identity assigned to {}", rid)))
        };

        let mut batch = CommitBatch::new();
        let mut outcome = CommitOutcome::default();

        for planned in &self.records {
            let identity = resolve(planned.submitted)?;
            let write = match planned.kind {
                OperationKind::Created => RecordWrite::Create {
                    identity,
                    version: planned.version,
                    record_format: planned.record_format,
                    content: planned.content.clone().unwrap_or_default(),
                },
                OperationKind::Updated => RecordWrite::Update {
                    identity,
                    expected_version: planned.expected_version,
                    new_version: planned.version,
                    record_format: planned.record_format,
                    content: planned.content.clone(),
                },
                OperationKind::Deleted => RecordWrite::Delete {
                    identity,
                    expected_version: planned.expected_version,
                },
                OperationKind::Loaded => continue,
            };
            batch.records.push(write);
            outcome.records.push(AppliedRecord {
                kind: planned.kind,
                submitted: planned.submitted,
                identity,
                version: planned.version,
            });
        }

        for write in &self.indexes {
            let resolved = match write {
                IndexWrite::Put { index, key, value } => IndexWrite::Put {
                    index: index.clone(),
                    key: key.clone(),
                    value: resolve(*value)?,
                },
                IndexWrite::Remove { index, key, value } => IndexWrite::Remove {
                    index: index.clone(),
                    key: key.clone(),
                    value: value.map(resolve).transpose()?,
                },
                IndexWrite::Clear { index } => IndexWrite::Clear {
                    index: index.clone(),
                },
            };
            batch.indexes.push(resolved);
        }

        Ok((batch, outcome))
    }
}
