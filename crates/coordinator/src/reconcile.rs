//! Identity reconciliation
//!
//! Turns the owning member's commit outcome into the client response. The
//! submitted operations are never rewritten; the response lists are built
//! positionally so a client can zip them with the objects it submitted.

use std::collections::HashSet;
use tessera_common::{OperationKind, RecordOperation, Rid};
use tessera_protocol::{
    CommitOutcome, CreatedRecord, DeletedRecord, TransactionResponse, UpdatedRecord,
};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReconcileError {
    #[error("Outcome has {outcome} records for {submitted} operations")]
    LengthMismatch { submitted: usize, outcome: usize },

    #[error("Outcome record {position} does not match the submitted operation")]
    OutcomeMismatch { position: usize },

    #[error("Temporary identity {0} appears in more than one created operation")]
    DuplicateTemporary(Rid),

    #[error("Final identity {0} assigned more than once")]
    DuplicateFinal(Rid),

    #[error("Final identity {0} is not persisted")]
    TemporaryFinal(Rid),
}

/// Build the client response for a committed transaction
pub fn reconcile(
    operations: &[RecordOperation],
    outcome: &CommitOutcome,
) -> Result<TransactionResponse, ReconcileError> {
    let submitted: Vec<&RecordOperation> =
        operations.iter().filter(|op| op.is_transmitted()).collect();

    if submitted.len() != outcome.records.len() {
        return Err(ReconcileError::LengthMismatch {
            submitted: submitted.len(),
            outcome: outcome.records.len(),
        });
    }

    let mut created = Vec::new();
    let mut updated = Vec::new();
    let mut deleted = Vec::new();

    let mut temporaries = HashSet::new();
    let mut finals = HashSet::new();

    for (position, (op, applied)) in submitted.iter().zip(&outcome.records).enumerate() {
        if op.kind != applied.kind || op.identity != applied.submitted {
            return Err(ReconcileError::OutcomeMismatch { position });
        }
        if applied.identity.is_temporary() {
            return Err(ReconcileError::TemporaryFinal(applied.identity));
        }

        match op.kind {
            OperationKind::Created => {
                if !temporaries.insert(op.identity) {
                    return Err(ReconcileError::DuplicateTemporary(op.identity));
                }
                if !finals.insert(applied.identity) {
                    return Err(ReconcileError::DuplicateFinal(applied.identity));
                }
                created.push(CreatedRecord {
                    temporary: op.identity,
                    identity: applied.identity,
                    version: applied.version,
                });
            }
            OperationKind::Updated => updated.push(UpdatedRecord {
                identity: applied.identity,
                version: applied.version,
            }),
            OperationKind::Deleted => deleted.push(DeletedRecord {
                identity: applied.identity,
            }),
            OperationKind::Loaded => {}
        }
    }

    Ok(TransactionResponse::committed(created, updated, deleted))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_common::RecordPayload;
    use tessera_protocol::AppliedRecord;

    fn create(sequence: i64) -> RecordOperation {
        RecordOperation::created(Rid::temporary(sequence), b'd', RecordPayload::new(vec![]))
    }

    fn applied(kind: OperationKind, submitted: Rid, identity: Rid, version: i32) -> AppliedRecord {
        AppliedRecord {
            kind,
            submitted,
            identity,
            version,
        }
    }

    #[test]
    fn test_lists_follow_submission_order() {
        let ops = vec![
            create(1),
            RecordOperation::updated(Rid::new(10, 5), 4, b'd', RecordPayload::new(vec![])),
            create(0),
            RecordOperation::deleted(Rid::new(10, 6), 2, b'd'),
            RecordOperation::loaded(Rid::new(10, 7), 1, b'd'),
        ];
        let outcome = CommitOutcome {
            records: vec![
                applied(OperationKind::Created, Rid::temporary(1), Rid::new(9, 0), 1),
                applied(OperationKind::Updated, Rid::new(10, 5), Rid::new(10, 5), 5),
                applied(OperationKind::Created, Rid::temporary(0), Rid::new(9, 1), 1),
                applied(OperationKind::Deleted, Rid::new(10, 6), Rid::new(10, 6), 2),
            ],
        };

        let response = reconcile(&ops, &outcome).unwrap();
        assert!(response.is_success());
        assert_eq!(
            response.created(),
            &[
                CreatedRecord {
                    temporary: Rid::temporary(1),
                    identity: Rid::new(9, 0),
                    version: 1
                },
                CreatedRecord {
                    temporary: Rid::temporary(0),
                    identity: Rid::new(9, 1),
                    version: 1
                },
            ]
        );
        assert_eq!(
            response.updated(),
            &[UpdatedRecord {
                identity: Rid::new(10, 5),
                version: 5
            }]
        );
        assert_eq!(
            response.deleted(),
            &[DeletedRecord {
                identity: Rid::new(10, 6)
            }]
        );
    }

    #[test]
    fn test_update_of_created_record_reports_final_identity() {
        let ops = vec![
            create(0),
            RecordOperation::updated(Rid::temporary(0), 1, b'd', RecordPayload::new(vec![])),
        ];
        let outcome = CommitOutcome {
            records: vec![
                applied(OperationKind::Created, Rid::temporary(0), Rid::new(9, 3), 1),
                applied(OperationKind::Updated, Rid::temporary(0), Rid::new(9, 3), 2),
            ],
        };
        let response = reconcile(&ops, &outcome).unwrap();
        assert_eq!(response.updated()[0].identity, Rid::new(9, 3));
    }

    #[test]
    fn test_mapping_must_be_injective() {
        let ops = vec![create(0), create(1)];
        let outcome = CommitOutcome {
            records: vec![
                applied(OperationKind::Created, Rid::temporary(0), Rid::new(9, 0), 1),
                applied(OperationKind::Created, Rid::temporary(1), Rid::new(9, 0), 1),
            ],
        };
        assert_eq!(
            reconcile(&ops, &outcome).unwrap_err(),
            ReconcileError::DuplicateFinal(Rid::new(9, 0))
        );
    }

    #[test]
    fn test_outcome_must_cover_created_operations() {
        let ops = vec![create(0), create(1)];
        let outcome = CommitOutcome {
            records: vec![applied(
                OperationKind::Created,
                Rid::temporary(0),
                Rid::new(9, 0),
                1,
            )],
        };
        assert_eq!(
            reconcile(&ops, &outcome).unwrap_err(),
            ReconcileError::LengthMismatch {
                submitted: 2,
                outcome: 1
            }
        );

        let swapped = CommitOutcome {
            records: vec![
                applied(OperationKind::Created, Rid::temporary(1), Rid::new(9, 0), 1),
                applied(OperationKind::Created, Rid::temporary(0), Rid::new(9, 1), 1),
            ],
        };
        assert_eq!(
            reconcile(&ops, &swapped).unwrap_err(),
            ReconcileError::OutcomeMismatch { position: 0 }
        );
    }

    #[test]
    fn test_final_identity_must_be_persisted() {
        let ops = vec![create(0)];
        let outcome = CommitOutcome {
            records: vec![applied(
                OperationKind::Created,
                Rid::temporary(0),
                Rid::temporary(0),
                1,
            )],
        };
        assert_eq!(
            reconcile(&ops, &outcome).unwrap_err(),
            ReconcileError::TemporaryFinal(Rid::temporary(0))
        );
    }
}
