//! Coordinator-to-member messages
//!
//! Each message is one variant tag byte followed by the variant body. Both
//! sides dispatch on the tag in exactly one place: `decode`.

use crate::codec::{self, Reader};
use crate::envelope;
use crate::error::{ProtocolError, Result};
use serde::{Deserialize, Serialize};
use tessera_common::{ErrorReason, IndexChange, LogId, MemberId, OperationKind, RecordOperation, Rid};

/// Request sent by the coordinator to one member
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeRequest {
    /// Validate and stage a transaction, then vote
    Phase1Tx {
        log_id: LogId,
        using_log: bool,
        operations: Vec<RecordOperation>,
        index_changes: Vec<IndexChange>,
    },
    /// Apply the staged transaction
    ///
    /// `assigned` carries temporary-to-final identities chosen by the owning
    /// member; it is empty when sent to the owner itself.
    Phase2Commit {
        log_id: LogId,
        assigned: Vec<(Rid, Rid)>,
    },
    /// Discard the staged transaction
    Phase2Abort { log_id: LogId },
}

/// One applied record operation, in submission order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedRecord {
    pub kind: OperationKind,
    /// Identity as submitted, possibly temporary
    pub submitted: Rid,
    /// Persisted identity after commit
    pub identity: Rid,
    /// Record version after this operation
    pub version: i32,
}

/// What a member durably applied for one transaction
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitOutcome {
    pub records: Vec<AppliedRecord>,
}

impl CommitOutcome {
    /// Temporary-to-final identity pairs for the CREATED operations
    pub fn assignments(&self) -> Vec<(Rid, Rid)> {
        self.records
            .iter()
            .filter(|r| r.kind == OperationKind::Created)
            .map(|r| (r.submitted, r.identity))
            .collect()
    }
}

/// Member reply to a `NodeRequest`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeResponse {
    Phase1Ok,
    Phase1Error(ErrorReason),
    /// Phase-2 handled; carries the applied outcome for commits
    Phase2Ack(Option<CommitOutcome>),
    /// Phase-2 could not be applied locally; the coordinator retries
    Phase2Error(ErrorReason),
}

const PHASE1_TX: u8 = 1;
const PHASE2_COMMIT: u8 = 2;
const PHASE2_ABORT: u8 = 3;

const PHASE1_OK: u8 = 1;
const PHASE1_ERROR: u8 = 2;
const PHASE2_ACK: u8 = 3;
const PHASE2_ERROR: u8 = 4;

impl NodeRequest {
    pub fn log_id(&self) -> LogId {
        match self {
            Self::Phase1Tx { log_id, .. }
            | Self::Phase2Commit { log_id, .. }
            | Self::Phase2Abort { log_id } => *log_id,
        }
    }

    /// Short name for logging and message headers
    pub fn phase(&self) -> &'static str {
        match self {
            Self::Phase1Tx { .. } => "phase1",
            Self::Phase2Commit { .. } => "commit",
            Self::Phase2Abort { .. } => "abort",
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        match self {
            Self::Phase1Tx {
                log_id,
                using_log,
                operations,
                index_changes,
            } => {
                codec::write_u8(&mut out, PHASE1_TX);
                codec::write_u64(&mut out, log_id.as_u64());
                codec::write_bool(&mut out, *using_log);
                envelope::write_operations(&mut out, operations)?;
                envelope::write_index_changes(&mut out, index_changes)?;
            }
            Self::Phase2Commit { log_id, assigned } => {
                codec::write_u8(&mut out, PHASE2_COMMIT);
                codec::write_u64(&mut out, log_id.as_u64());
                codec::write_len(&mut out, assigned.len())?;
                for (temporary, identity) in assigned {
                    codec::write_rid(&mut out, temporary);
                    codec::write_rid(&mut out, identity);
                }
            }
            Self::Phase2Abort { log_id } => {
                codec::write_u8(&mut out, PHASE2_ABORT);
                codec::write_u64(&mut out, log_id.as_u64());
            }
        }
        Ok(out)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut reader = Reader::new(bytes);
        let tag = reader.read_u8("node request tag")?;
        let log_id = LogId::new(reader.read_u64("log id")?);
        let request = match tag {
            PHASE1_TX => {
                let using_log = reader.read_bool("using log")?;
                let operations = envelope::read_operations(&mut reader)?;
                let index_changes = envelope::read_index_changes(&mut reader)?;
                Self::Phase1Tx {
                    log_id,
                    using_log,
                    operations,
                    index_changes,
                }
            }
            PHASE2_COMMIT => {
                let mut assigned = Vec::new();
                for _ in 0..reader.read_len("assignment count")? {
                    let temporary = reader.read_rid("temporary identity")?;
                    let identity = reader.read_rid("final identity")?;
                    assigned.push((temporary, identity));
                }
                Self::Phase2Commit { log_id, assigned }
            }
            PHASE2_ABORT => Self::Phase2Abort { log_id },
            tag => {
                return Err(ProtocolError::InvalidTag {
                    what: "node request",
                    tag,
                });
            }
        };
        reader.finish()?;
        Ok(request)
    }
}

impl NodeResponse {
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        match self {
            Self::Phase1Ok => codec::write_u8(&mut out, PHASE1_OK),
            Self::Phase1Error(reason) => {
                codec::write_u8(&mut out, PHASE1_ERROR);
                write_reason(&mut out, reason)?;
            }
            Self::Phase2Ack(outcome) => {
                codec::write_u8(&mut out, PHASE2_ACK);
                match outcome {
                    Some(outcome) => {
                        codec::write_bool(&mut out, true);
                        write_outcome(&mut out, outcome)?;
                    }
                    None => codec::write_bool(&mut out, false),
                }
            }
            Self::Phase2Error(reason) => {
                codec::write_u8(&mut out, PHASE2_ERROR);
                write_reason(&mut out, reason)?;
            }
        }
        Ok(out)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut reader = Reader::new(bytes);
        let response = match reader.read_u8("node response tag")? {
            PHASE1_OK => Self::Phase1Ok,
            PHASE1_ERROR => Self::Phase1Error(read_reason(&mut reader)?),
            PHASE2_ACK => {
                if reader.read_bool("outcome present")? {
                    Self::Phase2Ack(Some(read_outcome(&mut reader)?))
                } else {
                    Self::Phase2Ack(None)
                }
            }
            PHASE2_ERROR => Self::Phase2Error(read_reason(&mut reader)?),
            tag => {
                return Err(ProtocolError::InvalidTag {
                    what: "node response",
                    tag,
                });
            }
        };
        reader.finish()?;
        Ok(response)
    }
}

fn write_outcome(out: &mut Vec<u8>, outcome: &CommitOutcome) -> Result<()> {
    codec::write_len(out, outcome.records.len())?;
    for record in &outcome.records {
        codec::write_u8(out, record.kind.as_byte());
        codec::write_rid(out, &record.submitted);
        codec::write_rid(out, &record.identity);
        codec::write_i32(out, record.version);
    }
    Ok(())
}

fn read_outcome(reader: &mut Reader<'_>) -> Result<CommitOutcome> {
    let mut records = Vec::new();
    for _ in 0..reader.read_len("applied record count")? {
        let kind_byte = reader.read_u8("applied kind")?;
        let kind = match OperationKind::from_byte(kind_byte) {
            Some(OperationKind::Loaded) | None => {
                return Err(ProtocolError::InvalidOperationKind(kind_byte));
            }
            Some(kind) => kind,
        };
        records.push(AppliedRecord {
            kind,
            submitted: reader.read_rid("submitted identity")?,
            identity: reader.read_rid("applied identity")?,
            version: reader.read_i32("applied version")?,
        });
    }
    Ok(CommitOutcome { records })
}

const REASON_CONCURRENT_MODIFICATION: u8 = 1;
const REASON_UNIQUE_CONSTRAINT: u8 = 2;
const REASON_MEMBER_UNREACHABLE: u8 = 3;
const REASON_STALE_TRANSACTION: u8 = 4;
const REASON_LOCAL_FAILURE: u8 = 5;
const REASON_RECORD_CLAIMED: u8 = 6;

fn write_reason(out: &mut Vec<u8>, reason: &ErrorReason) -> Result<()> {
    match reason {
        ErrorReason::ConcurrentModification {
            rid,
            expected,
            actual,
        } => {
            codec::write_u8(out, REASON_CONCURRENT_MODIFICATION);
            codec::write_rid(out, rid);
            codec::write_i32(out, *expected);
            codec::write_i32(out, *actual);
        }
        ErrorReason::RecordClaimed { rid, holder } => {
            codec::write_u8(out, REASON_RECORD_CLAIMED);
            codec::write_rid(out, rid);
            codec::write_u64(out, *holder);
        }
        ErrorReason::UniqueConstraint { index, key } => {
            codec::write_u8(out, REASON_UNIQUE_CONSTRAINT);
            codec::write_string(out, index)?;
            codec::write_nullable_bytes(out, key.as_deref())?;
        }
        ErrorReason::MemberUnreachable(member) => {
            codec::write_u8(out, REASON_MEMBER_UNREACHABLE);
            codec::write_string(out, member.as_str())?;
        }
        ErrorReason::StaleTransaction(log_id) => {
            codec::write_u8(out, REASON_STALE_TRANSACTION);
            codec::write_u64(out, *log_id);
        }
        ErrorReason::LocalFailure(message) => {
            codec::write_u8(out, REASON_LOCAL_FAILURE);
            codec::write_string(out, message)?;
        }
    }
    Ok(())
}

fn read_reason(reader: &mut Reader<'_>) -> Result<ErrorReason> {
    let reason = match reader.read_u8("error reason tag")? {
        REASON_CONCURRENT_MODIFICATION => ErrorReason::ConcurrentModification {
            rid: reader.read_rid("conflicting identity")?,
            expected: reader.read_i32("expected version")?,
            actual: reader.read_i32("stored version")?,
        },
        REASON_RECORD_CLAIMED => ErrorReason::RecordClaimed {
            rid: reader.read_rid("claimed identity")?,
            holder: reader.read_u64("holding log id")?,
        },
        REASON_UNIQUE_CONSTRAINT => ErrorReason::UniqueConstraint {
            index: reader.read_string("index name")?,
            key: reader.read_nullable_bytes("index key")?,
        },
        REASON_MEMBER_UNREACHABLE => {
            ErrorReason::MemberUnreachable(MemberId::new(reader.read_string("member")?))
        }
        REASON_STALE_TRANSACTION => ErrorReason::StaleTransaction(reader.read_u64("log id")?),
        REASON_LOCAL_FAILURE => ErrorReason::LocalFailure(reader.read_string("message")?),
        tag => {
            return Err(ProtocolError::InvalidTag {
                what: "error reason",
                tag,
            });
        }
    };
    Ok(reason)
}
