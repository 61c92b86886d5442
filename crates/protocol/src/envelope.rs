//! Operation envelope codec
//!
//! A transaction is an ordered operation list followed by index changes. The
//! operation list is framed with a one-byte continuation flag before each
//! entry (`1`) and a single `0` after the last one, so operations can be
//! written as they are produced without a length prefix.
//!
//! Operation layout, in order: kind, version, identity, record-format tag and,
//! for CREATED and UPDATED only, the content-changed flag and payload bytes.

use crate::codec::{self, Reader};
use crate::error::{ProtocolError, Result};
use tessera_common::{IndexChange, KeyDelta, KeyOperation, OperationKind, RecordOperation, RecordPayload};

const HAS_NEXT: u8 = 1;
const END_OF_LIST: u8 = 0;

/// Encode a single record operation
pub fn encode_operation(op: &RecordOperation) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    write_operation(&mut out, op)?;
    Ok(out)
}

/// Decode a single record operation, rejecting trailing input
pub fn decode_operation(bytes: &[u8]) -> Result<RecordOperation> {
    let mut reader = Reader::new(bytes);
    let op = read_operation(&mut reader)?;
    reader.finish()?;
    Ok(op)
}

/// Encode a full transaction payload
///
/// LOADED operations are skipped; they never appear on the wire.
pub fn encode_transaction(ops: &[RecordOperation], index_changes: &[IndexChange]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    write_operations(&mut out, ops)?;
    write_index_changes(&mut out, index_changes)?;
    Ok(out)
}

/// Decode a full transaction payload
pub fn decode_transaction(bytes: &[u8]) -> Result<(Vec<RecordOperation>, Vec<IndexChange>)> {
    let mut reader = Reader::new(bytes);
    let ops = read_operations(&mut reader)?;
    let index_changes = read_index_changes(&mut reader)?;
    reader.finish()?;
    Ok((ops, index_changes))
}

pub(crate) fn write_operation(out: &mut Vec<u8>, op: &RecordOperation) -> Result<()> {
    if op.kind == OperationKind::Loaded {
        return Err(ProtocolError::LoadedOperation);
    }
    if op.kind.carries_payload() != op.payload.is_some() {
        return Err(ProtocolError::PayloadMismatch {
            kind: op.kind.as_str(),
            rid: op.identity.to_string(),
        });
    }

    codec::write_u8(out, op.kind.as_byte());
    codec::write_i32(out, op.version);
    codec::write_rid(out, &op.identity);
    codec::write_u8(out, op.record_format);
    if let Some(payload) = &op.payload {
        codec::write_bool(out, payload.content_changed);
        codec::write_bytes(out, &payload.content)?;
    }
    Ok(())
}

pub(crate) fn read_operation(reader: &mut Reader<'_>) -> Result<RecordOperation> {
    let kind_byte = reader.read_u8("operation kind")?;
    let kind = match OperationKind::from_byte(kind_byte) {
        Some(OperationKind::Loaded) => return Err(ProtocolError::LoadedOperation),
        Some(kind) => kind,
        None => return Err(ProtocolError::InvalidOperationKind(kind_byte)),
    };
    let version = reader.read_i32("operation version")?;
    let identity = reader.read_rid("operation identity")?;
    let record_format = reader.read_u8("record format")?;

    let payload = if kind.carries_payload() {
        let content_changed = reader.read_bool("content changed")?;
        let content = reader.read_bytes("record payload")?;
        Some(RecordPayload {
            content_changed,
            content,
        })
    } else {
        None
    };

    Ok(RecordOperation {
        kind,
        identity,
        version,
        record_format,
        payload,
    })
}

/// Write the hasNext-framed operation list
pub(crate) fn write_operations(out: &mut Vec<u8>, ops: &[RecordOperation]) -> Result<()> {
    for op in ops.iter().filter(|op| op.is_transmitted()) {
        codec::write_u8(out, HAS_NEXT);
        write_operation(out, op)?;
    }
    codec::write_u8(out, END_OF_LIST);
    Ok(())
}

pub(crate) fn read_operations(reader: &mut Reader<'_>) -> Result<Vec<RecordOperation>> {
    let mut ops = Vec::new();
    loop {
        match reader.read_u8("operation marker")? {
            HAS_NEXT => ops.push(read_operation(reader)?),
            END_OF_LIST => return Ok(ops),
            other => return Err(ProtocolError::InvalidMarker(other)),
        }
    }
}

pub(crate) fn write_index_changes(out: &mut Vec<u8>, changes: &[IndexChange]) -> Result<()> {
    codec::write_len(out, changes.len())?;
    for change in changes {
        codec::write_string(out, &change.index_name)?;
        codec::write_len(out, change.deltas.len())?;
        for delta in &change.deltas {
            write_key_delta(out, delta)?;
        }
    }
    Ok(())
}

pub(crate) fn read_index_changes(reader: &mut Reader<'_>) -> Result<Vec<IndexChange>> {
    let count = reader.read_len("index change count")?;
    // Counts come from the peer; grow as entries actually decode
    let mut changes = Vec::new();
    for _ in 0..count {
        let index_name = reader.read_string("index name")?;
        let delta_count = reader.read_len("key delta count")?;
        let mut deltas = Vec::new();
        for _ in 0..delta_count {
            deltas.push(read_key_delta(reader)?);
        }
        changes.push(IndexChange { index_name, deltas });
    }
    Ok(changes)
}

fn write_key_delta(out: &mut Vec<u8>, delta: &KeyDelta) -> Result<()> {
    codec::write_nullable_bytes(out, delta.key.as_deref())?;
    codec::write_u8(out, delta.operation.as_byte());
    match &delta.value {
        Some(rid) => {
            codec::write_bool(out, true);
            codec::write_rid(out, rid);
        }
        None => codec::write_bool(out, false),
    }
    Ok(())
}

fn read_key_delta(reader: &mut Reader<'_>) -> Result<KeyDelta> {
    let key = reader.read_nullable_bytes("index key")?;
    let op_byte = reader.read_u8("key operation")?;
    let operation =
        KeyOperation::from_byte(op_byte).ok_or(ProtocolError::InvalidKeyOperation(op_byte))?;
    let value = if reader.read_bool("value present")? {
        Some(reader.read_rid("index value")?)
    } else {
        None
    };
    Ok(KeyDelta {
        key,
        operation,
        value,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_common::Rid;

    fn sample_ops() -> Vec<RecordOperation> {
        vec![
            RecordOperation::created(Rid::temporary(0), b'd', RecordPayload::new(b"alice".to_vec())),
            RecordOperation::updated(
                Rid::new(10, 5),
                3,
                b'd',
                RecordPayload::metadata_only(b"bob".to_vec()),
            ),
            RecordOperation::deleted(Rid::new(10, 6), 7, b'b'),
            RecordOperation::created(Rid::temporary(1), b'd', RecordPayload::new(Vec::new())),
        ]
    }

    fn sample_index_changes() -> Vec<IndexChange> {
        vec![
            IndexChange::new(
                "Person.name",
                vec![
                    KeyDelta::put(b"alice".to_vec(), Rid::temporary(0)),
                    KeyDelta::remove(b"carol".to_vec(), None),
                ],
            ),
            IndexChange::new("Person.age", vec![KeyDelta::clear()]),
        ]
    }

    #[test]
    fn test_operation_roundtrip() {
        for op in sample_ops() {
            let bytes = encode_operation(&op).unwrap();
            assert_eq!(decode_operation(&bytes).unwrap(), op);
        }
    }

    #[test]
    fn test_operation_layout() {
        let op = RecordOperation::deleted(Rid::new(10, 5), 3, b'd');
        let bytes = encode_operation(&op).unwrap();
        assert_eq!(
            bytes,
            vec![2, 0, 0, 0, 3, 0, 0, 0, 10, 0, 0, 0, 0, 0, 0, 0, 5, b'd']
        );
    }

    #[test]
    fn test_transaction_roundtrip_preserves_order() {
        let ops = sample_ops();
        let changes = sample_index_changes();
        let bytes = encode_transaction(&ops, &changes).unwrap();

        let (decoded_ops, decoded_changes) = decode_transaction(&bytes).unwrap();
        assert_eq!(decoded_ops, ops);
        assert_eq!(decoded_changes, changes);
    }

    #[test]
    fn test_empty_transaction() {
        let bytes = encode_transaction(&[], &[]).unwrap();
        // End marker, then zero index changes; no second trailer byte
        assert_eq!(bytes, vec![0, 0, 0, 0, 0]);
        let (ops, changes) = decode_transaction(&bytes).unwrap();
        assert!(ops.is_empty());
        assert!(changes.is_empty());
    }

    #[test]
    fn test_loaded_operations_are_skipped() {
        let mut ops = sample_ops();
        ops.insert(1, RecordOperation::loaded(Rid::new(10, 9), 1, b'd'));

        let bytes = encode_transaction(&ops, &[]).unwrap();
        let (decoded, _) = decode_transaction(&bytes).unwrap();
        assert_eq!(decoded, sample_ops());

        let loaded = RecordOperation::loaded(Rid::new(10, 9), 1, b'd');
        assert_eq!(encode_operation(&loaded), Err(ProtocolError::LoadedOperation));
    }

    #[test]
    fn test_loaded_kind_rejected_on_decode() {
        let mut bytes = encode_operation(&RecordOperation::deleted(Rid::new(1, 1), 1, 0)).unwrap();
        bytes[0] = 0;
        assert_eq!(decode_operation(&bytes), Err(ProtocolError::LoadedOperation));
    }

    #[test]
    fn test_payload_mismatch() {
        let mut op = RecordOperation::deleted(Rid::new(1, 1), 1, 0);
        op.payload = Some(RecordPayload::new(vec![1]));
        assert!(matches!(
            encode_operation(&op),
            Err(ProtocolError::PayloadMismatch { .. })
        ));
    }

    #[test]
    fn test_truncated_transaction_fails() {
        let bytes = encode_transaction(&sample_ops(), &sample_index_changes()).unwrap();
        for len in 0..bytes.len() {
            assert!(
                decode_transaction(&bytes[..len]).is_err(),
                "prefix of length {} decoded",
                len
            );
        }
    }

    #[test]
    fn test_invalid_continuation_marker() {
        let mut bytes = encode_transaction(&sample_ops(), &[]).unwrap();
        bytes[0] = 7;
        assert_eq!(decode_transaction(&bytes), Err(ProtocolError::InvalidMarker(7)));
    }

    #[test]
    fn test_invalid_key_operation() {
        let changes = vec![IndexChange::new("idx", vec![KeyDelta::clear()])];
        let mut bytes = encode_transaction(&[], &changes).unwrap();
        // marker + count + string(3) + delta count + null key length
        let op_offset = 1 + 4 + 4 + 3 + 4 + 4;
        bytes[op_offset] = 9;
        assert_eq!(
            decode_transaction(&bytes),
            Err(ProtocolError::InvalidKeyOperation(9))
        );
    }
}
