//! Aggregated transaction response returned to the client

use crate::codec::{self, Reader};
use crate::error::{ProtocolError, Result};
use serde::{Deserialize, Serialize};
use tessera_common::{ErrorReason, Rid};

/// Final identity and version assigned to a record created in the transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedRecord {
    pub temporary: Rid,
    pub identity: Rid,
    pub version: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdatedRecord {
    pub identity: Rid,
    pub version: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletedRecord {
    pub identity: Rid,
}

/// Error surfaced to the client for a failed transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionError {
    pub kind: String,
    pub message: String,
}

impl From<&ErrorReason> for TransactionError {
    fn from(reason: &ErrorReason) -> Self {
        Self {
            kind: reason.kind().to_string(),
            message: reason.to_string(),
        }
    }
}

/// Client-visible transaction outcome
///
/// Outcome lists are positionally aligned with the submitted operations of
/// each kind. A failed response never carries outcome entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionResponse {
    success: bool,
    created: Vec<CreatedRecord>,
    updated: Vec<UpdatedRecord>,
    deleted: Vec<DeletedRecord>,
    error: Option<TransactionError>,
}

impl TransactionResponse {
    pub fn committed(
        created: Vec<CreatedRecord>,
        updated: Vec<UpdatedRecord>,
        deleted: Vec<DeletedRecord>,
    ) -> Self {
        Self {
            success: true,
            created,
            updated,
            deleted,
            error: None,
        }
    }

    pub fn failed(reason: &ErrorReason) -> Self {
        Self {
            success: false,
            created: Vec::new(),
            updated: Vec::new(),
            deleted: Vec::new(),
            error: Some(reason.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.success
    }

    pub fn created(&self) -> &[CreatedRecord] {
        &self.created
    }

    pub fn updated(&self) -> &[UpdatedRecord] {
        &self.updated
    }

    pub fn deleted(&self) -> &[DeletedRecord] {
        &self.deleted
    }

    pub fn error(&self) -> Option<&TransactionError> {
        self.error.as_ref()
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        codec::write_bool(&mut out, self.success);

        codec::write_len(&mut out, self.created.len())?;
        for created in &self.created {
            codec::write_rid(&mut out, &created.temporary);
            codec::write_rid(&mut out, &created.identity);
            codec::write_i32(&mut out, created.version);
        }

        codec::write_len(&mut out, self.updated.len())?;
        for updated in &self.updated {
            codec::write_rid(&mut out, &updated.identity);
            codec::write_i32(&mut out, updated.version);
        }

        codec::write_len(&mut out, self.deleted.len())?;
        for deleted in &self.deleted {
            codec::write_rid(&mut out, &deleted.identity);
        }

        if !self.success {
            let (kind, message) = match &self.error {
                Some(error) => (error.kind.as_str(), error.message.as_str()),
                None => ("LocalFailure", ""),
            };
            codec::write_string(&mut out, kind)?;
            codec::write_string(&mut out, message)?;
        }
        Ok(out)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut reader = Reader::new(bytes);
        let success = reader.read_bool("success")?;

        let mut created = Vec::new();
        for _ in 0..reader.read_len("created count")? {
            created.push(CreatedRecord {
                temporary: reader.read_rid("temporary identity")?,
                identity: reader.read_rid("final identity")?,
                version: reader.read_i32("created version")?,
            });
        }

        let mut updated = Vec::new();
        for _ in 0..reader.read_len("updated count")? {
            updated.push(UpdatedRecord {
                identity: reader.read_rid("updated identity")?,
                version: reader.read_i32("updated version")?,
            });
        }

        let mut deleted = Vec::new();
        for _ in 0..reader.read_len("deleted count")? {
            deleted.push(DeletedRecord {
                identity: reader.read_rid("deleted identity")?,
            });
        }

        let error = if success {
            None
        } else {
            if !created.is_empty() || !updated.is_empty() || !deleted.is_empty() {
                return Err(ProtocolError::PartialFailure);
            }
            Some(TransactionError {
                kind: reader.read_string("error kind")?,
                message: reader.read_string("error message")?,
            })
        };
        reader.finish()?;

        Ok(Self {
            success,
            created,
            updated,
            deleted,
            error,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_committed_roundtrip() {
        let response = TransactionResponse::committed(
            vec![CreatedRecord {
                temporary: Rid::temporary(0),
                identity: Rid::new(9, 0),
                version: 1,
            }],
            vec![UpdatedRecord {
                identity: Rid::new(10, 5),
                version: 4,
            }],
            vec![DeletedRecord {
                identity: Rid::new(10, 6),
            }],
        );
        let decoded = TransactionResponse::decode(&response.encode().unwrap()).unwrap();
        assert_eq!(decoded, response);
        assert!(decoded.error().is_none());
    }

    #[test]
    fn test_failed_roundtrip() {
        let reason = ErrorReason::UniqueConstraint {
            index: "Person.name".to_string(),
            key: Some(b"alice".to_vec()),
        };
        let response = TransactionResponse::failed(&reason);
        assert!(!response.is_success());
        assert!(response.created().is_empty());

        let decoded = TransactionResponse::decode(&response.encode().unwrap()).unwrap();
        assert_eq!(decoded, response);
        assert_eq!(decoded.error().unwrap().kind, "UniqueConstraint");
    }

    #[test]
    fn test_partial_failure_rejected() {
        let mut bytes = Vec::new();
        codec::write_bool(&mut bytes, false);
        codec::write_len(&mut bytes, 0).unwrap();
        codec::write_len(&mut bytes, 1).unwrap();
        codec::write_rid(&mut bytes, &Rid::new(1, 1));
        codec::write_i32(&mut bytes, 2);
        codec::write_len(&mut bytes, 0).unwrap();
        codec::write_string(&mut bytes, "LocalFailure").unwrap();
        codec::write_string(&mut bytes, "boom").unwrap();

        assert_eq!(
            TransactionResponse::decode(&bytes),
            Err(ProtocolError::PartialFailure)
        );
    }
}
