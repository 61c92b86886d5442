//! Begin-transaction request sent by a client

use crate::codec::{self, Reader};
use crate::envelope;
use crate::error::Result;
use tessera_common::{IndexChange, RecordOperation};

/// Client request to run one transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BeginTransactionRequest {
    /// Client-local transaction id, used to recognise resubmissions
    pub client_tx_id: i32,
    /// Record the decision in the coordinator's transaction log
    pub using_log: bool,
    pub operations: Vec<RecordOperation>,
    pub index_changes: Vec<IndexChange>,
}

impl BeginTransactionRequest {
    /// Build a request, dropping LOADED operations
    pub fn new(
        client_tx_id: i32,
        using_log: bool,
        operations: impl IntoIterator<Item = RecordOperation>,
        index_changes: Vec<IndexChange>,
    ) -> Self {
        Self {
            client_tx_id,
            using_log,
            operations: operations
                .into_iter()
                .filter(RecordOperation::is_transmitted)
                .collect(),
            index_changes,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        codec::write_i32(&mut out, self.client_tx_id);
        codec::write_bool(&mut out, self.using_log);
        envelope::write_operations(&mut out, &self.operations)?;
        envelope::write_index_changes(&mut out, &self.index_changes)?;
        Ok(out)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut reader = Reader::new(bytes);
        let client_tx_id = reader.read_i32("client transaction id")?;
        let using_log = reader.read_bool("using log")?;
        let operations = envelope::read_operations(&mut reader)?;
        let index_changes = envelope::read_index_changes(&mut reader)?;
        reader.finish()?;
        Ok(Self {
            client_tx_id,
            using_log,
            operations,
            index_changes,
        })
    }
}
