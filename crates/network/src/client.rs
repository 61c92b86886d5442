//! Client handle used by the coordinator to reach members

use crate::message::FROM_HEADER;
use crate::{Message, MockNetwork, Result};
use std::sync::Arc;
use std::time::Duration;
use tessera_common::MemberId;

/// Network client bound to one sender identity
#[derive(Clone)]
pub struct NetworkClient {
    /// Sender identity stamped on every request
    node_id: String,

    /// Reference to the network
    network: Arc<MockNetwork>,
}

impl NetworkClient {
    pub fn new(node_id: impl Into<String>, network: Arc<MockNetwork>) -> Self {
        Self {
            node_id: node_id.into(),
            network,
        }
    }

    /// Get the node ID of this client
    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    /// Send a request and wait for a reply
    pub async fn request(
        &self,
        member: &MemberId,
        message: impl Into<Message>,
        timeout: Duration,
    ) -> Result<Message> {
        let message = message.into().with_header(FROM_HEADER, self.node_id.clone());
        self.network.request(member, message, timeout).await
    }

    pub fn network(&self) -> &Arc<MockNetwork> {
        &self.network
    }
}
