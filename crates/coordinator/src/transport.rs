//! How the coordinator reaches members

use crate::error::Result;
use async_trait::async_trait;
use std::time::Duration;
use tessera_common::MemberId;
use tessera_network::{LOG_ID_HEADER, Message, NetworkClient};
use tessera_protocol::{NodeRequest, NodeResponse};

/// Send one node request and wait for the member's reply
#[async_trait]
pub trait MemberTransport: Send + Sync {
    async fn send(
        &self,
        member: &MemberId,
        request: &NodeRequest,
        timeout: Duration,
    ) -> Result<NodeResponse>;
}

/// Transport over the in-memory member network
pub struct NetworkTransport {
    client: NetworkClient,
}

impl NetworkTransport {
    pub fn new(client: NetworkClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl MemberTransport for NetworkTransport {
    async fn send(
        &self,
        member: &MemberId,
        request: &NodeRequest,
        timeout: Duration,
    ) -> Result<NodeResponse> {
        let message = Message::with_body(request.encode()?)
            .with_header(LOG_ID_HEADER, request.log_id().to_string());
        let reply = self.client.request(member, message, timeout).await?;
        if let Some(log_id) = reply.log_id()
            && log_id != request.log_id()
        {
            tracing::warn!(
                "Reply from {} for log {} carries log {}",
                member,
                request.log_id(),
                log_id
            );
        }
        Ok(NodeResponse::decode(&reply.body)?)
    }
}
