//! In-memory network connecting the coordinator to members
//!
//! Each member registers a request handler; the network delivers a request
//! to the handler and waits for its reply. Partitions and per-member delays
//! can be injected to exercise timeout paths.

use crate::{Message, NetworkError, Result};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tessera_common::MemberId;
use tokio::sync::{mpsc, oneshot};

/// A request delivered to a member with the channel for its reply
pub type Envelope = (Message, oneshot::Sender<Message>);

/// Type alias for request handler channels
type RequestHandler = mpsc::UnboundedSender<Envelope>;

/// Simulated network between the coordinator and its members
#[derive(Default)]
pub struct MockNetwork {
    /// Request/reply handlers by member
    handlers: Arc<Mutex<HashMap<MemberId, RequestHandler>>>,

    /// Members whose traffic is silently dropped
    partitioned: Arc<Mutex<HashSet<MemberId>>>,

    /// Extra latency added before delivery to a member
    delays: Arc<Mutex<HashMap<MemberId, Duration>>>,
}

impl MockNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a member and return the receiving end of its request channel
    ///
    /// Registering the same member again replaces its previous handler.
    pub fn register_member(&self, member: MemberId) -> mpsc::UnboundedReceiver<Envelope> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.handlers.lock().insert(member, tx);
        rx
    }

    pub fn deregister_member(&self, member: &MemberId) {
        self.handlers.lock().remove(member);
    }

    /// Drop all traffic to a member until `heal` is called
    pub fn partition(&self, member: &MemberId) {
        tracing::info!("Partitioning member {}", member);
        self.partitioned.lock().insert(member.clone());
    }

    pub fn heal(&self, member: &MemberId) {
        tracing::info!("Healing member {}", member);
        self.partitioned.lock().remove(member);
    }

    pub fn is_partitioned(&self, member: &MemberId) -> bool {
        self.partitioned.lock().contains(member)
    }

    /// Delay every request to a member by `delay`
    pub fn set_delay(&self, member: &MemberId, delay: Duration) {
        self.delays.lock().insert(member.clone(), delay);
    }

    pub fn clear_delay(&self, member: &MemberId) {
        self.delays.lock().remove(member);
    }

    /// Send a request to a member and wait for its reply
    pub async fn request(&self, member: &MemberId, message: Message, timeout: Duration) -> Result<Message> {
        let deadline = tokio::time::Instant::now() + timeout;

        if self.is_partitioned(member) {
            // Dropped on the floor: the sender only learns about it by timing out
            tokio::time::sleep_until(deadline).await;
            return Err(NetworkError::Timeout);
        }

        let delay = self.delays.lock().get(member).copied();
        if let Some(delay) = delay {
            if tokio::time::timeout_at(deadline, tokio::time::sleep(delay))
                .await
                .is_err()
            {
                return Err(NetworkError::Timeout);
            }
        }

        let reply_rx = {
            let handlers = self.handlers.lock();
            let handler = handlers
                .get(member)
                .ok_or_else(|| NetworkError::UnknownMember(member.to_string()))?;

            let (reply_tx, reply_rx) = oneshot::channel();
            if handler.send((message, reply_tx)).is_err() {
                return Err(NetworkError::ChannelClosed);
            }
            reply_rx
        };

        match tokio::time::timeout_at(deadline, reply_rx).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(_)) => Err(NetworkError::ChannelClosed),
            Err(_) => Err(NetworkError::Timeout),
        }
    }

    /// Names of all registered members
    pub fn members(&self) -> Vec<MemberId> {
        let mut members: Vec<_> = self.handlers.lock().keys().cloned().collect();
        members.sort();
        members
    }
}
