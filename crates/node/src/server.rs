//! Message loop binding a `NodeExecutor` to the member network

use crate::error::{NodeError, Result};
use crate::executor::NodeExecutor;
use parking_lot::Mutex;
use std::sync::Arc;
use tessera_network::{Envelope, FROM_HEADER, LOG_ID_HEADER, Message, MockNetwork};
use tessera_protocol::NodeRequest;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

struct Running {
    shutdown_tx: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

/// Receives node requests for one member and answers them
pub struct NodeServer {
    executor: Arc<NodeExecutor>,
    running: Mutex<Option<Running>>,
}

impl NodeServer {
    pub fn new(executor: Arc<NodeExecutor>) -> Self {
        Self {
            executor,
            running: Mutex::new(None),
        }
    }

    pub fn executor(&self) -> &Arc<NodeExecutor> {
        &self.executor
    }

    /// Register the member on the network and start serving requests
    pub fn start(&self, network: &MockNetwork) -> Result<()> {
        let mut running = self.running.lock();
        if running.is_some() {
            return Err(NodeError::AlreadyRunning(self.executor.member().to_string()));
        }

        let requests = network.register_member(self.executor.member().clone());
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let executor = self.executor.clone();
        let task = tokio::spawn(Self::serve(executor, requests, shutdown_rx));

        *running = Some(Running { shutdown_tx, task });
        tracing::info!("[{}] Node server started", self.executor.member());
        Ok(())
    }

    async fn serve(
        executor: Arc<NodeExecutor>,
        mut requests: mpsc::UnboundedReceiver<Envelope>,
        mut shutdown_rx: oneshot::Receiver<()>,
    ) {
        let member = executor.member().clone();
        loop {
            tokio::select! {
                biased;

                _ = &mut shutdown_rx => {
                    tracing::info!("[{}] Shutdown signal received", member);
                    break;
                }

                envelope = requests.recv() => {
                    let Some((message, reply_tx)) = envelope else {
                        tracing::warn!("[{}] Request channel closed", member);
                        break;
                    };

                    let request = match NodeRequest::decode(&message.body) {
                        Ok(request) => request,
                        Err(e) => {
                            // Dropping the reply channel tells the sender
                            tracing::error!(
                                "[{}] Undecodable request from {}: {}",
                                member,
                                message.sender().unwrap_or("unknown"),
                                e
                            );
                            continue;
                        }
                    };

                    let log_id = request.log_id();
                    tracing::debug!("[{}] {} for log {}", member, request.phase(), log_id);

                    let body = match executor.handle(request).encode() {
                        Ok(body) => body,
                        Err(e) => {
                            tracing::error!(
                                "[{}] Cannot encode reply for log {}: {}",
                                member,
                                log_id,
                                e
                            );
                            continue;
                        }
                    };
                    let reply = Message::with_body(body)
                        .with_header(LOG_ID_HEADER, log_id.to_string())
                        .with_header(FROM_HEADER, member.to_string());

                    if reply_tx.send(reply).is_err() {
                        tracing::debug!("[{}] Sender of log {} went away", member, log_id);
                    }
                }
            }
        }
    }

    /// Stop serving; requests sent afterwards fail with a closed channel
    pub async fn stop(&self) {
        let running = self.running.lock().take();
        if let Some(Running { shutdown_tx, task }) = running {
            let _ = shutdown_tx.send(());
            if let Err(e) = task.await {
                tracing::error!("[{}] Node server task failed: {}", self.executor.member(), e);
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.lock().is_some()
    }
}
