//! Per-member handler for the two-phase protocol
//!
//! Phase 1 validates against committed state and stages the transaction
//! under its log id. Phase 2 applies the staged view through the store's
//! compare-and-set batch, or discards it. Resolved log ids are remembered so
//! that duplicated messages are answered consistently and late ones are
//! rejected as stale.

use crate::claims::ClaimTable;
use crate::config::NodeConfig;
use crate::error::Result;
use crate::staging::{self, StagedTransaction};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tessera_common::{ErrorReason, IndexChange, LogId, MemberId, RecordOperation, Rid};
use tessera_protocol::{CommitOutcome, NodeRequest, NodeResponse};
use tessera_store::RecordStore;

#[derive(Debug, Clone)]
enum Resolution {
    Committed(CommitOutcome),
    Aborted,
}

#[derive(Default)]
struct ExecutorState {
    staged: HashMap<LogId, StagedTransaction>,
    claims: ClaimTable,
    resolved: HashMap<LogId, Resolution>,
    /// Resolution order, oldest first, for bounded retention
    resolved_order: VecDeque<LogId>,
}

impl ExecutorState {
    fn resolve(&mut self, log_id: LogId, resolution: Resolution, retention: usize) {
        if self.resolved.insert(log_id, resolution).is_none() {
            self.resolved_order.push_back(log_id);
        }
        while self.resolved_order.len() > retention {
            if let Some(oldest) = self.resolved_order.pop_front() {
                self.resolved.remove(&oldest);
            }
        }
    }

    fn release(&mut self, log_id: LogId) -> Option<StagedTransaction> {
        let staged = self.staged.remove(&log_id)?;
        self.claims
            .release(log_id, &staged.claimed_records, &staged.claimed_keys);
        Some(staged)
    }
}

/// Handles phase-1 and phase-2 messages for one member
pub struct NodeExecutor {
    member: MemberId,
    store: Arc<dyn RecordStore>,
    config: NodeConfig,
    state: Mutex<ExecutorState>,
}

impl NodeExecutor {
    pub fn new(member: MemberId, store: Arc<dyn RecordStore>, config: NodeConfig) -> Self {
        Self {
            member,
            store,
            config,
            state: Mutex::new(ExecutorState::default()),
        }
    }

    pub fn member(&self) -> &MemberId {
        &self.member
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    /// Dispatch a decoded request
    pub fn handle(&self, request: NodeRequest) -> NodeResponse {
        match request {
            NodeRequest::Phase1Tx {
                log_id,
                using_log,
                operations,
                index_changes,
            } => self.handle_phase1(log_id, using_log, &operations, &index_changes),
            NodeRequest::Phase2Commit { log_id, assigned } => {
                self.handle_phase2_commit(log_id, &assigned)
            }
            NodeRequest::Phase2Abort { log_id } => self.handle_phase2_abort(log_id),
        }
    }

    /// Decode, handle and encode one request
    pub fn handle_bytes(&self, bytes: &[u8]) -> Result<Vec<u8>> {
        let request = NodeRequest::decode(bytes)?;
        Ok(self.handle(request).encode()?)
    }

    pub fn handle_phase1(
        &self,
        log_id: LogId,
        using_log: bool,
        operations: &[RecordOperation],
        index_changes: &[IndexChange],
    ) -> NodeResponse {
        let mut state = self.state.lock();

        if state.resolved.contains_key(&log_id) {
            tracing::warn!(
                "[{}] Phase 1 for already resolved log {}",
                self.member,
                log_id
            );
            return NodeResponse::Phase1Error(ErrorReason::StaleTransaction(log_id.as_u64()));
        }
        if state.staged.contains_key(&log_id) {
            tracing::warn!("[{}] Duplicate phase 1 for log {}", self.member, log_id);
            return NodeResponse::Phase1Ok;
        }

        match staging::stage(
            self.store.as_ref(),
            &state.claims,
            log_id,
            using_log,
            operations,
            index_changes,
        ) {
            Ok(staged) => {
                state
                    .claims
                    .claim(log_id, &staged.claimed_records, &staged.claimed_keys);
                state.staged.insert(log_id, staged);
                tracing::debug!(
                    "[{}] Staged log {} ({} operations)",
                    self.member,
                    log_id,
                    operations.len()
                );
                NodeResponse::Phase1Ok
            }
            Err(reason) => {
                tracing::warn!(
                    "[{}] Phase 1 rejected log {}: {}",
                    self.member,
                    log_id,
                    reason
                );
                NodeResponse::Phase1Error(reason)
            }
        }
    }

    /// Apply a staged transaction
    ///
    /// An empty `assigned` makes this member the owner: it allocates final
    /// identities for created records itself.
    pub fn handle_phase2_commit(&self, log_id: LogId, assigned: &[(Rid, Rid)]) -> NodeResponse {
        let mut state = self.state.lock();

        match state.resolved.get(&log_id) {
            Some(Resolution::Committed(outcome)) => {
                tracing::warn!("[{}] Duplicate commit for log {}", self.member, log_id);
                return NodeResponse::Phase2Ack(Some(outcome.clone()));
            }
            Some(Resolution::Aborted) => {
                tracing::warn!(
                    "[{}] Commit for log {} after abort",
                    self.member,
                    log_id
                );
                return NodeResponse::Phase2Error(ErrorReason::StaleTransaction(log_id.as_u64()));
            }
            None => {}
        }

        let Some(staged) = state.staged.get(&log_id) else {
            tracing::warn!("[{}] Commit for unknown log {}", self.member, log_id);
            return NodeResponse::Phase2Error(ErrorReason::LocalFailure(format!(
                "No staged transaction for log {}",
                log_id
            )));
        };

        let assignments: HashMap<Rid, Rid> = if assigned.is_empty() {
            let created = staged.created();
            if created.is_empty() {
                HashMap::new()
            } else {
                match self
                    .store
                    .allocate(self.config.default_cluster, created.len())
                {
                    Ok(finals) => created.into_iter().zip(finals).collect(),
                    Err(e) => {
                        tracing::error!(
                            "[{}] Cannot allocate identities for log {}: {}",
                            self.member,
                            log_id,
                            e
                        );
                        return NodeResponse::Phase2Error(ErrorReason::LocalFailure(e.to_string()));
                    }
                }
            }
        } else {
            assigned.iter().copied().collect()
        };

        let (batch, outcome) = match staged.commit_batch(&assignments) {
            Ok(built) => built,
            Err(reason) => return NodeResponse::Phase2Error(reason),
        };
        let using_log = staged.using_log;

        if let Err(e) = self.store.apply(batch) {
            // Staged view is kept so a retry can try again
            tracing::error!(
                "[{}] Failed to apply log {}: {}",
                self.member,
                log_id,
                e
            );
            return NodeResponse::Phase2Error(ErrorReason::LocalFailure(e.to_string()));
        }

        state.release(log_id);
        let retention = self.config.resolved_retention;
        state.resolve(log_id, Resolution::Committed(outcome.clone()), retention);

        tracing::info!(
            "[{}] Committed log {} ({} records, logged: {})",
            self.member,
            log_id,
            outcome.records.len(),
            using_log
        );
        NodeResponse::Phase2Ack(Some(outcome))
    }

    pub fn handle_phase2_abort(&self, log_id: LogId) -> NodeResponse {
        let mut state = self.state.lock();

        match state.resolved.get(&log_id) {
            Some(Resolution::Committed(_)) => {
                tracing::warn!(
                    "[{}] Abort for log {} after commit",
                    self.member,
                    log_id
                );
                return NodeResponse::Phase2Ack(None);
            }
            Some(Resolution::Aborted) => {
                tracing::debug!("[{}] Duplicate abort for log {}", self.member, log_id);
                return NodeResponse::Phase2Ack(None);
            }
            None => {}
        }

        if state.release(log_id).is_some() {
            tracing::info!("[{}] Aborted log {}", self.member, log_id);
        } else {
            // Remember it so a late phase 1 is rejected
            tracing::debug!("[{}] Abort for unstaged log {}", self.member, log_id);
        }
        let retention = self.config.resolved_retention;
        state.resolve(log_id, Resolution::Aborted, retention);
        NodeResponse::Phase2Ack(None)
    }

    pub fn is_staged(&self, log_id: LogId) -> bool {
        self.state.lock().staged.contains_key(&log_id)
    }

    pub fn staged_count(&self) -> usize {
        self.state.lock().staged.len()
    }

    pub fn is_resolved(&self, log_id: LogId) -> bool {
        self.state.lock().resolved.contains_key(&log_id)
    }
}
