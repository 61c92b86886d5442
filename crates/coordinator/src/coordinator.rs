//! Core coordinator implementation
//!
//! Every submitted transaction becomes one agreement instance under a fresh
//! log id. Phase 1 fans out to all members and commits only on a unanimous
//! Ok. Phase 2 goes to the owning member first, whose commit outcome carries
//! the final identities; the remaining members receive the same assignment
//! in the background.

use crate::config::CoordinatorConfig;
use crate::error::{CoordinatorError, Result};
use crate::log::{Decision, LogEntry, TransactionLog};
use crate::reconcile;
use crate::transport::{MemberTransport, NetworkTransport};
use futures::future::join_all;
use lru::LruCache;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tessera_common::{ErrorReason, IndexChange, LogId, MemberId, OperationKind, RecordOperation, Rid};
use tessera_network::{MockNetwork, NetworkClient};
use tessera_protocol::{BeginTransactionRequest, CommitOutcome, NodeRequest, NodeResponse, TransactionResponse};
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Per-instance state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Created,
    Phase1Pending,
    CommitDecided,
    AbortDecided,
    Phase2Pending,
    Completed,
}

/// A member whose phase-2 delivery was never confirmed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DurabilityRisk {
    pub log_id: LogId,
    pub member: MemberId,
    pub decision: Decision,
    pub last_error: String,
}

/// Everything that makes two submissions the same client request
#[derive(Debug, Clone, PartialEq, Eq)]
struct Submission {
    client_tx_id: i32,
    using_log: bool,
    operations: Vec<RecordOperation>,
    index_changes: Vec<IndexChange>,
}

struct CompletedSubmission {
    submission: Submission,
    response: TransactionResponse,
}

type SharedOutcome = Option<Result<TransactionResponse>>;

struct InFlightSubmission {
    submission: Submission,
    log_id: LogId,
    outcome: watch::Receiver<SharedOutcome>,
}

enum Admission {
    Cached(TransactionResponse),
    Join(LogId, watch::Receiver<SharedOutcome>),
    Run {
        log_id: LogId,
        outcome: watch::Sender<SharedOutcome>,
        registered: bool,
    },
}

struct CoordinatorInner {
    coordinator_id: String,
    transport: Arc<dyn MemberTransport>,
    config: CoordinatorConfig,

    /// Last assigned log id
    last_log_id: AtomicU64,

    completed: Mutex<LruCache<i32, CompletedSubmission>>,
    in_flight: Mutex<HashMap<i32, InFlightSubmission>>,
    states: Mutex<HashMap<LogId, TransactionState>>,

    /// Phase-2 deliveries still running after the client got its response
    background: Mutex<Vec<JoinHandle<()>>>,

    durability_risks: Mutex<Vec<DurabilityRisk>>,
    log: TransactionLog,
}

/// Distributed transaction coordinator
#[derive(Clone)]
pub struct Coordinator {
    inner: Arc<CoordinatorInner>,
}

impl Coordinator {
    pub fn new(
        coordinator_id: impl Into<String>,
        transport: Arc<dyn MemberTransport>,
        config: CoordinatorConfig,
    ) -> Self {
        let capacity =
            NonZeroUsize::new(config.completed_cache_capacity).unwrap_or(NonZeroUsize::MIN);

        Self {
            inner: Arc::new(CoordinatorInner {
                coordinator_id: coordinator_id.into(),
                transport,
                config,
                last_log_id: AtomicU64::new(0),
                completed: Mutex::new(LruCache::new(capacity)),
                in_flight: Mutex::new(HashMap::new()),
                states: Mutex::new(HashMap::new()),
                background: Mutex::new(Vec::new()),
                durability_risks: Mutex::new(Vec::new()),
                log: TransactionLog::new(),
            }),
        }
    }

    /// Coordinator reaching its members over the in-memory network
    pub fn over_network(network: Arc<MockNetwork>, config: CoordinatorConfig) -> Self {
        let coordinator_id = format!("coordinator-{}", uuid::Uuid::new_v4());
        let client = NetworkClient::new(coordinator_id.clone(), network);
        Self::new(
            coordinator_id,
            Arc::new(NetworkTransport::new(client)),
            config,
        )
    }

    pub fn id(&self) -> &str {
        &self.inner.coordinator_id
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.inner.config
    }

    pub fn transaction_log(&self) -> &TransactionLog {
        &self.inner.log
    }

    /// Run one transaction across `members` and build the client response
    ///
    /// Phase-1 rejections and unreachable members produce a failed response,
    /// not an error. The protocol runs on its own task, so it completes even
    /// if the caller stops waiting.
    pub async fn submit(
        &self,
        client_tx_id: i32,
        using_log: bool,
        operations: Vec<RecordOperation>,
        index_changes: Vec<IndexChange>,
        members: Vec<MemberId>,
    ) -> Result<TransactionResponse> {
        validate_members(&members)?;
        if let Some(op) = operations
            .iter()
            .find(|op| op.kind == OperationKind::Loaded)
        {
            return Err(CoordinatorError::LoadedOperation(op.identity));
        }

        let submission = Submission {
            client_tx_id,
            using_log,
            operations,
            index_changes,
        };

        match self.inner.admit(&submission) {
            Admission::Cached(response) => {
                tracing::info!(
                    "Client tx {} already committed; returning cached response",
                    client_tx_id
                );
                Ok(response)
            }
            Admission::Join(log_id, outcome) => {
                tracing::info!(
                    "Client tx {} already running as log {}; waiting for it",
                    client_tx_id,
                    log_id
                );
                wait_for_outcome(outcome).await
            }
            Admission::Run {
                log_id,
                outcome,
                registered,
            } => {
                let inner = self.inner.clone();
                let task = tokio::spawn(async move {
                    let result = inner.run(log_id, &submission, &members).await;
                    inner.finish(&submission, registered, &result);
                    // Nobody may be listening any more
                    let _ = outcome.send(Some(result.clone()));
                    result
                });
                task.await
                    .map_err(|e| CoordinatorError::TaskFailed(e.to_string()))?
            }
        }
    }

    /// Submit a decoded begin-transaction request
    pub async fn submit_request(
        &self,
        request: BeginTransactionRequest,
        members: Vec<MemberId>,
    ) -> Result<TransactionResponse> {
        self.submit(
            request.client_tx_id,
            request.using_log,
            request.operations,
            request.index_changes,
            members,
        )
        .await
    }

    /// Wait for every background phase-2 delivery to finish
    pub async fn quiesce(&self) {
        loop {
            let handles = std::mem::take(&mut *self.inner.background.lock());
            if handles.is_empty() {
                break;
            }
            for handle in handles {
                if let Err(e) = handle.await {
                    tracing::error!("Phase 2 delivery task failed: {}", e);
                }
            }
        }
    }

    pub fn durability_risks(&self) -> Vec<DurabilityRisk> {
        self.inner.durability_risks.lock().clone()
    }

    /// State of a transaction that has not completed yet
    pub fn state(&self, log_id: LogId) -> Option<TransactionState> {
        self.inner.states.lock().get(&log_id).copied()
    }

    pub fn active_count(&self) -> usize {
        self.inner.states.lock().len()
    }

    /// Highest log id assigned so far
    pub fn last_log_id(&self) -> Option<LogId> {
        match self.inner.last_log_id.load(Ordering::SeqCst) {
            0 => None,
            id => Some(LogId::new(id)),
        }
    }
}

fn validate_members(members: &[MemberId]) -> Result<()> {
    if members.is_empty() {
        return Err(CoordinatorError::EmptyMemberSet);
    }
    let mut seen = HashSet::new();
    for member in members {
        if !seen.insert(member) {
            return Err(CoordinatorError::DuplicateMember(member.clone()));
        }
    }
    Ok(())
}

async fn wait_for_outcome(
    mut outcome: watch::Receiver<SharedOutcome>,
) -> Result<TransactionResponse> {
    let shared = outcome
        .wait_for(|value| value.is_some())
        .await
        .map_err(|_| CoordinatorError::TaskFailed("in-flight transaction vanished".to_string()))?;
    match &*shared {
        Some(result) => result.clone(),
        None => Err(CoordinatorError::TaskFailed(
            "in-flight transaction vanished".to_string(),
        )),
    }
}

/// A member's phase-1 vote; `Err` carries the reason to abort
type Vote = std::result::Result<(), ErrorReason>;

impl CoordinatorInner {
    fn next_log_id(&self) -> LogId {
        LogId::new(self.last_log_id.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// Decide whether a submission reuses an earlier instance or runs anew
    fn admit(&self, submission: &Submission) -> Admission {
        let client_tx_id = submission.client_tx_id;

        // Lock order: in_flight, then completed
        let mut in_flight = self.in_flight.lock();

        if let Some(done) = self.completed.lock().get(&client_tx_id)
            && done.submission == *submission
        {
            return Admission::Cached(done.response.clone());
        }

        if let Some(running) = in_flight.get(&client_tx_id)
            && running.submission == *submission
        {
            return Admission::Join(running.log_id, running.outcome.clone());
        }

        let log_id = self.next_log_id();
        let (tx, rx) = watch::channel(None);
        let registered = !in_flight.contains_key(&client_tx_id);
        if registered {
            in_flight.insert(
                client_tx_id,
                InFlightSubmission {
                    submission: submission.clone(),
                    log_id,
                    outcome: rx,
                },
            );
        }

        Admission::Run {
            log_id,
            outcome: tx,
            registered,
        }
    }

    /// Publish a finished instance for later resubmissions
    fn finish(
        &self,
        submission: &Submission,
        registered: bool,
        result: &Result<TransactionResponse>,
    ) {
        let mut in_flight = self.in_flight.lock();

        // Aborts are not remembered: a retry runs again under a new log id
        if let Ok(response) = result
            && response.is_success()
        {
            self.completed.lock().put(
                submission.client_tx_id,
                CompletedSubmission {
                    submission: submission.clone(),
                    response: response.clone(),
                },
            );
        }

        if registered {
            in_flight.remove(&submission.client_tx_id);
        }
    }

    fn set_state(&self, log_id: LogId, state: TransactionState) {
        tracing::debug!("Log {} -> {:?}", log_id, state);
        let mut states = self.states.lock();
        if state == TransactionState::Completed {
            states.remove(&log_id);
        } else {
            states.insert(log_id, state);
        }
    }

    fn record_risk(&self, log_id: LogId, member: &MemberId, decision: Decision, last_error: String) {
        tracing::error!(
            "Log {}: {:?} not confirmed by {}: {}",
            log_id,
            decision,
            member,
            last_error
        );
        self.durability_risks.lock().push(DurabilityRisk {
            log_id,
            member: member.clone(),
            decision,
            last_error,
        });
    }

    fn record_decision(&self, log_id: LogId, submission: &Submission, decision: Decision, members: &[MemberId]) {
        tracing::info!(
            "Log {} (client tx {}) decided {:?}",
            log_id,
            submission.client_tx_id,
            decision
        );
        if submission.using_log {
            self.log.append(LogEntry {
                log_id,
                client_tx_id: submission.client_tx_id,
                decision,
                members: members.to_vec(),
            });
        }
    }

    async fn run(
        self: &Arc<Self>,
        log_id: LogId,
        submission: &Submission,
        members: &[MemberId],
    ) -> Result<TransactionResponse> {
        self.set_state(log_id, TransactionState::Created);
        tracing::debug!(
            "Log {} for client tx {}: {} operations across {} members",
            log_id,
            submission.client_tx_id,
            submission.operations.len(),
            members.len()
        );

        self.set_state(log_id, TransactionState::Phase1Pending);
        let request = NodeRequest::Phase1Tx {
            log_id,
            using_log: submission.using_log,
            operations: submission.operations.clone(),
            index_changes: submission.index_changes.clone(),
        };
        let votes = join_all(members.iter().map(|member| self.phase1_vote(member, &request))).await;

        // First rejection in member-set order wins
        let rejection = votes.iter().find_map(|vote| vote.as_ref().err().cloned());

        let result = match rejection {
            Some(reason) => {
                self.set_state(log_id, TransactionState::AbortDecided);
                self.record_decision(log_id, submission, Decision::Abort, members);
                self.set_state(log_id, TransactionState::Phase2Pending);
                self.abort(log_id, members, &votes).await;
                Ok(TransactionResponse::failed(&reason))
            }
            None => {
                self.set_state(log_id, TransactionState::CommitDecided);
                self.record_decision(log_id, submission, Decision::Commit, members);
                self.set_state(log_id, TransactionState::Phase2Pending);
                self.commit(log_id, submission, members).await
            }
        };

        self.set_state(log_id, TransactionState::Completed);
        result
    }

    async fn commit(
        self: &Arc<Self>,
        log_id: LogId,
        submission: &Submission,
        members: &[MemberId],
    ) -> Result<TransactionResponse> {
        let (owner, replicas) = match members.split_first() {
            Some(split) => split,
            None => return Err(CoordinatorError::EmptyMemberSet),
        };

        let owner_request = NodeRequest::Phase2Commit {
            log_id,
            assigned: Vec::new(),
        };
        let delivered = match self.deliver_phase2(owner, &owner_request).await {
            Ok(Some(outcome)) => Ok(outcome),
            Ok(None) => Err(format!("owner {} returned no commit outcome", owner)),
            Err(last_error) => Err(last_error),
        };

        let outcome: CommitOutcome = match delivered {
            Ok(outcome) => outcome,
            Err(last_error) => {
                self.record_risk(log_id, owner, Decision::Commit, last_error.clone());
                // Replicas can still apply when there is nothing to assign
                let creates = submission
                    .operations
                    .iter()
                    .any(|op| op.kind == OperationKind::Created);
                for replica in replicas {
                    if creates {
                        self.record_risk(
                            log_id,
                            replica,
                            Decision::Commit,
                            "final identities unknown".to_string(),
                        );
                    } else {
                        self.spawn_phase2(log_id, replica.clone(), owner_request.clone(), Decision::Commit);
                    }
                }
                return Err(CoordinatorError::DurabilityRisk {
                    log_id,
                    member: owner.clone(),
                    last_error,
                });
            }
        };

        let assigned: Vec<(Rid, Rid)> = outcome.assignments();
        for replica in replicas {
            let request = NodeRequest::Phase2Commit {
                log_id,
                assigned: assigned.clone(),
            };
            self.spawn_phase2(log_id, replica.clone(), request, Decision::Commit);
        }

        Ok(reconcile::reconcile(&submission.operations, &outcome)?)
    }

    /// Release the staged views of an aborted transaction
    ///
    /// Members that voted Ok hold claims, so the client is answered only after
    /// they acknowledge (or `phase2_timeout` passes). Members that rejected or
    /// did not answer are reached in the background.
    async fn abort(self: &Arc<Self>, log_id: LogId, members: &[MemberId], votes: &[Vote]) {
        let request = NodeRequest::Phase2Abort { log_id };
        let mut staged = Vec::new();
        for (member, vote) in members.iter().zip(votes) {
            if vote.is_ok() {
                staged.push(member);
            } else {
                self.spawn_phase2(log_id, member.clone(), request.clone(), Decision::Abort);
            }
        }

        let timeout = self.config.phase2_timeout;
        let deliveries = join_all(staged.into_iter().map(|member| {
            let request = &request;
            async move {
                let delivered =
                    tokio::time::timeout(timeout, self.deliver_phase2(member, request)).await;
                (member, delivered)
            }
        }))
        .await;

        for (member, delivered) in deliveries {
            match delivered {
                Ok(Ok(_)) => {}
                Ok(Err(last_error)) => {
                    self.record_risk(log_id, member, Decision::Abort, last_error)
                }
                Err(_) => {
                    tracing::warn!(
                        "Abort of log {} not confirmed by {} in time; retrying in background",
                        log_id,
                        member
                    );
                    self.spawn_phase2(log_id, member.clone(), request.clone(), Decision::Abort);
                }
            }
        }
    }

    async fn phase1_vote(&self, member: &MemberId, request: &NodeRequest) -> Vote {
        let timeout = self.config.phase1_timeout;
        let sent = tokio::time::timeout(timeout, self.transport.send(member, request, timeout)).await;

        match sent {
            Ok(Ok(NodeResponse::Phase1Ok)) => Ok(()),
            Ok(Ok(NodeResponse::Phase1Error(ErrorReason::StaleTransaction(id)))) => {
                tracing::warn!("Member {} reports log {} as already resolved", member, id);
                Err(ErrorReason::LocalFailure(format!(
                    "Member {} already resolved log {}",
                    member, id
                )))
            }
            Ok(Ok(NodeResponse::Phase1Error(reason))) => {
                tracing::warn!(
                    "Member {} rejected log {}: {}",
                    member,
                    request.log_id(),
                    reason
                );
                Err(reason)
            }
            Ok(Ok(other)) => Err(ErrorReason::LocalFailure(format!(
                "Unexpected phase 1 reply from {}: {:?}",
                member, other
            ))),
            Ok(Err(CoordinatorError::Network(e))) => {
                tracing::warn!(
                    "Member {} unreachable for log {}: {}",
                    member,
                    request.log_id(),
                    e
                );
                Err(ErrorReason::MemberUnreachable(member.clone()))
            }
            Ok(Err(e)) => Err(ErrorReason::LocalFailure(e.to_string())),
            Err(_) => {
                tracing::warn!(
                    "Member {} timed out for log {}",
                    member,
                    request.log_id()
                );
                Err(ErrorReason::MemberUnreachable(member.clone()))
            }
        }
    }

    /// Deliver one phase-2 message with bounded retries
    async fn deliver_phase2(
        &self,
        member: &MemberId,
        request: &NodeRequest,
    ) -> std::result::Result<Option<CommitOutcome>, String> {
        let attempts = self.config.phase2_max_attempts.max(1);
        let timeout = self.config.phase2_timeout;
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            let sent =
                tokio::time::timeout(timeout, self.transport.send(member, request, timeout)).await;

            match sent {
                Ok(Ok(NodeResponse::Phase2Ack(outcome))) => return Ok(outcome),
                Ok(Ok(NodeResponse::Phase2Error(ErrorReason::StaleTransaction(id)))) => {
                    tracing::warn!(
                        "Member {} reports log {} already resolved; ignoring",
                        member,
                        id
                    );
                    return Ok(None);
                }
                Ok(Ok(NodeResponse::Phase2Error(reason))) => last_error = reason.to_string(),
                Ok(Ok(other)) => {
                    last_error = format!("unexpected phase 2 reply: {:?}", other);
                }
                Ok(Err(e)) => last_error = e.to_string(),
                Err(_) => last_error = "timed out".to_string(),
            }

            tracing::warn!(
                "Phase 2 {} for log {} to {} failed (attempt {}/{}): {}",
                request.phase(),
                request.log_id(),
                member,
                attempt,
                attempts,
                last_error
            );

            if attempt < attempts {
                tokio::time::sleep(self.config.phase2_retry_backoff * attempt).await;
            }
        }

        Err(last_error)
    }

    /// Deliver a phase-2 message without holding up the client
    fn spawn_phase2(self: &Arc<Self>, log_id: LogId, member: MemberId, request: NodeRequest, decision: Decision) {
        let inner = self.clone();
        let handle = tokio::spawn(async move {
            if let Err(last_error) = inner.deliver_phase2(&member, &request).await {
                inner.record_risk(log_id, &member, decision, last_error);
            }
        });

        let mut background = self.background.lock();
        background.retain(|handle| !handle.is_finished());
        background.push(handle);
    }
}
