//! Distributed transactions across node servers on the in-memory network

use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tessera_common::{
    IndexChange, KeyDelta, LogId, MemberId, RecordOperation, RecordPayload, Rid,
};
use tessera_coordinator::{
    ClientEndpoint, Coordinator, CoordinatorConfig, CoordinatorError, Decision, MemberTransport,
    NetworkTransport,
};
use tessera_network::{MockNetwork, NetworkClient, NetworkError};
use tessera_node::{NodeConfig, NodeExecutor, NodeServer};
use tessera_protocol::{
    BeginTransactionRequest, CreatedRecord, NodeRequest, NodeResponse, OpenRequest,
    TransactionResponse,
};
use tessera_store::{IndexWrite, MemoryStore, RecordStore, StoredRecord};

struct Cluster {
    network: Arc<MockNetwork>,
    stores: Vec<Arc<MemoryStore>>,
    executors: Vec<Arc<NodeExecutor>>,
    servers: Vec<NodeServer>,
    members: Vec<MemberId>,
}

impl Cluster {
    /// Start `versions.len()` members, each holding record #10:5 at the given version
    fn start(versions: &[i32]) -> Self {
        let network = Arc::new(MockNetwork::new());
        let mut cluster = Cluster {
            network: network.clone(),
            stores: Vec::new(),
            executors: Vec::new(),
            servers: Vec::new(),
            members: Vec::new(),
        };

        for (i, version) in versions.iter().enumerate() {
            let member = MemberId::new(format!("node-{}", i + 1));
            let store = Arc::new(MemoryStore::default());
            store.create_index("email", true).unwrap();
            store
                .insert(StoredRecord {
                    identity: Rid::new(10, 5),
                    version: *version,
                    record_format: b'd',
                    content: b"{\"name\":\"a\"}".to_vec(),
                })
                .unwrap();
            store
                .insert(StoredRecord {
                    identity: Rid::new(10, 6),
                    version: 2,
                    record_format: b'd',
                    content: b"{}".to_vec(),
                })
                .unwrap();

            let executor = Arc::new(NodeExecutor::new(
                member.clone(),
                store.clone(),
                NodeConfig::default(),
            ));
            let server = NodeServer::new(executor.clone());
            server.start(&network).unwrap();

            cluster.stores.push(store);
            cluster.executors.push(executor);
            cluster.servers.push(server);
            cluster.members.push(member);
        }

        cluster
    }

    fn coordinator(&self) -> Coordinator {
        Coordinator::over_network(self.network.clone(), test_config())
    }

    async fn stop(&self) {
        for server in &self.servers {
            server.stop().await;
        }
    }
}

fn test_config() -> CoordinatorConfig {
    CoordinatorConfig::default()
        .with_phase1_timeout(Duration::from_millis(200))
        .with_phase2_timeout(Duration::from_millis(200))
        .with_phase2_retry_backoff(Duration::from_millis(10))
}

fn create(sequence: i64) -> RecordOperation {
    RecordOperation::created(
        Rid::temporary(sequence),
        b'd',
        RecordPayload::new(b"{\"name\":\"new\"}".to_vec()),
    )
}

fn update(version: i32) -> RecordOperation {
    RecordOperation::updated(
        Rid::new(10, 5),
        version,
        b'd',
        RecordPayload::new(b"{\"name\":\"b\"}".to_vec()),
    )
}

#[tokio::test]
async fn test_create_commits_on_every_member() {
    let cluster = Cluster::start(&[4, 4]);
    let coordinator = cluster.coordinator();

    let response = coordinator
        .submit(1, false, vec![create(0)], vec![], cluster.members.clone())
        .await
        .unwrap();

    assert!(response.is_success());
    assert_eq!(
        response.created(),
        &[CreatedRecord {
            temporary: Rid::new(-1, 0),
            identity: Rid::new(9, 0),
            version: 1,
        }]
    );
    assert!(response.updated().is_empty());

    coordinator.quiesce().await;
    for store in &cluster.stores {
        let record = store.get(&Rid::new(9, 0)).unwrap().unwrap();
        assert_eq!(record.version, 1);
        assert_eq!(record.content, b"{\"name\":\"new\"}".to_vec());
    }
    assert!(coordinator.durability_risks().is_empty());
    assert_eq!(coordinator.active_count(), 0);

    cluster.stop().await;
}

#[tokio::test]
async fn test_version_conflict_aborts_everywhere() {
    // node-1 would accept version 3, node-2 stores version 4
    let cluster = Cluster::start(&[3, 4]);
    let coordinator = cluster.coordinator();

    let response = coordinator
        .submit(
            1,
            false,
            vec![create(0), update(3)],
            vec![],
            cluster.members.clone(),
        )
        .await
        .unwrap();

    assert!(!response.is_success());
    assert!(response.created().is_empty());
    let error = response.error().unwrap();
    assert_eq!(error.kind, "ConcurrentModification");
    assert!(error.message.contains("#10:5"));

    coordinator.quiesce().await;
    for (store, version) in cluster.stores.iter().zip([3, 4]) {
        assert_eq!(store.version_of(&Rid::new(10, 5)).unwrap(), Some(version));
        assert_eq!(store.len(), 2);
    }
    for executor in &cluster.executors {
        assert_eq!(executor.staged_count(), 0);
    }

    cluster.stop().await;
}

#[tokio::test]
async fn test_unreachable_member_then_retry_succeeds() {
    let cluster = Cluster::start(&[4, 4]);
    let coordinator = cluster.coordinator();
    let partitioned = cluster.members[1].clone();

    cluster.network.partition(&partitioned);
    let first = coordinator
        .submit(5, true, vec![create(0)], vec![], cluster.members.clone())
        .await
        .unwrap();
    assert!(!first.is_success());
    assert_eq!(first.error().unwrap().kind, "MemberUnreachable");

    cluster.network.heal(&partitioned);
    let second = coordinator
        .submit(5, true, vec![create(0)], vec![], cluster.members.clone())
        .await
        .unwrap();
    assert!(second.is_success());
    assert_eq!(second.created().len(), 1);

    let entries = coordinator.transaction_log().entries();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].decision, Decision::Abort);
    assert_eq!(entries[1].decision, Decision::Commit);
    assert!(entries[0].log_id < entries[1].log_id);

    coordinator.quiesce().await;
    for store in &cluster.stores {
        assert_eq!(store.len(), 3);
    }

    cluster.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_update_retry_after_unreachable_member_succeeds() {
    for round in 0..20 {
        let cluster = Cluster::start(&[4, 4]);
        let coordinator = cluster.coordinator();
        let partitioned = cluster.members[1].clone();

        cluster.network.partition(&partitioned);
        let first = coordinator
            .submit(5, false, vec![update(4)], vec![], cluster.members.clone())
            .await
            .unwrap();
        assert_eq!(first.error().unwrap().kind, "MemberUnreachable");

        // The member that voted Ok released its staged view before the reply
        let aborted = coordinator.last_log_id().unwrap();
        assert!(!cluster.executors[0].is_staged(aborted), "round {}", round);
        assert!(cluster.executors[0].is_resolved(aborted));

        cluster.network.heal(&partitioned);
        let second = coordinator
            .submit(5, false, vec![update(4)], vec![], cluster.members.clone())
            .await
            .unwrap();
        assert!(second.is_success(), "round {}: {:?}", round, second.error());
        assert_eq!(second.updated()[0].version, 5);

        coordinator.quiesce().await;
        for store in &cluster.stores {
            assert_eq!(store.version_of(&Rid::new(10, 5)).unwrap(), Some(5));
        }
        cluster.stop().await;
    }
}

#[tokio::test]
async fn test_resubmission_returns_cached_response() {
    let cluster = Cluster::start(&[4, 4]);
    let coordinator = cluster.coordinator();
    let ops = vec![create(0), update(4)];

    let first = coordinator
        .submit(7, true, ops.clone(), vec![], cluster.members.clone())
        .await
        .unwrap();
    let second = coordinator
        .submit(7, true, ops.clone(), vec![], cluster.members.clone())
        .await
        .unwrap();

    assert_eq!(first, second);
    assert_eq!(coordinator.transaction_log().len(), 1);
    assert_eq!(coordinator.last_log_id(), Some(LogId::new(1)));

    coordinator.quiesce().await;
    for store in &cluster.stores {
        assert_eq!(store.len(), 3);
        assert_eq!(store.version_of(&Rid::new(10, 5)).unwrap(), Some(5));
    }

    // Same client id with different operations is a new transaction
    let third = coordinator
        .submit(7, true, vec![update(5)], vec![], cluster.members.clone())
        .await
        .unwrap();
    assert!(third.is_success());
    assert_eq!(coordinator.transaction_log().len(), 2);

    cluster.stop().await;
}

#[tokio::test]
async fn test_concurrent_duplicate_shares_log_id() {
    let cluster = Cluster::start(&[4, 4]);
    let coordinator = cluster.coordinator();

    let (a, b) = tokio::join!(
        coordinator.submit(9, true, vec![create(0)], vec![], cluster.members.clone()),
        coordinator.submit(9, true, vec![create(0)], vec![], cluster.members.clone()),
    );

    assert_eq!(a.unwrap(), b.unwrap());
    assert_eq!(coordinator.transaction_log().len(), 1);
    assert_eq!(coordinator.last_log_id(), Some(LogId::new(1)));

    cluster.stop().await;
}

#[tokio::test]
async fn test_unique_violation_on_one_member_aborts() {
    let cluster = Cluster::start(&[4, 4]);
    cluster.stores[1]
        .apply(tessera_store::CommitBatch {
            records: vec![],
            indexes: vec![IndexWrite::Put {
                index: "email".to_string(),
                key: Some(b"a@b".to_vec()),
                value: Rid::new(10, 5),
            }],
        })
        .unwrap();
    let coordinator = cluster.coordinator();

    let changes = vec![IndexChange::new(
        "email",
        vec![KeyDelta::put(b"a@b".to_vec(), Rid::temporary(0))],
    )];
    let response = coordinator
        .submit(1, false, vec![create(0)], changes, cluster.members.clone())
        .await
        .unwrap();

    assert!(!response.is_success());
    assert_eq!(response.error().unwrap().kind, "UniqueConstraint");

    coordinator.quiesce().await;
    assert!(cluster.stores[0].lookup("email", Some(b"a@b")).unwrap().is_empty());
    assert_eq!(cluster.stores[0].len(), 2);

    cluster.stop().await;
}

#[tokio::test]
async fn test_mixed_operations_report_final_versions() {
    let cluster = Cluster::start(&[4, 4]);
    let coordinator = cluster.coordinator();

    let ops = vec![
        update(4),
        create(0),
        RecordOperation::deleted(Rid::new(10, 6), 2, b'd'),
        create(1),
    ];
    let changes = vec![IndexChange::new(
        "email",
        vec![KeyDelta::put(b"c@d".to_vec(), Rid::temporary(1))],
    )];
    let response = coordinator
        .submit(1, false, ops, changes, cluster.members.clone())
        .await
        .unwrap();

    assert!(response.is_success());
    let created: Vec<_> = response
        .created()
        .iter()
        .map(|c| (c.temporary, c.identity))
        .collect();
    assert_eq!(
        created,
        vec![
            (Rid::temporary(0), Rid::new(9, 0)),
            (Rid::temporary(1), Rid::new(9, 1)),
        ]
    );
    assert_eq!(response.updated()[0].version, 5);
    assert_eq!(response.deleted()[0].identity, Rid::new(10, 6));

    coordinator.quiesce().await;
    for store in &cluster.stores {
        assert!(store.get(&Rid::new(10, 6)).unwrap().is_none());
        assert_eq!(store.lookup("email", Some(b"c@d")).unwrap(), vec![Rid::new(9, 1)]);
    }

    cluster.stop().await;
}

#[tokio::test]
async fn test_protocol_finishes_after_caller_gives_up() {
    let cluster = Cluster::start(&[4, 4]);
    let coordinator = cluster.coordinator();
    cluster
        .network
        .set_delay(&cluster.members[1], Duration::from_millis(50));

    let abandoned = tokio::time::timeout(
        Duration::from_millis(5),
        coordinator.submit(1, false, vec![update(4)], vec![], cluster.members.clone()),
    )
    .await;
    assert!(abandoned.is_err());

    tokio::time::sleep(Duration::from_millis(400)).await;
    coordinator.quiesce().await;
    for store in &cluster.stores {
        assert_eq!(store.version_of(&Rid::new(10, 5)).unwrap(), Some(5));
    }

    cluster.stop().await;
}

#[tokio::test]
async fn test_rejected_input_assigns_no_log_id() {
    let cluster = Cluster::start(&[4]);
    let coordinator = cluster.coordinator();

    let err = coordinator
        .submit(1, false, vec![create(0)], vec![], vec![])
        .await
        .unwrap_err();
    assert_eq!(err, CoordinatorError::EmptyMemberSet);

    let loaded = RecordOperation::loaded(Rid::new(10, 5), 4, b'd');
    let err = coordinator
        .submit(1, false, vec![loaded], vec![], cluster.members.clone())
        .await
        .unwrap_err();
    assert_eq!(err, CoordinatorError::LoadedOperation(Rid::new(10, 5)));

    let twice = vec![cluster.members[0].clone(), cluster.members[0].clone()];
    assert!(matches!(
        coordinator.submit(1, false, vec![], vec![], twice).await,
        Err(CoordinatorError::DuplicateMember(_))
    ));

    assert_eq!(coordinator.last_log_id(), None);
    cluster.stop().await;
}

#[tokio::test]
async fn test_client_endpoint_bytes() {
    let cluster = Cluster::start(&[4, 4]);
    let endpoint = ClientEndpoint::new(cluster.coordinator());

    let request = BeginTransactionRequest::new(3, false, vec![create(0)], vec![])
        .encode()
        .unwrap();
    assert_eq!(
        endpoint
            .begin_transaction(&request, cluster.members.clone())
            .await
            .unwrap_err(),
        CoordinatorError::NoSession
    );

    let session = endpoint
        .open(&OpenRequest::new("library", "admin", "secret").encode().unwrap())
        .unwrap();
    assert_eq!(session.database_name, "library");

    let reply = endpoint
        .begin_transaction(&request, cluster.members.clone())
        .await
        .unwrap();
    let response = TransactionResponse::decode(&reply).unwrap();
    assert!(response.is_success());
    assert_eq!(response.created()[0].identity, Rid::new(9, 0));

    // Truncated request is a protocol error and is never submitted
    let err = endpoint
        .begin_transaction(&request[..request.len() - 1], cluster.members.clone())
        .await
        .unwrap_err();
    assert!(matches!(err, CoordinatorError::Protocol(_)));

    assert!(endpoint.open(&OpenRequest::new("", "admin", "").encode().unwrap()).is_err());
    endpoint.close();
    assert!(endpoint.session().is_none());

    cluster.stop().await;
}

/// Transport that fails phase-2 commits to one member a set number of times
struct FlakyTransport {
    inner: NetworkTransport,
    member: MemberId,
    failures: AtomicU32,
}

#[async_trait]
impl MemberTransport for FlakyTransport {
    async fn send(
        &self,
        member: &MemberId,
        request: &NodeRequest,
        timeout: Duration,
    ) -> tessera_coordinator::Result<NodeResponse> {
        if member == &self.member
            && matches!(request, NodeRequest::Phase2Commit { .. })
            && self
                .failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
        {
            return Err(CoordinatorError::Network(NetworkError::Timeout));
        }
        self.inner.send(member, request, timeout).await
    }
}

fn flaky_coordinator(cluster: &Cluster, member: usize, failures: u32) -> Coordinator {
    let client = NetworkClient::new("flaky-coordinator", cluster.network.clone());
    let transport = FlakyTransport {
        inner: NetworkTransport::new(client),
        member: cluster.members[member].clone(),
        failures: AtomicU32::new(failures),
    };
    Coordinator::new("flaky-coordinator", Arc::new(transport), test_config())
}

#[tokio::test]
async fn test_phase2_retry_recovers() {
    let cluster = Cluster::start(&[4, 4]);
    let coordinator = flaky_coordinator(&cluster, 0, 2);

    let response = coordinator
        .submit(1, false, vec![create(0)], vec![], cluster.members.clone())
        .await
        .unwrap();
    assert!(response.is_success());

    coordinator.quiesce().await;
    assert!(coordinator.durability_risks().is_empty());
    for store in &cluster.stores {
        assert!(store.get(&Rid::new(9, 0)).unwrap().is_some());
    }

    cluster.stop().await;
}

#[tokio::test]
async fn test_owner_exhausting_retries_is_durability_risk() {
    let cluster = Cluster::start(&[4, 4]);
    let coordinator = flaky_coordinator(&cluster, 0, u32::MAX);

    let err = coordinator
        .submit(1, false, vec![create(0)], vec![], cluster.members.clone())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        CoordinatorError::DurabilityRisk { ref member, .. } if member == &cluster.members[0]
    ));

    coordinator.quiesce().await;
    let risks = coordinator.durability_risks();
    assert_eq!(risks.len(), 2);
    assert!(risks.iter().all(|risk| risk.decision == Decision::Commit));
    assert!(cluster.executors[0].is_staged(LogId::new(1)));

    cluster.stop().await;
}

#[tokio::test]
async fn test_replica_exhausting_retries_is_recorded() {
    let cluster = Cluster::start(&[4, 4]);
    let coordinator = flaky_coordinator(&cluster, 1, u32::MAX);

    let response = coordinator
        .submit(1, false, vec![update(4)], vec![], cluster.members.clone())
        .await
        .unwrap();
    assert!(response.is_success());

    coordinator.quiesce().await;
    let risks = coordinator.durability_risks();
    assert_eq!(risks.len(), 1);
    assert_eq!(risks[0].member, cluster.members[1]);
    assert_eq!(risks[0].log_id, LogId::new(1));
    assert_eq!(
        cluster.stores[0].version_of(&Rid::new(10, 5)).unwrap(),
        Some(5)
    );
    assert_eq!(
        cluster.stores[1].version_of(&Rid::new(10, 5)).unwrap(),
        Some(4)
    );

    cluster.stop().await;
}
