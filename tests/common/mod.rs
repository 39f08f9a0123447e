#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use d_txn::BackoffPolicy;
use d_txn::ClusterMember;
use d_txn::CoordinatorConfig;
use d_txn::CoordinatorTransport;
use d_txn::DataRecord;
use d_txn::Error;
use d_txn::GroupConsumer;
use d_txn::LogicalVersion;
use d_txn::MemLogFactory;
use d_txn::Node;
use d_txn::NodeBuilder;
use d_txn::NodeId;
use d_txn::ProduceBatch;
use d_txn::ReplicatedLog;
use d_txn::Result;
use d_txn::RoutingTransport;
use d_txn::TopicPartition;
use d_txn::TransactionalProducer;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::debug;

pub const WAIT_FOR_CONDITION_IN_MS: u64 = 3000;

pub const POLL_INTERVAL_IN_MS: u64 = 10;

/// Client retries short enough to keep failure tests fast
pub fn client_retry() -> BackoffPolicy {
    BackoffPolicy {
        max_retries: 5,
        timeout_ms: 1000,
        base_delay_ms: 1,
        max_delay_ms: 10,
    }
}

pub fn node_config(
    node_id: NodeId,
    version: LogicalVersion,
    peers: &[(NodeId, LogicalVersion)],
) -> CoordinatorConfig {
    let mut config = CoordinatorConfig::default();
    config.cluster.node_id = node_id;
    config.cluster.logical_version = version.0;
    config.cluster.initial_cluster = peers
        .iter()
        .map(|(id, v)| ClusterMember {
            id: *id,
            logical_version: v.0,
        })
        .collect();
    config.transaction.num_shards = 3;
    config.transaction.producer_id_block_size = 5;
    config.transaction.expiration_check_interval_ms = 10;
    config.offsets.num_partitions = 3;
    for policy in [&mut config.retry.marker_write, &mut config.retry.log_append] {
        policy.max_retries = 3;
        policy.base_delay_ms = 1;
        policy.max_delay_ms = 5;
        policy.timeout_ms = 1000;
    }
    config
}

struct RunningNode {
    node: Arc<Node>,
    version: LogicalVersion,
    shutdown_tx: watch::Sender<()>,
    handle: JoinHandle<Result<()>>,
}

/// Coordinator nodes sharing one set of in-memory replicated logs.
///
/// Every log starts in term 1 led by node 1.
pub struct TestCluster {
    pub factory: MemLogFactory,
    nodes: Vec<RunningNode>,
}

impl TestCluster {
    pub async fn start(versions: &[LogicalVersion]) -> Self {
        let factory = MemLogFactory::new(Some(1));
        let mut cluster = Self {
            factory,
            nodes: Vec::new(),
        };
        for (i, version) in versions.iter().enumerate() {
            let running = cluster.spawn_node(i as NodeId + 1, *version, versions);
            cluster.nodes.push(running);
        }
        cluster
    }

    fn peers(versions: &[LogicalVersion]) -> Vec<(NodeId, LogicalVersion)> {
        versions
            .iter()
            .enumerate()
            .map(|(i, v)| (i as NodeId + 1, *v))
            .collect()
    }

    fn spawn_node(
        &self,
        node_id: NodeId,
        version: LogicalVersion,
        versions: &[LogicalVersion],
    ) -> RunningNode {
        let config = node_config(node_id, version, &Self::peers(versions));
        let (shutdown_tx, shutdown_rx) = watch::channel(());
        let node = NodeBuilder::init(config, shutdown_rx)
            .log_factory(Arc::new(self.factory.clone()))
            .build()
            .expect("build node")
            .ready()
            .expect("node ready");
        let runner = node.clone();
        let handle = tokio::spawn(async move { runner.run().await });
        RunningNode {
            node,
            version,
            shutdown_tx,
            handle,
        }
    }

    pub fn node(
        &self,
        node_id: NodeId,
    ) -> &Arc<Node> {
        &self.nodes[node_id as usize - 1].node
    }

    pub fn versions(&self) -> Vec<LogicalVersion> {
        self.nodes.iter().map(|n| n.version).collect()
    }

    /// Routes requests across every node, starting with node 1
    pub fn transport(&self) -> Arc<dyn CoordinatorTransport> {
        Arc::new(RoutingTransport::new(
            self.nodes.iter().map(|n| n.node.service()).collect(),
        ))
    }

    pub fn producer(
        &self,
        transactional_id: &str,
    ) -> TransactionalProducer {
        TransactionalProducer::new(
            transactional_id,
            self.transport(),
            self.node(1).partitions().clone(),
            client_retry(),
        )
    }

    pub fn consumer(
        &self,
        group_id: &str,
    ) -> GroupConsumer {
        GroupConsumer::new(group_id, self.transport(), self.node(1).partitions().clone(), client_retry())
    }

    /// Appends `count` single-record non-transactional batches, keyed `<prefix>-<i>`
    pub async fn seed(
        &self,
        tp: &TopicPartition,
        prefix: &str,
        count: usize,
    ) {
        for i in 0..count {
            let key = format!("{}-{:03}", prefix, i);
            self.node(1)
                .partitions()
                .produce(
                    tp,
                    ProduceBatch {
                        producer_id: 1_000_000,
                        producer_epoch: 0,
                        transactional: false,
                        records: vec![DataRecord::new(key.clone(), key)],
                    },
                )
                .await
                .expect("seed record");
        }
    }

    /// Keys of every committed record of `tp`, read through `node_id`
    pub async fn committed_keys(
        &self,
        node_id: NodeId,
        tp: &TopicPartition,
    ) -> Vec<String> {
        let fetched = self
            .node(node_id)
            .partitions()
            .read_committed(tp, 0, 100_000)
            .await
            .expect("read committed");
        fetched
            .records
            .iter()
            .map(|r| String::from_utf8_lossy(&r.key).into_owned())
            .collect()
    }

    /// Starts a new term of `log` led by `node_id`
    pub fn elect(
        &self,
        log: &str,
        node_id: NodeId,
    ) {
        self.factory.mem_log(log).elect(node_id);
    }

    /// Replaces the process of `node_id` with one running `version`.
    ///
    /// Logs the old process led get a new term led by the new process, and
    /// the other nodes learn the new version.
    pub async fn restart_node(
        &mut self,
        node_id: NodeId,
        version: LogicalVersion,
    ) {
        let idx = node_id as usize - 1;
        let old = &self.nodes[idx];
        old.shutdown_tx.send(()).expect("shutdown old process");

        let mut versions = self.versions();
        versions[idx] = version;
        let running = self.spawn_node(node_id, version, &versions);
        let old = std::mem::replace(&mut self.nodes[idx], running);
        old.handle.await.expect("join old process").expect("old process stopped cleanly");

        for name in self.factory.log_names() {
            let log = self.factory.mem_log(&name);
            if log.leadership().is_leader(node_id) {
                log.elect(node_id);
            }
        }
        for (i, n) in self.nodes.iter().enumerate() {
            if i != idx {
                n.node.advertise_peer(node_id, version);
            }
        }
        debug!("node {} restarted at {}", node_id, version);
    }

    /// Starts an extra process for `node_id` at `version` next to the running
    /// one and returns the error it fails to start with. A process that starts
    /// is stopped again and `None` is returned.
    pub async fn start_error(
        &self,
        node_id: NodeId,
        version: LogicalVersion,
    ) -> Option<Error> {
        let mut versions = self.versions();
        versions[node_id as usize - 1] = version;
        let running = self.spawn_node(node_id, version, &versions);
        let settled = wait_until(|| {
            let finished = running.handle.is_finished();
            let ready = running.node.server_is_ready();
            async move { finished || ready }
        })
        .await;
        assert!(settled, "node {} neither started nor failed", node_id);

        if !running.handle.is_finished() {
            let _ = running.shutdown_tx.send(());
        }
        running.handle.await.expect("join extra process").err()
    }

    pub async fn shutdown(self) {
        for n in &self.nodes {
            let _ = n.shutdown_tx.send(());
        }
        for n in self.nodes {
            n.handle.await.expect("join node").expect("node stopped cleanly");
        }
    }
}

/// Polls `check` until it holds or the wait budget runs out
pub async fn wait_until<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let attempts = WAIT_FOR_CONDITION_IN_MS / POLL_INTERVAL_IN_MS;
    for _ in 0..attempts {
        if check().await {
            return true;
        }
        sleep(Duration::from_millis(POLL_INTERVAL_IN_MS)).await;
    }
    false
}

/// Copies everything `consumer` polls into `sink`, one transaction per poll,
/// committing the consumed offsets with the records. Returns the records copied.
pub async fn copy_batch(
    consumer: &mut GroupConsumer,
    producer: &mut TransactionalProducer,
    sink: &TopicPartition,
    max_entries: usize,
) -> Result<usize> {
    let records = consumer.poll(max_entries).await?;
    if records.is_empty() {
        return Ok(0);
    }
    producer.begin_transaction()?;
    for r in &records {
        producer.send(sink, r.key.clone(), r.value.clone()).await?;
    }
    let group = consumer.group_metadata()?;
    producer
        .send_offsets_to_transaction(consumer.consumed_offsets(), &group)
        .await?;
    producer.commit_transaction().await?;
    Ok(records.len())
}
