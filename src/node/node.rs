//! A running coordinator node.
//!
//! ## Key Responsibilities
//! - Serves coordinator RPCs through its [`CoordinatorService`]
//! - Loads and unloads coordinator shards as leadership of their logs moves
//! - Aborts timed-out transactions and evicts expired group members
//!
//! ## Example Usage
//! ```rust,ignore
//! let node = NodeBuilder::init(config, shutdown_rx).build()?.ready()?;
//! tokio::spawn(async move {
//!     node.run().await.expect("coordinator node execution failed");
//! });
//! ```

use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::info;

use super::expire_members;
use super::expire_transactions;
use super::watch_leadership;
use crate::utils::async_task::spawn_task;
use crate::ConsumerGroupCoordinator;
use crate::CoordinatorConfig;
use crate::CoordinatorService;
use crate::LogFactory;
use crate::LogicalVersion;
use crate::NodeId;
use crate::OffsetCommitManager;
use crate::PartitionManager;
use crate::Result;
use crate::TransactionCoordinator;
use crate::VersionCompatibilityLayer;

pub struct Node {
    pub(crate) node_id: NodeId,
    pub config: Arc<CoordinatorConfig>,
    pub(crate) txn: Arc<TransactionCoordinator>,
    pub(crate) groups: Arc<ConsumerGroupCoordinator>,
    pub(crate) offsets: Arc<OffsetCommitManager>,
    pub(crate) partitions: Arc<PartitionManager>,
    pub(crate) versions: Arc<VersionCompatibilityLayer>,
    pub(crate) log_factory: Arc<dyn LogFactory>,
    pub(crate) service: CoordinatorService,
    pub(crate) shutdown_signal: watch::Receiver<()>,
    pub(crate) ready: AtomicBool,
}

impl Node {
    /// Runs the background tasks until the shutdown signal fires.
    ///
    /// Refuses to start, and never becomes ready, when a log this node leads
    /// holds records written in a newer version than it runs.
    pub async fn run(&self) -> Result<()> {
        self.check_persisted_versions().await?;

        let mut handles = Vec::new();

        let txn = self.txn.clone();
        let shutdown = self.shutdown_signal.clone();
        spawn_task("watch_leadership", move || watch_leadership(txn, shutdown), Some(&mut handles));

        let txn = self.txn.clone();
        let interval_ms = self.config.transaction.expiration_check_interval_ms;
        let shutdown = self.shutdown_signal.clone();
        spawn_task(
            "expire_transactions",
            move || expire_transactions(txn, interval_ms, shutdown),
            Some(&mut handles),
        );

        let groups = self.groups.clone();
        let interval_ms = self.config.group.member_expiry_interval_ms;
        let shutdown = self.shutdown_signal.clone();
        spawn_task(
            "expire_members",
            move || expire_members(groups, interval_ms, shutdown),
            Some(&mut handles),
        );

        self.set_ready(true);
        info!(node_id = self.node_id, "coordinator node is running");

        for handle in handles {
            handle.await?;
        }
        self.set_ready(false);
        info!(node_id = self.node_id, "coordinator node stopped");
        Ok(())
    }

    async fn check_persisted_versions(&self) -> Result<()> {
        for name in self.log_factory.log_names()? {
            let log = self.log_factory.open(&name)?;
            if log.leadership().is_leader(self.node_id) {
                self.versions.check_log_readable(log.as_ref()).await?;
            }
        }
        Ok(())
    }

    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    pub fn service(&self) -> CoordinatorService {
        self.service.clone()
    }

    pub fn transaction_coordinator(&self) -> &Arc<TransactionCoordinator> {
        &self.txn
    }

    pub fn group_coordinator(&self) -> &Arc<ConsumerGroupCoordinator> {
        &self.groups
    }

    pub fn offsets(&self) -> &Arc<OffsetCommitManager> {
        &self.offsets
    }

    pub fn partitions(&self) -> &Arc<PartitionManager> {
        &self.partitions
    }

    pub fn versions(&self) -> &Arc<VersionCompatibilityLayer> {
        &self.versions
    }

    /// Records the logical version a peer advertises
    pub fn advertise_peer(
        &self,
        node_id: NodeId,
        version: LogicalVersion,
    ) {
        self.versions.advertise(node_id, version);
    }

    /// Forgets a peer that left the cluster
    pub fn remove_peer(
        &self,
        node_id: NodeId,
    ) {
        self.versions.remove_node(node_id);
    }

    pub fn set_ready(
        &self,
        is_ready: bool,
    ) {
        self.ready.store(is_ready, Ordering::SeqCst);
    }

    pub fn server_is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }
}
