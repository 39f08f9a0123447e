//! Assembles a coordinator node from its configuration.
//!
//! Every component can be replaced before [`NodeBuilder::build`]; whatever is
//! not supplied is created from the configuration, with sled-backed logs
//! under `db_root_dir/<node_id>`.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::info;

use crate::init_sled_log_db;
use crate::metrics;
use crate::ConsumerGroupCoordinator;
use crate::CoordinatorConfig;
use crate::CoordinatorService;
use crate::LogFactory;
use crate::LogicalVersion;
use crate::Node;
use crate::OffsetCommitManager;
use crate::PartitionManager;
use crate::ProducerIdRegistry;
use crate::Result;
use crate::SledLogFactory;
use crate::SystemError;
use crate::TransactionCoordinator;
use crate::VersionCompatibilityLayer;
use crate::PRODUCER_ID_BLOCK_LOG;

pub struct NodeBuilder {
    node_id: u32,
    pub(super) config: CoordinatorConfig,
    pub(super) log_factory: Option<Arc<dyn LogFactory>>,
    pub(super) versions: Option<Arc<VersionCompatibilityLayer>>,
    pub(super) shutdown_signal: watch::Receiver<()>,

    pub(super) node: Option<Arc<Node>>,
}

impl NodeBuilder {
    /// Loads the layered configuration, optionally overridden by the file at `config_path`
    pub fn new(
        config_path: Option<&str>,
        shutdown_signal: watch::Receiver<()>,
    ) -> Result<Self> {
        let mut config = CoordinatorConfig::new()?;
        if let Some(p) = config_path {
            info!("with_override_config from: {}", &p);
            config = config.with_override_config(p)?;
        }
        Ok(Self::init(config.validate()?, shutdown_signal))
    }

    pub fn init(
        config: CoordinatorConfig,
        shutdown_signal: watch::Receiver<()>,
    ) -> Self {
        Self {
            node_id: config.cluster.node_id,
            config,
            log_factory: None,
            versions: None,
            shutdown_signal,
            node: None,
        }
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    pub fn log_factory(
        mut self,
        log_factory: Arc<dyn LogFactory>,
    ) -> Self {
        self.log_factory = Some(log_factory);
        self
    }

    pub fn versions(
        mut self,
        versions: Arc<VersionCompatibilityLayer>,
    ) -> Self {
        self.versions = Some(versions);
        self
    }

    pub fn build(mut self) -> Result<Self> {
        let node_id = self.node_id;
        let config = self.config.clone();

        let log_factory = match self.log_factory.take() {
            Some(f) => f,
            None => {
                let db_root_dir = config.cluster.db_root_dir.join(node_id.to_string());
                let db = init_sled_log_db(&db_root_dir)?;
                Arc::new(SledLogFactory::new(db, node_id))
            }
        };

        let versions = self.versions.take().unwrap_or_else(|| {
            Arc::new(VersionCompatibilityLayer::new(
                node_id,
                LogicalVersion(config.cluster.logical_version),
            ))
        });
        for member in &config.cluster.initial_cluster {
            versions.advertise(member.id, LogicalVersion(member.logical_version));
        }

        let registry = Arc::new(ProducerIdRegistry::new(
            node_id,
            config.transaction.producer_id_block_size,
            log_factory.open(PRODUCER_ID_BLOCK_LOG)?,
            versions.clone(),
            config.retry.log_append,
        ));
        let offsets = Arc::new(OffsetCommitManager::new(
            log_factory.as_ref(),
            config.offsets.num_partitions,
            versions.clone(),
        )?);
        let groups = Arc::new(ConsumerGroupCoordinator::new(
            node_id,
            config.group.session_timeout_ms,
            offsets.clone(),
        ));
        let partitions = Arc::new(PartitionManager::new(log_factory.clone(), versions.clone()));
        let txn = Arc::new(TransactionCoordinator::new(
            &config,
            log_factory.as_ref(),
            versions.clone(),
            registry,
            groups.clone(),
            offsets.clone(),
            partitions.clone(),
        )?);
        let service = CoordinatorService::new(txn.clone(), groups.clone(), offsets.clone(), versions.clone());

        info!(
            node_id,
            active_version = %versions.active_version(),
            "coordinator node built with {} shards",
            config.transaction.num_shards
        );
        self.node = Some(Arc::new(Node {
            node_id,
            config: Arc::new(config),
            txn,
            groups,
            offsets,
            partitions,
            versions,
            log_factory,
            service,
            shutdown_signal: self.shutdown_signal.clone(),
            ready: AtomicBool::new(false),
        }));
        Ok(self)
    }

    /// Starts the metrics server for monitoring node operations.
    ///
    /// Launches a Prometheus endpoint on the configured port.
    pub fn start_metrics_server(
        self,
        shutdown_signal: watch::Receiver<()>,
    ) -> Self {
        if !self.config.monitoring.prometheus_enabled {
            return self;
        }
        let port = self.config.monitoring.prometheus_port;
        tokio::spawn(async move {
            metrics::start_server(port, shutdown_signal).await;
        });
        self
    }

    /// Returns the built node instance after successful construction.
    ///
    /// # Errors
    /// Returns `SystemError::NodeStartFailed` if build hasn't completed
    pub fn ready(self) -> Result<Arc<Node>> {
        self.node
            .ok_or_else(|| SystemError::NodeStartFailed("check node ready failed".to_string()).into())
    }
}
