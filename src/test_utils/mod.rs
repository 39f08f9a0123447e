//! Shared fixtures for unit tests
use std::sync::Arc;

use crate::CoordinatorConfig;
use crate::DataRecord;
use crate::LogicalVersion;
use crate::MemLogFactory;
use crate::Node;
use crate::NodeBuilder;
use crate::NodeId;
use crate::ProduceBatch;
use crate::ProducerEpoch;
use crate::ProducerId;
use crate::VersionCompatibilityLayer;

static LOGGER_INIT: once_cell::sync::Lazy<()> = once_cell::sync::Lazy::new(|| {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
});

pub fn enable_logger() {
    *LOGGER_INIT;
    println!("setup logger for unit test.");
}

pub fn versions(
    node_id: NodeId,
    version: LogicalVersion,
) -> Arc<VersionCompatibilityLayer> {
    Arc::new(VersionCompatibilityLayer::new(node_id, version))
}

/// Logs led by node 1
pub fn mem_factory() -> MemLogFactory {
    MemLogFactory::new(Some(1))
}

/// Defaults with retry delays short enough for unit tests
pub fn test_config(node_id: NodeId) -> CoordinatorConfig {
    let mut config = CoordinatorConfig::default();
    config.cluster.node_id = node_id;
    config.transaction.num_shards = 2;
    config.transaction.producer_id_block_size = 10;
    config.offsets.num_partitions = 2;
    for policy in [
        &mut config.retry.marker_write,
        &mut config.retry.log_append,
        &mut config.retry.client_request,
    ] {
        policy.max_retries = 3;
        policy.base_delay_ms = 1;
        policy.max_delay_ms = 5;
        policy.timeout_ms = 1000;
    }
    config
}

/// Node over `factory` whose shutdown sender is already dropped; use it for
/// direct calls, not for `run`
pub fn test_node(
    factory: &MemLogFactory,
    node_id: NodeId,
    version: LogicalVersion,
) -> Arc<Node> {
    let mut config = test_config(node_id);
    config.cluster.logical_version = version.0;
    let (_, shutdown_rx) = tokio::sync::watch::channel(());
    NodeBuilder::init(config, shutdown_rx)
        .log_factory(Arc::new(factory.clone()))
        .build()
        .and_then(|b| b.ready())
        .expect("node builds over in-memory logs")
}

pub fn batch(
    producer_id: ProducerId,
    producer_epoch: ProducerEpoch,
    transactional: bool,
    keys: &[&str],
) -> ProduceBatch {
    ProduceBatch {
        producer_id,
        producer_epoch,
        transactional,
        records: keys.iter().map(|k| DataRecord::new(k.as_bytes(), k.as_bytes())).collect(),
    }
}

pub fn keys(records: &[crate::ConsumedRecord]) -> Vec<String> {
    records
        .iter()
        .map(|r| String::from_utf8_lossy(&r.key).into_owned())
        .collect()
}
