use std::collections::HashSet;
use std::sync::Arc;

use crate::test_utils::mem_factory;
use crate::test_utils::test_config;
use crate::test_utils::versions;
use crate::LogFactory;
use crate::LogicalVersion;
use crate::MemLogFactory;
use crate::ProducerIdRegistry;
use crate::PRODUCER_ID_BLOCK_LOG;

fn registry(
    factory: &MemLogFactory,
    node_id: u32,
    block_size: i64,
) -> ProducerIdRegistry {
    ProducerIdRegistry::new(
        node_id,
        block_size,
        factory.open(PRODUCER_ID_BLOCK_LOG).unwrap(),
        versions(node_id, LogicalVersion::V6),
        test_config(node_id).retry.log_append,
    )
}

#[tokio::test]
async fn test_ids_are_sequential_within_a_block() {
    let factory = mem_factory();
    let r = registry(&factory, 1, 3);

    let mut out = Vec::new();
    for _ in 0..5 {
        out.push(r.next_producer_id().await.unwrap());
    }

    assert_eq!(out, vec![0, 1, 2, 3, 4]);
    assert_eq!(r.high_water_mark().await.unwrap(), 6);
    assert_eq!(factory.get_mem(PRODUCER_ID_BLOCK_LOG).unwrap().len(), 2);
}

/// # Case 1: Nodes sharing the block log never collide
///
/// ## Setup
/// - two registries on one log allocate concurrently
///
/// ## Validation criteria
/// - all returned ids are distinct
#[tokio::test]
async fn test_concurrent_registries_hand_out_distinct_ids() {
    let factory = mem_factory();
    let a = Arc::new(registry(&factory, 1, 4));
    let b = Arc::new(registry(&factory, 2, 4));

    let mut handles = Vec::new();
    for r in [a, b] {
        handles.push(tokio::spawn(async move {
            let mut ids = Vec::new();
            for _ in 0..25 {
                ids.push(r.next_producer_id().await.unwrap());
            }
            ids
        }));
    }

    let mut all = HashSet::new();
    for h in handles {
        for id in h.await.unwrap() {
            assert!(all.insert(id), "duplicate producer id {id}");
        }
    }
    assert_eq!(all.len(), 50);
}

#[tokio::test]
async fn test_restarted_registry_continues_after_high_water_mark() {
    let factory = mem_factory();
    let first = registry(&factory, 1, 10);
    first.next_producer_id().await.unwrap();

    let restarted = registry(&factory, 1, 10);
    assert_eq!(restarted.next_producer_id().await.unwrap(), 10);
}

#[tokio::test]
async fn test_block_reservation_retries_transient_quorum_loss() {
    let factory = mem_factory();
    let r = registry(&factory, 1, 10);
    factory.mem_log(PRODUCER_ID_BLOCK_LOG).inject_append_failures(2);

    assert_eq!(r.next_producer_id().await.unwrap(), 0);
}
