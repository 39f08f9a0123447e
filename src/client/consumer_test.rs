use std::sync::Arc;

use crate::test_utils::batch;
use crate::test_utils::keys;
use crate::test_utils::mem_factory;
use crate::test_utils::test_node;
use crate::BackoffPolicy;
use crate::ClientError;
use crate::CoordinatorTransport;
use crate::Error;
use crate::ErrorCode;
use crate::GroupConsumer;
use crate::LogicalVersion;
use crate::Node;
use crate::TopicPartition;
use crate::TransactionalProducer;

fn retry() -> BackoffPolicy {
    BackoffPolicy {
        max_retries: 3,
        timeout_ms: 1000,
        base_delay_ms: 1,
        max_delay_ms: 5,
    }
}

fn consumer(
    node: &Arc<Node>,
    group_id: &str,
) -> GroupConsumer {
    let transport: Arc<dyn CoordinatorTransport> = Arc::new(node.service());
    GroupConsumer::new(group_id, transport, node.partitions().clone(), retry())
}

#[tokio::test]
async fn test_poll_reads_only_committed_records() {
    let node = test_node(&mem_factory(), 1, LogicalVersion::V6);
    let tp = TopicPartition::new("in", 0);
    node.partitions()
        .produce(&tp, batch(100, 0, false, &["plain"]))
        .await
        .unwrap();

    let transport: Arc<dyn CoordinatorTransport> = Arc::new(node.service());
    let mut p = TransactionalProducer::new("t1", transport, node.partitions().clone(), retry());
    p.init_transactions().await.unwrap();
    p.begin_transaction().unwrap();
    p.send(&tp, "pending", "v").await.unwrap();

    let mut c = consumer(&node, "g");
    c.assign(vec![tp.clone()]);
    c.join().await.unwrap();
    assert_eq!(keys(&c.poll(100).await.unwrap()), vec!["plain"]);
    assert_eq!(c.position(&tp), Some(1));

    p.commit_transaction().await.unwrap();
    assert_eq!(keys(&c.poll(100).await.unwrap()), vec!["pending"]);
    assert!(c.poll(100).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_join_resets_positions_to_committed_offsets() {
    let node = test_node(&mem_factory(), 1, LogicalVersion::V6);
    let tp = TopicPartition::new("in", 0);
    node.partitions()
        .produce(&tp, batch(100, 0, false, &["a", "b"]))
        .await
        .unwrap();
    node.partitions()
        .produce(&tp, batch(100, 0, false, &["c"]))
        .await
        .unwrap();

    let mut first = consumer(&node, "g");
    first.assign(vec![tp.clone()]);
    let group = first.join().await.unwrap();
    assert_eq!(first.position(&tp), Some(0));

    node.offsets()
        .commit_offsets(&group.group_id, vec![crate::OffsetEntry::new(tp.clone(), 1)])
        .await
        .unwrap();

    let mut second = consumer(&node, "g");
    second.assign(vec![tp.clone()]);
    second.join().await.unwrap();
    assert_eq!(second.position(&tp), Some(1));
    assert_eq!(keys(&second.poll(10).await.unwrap()), vec!["c"]);

    second.seek(&tp, 0);
    assert_eq!(second.consumed_offsets()[0].offset, 0);
}

#[tokio::test]
async fn test_membership_lifecycle() {
    let node = test_node(&mem_factory(), 1, LogicalVersion::V6);
    let mut a = consumer(&node, "g");
    let mut b = consumer(&node, "g");

    assert!(matches!(
        a.heartbeat().await,
        Err(Error::Client(ClientError::NotSubscribed))
    ));

    let joined = a.join().await.unwrap();
    b.join().await.unwrap();

    let e = a.heartbeat().await.unwrap_err();
    assert_eq!(e.code(), ErrorCode::IllegalGeneration);
    let refreshed = a.refresh_generation().await.unwrap();
    assert!(refreshed.generation_id > joined.generation_id);
    assert_eq!(refreshed.member_id, joined.member_id);
    a.heartbeat().await.unwrap();

    a.leave().await.unwrap();
    assert!(a.group_metadata().is_err());
}

/// # Case 1: Re-claiming a static instance fences its previous holder
#[tokio::test]
async fn test_static_instance_reclaim_fences_previous_holder() {
    let node = test_node(&mem_factory(), 1, LogicalVersion::V6);
    let mut old = consumer(&node, "g").group_instance_id("worker-1");
    let mut new = consumer(&node, "g").group_instance_id("worker-1");

    let before = old.join().await.unwrap();
    let after = new.join().await.unwrap();
    assert_eq!(before.generation_id, after.generation_id);
    assert_eq!(after.group_instance_id.as_deref(), Some("worker-1"));

    let e = old.heartbeat().await.unwrap_err();
    assert_eq!(e.code(), ErrorCode::FencedInstanceId);
    new.heartbeat().await.unwrap();

    let mut legacy = consumer(&node, "g")
        .group_instance_id("worker-1")
        .client_version(LogicalVersion::V5);
    legacy.join().await.unwrap();
    let e = new.heartbeat().await.unwrap_err();
    assert_eq!(e.code(), ErrorCode::FencedInstanceId);
}
