use std::sync::Arc;

use crate::test_utils::keys;
use crate::test_utils::mem_factory;
use crate::test_utils::test_node;
use crate::BackoffPolicy;
use crate::ClientError;
use crate::CoordinatorResponse;
use crate::CoordinatorTransport;
use crate::Error;
use crate::ErrorCode;
use crate::GroupConsumer;
use crate::LogicalVersion;
use crate::MockCoordinatorTransport;
use crate::Node;
use crate::OffsetEntry;
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

fn producer(
    node: &Arc<Node>,
    transactional_id: &str,
) -> TransactionalProducer {
    let transport: Arc<dyn CoordinatorTransport> = Arc::new(node.service());
    TransactionalProducer::new(transactional_id, transport, node.partitions().clone(), retry())
}

async fn visible(
    node: &Node,
    tp: &TopicPartition,
) -> Vec<String> {
    keys(&node.partitions().read_committed(tp, 0, 100).await.unwrap().records)
}

#[tokio::test]
async fn test_lifecycle_misuse_is_rejected() {
    let node = test_node(&mem_factory(), 1, LogicalVersion::V6);
    let mut p = producer(&node, "t1");
    let tp = TopicPartition::new("out", 0);

    assert!(matches!(
        p.begin_transaction(),
        Err(Error::Client(ClientError::NotInitialized))
    ));

    p.init_transactions().await.unwrap();
    assert!(matches!(
        p.send(&tp, "k", "v").await,
        Err(Error::Client(ClientError::NoTransaction))
    ));

    p.begin_transaction().unwrap();
    assert!(matches!(
        p.begin_transaction(),
        Err(Error::Client(ClientError::TransactionInProgress))
    ));
}

#[tokio::test]
async fn test_commit_spans_partitions() {
    let node = test_node(&mem_factory(), 1, LogicalVersion::V6);
    let mut p = producer(&node, "t1");
    let a = TopicPartition::new("out", 0);
    let b = TopicPartition::new("out", 1);

    p.init_transactions().await.unwrap();
    p.begin_transaction().unwrap();
    p.send(&a, "a1", "v").await.unwrap();
    p.send(&a, "a2", "v").await.unwrap();
    p.send(&b, "b1", "v").await.unwrap();
    assert!(visible(&node, &a).await.is_empty());

    p.commit_transaction().await.unwrap();
    assert!(!p.in_transaction());
    assert_eq!(visible(&node, &a).await, vec!["a1", "a2"]);
    assert_eq!(visible(&node, &b).await, vec!["b1"]);

    let md = node
        .transaction_coordinator()
        .describe_transaction("t1")
        .await
        .unwrap()
        .unwrap();
    assert!(md.partitions.is_empty());
}

#[tokio::test]
async fn test_abort_discards_writes() {
    let node = test_node(&mem_factory(), 1, LogicalVersion::V6);
    let mut p = producer(&node, "t1");
    let tp = TopicPartition::new("out", 0);

    p.init_transactions().await.unwrap();
    p.begin_transaction().unwrap();
    p.send(&tp, "gone", "v").await.unwrap();
    p.abort_transaction().await.unwrap();

    p.begin_transaction().unwrap();
    p.send(&tp, "kept", "v").await.unwrap();
    p.commit_transaction().await.unwrap();

    assert_eq!(visible(&node, &tp).await, vec!["kept"]);
}

/// # Case 1: A second instance fences the first
///
/// ## Validation criteria
/// - the zombie's commit fails with a fencing code and drops its session
/// - none of the zombie's writes become visible
#[tokio::test]
async fn test_new_instance_fences_zombie() {
    let node = test_node(&mem_factory(), 1, LogicalVersion::V6);
    let tp = TopicPartition::new("out", 0);

    let mut zombie = producer(&node, "t1");
    zombie.init_transactions().await.unwrap();
    zombie.begin_transaction().unwrap();
    zombie.send(&tp, "zombie", "v").await.unwrap();

    let mut fresh = producer(&node, "t1");
    let session = fresh.init_transactions().await.unwrap();
    assert!(session.producer_epoch > zombie.session().unwrap().producer_epoch);

    let e = zombie.commit_transaction().await.unwrap_err();
    assert_eq!(e.code(), ErrorCode::ProducerFenced);
    assert!(zombie.session().is_none());

    fresh.begin_transaction().unwrap();
    fresh.send(&tp, "fresh", "v").await.unwrap();
    fresh.commit_transaction().await.unwrap();
    assert_eq!(visible(&node, &tp).await, vec!["fresh"]);
}

#[tokio::test]
async fn test_offsets_commit_with_transaction() {
    let node = test_node(&mem_factory(), 1, LogicalVersion::V6);
    let transport: Arc<dyn CoordinatorTransport> = Arc::new(node.service());
    let mut consumer = GroupConsumer::new("g", transport, node.partitions().clone(), retry());
    consumer.assign(vec![TopicPartition::new("in", 0)]);
    let group = consumer.join().await.unwrap();

    let mut p = producer(&node, "t1");
    p.init_transactions().await.unwrap();
    p.begin_transaction().unwrap();
    p.send(&TopicPartition::new("out", 0), "k", "v").await.unwrap();
    p.send_offsets_to_transaction(vec![OffsetEntry::new(TopicPartition::new("in", 0), 5)], &group)
        .await
        .unwrap();
    assert!(consumer.committed().await.unwrap().is_empty());

    p.commit_transaction().await.unwrap();
    let committed = consumer.committed().await.unwrap();
    assert_eq!(committed.get(&TopicPartition::new("in", 0)), Some(&5));
}

#[tokio::test]
async fn test_retriable_end_failure_keeps_transaction_open() {
    let node = test_node(&mem_factory(), 1, LogicalVersion::V6);
    let mut transport = MockCoordinatorTransport::new();
    transport.expect_send().returning(|request| match request {
        crate::CoordinatorRequest::InitProducerId(_) => CoordinatorResponse::InitProducerId {
            error_code: ErrorCode::None,
            producer_id: 7,
            producer_epoch: 0,
        },
        other => other.failed(ErrorCode::NotEnoughReplicas),
    });
    let transport: Arc<dyn CoordinatorTransport> = Arc::new(transport);
    let mut p = TransactionalProducer::new("t1", transport, node.partitions().clone(), retry());

    p.init_transactions().await.unwrap();
    p.begin_transaction().unwrap();
    let e = p.commit_transaction().await.unwrap_err();
    assert!(e.is_retriable());
    assert!(p.in_transaction());
    assert!(p.session().is_some());
}
