use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use super::transport::call;
use crate::test_utils::test_node;
use crate::BackoffPolicy;
use crate::ClientError;
use crate::CoordinatorRequest;
use crate::CoordinatorResponse;
use crate::CoordinatorTransport;
use crate::EndTxnRequest;
use crate::Error;
use crate::ErrorCode;
use crate::InitProducerIdRequest;
use crate::LogicalVersion;
use crate::MemLogFactory;
use crate::MockCoordinatorTransport;
use crate::RoutingTransport;

fn policy() -> BackoffPolicy {
    BackoffPolicy {
        max_retries: 3,
        timeout_ms: 1000,
        base_delay_ms: 1,
        max_delay_ms: 5,
    }
}

fn end_txn() -> CoordinatorRequest {
    CoordinatorRequest::EndTxn(EndTxnRequest {
        transactional_id: "t1".to_string(),
        producer_id: 1,
        producer_epoch: 0,
        commit: true,
        client_version: None,
    })
}

fn init(transactional_id: &str) -> CoordinatorRequest {
    CoordinatorRequest::InitProducerId(InitProducerIdRequest {
        transactional_id: transactional_id.to_string(),
        transaction_timeout_ms: None,
        client_version: None,
    })
}

#[tokio::test]
async fn test_call_returns_successful_response() {
    let mut transport = MockCoordinatorTransport::new();
    transport.expect_send().times(1).returning(|_| CoordinatorResponse::EndTxn {
        error_code: ErrorCode::None,
    });

    let response = call(&transport, end_txn(), policy()).await.unwrap();
    assert_eq!(response.error_code(), ErrorCode::None);
}

#[tokio::test]
async fn test_call_retries_retriable_codes() {
    let attempts = Arc::new(AtomicUsize::new(0));
    let counter = attempts.clone();
    let mut transport = MockCoordinatorTransport::new();
    transport.expect_send().returning(move |_| {
        let error_code = if counter.fetch_add(1, Ordering::SeqCst) < 2 {
            ErrorCode::ConcurrentTransactions
        } else {
            ErrorCode::None
        };
        CoordinatorResponse::EndTxn { error_code }
    });

    call(&transport, end_txn(), policy()).await.unwrap();
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_call_surfaces_fatal_codes_without_retry() {
    let mut transport = MockCoordinatorTransport::new();
    transport.expect_send().times(1).returning(|_| CoordinatorResponse::EndTxn {
        error_code: ErrorCode::ProducerFenced,
    });

    let e = call(&transport, end_txn(), policy()).await.unwrap_err();
    assert!(matches!(
        e,
        Error::Client(ClientError::Rpc {
            operation: "EndTxn",
            code: ErrorCode::ProducerFenced
        })
    ));
    assert!(e.code().is_fencing());
}

#[tokio::test]
async fn test_call_gives_up_after_policy_retries() {
    let mut transport = MockCoordinatorTransport::new();
    transport.expect_send().times(4).returning(|_| CoordinatorResponse::EndTxn {
        error_code: ErrorCode::NotCoordinator,
    });

    let e = call(&transport, end_txn(), policy()).await.unwrap_err();
    assert!(e.is_retriable());
}

/// # Case 1: Routing finds the coordinator owning the request
///
/// ## Setup
/// - every log is led by node 2
///
/// ## Validation criteria
/// - node 1 answers NOT_COORDINATOR and is skipped
#[tokio::test]
async fn test_routing_skips_nodes_that_do_not_own_the_shard() {
    let factory = MemLogFactory::new(Some(2));
    let node1 = test_node(&factory, 1, LogicalVersion::V6);
    let node2 = test_node(&factory, 2, LogicalVersion::V6);

    assert_eq!(
        node1.service().handle(init("t1")).await.error_code(),
        ErrorCode::NotCoordinator
    );

    let routing = RoutingTransport::new(vec![node1.service(), node2.service()]);
    let response = routing.send(init("t1")).await;
    assert_eq!(response.error_code(), ErrorCode::None);
    assert!(node2
        .transaction_coordinator()
        .describe_transaction("t1")
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn test_routing_reports_last_failure_when_no_node_owns_it() {
    let factory = MemLogFactory::new(None);
    let node1 = test_node(&factory, 1, LogicalVersion::V6);

    let routing = RoutingTransport::new(vec![node1.service()]);
    assert_eq!(routing.send(init("t1")).await.error_code(), ErrorCode::NotCoordinator);

    let empty = RoutingTransport::new(vec![]);
    assert_eq!(
        empty.send(init("t1")).await.error_code(),
        ErrorCode::CoordinatorNotAvailable
    );
}
