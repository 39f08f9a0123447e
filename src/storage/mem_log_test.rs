use crate::Error;
use crate::LogError;
use crate::MemLogFactory;
use crate::MemReplicatedLog;
use crate::ReplicatedLog;
use crate::SystemError;

#[tokio::test]
async fn test_append_assigns_sequential_offsets() {
    let log = MemReplicatedLog::new("t-0", Some(1));

    assert_eq!(log.append(None, b"a".to_vec()).await.unwrap(), 0);
    assert_eq!(log.append(None, b"b".to_vec()).await.unwrap(), 1);
    assert_eq!(log.end_offset(), 2);

    let entries = log.read(1, 10).await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].payload, b"b".to_vec());
    assert_eq!(entries[0].term, 1);
}

#[tokio::test]
async fn test_read_past_end_returns_empty() {
    let log = MemReplicatedLog::new("t-0", Some(1));
    log.append(None, vec![1]).await.unwrap();

    assert!(log.read(5, 10).await.unwrap().is_empty());
    assert_eq!(log.read(0, 0).await.unwrap().len(), 0);
}

/// # Case 1: A deposed leader cannot append
///
/// ## Setup
/// - node 1 leads term 1
/// - node 2 is elected (term 2)
///
/// ## Validation criteria
/// - an append stamped with term 1 fails with StaleTerm
/// - an append stamped with term 2 succeeds
#[tokio::test]
async fn test_term_checked_append_rejects_stale_leader() {
    let log = MemReplicatedLog::new("t-0", Some(1));
    let state = log.elect(2);
    assert_eq!(state.term, 2);

    let result = log.append(Some(1), vec![1]).await;
    assert!(matches!(
        result,
        Err(Error::System(SystemError::Log(LogError::StaleTerm {
            expected: 1,
            current: 2,
            ..
        })))
    ));
    assert!(log.append(Some(2), vec![1]).await.is_ok());
}

#[tokio::test]
async fn test_term_checked_append_requires_leader() {
    let log = MemReplicatedLog::new("t-0", Some(1));
    log.step_down();

    let result = log.append(Some(1), vec![1]).await;
    assert!(matches!(
        result,
        Err(Error::System(SystemError::Log(LogError::NotLeader { .. })))
    ));
}

#[tokio::test]
async fn test_quorum_loss_fails_appends_without_writing() {
    let log = MemReplicatedLog::new("t-0", Some(1));
    log.set_quorum_available(false);

    let err = log.append(None, vec![1]).await.unwrap_err();
    assert!(err.is_retriable());
    assert!(log.is_empty());

    log.set_quorum_available(true);
    assert_eq!(log.append(None, vec![1]).await.unwrap(), 0);
}

#[tokio::test]
async fn test_injected_failures_are_consumed() {
    let log = MemReplicatedLog::new("t-0", Some(1));
    log.inject_append_failures(2);

    assert!(log.append(None, vec![1]).await.is_err());
    assert!(log.append(None, vec![1]).await.is_err());
    assert!(log.append(None, vec![1]).await.is_ok());
    assert_eq!(log.len(), 1);
}

#[tokio::test]
async fn test_leadership_changes_are_observable() {
    let log = MemReplicatedLog::new("t-0", Some(1));
    let mut rx = log.subscribe_leadership();

    log.elect(3);
    rx.changed().await.unwrap();
    let state = *rx.borrow();
    assert_eq!(state.leader, Some(3));
    assert!(state.is_leader(3));
    assert!(!state.is_leader(1));
}

#[tokio::test]
async fn test_factory_clones_share_logs() {
    let factory = MemLogFactory::new(Some(1));
    let other = factory.clone();

    let a = crate::LogFactory::open(&factory, "shared").unwrap();
    a.append(None, vec![7]).await.unwrap();

    let b = crate::LogFactory::open(&other, "shared").unwrap();
    assert_eq!(b.end_offset(), 1);
    assert!(factory.get_mem("shared").is_some());
    assert!(factory.get_mem("missing").is_none());
}
