use crate::init_sled_log_db;
use crate::LogFactory;
use crate::ReplicatedLog;
use crate::SledLogFactory;
use crate::SledReplicatedLog;

#[tokio::test]
async fn test_sled_log_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();

    {
        let db = init_sled_log_db(dir.path()).unwrap();
        let log = SledReplicatedLog::open(&db, "t-0", 1).unwrap();
        log.append(None, b"one".to_vec()).await.unwrap();
        log.append(None, b"two".to_vec()).await.unwrap();
        db.flush().unwrap();
    }

    let db = init_sled_log_db(dir.path()).unwrap();
    let log = SledReplicatedLog::open(&db, "t-0", 1).unwrap();
    assert_eq!(log.end_offset(), 2);

    let entries = log.read(0, 10).await.unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[1].offset, 1);
    assert_eq!(entries[1].payload, b"two".to_vec());
}

/// # Case 1: Each reopen starts a new term
///
/// ## Validation criteria
/// - the second incarnation has a higher term
/// - appends stamped with the first incarnation's term are rejected
#[tokio::test]
async fn test_sled_log_reopen_bumps_term() {
    let dir = tempfile::tempdir().unwrap();
    let db = init_sled_log_db(dir.path()).unwrap();

    let first = SledReplicatedLog::open(&db, "t-0", 1).unwrap();
    let old_term = first.leadership().term;
    drop(first);

    let second = SledReplicatedLog::open(&db, "t-0", 1).unwrap();
    let state = second.leadership();
    assert!(state.term > old_term);
    assert_eq!(state.leader, Some(1));

    assert!(second.append(Some(old_term), vec![1]).await.is_err());
    assert!(second.append(Some(state.term), vec![1]).await.is_ok());
}

#[tokio::test]
async fn test_sled_factory_returns_same_log() {
    let dir = tempfile::tempdir().unwrap();
    let db = init_sled_log_db(dir.path()).unwrap();
    let factory = SledLogFactory::new(db, 1);

    let a = factory.open("p-0").unwrap();
    a.append(None, vec![1]).await.unwrap();
    let b = factory.open("p-0").unwrap();

    assert_eq!(b.end_offset(), 1);
    assert_eq!(a.leadership().term, b.leadership().term);
}
