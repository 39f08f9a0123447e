use crate::ProducerSession;
use crate::MAX_PRODUCER_EPOCH;

#[test]
fn test_bump_increments_epoch() {
    let mut session = ProducerSession::new("tx", 10);
    session.bump(|| panic!("no rotation expected"));
    session.bump(|| panic!("no rotation expected"));

    assert_eq!(session.producer_id, 10);
    assert_eq!(session.producer_epoch, 2);
}

#[test]
fn test_bump_rotates_before_wire_limit() {
    let mut session = ProducerSession::new("tx", 10);
    session.producer_epoch = MAX_PRODUCER_EPOCH - 2;

    session.bump(|| panic!("no rotation expected"));
    assert_eq!(session.producer_epoch, MAX_PRODUCER_EPOCH - 1);
    assert!(session.epoch_exhausted());

    session.bump(|| 11);
    assert_eq!(session.producer_id, 11);
    assert_eq!(session.producer_epoch, 0);
}
