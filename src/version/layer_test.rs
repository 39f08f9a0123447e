use crate::CoordinatorError;
use crate::Error;
use crate::ErrorCode;
use crate::Feature;
use crate::LogicalVersion;
use crate::MemReplicatedLog;
use crate::ReplicatedLog;
use crate::VersionCompatibilityLayer;
use crate::VersionError;

#[test]
fn test_single_node_runs_at_local_version() {
    let layer = VersionCompatibilityLayer::new(1, LogicalVersion::V6);

    assert_eq!(layer.active_version(), LogicalVersion::V6);
    assert!(layer.is_active(Feature::AbortReasonMetadata));
}

/// # Case 1: Mixed cluster runs at the minimum advertised version
///
/// ## Setup
/// - node 1 runs v6, node 2 advertises v5
///
/// ## Validation criteria
/// - active version is v5 and v6 features are off
/// - once node 2 advertises v6 the features turn on
/// - removing the lagging node also restores v6
#[test]
fn test_active_version_is_cluster_minimum() {
    let layer = VersionCompatibilityLayer::new(1, LogicalVersion::V6);
    layer.advertise(2, LogicalVersion::V5);
    layer.advertise(3, LogicalVersion::V6);

    assert_eq!(layer.active_version(), LogicalVersion::V5);
    assert!(!layer.is_active(Feature::MarkerCoordinatorEpoch));

    layer.advertise(2, LogicalVersion::V6);
    assert_eq!(layer.active_version(), LogicalVersion::V6);
    assert!(layer.is_active(Feature::MarkerCoordinatorEpoch));

    layer.advertise(2, LogicalVersion::V5);
    layer.remove_node(2);
    assert_eq!(layer.active_version(), LogicalVersion::V6);
    assert_eq!(layer.view().members.len(), 2);
}

#[test]
fn test_local_version_cannot_be_overridden_or_removed() {
    let layer = VersionCompatibilityLayer::new(1, LogicalVersion::V5);
    layer.advertise(1, LogicalVersion::V6);
    layer.remove_node(1);

    assert_eq!(layer.active_version(), LogicalVersion::V5);
    assert_eq!(layer.view().members.get(&1), Some(&LogicalVersion::V5));
}

#[test]
fn test_effective_version_respects_client() {
    let layer = VersionCompatibilityLayer::new(1, LogicalVersion::V6);

    assert_eq!(layer.effective_version(None), LogicalVersion::V6);
    assert_eq!(layer.effective_version(Some(LogicalVersion::V5)), LogicalVersion::V5);
    assert_eq!(layer.effective_version(Some(LogicalVersion(9))), LogicalVersion::V6);
}

#[test]
fn test_adapt_error_degrades_for_legacy_peers() {
    let layer = VersionCompatibilityLayer::new(1, LogicalVersion::V6);

    assert_eq!(
        layer.adapt_error(ErrorCode::ProducerFenced, None),
        ErrorCode::ProducerFenced
    );
    assert_eq!(
        layer.adapt_error(ErrorCode::ProducerFenced, Some(LogicalVersion::V5)),
        ErrorCode::InvalidProducerEpoch
    );
    assert_eq!(
        layer.adapt_error(ErrorCode::FencedInstanceId, Some(LogicalVersion::V5)),
        ErrorCode::UnknownMemberId
    );
    assert_eq!(
        layer.adapt_error(ErrorCode::ConcurrentTransactions, Some(LogicalVersion::V5)),
        ErrorCode::ConcurrentTransactions
    );

    layer.advertise(2, LogicalVersion::V5);
    assert_eq!(
        layer.adapt_error(ErrorCode::FencedInstanceId, None),
        ErrorCode::UnknownMemberId
    );
}

#[tokio::test]
async fn test_check_log_readable_refuses_records_newer_than_local_version() {
    let log = MemReplicatedLog::new("__consumer_offsets-0", Some(1));
    log.append(None, LogicalVersion::V5.0.to_be_bytes().to_vec()).await.unwrap();

    let v5 = VersionCompatibilityLayer::new(1, LogicalVersion::V5);
    v5.check_log_readable(&log).await.unwrap();

    log.append(None, LogicalVersion::V6.0.to_be_bytes().to_vec()).await.unwrap();
    let err = v5.check_log_readable(&log).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::UnsupportedVersion);
    assert!(matches!(
        err,
        Error::Coordinator(CoordinatorError::Version(VersionError::DowngradeRefused {
            persisted: 6,
            local: 5,
            ..
        }))
    ));
    let v6 = VersionCompatibilityLayer::new(1, LogicalVersion::V6);
    assert!(v6.check_log_readable(&log).await.is_ok());
}
