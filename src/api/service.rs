use std::sync::Arc;

use tracing::debug;

use crate::utils::time::now_ms;
use crate::ConsumerGroupCoordinator;
use crate::CoordinatorRequest;
use crate::CoordinatorResponse;
use crate::ErrorCode;
use crate::LogicalVersion;
use crate::OffsetCommitManager;
use crate::Result;
use crate::TransactionCoordinator;
use crate::VersionCompatibilityLayer;
use crate::RPC_ERRORS_TOTAL;

/// Entry point of every coordinator RPC.
///
/// Errors never escape [`CoordinatorService::handle`]: they become the
/// response's error code, translated through the version layer for the
/// requesting client.
#[derive(Clone)]
pub struct CoordinatorService {
    txn: Arc<TransactionCoordinator>,
    groups: Arc<ConsumerGroupCoordinator>,
    offsets: Arc<OffsetCommitManager>,
    versions: Arc<VersionCompatibilityLayer>,
}

impl CoordinatorService {
    pub fn new(
        txn: Arc<TransactionCoordinator>,
        groups: Arc<ConsumerGroupCoordinator>,
        offsets: Arc<OffsetCommitManager>,
        versions: Arc<VersionCompatibilityLayer>,
    ) -> Self {
        Self {
            txn,
            groups,
            offsets,
            versions,
        }
    }

    pub fn versions(&self) -> &Arc<VersionCompatibilityLayer> {
        &self.versions
    }

    pub async fn handle(
        &self,
        request: CoordinatorRequest,
    ) -> CoordinatorResponse {
        let api = request.api_name();
        let client_version = request.client_version();
        if let Some(v) = client_version.filter(|v| *v < LogicalVersion::MIN_SUPPORTED) {
            debug!("{} from client at {} rejected", api, v);
            return request.failed(self.error_code(api, ErrorCode::UnsupportedVersion, client_version));
        }

        match request {
            CoordinatorRequest::InitProducerId(r) => {
                match self
                    .txn
                    .init_producer_id(&r.transactional_id, r.transaction_timeout_ms)
                    .await
                {
                    Ok(session) => CoordinatorResponse::InitProducerId {
                        error_code: ErrorCode::None,
                        producer_id: session.producer_id,
                        producer_epoch: session.producer_epoch,
                    },
                    Err(e) => CoordinatorRequest::InitProducerId(r)
                        .failed(self.error_code(api, e.code(), client_version)),
                }
            }
            CoordinatorRequest::AddPartitionsToTxn(r) => {
                let result = self
                    .txn
                    .add_partitions_to_txn(&r.transactional_id, r.producer_id, r.producer_epoch, r.partitions)
                    .await;
                CoordinatorResponse::AddPartitionsToTxn {
                    error_code: self.result_code(api, &result, client_version),
                }
            }
            CoordinatorRequest::AddOffsetsToTxn(r) => {
                let result = self
                    .txn
                    .add_offsets_to_txn(&r.transactional_id, r.producer_id, r.producer_epoch, &r.group_id)
                    .await;
                CoordinatorResponse::AddOffsetsToTxn {
                    error_code: self.result_code(api, &result, client_version),
                }
            }
            CoordinatorRequest::TxnOffsetCommit(r) => {
                let result = self.txn.txn_offset_commit(r).await;
                CoordinatorResponse::TxnOffsetCommit {
                    error_code: self.result_code(api, &result, client_version),
                }
            }
            CoordinatorRequest::EndTxn(r) => {
                let result = self
                    .txn
                    .end_txn(&r.transactional_id, r.producer_id, r.producer_epoch, r.commit)
                    .await;
                CoordinatorResponse::EndTxn {
                    error_code: self.result_code(api, &result, client_version),
                }
            }
            CoordinatorRequest::JoinGroup(r) => {
                match self
                    .groups
                    .join_group(
                        &r.group_id,
                        r.member_id.as_deref(),
                        r.group_instance_id.as_deref(),
                        now_ms(),
                    )
                    .await
                {
                    Ok(joined) => CoordinatorResponse::JoinGroup {
                        error_code: ErrorCode::None,
                        member_id: joined.member_id,
                        generation_id: joined.generation_id,
                    },
                    Err(e) => CoordinatorRequest::JoinGroup(r).failed(self.error_code(api, e.code(), client_version)),
                }
            }
            CoordinatorRequest::Heartbeat(r) => {
                let result = self
                    .groups
                    .heartbeat(&r.group_id, &r.member_id, r.generation_id, now_ms())
                    .await;
                CoordinatorResponse::Heartbeat {
                    error_code: self.result_code(api, &result, client_version),
                }
            }
            CoordinatorRequest::LeaveGroup(r) => {
                let result = self.groups.leave_group(&r.group_id, &r.member_id).await;
                CoordinatorResponse::LeaveGroup {
                    error_code: self.result_code(api, &result, client_version),
                }
            }
            CoordinatorRequest::OffsetFetch(r) => {
                match self
                    .offsets
                    .fetch_committed(&r.group_id, r.partitions.as_deref())
                    .await
                {
                    Ok(committed) => CoordinatorResponse::OffsetFetch {
                        error_code: ErrorCode::None,
                        offsets: committed.into_values().collect(),
                    },
                    Err(e) => {
                        CoordinatorRequest::OffsetFetch(r).failed(self.error_code(api, e.code(), client_version))
                    }
                }
            }
        }
    }

    fn result_code<T>(
        &self,
        api: &'static str,
        result: &Result<T>,
        client_version: Option<LogicalVersion>,
    ) -> ErrorCode {
        match result {
            Ok(_) => ErrorCode::None,
            Err(e) => {
                debug!("{} failed: {}", api, e);
                self.error_code(api, e.code(), client_version)
            }
        }
    }

    fn error_code(
        &self,
        api: &'static str,
        code: ErrorCode,
        client_version: Option<LogicalVersion>,
    ) -> ErrorCode {
        let code = self.versions.adapt_error(code, client_version);
        RPC_ERRORS_TOTAL
            .with_label_values(&[api, &format!("{:?}", code)])
            .inc();
        code
    }
}
