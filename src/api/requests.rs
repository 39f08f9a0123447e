use crate::CommittedOffset;
use crate::ErrorCode;
use crate::LogicalVersion;
use crate::OffsetEntry;
use crate::ProducerEpoch;
use crate::ProducerId;
use crate::TopicPartition;
use crate::NO_PRODUCER_EPOCH;
use crate::NO_PRODUCER_ID;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitProducerIdRequest {
    pub transactional_id: String,
    pub transaction_timeout_ms: Option<u64>,
    pub client_version: Option<LogicalVersion>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddPartitionsToTxnRequest {
    pub transactional_id: String,
    pub producer_id: ProducerId,
    pub producer_epoch: ProducerEpoch,
    pub partitions: Vec<TopicPartition>,
    pub client_version: Option<LogicalVersion>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddOffsetsToTxnRequest {
    pub transactional_id: String,
    pub producer_id: ProducerId,
    pub producer_epoch: ProducerEpoch,
    pub group_id: String,
    pub client_version: Option<LogicalVersion>,
}

/// Offsets sent to a transaction by a consumer-group member
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxnOffsetCommitRequest {
    pub transactional_id: String,
    pub group_id: String,
    pub producer_id: ProducerId,
    pub producer_epoch: ProducerEpoch,
    pub member_id: String,
    pub generation_id: i32,
    pub group_instance_id: Option<String>,
    pub offsets: Vec<OffsetEntry>,
    pub client_version: Option<LogicalVersion>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndTxnRequest {
    pub transactional_id: String,
    pub producer_id: ProducerId,
    pub producer_epoch: ProducerEpoch,
    pub commit: bool,
    pub client_version: Option<LogicalVersion>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinGroupRequest {
    pub group_id: String,
    /// `None` for a member joining for the first time
    pub member_id: Option<String>,
    pub group_instance_id: Option<String>,
    pub client_version: Option<LogicalVersion>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeartbeatRequest {
    pub group_id: String,
    pub member_id: String,
    pub generation_id: i32,
    pub client_version: Option<LogicalVersion>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaveGroupRequest {
    pub group_id: String,
    pub member_id: String,
    pub client_version: Option<LogicalVersion>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OffsetFetchRequest {
    pub group_id: String,
    /// `None` fetches every partition the group committed
    pub partitions: Option<Vec<TopicPartition>>,
    pub client_version: Option<LogicalVersion>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoordinatorRequest {
    InitProducerId(InitProducerIdRequest),
    AddPartitionsToTxn(AddPartitionsToTxnRequest),
    AddOffsetsToTxn(AddOffsetsToTxnRequest),
    TxnOffsetCommit(TxnOffsetCommitRequest),
    EndTxn(EndTxnRequest),
    JoinGroup(JoinGroupRequest),
    Heartbeat(HeartbeatRequest),
    LeaveGroup(LeaveGroupRequest),
    OffsetFetch(OffsetFetchRequest),
}

impl CoordinatorRequest {
    pub fn api_name(&self) -> &'static str {
        match self {
            CoordinatorRequest::InitProducerId(_) => "InitProducerId",
            CoordinatorRequest::AddPartitionsToTxn(_) => "AddPartitionsToTxn",
            CoordinatorRequest::AddOffsetsToTxn(_) => "AddOffsetsToTxn",
            CoordinatorRequest::TxnOffsetCommit(_) => "TxnOffsetCommit",
            CoordinatorRequest::EndTxn(_) => "EndTxn",
            CoordinatorRequest::JoinGroup(_) => "JoinGroup",
            CoordinatorRequest::Heartbeat(_) => "Heartbeat",
            CoordinatorRequest::LeaveGroup(_) => "LeaveGroup",
            CoordinatorRequest::OffsetFetch(_) => "OffsetFetch",
        }
    }

    pub fn client_version(&self) -> Option<LogicalVersion> {
        match self {
            CoordinatorRequest::InitProducerId(r) => r.client_version,
            CoordinatorRequest::AddPartitionsToTxn(r) => r.client_version,
            CoordinatorRequest::AddOffsetsToTxn(r) => r.client_version,
            CoordinatorRequest::TxnOffsetCommit(r) => r.client_version,
            CoordinatorRequest::EndTxn(r) => r.client_version,
            CoordinatorRequest::JoinGroup(r) => r.client_version,
            CoordinatorRequest::Heartbeat(r) => r.client_version,
            CoordinatorRequest::LeaveGroup(r) => r.client_version,
            CoordinatorRequest::OffsetFetch(r) => r.client_version,
        }
    }

    /// Response of the same api carrying only `error_code`
    pub fn failed(
        &self,
        error_code: ErrorCode,
    ) -> CoordinatorResponse {
        match self {
            CoordinatorRequest::InitProducerId(_) => CoordinatorResponse::InitProducerId {
                error_code,
                producer_id: NO_PRODUCER_ID,
                producer_epoch: NO_PRODUCER_EPOCH,
            },
            CoordinatorRequest::AddPartitionsToTxn(_) => CoordinatorResponse::AddPartitionsToTxn { error_code },
            CoordinatorRequest::AddOffsetsToTxn(_) => CoordinatorResponse::AddOffsetsToTxn { error_code },
            CoordinatorRequest::TxnOffsetCommit(_) => CoordinatorResponse::TxnOffsetCommit { error_code },
            CoordinatorRequest::EndTxn(_) => CoordinatorResponse::EndTxn { error_code },
            CoordinatorRequest::JoinGroup(_) => CoordinatorResponse::JoinGroup {
                error_code,
                member_id: String::new(),
                generation_id: crate::NO_GENERATION,
            },
            CoordinatorRequest::Heartbeat(_) => CoordinatorResponse::Heartbeat { error_code },
            CoordinatorRequest::LeaveGroup(_) => CoordinatorResponse::LeaveGroup { error_code },
            CoordinatorRequest::OffsetFetch(_) => CoordinatorResponse::OffsetFetch {
                error_code,
                offsets: Vec::new(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoordinatorResponse {
    InitProducerId {
        error_code: ErrorCode,
        producer_id: ProducerId,
        producer_epoch: ProducerEpoch,
    },
    AddPartitionsToTxn {
        error_code: ErrorCode,
    },
    AddOffsetsToTxn {
        error_code: ErrorCode,
    },
    TxnOffsetCommit {
        error_code: ErrorCode,
    },
    EndTxn {
        error_code: ErrorCode,
    },
    JoinGroup {
        error_code: ErrorCode,
        member_id: String,
        generation_id: i32,
    },
    Heartbeat {
        error_code: ErrorCode,
    },
    LeaveGroup {
        error_code: ErrorCode,
    },
    OffsetFetch {
        error_code: ErrorCode,
        offsets: Vec<CommittedOffset>,
    },
}

impl CoordinatorResponse {
    pub fn error_code(&self) -> ErrorCode {
        match self {
            CoordinatorResponse::InitProducerId { error_code, .. }
            | CoordinatorResponse::AddPartitionsToTxn { error_code }
            | CoordinatorResponse::AddOffsetsToTxn { error_code }
            | CoordinatorResponse::TxnOffsetCommit { error_code }
            | CoordinatorResponse::EndTxn { error_code }
            | CoordinatorResponse::JoinGroup { error_code, .. }
            | CoordinatorResponse::Heartbeat { error_code }
            | CoordinatorResponse::LeaveGroup { error_code }
            | CoordinatorResponse::OffsetFetch { error_code, .. } => *error_code,
        }
    }
}
