//! Coordinator Error Hierarchy
//!
//! Errors are grouped by the layer that raises them: infrastructure (replicated
//! log, storage, serialization), configuration, and coordinator protocol
//! (transactions, consumer groups, partitions, version negotiation).
//!
//! Every error maps onto a wire [`ErrorCode`] through [`Error::code`]; clients
//! decide whether to retry, rejoin or give up from that code alone.

use std::path::PathBuf;
use std::time::Duration;

use config::ConfigError;
use tokio::task::JoinError;

use crate::ErrorCode;
use crate::NodeId;
use crate::ProducerEpoch;
use crate::ProducerId;
use crate::TxnState;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Infrastructure-level failures (replicated log, storage, serialization)
    #[error(transparent)]
    System(#[from] SystemError),

    /// Configuration validation failures
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Transaction and group protocol violations
    #[error(transparent)]
    Coordinator(#[from] CoordinatorError),

    /// Errors surfaced to in-process clients
    #[error(transparent)]
    Client(#[from] ClientError),

    /// Unrecoverable failures requiring process termination
    #[error("Fatal error: {0}")]
    Fatal(String),
}

#[derive(Debug, thiserror::Error)]
pub enum CoordinatorError {
    #[error(transparent)]
    Txn(#[from] TxnError),

    #[error(transparent)]
    Group(#[from] GroupError),

    #[error(transparent)]
    Partition(#[from] PartitionError),

    #[error(transparent)]
    Version(#[from] VersionError),
}

#[derive(Debug, thiserror::Error)]
pub enum TxnError {
    /// A newer producer instance owns the transactional id
    #[error(
        "Producer {producer_id} of {transactional_id} is fenced (current epoch: {current_epoch}, received: {received_epoch})"
    )]
    ProducerFenced {
        transactional_id: String,
        producer_id: ProducerId,
        current_epoch: ProducerEpoch,
        received_epoch: ProducerEpoch,
    },

    #[error("Producer id {received} does not match {current} registered for {transactional_id}")]
    InvalidProducerIdMapping {
        transactional_id: String,
        current: ProducerId,
        received: ProducerId,
    },

    /// The transaction is completing; retry once the markers are written
    #[error("Transaction {0} is completing")]
    ConcurrentTransactions(String),

    #[error("{operation} is not allowed for {transactional_id} in state {state:?}")]
    InvalidTxnState {
        transactional_id: String,
        state: TxnState,
        operation: &'static str,
    },

    #[error("Transaction timeout {requested}ms exceeds the maximum of {max}ms")]
    InvalidTransactionTimeout { requested: u64, max: u64 },

    #[error("Transactional id must not be empty")]
    InvalidTransactionalId,

    /// The shard owning the transactional id is led by another node
    #[error("Node {node_id} is not the coordinator of shard {shard} (leader: {leader:?})")]
    NotCoordinator {
        shard: u32,
        node_id: NodeId,
        leader: Option<NodeId>,
    },

    /// The shard is replaying its log after a leadership change
    #[error("Shard {0} is loading")]
    CoordinatorLoadInProgress(u32),
}

#[derive(Debug, thiserror::Error)]
pub enum GroupError {
    #[error("Member {member_id} is not part of group {group_id}")]
    UnknownMemberId { group_id: String, member_id: String },

    #[error("Generation {received} of group {group_id} is stale (current: {current})")]
    IllegalGeneration {
        group_id: String,
        current: i32,
        received: i32,
    },

    /// The static instance id was claimed by a newer member
    #[error("Member {member_id} of group {group_id} was fenced by a newer holder of instance {group_instance_id}")]
    FencedInstanceId {
        group_id: String,
        group_instance_id: String,
        member_id: String,
    },

    #[error("Group id must not be empty")]
    InvalidGroupId,

    /// The group's offsets log is led by another node
    #[error("Node {node_id} is not the coordinator of group {group_id} (leader: {leader:?})")]
    NotCoordinator {
        group_id: String,
        node_id: NodeId,
        leader: Option<NodeId>,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum PartitionError {
    /// Zombie producer writing with an epoch older than a later marker or batch
    #[error("Producer {producer_id} fenced on {partition} (epoch {received_epoch} < {current_epoch})")]
    ProducerFenced {
        partition: String,
        producer_id: ProducerId,
        current_epoch: ProducerEpoch,
        received_epoch: ProducerEpoch,
    },

    #[error("Invalid record batch for {partition}: {reason}")]
    InvalidBatch { partition: String, reason: String },

    #[error("Topic {0} is reserved for internal use")]
    InternalTopic(String),

    /// Marker from a coordinator older than one that already wrote here
    #[error("Marker for producer {producer_id} on {partition} from coordinator epoch {received} (current: {current})")]
    CoordinatorFenced {
        partition: String,
        producer_id: ProducerId,
        current: u64,
        received: u64,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum VersionError {
    /// A record was written by a newer binary than this node understands
    #[error("Record version {found} is newer than the supported version {supported}")]
    Unsupported { found: u16, supported: u16 },

    #[error("Record version {0} is older than the minimum supported version")]
    Obsolete(u16),

    #[error("Record envelope is truncated ({0} bytes)")]
    Truncated(usize),

    /// The node would lead a log holding records it cannot read
    #[error("{log} holds records at version {persisted}; refusing to start at version {local}")]
    DowngradeRefused { log: String, persisted: u16, local: u16 },
}

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// A coordinator RPC answered with an error code
    #[error("{operation} failed with {code:?}")]
    Rpc {
        operation: &'static str,
        code: ErrorCode,
    },

    #[error("Producer has not been initialized")]
    NotInitialized,

    #[error("No transaction in progress")]
    NoTransaction,

    #[error("A transaction is already in progress")]
    TransactionInProgress,

    #[error("Consumer is not a member of a group")]
    NotSubscribed,
}

#[derive(Debug, thiserror::Error)]
pub enum LogError {
    /// Append addressed to a log whose leadership moved on
    #[error("{log}: not the leader (leader: {leader:?}, term: {term})")]
    NotLeader {
        log: String,
        leader: Option<NodeId>,
        term: u64,
    },

    /// Append from a deposed leader
    #[error("{log}: stale term {expected} (current: {current})")]
    StaleTerm {
        log: String,
        expected: u64,
        current: u64,
    },

    /// Not enough replicas acknowledged the append
    #[error("{log}: quorum unavailable")]
    QuorumLost { log: String },
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Disk I/O failures
    #[error(transparent)]
    IoError(#[from] std::io::Error),

    #[error("Error occurred at path: {path}")]
    PathError {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Embedded database errors
    #[error("Embedded database error: {0}")]
    DbError(String),

    /// Checksum or layout validation failures
    #[error("Data corruption detected at {location}")]
    DataCorruption { location: String },
}

#[derive(Debug, thiserror::Error)]
pub enum SystemError {
    #[error("Replicated log error: {0}")]
    Log(#[from] LogError),

    #[error("Storage operation failed: {0}")]
    Storage(#[from] StorageError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] SerializationError),

    /// Retry policy exhaustion
    #[error("{task} still failing after {attempts} attempts")]
    RetryExhausted { task: String, attempts: usize },

    #[error("{task} timed out after {duration:?}")]
    Timeout { task: String, duration: Duration },

    #[error("Background task failed: {0}")]
    TaskFailed(#[from] JoinError),

    #[error("Node failed to start: {0}")]
    NodeStartFailed(String),

    #[error("{0}")]
    SignalSendFailed(String),
}

// Serialization is classified separately (across protocol layers and system layers)
#[derive(Debug, thiserror::Error)]
pub enum SerializationError {
    #[error("Bincode serialization failed: {0}")]
    Bincode(#[from] bincode::Error),
}

impl Error {
    /// Wire code reported to clients for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::Coordinator(CoordinatorError::Txn(e)) => match e {
                TxnError::ProducerFenced { .. } => ErrorCode::ProducerFenced,
                TxnError::InvalidProducerIdMapping { .. } => ErrorCode::InvalidProducerIdMapping,
                TxnError::ConcurrentTransactions(_) => ErrorCode::ConcurrentTransactions,
                TxnError::InvalidTxnState { .. } => ErrorCode::InvalidTxnState,
                TxnError::InvalidTransactionTimeout { .. } => ErrorCode::InvalidTransactionTimeout,
                TxnError::InvalidTransactionalId => ErrorCode::InvalidRequest,
                TxnError::NotCoordinator { .. } => ErrorCode::NotCoordinator,
                TxnError::CoordinatorLoadInProgress(_) => ErrorCode::CoordinatorLoadInProgress,
            },
            Error::Coordinator(CoordinatorError::Group(e)) => match e {
                GroupError::UnknownMemberId { .. } => ErrorCode::UnknownMemberId,
                GroupError::IllegalGeneration { .. } => ErrorCode::IllegalGeneration,
                GroupError::FencedInstanceId { .. } => ErrorCode::FencedInstanceId,
                GroupError::InvalidGroupId => ErrorCode::InvalidGroupId,
                GroupError::NotCoordinator { .. } => ErrorCode::NotCoordinator,
            },
            Error::Coordinator(CoordinatorError::Partition(e)) => match e {
                PartitionError::ProducerFenced { .. } => ErrorCode::ProducerFenced,
                PartitionError::InvalidBatch { .. } => ErrorCode::CorruptMessage,
                PartitionError::InternalTopic(_) => ErrorCode::InvalidTopic,
                PartitionError::CoordinatorFenced { .. } => ErrorCode::TransactionCoordinatorFenced,
            },
            Error::Coordinator(CoordinatorError::Version(e)) => match e {
                VersionError::Unsupported { .. }
                | VersionError::Obsolete(_)
                | VersionError::DowngradeRefused { .. } => ErrorCode::UnsupportedVersion,
                VersionError::Truncated(_) => ErrorCode::CorruptMessage,
            },
            Error::Client(ClientError::Rpc { code, .. }) => *code,
            Error::Client(_) => ErrorCode::InvalidTxnState,
            Error::System(SystemError::Log(e)) => match e {
                LogError::NotLeader { .. } | LogError::StaleTerm { .. } => ErrorCode::NotCoordinator,
                LogError::QuorumLost { .. } => ErrorCode::NotEnoughReplicas,
            },
            Error::System(SystemError::RetryExhausted { .. }) | Error::System(SystemError::Timeout { .. }) => {
                ErrorCode::RequestTimedOut
            }
            Error::System(_) | Error::Config(_) | Error::Fatal(_) => ErrorCode::UnknownServerError,
        }
    }

    /// Whether retrying the same request later may succeed
    pub fn is_retriable(&self) -> bool {
        self.code().is_retriable()
    }
}

// ============== Conversion Implementations ============== //
impl From<TxnError> for Error {
    fn from(e: TxnError) -> Self {
        Error::Coordinator(CoordinatorError::Txn(e))
    }
}

impl From<GroupError> for Error {
    fn from(e: GroupError) -> Self {
        Error::Coordinator(CoordinatorError::Group(e))
    }
}

impl From<PartitionError> for Error {
    fn from(e: PartitionError) -> Self {
        Error::Coordinator(CoordinatorError::Partition(e))
    }
}

impl From<VersionError> for Error {
    fn from(e: VersionError) -> Self {
        Error::Coordinator(CoordinatorError::Version(e))
    }
}

impl From<LogError> for Error {
    fn from(e: LogError) -> Self {
        Error::System(SystemError::Log(e))
    }
}

impl From<StorageError> for Error {
    fn from(e: StorageError) -> Self {
        Error::System(SystemError::Storage(e))
    }
}

impl From<SerializationError> for Error {
    fn from(e: SerializationError) -> Self {
        Error::System(SystemError::Serialization(e))
    }
}

impl From<bincode::Error> for Error {
    fn from(e: bincode::Error) -> Self {
        SerializationError::Bincode(e).into()
    }
}

impl From<sled::Error> for Error {
    fn from(err: sled::Error) -> Self {
        StorageError::DbError(err.to_string()).into()
    }
}

impl From<JoinError> for Error {
    fn from(err: JoinError) -> Self {
        Error::System(SystemError::TaskFailed(err))
    }
}
