use serde::Deserialize;
use serde::Serialize;

/// Protocol error codes, numerically identical to the Kafka wire protocol
#[repr(i16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCode {
    None = 0,
    UnknownServerError = -1,
    CorruptMessage = 2,
    UnknownTopicOrPartition = 3,
    RequestTimedOut = 7,
    CoordinatorLoadInProgress = 14,
    CoordinatorNotAvailable = 15,
    NotCoordinator = 16,
    InvalidTopic = 17,
    NotEnoughReplicas = 19,
    IllegalGeneration = 22,
    InvalidGroupId = 24,
    UnknownMemberId = 25,
    UnsupportedVersion = 35,
    InvalidRequest = 42,
    InvalidProducerEpoch = 47,
    InvalidTxnState = 48,
    InvalidProducerIdMapping = 49,
    InvalidTransactionTimeout = 50,
    ConcurrentTransactions = 51,
    TransactionCoordinatorFenced = 52,
    FencedInstanceId = 82,
    ProducerFenced = 90,
}

impl ErrorCode {
    pub fn as_i16(self) -> i16 {
        self as i16
    }

    pub fn is_ok(self) -> bool {
        self == ErrorCode::None
    }

    /// The same request may succeed if sent again after a short delay
    pub fn is_retriable(self) -> bool {
        matches!(
            self,
            ErrorCode::RequestTimedOut
                | ErrorCode::CoordinatorLoadInProgress
                | ErrorCode::CoordinatorNotAvailable
                | ErrorCode::NotCoordinator
                | ErrorCode::NotEnoughReplicas
                | ErrorCode::ConcurrentTransactions
        )
    }

    /// Another instance owns the identity; the client must shut down
    pub fn is_fencing(self) -> bool {
        matches!(
            self,
            ErrorCode::ProducerFenced | ErrorCode::InvalidProducerEpoch | ErrorCode::FencedInstanceId
        )
    }

    /// The consumer must rejoin its group before committing again
    pub fn requires_rejoin(self) -> bool {
        matches!(self, ErrorCode::UnknownMemberId | ErrorCode::IllegalGeneration)
    }
}

impl TryFrom<i16> for ErrorCode {
    type Error = i16;

    fn try_from(code: i16) -> std::result::Result<Self, Self::Error> {
        let c = match code {
            0 => ErrorCode::None,
            -1 => ErrorCode::UnknownServerError,
            2 => ErrorCode::CorruptMessage,
            3 => ErrorCode::UnknownTopicOrPartition,
            7 => ErrorCode::RequestTimedOut,
            14 => ErrorCode::CoordinatorLoadInProgress,
            15 => ErrorCode::CoordinatorNotAvailable,
            16 => ErrorCode::NotCoordinator,
            17 => ErrorCode::InvalidTopic,
            19 => ErrorCode::NotEnoughReplicas,
            22 => ErrorCode::IllegalGeneration,
            24 => ErrorCode::InvalidGroupId,
            25 => ErrorCode::UnknownMemberId,
            35 => ErrorCode::UnsupportedVersion,
            42 => ErrorCode::InvalidRequest,
            47 => ErrorCode::InvalidProducerEpoch,
            48 => ErrorCode::InvalidTxnState,
            49 => ErrorCode::InvalidProducerIdMapping,
            50 => ErrorCode::InvalidTransactionTimeout,
            51 => ErrorCode::ConcurrentTransactions,
            52 => ErrorCode::TransactionCoordinatorFenced,
            82 => ErrorCode::FencedInstanceId,
            90 => ErrorCode::ProducerFenced,
            other => return Err(other),
        };
        Ok(c)
    }
}
