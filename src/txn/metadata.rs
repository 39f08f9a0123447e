use std::collections::BTreeSet;

use serde::Deserialize;
use serde::Serialize;

use crate::ProducerEpoch;
use crate::ProducerId;
use crate::ProducerIdAndEpoch;
use crate::ProducerSession;
use crate::TopicPartition;
use crate::NO_PRODUCER_EPOCH;
use crate::NO_PRODUCER_ID;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TxnOutcome {
    Commit,
    Abort,
}

impl TxnOutcome {
    pub fn from_commit(commit: bool) -> Self {
        if commit {
            TxnOutcome::Commit
        } else {
            TxnOutcome::Abort
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TxnOutcome::Commit => "commit",
            TxnOutcome::Abort => "abort",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TxnState {
    Empty,
    Ongoing,
    PrepareCommit,
    PrepareAbort,
    CompleteCommit,
    CompleteAbort,
}

impl TxnState {
    pub fn prepare(outcome: TxnOutcome) -> Self {
        match outcome {
            TxnOutcome::Commit => TxnState::PrepareCommit,
            TxnOutcome::Abort => TxnState::PrepareAbort,
        }
    }

    pub fn complete(outcome: TxnOutcome) -> Self {
        match outcome {
            TxnOutcome::Commit => TxnState::CompleteCommit,
            TxnOutcome::Abort => TxnState::CompleteAbort,
        }
    }

    pub fn is_prepare(&self) -> bool {
        matches!(self, TxnState::PrepareCommit | TxnState::PrepareAbort)
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, TxnState::CompleteCommit | TxnState::CompleteAbort)
    }

    /// Outcome decided by a `Prepare*` or `Complete*` state
    pub fn outcome(&self) -> Option<TxnOutcome> {
        match self {
            TxnState::PrepareCommit | TxnState::CompleteCommit => Some(TxnOutcome::Commit),
            TxnState::PrepareAbort | TxnState::CompleteAbort => Some(TxnOutcome::Abort),
            TxnState::Empty | TxnState::Ongoing => None,
        }
    }
}

/// Why a transaction was aborted. Metadata only; every abort takes the same path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AbortReason {
    ClientRequest,
    Timeout,
    ProducerReinit,
}

impl AbortReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            AbortReason::ClientRequest => "client_request",
            AbortReason::Timeout => "timeout",
            AbortReason::ProducerReinit => "producer_reinit",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionMetadata {
    pub transactional_id: String,
    pub producer_id: ProducerId,
    pub producer_epoch: ProducerEpoch,
    pub state: TxnState,
    /// Participants, data partitions and consumer offsets partitions alike
    pub partitions: BTreeSet<TopicPartition>,
    pub timeout_ms: u64,
    pub txn_start_ms: u64,
    pub last_update_ms: u64,
    pub abort_reason: Option<AbortReason>,
    /// Outcome of the last completed transaction, so retried EndTxn calls succeed
    pub last_outcome: Option<TxnOutcome>,
    /// A completion is in flight. Never persisted.
    pub completing: bool,
}

impl TransactionMetadata {
    /// Placeholder for a transactional id seen for the first time
    pub fn unregistered(
        transactional_id: impl Into<String>,
        timeout_ms: u64,
    ) -> Self {
        Self {
            transactional_id: transactional_id.into(),
            producer_id: NO_PRODUCER_ID,
            producer_epoch: NO_PRODUCER_EPOCH,
            state: TxnState::Empty,
            partitions: BTreeSet::new(),
            timeout_ms,
            txn_start_ms: 0,
            last_update_ms: 0,
            abort_reason: None,
            last_outcome: None,
            completing: false,
        }
    }

    pub fn is_registered(&self) -> bool {
        self.producer_id != NO_PRODUCER_ID
    }

    pub fn session(&self) -> ProducerSession {
        ProducerSession {
            transactional_id: self.transactional_id.clone(),
            producer_id: self.producer_id,
            producer_epoch: self.producer_epoch,
        }
    }

    pub fn id_and_epoch(&self) -> ProducerIdAndEpoch {
        ProducerIdAndEpoch::new(self.producer_id, self.producer_epoch)
    }

    pub fn is_expired(
        &self,
        now_ms: u64,
    ) -> bool {
        self.state == TxnState::Ongoing && now_ms.saturating_sub(self.txn_start_ms) > self.timeout_ms
    }
}
