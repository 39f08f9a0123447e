use std::collections::BTreeSet;

use serde::Deserialize;
use serde::Serialize;

use crate::AbortReason;
use crate::LogicalVersion;
use crate::ProducerEpoch;
use crate::ProducerId;
use crate::Result;
use crate::TopicPartition;
use crate::TransactionMetadata;
use crate::TxnState;
use crate::VersionedRecord;

/// Entry of a `__transaction_state-<n>` log. The latest record per id wins on replay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxnLogRecord {
    pub transactional_id: String,
    pub producer_id: ProducerId,
    pub producer_epoch: ProducerEpoch,
    pub state: TxnState,
    pub partitions: Vec<TopicPartition>,
    pub timeout_ms: u64,
    pub txn_start_ms: u64,
    /// Absent in v5
    pub last_update_ms: Option<u64>,
    /// Absent in v5
    pub abort_reason: Option<AbortReason>,
}

#[derive(Serialize, Deserialize)]
struct TxnLogRecordV5 {
    transactional_id: String,
    producer_id: ProducerId,
    producer_epoch: ProducerEpoch,
    state: TxnState,
    partitions: Vec<TopicPartition>,
    timeout_ms: u64,
    txn_start_ms: u64,
}

impl TxnLogRecord {
    pub fn from_metadata(md: &TransactionMetadata) -> Self {
        Self {
            transactional_id: md.transactional_id.clone(),
            producer_id: md.producer_id,
            producer_epoch: md.producer_epoch,
            state: md.state,
            partitions: md.partitions.iter().cloned().collect(),
            timeout_ms: md.timeout_ms,
            txn_start_ms: md.txn_start_ms,
            last_update_ms: Some(md.last_update_ms),
            abort_reason: md.abort_reason,
        }
    }

    /// In-memory view after applying this record. `Complete*` resets to `Empty`.
    pub fn into_metadata(self) -> TransactionMetadata {
        let last_update_ms = self.last_update_ms.unwrap_or(self.txn_start_ms);
        match self.state.outcome().filter(|_| self.state.is_complete()) {
            Some(outcome) => TransactionMetadata {
                transactional_id: self.transactional_id,
                producer_id: self.producer_id,
                producer_epoch: self.producer_epoch,
                state: TxnState::Empty,
                partitions: BTreeSet::new(),
                timeout_ms: self.timeout_ms,
                txn_start_ms: 0,
                last_update_ms,
                abort_reason: None,
                last_outcome: Some(outcome),
                completing: false,
            },
            None => TransactionMetadata {
                transactional_id: self.transactional_id,
                producer_id: self.producer_id,
                producer_epoch: self.producer_epoch,
                state: self.state,
                partitions: self.partitions.into_iter().collect(),
                timeout_ms: self.timeout_ms,
                txn_start_ms: self.txn_start_ms,
                last_update_ms,
                abort_reason: self.abort_reason,
                last_outcome: None,
                completing: false,
            },
        }
    }
}

impl VersionedRecord for TxnLogRecord {
    fn encode_body(
        &self,
        version: LogicalVersion,
    ) -> Result<Vec<u8>> {
        if version >= LogicalVersion::V6 {
            return Ok(bincode::serialize(self)?);
        }
        let legacy = TxnLogRecordV5 {
            transactional_id: self.transactional_id.clone(),
            producer_id: self.producer_id,
            producer_epoch: self.producer_epoch,
            state: self.state,
            partitions: self.partitions.clone(),
            timeout_ms: self.timeout_ms,
            txn_start_ms: self.txn_start_ms,
        };
        Ok(bincode::serialize(&legacy)?)
    }

    fn decode_body(
        version: LogicalVersion,
        body: &[u8],
    ) -> Result<Self> {
        if version >= LogicalVersion::V6 {
            return Ok(bincode::deserialize(body)?);
        }
        let legacy: TxnLogRecordV5 = bincode::deserialize(body)?;
        Ok(Self {
            transactional_id: legacy.transactional_id,
            producer_id: legacy.producer_id,
            producer_epoch: legacy.producer_epoch,
            state: legacy.state,
            partitions: legacy.partitions,
            timeout_ms: legacy.timeout_ms,
            txn_start_ms: legacy.txn_start_ms,
            last_update_ms: None,
            abort_reason: None,
        })
    }
}
