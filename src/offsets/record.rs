use serde::Deserialize;
use serde::Serialize;

use crate::GroupMetadata;
use crate::LogicalVersion;
use crate::ProducerEpoch;
use crate::ProducerId;
use crate::Result;
use crate::TopicPartition;
use crate::TxnOutcome;
use crate::VersionedRecord;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OffsetEntry {
    pub partition: TopicPartition,
    pub offset: i64,
    pub metadata: Option<String>,
}

impl OffsetEntry {
    pub fn new(
        partition: TopicPartition,
        offset: i64,
    ) -> Self {
        Self {
            partition,
            offset,
            metadata: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommittedOffset {
    pub group_id: String,
    pub partition: TopicPartition,
    pub offset: i64,
    pub metadata: Option<String>,
}

/// Entry of a `__consumer_offsets-<n>` log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OffsetLogRecord {
    /// Offsets staged by a transaction, invisible until its marker
    Pending {
        producer_id: ProducerId,
        producer_epoch: ProducerEpoch,
        group_id: String,
        offsets: Vec<OffsetEntry>,
    },
    /// Outcome of the transaction that staged offsets
    Marker {
        producer_id: ProducerId,
        producer_epoch: ProducerEpoch,
        outcome: TxnOutcome,
        coordinator_epoch: Option<u64>,
    },
    /// Offsets committed outside any transaction
    Commit { group_id: String, offsets: Vec<OffsetEntry> },
    /// Membership of a group after a change; the latest record per group wins
    Group(GroupMetadata),
}

impl VersionedRecord for OffsetLogRecord {
    fn encode_body(
        &self,
        _version: LogicalVersion,
    ) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    fn decode_body(
        _version: LogicalVersion,
        body: &[u8],
    ) -> Result<Self> {
        Ok(bincode::deserialize(body)?)
    }
}
