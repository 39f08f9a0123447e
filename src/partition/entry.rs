use std::fmt;

use serde::Deserialize;
use serde::Serialize;

use crate::LogicalVersion;
use crate::ProducerEpoch;
use crate::ProducerId;
use crate::Result;
use crate::TxnOutcome;
use crate::VersionedRecord;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TopicPartition {
    pub topic: String,
    pub partition: i32,
}

impl TopicPartition {
    pub fn new(
        topic: impl Into<String>,
        partition: i32,
    ) -> Self {
        Self {
            topic: topic.into(),
            partition,
        }
    }

    /// Name of the replicated log backing this partition
    pub fn log_name(&self) -> String {
        self.to_string()
    }

    pub fn is_internal(&self) -> bool {
        self.topic.starts_with("__")
    }
}

impl fmt::Display for TopicPartition {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "{}-{}", self.topic, self.partition)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataRecord {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

impl DataRecord {
    pub fn new(
        key: impl Into<Vec<u8>>,
        value: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProduceBatch {
    pub producer_id: ProducerId,
    pub producer_epoch: ProducerEpoch,
    pub transactional: bool,
    pub records: Vec<DataRecord>,
}

/// Commit or abort marker closing a producer's open transaction on a partition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlMarker {
    pub producer_id: ProducerId,
    pub producer_epoch: ProducerEpoch,
    pub outcome: TxnOutcome,
    /// Term of the coordinator shard that wrote the marker. Absent in v5.
    pub coordinator_epoch: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PartitionEntry {
    Data(ProduceBatch),
    Control(ControlMarker),
}

#[derive(Serialize, Deserialize)]
struct ControlMarkerV5 {
    producer_id: ProducerId,
    producer_epoch: ProducerEpoch,
    outcome: TxnOutcome,
}

#[derive(Serialize, Deserialize)]
enum PartitionEntryV5 {
    Data(ProduceBatch),
    Control(ControlMarkerV5),
}

impl VersionedRecord for PartitionEntry {
    fn encode_body(
        &self,
        version: LogicalVersion,
    ) -> Result<Vec<u8>> {
        if version >= LogicalVersion::V6 {
            return Ok(bincode::serialize(self)?);
        }
        let legacy = match self {
            PartitionEntry::Data(batch) => PartitionEntryV5::Data(batch.clone()),
            PartitionEntry::Control(m) => PartitionEntryV5::Control(ControlMarkerV5 {
                producer_id: m.producer_id,
                producer_epoch: m.producer_epoch,
                outcome: m.outcome,
            }),
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
        let entry = match bincode::deserialize::<PartitionEntryV5>(body)? {
            PartitionEntryV5::Data(batch) => PartitionEntry::Data(batch),
            PartitionEntryV5::Control(m) => PartitionEntry::Control(ControlMarker {
                producer_id: m.producer_id,
                producer_epoch: m.producer_epoch,
                outcome: m.outcome,
                coordinator_epoch: None,
            }),
        };
        Ok(entry)
    }
}

/// A record returned by a read-committed fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumedRecord {
    pub partition: TopicPartition,
    /// Offset of the batch the record belongs to
    pub offset: u64,
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResult {
    pub records: Vec<ConsumedRecord>,
    /// Position to fetch from next
    pub next_offset: u64,
    /// First offset that may still belong to an undecided transaction
    pub last_stable_offset: u64,
}
