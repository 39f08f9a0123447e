use std::collections::BTreeMap;
use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::debug;
use tracing::instrument;
use tracing::warn;

use crate::utils::hash::bucket_for;
use crate::CommittedOffset;
use crate::ControlMarker;
use crate::GroupError;
use crate::GroupMetadata;
use crate::LogFactory;
use crate::NodeId;
use crate::OffsetEntry;
use crate::OffsetLogRecord;
use crate::PartitionError;
use crate::ProducerId;
use crate::ProducerIdAndEpoch;
use crate::ReplicatedLog;
use crate::Result;
use crate::TopicPartition;
use crate::TxnOutcome;
use crate::VersionCompatibilityLayer;
use crate::CONSUMER_OFFSETS_TOPIC;
use crate::FENCED_REQUESTS_TOTAL;
use crate::REPLAY_BATCH_SIZE;

#[derive(Debug, Default)]
struct OffsetsIndex {
    applied: u64,
    committed: HashMap<(String, TopicPartition), CommittedOffset>,
    /// Staged commits per producer, in log order
    pending: HashMap<ProducerId, Vec<(String, Vec<OffsetEntry>)>>,
    /// Highest coordinator epoch carried by a marker, per producer
    coordinator_epochs: HashMap<ProducerId, u64>,
    groups: HashMap<String, GroupMetadata>,
}

impl OffsetsIndex {
    fn apply(
        &mut self,
        offset: u64,
        record: OffsetLogRecord,
    ) {
        match record {
            OffsetLogRecord::Pending {
                producer_id,
                group_id,
                offsets,
                ..
            } => {
                self.pending.entry(producer_id).or_default().push((group_id, offsets));
            }
            OffsetLogRecord::Marker {
                producer_id,
                outcome,
                coordinator_epoch,
                ..
            } => {
                if let Some(epoch) = coordinator_epoch {
                    let current = self.coordinator_epochs.entry(producer_id).or_insert(epoch);
                    *current = (*current).max(epoch);
                }
                let staged = self.pending.remove(&producer_id).unwrap_or_default();
                if outcome == TxnOutcome::Commit {
                    for (group_id, offsets) in staged {
                        self.commit(&group_id, offsets);
                    }
                }
            }
            OffsetLogRecord::Commit { group_id, offsets } => self.commit(&group_id, offsets),
            OffsetLogRecord::Group(group) => {
                self.groups.insert(group.group_id.clone(), group);
            }
        }
        self.applied = offset + 1;
    }

    fn commit(
        &mut self,
        group_id: &str,
        offsets: Vec<OffsetEntry>,
    ) {
        for o in offsets {
            self.committed.insert(
                (group_id.to_string(), o.partition.clone()),
                CommittedOffset {
                    group_id: group_id.to_string(),
                    partition: o.partition,
                    offset: o.offset,
                    metadata: o.metadata,
                },
            );
        }
    }
}

struct OffsetsPartition {
    tp: TopicPartition,
    log: Arc<dyn ReplicatedLog>,
    index: Mutex<OffsetsIndex>,
}

/// Staged and committed consumer offsets, and group membership.
///
/// Offsets of a group live in partition `hash(group) % n` of the consumer
/// offsets topic. Transactional commits are staged as pending records and
/// become visible only when the transaction's marker is finalized here. The
/// group's membership is kept in the same log, so every node reading it
/// agrees on members and generations.
pub struct OffsetCommitManager {
    versions: Arc<VersionCompatibilityLayer>,
    partitions: Vec<OffsetsPartition>,
}

impl OffsetCommitManager {
    pub fn new(
        factory: &dyn LogFactory,
        num_partitions: u32,
        versions: Arc<VersionCompatibilityLayer>,
    ) -> Result<Self> {
        let mut partitions = Vec::with_capacity(num_partitions as usize);
        for p in 0..num_partitions {
            let tp = TopicPartition::new(CONSUMER_OFFSETS_TOPIC, p as i32);
            let log = factory.open(&tp.log_name())?;
            partitions.push(OffsetsPartition {
                tp,
                log,
                index: Mutex::new(OffsetsIndex::default()),
            });
        }
        Ok(Self { versions, partitions })
    }

    /// Consumer offsets partition holding `group_id`
    pub fn partition_for(
        &self,
        group_id: &str,
    ) -> TopicPartition {
        TopicPartition::new(
            CONSUMER_OFFSETS_TOPIC,
            bucket_for(group_id, self.partitions.len() as u32) as i32,
        )
    }

    pub fn is_offsets_partition(
        &self,
        tp: &TopicPartition,
    ) -> bool {
        tp.topic == CONSUMER_OFFSETS_TOPIC
    }

    fn partition(
        &self,
        tp: &TopicPartition,
    ) -> Result<&OffsetsPartition> {
        self.partitions
            .get(tp.partition as usize)
            .filter(|p| p.tp == *tp)
            .ok_or_else(|| {
                PartitionError::InvalidBatch {
                    partition: tp.to_string(),
                    reason: "not a consumer offsets partition".to_string(),
                }
                .into()
            })
    }

    async fn catch_up(
        &self,
        p: &OffsetsPartition,
        index: &mut OffsetsIndex,
    ) -> Result<()> {
        loop {
            let entries = p.log.read(index.applied, REPLAY_BATCH_SIZE).await?;
            if entries.is_empty() {
                return Ok(());
            }
            for e in entries {
                let record: OffsetLogRecord = self.versions.decode(&e.payload)?;
                index.apply(e.offset, record);
            }
        }
    }

    async fn append(
        &self,
        p: &OffsetsPartition,
        index: &mut OffsetsIndex,
        record: &OffsetLogRecord,
    ) -> Result<()> {
        let payload = self.versions.encode(record)?;
        p.log.append(None, payload).await?;
        self.catch_up(p, index).await
    }

    /// Durably stages `offsets` for `group_id` under the producer's transaction
    #[instrument(skip(self, offsets), fields(pid = producer.producer_id))]
    pub async fn stage_offsets(
        &self,
        producer: ProducerIdAndEpoch,
        group_id: &str,
        offsets: Vec<OffsetEntry>,
    ) -> Result<()> {
        if group_id.is_empty() {
            return Err(GroupError::InvalidGroupId.into());
        }
        let tp = self.partition_for(group_id);
        let p = self.partition(&tp)?;
        let mut index = p.index.lock().await;
        self.catch_up(p, &mut index).await?;

        let record = OffsetLogRecord::Pending {
            producer_id: producer.producer_id,
            producer_epoch: producer.producer_epoch,
            group_id: group_id.to_string(),
            offsets,
        };
        self.append(p, &mut index, &record).await
    }

    /// Commits offsets outside any transaction
    pub async fn commit_offsets(
        &self,
        group_id: &str,
        offsets: Vec<OffsetEntry>,
    ) -> Result<()> {
        let tp = self.partition_for(group_id);
        let p = self.partition(&tp)?;
        let mut index = p.index.lock().await;
        self.catch_up(p, &mut index).await?;

        let record = OffsetLogRecord::Commit {
            group_id: group_id.to_string(),
            offsets,
        };
        self.append(p, &mut index, &record).await
    }

    /// Applies the transaction outcome to everything the producer staged on `tp`.
    ///
    /// Markers from a coordinator epoch below one already applied for the
    /// producer are rejected. Returns `false` when nothing was pending, which
    /// makes re-driven completions harmless.
    #[instrument(skip(self), fields(tp = %tp))]
    pub async fn finalize(
        &self,
        tp: &TopicPartition,
        marker: ControlMarker,
    ) -> Result<bool> {
        let p = self.partition(tp)?;
        let mut index = p.index.lock().await;
        self.catch_up(p, &mut index).await?;

        if let (Some(received), Some(current)) = (
            marker.coordinator_epoch,
            index.coordinator_epochs.get(&marker.producer_id).copied(),
        ) {
            if received < current {
                warn!(
                    "rejecting offsets marker for producer {} from coordinator epoch {} (current {})",
                    marker.producer_id, received, current
                );
                FENCED_REQUESTS_TOTAL.with_label_values(&["coordinator_epoch"]).inc();
                return Err(PartitionError::CoordinatorFenced {
                    partition: tp.to_string(),
                    producer_id: marker.producer_id,
                    current,
                    received,
                }
                .into());
            }
        }
        if !index.pending.contains_key(&marker.producer_id) {
            debug!("nothing pending for producer {}", marker.producer_id);
            return Ok(false);
        }

        let record = OffsetLogRecord::Marker {
            producer_id: marker.producer_id,
            producer_epoch: marker.producer_epoch,
            outcome: marker.outcome,
            coordinator_epoch: marker.coordinator_epoch,
        };
        self.append(p, &mut index, &record).await?;
        Ok(true)
    }

    /// Finalized offsets of `group_id`, optionally restricted to `partitions`
    pub async fn fetch_committed(
        &self,
        group_id: &str,
        partitions: Option<&[TopicPartition]>,
    ) -> Result<BTreeMap<TopicPartition, CommittedOffset>> {
        let tp = self.partition_for(group_id);
        let p = self.partition(&tp)?;
        let mut index = p.index.lock().await;
        self.catch_up(p, &mut index).await?;

        Ok(index
            .committed
            .values()
            .filter(|c| c.group_id == group_id)
            .filter(|c| partitions.map_or(true, |wanted| wanted.contains(&c.partition)))
            .map(|c| (c.partition.clone(), c.clone()))
            .collect())
    }

    /// Whether the producer has staged offsets awaiting a marker on `tp`
    pub async fn has_pending(
        &self,
        tp: &TopicPartition,
        producer_id: ProducerId,
    ) -> Result<bool> {
        let p = self.partition(tp)?;
        let mut index = p.index.lock().await;
        self.catch_up(p, &mut index).await?;
        Ok(index.pending.contains_key(&producer_id))
    }

    /// Membership of `group_id` as of the latest record in its offsets log
    pub async fn load_group(
        &self,
        group_id: &str,
    ) -> Result<Option<GroupMetadata>> {
        let tp = self.partition_for(group_id);
        let p = self.partition(&tp)?;
        let mut index = p.index.lock().await;
        self.catch_up(p, &mut index).await?;
        Ok(index.groups.get(group_id).cloned())
    }

    /// Applies `change` to the membership of `group_id` and persists the result.
    ///
    /// Only the leader of the group's offsets log may change membership, and
    /// the append carries its term so a deposed leader cannot write. Nothing is
    /// appended when `change` fails or leaves the group as it was.
    pub async fn update_group<T>(
        &self,
        group_id: &str,
        node_id: NodeId,
        change: impl FnOnce(&mut GroupMetadata) -> Result<T>,
    ) -> Result<T> {
        let tp = self.partition_for(group_id);
        let p = self.partition(&tp)?;
        let mut index = p.index.lock().await;
        let leadership = p.log.leadership();
        if !leadership.is_leader(node_id) {
            return Err(GroupError::NotCoordinator {
                group_id: group_id.to_string(),
                node_id,
                leader: leadership.leader,
            }
            .into());
        }
        self.catch_up(p, &mut index).await?;

        let before = index
            .groups
            .get(group_id)
            .cloned()
            .unwrap_or_else(|| GroupMetadata::new(group_id));
        let mut next = before.clone();
        let result = change(&mut next)?;
        if next != before {
            let payload = self.versions.encode(&OffsetLogRecord::Group(next))?;
            p.log.append(Some(leadership.term), payload).await?;
            self.catch_up(p, &mut index).await?;
        }
        Ok(result)
    }

    /// Groups with members whose offsets partition `node_id` leads
    pub async fn led_groups(
        &self,
        node_id: NodeId,
    ) -> Result<Vec<GroupMetadata>> {
        let mut groups = Vec::new();
        for p in &self.partitions {
            if !p.log.leadership().is_leader(node_id) {
                continue;
            }
            let mut index = p.index.lock().await;
            self.catch_up(p, &mut index).await?;
            groups.extend(index.groups.values().filter(|g| !g.is_empty()).cloned());
        }
        Ok(groups)
    }

    /// Logs backing the consumer offsets partitions
    pub fn logs(&self) -> Vec<Arc<dyn ReplicatedLog>> {
        self.partitions.iter().map(|p| p.log.clone()).collect()
    }
}
