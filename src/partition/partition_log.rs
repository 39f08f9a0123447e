use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::debug;
use tracing::instrument;
use tracing::warn;

use crate::ConsumedRecord;
use crate::ControlMarker;
use crate::FetchResult;
use crate::PartitionEntry;
use crate::PartitionError;
use crate::ProduceBatch;
use crate::ProducerEpoch;
use crate::ProducerId;
use crate::ReplicatedLog;
use crate::Result;
use crate::TopicPartition;
use crate::TxnOutcome;
use crate::VersionCompatibilityLayer;
use crate::FENCED_REQUESTS_TOTAL;
use crate::REPLAY_BATCH_SIZE;

/// Transactional view of the entries applied so far
#[derive(Debug, Default)]
struct PartitionIndex {
    /// Next log offset to apply
    applied: u64,
    /// Highest epoch seen per producer, from batches and markers
    producer_epochs: HashMap<ProducerId, ProducerEpoch>,
    /// Highest coordinator epoch carried by a marker, per producer
    coordinator_epochs: HashMap<ProducerId, u64>,
    /// First offset of every undecided transaction
    open_txns: HashMap<ProducerId, u64>,
    /// Inclusive offset ranges of aborted transactions per producer, ascending
    aborted: HashMap<ProducerId, Vec<(u64, u64)>>,
}

impl PartitionIndex {
    fn apply(
        &mut self,
        offset: u64,
        entry: &PartitionEntry,
    ) {
        match entry {
            PartitionEntry::Data(batch) => {
                self.observe_epoch(batch.producer_id, batch.producer_epoch);
                if batch.transactional {
                    self.open_txns.entry(batch.producer_id).or_insert(offset);
                }
            }
            PartitionEntry::Control(marker) => {
                self.observe_epoch(marker.producer_id, marker.producer_epoch);
                if let Some(epoch) = marker.coordinator_epoch {
                    let current = self.coordinator_epochs.entry(marker.producer_id).or_insert(epoch);
                    *current = (*current).max(epoch);
                }
                if let Some(first) = self.open_txns.remove(&marker.producer_id) {
                    if marker.outcome == TxnOutcome::Abort {
                        self.aborted
                            .entry(marker.producer_id)
                            .or_default()
                            .push((first, offset));
                    }
                }
            }
        }
        self.applied = offset + 1;
    }

    fn observe_epoch(
        &mut self,
        producer_id: ProducerId,
        epoch: ProducerEpoch,
    ) {
        let current = self.producer_epochs.entry(producer_id).or_insert(epoch);
        if epoch > *current {
            *current = epoch;
        }
    }

    fn last_stable_offset(&self) -> u64 {
        self.open_txns.values().copied().min().unwrap_or(self.applied)
    }

    fn is_aborted(
        &self,
        producer_id: ProducerId,
        offset: u64,
    ) -> bool {
        let Some(ranges) = self.aborted.get(&producer_id) else {
            return false;
        };
        let idx = ranges.partition_point(|(_, last)| *last < offset);
        ranges.get(idx).is_some_and(|(first, _)| *first <= offset)
    }
}

/// One data partition.
///
/// The index is caught up with the log before every read and write, so
/// several instances sharing one replicated log agree on its state.
pub struct PartitionLog {
    tp: TopicPartition,
    log: Arc<dyn ReplicatedLog>,
    versions: Arc<VersionCompatibilityLayer>,
    index: Mutex<PartitionIndex>,
}

impl PartitionLog {
    pub fn new(
        tp: TopicPartition,
        log: Arc<dyn ReplicatedLog>,
        versions: Arc<VersionCompatibilityLayer>,
    ) -> Self {
        Self {
            tp,
            log,
            versions,
            index: Mutex::new(PartitionIndex::default()),
        }
    }

    pub fn topic_partition(&self) -> &TopicPartition {
        &self.tp
    }

    async fn catch_up(
        &self,
        index: &mut PartitionIndex,
    ) -> Result<()> {
        loop {
            let entries = self.log.read(index.applied, REPLAY_BATCH_SIZE).await?;
            if entries.is_empty() {
                return Ok(());
            }
            for e in entries {
                let entry: PartitionEntry = self.versions.decode(&e.payload)?;
                index.apply(e.offset, &entry);
            }
        }
    }

    /// Appends a batch unless its producer was fenced by a newer epoch
    #[instrument(skip(self, batch), fields(tp = %self.tp, pid = batch.producer_id, epoch = batch.producer_epoch))]
    pub async fn produce(
        &self,
        batch: ProduceBatch,
    ) -> Result<u64> {
        if batch.records.is_empty() {
            return Err(PartitionError::InvalidBatch {
                partition: self.tp.to_string(),
                reason: "empty batch".to_string(),
            }
            .into());
        }

        let mut index = self.index.lock().await;
        self.catch_up(&mut index).await?;

        if let Some(current) = index.producer_epochs.get(&batch.producer_id).copied() {
            if batch.producer_epoch < current {
                warn!("rejecting batch from fenced producer (current epoch {})", current);
                FENCED_REQUESTS_TOTAL.with_label_values(&["partition_epoch"]).inc();
                return Err(PartitionError::ProducerFenced {
                    partition: self.tp.to_string(),
                    producer_id: batch.producer_id,
                    current_epoch: current,
                    received_epoch: batch.producer_epoch,
                }
                .into());
            }
        }

        let payload = self.versions.encode(&PartitionEntry::Data(batch))?;
        let offset = self.log.append(None, payload).await?;
        self.catch_up(&mut index).await?;
        Ok(offset)
    }

    /// Writes a control marker.
    ///
    /// A marker from a coordinator epoch below one already applied for the
    /// producer is rejected: it belongs to a deposed coordinator and must not
    /// decide the producer's current transaction.
    ///
    /// Returns `false` without writing when the marker would change nothing:
    /// the producer has no open transaction here and the marker carries no
    /// newer epoch. Re-driven completions rely on this.
    #[instrument(skip(self), fields(tp = %self.tp))]
    pub async fn write_marker(
        &self,
        marker: ControlMarker,
    ) -> Result<bool> {
        let mut index = self.index.lock().await;
        self.catch_up(&mut index).await?;

        if let (Some(received), Some(current)) = (
            marker.coordinator_epoch,
            index.coordinator_epochs.get(&marker.producer_id).copied(),
        ) {
            if received < current {
                warn!(
                    "rejecting marker for producer {} from coordinator epoch {} (current {})",
                    marker.producer_id, received, current
                );
                FENCED_REQUESTS_TOTAL.with_label_values(&["coordinator_epoch"]).inc();
                return Err(PartitionError::CoordinatorFenced {
                    partition: self.tp.to_string(),
                    producer_id: marker.producer_id,
                    current,
                    received,
                }
                .into());
            }
        }

        let has_open_txn = index.open_txns.contains_key(&marker.producer_id);
        let raises_epoch = index
            .producer_epochs
            .get(&marker.producer_id)
            .map_or(true, |current| marker.producer_epoch > *current);
        if !has_open_txn && !raises_epoch {
            debug!("marker for producer {} already applied", marker.producer_id);
            return Ok(false);
        }

        let payload = self.versions.encode(&PartitionEntry::Control(marker))?;
        self.log.append(None, payload).await?;
        self.catch_up(&mut index).await?;
        Ok(true)
    }

    /// Reads up to `max_entries` log entries from `from`, returning the
    /// records of committed and non-transactional batches below the last
    /// stable offset.
    pub async fn read_committed(
        &self,
        from: u64,
        max_entries: usize,
    ) -> Result<FetchResult> {
        let mut index = self.index.lock().await;
        self.catch_up(&mut index).await?;

        let lso = index.last_stable_offset();
        let mut records = Vec::new();
        let mut next_offset = from;

        if from < lso {
            let limit = ((lso - from) as usize).min(max_entries);
            for e in self.log.read(from, limit).await? {
                next_offset = e.offset + 1;
                let batch = match self.versions.decode::<PartitionEntry>(&e.payload)? {
                    PartitionEntry::Data(batch) => batch,
                    PartitionEntry::Control(_) => continue,
                };
                if batch.transactional && index.is_aborted(batch.producer_id, e.offset) {
                    continue;
                }
                records.extend(batch.records.into_iter().map(|r| ConsumedRecord {
                    partition: self.tp.clone(),
                    offset: e.offset,
                    key: r.key,
                    value: r.value,
                }));
            }
        }

        Ok(FetchResult {
            records,
            next_offset,
            last_stable_offset: lso,
        })
    }

    /// Highest epoch this partition has seen for `producer_id`
    pub async fn producer_epoch(
        &self,
        producer_id: ProducerId,
    ) -> Result<Option<ProducerEpoch>> {
        let mut index = self.index.lock().await;
        self.catch_up(&mut index).await?;
        Ok(index.producer_epochs.get(&producer_id).copied())
    }

    pub async fn last_stable_offset(&self) -> Result<u64> {
        let mut index = self.index.lock().await;
        self.catch_up(&mut index).await?;
        Ok(index.last_stable_offset())
    }
}
