use std::sync::Arc;

use dashmap::DashMap;

use crate::ControlMarker;
use crate::FetchResult;
use crate::LogFactory;
use crate::PartitionError;
use crate::PartitionLog;
use crate::ProduceBatch;
use crate::Result;
use crate::TopicPartition;
use crate::VersionCompatibilityLayer;

/// Opens data partitions lazily through the log factory
pub struct PartitionManager {
    factory: Arc<dyn LogFactory>,
    versions: Arc<VersionCompatibilityLayer>,
    partitions: DashMap<TopicPartition, Arc<PartitionLog>>,
}

impl PartitionManager {
    pub fn new(
        factory: Arc<dyn LogFactory>,
        versions: Arc<VersionCompatibilityLayer>,
    ) -> Self {
        Self {
            factory,
            versions,
            partitions: DashMap::new(),
        }
    }

    pub fn partition(
        &self,
        tp: &TopicPartition,
    ) -> Result<Arc<PartitionLog>> {
        if let Some(p) = self.partitions.get(tp) {
            return Ok(p.clone());
        }
        let log = self.factory.open(&tp.log_name())?;
        let partition = self
            .partitions
            .entry(tp.clone())
            .or_insert_with(|| Arc::new(PartitionLog::new(tp.clone(), log, self.versions.clone())))
            .clone();
        Ok(partition)
    }

    /// Appends a batch to a user partition
    pub async fn produce(
        &self,
        tp: &TopicPartition,
        batch: ProduceBatch,
    ) -> Result<u64> {
        if tp.is_internal() {
            return Err(PartitionError::InternalTopic(tp.topic.clone()).into());
        }
        self.partition(tp)?.produce(batch).await
    }

    pub async fn write_marker(
        &self,
        tp: &TopicPartition,
        marker: ControlMarker,
    ) -> Result<bool> {
        self.partition(tp)?.write_marker(marker).await
    }

    pub async fn read_committed(
        &self,
        tp: &TopicPartition,
        from: u64,
        max_entries: usize,
    ) -> Result<FetchResult> {
        self.partition(tp)?.read_committed(from, max_entries).await
    }
}
