use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;
use tracing::info;

use super::transport::call;
use super::CoordinatorTransport;
use crate::BackoffPolicy;
use crate::ClientError;
use crate::ConsumedRecord;
use crate::CoordinatorRequest;
use crate::CoordinatorResponse;
use crate::HeartbeatRequest;
use crate::JoinGroupRequest;
use crate::LeaveGroupRequest;
use crate::LogicalVersion;
use crate::OffsetEntry;
use crate::OffsetFetchRequest;
use crate::PartitionManager;
use crate::Result;
use crate::TopicPartition;

/// What a producer needs to commit offsets on behalf of a group member
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumerGroupMetadata {
    pub group_id: String,
    pub member_id: String,
    pub generation_id: i32,
    pub group_instance_id: Option<String>,
}

/// Group member consuming committed records of its assigned partitions.
///
/// Partition assignment is manual; the group only tracks membership and
/// committed offsets. Positions start at the group's committed offsets when
/// the member joins.
pub struct GroupConsumer {
    group_id: String,
    group_instance_id: Option<String>,
    client_version: Option<LogicalVersion>,
    transport: Arc<dyn CoordinatorTransport>,
    partitions: Arc<PartitionManager>,
    retry: BackoffPolicy,

    membership: Option<(String, i32)>,
    assignment: Vec<TopicPartition>,
    positions: BTreeMap<TopicPartition, u64>,
}

impl GroupConsumer {
    pub fn new(
        group_id: impl Into<String>,
        transport: Arc<dyn CoordinatorTransport>,
        partitions: Arc<PartitionManager>,
        retry: BackoffPolicy,
    ) -> Self {
        Self {
            group_id: group_id.into(),
            group_instance_id: None,
            client_version: None,
            transport,
            partitions,
            retry,
            membership: None,
            assignment: Vec::new(),
            positions: BTreeMap::new(),
        }
    }

    /// Joins as a static member holding `instance_id`
    pub fn group_instance_id(
        mut self,
        instance_id: impl Into<String>,
    ) -> Self {
        self.group_instance_id = Some(instance_id.into());
        self
    }

    pub fn client_version(
        mut self,
        version: LogicalVersion,
    ) -> Self {
        self.client_version = Some(version);
        self
    }

    pub fn assign(
        &mut self,
        partitions: Vec<TopicPartition>,
    ) {
        self.positions.retain(|tp, _| partitions.contains(tp));
        self.assignment = partitions;
    }

    pub fn assignment(&self) -> &[TopicPartition] {
        &self.assignment
    }

    /// Joins the group, or rejoins as a new member after an eviction, and
    /// resets positions to the committed offsets
    pub async fn join(&mut self) -> Result<ConsumerGroupMetadata> {
        let request = CoordinatorRequest::JoinGroup(JoinGroupRequest {
            group_id: self.group_id.clone(),
            member_id: None,
            group_instance_id: self.group_instance_id.clone(),
            client_version: self.client_version,
        });
        if let CoordinatorResponse::JoinGroup {
            member_id,
            generation_id,
            ..
        } = call(self.transport.as_ref(), request, self.retry).await?
        {
            info!(group_id = %self.group_id, %member_id, generation_id, "joined group");
            self.membership = Some((member_id, generation_id));
        }
        self.refresh_positions().await?;
        self.group_metadata()
    }

    /// Refreshes the member's session
    pub async fn heartbeat(&self) -> Result<()> {
        let metadata = self.group_metadata()?;
        let request = CoordinatorRequest::Heartbeat(HeartbeatRequest {
            group_id: metadata.group_id,
            member_id: metadata.member_id,
            generation_id: metadata.generation_id,
            client_version: self.client_version,
        });
        call(self.transport.as_ref(), request, self.retry).await?;
        Ok(())
    }

    /// Picks up the current generation after other members joined or left
    pub async fn refresh_generation(&mut self) -> Result<ConsumerGroupMetadata> {
        let metadata = self.group_metadata()?;
        let request = CoordinatorRequest::JoinGroup(JoinGroupRequest {
            group_id: metadata.group_id,
            member_id: Some(metadata.member_id.clone()),
            group_instance_id: metadata.group_instance_id,
            client_version: self.client_version,
        });
        if let CoordinatorResponse::JoinGroup { generation_id, .. } =
            call(self.transport.as_ref(), request, self.retry).await?
        {
            self.membership = Some((metadata.member_id, generation_id));
        }
        self.group_metadata()
    }

    pub async fn leave(&mut self) -> Result<()> {
        let metadata = self.group_metadata()?;
        let request = CoordinatorRequest::LeaveGroup(LeaveGroupRequest {
            group_id: metadata.group_id,
            member_id: metadata.member_id,
            client_version: self.client_version,
        });
        self.membership = None;
        call(self.transport.as_ref(), request, self.retry).await?;
        Ok(())
    }

    pub fn group_metadata(&self) -> Result<ConsumerGroupMetadata> {
        let (member_id, generation_id) = self.membership.clone().ok_or(ClientError::NotSubscribed)?;
        Ok(ConsumerGroupMetadata {
            group_id: self.group_id.clone(),
            member_id,
            generation_id,
            group_instance_id: self.group_instance_id.clone(),
        })
    }

    /// Committed offsets of the group for its assigned partitions
    pub async fn committed(&self) -> Result<BTreeMap<TopicPartition, u64>> {
        let request = CoordinatorRequest::OffsetFetch(OffsetFetchRequest {
            group_id: self.group_id.clone(),
            partitions: Some(self.assignment.clone()),
            client_version: self.client_version,
        });
        let mut committed = BTreeMap::new();
        if let CoordinatorResponse::OffsetFetch { offsets, .. } =
            call(self.transport.as_ref(), request, self.retry).await?
        {
            for c in offsets {
                committed.insert(c.partition, c.offset.max(0) as u64);
            }
        }
        Ok(committed)
    }

    async fn refresh_positions(&mut self) -> Result<()> {
        let committed = self.committed().await?;
        self.positions = self
            .assignment
            .iter()
            .map(|tp| (tp.clone(), committed.get(tp).copied().unwrap_or(0)))
            .collect();
        debug!(group_id = %self.group_id, "positions reset to {:?}", self.positions);
        Ok(())
    }

    /// Reads committed records from every assigned partition, advancing positions
    pub async fn poll(
        &mut self,
        max_entries: usize,
    ) -> Result<Vec<ConsumedRecord>> {
        let mut records = Vec::new();
        for tp in &self.assignment {
            let from = self.positions.get(tp).copied().unwrap_or(0);
            let fetched = self.partitions.read_committed(tp, from, max_entries).await?;
            self.positions.insert(tp.clone(), fetched.next_offset);
            records.extend(fetched.records);
        }
        Ok(records)
    }

    pub fn position(
        &self,
        tp: &TopicPartition,
    ) -> Option<u64> {
        self.positions.get(tp).copied()
    }

    pub fn seek(
        &mut self,
        tp: &TopicPartition,
        offset: u64,
    ) {
        self.positions.insert(tp.clone(), offset);
    }

    /// Current positions, ready to be sent to a transaction
    pub fn consumed_offsets(&self) -> Vec<OffsetEntry> {
        self.positions
            .iter()
            .map(|(tp, offset)| OffsetEntry::new(tp.clone(), *offset as i64))
            .collect()
    }
}
