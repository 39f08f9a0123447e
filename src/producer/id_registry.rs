//! Cluster-wide producer id allocation.
//!
//! Ids are handed out from blocks reserved in the `__producer_id_blocks` log.
//! Nodes race to append blocks; the log order decides. A block is valid only
//! if it starts exactly at the high-water mark left by the valid blocks before
//! it, so two nodes can never serve the same id.

use std::sync::Arc;

use serde::Deserialize;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::debug;
use tracing::info;

use crate::utils::async_task::task_with_timeout_and_exponential_backoff;
use crate::BackoffPolicy;
use crate::LogicalVersion;
use crate::NodeId;
use crate::ProducerId;
use crate::ReplicatedLog;
use crate::Result;
use crate::VersionCompatibilityLayer;
use crate::VersionedRecord;
use crate::REPLAY_BATCH_SIZE;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProducerIdBlock {
    pub start: ProducerId,
    pub len: i64,
    pub owner: NodeId,
}

impl ProducerIdBlock {
    pub fn end(&self) -> ProducerId {
        self.start + self.len
    }
}

impl VersionedRecord for ProducerIdBlock {
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

#[derive(Debug, Default)]
struct Allocator {
    applied: u64,
    /// First id not covered by any valid block
    high_water: ProducerId,
    /// Remaining ids of the block this node is serving from
    next: ProducerId,
    end: ProducerId,
    /// Offset of our own block append awaiting replay
    pending: Option<u64>,
}

pub struct ProducerIdRegistry {
    node_id: NodeId,
    block_size: i64,
    log: Arc<dyn ReplicatedLog>,
    versions: Arc<VersionCompatibilityLayer>,
    retry: BackoffPolicy,
    allocator: Mutex<Allocator>,
}

impl ProducerIdRegistry {
    pub fn new(
        node_id: NodeId,
        block_size: i64,
        log: Arc<dyn ReplicatedLog>,
        versions: Arc<VersionCompatibilityLayer>,
        retry: BackoffPolicy,
    ) -> Self {
        Self {
            node_id,
            block_size,
            log,
            versions,
            retry,
            allocator: Mutex::new(Allocator::default()),
        }
    }

    /// Returns a producer id never handed out before by any node
    pub async fn next_producer_id(&self) -> Result<ProducerId> {
        let mut alloc = self.allocator.lock().await;
        while alloc.next >= alloc.end {
            self.reserve_block(&mut alloc).await?;
        }
        let id = alloc.next;
        alloc.next += 1;
        Ok(id)
    }

    /// Highest id reserved cluster-wide so far
    pub async fn high_water_mark(&self) -> Result<ProducerId> {
        let mut alloc = self.allocator.lock().await;
        self.catch_up(&mut alloc).await?;
        Ok(alloc.high_water)
    }

    async fn reserve_block(
        &self,
        alloc: &mut Allocator,
    ) -> Result<()> {
        self.catch_up(alloc).await?;

        let candidate = ProducerIdBlock {
            start: alloc.high_water,
            len: self.block_size,
            owner: self.node_id,
        };
        let payload = self.versions.encode(&candidate)?;
        let offset = task_with_timeout_and_exponential_backoff(
            "reserve_producer_id_block",
            || self.log.append(None, payload.clone()),
            self.retry,
        )
        .await?;

        alloc.pending = Some(offset);
        self.catch_up(alloc).await?;
        alloc.pending = None;
        if alloc.next >= alloc.end {
            debug!("producer id block at offset {} lost the race, retrying", offset);
        }
        Ok(())
    }

    async fn catch_up(
        &self,
        alloc: &mut Allocator,
    ) -> Result<()> {
        loop {
            let entries = self.log.read(alloc.applied, REPLAY_BATCH_SIZE).await?;
            if entries.is_empty() {
                return Ok(());
            }
            for e in entries {
                let block: ProducerIdBlock = self.versions.decode(&e.payload)?;
                let valid = block.start == alloc.high_water;
                if valid {
                    alloc.high_water = block.end();
                }
                if valid && alloc.pending == Some(e.offset) {
                    info!(
                        "node {} serving producer ids [{}, {})",
                        self.node_id,
                        block.start,
                        block.end()
                    );
                    alloc.next = block.start;
                    alloc.end = block.end();
                }
                alloc.applied = e.offset + 1;
            }
        }
    }
}
