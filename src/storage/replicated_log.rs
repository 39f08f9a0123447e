//! The replicated log every coordinator structure is persisted to.
//!
//! An append returns only once the entry is durable on a quorum. Leadership is
//! per log: the coordinator serves a shard only while the shard's log names
//! this node as leader, and it stamps each append with the term it loaded the
//! shard under so a deposed leader cannot write.

#[cfg(test)]
use mockall::automock;
use async_trait::async_trait;
use serde::Deserialize;
use serde::Serialize;
use tokio::sync::watch;

use crate::NodeId;
use crate::Result;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub offset: u64,
    /// Leadership term the entry was appended under
    pub term: u64,
    pub payload: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LeadershipState {
    pub term: u64,
    pub leader: Option<NodeId>,
}

impl LeadershipState {
    pub fn is_leader(
        &self,
        node_id: NodeId,
    ) -> bool {
        self.leader == Some(node_id)
    }
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait ReplicatedLog: Send + Sync + 'static {
    fn name(&self) -> String;

    fn leadership(&self) -> LeadershipState;

    /// Fires on every leadership change of this log
    fn subscribe_leadership(&self) -> watch::Receiver<LeadershipState>;

    /// Appends `payload` and waits for the quorum ack.
    ///
    /// With `expected_term` set the append is rejected unless the log is still
    /// in that term. Returns the offset of the new entry.
    async fn append(
        &self,
        expected_term: Option<u64>,
        payload: Vec<u8>,
    ) -> Result<u64>;

    /// Reads up to `max` entries starting at `from`
    async fn read(
        &self,
        from: u64,
        max: usize,
    ) -> Result<Vec<LogEntry>>;

    /// Offset the next append will receive
    fn end_offset(&self) -> u64;
}
