use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::watch;
use tracing::debug;
use tracing::info;

use crate::LeadershipState;
use crate::LogEntry;
use crate::LogError;
use crate::NodeId;
use crate::ReplicatedLog;
use crate::Result;

/// In-memory replicated log.
///
/// One instance is shared by every simulated node, which makes it behave like
/// a log with perfect replication. Leadership, quorum loss and transient append
/// failures are driven explicitly.
pub struct MemReplicatedLog {
    name: String,
    entries: RwLock<Vec<LogEntry>>,
    leadership_tx: watch::Sender<LeadershipState>,
    quorum_available: AtomicBool,
    injected_failures: AtomicUsize,
}

impl MemReplicatedLog {
    pub fn new(
        name: impl Into<String>,
        initial_leader: Option<NodeId>,
    ) -> Self {
        let leadership = LeadershipState {
            term: if initial_leader.is_some() { 1 } else { 0 },
            leader: initial_leader,
        };
        let (leadership_tx, _) = watch::channel(leadership);
        Self {
            name: name.into(),
            entries: RwLock::new(Vec::new()),
            leadership_tx,
            quorum_available: AtomicBool::new(true),
            injected_failures: AtomicUsize::new(0),
        }
    }

    /// Starts a new term led by `node_id`
    pub fn elect(
        &self,
        node_id: NodeId,
    ) -> LeadershipState {
        let mut next = LeadershipState::default();
        self.leadership_tx.send_modify(|s| {
            s.term += 1;
            s.leader = Some(node_id);
            next = *s;
        });
        info!("{}: node {} elected in term {}", self.name, node_id, next.term);
        next
    }

    /// Leaves the log leaderless without starting a new term
    pub fn step_down(&self) {
        self.leadership_tx.send_modify(|s| s.leader = None);
    }

    pub fn set_quorum_available(
        &self,
        available: bool,
    ) {
        self.quorum_available.store(available, Ordering::SeqCst);
    }

    /// The next `count` appends fail with a quorum error
    pub fn inject_append_failures(
        &self,
        count: usize,
    ) {
        self.injected_failures.store(count, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    fn take_injected_failure(&self) -> bool {
        self.injected_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl ReplicatedLog for MemReplicatedLog {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn leadership(&self) -> LeadershipState {
        *self.leadership_tx.borrow()
    }

    fn subscribe_leadership(&self) -> watch::Receiver<LeadershipState> {
        self.leadership_tx.subscribe()
    }

    async fn append(
        &self,
        expected_term: Option<u64>,
        payload: Vec<u8>,
    ) -> Result<u64> {
        if !self.quorum_available.load(Ordering::SeqCst) || self.take_injected_failure() {
            return Err(LogError::QuorumLost {
                log: self.name.clone(),
            }
            .into());
        }

        let leadership = self.leadership();
        if let Some(expected) = expected_term {
            if expected != leadership.term {
                return Err(LogError::StaleTerm {
                    log: self.name.clone(),
                    expected,
                    current: leadership.term,
                }
                .into());
            }
            if leadership.leader.is_none() {
                return Err(LogError::NotLeader {
                    log: self.name.clone(),
                    leader: None,
                    term: leadership.term,
                }
                .into());
            }
        }

        let mut entries = self.entries.write();
        let offset = entries.len() as u64;
        entries.push(LogEntry {
            offset,
            term: leadership.term,
            payload,
        });
        debug!("{}: appended offset {} in term {}", self.name, offset, leadership.term);
        Ok(offset)
    }

    async fn read(
        &self,
        from: u64,
        max: usize,
    ) -> Result<Vec<LogEntry>> {
        let entries = self.entries.read();
        let start = (from as usize).min(entries.len());
        let end = start.saturating_add(max).min(entries.len());
        Ok(entries[start..end].to_vec())
    }

    fn end_offset(&self) -> u64 {
        self.entries.read().len() as u64
    }
}
