use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::debug;
use tracing::info;

use crate::LeadershipState;
use crate::LogEntry;
use crate::LogError;
use crate::NodeId;
use crate::ReplicatedLog;
use crate::Result;
use crate::StorageError;

const TERMS_TREE: &str = "__log_terms";

/// Trees of the database that are bookkeeping rather than logs
pub(crate) fn is_internal_tree(name: &str) -> bool {
    name == TERMS_TREE || name.starts_with("__sled__")
}

/// Single-node replicated log on top of a sled tree.
///
/// The local node is the only replica and therefore always the leader; every
/// reopen starts a new term so that appends stamped by a previous process
/// incarnation are rejected.
pub struct SledReplicatedLog {
    name: String,
    tree: sled::Tree,
    next_offset: AtomicU64,
    append_lock: Mutex<()>,
    leadership_tx: watch::Sender<LeadershipState>,
}

impl std::fmt::Debug for SledReplicatedLog {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("SledReplicatedLog")
            .field("name", &self.name)
            .field("next_offset", &self.next_offset.load(Ordering::Acquire))
            .finish()
    }
}

impl SledReplicatedLog {
    pub fn open(
        db: &sled::Db,
        name: &str,
        node_id: NodeId,
    ) -> Result<Self> {
        let tree = db.open_tree(name)?;
        let next_offset = match tree.last()? {
            Some((key, _)) => decode_offset(&key)? + 1,
            None => 0,
        };

        let terms = db.open_tree(TERMS_TREE)?;
        let term = match terms.get(name)? {
            Some(v) => decode_offset(&v)? + 1,
            None => 1,
        };
        terms.insert(name, term.to_be_bytes().to_vec())?;

        info!("opened log {} at offset {} in term {}", name, next_offset, term);

        let (leadership_tx, _) = watch::channel(LeadershipState {
            term,
            leader: Some(node_id),
        });

        Ok(Self {
            name: name.to_string(),
            tree,
            next_offset: AtomicU64::new(next_offset),
            append_lock: Mutex::new(()),
            leadership_tx,
        })
    }
}

fn decode_offset(bytes: &[u8]) -> Result<u64> {
    let arr: [u8; 8] = bytes.try_into().map_err(|_| StorageError::DataCorruption {
        location: format!("log key of {} bytes", bytes.len()),
    })?;
    Ok(u64::from_be_bytes(arr))
}

#[async_trait]
impl ReplicatedLog for SledReplicatedLog {
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
        let term = self.leadership().term;
        if let Some(expected) = expected_term {
            if expected != term {
                return Err(LogError::StaleTerm {
                    log: self.name.clone(),
                    expected,
                    current: term,
                }
                .into());
            }
        }

        let offset = {
            let _guard = self.append_lock.lock();
            let offset = self.next_offset.load(Ordering::Acquire);
            let entry = LogEntry { offset, term, payload };
            self.tree.insert(offset.to_be_bytes(), bincode::serialize(&entry)?)?;
            self.next_offset.store(offset + 1, Ordering::Release);
            offset
        };

        self.tree.flush_async().await?;
        debug!("{}: appended offset {}", self.name, offset);
        Ok(offset)
    }

    async fn read(
        &self,
        from: u64,
        max: usize,
    ) -> Result<Vec<LogEntry>> {
        let mut entries = Vec::new();
        for item in self.tree.range(from.to_be_bytes()..).take(max) {
            let (_, value) = item?;
            entries.push(bincode::deserialize(&value)?);
        }
        Ok(entries)
    }

    fn end_offset(&self) -> u64 {
        self.next_offset.load(Ordering::Acquire)
    }
}
