use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;
use tokio::sync::Mutex;
use tracing::debug;
use tracing::info;

use crate::NodeId;
use crate::ReplicatedLog;
use crate::Result;
use crate::TransactionMetadata;
use crate::TxnError;
use crate::TxnLogRecord;
use crate::VersionCompatibilityLayer;
use crate::REPLAY_BATCH_SIZE;
use crate::SHARD_LOADS_TOTAL;

pub type TxnHandle = Arc<Mutex<TransactionMetadata>>;

/// Transactions of a shard rebuilt under one leadership term
pub struct LoadedShard {
    pub term: u64,
    txns: DashMap<String, TxnHandle>,
}

impl LoadedShard {
    pub fn get(
        &self,
        transactional_id: &str,
    ) -> Option<TxnHandle> {
        self.txns.get(transactional_id).map(|h| h.clone())
    }

    pub fn get_or_insert(
        &self,
        transactional_id: &str,
        init: impl FnOnce() -> TransactionMetadata,
    ) -> TxnHandle {
        self.txns
            .entry(transactional_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(init())))
            .clone()
    }

    /// Snapshot of the handles, for background scans
    pub fn handles(&self) -> Vec<TxnHandle> {
        self.txns.iter().map(|e| e.value().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.txns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.txns.is_empty()
    }
}

enum ShardState {
    Unloaded,
    Loading,
    Loaded(Arc<LoadedShard>),
}

/// One `__transaction_state-<n>` log and the transactions it holds.
///
/// The shard is served only while its log names this node as leader. The
/// in-memory view is rebuilt from the log whenever the node gains leadership
/// under a new term.
pub struct TxnShard {
    id: u32,
    log: Arc<dyn ReplicatedLog>,
    versions: Arc<VersionCompatibilityLayer>,
    state: RwLock<ShardState>,
    load_lock: Mutex<()>,
}

impl TxnShard {
    pub fn new(
        id: u32,
        log: Arc<dyn ReplicatedLog>,
        versions: Arc<VersionCompatibilityLayer>,
    ) -> Self {
        Self {
            id,
            log,
            versions,
            state: RwLock::new(ShardState::Unloaded),
            load_lock: Mutex::new(()),
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn log(&self) -> &Arc<dyn ReplicatedLog> {
        &self.log
    }

    /// The loaded view if this node leads the shard, loading it on first use
    pub async fn loaded(
        &self,
        node_id: NodeId,
    ) -> Result<Arc<LoadedShard>> {
        let leadership = self.log.leadership();
        if !leadership.is_leader(node_id) {
            self.unload();
            return Err(TxnError::NotCoordinator {
                shard: self.id,
                node_id,
                leader: leadership.leader,
            }
            .into());
        }
        {
            match &*self.state.read() {
                ShardState::Loaded(s) if s.term == leadership.term => return Ok(s.clone()),
                ShardState::Loading => return Err(TxnError::CoordinatorLoadInProgress(self.id).into()),
                _ => {}
            }
        }
        self.load(leadership.term).await
    }

    /// The loaded view, without loading, if it is still current
    pub fn current(
        &self,
        node_id: NodeId,
    ) -> Option<Arc<LoadedShard>> {
        let leadership = self.log.leadership();
        if !leadership.is_leader(node_id) {
            return None;
        }
        match &*self.state.read() {
            ShardState::Loaded(s) if s.term == leadership.term => Some(s.clone()),
            _ => None,
        }
    }

    pub fn is_loaded(&self) -> bool {
        matches!(&*self.state.read(), ShardState::Loaded(_))
    }

    /// Replays the log under `term`. Concurrent callers get COORDINATOR_LOAD_IN_PROGRESS.
    pub async fn load(
        &self,
        term: u64,
    ) -> Result<Arc<LoadedShard>> {
        let Ok(_guard) = self.load_lock.try_lock() else {
            return Err(TxnError::CoordinatorLoadInProgress(self.id).into());
        };
        {
            let mut state = self.state.write();
            if let ShardState::Loaded(s) = &*state {
                if s.term == term {
                    return Ok(s.clone());
                }
            }
            *state = ShardState::Loading;
        }

        match self.replay().await {
            Ok(txns) => {
                let loaded = Arc::new(LoadedShard { term, txns });
                info!(
                    shard = self.id,
                    term,
                    "loaded {} transactional ids from {}",
                    loaded.len(),
                    self.log.name()
                );
                SHARD_LOADS_TOTAL.with_label_values(&[&self.id.to_string()]).inc();
                *self.state.write() = ShardState::Loaded(loaded.clone());
                Ok(loaded)
            }
            Err(e) => {
                *self.state.write() = ShardState::Unloaded;
                Err(e)
            }
        }
    }

    pub fn unload(&self) {
        let mut state = self.state.write();
        if !matches!(&*state, ShardState::Unloaded) {
            debug!(shard = self.id, "unloading");
            *state = ShardState::Unloaded;
        }
    }

    async fn replay(&self) -> Result<DashMap<String, TxnHandle>> {
        let mut latest: HashMap<String, TxnLogRecord> = HashMap::new();
        let mut from = 0;
        loop {
            let entries = self.log.read(from, REPLAY_BATCH_SIZE).await?;
            if entries.is_empty() {
                break;
            }
            for e in entries {
                let record: TxnLogRecord = self.versions.decode(&e.payload)?;
                from = e.offset + 1;
                latest.insert(record.transactional_id.clone(), record);
            }
        }
        Ok(latest
            .into_iter()
            .map(|(id, record)| (id, Arc::new(Mutex::new(record.into_metadata()))))
            .collect())
    }
}
