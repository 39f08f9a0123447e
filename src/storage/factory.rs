use std::sync::Arc;

use dashmap::DashMap;

use crate::MemReplicatedLog;
use crate::NodeId;
use crate::ReplicatedLog;
use crate::Result;
use crate::SledReplicatedLog;

use super::sled_log::is_internal_tree;

/// Opens replicated logs by name
pub trait LogFactory: Send + Sync + 'static {
    /// Returns the log called `name`, creating it on first use.
    /// Repeated calls return the same log.
    fn open(
        &self,
        name: &str,
    ) -> Result<Arc<dyn ReplicatedLog>>;

    /// Names of every log that exists, opened or not
    fn log_names(&self) -> Result<Vec<String>>;
}

/// Shared in-memory logs.
///
/// Cloning the factory shares the logs, so nodes built from clones of one
/// factory form a simulated cluster.
#[derive(Clone)]
pub struct MemLogFactory {
    logs: Arc<DashMap<String, Arc<MemReplicatedLog>>>,
    initial_leader: Option<NodeId>,
}

impl MemLogFactory {
    /// Logs created by this factory start in term 1 led by `initial_leader`
    pub fn new(initial_leader: Option<NodeId>) -> Self {
        Self {
            logs: Arc::new(DashMap::new()),
            initial_leader,
        }
    }

    pub fn mem_log(
        &self,
        name: &str,
    ) -> Arc<MemReplicatedLog> {
        self.logs
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(MemReplicatedLog::new(name, self.initial_leader)))
            .clone()
    }

    pub fn get_mem(
        &self,
        name: &str,
    ) -> Option<Arc<MemReplicatedLog>> {
        self.logs.get(name).map(|l| l.clone())
    }

    /// Names of every log opened so far
    pub fn log_names(&self) -> Vec<String> {
        self.logs.iter().map(|e| e.key().clone()).collect()
    }
}

impl LogFactory for MemLogFactory {
    fn open(
        &self,
        name: &str,
    ) -> Result<Arc<dyn ReplicatedLog>> {
        Ok(self.mem_log(name))
    }

    fn log_names(&self) -> Result<Vec<String>> {
        Ok(MemLogFactory::log_names(self))
    }
}

/// Logs stored as trees of one sled database
pub struct SledLogFactory {
    db: sled::Db,
    node_id: NodeId,
    logs: DashMap<String, Arc<SledReplicatedLog>>,
}

impl SledLogFactory {
    pub fn new(
        db: sled::Db,
        node_id: NodeId,
    ) -> Self {
        Self {
            db,
            node_id,
            logs: DashMap::new(),
        }
    }
}

impl LogFactory for SledLogFactory {
    fn open(
        &self,
        name: &str,
    ) -> Result<Arc<dyn ReplicatedLog>> {
        if let Some(log) = self.logs.get(name) {
            return Ok(log.clone());
        }
        let log = self
            .logs
            .entry(name.to_string())
            .or_try_insert_with(|| SledReplicatedLog::open(&self.db, name, self.node_id).map(Arc::new))?
            .clone();
        Ok(log)
    }

    fn log_names(&self) -> Result<Vec<String>> {
        Ok(self
            .db
            .tree_names()
            .into_iter()
            .map(|name| String::from_utf8_lossy(&name).into_owned())
            .filter(|name| !is_internal_tree(name))
            .collect())
    }
}
