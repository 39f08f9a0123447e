use std::collections::HashSet;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;

use super::invalid;
use super::validate_directory;
use crate::LogicalVersion;
use crate::NodeId;
use crate::Result;

/// A peer known at startup together with the logical version it advertises
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ClusterMember {
    pub id: NodeId,
    pub logical_version: u16,
}

/// Cluster node configuration parameters
///
/// Field-level defaults use helper functions prefixed with `default_`.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ClusterConfig {
    /// Unique node identifier in cluster
    #[serde(default = "default_node_id")]
    pub node_id: NodeId,

    /// Logical version this binary advertises to its peers
    ///
    /// Default: the newest version the binary understands. Operators pin an
    /// older value while a rolling upgrade is in progress.
    #[serde(default = "default_logical_version")]
    pub logical_version: u16,

    /// Peers known at startup. Empty means a single-node cluster.
    #[serde(default)]
    pub initial_cluster: Vec<ClusterMember>,

    /// Database storage root directory
    #[serde(default = "default_db_dir")]
    pub db_root_dir: PathBuf,

    /// Log files output directory
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            node_id: default_node_id(),
            logical_version: default_logical_version(),
            initial_cluster: vec![],
            db_root_dir: default_db_dir(),
            log_dir: default_log_dir(),
        }
    }
}

impl ClusterConfig {
    pub fn validate(&self) -> Result<()> {
        if self.node_id == 0 {
            return Err(invalid("node_id cannot be 0 (reserved for invalid nodes)"));
        }

        let version = LogicalVersion(self.logical_version);
        if !version.is_supported() {
            return Err(invalid(format!(
                "logical_version {} outside the supported range [{}, {}]",
                self.logical_version,
                LogicalVersion::MIN_SUPPORTED,
                LogicalVersion::CURRENT
            )));
        }

        let mut ids = HashSet::new();
        for member in &self.initial_cluster {
            if !ids.insert(member.id) {
                return Err(invalid(format!(
                    "Duplicate node_id {} in initial_cluster",
                    member.id
                )));
            }
        }

        validate_directory(&self.db_root_dir, "db_root_dir")?;
        validate_directory(&self.log_dir, "log_dir")?;

        Ok(())
    }
}

fn default_node_id() -> NodeId {
    1
}
fn default_logical_version() -> u16 {
    LogicalVersion::CURRENT.0
}
fn default_db_dir() -> PathBuf {
    PathBuf::from("/tmp/d-txn/db")
}
fn default_log_dir() -> PathBuf {
    PathBuf::from("./logs")
}
