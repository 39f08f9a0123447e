use serde::Deserialize;
use serde::Serialize;

use super::invalid;
use crate::Result;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct OffsetsConfig {
    /// Number of `__consumer_offsets-<n>` logs. Fixed for the lifetime of a cluster.
    #[serde(default = "default_num_partitions")]
    pub num_partitions: u32,
}

impl Default for OffsetsConfig {
    fn default() -> Self {
        Self {
            num_partitions: default_num_partitions(),
        }
    }
}

impl OffsetsConfig {
    pub fn validate(&self) -> Result<()> {
        if self.num_partitions == 0 {
            return Err(invalid("offsets.num_partitions must be at least 1"));
        }
        Ok(())
    }
}

fn default_num_partitions() -> u32 {
    8
}
