use serde::Deserialize;
use serde::Serialize;

use super::invalid;
use crate::Result;

/// Transaction coordinator parameters
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TransactionConfig {
    /// Number of coordinator shards. Each shard is one `__transaction_state-<n>` log.
    ///
    /// Changing this value re-routes transactional ids; it must stay fixed for
    /// the lifetime of a cluster.
    #[serde(default = "default_num_shards")]
    pub num_shards: u32,

    /// Timeout applied when a producer does not request one
    #[serde(default = "default_timeout_ms")]
    pub default_timeout_ms: u64,

    /// Upper bound for client-requested transaction timeouts
    #[serde(default = "default_max_timeout_ms")]
    pub max_timeout_ms: u64,

    /// Period of the background task that aborts expired transactions and
    /// re-drives stuck completions
    #[serde(default = "default_expiration_check_interval_ms")]
    pub expiration_check_interval_ms: u64,

    /// Number of producer ids reserved per append to the id block log
    #[serde(default = "default_producer_id_block_size")]
    pub producer_id_block_size: i64,
}

impl Default for TransactionConfig {
    fn default() -> Self {
        Self {
            num_shards: default_num_shards(),
            default_timeout_ms: default_timeout_ms(),
            max_timeout_ms: default_max_timeout_ms(),
            expiration_check_interval_ms: default_expiration_check_interval_ms(),
            producer_id_block_size: default_producer_id_block_size(),
        }
    }
}

impl TransactionConfig {
    pub fn validate(&self) -> Result<()> {
        if self.num_shards == 0 {
            return Err(invalid("transaction.num_shards must be at least 1"));
        }
        if self.default_timeout_ms == 0 {
            return Err(invalid("transaction.default_timeout_ms must be greater than 0"));
        }
        if self.default_timeout_ms > self.max_timeout_ms {
            return Err(invalid(format!(
                "transaction.default_timeout_ms {} exceeds max_timeout_ms {}",
                self.default_timeout_ms, self.max_timeout_ms
            )));
        }
        if self.expiration_check_interval_ms == 0 {
            return Err(invalid(
                "transaction.expiration_check_interval_ms must be greater than 0",
            ));
        }
        if self.producer_id_block_size <= 0 {
            return Err(invalid("transaction.producer_id_block_size must be positive"));
        }
        Ok(())
    }
}

fn default_num_shards() -> u32 {
    4
}
fn default_timeout_ms() -> u64 {
    60_000
}
fn default_max_timeout_ms() -> u64 {
    900_000
}
fn default_expiration_check_interval_ms() -> u64 {
    10_000
}
fn default_producer_id_block_size() -> i64 {
    1000
}
