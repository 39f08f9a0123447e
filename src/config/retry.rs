use serde::Deserialize;
use serde::Serialize;

use super::invalid;
use crate::Result;

/// Basic retry policy template
#[derive(Debug, Serialize, Deserialize, Clone, Copy, Default)]
pub struct BackoffPolicy {
    /// Maximum number of retries (0 means unlimited retries)
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,

    /// Single operation timeout (unit: milliseconds)
    #[serde(default = "default_op_timeout_ms")]
    pub timeout_ms: u64,

    /// Backoff base (unit: milliseconds)
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Maximum backoff time (unit: milliseconds)
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl BackoffPolicy {
    fn validate(
        &self,
        name: &str,
    ) -> Result<()> {
        if self.timeout_ms == 0 {
            return Err(invalid(format!("retry.{name}.timeout_ms must be greater than 0")));
        }
        if self.base_delay_ms > self.max_delay_ms {
            return Err(invalid(format!(
                "retry.{name}.base_delay_ms {} exceeds max_delay_ms {}",
                self.base_delay_ms, self.max_delay_ms
            )));
        }
        Ok(())
    }
}

/// Divide strategies by business domain
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RetryPolicies {
    /// Control marker legs of a transaction completion
    #[serde(default)]
    pub marker_write: BackoffPolicy,

    /// Coordinator log, offsets log and producer id block appends
    #[serde(default)]
    pub log_append: BackoffPolicy,

    /// Client-side retries of retriable coordinator responses
    #[serde(default)]
    pub client_request: BackoffPolicy,
}

impl Default for RetryPolicies {
    fn default() -> Self {
        Self {
            marker_write: BackoffPolicy {
                max_retries: 5,
                timeout_ms: 1000,
                base_delay_ms: 20,
                max_delay_ms: 1000,
            },
            log_append: BackoffPolicy {
                max_retries: 3,
                timeout_ms: 1000,
                base_delay_ms: 20,
                max_delay_ms: 500,
            },
            client_request: BackoffPolicy {
                max_retries: 20,
                timeout_ms: 5000,
                base_delay_ms: 10,
                max_delay_ms: 1000,
            },
        }
    }
}

impl RetryPolicies {
    pub fn validate(&self) -> Result<()> {
        self.marker_write.validate("marker_write")?;
        self.log_append.validate("log_append")?;
        self.client_request.validate("client_request")?;
        Ok(())
    }
}

fn default_max_retries() -> usize {
    3
}
fn default_op_timeout_ms() -> u64 {
    100
}
fn default_base_delay_ms() -> u64 {
    50
}
fn default_max_delay_ms() -> u64 {
    1000
}
