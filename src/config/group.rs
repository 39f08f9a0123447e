use serde::Deserialize;
use serde::Serialize;

use super::invalid;
use crate::Result;

/// Consumer group session parameters
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GroupConfig {
    /// Members without a heartbeat for this long are evicted
    #[serde(default = "default_session_timeout_ms")]
    pub session_timeout_ms: u64,

    /// Period of the eviction sweep
    #[serde(default = "default_member_expiry_interval_ms")]
    pub member_expiry_interval_ms: u64,
}

impl Default for GroupConfig {
    fn default() -> Self {
        Self {
            session_timeout_ms: default_session_timeout_ms(),
            member_expiry_interval_ms: default_member_expiry_interval_ms(),
        }
    }
}

impl GroupConfig {
    pub fn validate(&self) -> Result<()> {
        if self.session_timeout_ms == 0 {
            return Err(invalid("group.session_timeout_ms must be greater than 0"));
        }
        if self.member_expiry_interval_ms == 0 || self.member_expiry_interval_ms > self.session_timeout_ms {
            return Err(invalid(format!(
                "group.member_expiry_interval_ms {} must be in (0, session_timeout_ms]",
                self.member_expiry_interval_ms
            )));
        }
        Ok(())
    }
}

fn default_session_timeout_ms() -> u64 {
    45_000
}
fn default_member_expiry_interval_ms() -> u64 {
    3_000
}
