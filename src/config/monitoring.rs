use serde::Deserialize;
use serde::Serialize;
use tracing::warn;

use super::invalid;
use crate::Result;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MonitoringConfig {
    #[serde(default = "default_prometheus_enabled")]
    pub prometheus_enabled: bool,

    #[serde(default = "default_prometheus_port")]
    pub prometheus_port: u16,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            prometheus_enabled: default_prometheus_enabled(),
            prometheus_port: default_prometheus_port(),
        }
    }
}

impl MonitoringConfig {
    /// Validates monitoring configuration
    /// # Errors
    /// Returns `Error::Config` when Prometheus is enabled with an invalid port
    pub fn validate(&self) -> Result<()> {
        if self.prometheus_enabled {
            if self.prometheus_port == 0 {
                return Err(invalid("prometheus_port cannot be 0 when enabled"));
            }

            if self.prometheus_port < 1024 {
                return Err(invalid(format!(
                    "prometheus_port {} is a privileged port (requires root)",
                    self.prometheus_port
                )));
            }
        } else if self.prometheus_port != default_prometheus_port() {
            warn!(
                "prometheus_port configured to {} but monitoring is disabled",
                self.prometheus_port
            );
        }

        Ok(())
    }
}

fn default_prometheus_enabled() -> bool {
    false
}

fn default_prometheus_port() -> u16 {
    9090
}
