// Framework configuration
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::security::SecurityLevel;
use crate::{CourierError, Result};

/// Options supplied at orchestrator construction time.
///
/// This is the whole configuration surface of the core; there are no
/// environment variables or CLI flags.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameworkConfig {
    /// Upper bound on concurrently active agents
    pub max_agents: usize,
    /// Queue size above which the system reports unhealthy
    pub max_queue_size: usize,
    /// Retained communication log entries, oldest evicted
    pub max_log_entries: usize,
    /// Period of the health-check loop
    pub heartbeat_interval: Duration,
    pub security_level: SecurityLevel,
    /// Whether the performance monitor samples in the background
    pub performance_monitoring: bool,
}

impl Default for FrameworkConfig {
    fn default() -> Self {
        Self {
            max_agents: 50,
            max_queue_size: 1000,
            max_log_entries: 500,
            heartbeat_interval: Duration::from_secs(30),
            security_level: SecurityLevel::Standard,
            performance_monitoring: true,
        }
    }
}

impl FrameworkConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_agents == 0 {
            return Err(CourierError::InvalidConfiguration(
                "max_agents must be greater than 0".into(),
            ));
        }
        if self.max_queue_size == 0 {
            return Err(CourierError::InvalidConfiguration(
                "max_queue_size must be greater than 0".into(),
            ));
        }
        if self.max_log_entries == 0 {
            return Err(CourierError::InvalidConfiguration(
                "max_log_entries must be greater than 0".into(),
            ));
        }
        if self.heartbeat_interval.is_zero() {
            return Err(CourierError::InvalidConfiguration(
                "heartbeat_interval must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}
