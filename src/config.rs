use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::collab::CapabilityProfile;
use crate::error::{BoardError, Result};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BoardConfig {
    pub session: SessionConfig,
    pub batch: BatchConfig,
    pub planner: PlannerConfig,
    pub health: HealthConfig,

    /// Actor name -> declared capability profile. Seeds the registry at
    /// startup; actors absent from the table check in with an empty
    /// profile.
    pub capabilities: HashMap<String, CapabilityProfile>,
}

impl BoardConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .map_err(|e| BoardError::Config(format!("read {}: {}", path.display(), e)))?;
            toml::from_str(&content).map_err(|e| BoardError::Config(e.to_string()))?
        } else {
            Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        self.validate()?;
        let content =
            toml::to_string_pretty(self).map_err(|e| BoardError::Config(e.to_string()))?;
        std::fs::write(path, content)
            .map_err(|e| BoardError::Config(format!("write {}: {}", path.display(), e)))?;
        Ok(())
    }

    /// Validate configuration values for consistency and safety.
    pub fn validate(&self) -> Result<()> {
        let mut errors = Vec::new();

        if self.session.staleness_secs == 0 {
            errors.push("session.staleness_secs must be greater than 0");
        }
        if self.batch.max_tasks == 0 {
            errors.push("batch.max_tasks must be greater than 0");
        }
        if self.batch.provider_timeout_secs == 0 {
            errors.push("batch.provider_timeout_secs must be greater than 0");
        }
        if self.planner.timeout_secs == 0 {
            errors.push("planner.timeout_secs must be greater than 0");
        }
        if self.planner.max_subtasks == 0 {
            errors.push("planner.max_subtasks must be greater than 0");
        }
        if self.health.stale_task_secs == 0 {
            errors.push("health.stale_task_secs must be greater than 0");
        }
        if !(0.0..=1.0).contains(&self.health.degraded_below) {
            errors.push("health.degraded_below must be within [0.0, 1.0]");
        }
        if !(0.0..=1.0).contains(&self.health.critical_below) {
            errors.push("health.critical_below must be within [0.0, 1.0]");
        }
        if self.health.critical_below > self.health.degraded_below {
            errors.push("health.critical_below must not exceed health.degraded_below");
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(BoardError::Config(errors.join("; ")))
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Heartbeat silence after which a session is reaped and its locks
    /// released.
    pub staleness_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self { staleness_secs: 120 }
    }
}

impl SessionConfig {
    pub fn staleness(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.staleness_secs as i64)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Upper bound on members pulled into one batch window.
    pub max_tasks: usize,
    pub provider_timeout_secs: u64,
    /// Suggested cadence for `poll_batches`; the sweep itself is driven by
    /// the embedding process.
    pub poll_interval_secs: u64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_tasks: 10,
            provider_timeout_secs: 30,
            poll_interval_secs: 60,
        }
    }
}

impl BatchConfig {
    pub fn provider_timeout(&self) -> Duration {
        Duration::from_secs(self.provider_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    pub timeout_secs: u64,
    pub max_subtasks: usize,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 60,
            max_subtasks: 20,
        }
    }
}

impl PlannerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    /// In-progress tasks untouched for longer than this count as stale.
    pub stale_task_secs: u64,

    pub stale_task_penalty: f64,
    pub unassigned_urgent_penalty: f64,
    pub missing_artifact_penalty: f64,
    pub failed_batch_penalty: f64,

    /// Score thresholds for the summary's status band.
    pub degraded_below: f64,
    pub critical_below: f64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            stale_task_secs: 600,
            stale_task_penalty: 0.15,
            unassigned_urgent_penalty: 0.10,
            missing_artifact_penalty: 0.10,
            failed_batch_penalty: 0.10,
            degraded_below: 0.8,
            critical_below: 0.5,
        }
    }
}

impl HealthConfig {
    pub fn stale_after(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.stale_task_secs as i64)
    }
}
