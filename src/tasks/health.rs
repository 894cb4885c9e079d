//! Deterministic board health scoring.
//!
//! `summarize` is a pure function of a prepared snapshot so the scoring is
//! directly testable; gathering the snapshot (store reads, artifact path
//! checks) happens in the manager.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::HealthConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Critical,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchStats {
    pub pending: usize,
    pub submitted: usize,
    pub completed: usize,
    pub failed: usize,
}

impl BatchStats {
    pub fn open(&self) -> usize {
        self.pending + self.submitted
    }
}

/// Everything the score depends on, gathered at one instant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoardSnapshot {
    pub taken_at: DateTime<Utc>,
    /// In-progress tasks with no update inside the staleness window.
    pub stale_tasks: Vec<String>,
    /// High/critical tasks nobody has picked up.
    pub unassigned_urgent: Vec<String>,
    /// Tasks whose artifacts_path points at nothing on disk.
    pub missing_artifacts: Vec<String>,
    pub batch: BatchStats,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthSummary {
    pub score: f64,
    pub status: HealthStatus,
    pub stale_task_count: usize,
    pub unassigned_urgent_count: usize,
    pub missing_artifact_count: usize,
    pub batch: BatchStats,
    pub taken_at: DateTime<Utc>,
}

/// Score the snapshot: start from 1.0, subtract a configured penalty per
/// finding, clamp to [0, 1]. No side effects.
pub fn summarize(snapshot: &BoardSnapshot, config: &HealthConfig) -> HealthSummary {
    let penalty = snapshot.stale_tasks.len() as f64 * config.stale_task_penalty
        + snapshot.unassigned_urgent.len() as f64 * config.unassigned_urgent_penalty
        + snapshot.missing_artifacts.len() as f64 * config.missing_artifact_penalty
        + snapshot.batch.failed as f64 * config.failed_batch_penalty;
    let score = (1.0 - penalty).clamp(0.0, 1.0);

    let status = if score < config.critical_below {
        HealthStatus::Critical
    } else if score < config.degraded_below {
        HealthStatus::Degraded
    } else {
        HealthStatus::Healthy
    };

    HealthSummary {
        score,
        status,
        stale_task_count: snapshot.stale_tasks.len(),
        unassigned_urgent_count: snapshot.unassigned_urgent.len(),
        missing_artifact_count: snapshot.missing_artifacts.len(),
        batch: snapshot.batch,
        taken_at: snapshot.taken_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_snapshot() -> BoardSnapshot {
        BoardSnapshot {
            taken_at: Utc::now(),
            stale_tasks: Vec::new(),
            unassigned_urgent: Vec::new(),
            missing_artifacts: Vec::new(),
            batch: BatchStats::default(),
        }
    }

    #[test]
    fn clean_board_scores_one() {
        let summary = summarize(&empty_snapshot(), &HealthConfig::default());
        assert!((summary.score - 1.0).abs() < f64::EPSILON);
        assert_eq!(summary.status, HealthStatus::Healthy);
    }

    #[test]
    fn findings_subtract_configured_penalties() {
        let mut snapshot = empty_snapshot();
        snapshot.stale_tasks = vec!["t1".to_string()];
        snapshot.unassigned_urgent = vec!["t2".to_string(), "t3".to_string()];

        let config = HealthConfig::default();
        let summary = summarize(&snapshot, &config);

        let expected =
            1.0 - config.stale_task_penalty - 2.0 * config.unassigned_urgent_penalty;
        assert!((summary.score - expected).abs() < 1e-9);
        assert_eq!(summary.status, HealthStatus::Degraded);
    }

    #[test]
    fn score_is_clamped_at_zero() {
        let mut snapshot = empty_snapshot();
        snapshot.stale_tasks = (0..50).map(|i| format!("t{i}")).collect();

        let summary = summarize(&snapshot, &HealthConfig::default());
        assert_eq!(summary.score, 0.0);
        assert_eq!(summary.status, HealthStatus::Critical);
    }

    #[test]
    fn scoring_is_deterministic() {
        let mut snapshot = empty_snapshot();
        snapshot.missing_artifacts = vec!["t9".to_string()];
        snapshot.batch.failed = 1;

        let config = HealthConfig::default();
        let first = summarize(&snapshot, &config);
        let second = summarize(&snapshot, &config);
        assert_eq!(first.score, second.score);
        assert_eq!(first.status, second.status);
    }
}
