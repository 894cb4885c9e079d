use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    #[default]
    Pending,
    Submitted,
    Completed,
    Failed,
}

impl BatchStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// One batch window: a group of tasks handed to the external bulk processor
/// under a single provider-issued id. Each member task is owned by at most
/// one open batch job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchJob {
    pub batch_id: String,
    pub task_ids: Vec<String>,
    pub status: BatchStatus,
    pub submitted_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,

    /// Opaque provider-side details (queue name, cost estimate, ...).
    #[serde(default)]
    pub provider_metadata: serde_json::Value,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BatchJob {
    pub fn new(batch_id: impl Into<String>, task_ids: Vec<String>, now: DateTime<Utc>) -> Self {
        Self {
            batch_id: batch_id.into(),
            task_ids,
            status: BatchStatus::Pending,
            submitted_at: None,
            completed_at: None,
            provider_metadata: serde_json::Value::Null,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn mark_submitted(&mut self, now: DateTime<Utc>) {
        self.status = BatchStatus::Submitted;
        self.submitted_at = Some(now);
        self.updated_at = now;
    }

    pub fn mark_completed(&mut self, now: DateTime<Utc>) {
        self.status = BatchStatus::Completed;
        self.completed_at = Some(now);
        self.updated_at = now;
    }

    pub fn mark_failed(&mut self, now: DateTime<Utc>) {
        self.status = BatchStatus::Failed;
        self.completed_at = Some(now);
        self.updated_at = now;
    }
}
