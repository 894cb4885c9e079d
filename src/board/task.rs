use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Priority, TaskStatus};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub title: String,

    #[serde(default)]
    pub description: String,

    pub priority: Priority,
    pub status: TaskStatus,

    #[serde(default)]
    pub depends_on: BTreeSet<String>,

    #[serde(default)]
    pub tags: Vec<String>,

    pub assignee: Option<String>,

    #[serde(default)]
    pub batched: bool,
    pub batch_id: Option<String>,

    pub artifacts_path: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    pub fn new(id: impl Into<String>, title: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: String::new(),
            priority: Priority::Medium,
            status: TaskStatus::Queued,
            depends_on: BTreeSet::new(),
            tags: Vec::new(),
            assignee: None,
            batched: false,
            batch_id: None,
            artifacts_path: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Dependency ids not yet in `done_ids`. Empty means the task may
    /// transition to in_progress.
    pub fn blocking_dependencies(&self, done_ids: &BTreeSet<String>) -> Vec<String> {
        self.depends_on
            .iter()
            .filter(|dep| !done_ids.contains(*dep))
            .cloned()
            .collect()
    }

    pub fn is_claimable(&self, done_ids: &BTreeSet<String>) -> bool {
        self.status == TaskStatus::Queued && self.blocking_dependencies(done_ids).is_empty()
    }
}

/// Input for creating a task through the manager.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewTask {
    pub id: Option<String>,
    pub title: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub priority: Priority,

    #[serde(default)]
    pub depends_on: BTreeSet<String>,

    #[serde(default)]
    pub tags: Vec<String>,
}

impl NewTask {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_dependencies(mut self, deps: impl IntoIterator<Item = String>) -> Self {
        self.depends_on = deps.into_iter().collect();
        self
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub(crate) fn into_task(self, now: DateTime<Utc>) -> Task {
        let id = self.id.unwrap_or_else(|| Uuid::new_v4().to_string());
        let mut task = Task::new(id, self.title, now);
        task.description = self.description;
        task.priority = self.priority;
        task.depends_on = self.depends_on;
        task.tags = self.tags;
        task
    }
}

/// Filter for listing tasks through the manager.
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub status: Option<TaskStatus>,
    pub assignee: Option<String>,
    pub batched: Option<bool>,
}

impl TaskFilter {
    pub fn matches(&self, task: &Task) -> bool {
        if let Some(status) = self.status {
            if task.status != status {
                return false;
            }
        }
        if let Some(assignee) = &self.assignee {
            if task.assignee.as_deref() != Some(assignee.as_str()) {
                return false;
            }
        }
        if let Some(batched) = self.batched {
            if task.batched != batched {
                return false;
            }
        }
        true
    }
}
