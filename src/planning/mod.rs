//! External decomposition collaborator. The core never breaks a goal into
//! subtasks itself; it persists whatever the planner hands back.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// One subtask the planner proposes. `dependencies` are indices into the
/// returned list, earlier entries only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubtaskDescriptor {
    pub title: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub dependencies: Vec<usize>,

    #[serde(default)]
    pub tools_required: Vec<String>,
}

impl SubtaskDescriptor {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: String::new(),
            dependencies: Vec::new(),
            tools_required: Vec::new(),
        }
    }

    pub fn depending_on(mut self, indices: Vec<usize>) -> Self {
        self.dependencies = indices;
        self
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanConstraints {
    pub max_subtasks: usize,
    pub tools_available: Vec<String>,
}

/// Planning collaborator: turns a goal into an ordered subtask list.
///
/// May block on I/O up to `timeout`; never called while the core holds a
/// store critical section.
pub trait Planner: Send + Sync {
    fn decompose(
        &self,
        goal: &str,
        constraints: &PlanConstraints,
        timeout: Duration,
    ) -> Result<Vec<SubtaskDescriptor>>;
}

/// Degenerate planner: the goal becomes a single subtask. Used as the
/// default wiring and as the fallback shape when a real planner returns an
/// unusable list.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughPlanner;

impl Planner for PassthroughPlanner {
    fn decompose(
        &self,
        goal: &str,
        _constraints: &PlanConstraints,
        _timeout: Duration,
    ) -> Result<Vec<SubtaskDescriptor>> {
        Ok(vec![SubtaskDescriptor::titled(goal)])
    }
}
