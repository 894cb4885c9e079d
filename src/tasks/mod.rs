//! Task lifecycle: the race-safe claim/complete protocol layered on
//! dependency resolution, goal decomposition, and board health.

mod health;

pub use health::{BatchStats, BoardSnapshot, HealthStatus, HealthSummary};

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::board::{NewTask, Task, TaskFilter, TaskStatus};
use crate::clock::Clock;
use crate::collab::{CollaborationManager, LockType};
use crate::config::{HealthConfig, PlannerConfig};
use crate::error::{BoardError, Result};
use crate::events::{BoardEvent, EventEnvelope, EventSink};
use crate::planning::{PlanConstraints, Planner, SubtaskDescriptor};
use crate::store::{BoardStore, LockAttempt};

pub struct TaskManager {
    store: Arc<dyn BoardStore>,
    collab: Arc<CollaborationManager>,
    planner: Arc<dyn Planner>,
    sink: Arc<dyn EventSink>,
    clock: Arc<dyn Clock>,
    planner_config: PlannerConfig,
    health_config: HealthConfig,
}

impl TaskManager {
    pub fn new(
        store: Arc<dyn BoardStore>,
        collab: Arc<CollaborationManager>,
        planner: Arc<dyn Planner>,
        sink: Arc<dyn EventSink>,
        clock: Arc<dyn Clock>,
        planner_config: PlannerConfig,
        health_config: HealthConfig,
    ) -> Self {
        Self {
            store,
            collab,
            planner,
            sink,
            clock,
            planner_config,
            health_config,
        }
    }

    fn emit(&self, event: BoardEvent) {
        self.sink.emit(EventEnvelope {
            at: self.clock.now(),
            event,
        });
    }

    // --- CRUD around the protocol ---

    pub fn add_task(&self, new_task: NewTask) -> Result<Task> {
        if new_task.title.trim().is_empty() {
            return Err(BoardError::Validation(
                "task title must not be empty".to_string(),
            ));
        }
        for dep in &new_task.depends_on {
            if self.store.task(dep)?.is_none() {
                return Err(BoardError::TaskNotFound(dep.clone()));
            }
        }

        let task = new_task.into_task(self.clock.now());
        self.store.insert_task(task.clone())?;

        debug!(task_id = %task.id, priority = %task.priority, "task added");
        self.emit(BoardEvent::TaskAdded {
            task_id: task.id.clone(),
        });
        Ok(task)
    }

    pub fn get_task(&self, task_id: &str) -> Result<Task> {
        self.store
            .task(task_id)?
            .ok_or_else(|| BoardError::TaskNotFound(task_id.to_string()))
    }

    pub fn list_tasks(&self, filter: &TaskFilter) -> Result<Vec<Task>> {
        Ok(self
            .store
            .tasks()?
            .into_iter()
            .filter(|task| filter.matches(task))
            .collect())
    }

    fn done_ids(&self) -> Result<BTreeSet<String>> {
        Ok(self
            .store
            .tasks()?
            .into_iter()
            .filter(|t| t.status == TaskStatus::Done)
            .map(|t| t.id)
            .collect())
    }

    // --- the claim protocol ---

    /// Queued tasks with all dependencies done, ordered by priority
    /// (highest first, insertion order within a priority) — skipping
    /// batched tasks when `exclude_batched` is set.
    pub fn claimable_tasks(&self, exclude_batched: bool) -> Result<Vec<Task>> {
        let done = self.done_ids()?;
        let mut tasks: Vec<Task> = self.store.tasks()?;
        // Stable sort keeps insertion order within equal priorities.
        tasks.sort_by(|a, b| b.priority.cmp(&a.priority));

        tasks.retain(|task| task.is_claimable(&done) && !(exclude_batched && task.batched));
        Ok(tasks)
    }

    /// First entry of the claim scan, if any task qualifies.
    pub fn find_next_claimable_task(&self, exclude_batched: bool) -> Result<Option<Task>> {
        Ok(self.claimable_tasks(exclude_batched)?.into_iter().next())
    }

    /// Take ownership of a task: dependency check, active lock, status
    /// transition — one atomic unit relative to other claimants. With no
    /// `task_id` the next claimable unbatched task is resolved first;
    /// `Ok(None)` then means the board has nothing eligible.
    pub fn claim_task(&self, task_id: Option<&str>, session_id: &str) -> Result<Option<Task>> {
        let session = self
            .store
            .session(session_id)?
            .ok_or_else(|| BoardError::SessionNotFound(session_id.to_string()))?;

        let target = match task_id {
            Some(id) => self.get_task(id)?,
            None => match self.find_next_claimable_task(true)? {
                Some(task) => task,
                None => return Ok(None),
            },
        };

        let done = self.done_ids()?;
        let blocking = target.blocking_dependencies(&done);
        if !blocking.is_empty() {
            return Err(BoardError::DependenciesNotMet {
                task_id: target.id,
                blocking,
            });
        }

        // The conditional lock write is the linearization point: of any
        // two concurrent claimants exactly one gets past here.
        let newly_granted = match self.collab.acquire(&target.id, session_id, LockType::Active)? {
            LockAttempt::Granted => true,
            LockAttempt::AlreadyHeldBySelf => false,
            LockAttempt::Held { holder } => {
                return Err(BoardError::LockConflict {
                    task_id: target.id,
                    holder,
                });
            }
        };

        // Re-read under the lock; a prior holder may have finished the
        // task between our scan and the grant.
        let current = self.get_task(&target.id)?;
        if current.status != TaskStatus::Queued {
            // Only drop a lock this call created. A session retrying its
            // own successful claim must keep its active lock.
            if newly_granted {
                self.collab.release_task_lock(&target.id, session_id)?;
            }
            return Err(BoardError::Validation(format!(
                "task {} is {}, not claimable",
                target.id, current.status
            )));
        }

        let now = self.clock.now();
        let actor = session.actor_name.clone();
        let claimed = self.store.update_task(&target.id, &|t| {
            t.status = TaskStatus::InProgress;
            t.assignee = Some(actor.clone());
            t.updated_at = now;
        })?;
        self.collab.heartbeat(session_id)?;

        info!(task_id = %claimed.id, session_id, actor = %session.actor_name, "task claimed");
        self.emit(BoardEvent::TaskClaimed {
            task_id: claimed.id.clone(),
            session_id: session_id.to_string(),
        });
        Ok(Some(claimed))
    }

    /// Finish an owned task. The caller must hold the active lock; the
    /// lock is released and dependants become visible to future claim
    /// scans.
    pub fn complete_task(&self, task_id: &str, session_id: &str) -> Result<Task> {
        self.verify_active_holder(task_id, session_id)?;

        let now = self.clock.now();
        let completed = self.store.update_task(task_id, &|t| {
            t.status = TaskStatus::Done;
            t.updated_at = now;
        })?;
        self.collab.release_task_lock(task_id, session_id)?;
        self.unblock_dependents()?;

        info!(task_id, session_id, "task completed");
        self.emit(BoardEvent::TaskCompleted {
            task_id: task_id.to_string(),
        });
        Ok(completed)
    }

    /// Terminal failure, symmetric to `complete_task`. Dependants stay
    /// blocked: a failed prerequisite never satisfies a dependency.
    pub fn fail_task(&self, task_id: &str, session_id: &str, reason: &str) -> Result<Task> {
        self.verify_active_holder(task_id, session_id)?;

        let now = self.clock.now();
        let failed = self.store.update_task(task_id, &|t| {
            t.status = TaskStatus::Failed;
            t.updated_at = now;
        })?;
        self.collab.release_task_lock(task_id, session_id)?;

        warn!(task_id, session_id, reason, "task failed");
        self.emit(BoardEvent::TaskFailed {
            task_id: task_id.to_string(),
            reason: reason.to_string(),
        });
        Ok(failed)
    }

    /// Refresh the owner's heartbeat and the task's updated_at while work
    /// is in flight; feeds both stale detection and the timeout sweep.
    pub fn heartbeat_task(&self, task_id: &str, session_id: &str) -> Result<()> {
        self.verify_active_holder(task_id, session_id)?;
        let now = self.clock.now();
        self.store.update_task(task_id, &|t| t.updated_at = now)?;
        self.collab.heartbeat(session_id)
    }

    fn verify_active_holder(&self, task_id: &str, session_id: &str) -> Result<()> {
        // Surface unknown tasks before lock complaints.
        self.get_task(task_id)?;
        match self.collab.active_holder(task_id)? {
            Some(holder) if holder == session_id => Ok(()),
            Some(holder) => Err(BoardError::LockConflict {
                task_id: task_id.to_string(),
                holder,
            }),
            None => Err(BoardError::Validation(format!(
                "session {session_id} holds no active lock on task {task_id}"
            ))),
        }
    }

    /// Requeue blocked tasks whose dependencies are now all done.
    fn unblock_dependents(&self) -> Result<()> {
        let done = self.done_ids()?;
        for task in self.store.tasks()? {
            if task.status == TaskStatus::Blocked && task.blocking_dependencies(&done).is_empty()
            {
                let now = self.clock.now();
                self.store.update_task(&task.id, &|t| {
                    t.status = TaskStatus::Queued;
                    t.updated_at = now;
                })?;
                debug!(task_id = %task.id, "task unblocked");
            }
        }
        Ok(())
    }

    // --- decomposition ---

    /// Ask the planning collaborator to break `goal` into subtasks and
    /// persist them as queued tasks, preserving declared dependency order.
    /// An optional `task_type` lands on every created task as a tag so
    /// capability matching and filters can see it. A planner error
    /// surfaces as `Planner`; a planner that answers with an unusable
    /// list falls back to one task holding the raw goal.
    pub fn decompose_and_add_tasks(
        &self,
        goal: &str,
        priority: crate::board::Priority,
        task_type: Option<&str>,
    ) -> Result<Vec<Task>> {
        if goal.trim().is_empty() {
            return Err(BoardError::Validation("goal must not be empty".to_string()));
        }

        let constraints = PlanConstraints {
            max_subtasks: self.planner_config.max_subtasks,
            tools_available: Vec::new(),
        };
        let descriptors = self
            .planner
            .decompose(goal, &constraints, self.planner_config.timeout())
            .map_err(|e| match e {
                planner_err @ BoardError::Planner { .. } => planner_err,
                other => BoardError::Planner {
                    goal: goal.to_string(),
                    message: other.to_string(),
                },
            })?;

        let plan = match self.validate_plan(descriptors) {
            Some(plan) => plan,
            None => {
                warn!(goal, "planner returned an unusable list, falling back to a single task");
                vec![SubtaskDescriptor::titled(goal)]
            }
        };

        let mut created = Vec::with_capacity(plan.len());
        let mut ids: Vec<String> = Vec::with_capacity(plan.len());
        for descriptor in plan {
            let deps: BTreeSet<String> = descriptor
                .dependencies
                .iter()
                .map(|&index| ids[index].clone())
                .collect();
            let mut tags = descriptor.tools_required;
            if let Some(task_type) = task_type {
                if !tags.iter().any(|t| t == task_type) {
                    tags.push(task_type.to_string());
                }
            }
            let mut new_task = NewTask::titled(descriptor.title)
                .with_priority(priority)
                .with_dependencies(deps)
                .with_tags(tags);
            new_task.description = descriptor.description;

            let task = self.add_task(new_task)?;
            ids.push(task.id.clone());
            created.push(task);
        }

        info!(goal, count = created.len(), "goal decomposed into tasks");
        Ok(created)
    }

    /// Usable means: non-empty, within the size limit, every title
    /// non-blank, every dependency pointing at an earlier entry.
    fn validate_plan(&self, plan: Vec<SubtaskDescriptor>) -> Option<Vec<SubtaskDescriptor>> {
        if plan.is_empty() || plan.len() > self.planner_config.max_subtasks {
            return None;
        }
        for (index, descriptor) in plan.iter().enumerate() {
            if descriptor.title.trim().is_empty() {
                return None;
            }
            if descriptor.dependencies.iter().any(|&dep| dep >= index) {
                return None;
            }
        }
        Some(plan)
    }

    // --- health ---

    /// Deterministic board health: stale in-progress tasks, unassigned
    /// urgent work, dangling artifact paths, batch statistics.
    pub fn get_health_summary(&self) -> Result<HealthSummary> {
        let snapshot = self.take_snapshot()?;
        Ok(health::summarize(&snapshot, &self.health_config))
    }

    fn take_snapshot(&self) -> Result<BoardSnapshot> {
        let now = self.clock.now();
        let stale_after = self.health_config.stale_after();

        let mut stale_tasks = Vec::new();
        let mut unassigned_urgent = Vec::new();
        let mut missing_artifacts = Vec::new();
        for task in self.store.tasks()? {
            if task.status == TaskStatus::InProgress && now - task.updated_at > stale_after {
                stale_tasks.push(task.id.clone());
            }
            if task.priority.is_urgent() && task.assignee.is_none() && !task.status.is_terminal()
            {
                unassigned_urgent.push(task.id.clone());
            }
            if let Some(path) = &task.artifacts_path {
                if !Path::new(path).exists() {
                    missing_artifacts.push(task.id.clone());
                }
            }
        }

        let mut batch = BatchStats::default();
        for job in self.store.batch_jobs()? {
            match job.status {
                crate::batch::BatchStatus::Pending => batch.pending += 1,
                crate::batch::BatchStatus::Submitted => batch.submitted += 1,
                crate::batch::BatchStatus::Completed => batch.completed += 1,
                crate::batch::BatchStatus::Failed => batch.failed += 1,
            }
        }

        Ok(BoardSnapshot {
            taken_at: now,
            stale_tasks,
            unassigned_urgent,
            missing_artifacts,
            batch,
        })
    }
}
