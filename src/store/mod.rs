//! Repository interface over the durable board tables.
//!
//! The persistence engine is opaque to the core: anything that can offer
//! these reads, conditional writes, and simple queries can back a board.
//! All exclusivity is expressed through persisted lock rows — callers may
//! be separate processes, so no in-memory mutex ever stands in for a lock.

mod memory;

pub use memory::MemoryStore;

use crate::batch::BatchJob;
use crate::board::Task;
use crate::collab::{ActorSession, HelpRequest, HelpStatus, TaskLock};
use crate::error::Result;

/// Outcome of an active-lock conditional write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockAttempt {
    /// This write created the lock row.
    Granted,
    /// The requesting session already held the active lock; nothing was
    /// written. Callers that release on their own error paths must not
    /// drop a lock they did not create.
    AlreadyHeldBySelf,
    /// Another session already holds the active lock.
    Held { holder: String },
}

impl LockAttempt {
    pub fn is_granted(&self) -> bool {
        matches!(self, Self::Granted | Self::AlreadyHeldBySelf)
    }
}

/// Durable board state: tasks, sessions, locks, help requests, batch jobs.
///
/// Conditional operations (`try_acquire_active_lock`, `update_help_if`,
/// `mark_tasks_batched`) must be linearizable per key — of two concurrent
/// conflicting writes, exactly one succeeds.
pub trait BoardStore: Send + Sync {
    // --- tasks ---

    fn insert_task(&self, task: Task) -> Result<()>;

    fn task(&self, id: &str) -> Result<Option<Task>>;

    /// All tasks in insertion order.
    fn tasks(&self) -> Result<Vec<Task>>;

    /// Apply `apply` to the task under the store's write lock and return
    /// the updated snapshot. Fails with `TaskNotFound` for unknown ids.
    fn update_task(&self, id: &str, apply: &dyn Fn(&mut Task)) -> Result<Task>;

    /// Mark every listed task batched under `batch_id`, or none at all if
    /// any is missing, already batched, or terminal. Atomic across the
    /// member set; returns whether the marking was applied.
    fn mark_tasks_batched(&self, ids: &[String], batch_id: &str) -> Result<bool>;

    // --- sessions ---

    fn insert_session(&self, session: ActorSession) -> Result<()>;

    fn session(&self, id: &str) -> Result<Option<ActorSession>>;

    fn sessions(&self) -> Result<Vec<ActorSession>>;

    fn update_session(
        &self,
        id: &str,
        apply: &dyn Fn(&mut ActorSession),
    ) -> Result<ActorSession>;

    fn remove_session(&self, id: &str) -> Result<Option<ActorSession>>;

    // --- locks ---

    fn locks_for_task(&self, task_id: &str) -> Result<Vec<TaskLock>>;

    fn locks_for_session(&self, session_id: &str) -> Result<Vec<TaskLock>>;

    /// Conditional write keyed by task_id: grants unless a different
    /// session currently holds the active lock. Re-acquisition by the
    /// holder is idempotent and reported as `AlreadyHeldBySelf`; a
    /// holder's soft/helper row upgrades in place.
    fn try_acquire_active_lock(&self, lock: TaskLock) -> Result<LockAttempt>;

    /// Store a soft or helper lock. Coexists with any active holder. If
    /// the session already holds the task's active lock the row keeps the
    /// active type (no downgrade).
    fn store_shared_lock(&self, lock: TaskLock) -> Result<()>;

    fn remove_lock(&self, task_id: &str, session_id: &str) -> Result<Option<TaskLock>>;

    /// Drop every lock held by the session, returning the removed rows.
    fn remove_session_locks(&self, session_id: &str) -> Result<Vec<TaskLock>>;

    // --- help requests ---

    fn insert_help_request(&self, request: HelpRequest) -> Result<()>;

    fn help_request(&self, id: &str) -> Result<Option<HelpRequest>>;

    fn help_requests(&self) -> Result<Vec<HelpRequest>>;

    /// Conditional write keyed by request id: apply `apply` only while the
    /// request's status equals `expected`. Returns whether it applied.
    fn update_help_if(
        &self,
        id: &str,
        expected: HelpStatus,
        apply: &dyn Fn(&mut HelpRequest),
    ) -> Result<bool>;

    // --- batch jobs ---

    fn insert_batch_job(&self, job: BatchJob) -> Result<()>;

    fn batch_job(&self, id: &str) -> Result<Option<BatchJob>>;

    fn batch_jobs(&self) -> Result<Vec<BatchJob>>;

    fn update_batch_job(&self, id: &str, apply: &dyn Fn(&mut BatchJob)) -> Result<BatchJob>;
}
