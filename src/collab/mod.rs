//! Session lifecycle, the task-lock state machine, and the help-request
//! workflow.

mod capability;
mod help;
mod lock;
mod session;

pub use capability::{CapabilityProfile, CapabilityRegistry};
pub use help::{HelpRequest, HelpStatus, HelpUrgency};
pub use lock::{LockType, TaskLock};
pub use session::ActorSession;

use std::sync::Arc;

use chrono::Duration;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::clock::Clock;
use crate::config::SessionConfig;
use crate::error::{BoardError, Result};
use crate::events::{BoardEvent, EventEnvelope, EventSink};
use crate::store::{BoardStore, LockAttempt};

/// Result of capability matching: the top-scoring checked-in session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentMatch {
    pub session_id: String,
    pub actor_name: String,
    pub profile: CapabilityProfile,
    pub score: f64,
}

pub struct CollaborationManager {
    store: Arc<dyn BoardStore>,
    registry: CapabilityRegistry,
    sink: Arc<dyn EventSink>,
    clock: Arc<dyn Clock>,
    staleness: Duration,
}

impl CollaborationManager {
    pub fn new(
        store: Arc<dyn BoardStore>,
        registry: CapabilityRegistry,
        sink: Arc<dyn EventSink>,
        clock: Arc<dyn Clock>,
        config: &SessionConfig,
    ) -> Self {
        Self {
            store,
            registry,
            sink,
            clock,
            staleness: config.staleness(),
        }
    }

    fn emit(&self, event: BoardEvent) {
        self.sink.emit(EventEnvelope {
            at: self.clock.now(),
            event,
        });
    }

    // --- sessions ---

    /// Register an actor and hand back its session token. The capability
    /// profile comes from the registry table; unknown actors get an empty
    /// profile.
    pub fn check_in(&self, actor_name: &str, actor_version: &str) -> Result<String> {
        if actor_name.trim().is_empty() {
            return Err(BoardError::Validation(
                "actor_name must not be empty".to_string(),
            ));
        }

        let session_id = Uuid::new_v4().to_string();
        let profile = self.registry.profile_for(actor_name);
        let session = ActorSession::new(
            &session_id,
            actor_name,
            actor_version,
            profile,
            self.clock.now(),
        );
        self.store.insert_session(session)?;

        info!(session_id = %session_id, actor = %actor_name, "session checked in");
        self.emit(BoardEvent::SessionCheckedIn {
            session_id: session_id.clone(),
            actor_name: actor_name.to_string(),
        });
        Ok(session_id)
    }

    pub fn heartbeat(&self, session_id: &str) -> Result<()> {
        let now = self.clock.now();
        self.store
            .update_session(session_id, &|s| s.last_heartbeat_at = now)?;
        Ok(())
    }

    /// Release every lock held by the session and drop it from the roster.
    /// Idempotent: checking out an unknown session is a no-op.
    pub fn check_out(&self, session_id: &str) -> Result<()> {
        let Some(session) = self.store.remove_session(session_id)? else {
            return Ok(());
        };
        self.release_all_for(&session, false)?;
        self.emit(BoardEvent::SessionCheckedOut {
            session_id: session_id.to_string(),
        });
        info!(session_id = %session_id, actor = %session.actor_name, "session checked out");
        Ok(())
    }

    pub fn list_sessions(&self) -> Result<Vec<ActorSession>> {
        self.store.sessions()
    }

    /// Reap every session whose heartbeat is older than the staleness
    /// window: locks are released, accepted help requests reopen, and the
    /// session leaves the roster. Returns the reaped session ids. This is
    /// what keeps a crashed actor from starving a task forever.
    pub fn check_client_timeouts(&self) -> Result<Vec<String>> {
        let now = self.clock.now();
        let stale: Vec<ActorSession> = self
            .store
            .sessions()?
            .into_iter()
            .filter(|s| s.is_stale(now, self.staleness))
            .collect();

        let mut reaped = Vec::with_capacity(stale.len());
        for session in stale {
            if self.store.remove_session(&session.session_id)?.is_none() {
                // Checked out concurrently; nothing left to clean.
                continue;
            }
            self.release_all_for(&session, true)?;
            warn!(
                session_id = %session.session_id,
                actor = %session.actor_name,
                "session timed out, locks released"
            );
            self.emit(BoardEvent::SessionTimedOut {
                session_id: session.session_id.clone(),
                actor_name: session.actor_name.clone(),
            });
            reaped.push(session.session_id);
        }
        Ok(reaped)
    }

    /// Drop the session's locks, requeue tasks it was actively working,
    /// and put its accepted help requests back on offer so the work is
    /// not stranded.
    fn release_all_for(&self, session: &ActorSession, timed_out: bool) -> Result<()> {
        let removed = self.store.remove_session_locks(&session.session_id)?;
        for lock in &removed {
            debug!(
                task_id = %lock.task_id,
                session_id = %lock.session_id,
                lock_type = %lock.lock_type,
                timed_out,
                "lock released"
            );
            self.emit(BoardEvent::LockReleased {
                task_id: lock.task_id.clone(),
                session_id: lock.session_id.clone(),
            });

            // An abandoned active lock leaves its task in_progress with
            // nobody working it; make it claimable again.
            if lock.lock_type == LockType::Active {
                let now = self.clock.now();
                self.store.update_task(&lock.task_id, &|t| {
                    if t.status == crate::board::TaskStatus::InProgress {
                        t.status = crate::board::TaskStatus::Queued;
                        t.assignee = None;
                        t.updated_at = now;
                    }
                })?;
            }
        }

        let now = self.clock.now();
        for request in self.store.help_requests()? {
            if request.status == HelpStatus::Accepted
                && request.helper_session_id.as_deref() == Some(session.session_id.as_str())
            {
                let reopened = self
                    .store
                    .update_help_if(&request.id, HelpStatus::Accepted, &|r| r.reopen(now))?;
                if reopened {
                    self.emit(BoardEvent::HelpReopened {
                        request_id: request.id.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    // --- locks ---

    /// Full lock transition, reporting the holder on denial. Evaluated
    /// atomically against the task's current lock set:
    /// - active: granted unless another session holds active (idempotent
    ///   for the holder)
    /// - soft/helper: always granted, coexisting with any active holder
    pub fn acquire(
        &self,
        task_id: &str,
        session_id: &str,
        lock_type: LockType,
    ) -> Result<LockAttempt> {
        if self.store.session(session_id)?.is_none() {
            return Err(BoardError::SessionNotFound(session_id.to_string()));
        }

        let lock = TaskLock::new(task_id, session_id, lock_type, self.clock.now());
        let attempt = if lock_type.is_exclusive() {
            self.store.try_acquire_active_lock(lock)?
        } else {
            self.store.store_shared_lock(lock)?;
            LockAttempt::Granted
        };

        // An idempotent self re-grant writes nothing and emits nothing.
        if attempt == LockAttempt::Granted {
            debug!(task_id, session_id, lock_type = %lock_type, "lock acquired");
            self.emit(BoardEvent::LockAcquired {
                task_id: task_id.to_string(),
                session_id: session_id.to_string(),
                lock_type,
            });
        }
        Ok(attempt)
    }

    /// Boolean façade over [`acquire`](Self::acquire) for callers that do
    /// not care who holds the task.
    pub fn acquire_task_lock(
        &self,
        task_id: &str,
        session_id: &str,
        lock_type: LockType,
    ) -> Result<bool> {
        Ok(self.acquire(task_id, session_id, lock_type)?.is_granted())
    }

    pub fn release_task_lock(&self, task_id: &str, session_id: &str) -> Result<()> {
        if self.store.remove_lock(task_id, session_id)?.is_some() {
            debug!(task_id, session_id, "lock released");
            self.emit(BoardEvent::LockReleased {
                task_id: task_id.to_string(),
                session_id: session_id.to_string(),
            });
        }
        Ok(())
    }

    pub fn list_locks(&self, task_id: &str) -> Result<Vec<TaskLock>> {
        self.store.locks_for_task(task_id)
    }

    /// The session currently holding the task's active lock, if any.
    pub fn active_holder(&self, task_id: &str) -> Result<Option<String>> {
        Ok(self
            .store
            .locks_for_task(task_id)?
            .into_iter()
            .find(|lock| lock.lock_type == LockType::Active)
            .map(|lock| lock.session_id))
    }

    // --- help requests ---

    /// Create an open help request. Grants no lock by itself.
    pub fn request_help(
        &self,
        task_id: &str,
        requester_session_id: &str,
        help_type: &str,
        context: &str,
        urgency: HelpUrgency,
        estimated_time: Option<String>,
    ) -> Result<String> {
        if help_type.trim().is_empty() {
            return Err(BoardError::Validation(
                "help_type must not be empty".to_string(),
            ));
        }

        let request_id = Uuid::new_v4().to_string();
        let request = HelpRequest::new(
            &request_id,
            task_id,
            requester_session_id,
            help_type,
            context,
            urgency,
            estimated_time,
            self.clock.now(),
        );
        self.store.insert_help_request(request)?;

        info!(request_id = %request_id, task_id, help_type, "help requested");
        self.emit(BoardEvent::HelpRequested {
            request_id: request_id.clone(),
            task_id: task_id.to_string(),
        });
        Ok(request_id)
    }

    /// First accepter wins. Returns `Ok(false)` to every loser of a
    /// concurrent race; accepting an already-finished request is an error.
    /// Acceptance grants the helper a helper lock on the request's task,
    /// never displacing the requester's active lock.
    pub fn accept_help_request(
        &self,
        request_id: &str,
        helper_session_id: &str,
        response_message: &str,
    ) -> Result<bool> {
        let request = self
            .store
            .help_request(request_id)?
            .ok_or_else(|| BoardError::HelpRequestNotFound(request_id.to_string()))?;

        if self.store.session(helper_session_id)?.is_none() {
            return Err(BoardError::SessionNotFound(helper_session_id.to_string()));
        }
        if request.requester_session_id == helper_session_id {
            return Err(BoardError::Validation(
                "a session cannot accept its own help request".to_string(),
            ));
        }

        let now = self.clock.now();
        let accepted = self.store.update_help_if(request_id, HelpStatus::Open, &|r| {
            r.accept(helper_session_id, response_message, now)
        })?;

        if !accepted {
            // Re-read to tell a lost race from a finished request.
            let current = self
                .store
                .help_request(request_id)?
                .ok_or_else(|| BoardError::HelpRequestNotFound(request_id.to_string()))?;
            return match current.status {
                HelpStatus::Accepted => Ok(false),
                HelpStatus::Completed => Err(BoardError::DuplicateAccept {
                    request_id: request_id.to_string(),
                    helper: current.helper_session_id.unwrap_or_default(),
                }),
                HelpStatus::Cancelled => Err(BoardError::Validation(format!(
                    "help request {request_id} was cancelled"
                ))),
                HelpStatus::Open => Ok(false),
            };
        }

        // Side effect of acceptance: a helper lock on the task. If the
        // grant fails the request goes back on offer.
        if let Err(e) = self.acquire(&request.task_id, helper_session_id, LockType::Helper) {
            let reopened_at = self.clock.now();
            self.store
                .update_help_if(request_id, HelpStatus::Accepted, &|r| r.reopen(reopened_at))?;
            return Err(e);
        }

        // The request may have been cancelled or completed between the
        // transition and the grant; a dead request must not keep a lock.
        let current = self
            .store
            .help_request(request_id)?
            .ok_or_else(|| BoardError::HelpRequestNotFound(request_id.to_string()))?;
        if current.status != HelpStatus::Accepted
            || current.helper_session_id.as_deref() != Some(helper_session_id)
        {
            self.release_helper_lock(&request.task_id, helper_session_id)?;
            return Ok(false);
        }

        info!(request_id, helper = helper_session_id, "help request accepted");
        self.emit(BoardEvent::HelpAccepted {
            request_id: request_id.to_string(),
            helper_session_id: helper_session_id.to_string(),
        });
        Ok(true)
    }

    /// Close out an accepted request and release the helper lock.
    pub fn complete_help_request(&self, request_id: &str, outcome: &str) -> Result<()> {
        if self.store.help_request(request_id)?.is_none() {
            return Err(BoardError::HelpRequestNotFound(request_id.to_string()));
        }

        let now = self.clock.now();
        let completed = self
            .store
            .update_help_if(request_id, HelpStatus::Accepted, &|r| r.complete(outcome, now))?;
        if !completed {
            return Err(BoardError::Validation(format!(
                "help request {request_id} is not accepted"
            )));
        }

        // Read the helper from the post-transition row: an accept racing
        // this call may have attached a helper any earlier snapshot missed.
        let request = self
            .store
            .help_request(request_id)?
            .ok_or_else(|| BoardError::HelpRequestNotFound(request_id.to_string()))?;
        if let Some(helper) = &request.helper_session_id {
            self.release_helper_lock(&request.task_id, helper)?;
        }

        info!(request_id, "help request completed");
        self.emit(BoardEvent::HelpCompleted {
            request_id: request_id.to_string(),
        });
        Ok(())
    }

    /// Requester-initiated cancellation from Open or Accepted. Resolves the
    /// orphaned-lock question: abandoning a request always releases the
    /// helper lock it granted.
    pub fn cancel_help_request(&self, request_id: &str, session_id: &str) -> Result<()> {
        let request = self
            .store
            .help_request(request_id)?
            .ok_or_else(|| BoardError::HelpRequestNotFound(request_id.to_string()))?;

        if request.requester_session_id != session_id {
            return Err(BoardError::Validation(format!(
                "only the requester may cancel help request {request_id}"
            )));
        }

        let now = self.clock.now();
        let from_open = self
            .store
            .update_help_if(request_id, HelpStatus::Open, &|r| r.cancel(now))?;
        let cancelled = from_open
            || self
                .store
                .update_help_if(request_id, HelpStatus::Accepted, &|r| r.cancel(now))?;
        if !cancelled {
            return Err(BoardError::Validation(format!(
                "help request {request_id} is already finished"
            )));
        }

        // As in `complete_help_request`: only the post-transition row
        // knows which helper, if any, holds a lock to release.
        let request = self
            .store
            .help_request(request_id)?
            .ok_or_else(|| BoardError::HelpRequestNotFound(request_id.to_string()))?;
        if let Some(helper) = &request.helper_session_id {
            self.release_helper_lock(&request.task_id, helper)?;
        }

        info!(request_id, "help request cancelled");
        self.emit(BoardEvent::HelpCancelled {
            request_id: request_id.to_string(),
        });
        Ok(())
    }

    /// Remove the helper's lock row, but only if it is still a helper
    /// lock — the helper may have since claimed the task outright.
    fn release_helper_lock(&self, task_id: &str, helper_session_id: &str) -> Result<()> {
        let holds_helper = self
            .store
            .locks_for_task(task_id)?
            .iter()
            .any(|lock| {
                lock.session_id == helper_session_id && lock.lock_type == LockType::Helper
            });
        if holds_helper {
            self.release_task_lock(task_id, helper_session_id)?;
        }
        Ok(())
    }

    pub fn list_help_requests(&self) -> Result<Vec<HelpRequest>> {
        self.store.help_requests()
    }

    // --- capability matching ---

    /// Rank checked-in sessions by tag overlap with the request (Jaccard
    /// score over declared capability tags), ties broken by most recent
    /// heartbeat. `None` when nobody is checked in.
    pub fn find_best_agent_for_task(
        &self,
        description: &str,
        tags: &[String],
    ) -> Result<Option<AgentMatch>> {
        let sessions = self.store.sessions()?;
        debug!(
            description,
            candidates = sessions.len(),
            "matching agent for task"
        );

        let best = sessions.into_iter().max_by(|a, b| {
            let score_a = a.capabilities.match_score(tags);
            let score_b = b.capabilities.match_score(tags);
            score_a
                .partial_cmp(&score_b)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.last_heartbeat_at.cmp(&b.last_heartbeat_at))
        });

        Ok(best.map(|session| AgentMatch {
            score: session.capabilities.match_score(tags),
            session_id: session.session_id,
            actor_name: session.actor_name,
            profile: session.capabilities,
        }))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use chrono::Utc;

    use super::*;
    use crate::batch::BatchJob;
    use crate::board::Task;
    use crate::clock::SystemClock;
    use crate::events::NoopEventSink;
    use crate::store::MemoryStore;

    /// Store that lets a rival's accept land between a caller's status
    /// read and its conditional write, the narrowest interleaving the
    /// help workflow has to survive.
    struct RacingAcceptStore {
        inner: MemoryStore,
        armed: AtomicBool,
        task_id: String,
        helper_session_id: String,
    }

    impl RacingAcceptStore {
        fn new(task_id: &str, helper_session_id: &str) -> Self {
            Self {
                inner: MemoryStore::new(),
                armed: AtomicBool::new(false),
                task_id: task_id.to_string(),
                helper_session_id: helper_session_id.to_string(),
            }
        }
    }

    impl BoardStore for RacingAcceptStore {
        fn insert_task(&self, task: Task) -> Result<()> {
            self.inner.insert_task(task)
        }

        fn task(&self, id: &str) -> Result<Option<Task>> {
            self.inner.task(id)
        }

        fn tasks(&self) -> Result<Vec<Task>> {
            self.inner.tasks()
        }

        fn update_task(&self, id: &str, apply: &dyn Fn(&mut Task)) -> Result<Task> {
            self.inner.update_task(id, apply)
        }

        fn mark_tasks_batched(&self, ids: &[String], batch_id: &str) -> Result<bool> {
            self.inner.mark_tasks_batched(ids, batch_id)
        }

        fn insert_session(&self, session: ActorSession) -> Result<()> {
            self.inner.insert_session(session)
        }

        fn session(&self, id: &str) -> Result<Option<ActorSession>> {
            self.inner.session(id)
        }

        fn sessions(&self) -> Result<Vec<ActorSession>> {
            self.inner.sessions()
        }

        fn update_session(
            &self,
            id: &str,
            apply: &dyn Fn(&mut ActorSession),
        ) -> Result<ActorSession> {
            self.inner.update_session(id, apply)
        }

        fn remove_session(&self, id: &str) -> Result<Option<ActorSession>> {
            self.inner.remove_session(id)
        }

        fn locks_for_task(&self, task_id: &str) -> Result<Vec<TaskLock>> {
            self.inner.locks_for_task(task_id)
        }

        fn locks_for_session(&self, session_id: &str) -> Result<Vec<TaskLock>> {
            self.inner.locks_for_session(session_id)
        }

        fn try_acquire_active_lock(&self, lock: TaskLock) -> Result<LockAttempt> {
            self.inner.try_acquire_active_lock(lock)
        }

        fn store_shared_lock(&self, lock: TaskLock) -> Result<()> {
            self.inner.store_shared_lock(lock)
        }

        fn remove_lock(&self, task_id: &str, session_id: &str) -> Result<Option<TaskLock>> {
            self.inner.remove_lock(task_id, session_id)
        }

        fn remove_session_locks(&self, session_id: &str) -> Result<Vec<TaskLock>> {
            self.inner.remove_session_locks(session_id)
        }

        fn insert_help_request(&self, request: HelpRequest) -> Result<()> {
            self.inner.insert_help_request(request)
        }

        fn help_request(&self, id: &str) -> Result<Option<HelpRequest>> {
            self.inner.help_request(id)
        }

        fn help_requests(&self) -> Result<Vec<HelpRequest>> {
            self.inner.help_requests()
        }

        fn update_help_if(
            &self,
            id: &str,
            expected: HelpStatus,
            apply: &dyn Fn(&mut HelpRequest),
        ) -> Result<bool> {
            if expected == HelpStatus::Open && self.armed.swap(false, Ordering::SeqCst) {
                let now = Utc::now();
                let helper = self.helper_session_id.clone();
                self.inner.update_help_if(id, HelpStatus::Open, &|r| {
                    r.accept(&helper, "jumping in", now)
                })?;
                self.inner.store_shared_lock(TaskLock::new(
                    self.task_id.clone(),
                    helper,
                    LockType::Helper,
                    now,
                ))?;
            }
            self.inner.update_help_if(id, expected, apply)
        }

        fn insert_batch_job(&self, job: BatchJob) -> Result<()> {
            self.inner.insert_batch_job(job)
        }

        fn batch_job(&self, id: &str) -> Result<Option<BatchJob>> {
            self.inner.batch_job(id)
        }

        fn batch_jobs(&self) -> Result<Vec<BatchJob>> {
            self.inner.batch_jobs()
        }

        fn update_batch_job(&self, id: &str, apply: &dyn Fn(&mut BatchJob)) -> Result<BatchJob> {
            self.inner.update_batch_job(id, apply)
        }
    }

    #[test]
    fn cancel_releases_the_lock_of_an_accept_that_raced_it() {
        let store = Arc::new(RacingAcceptStore::new("t1", "s2"));
        let now = Utc::now();
        store.insert_task(Task::new("t1", "work", now)).unwrap();
        for sid in ["s1", "s2"] {
            store
                .insert_session(ActorSession::new(
                    sid,
                    format!("actor-{sid}"),
                    "1.0",
                    CapabilityProfile::default(),
                    now,
                ))
                .unwrap();
        }

        let manager = CollaborationManager::new(
            Arc::clone(&store) as Arc<dyn BoardStore>,
            CapabilityRegistry::new(),
            Arc::new(NoopEventSink),
            Arc::new(SystemClock),
            &SessionConfig::default(),
        );

        let request_id = manager
            .request_help("t1", "s1", "review", "", HelpUrgency::Medium, None)
            .unwrap();

        // The rival accept lands between the canceller's status read and
        // its first conditional write; the cancel still has to find the
        // helper lock and release it.
        store.armed.store(true, Ordering::SeqCst);
        manager.cancel_help_request(&request_id, "s1").unwrap();

        let request = store.help_request(&request_id).unwrap().unwrap();
        assert_eq!(request.status, HelpStatus::Cancelled);
        assert!(store.locks_for_task("t1").unwrap().is_empty());
    }
}
