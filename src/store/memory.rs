//! In-memory `BoardStore` for tests and single-process deployments.
//!
//! One mutex over all five tables: every conditional write observes and
//! mutates a consistent snapshot, which is what makes the lock and help
//! CAS operations linearizable here.

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::batch::BatchJob;
use crate::board::Task;
use crate::collab::{ActorSession, HelpRequest, HelpStatus, LockType, TaskLock};
use crate::error::{BoardError, Result};

use super::{BoardStore, LockAttempt};

#[derive(Default)]
struct Tables {
    /// Insertion order is meaningful: the claim scan breaks priority ties
    /// by it.
    tasks: Vec<Task>,
    sessions: HashMap<String, ActorSession>,
    locks: HashMap<(String, String), TaskLock>,
    help_requests: Vec<HelpRequest>,
    batch_jobs: HashMap<String, BatchJob>,
}

impl Tables {
    fn task_index(&self, id: &str) -> Option<usize> {
        self.tasks.iter().position(|t| t.id == id)
    }

    fn help_index(&self, id: &str) -> Option<usize> {
        self.help_requests.iter().position(|r| r.id == id)
    }

    fn active_holder(&self, task_id: &str) -> Option<&TaskLock> {
        self.locks
            .values()
            .find(|lock| lock.task_id == task_id && lock.lock_type == LockType::Active)
    }

    fn check_lock_references(&self, lock: &TaskLock) -> Result<()> {
        if self.task_index(&lock.task_id).is_none() {
            return Err(BoardError::TaskNotFound(lock.task_id.clone()));
        }
        if !self.sessions.contains_key(&lock.session_id) {
            return Err(BoardError::SessionNotFound(lock.session_id.clone()));
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BoardStore for MemoryStore {
    fn insert_task(&self, task: Task) -> Result<()> {
        let mut tables = self.tables.lock();
        if tables.task_index(&task.id).is_some() {
            return Err(BoardError::Validation(format!(
                "task id already exists: {}",
                task.id
            )));
        }
        tables.tasks.push(task);
        Ok(())
    }

    fn task(&self, id: &str) -> Result<Option<Task>> {
        let tables = self.tables.lock();
        Ok(tables.task_index(id).map(|i| tables.tasks[i].clone()))
    }

    fn tasks(&self) -> Result<Vec<Task>> {
        Ok(self.tables.lock().tasks.clone())
    }

    fn update_task(&self, id: &str, apply: &dyn Fn(&mut Task)) -> Result<Task> {
        let mut tables = self.tables.lock();
        let index = tables
            .task_index(id)
            .ok_or_else(|| BoardError::TaskNotFound(id.to_string()))?;
        let task = &mut tables.tasks[index];
        apply(task);
        Ok(task.clone())
    }

    fn mark_tasks_batched(&self, ids: &[String], batch_id: &str) -> Result<bool> {
        let mut tables = self.tables.lock();

        let mut indices = Vec::with_capacity(ids.len());
        for id in ids {
            match tables.task_index(id) {
                Some(index) => {
                    let task = &tables.tasks[index];
                    if task.batched || task.status.is_terminal() {
                        return Ok(false);
                    }
                    indices.push(index);
                }
                None => return Ok(false),
            }
        }

        for index in indices {
            let task = &mut tables.tasks[index];
            task.batched = true;
            task.batch_id = Some(batch_id.to_string());
        }
        Ok(true)
    }

    fn insert_session(&self, session: ActorSession) -> Result<()> {
        let mut tables = self.tables.lock();
        if tables.sessions.contains_key(&session.session_id) {
            return Err(BoardError::Validation(format!(
                "session id already exists: {}",
                session.session_id
            )));
        }
        tables.sessions.insert(session.session_id.clone(), session);
        Ok(())
    }

    fn session(&self, id: &str) -> Result<Option<ActorSession>> {
        Ok(self.tables.lock().sessions.get(id).cloned())
    }

    fn sessions(&self) -> Result<Vec<ActorSession>> {
        Ok(self.tables.lock().sessions.values().cloned().collect())
    }

    fn update_session(
        &self,
        id: &str,
        apply: &dyn Fn(&mut ActorSession),
    ) -> Result<ActorSession> {
        let mut tables = self.tables.lock();
        let session = tables
            .sessions
            .get_mut(id)
            .ok_or_else(|| BoardError::SessionNotFound(id.to_string()))?;
        apply(session);
        Ok(session.clone())
    }

    fn remove_session(&self, id: &str) -> Result<Option<ActorSession>> {
        Ok(self.tables.lock().sessions.remove(id))
    }

    fn locks_for_task(&self, task_id: &str) -> Result<Vec<TaskLock>> {
        let tables = self.tables.lock();
        Ok(tables
            .locks
            .values()
            .filter(|lock| lock.task_id == task_id)
            .cloned()
            .collect())
    }

    fn locks_for_session(&self, session_id: &str) -> Result<Vec<TaskLock>> {
        let tables = self.tables.lock();
        Ok(tables
            .locks
            .values()
            .filter(|lock| lock.session_id == session_id)
            .cloned()
            .collect())
    }

    fn try_acquire_active_lock(&self, lock: TaskLock) -> Result<LockAttempt> {
        let mut tables = self.tables.lock();
        tables.check_lock_references(&lock)?;

        if let Some(holder) = tables.active_holder(&lock.task_id) {
            if holder.session_id != lock.session_id {
                return Ok(LockAttempt::Held {
                    holder: holder.session_id.clone(),
                });
            }
            // Idempotent re-acquisition by the current holder.
            return Ok(LockAttempt::AlreadyHeldBySelf);
        }

        let key = (lock.task_id.clone(), lock.session_id.clone());
        tables.locks.insert(key, lock);
        Ok(LockAttempt::Granted)
    }

    fn store_shared_lock(&self, lock: TaskLock) -> Result<()> {
        let mut tables = self.tables.lock();
        tables.check_lock_references(&lock)?;

        let key = (lock.task_id.clone(), lock.session_id.clone());
        match tables.locks.get(&key) {
            // The session already owns the task; keep the exclusive row.
            Some(existing) if existing.lock_type == LockType::Active => Ok(()),
            _ => {
                tables.locks.insert(key, lock);
                Ok(())
            }
        }
    }

    fn remove_lock(&self, task_id: &str, session_id: &str) -> Result<Option<TaskLock>> {
        let key = (task_id.to_string(), session_id.to_string());
        Ok(self.tables.lock().locks.remove(&key))
    }

    fn remove_session_locks(&self, session_id: &str) -> Result<Vec<TaskLock>> {
        let mut tables = self.tables.lock();
        let keys: Vec<(String, String)> = tables
            .locks
            .keys()
            .filter(|(_, sid)| sid == session_id)
            .cloned()
            .collect();
        let mut removed = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(lock) = tables.locks.remove(&key) {
                removed.push(lock);
            }
        }
        Ok(removed)
    }

    fn insert_help_request(&self, request: HelpRequest) -> Result<()> {
        let mut tables = self.tables.lock();
        if tables.task_index(&request.task_id).is_none() {
            return Err(BoardError::TaskNotFound(request.task_id.clone()));
        }
        if !tables.sessions.contains_key(&request.requester_session_id) {
            return Err(BoardError::SessionNotFound(
                request.requester_session_id.clone(),
            ));
        }
        if tables.help_index(&request.id).is_some() {
            return Err(BoardError::Validation(format!(
                "help request id already exists: {}",
                request.id
            )));
        }
        tables.help_requests.push(request);
        Ok(())
    }

    fn help_request(&self, id: &str) -> Result<Option<HelpRequest>> {
        let tables = self.tables.lock();
        Ok(tables.help_index(id).map(|i| tables.help_requests[i].clone()))
    }

    fn help_requests(&self) -> Result<Vec<HelpRequest>> {
        Ok(self.tables.lock().help_requests.clone())
    }

    fn update_help_if(
        &self,
        id: &str,
        expected: HelpStatus,
        apply: &dyn Fn(&mut HelpRequest),
    ) -> Result<bool> {
        let mut tables = self.tables.lock();
        let index = tables
            .help_index(id)
            .ok_or_else(|| BoardError::HelpRequestNotFound(id.to_string()))?;
        let request = &mut tables.help_requests[index];
        if request.status != expected {
            return Ok(false);
        }
        apply(request);
        Ok(true)
    }

    fn insert_batch_job(&self, job: BatchJob) -> Result<()> {
        let mut tables = self.tables.lock();
        if tables.batch_jobs.contains_key(&job.batch_id) {
            return Err(BoardError::Validation(format!(
                "batch id already exists: {}",
                job.batch_id
            )));
        }
        tables.batch_jobs.insert(job.batch_id.clone(), job);
        Ok(())
    }

    fn batch_job(&self, id: &str) -> Result<Option<BatchJob>> {
        Ok(self.tables.lock().batch_jobs.get(id).cloned())
    }

    fn batch_jobs(&self) -> Result<Vec<BatchJob>> {
        Ok(self.tables.lock().batch_jobs.values().cloned().collect())
    }

    fn update_batch_job(&self, id: &str, apply: &dyn Fn(&mut BatchJob)) -> Result<BatchJob> {
        let mut tables = self.tables.lock();
        let job = tables
            .batch_jobs
            .get_mut(id)
            .ok_or_else(|| BoardError::BatchNotFound(id.to_string()))?;
        apply(job);
        Ok(job.clone())
    }
}
