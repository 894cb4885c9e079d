use thiserror::Error;

#[derive(Error, Debug)]
pub enum BoardError {
    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Help request not found: {0}")]
    HelpRequestNotFound(String),

    #[error("Batch not found: {0}")]
    BatchNotFound(String),

    #[error("Task {task_id} is locked by session {holder}")]
    LockConflict { task_id: String, holder: String },

    #[error("Help request {request_id} was already accepted by {helper}")]
    DuplicateAccept { request_id: String, helper: String },

    #[error("Task {task_id} has incomplete dependencies: {}", blocking.join(", "))]
    DependenciesNotMet {
        task_id: String,
        blocking: Vec<String>,
    },

    #[error("Invalid priority: {0}")]
    InvalidPriority(String),

    #[error("Invalid task status: {0}")]
    InvalidStatus(String),

    #[error("Invalid lock type: {0}")]
    InvalidLockType(String),

    #[error("Invalid urgency: {0}")]
    InvalidUrgency(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Planner failed while decomposing {goal:?}: {message}")]
    Planner { goal: String, message: String },

    #[error("Batch provider failed during {operation}: {message}")]
    BatchProvider { operation: String, message: String },

    #[error("Store error: {0}")]
    Store(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl BoardError {
    /// Expected, recoverable contention. Callers should retry or pick a
    /// different task rather than treat these as fatal.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            Self::LockConflict { .. } | Self::DuplicateAccept { .. }
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::TaskNotFound(_)
                | Self::SessionNotFound(_)
                | Self::HelpRequestNotFound(_)
                | Self::BatchNotFound(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, BoardError>;
