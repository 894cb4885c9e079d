use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::BoardError;

/// How a session holds a task.
///
/// At most one `Active` lock exists per task; `Soft` (declared intent) and
/// `Helper` (assistance without ownership) coexist freely with each other
/// and with the single active holder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockType {
    Active,
    Soft,
    Helper,
}

impl LockType {
    pub fn is_exclusive(&self) -> bool {
        matches!(self, Self::Active)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Soft => "soft",
            Self::Helper => "helper",
        }
    }
}

impl FromStr for LockType {
    type Err = BoardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "soft" => Ok(Self::Soft),
            "helper" => Ok(Self::Helper),
            other => Err(BoardError::InvalidLockType(other.to_string())),
        }
    }
}

impl std::fmt::Display for LockType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One persisted lock row, keyed by (task_id, session_id). A session holds
/// at most one lock per task; re-acquiring with a stronger type upgrades
/// the row in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskLock {
    pub task_id: String,
    pub session_id: String,
    pub lock_type: LockType,
    pub acquired_at: DateTime<Utc>,
}

impl TaskLock {
    pub fn new(
        task_id: impl Into<String>,
        session_id: impl Into<String>,
        lock_type: LockType,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            session_id: session_id.into(),
            lock_type,
            acquired_at: now,
        }
    }
}
