use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::BoardError;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum HelpUrgency {
    Low,
    #[default]
    Medium,
    High,
}

impl FromStr for HelpUrgency {
    type Err = BoardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            other => Err(BoardError::InvalidUrgency(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum HelpStatus {
    #[default]
    Open,
    Accepted,
    Completed,
    Cancelled,
}

impl HelpStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

/// A structured ask for assistance that never transfers task ownership.
///
/// Open -> Accepted happens exactly once (first accepter wins); Completed
/// only from Accepted. The timeout sweep may move an Accepted request back
/// to Open when the helper's session is reaped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HelpRequest {
    pub id: String,
    pub task_id: String,
    pub requester_session_id: String,
    pub help_type: String,
    pub context: String,
    pub urgency: HelpUrgency,
    pub estimated_time: Option<String>,
    pub status: HelpStatus,
    pub helper_session_id: Option<String>,
    pub response_message: Option<String>,
    pub outcome: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl HelpRequest {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: impl Into<String>,
        task_id: impl Into<String>,
        requester_session_id: impl Into<String>,
        help_type: impl Into<String>,
        context: impl Into<String>,
        urgency: HelpUrgency,
        estimated_time: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            task_id: task_id.into(),
            requester_session_id: requester_session_id.into(),
            help_type: help_type.into(),
            context: context.into(),
            urgency,
            estimated_time,
            status: HelpStatus::Open,
            helper_session_id: None,
            response_message: None,
            outcome: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn accept(&mut self, helper_session_id: &str, response: &str, now: DateTime<Utc>) {
        self.status = HelpStatus::Accepted;
        self.helper_session_id = Some(helper_session_id.to_string());
        self.response_message = Some(response.to_string());
        self.updated_at = now;
    }

    pub fn complete(&mut self, outcome: &str, now: DateTime<Utc>) {
        self.status = HelpStatus::Completed;
        self.outcome = Some(outcome.to_string());
        self.updated_at = now;
    }

    pub fn cancel(&mut self, now: DateTime<Utc>) {
        self.status = HelpStatus::Cancelled;
        self.updated_at = now;
    }

    /// The helper disappeared before finishing; the request goes back on
    /// offer so another session can accept it.
    pub fn reopen(&mut self, now: DateTime<Utc>) {
        self.status = HelpStatus::Open;
        self.helper_session_id = None;
        self.response_message = None;
        self.updated_at = now;
    }
}
