use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// What the bulk processor needs to know about each member task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchItem {
    pub task_id: String,
    pub title: String,

    #[serde(default)]
    pub payload: serde_json::Value,
}

/// Provider-side view of a batch. The provider is the source of truth for
/// the submitted -> completed/failed transition; the core only caches it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderBatchStatus {
    Pending,
    Completed,
    Failed,
}

/// External bulk-processing collaborator.
///
/// Calls take an explicit timeout and may block on I/O; the core never
/// invokes them while holding a store critical section.
pub trait BatchProvider: Send + Sync {
    fn submit(&self, items: &[BatchItem], timeout: Duration) -> Result<String>;

    fn status(&self, batch_id: &str, timeout: Duration) -> Result<ProviderBatchStatus>;
}
