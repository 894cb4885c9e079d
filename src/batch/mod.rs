//! Batch windows: grouping eligible tasks for one external bulk-processing
//! submission without giving up per-task exclusivity.

mod job;
mod provider;

pub use job::{BatchJob, BatchStatus};
pub use provider::{BatchItem, BatchProvider, ProviderBatchStatus};

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::config::BatchConfig;
use crate::error::{BoardError, Result};
use crate::events::{BoardEvent, EventEnvelope, EventSink};
use crate::store::BoardStore;
use crate::tasks::TaskManager;

pub struct BatchManager {
    store: Arc<dyn BoardStore>,
    tasks: Arc<TaskManager>,
    provider: Arc<dyn BatchProvider>,
    sink: Arc<dyn EventSink>,
    clock: Arc<dyn Clock>,
    config: BatchConfig,
}

impl BatchManager {
    pub fn new(
        store: Arc<dyn BoardStore>,
        tasks: Arc<TaskManager>,
        provider: Arc<dyn BatchProvider>,
        sink: Arc<dyn EventSink>,
        clock: Arc<dyn Clock>,
        config: BatchConfig,
    ) -> Self {
        Self {
            store,
            tasks,
            provider,
            sink,
            clock,
            config,
        }
    }

    fn emit(&self, event: BoardEvent) {
        self.sink.emit(EventEnvelope {
            at: self.clock.now(),
            event,
        });
    }

    fn submit_to_provider(&self, items: &[BatchItem]) -> Result<String> {
        self.provider
            .submit(items, self.config.provider_timeout())
            .map_err(|e| BoardError::BatchProvider {
                operation: "submit".to_string(),
                message: e.to_string(),
            })
    }

    /// Put a single task into its own batch window. Eligible while the
    /// task is neither batched nor terminal.
    pub fn batch_task(&self, task_id: &str) -> Result<BatchJob> {
        let task = self
            .store
            .task(task_id)?
            .ok_or_else(|| BoardError::TaskNotFound(task_id.to_string()))?;
        if task.batched {
            return Err(BoardError::Validation(format!(
                "task {task_id} is already batched"
            )));
        }
        if task.status.is_terminal() {
            return Err(BoardError::Validation(format!(
                "task {task_id} is {}, not batchable",
                task.status
            )));
        }

        let items = vec![BatchItem {
            task_id: task.id.clone(),
            title: task.title.clone(),
            payload: serde_json::Value::Null,
        }];
        let batch_id = self.submit_to_provider(&items)?;
        self.record_batch(batch_id, vec![task.id])
    }

    /// Pull up to `max_tasks` unbatched claimable tasks and submit them as
    /// one batch job. All members are marked under the job's batch_id, or
    /// none are: a failed provider submission marks nothing, and a raced
    /// member set fails the whole job.
    pub fn batch_multiple_tasks(&self, max_tasks: usize) -> Result<Option<BatchJob>> {
        if max_tasks == 0 {
            return Err(BoardError::Validation(
                "max_tasks must be greater than 0".to_string(),
            ));
        }

        let members: Vec<_> = self
            .tasks
            .claimable_tasks(true)?
            .into_iter()
            .take(max_tasks.min(self.config.max_tasks))
            .collect();
        if members.is_empty() {
            debug!("no unbatched claimable tasks to batch");
            return Ok(None);
        }

        let items: Vec<BatchItem> = members
            .iter()
            .map(|task| BatchItem {
                task_id: task.id.clone(),
                title: task.title.clone(),
                payload: serde_json::Value::Null,
            })
            .collect();
        let batch_id = self.submit_to_provider(&items)?;
        let member_ids: Vec<String> = members.into_iter().map(|t| t.id).collect();
        self.record_batch(batch_id, member_ids).map(Some)
    }

    /// Persist the job, then mark the member set. The job row exists
    /// before any task references its batch_id; if marking loses a race
    /// the job is failed and no task is touched.
    fn record_batch(&self, batch_id: String, member_ids: Vec<String>) -> Result<BatchJob> {
        let now = self.clock.now();
        let mut batch_job = BatchJob::new(&batch_id, member_ids.clone(), now);
        batch_job.mark_submitted(now);
        self.store.insert_batch_job(batch_job)?;

        let marked = self.store.mark_tasks_batched(&member_ids, &batch_id)?;
        if !marked {
            let failed_at = self.clock.now();
            self.store
                .update_batch_job(&batch_id, &|job| job.mark_failed(failed_at))?;
            return Err(BoardError::Validation(format!(
                "batch {batch_id} membership changed during submission; no task was marked"
            )));
        }

        info!(batch_id = %batch_id, members = member_ids.len(), "batch submitted");
        self.emit(BoardEvent::BatchSubmitted {
            batch_id: batch_id.clone(),
            task_count: member_ids.len(),
        });
        self.store
            .batch_job(&batch_id)?
            .ok_or_else(|| BoardError::BatchNotFound(batch_id))
    }

    /// Current status of one batch. The provider is the source of truth
    /// for submitted -> completed/failed; the cached row only memoizes a
    /// transition the provider already reported.
    pub fn get_batch_status(&self, batch_id: &str) -> Result<BatchStatus> {
        let job = self
            .store
            .batch_job(batch_id)?
            .ok_or_else(|| BoardError::BatchNotFound(batch_id.to_string()))?;
        if job.status.is_terminal() {
            return Ok(job.status);
        }

        let remote = self
            .provider
            .status(batch_id, self.config.provider_timeout())
            .map_err(|e| BoardError::BatchProvider {
                operation: "status".to_string(),
                message: e.to_string(),
            })?;

        let now = self.clock.now();
        let updated = match remote {
            ProviderBatchStatus::Pending => return Ok(job.status),
            ProviderBatchStatus::Completed => self.store.update_batch_job(batch_id, &|j| {
                if !j.status.is_terminal() {
                    j.mark_completed(now);
                }
            })?,
            ProviderBatchStatus::Failed => self.store.update_batch_job(batch_id, &|j| {
                if !j.status.is_terminal() {
                    j.mark_failed(now);
                }
            })?,
        };

        match updated.status {
            BatchStatus::Completed => {
                info!(batch_id, "batch completed");
                self.emit(BoardEvent::BatchCompleted {
                    batch_id: batch_id.to_string(),
                });
            }
            BatchStatus::Failed => {
                warn!(batch_id, "batch failed");
                self.emit(BoardEvent::BatchFailed {
                    batch_id: batch_id.to_string(),
                });
            }
            _ => {}
        }
        Ok(updated.status)
    }

    pub fn list_active_batches(&self) -> Result<Vec<BatchJob>> {
        Ok(self
            .store
            .batch_jobs()?
            .into_iter()
            .filter(|job| !job.status.is_terminal())
            .collect())
    }

    /// Periodic sweep: refresh every open batch from the provider. A
    /// provider error on one batch is logged and skipped so the sweep
    /// finishes; returns how many batches reached a terminal state.
    pub fn poll_batches(&self) -> Result<usize> {
        let mut transitioned = 0;
        for job in self.list_active_batches()? {
            match self.get_batch_status(&job.batch_id) {
                Ok(status) if status.is_terminal() => transitioned += 1,
                Ok(_) => {}
                Err(e) => {
                    warn!(batch_id = %job.batch_id, error = %e, "batch status poll failed");
                }
            }
        }
        Ok(transitioned)
    }
}
