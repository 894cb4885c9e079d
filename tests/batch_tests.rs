mod common;

use std::sync::atomic::Ordering;

use taskboard::batch::ProviderBatchStatus;
use taskboard::{BatchStatus, BoardError, NewTask, TaskStatus};

use common::harness;

fn add_tasks(h: &common::Harness, ids: &[&str]) {
    for id in ids {
        h.ctx
            .tasks
            .add_task(NewTask::titled(format!("work {id}")).with_id(*id))
            .unwrap();
    }
}

#[test]
fn batch_multiple_marks_every_member_under_one_batch_id() {
    let h = harness();
    add_tasks(&h, &["t1", "t2", "t3"]);

    let job = h.ctx.batch.batch_multiple_tasks(3).unwrap().unwrap();
    assert_eq!(job.status, BatchStatus::Submitted);
    assert_eq!(job.task_ids.len(), 3);

    for id in ["t1", "t2", "t3"] {
        let task = h.ctx.tasks.get_task(id).unwrap();
        assert!(task.batched);
        assert_eq!(task.batch_id.as_deref(), Some(job.batch_id.as_str()));
    }
}

#[test]
fn failed_submission_marks_no_task() {
    let h = harness();
    add_tasks(&h, &["t1", "t2", "t3"]);
    h.provider.fail_submit.store(true, Ordering::SeqCst);

    let err = h.ctx.batch.batch_multiple_tasks(3).unwrap_err();
    assert!(matches!(err, BoardError::BatchProvider { .. }));

    for id in ["t1", "t2", "t3"] {
        let task = h.ctx.tasks.get_task(id).unwrap();
        assert!(!task.batched);
        assert!(task.batch_id.is_none());
    }
    assert!(h.ctx.batch.list_active_batches().unwrap().is_empty());
}

#[test]
fn batching_nothing_is_a_no_op() {
    let h = harness();
    assert!(h.ctx.batch.batch_multiple_tasks(5).unwrap().is_none());
}

#[test]
fn batched_tasks_leave_the_default_claim_scan() {
    let h = harness();
    add_tasks(&h, &["t1", "t2"]);

    h.ctx.batch.batch_multiple_tasks(1).unwrap().unwrap();

    // t1 went into the batch; the filtered scan moves on to t2, the
    // unfiltered scan still sees both.
    let next = h.ctx.tasks.find_next_claimable_task(true).unwrap().unwrap();
    assert_eq!(next.id, "t2");
    let next = h.ctx.tasks.find_next_claimable_task(false).unwrap().unwrap();
    assert_eq!(next.id, "t1");
}

#[test]
fn single_task_batching_rejects_ineligible_tasks() {
    let h = harness();
    add_tasks(&h, &["t1"]);

    let job = h.ctx.batch.batch_task("t1").unwrap();
    assert_eq!(job.task_ids, vec!["t1"]);

    // Already batched.
    assert!(matches!(
        h.ctx.batch.batch_task("t1"),
        Err(BoardError::Validation(_))
    ));
    assert!(matches!(
        h.ctx.batch.batch_task("ghost"),
        Err(BoardError::TaskNotFound(_))
    ));

    // Terminal tasks are not batchable either.
    add_tasks(&h, &["t2"]);
    let session = h.ctx.collab.check_in("refactor-bot", "1.0").unwrap();
    h.ctx.tasks.claim_task(Some("t2"), &session).unwrap();
    h.ctx.tasks.complete_task("t2", &session).unwrap();
    assert!(matches!(
        h.ctx.batch.batch_task("t2"),
        Err(BoardError::Validation(_))
    ));
}

#[test]
fn batched_task_stays_claimable_and_exclusive() {
    let h = harness();
    add_tasks(&h, &["t1"]);
    h.ctx.batch.batch_task("t1").unwrap();

    let a = h.ctx.collab.check_in("refactor-bot", "1.0").unwrap();
    let b = h.ctx.collab.check_in("proto-bot", "1.0").unwrap();

    let claimed = h.ctx.tasks.claim_task(Some("t1"), &a).unwrap().unwrap();
    assert_eq!(claimed.status, TaskStatus::InProgress);
    assert!(claimed.batched);
    assert!(matches!(
        h.ctx.tasks.claim_task(Some("t1"), &b),
        Err(BoardError::LockConflict { .. })
    ));
}

#[test]
fn provider_is_the_source_of_truth_for_completion() {
    let h = harness();
    add_tasks(&h, &["t1", "t2"]);
    let job = h.ctx.batch.batch_multiple_tasks(2).unwrap().unwrap();

    assert_eq!(
        h.ctx.batch.get_batch_status(&job.batch_id).unwrap(),
        BatchStatus::Submitted
    );

    h.provider
        .set_status(&job.batch_id, ProviderBatchStatus::Completed);
    assert_eq!(
        h.ctx.batch.get_batch_status(&job.batch_id).unwrap(),
        BatchStatus::Completed
    );

    // Terminal transitions are cached; later provider readings are moot.
    h.provider
        .set_status(&job.batch_id, ProviderBatchStatus::Failed);
    assert_eq!(
        h.ctx.batch.get_batch_status(&job.batch_id).unwrap(),
        BatchStatus::Completed
    );
}

#[test]
fn poll_batches_sweeps_every_open_window() {
    let h = harness();
    add_tasks(&h, &["t1", "t2"]);
    let first = h.ctx.batch.batch_multiple_tasks(1).unwrap().unwrap();
    let second = h.ctx.batch.batch_multiple_tasks(1).unwrap().unwrap();
    assert_ne!(first.batch_id, second.batch_id);
    assert_eq!(h.ctx.batch.list_active_batches().unwrap().len(), 2);

    h.provider
        .set_status(&first.batch_id, ProviderBatchStatus::Completed);
    h.provider
        .set_status(&second.batch_id, ProviderBatchStatus::Failed);

    assert_eq!(h.ctx.batch.poll_batches().unwrap(), 2);
    assert!(h.ctx.batch.list_active_batches().unwrap().is_empty());

    let kinds = h.sink.kinds();
    assert!(kinds.contains(&"batch.completed"));
    assert!(kinds.contains(&"batch.failed"));
}

#[test]
fn unknown_batch_id_is_not_found() {
    let h = harness();
    assert!(matches!(
        h.ctx.batch.get_batch_status("nope"),
        Err(BoardError::BatchNotFound(_))
    ));
}
