//! Lifecycle events relayed to transports. Delivery is best-effort: a sink
//! must never block or fail a core operation.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::collab::LockType;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum BoardEvent {
    TaskAdded {
        task_id: String,
    },
    TaskClaimed {
        task_id: String,
        session_id: String,
    },
    TaskCompleted {
        task_id: String,
    },
    TaskFailed {
        task_id: String,
        reason: String,
    },
    LockAcquired {
        task_id: String,
        session_id: String,
        lock_type: LockType,
    },
    LockReleased {
        task_id: String,
        session_id: String,
    },
    SessionCheckedIn {
        session_id: String,
        actor_name: String,
    },
    SessionCheckedOut {
        session_id: String,
    },
    SessionTimedOut {
        session_id: String,
        actor_name: String,
    },
    HelpRequested {
        request_id: String,
        task_id: String,
    },
    HelpAccepted {
        request_id: String,
        helper_session_id: String,
    },
    HelpCompleted {
        request_id: String,
    },
    HelpCancelled {
        request_id: String,
    },
    HelpReopened {
        request_id: String,
    },
    BatchSubmitted {
        batch_id: String,
        task_count: usize,
    },
    BatchCompleted {
        batch_id: String,
    },
    BatchFailed {
        batch_id: String,
    },
}

impl BoardEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::TaskAdded { .. } => "task.added",
            Self::TaskClaimed { .. } => "task.claimed",
            Self::TaskCompleted { .. } => "task.completed",
            Self::TaskFailed { .. } => "task.failed",
            Self::LockAcquired { .. } => "lock.acquired",
            Self::LockReleased { .. } => "lock.released",
            Self::SessionCheckedIn { .. } => "session.checked_in",
            Self::SessionCheckedOut { .. } => "session.checked_out",
            Self::SessionTimedOut { .. } => "session.timed_out",
            Self::HelpRequested { .. } => "help.requested",
            Self::HelpAccepted { .. } => "help.accepted",
            Self::HelpCompleted { .. } => "help.completed",
            Self::HelpCancelled { .. } => "help.cancelled",
            Self::HelpReopened { .. } => "help.reopened",
            Self::BatchSubmitted { .. } => "batch.submitted",
            Self::BatchCompleted { .. } => "batch.completed",
            Self::BatchFailed { .. } => "batch.failed",
        }
    }
}

/// A dated event as a sink receives it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub at: DateTime<Utc>,
    #[serde(flatten)]
    pub event: BoardEvent,
}

pub trait EventSink: Send + Sync {
    /// Deliver one event. Implementations own their failure handling;
    /// errors must be swallowed (log and move on), never propagated.
    fn emit(&self, envelope: EventEnvelope);
}

/// Discards everything. The default sink.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopEventSink;

impl EventSink for NoopEventSink {
    fn emit(&self, _envelope: EventEnvelope) {}
}

/// Buffers events in memory. Used in tests and by polling transports.
#[derive(Default)]
pub struct BufferedEventSink {
    events: Mutex<Vec<EventEnvelope>>,
}

impl BufferedEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn drain(&self) -> Vec<EventEnvelope> {
        std::mem::take(&mut *self.events.lock())
    }

    pub fn kinds(&self) -> Vec<&'static str> {
        self.events.lock().iter().map(|e| e.event.kind()).collect()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }
}

impl EventSink for BufferedEventSink {
    fn emit(&self, envelope: EventEnvelope) {
        self.events.lock().push(envelope);
    }
}

/// Forwards to a caller-supplied hook, shielding the core from panics in
/// subscriber code.
pub struct HookEventSink {
    hook: Box<dyn Fn(&EventEnvelope) + Send + Sync>,
}

impl HookEventSink {
    pub fn new(hook: impl Fn(&EventEnvelope) + Send + Sync + 'static) -> Self {
        Self {
            hook: Box::new(hook),
        }
    }
}

impl EventSink for HookEventSink {
    fn emit(&self, envelope: EventEnvelope) {
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            (self.hook)(&envelope)
        }));
        if result.is_err() {
            warn!(event = envelope.event.kind(), "event hook panicked");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffered_sink_records_kinds_in_order() {
        let sink = BufferedEventSink::new();
        sink.emit(EventEnvelope {
            at: Utc::now(),
            event: BoardEvent::TaskAdded {
                task_id: "t1".to_string(),
            },
        });
        sink.emit(EventEnvelope {
            at: Utc::now(),
            event: BoardEvent::TaskClaimed {
                task_id: "t1".to_string(),
                session_id: "s1".to_string(),
            },
        });

        assert_eq!(sink.kinds(), vec!["task.added", "task.claimed"]);
        assert_eq!(sink.drain().len(), 2);
        assert!(sink.is_empty());
    }

    #[test]
    fn hook_panic_does_not_escape() {
        let sink = HookEventSink::new(|_| panic!("subscriber bug"));
        sink.emit(EventEnvelope {
            at: Utc::now(),
            event: BoardEvent::TaskCompleted {
                task_id: "t1".to_string(),
            },
        });
    }
}
