//! taskboard: a multi-agent task coordination core.
//!
//! Multiple actors (human or automated) share one backlog. The crate owns
//! the claim/lock/dependency protocol that keeps two actors off the same
//! task, the help-request workflow for borrowing assistance without losing
//! ownership, and the batch windows that hand groups of eligible tasks to
//! an external bulk processor.
//!
//! Transports, payload execution, and persistence engine internals live
//! outside; the core is consumed as an in-process API behind
//! [`CoordinationContext`].

pub mod batch;
pub mod board;
pub mod clock;
pub mod collab;
pub mod config;
pub mod context;
pub mod error;
pub mod events;
pub mod planning;
pub mod store;
pub mod tasks;

pub use batch::{BatchItem, BatchJob, BatchManager, BatchProvider, BatchStatus};
pub use board::{NewTask, Priority, Task, TaskFilter, TaskStatus};
pub use clock::{Clock, ManualClock, SystemClock};
pub use collab::{
    ActorSession, AgentMatch, CapabilityProfile, CapabilityRegistry, CollaborationManager,
    HelpRequest, HelpStatus, HelpUrgency, LockType, TaskLock,
};
pub use config::BoardConfig;
pub use context::{ContextBuilder, CoordinationContext};
pub use error::{BoardError, Result};
pub use events::{BoardEvent, BufferedEventSink, EventEnvelope, EventSink, NoopEventSink};
pub use planning::{PlanConstraints, Planner, SubtaskDescriptor};
pub use store::{BoardStore, LockAttempt, MemoryStore};
pub use tasks::{HealthStatus, HealthSummary, TaskManager};
