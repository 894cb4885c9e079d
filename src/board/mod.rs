//! Task records and their lifecycle vocabulary.

mod status;
mod task;

pub use status::{Priority, TaskStatus};
pub use task::{NewTask, Task, TaskFilter};
