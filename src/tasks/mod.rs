//! Task Lifecycle Manager: task CRUD, status transitions, permission checks.

pub mod manager;
pub mod model;

pub use manager::TaskManager;
pub use model::{DeleteOutcome, NewTask, Task, TaskFilter, TaskPatch, TaskPriority, TaskStatus};
