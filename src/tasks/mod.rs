//! 任务队列：固定顺序的目标任务与其状态机

pub mod manager;
pub mod seed;
pub mod types;

pub use manager::{CompletionVerdict, TaskManager};
pub use seed::{default_seed_tasks, seed_tasks_from_config};
pub use types::{current_of, NewTask, Task, TaskStatus};
