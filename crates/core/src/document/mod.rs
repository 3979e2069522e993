//! Task document module
//!
//! Pure functions over the markdown checklists that drive a batch run.

mod analyzer;

pub use analyzer::{
    count_checked_tasks, count_unfinished_tasks, first_unfinished_task, uncheck_all_tasks,
    TaskCounts,
};
