//! Core data model.
//!
//! A task is one admitted URL on its way through the worker pool. A crawl
//! result is the persisted record for that task, keyed by the same id, and
//! outlives the task indefinitely.

pub mod crawl;
pub mod task;

pub use crawl::*;
pub use task::{Task, TaskId};
