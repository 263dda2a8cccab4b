//! In-memory task queue and worker pool.
//!
//! A bounded buffer feeds a fixed set of worker tasks. Admission never
//! waits: when the buffer is full the caller gets [`Error::QueueFull`]
//! straight away and the persisted record is marked `error`.
//!
//! [`Error::QueueFull`]: crate::error::Error::QueueFull

pub mod service;
mod worker;

pub use service::QueueService;

use std::time::Duration;

use serde::Serialize;

use crate::error::{Error, Result};

/// Error text stored when admission is rejected for lack of buffer space.
pub const QUEUE_FULL_MESSAGE: &str = "queue is full";
/// Error text stored when admission happens after the pool was stopped.
pub const QUEUE_CLOSED_MESSAGE: &str = "queue is stopped";
/// Error text stored when the analysis succeeded but could not be saved.
pub const SAVE_FAILED_MESSAGE: &str = "failed to save crawl result";
/// Error text stored for tasks still buffered when the pool shut down.
pub const STOPPED_MESSAGE: &str = "queue stopped before task was processed";

/// Pool configuration. Immutable once the service is built.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Number of concurrent workers (>= 1).
    pub workers: usize,
    /// Buffer capacity (>= 1).
    pub buffer_size: usize,
    /// Extra analysis attempts after a failure. 0 disables retries.
    pub max_retries: u32,
    /// Pause between attempts.
    pub retry_delay: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            workers: 3,
            buffer_size: 100,
            max_retries: 3,
            retry_delay: Duration::from_secs(5),
        }
    }
}

impl QueueConfig {
    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(Error::Config(
                "worker count must be greater than 0".to_string(),
            ));
        }
        if self.buffer_size == 0 {
            return Err(Error::Config(
                "buffer size must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Point-in-time snapshot; not consistent with concurrent admissions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    /// Tasks sitting in the buffer, not yet picked up by a worker.
    pub queue_length: usize,
    /// Tasks admitted and not yet finished (buffered or running).
    pub active_tasks: usize,
    pub workers: usize,
    pub running: bool,
}
