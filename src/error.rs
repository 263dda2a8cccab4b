//! Error types for crawlq.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid URL: {0}")]
    InvalidTarget(String),

    #[error("queue is full, please try again later")]
    QueueFull,

    #[error("queue is stopped and not accepting tasks")]
    QueueClosed,

    #[error("task {0} is already queued or running")]
    AlreadyActive(String),

    #[error("crawl result not found: {0}")]
    NotFound(String),

    /// Failure reported by the analyzer. Displays as the bare message so it
    /// can be stored verbatim as the result's error text.
    #[error("{0}")]
    Analysis(String),

    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Backpressure rejection; callers should retry later (HTTP 429).
    pub fn is_queue_full(&self) -> bool {
        matches!(self, Error::QueueFull)
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
