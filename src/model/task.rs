//! In-flight task types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::CrawlStatus;

/// Newtype for task ids. Shared with the persisted [`super::CrawlResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub Uuid);

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for TaskId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// A unit of work admitted into the queue.
///
/// The id is always assigned by the submitter before the task reaches the
/// buffer or the in-flight set; workers never mint ids.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    /// Opaque payload handed to the analyzer (a URL here).
    pub url: String,
    pub created_at: DateTime<Utc>,
    pub status: CrawlStatus,
}

impl Task {
    pub(crate) fn queued(id: TaskId, url: impl Into<String>) -> Self {
        Self {
            id,
            url: url.into(),
            created_at: Utc::now(),
            status: CrawlStatus::Queued,
        }
    }
}
