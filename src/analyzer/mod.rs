//! Page analysis: the collaborator the queue hands every task to.
//!
//! The queue treats an [`Analyzer`] as an opaque, possibly slow, possibly
//! failing call. It only looks at the `Ok`/`Err` branch of `analyze`.

pub mod html;
pub mod http;

pub use http::{AnalyzerConfig, HttpAnalyzer};

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::model::CrawlResult;

/// Schemes that must never reach the fetcher, matched anywhere in the URL.
const BLOCKED_PATTERNS: [&str; 4] = ["javascript:", "data:", "file:", "ftp:"];

#[async_trait]
pub trait Analyzer: Send + Sync {
    /// Reject targets before anything is persisted.
    fn validate(&self, url: &str) -> Result<()> {
        validate_url(url)
    }

    /// Analyze `url`. The returned result's id and status are overwritten by
    /// the worker, so implementations may leave them at any value.
    async fn analyze(&self, url: &str) -> Result<CrawlResult>;
}

/// Shared URL admission rule.
pub fn validate_url(url: &str) -> Result<()> {
    if url.is_empty() {
        return Err(Error::InvalidTarget("URL cannot be empty".to_string()));
    }
    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err(Error::InvalidTarget(
            "URL must start with http:// or https://".to_string(),
        ));
    }
    let lower = url.to_ascii_lowercase();
    if BLOCKED_PATTERNS.iter().any(|p| lower.contains(p)) {
        return Err(Error::InvalidTarget(
            "potentially malicious URL pattern detected".to_string(),
        ));
    }
    Ok(())
}
