//! Live page analyzer backed by reqwest.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Url};
use tracing::{debug, info, warn};

use super::Analyzer;
use super::html::{self, PageSummary};
use crate::error::{Error, Result};
use crate::model::{BrokenLink, CrawlResult, TaskId};

/// Settings for the HTTP analyzer.
#[derive(Debug, Clone)]
pub struct AnalyzerConfig {
    /// Per-request timeout, applied to the page fetch and each link probe.
    pub timeout: Duration,
    pub user_agent: String,
    /// How many discovered links get a HEAD probe for broken-link detection.
    pub max_links_to_check: usize,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            user_agent: "URL-Crawler-Bot/1.0".to_string(),
            max_links_to_check: 10,
        }
    }
}

/// Fetches a page over HTTP and summarizes its structure.
pub struct HttpAnalyzer {
    client: Client,
    config: AnalyzerConfig,
}

impl HttpAnalyzer {
    pub fn new(config: AnalyzerConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .build()?;
        Ok(Self { client, config })
    }

    async fn fetch(&self, url: &Url) -> Result<String> {
        let response = self.client.get(url.clone()).send().await?;
        let status = response.status();
        if status.is_client_error() || status.is_server_error() {
            return Err(Error::Analysis(format!(
                "page returned HTTP {}",
                status.as_u16()
            )));
        }
        Ok(response.text().await?)
    }

    /// HEAD each candidate link; `None` means the link answered fine.
    async fn probe(&self, link: &Url) -> Option<BrokenLink> {
        match self.client.head(link.clone()).send().await {
            Ok(resp) if resp.status().is_client_error() || resp.status().is_server_error() => {
                let status = resp.status();
                Some(BrokenLink {
                    url: link.to_string(),
                    status_code: status.as_u16(),
                    status_text: status.canonical_reason().unwrap_or("").to_string(),
                })
            }
            Ok(_) => None,
            Err(e) => {
                debug!(link = %link, error = %e, "link probe failed");
                Some(BrokenLink {
                    url: link.to_string(),
                    status_code: 0,
                    status_text: "unreachable".to_string(),
                })
            }
        }
    }

    async fn broken_links(&self, summary: &PageSummary) -> Vec<BrokenLink> {
        let candidates = summary
            .internal_links
            .iter()
            .chain(summary.external_links.iter())
            .take(self.config.max_links_to_check);

        let mut broken = Vec::new();
        for link in candidates {
            if let Some(b) = self.probe(link).await {
                broken.push(b);
            }
        }
        broken
    }
}

#[async_trait]
impl Analyzer for HttpAnalyzer {
    async fn analyze(&self, url: &str) -> Result<CrawlResult> {
        let parsed = Url::parse(url).map_err(|e| Error::InvalidTarget(e.to_string()))?;

        let body = self.fetch(&parsed).await?;
        let summary = html::inspect(&parsed, &body);
        let broken_links = self.broken_links(&summary).await;
        if !broken_links.is_empty() {
            warn!(url, count = broken_links.len(), "broken links found");
        }

        // The worker replaces id and status with the task's own.
        let mut result = CrawlResult::queued(TaskId::new(), url);
        result.title = summary.title;
        result.html_version = summary.html_version;
        result.heading_counts = summary.headings;
        result.has_login_form = summary.has_login_form;
        result.internal_links_count = summary.internal_links_count;
        result.external_links_count = summary.external_links.len() as u32;
        result.external_links = summary
            .external_links
            .iter()
            .map(Url::to_string)
            .collect();
        result.inaccessible_links_count = broken_links.len() as u32;
        result.broken_links = broken_links;

        info!(
            url,
            internal = result.internal_links_count,
            external = result.external_links_count,
            inaccessible = result.inaccessible_links_count,
            "page analyzed"
        );
        Ok(result)
    }
}
