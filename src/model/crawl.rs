//! Crawl result types, browsing filters and aggregate stats.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::TaskId;
use crate::error::Error;

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Lifecycle status of a crawl: `queued -> running -> completed | error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrawlStatus {
    Queued,
    Running,
    Completed,
    Error,
}

impl CrawlStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            CrawlStatus::Queued => "queued",
            CrawlStatus::Running => "running",
            CrawlStatus::Completed => "completed",
            CrawlStatus::Error => "error",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, CrawlStatus::Completed | CrawlStatus::Error)
    }
}

impl std::fmt::Display for CrawlStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CrawlStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(CrawlStatus::Queued),
            "running" => Ok(CrawlStatus::Running),
            "completed" => Ok(CrawlStatus::Completed),
            "error" => Ok(CrawlStatus::Error),
            other => Err(Error::Other(format!("unknown crawl status: {other}"))),
        }
    }
}

// ---------------------------------------------------------------------------
// Result
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeadingCounts {
    pub h1: u32,
    pub h2: u32,
    pub h3: u32,
    pub h4: u32,
    pub h5: u32,
    pub h6: u32,
}

impl HeadingCounts {
    /// Bump the counter for heading `level` (1..=6). Other levels are ignored.
    pub fn record(&mut self, level: u8) {
        match level {
            1 => self.h1 += 1,
            2 => self.h2 += 1,
            3 => self.h3 += 1,
            4 => self.h4 += 1,
            5 => self.h5 += 1,
            6 => self.h6 += 1,
            _ => {}
        }
    }

    pub fn total(&self) -> u32 {
        self.h1 + self.h2 + self.h3 + self.h4 + self.h5 + self.h6
    }
}

/// A link that answered with an error status or could not be reached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrokenLink {
    pub url: String,
    /// 0 when the link was unreachable.
    pub status_code: u16,
    pub status_text: String,
}

/// Persisted analysis record for one task.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrawlResult {
    pub id: TaskId,
    pub url: String,
    pub title: String,
    pub html_version: String,
    pub internal_links_count: u32,
    pub external_links_count: u32,
    pub inaccessible_links_count: u32,
    pub has_login_form: bool,
    pub heading_counts: HeadingCounts,
    pub broken_links: Vec<BrokenLink>,
    pub external_links: Vec<String>,
    pub status: CrawlStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CrawlResult {
    /// Empty record in `queued` state, as written at admission time.
    pub fn queued(id: TaskId, url: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            url: url.into(),
            title: String::new(),
            html_version: String::new(),
            internal_links_count: 0,
            external_links_count: 0,
            inaccessible_links_count: 0,
            has_login_form: false,
            heading_counts: HeadingCounts::default(),
            broken_links: Vec::new(),
            external_links: Vec::new(),
            status: CrawlStatus::Queued,
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }
}

// ---------------------------------------------------------------------------
// Browsing
// ---------------------------------------------------------------------------

pub const DEFAULT_PAGE_SIZE: u32 = 10;
pub const MAX_PAGE_SIZE: u32 = 100;

/// Sortable columns. Kept as an enum so it can be spliced into SQL safely.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    CreatedAt,
    #[default]
    UpdatedAt,
    Url,
    Title,
    Status,
}

impl SortField {
    pub fn column(self) -> &'static str {
        match self {
            SortField::CreatedAt => "created_at",
            SortField::UpdatedAt => "updated_at",
            SortField::Url => "url",
            SortField::Title => "title",
            SortField::Status => "status",
        }
    }
}

impl std::str::FromStr for SortField {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created_at" => Ok(SortField::CreatedAt),
            "updated_at" => Ok(SortField::UpdatedAt),
            "url" => Ok(SortField::Url),
            "title" => Ok(SortField::Title),
            "status" => Ok(SortField::Status),
            other => Err(Error::Other(format!("unknown sort field: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDir {
    Asc,
    #[default]
    Desc,
}

impl SortDir {
    pub fn keyword(self) -> &'static str {
        match self {
            SortDir::Asc => "ASC",
            SortDir::Desc => "DESC",
        }
    }
}

impl std::str::FromStr for SortDir {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "asc" => Ok(SortDir::Asc),
            "desc" => Ok(SortDir::Desc),
            other => Err(Error::Other(format!("unknown sort direction: {other}"))),
        }
    }
}

/// Filters for listing stored results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlFilters {
    pub status: Option<CrawlStatus>,
    /// Substring matched against url and title.
    pub search: Option<String>,
    /// 1-based.
    pub page: u32,
    pub page_size: u32,
    pub sort_by: SortField,
    pub sort_dir: SortDir,
}

impl Default for CrawlFilters {
    fn default() -> Self {
        Self {
            status: None,
            search: None,
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
            sort_by: SortField::default(),
            sort_dir: SortDir::default(),
        }
    }
}

impl CrawlFilters {
    /// Clamp paging into range and drop an empty search string.
    pub fn normalized(mut self) -> Self {
        if self.page < 1 {
            self.page = 1;
        }
        if self.page_size < 1 || self.page_size > MAX_PAGE_SIZE {
            self.page_size = DEFAULT_PAGE_SIZE;
        }
        if self
            .search
            .as_deref()
            .is_some_and(|s| s.trim().is_empty())
        {
            self.search = None;
        }
        self
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.page_size)
    }
}

/// One page of stored results.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrawlPage {
    pub results: Vec<CrawlResult>,
    pub total: u64,
    pub page: u32,
    pub page_size: u32,
    pub total_pages: u64,
}

impl CrawlPage {
    pub fn total_pages(total: u64, page_size: u32) -> u64 {
        let size = u64::from(page_size.max(1));
        total.div_ceil(size)
    }
}

/// Per-status counts over all stored results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlStats {
    pub total: u64,
    pub queued: u64,
    pub running: u64,
    pub completed: u64,
    pub error: u64,
}

impl CrawlStats {
    pub fn count(&mut self, status: CrawlStatus) {
        self.total += 1;
        match status {
            CrawlStatus::Queued => self.queued += 1,
            CrawlStatus::Running => self.running += 1,
            CrawlStatus::Completed => self.completed += 1,
            CrawlStatus::Error => self.error += 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filters_clamp_out_of_range_paging() {
        let filters = CrawlFilters {
            page: 0,
            page_size: 500,
            search: Some("   ".to_string()),
            ..Default::default()
        }
        .normalized();

        assert_eq!(filters.page, 1);
        assert_eq!(filters.page_size, DEFAULT_PAGE_SIZE);
        assert!(filters.search.is_none());
        assert_eq!(filters.offset(), 0);
    }

    #[test]
    fn filters_offset_follows_page() {
        let filters = CrawlFilters {
            page: 3,
            page_size: 25,
            ..Default::default()
        }
        .normalized();
        assert_eq!(filters.offset(), 50);
    }

    #[test]
    fn total_pages_rounds_up() {
        assert_eq!(CrawlPage::total_pages(0, 10), 0);
        assert_eq!(CrawlPage::total_pages(10, 10), 1);
        assert_eq!(CrawlPage::total_pages(11, 10), 2);
    }

    #[test]
    fn status_parses_its_own_display() {
        for status in [
            CrawlStatus::Queued,
            CrawlStatus::Running,
            CrawlStatus::Completed,
            CrawlStatus::Error,
        ] {
            assert_eq!(status.to_string().parse::<CrawlStatus>().unwrap(), status);
        }
        assert!("dead".parse::<CrawlStatus>().is_err());
    }

    #[test]
    fn result_json_uses_camel_case() {
        let result = CrawlResult::queued(TaskId::new(), "https://example.com");
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["htmlVersion"], "");
        assert_eq!(json["status"], "queued");
        assert_eq!(json["headingCounts"]["h1"], 0);
        assert!(json.get("errorMessage").is_none());

        let counts: HeadingCounts = serde_json::from_str("{}").unwrap();
        assert_eq!(counts, HeadingCounts::default());
    }

    #[test]
    fn heading_counts_ignore_unknown_levels() {
        let mut counts = HeadingCounts::default();
        counts.record(1);
        counts.record(6);
        counts.record(7);
        assert_eq!(counts.h1, 1);
        assert_eq!(counts.h6, 1);
        assert_eq!(counts.total(), 2);
    }
}
