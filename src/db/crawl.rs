//! Crawl result persistence: the `ResultStore` contract plus the browsing
//! and maintenance queries used by the CLI.

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use sqlx::types::Json;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::model::*;
use crate::storage::ResultStore;

const RESULT_COLUMNS: &str = "id, url, title, html_version, internal_links_count, external_links_count, \
     inaccessible_links_count, has_login_form, heading_counts, broken_links, external_links, \
     status, error_message, created_at, updated_at";

#[async_trait]
impl ResultStore for super::Db {
    async fn save_result(&self, result: &CrawlResult) -> Result<()> {
        sqlx::query(
            "INSERT INTO crawl_results (id, url, title, html_version, internal_links_count, external_links_count,
                 inaccessible_links_count, has_login_form, heading_counts, broken_links, external_links,
                 status, error_message, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
             ON CONFLICT (id) DO UPDATE SET
                 title = EXCLUDED.title,
                 html_version = EXCLUDED.html_version,
                 internal_links_count = EXCLUDED.internal_links_count,
                 external_links_count = EXCLUDED.external_links_count,
                 inaccessible_links_count = EXCLUDED.inaccessible_links_count,
                 has_login_form = EXCLUDED.has_login_form,
                 heading_counts = EXCLUDED.heading_counts,
                 broken_links = EXCLUDED.broken_links,
                 external_links = EXCLUDED.external_links,
                 status = EXCLUDED.status,
                 error_message = EXCLUDED.error_message,
                 updated_at = EXCLUDED.updated_at",
        )
        .bind(result.id.0)
        .bind(&result.url)
        .bind(&result.title)
        .bind(&result.html_version)
        .bind(result.internal_links_count as i32)
        .bind(result.external_links_count as i32)
        .bind(result.inaccessible_links_count as i32)
        .bind(result.has_login_form)
        .bind(Json(&result.heading_counts))
        .bind(Json(&result.broken_links))
        .bind(Json(&result.external_links))
        .bind(result.status.as_str())
        .bind(result.error_message.as_deref())
        .bind(result.created_at)
        .bind(result.updated_at)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    async fn update_status(
        &self,
        id: TaskId,
        status: CrawlStatus,
        error_message: Option<&str>,
    ) -> Result<()> {
        let rows_affected = sqlx::query(
            "UPDATE crawl_results SET status = $1, error_message = $2, updated_at = $3 WHERE id = $4",
        )
        .bind(status.as_str())
        .bind(error_message)
        .bind(Utc::now())
        .bind(id.0)
        .execute(self.pool())
        .await?
        .rows_affected();

        if rows_affected == 0 {
            return Err(Error::NotFound(id.to_string()));
        }
        Ok(())
    }

    async fn get_result(&self, id: TaskId) -> Result<CrawlResult> {
        let row: Option<CrawlResultRow> = sqlx::query_as(&format!(
            "SELECT {RESULT_COLUMNS} FROM crawl_results WHERE id = $1"
        ))
        .bind(id.0)
        .fetch_optional(self.pool())
        .await?;

        row.ok_or_else(|| Error::NotFound(id.to_string()))?
            .try_into_result()
    }
}

impl super::Db {
    /// List results with filtering, sorting and pagination.
    pub async fn list_results(&self, filters: CrawlFilters) -> Result<CrawlPage> {
        let filters = filters.normalized();
        let status = filters.status.map(CrawlStatus::as_str);
        let search = filters.search.as_deref().map(|s| format!("%{s}%"));

        let (total,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM crawl_results
             WHERE ($1::text IS NULL OR status = $1)
             AND ($2::text IS NULL OR url ILIKE $2 OR title ILIKE $2)",
        )
        .bind(status)
        .bind(search.as_deref())
        .fetch_one(self.pool())
        .await?;

        // Sort column and direction come from closed enums, never user text.
        let rows: Vec<CrawlResultRow> = sqlx::query_as(&format!(
            "SELECT {RESULT_COLUMNS} FROM crawl_results
             WHERE ($1::text IS NULL OR status = $1)
             AND ($2::text IS NULL OR url ILIKE $2 OR title ILIKE $2)
             ORDER BY {} {}
             LIMIT $3 OFFSET $4",
            filters.sort_by.column(),
            filters.sort_dir.keyword(),
        ))
        .bind(status)
        .bind(search.as_deref())
        .bind(i64::from(filters.page_size))
        .bind(filters.offset() as i64)
        .fetch_all(self.pool())
        .await?;

        let results = rows
            .into_iter()
            .map(CrawlResultRow::try_into_result)
            .collect::<Result<Vec<_>>>()?;
        let total = total.max(0) as u64;

        Ok(CrawlPage {
            results,
            total,
            page: filters.page,
            page_size: filters.page_size,
            total_pages: CrawlPage::total_pages(total, filters.page_size),
        })
    }

    /// Delete results by id. Fails if none of them existed.
    pub async fn delete_results(&self, ids: &[TaskId]) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let ids: Vec<Uuid> = ids.iter().map(|id| id.0).collect();
        let rows_affected = sqlx::query("DELETE FROM crawl_results WHERE id = ANY($1)")
            .bind(&ids)
            .execute(self.pool())
            .await?
            .rows_affected();

        if rows_affected == 0 {
            return Err(Error::NotFound("no crawl results were deleted".to_string()));
        }
        Ok(rows_affected)
    }

    /// Total and per-status counts.
    pub async fn crawl_stats(&self) -> Result<CrawlStats> {
        let (total, queued, running, completed, error): (i64, i64, i64, i64, i64) =
            sqlx::query_as(
                "SELECT
                    COUNT(*),
                    COUNT(*) FILTER (WHERE status = 'queued'),
                    COUNT(*) FILTER (WHERE status = 'running'),
                    COUNT(*) FILTER (WHERE status = 'completed'),
                    COUNT(*) FILTER (WHERE status = 'error')
                 FROM crawl_results",
            )
            .fetch_one(self.pool())
            .await?;

        Ok(CrawlStats {
            total: total as u64,
            queued: queued as u64,
            running: running as u64,
            completed: completed as u64,
            error: error as u64,
        })
    }

    /// Set one status on many results and clear their error text.
    pub async fn bulk_update_status(&self, ids: &[TaskId], status: CrawlStatus) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let ids: Vec<Uuid> = ids.iter().map(|id| id.0).collect();
        let rows_affected = sqlx::query(
            "UPDATE crawl_results SET status = $1, updated_at = $2, error_message = NULL
             WHERE id = ANY($3)",
        )
        .bind(status.as_str())
        .bind(Utc::now())
        .bind(&ids)
        .execute(self.pool())
        .await?
        .rows_affected();

        if rows_affected == 0 {
            return Err(Error::NotFound("no crawl results were updated".to_string()));
        }
        Ok(rows_affected)
    }

    /// Remove finished results created before `now - older_than`.
    pub async fn cleanup_older_than(&self, older_than: TimeDelta) -> Result<u64> {
        let cutoff = cleanup_cutoff(Utc::now(), older_than)?;
        let rows_affected = sqlx::query(
            "DELETE FROM crawl_results
             WHERE created_at < $1 AND status IN ('completed', 'error')",
        )
        .bind(cutoff)
        .execute(self.pool())
        .await?
        .rows_affected();
        Ok(rows_affected)
    }
}

/// `now - older_than`, refusing negative ages and out-of-range dates.
pub(crate) fn cleanup_cutoff(now: DateTime<Utc>, older_than: TimeDelta) -> Result<DateTime<Utc>> {
    if older_than < TimeDelta::zero() {
        return Err(Error::Config(format!(
            "cleanup age must not be negative, got {older_than}"
        )));
    }
    now.checked_sub_signed(older_than).ok_or_else(|| {
        Error::Config(format!("cleanup age {older_than} reaches before the earliest date"))
    })
}

/// Internal row type for sqlx::FromRow.
#[derive(sqlx::FromRow)]
struct CrawlResultRow {
    id: Uuid,
    url: String,
    title: String,
    html_version: String,
    internal_links_count: i32,
    external_links_count: i32,
    inaccessible_links_count: i32,
    has_login_form: bool,
    heading_counts: Json<HeadingCounts>,
    broken_links: Json<Vec<BrokenLink>>,
    external_links: Json<Vec<String>>,
    status: String,
    error_message: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl CrawlResultRow {
    fn try_into_result(self) -> Result<CrawlResult> {
        Ok(CrawlResult {
            id: TaskId(self.id),
            url: self.url,
            title: self.title,
            html_version: self.html_version,
            internal_links_count: self.internal_links_count.max(0) as u32,
            external_links_count: self.external_links_count.max(0) as u32,
            inaccessible_links_count: self.inaccessible_links_count.max(0) as u32,
            has_login_form: self.has_login_form,
            heading_counts: self.heading_counts.0,
            broken_links: self.broken_links.0,
            external_links: self.external_links.0,
            status: self.status.parse()?,
            error_message: self.error_message,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cutoff_subtracts_age() {
        let now = Utc::now();
        let cutoff = cleanup_cutoff(now, TimeDelta::days(30)).unwrap();
        assert_eq!(now - cutoff, TimeDelta::days(30));
        assert_eq!(cleanup_cutoff(now, TimeDelta::zero()).unwrap(), now);
    }

    #[test]
    fn cutoff_rejects_negative_age() {
        let err = cleanup_cutoff(Utc::now(), TimeDelta::days(-1)).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn cutoff_overflow_is_an_error_not_a_panic() {
        let huge = TimeDelta::try_days(100_000_000).unwrap();
        let err = cleanup_cutoff(Utc::now(), huge).unwrap_err();
        assert!(matches!(err, Error::Config(_)));

        let err = cleanup_cutoff(Utc::now(), TimeDelta::MAX).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
