//! crawlq CLI: run URL analyses through the worker pool and browse results.

use std::io::BufRead;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use crawlq::analyzer::HttpAnalyzer;
use crawlq::config::Config;
use crawlq::config::secrets::{ExposeSecret, redact_url};
use crawlq::db::Db;
use crawlq::model::{CrawlFilters, CrawlResult, CrawlStatus, SortDir, SortField, TaskId};
use crawlq::queue::QueueService;
use crawlq::storage::ResultStore;
use crawlq::telemetry::{TelemetryConfig, TelemetryGuard, init_telemetry};
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "crawlq", about = "Bounded URL analysis queue")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Analyze URLs through the worker pool and wait for the results
    Crawl {
        /// URLs to analyze; read one per line from stdin when omitted
        urls: Vec<String>,
    },
    /// Re-run the analysis for stored results
    Rerun {
        /// Result IDs
        #[arg(required = true)]
        ids: Vec<TaskId>,
    },
    /// List stored results
    List {
        #[arg(long)]
        status: Option<CrawlStatus>,
        /// Substring matched against URL and title
        #[arg(long)]
        search: Option<String>,
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long, default_value_t = 10)]
        page_size: u32,
        /// created_at | updated_at | url | title | status
        #[arg(long, default_value = "updated_at")]
        sort: SortField,
        /// asc | desc
        #[arg(long, default_value = "desc")]
        dir: SortDir,
        /// Print the page as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show a stored result
    Show {
        id: TaskId,
        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },
    /// Per-status counts
    Stats {
        #[arg(long)]
        json: bool,
    },
    /// Delete stored results
    Delete {
        #[arg(required = true)]
        ids: Vec<TaskId>,
    },
    /// Force the status of stored results (clears the error message)
    Mark {
        #[arg(long)]
        status: CrawlStatus,
        #[arg(required = true)]
        ids: Vec<TaskId>,
    },
    /// Delete finished results older than N days
    Cleanup {
        #[arg(long, value_parser = clap::value_parser!(i64).range(0..))]
        older_than_days: i64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = Config::from_env()?;
    let _guard = telemetry(&config)?;

    info!(
        database = %redact_url(&config.database_url),
        workers = config.queue.workers,
        buffer_size = config.queue.buffer_size,
        "configuration loaded"
    );

    let db = Db::connect(config.database_url.expose_secret(), config.db_max_connections).await?;
    db.health_check().await?;
    db.migrate().await?;
    let db = Arc::new(db);

    match cli.command {
        Command::Crawl { urls } => {
            let urls = if urls.is_empty() { read_stdin()? } else { urls };
            cmd_crawl(&config, db, urls).await
        }
        Command::Rerun { ids } => cmd_rerun(&config, db, ids).await,
        Command::List {
            status,
            search,
            page,
            page_size,
            sort,
            dir,
            json,
        } => {
            let filters = CrawlFilters {
                status,
                search,
                page,
                page_size,
                sort_by: sort,
                sort_dir: dir,
            };
            cmd_list(&db, filters, json).await
        }
        Command::Show { id, json } => cmd_show(&db, id, json).await,
        Command::Stats { json } => {
            let stats = db.crawl_stats().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
                return Ok(());
            }
            println!("Total:      {}", stats.total);
            println!("Queued:     {}", stats.queued);
            println!("Running:    {}", stats.running);
            println!("Completed:  {}", stats.completed);
            println!("Error:      {}", stats.error);
            Ok(())
        }
        Command::Delete { ids } => {
            let n = db.delete_results(&ids).await?;
            println!("Deleted {n} result(s)");
            Ok(())
        }
        Command::Mark { status, ids } => {
            let n = db.bulk_update_status(&ids, status).await?;
            println!("Marked {n} result(s) as {status}");
            Ok(())
        }
        Command::Cleanup { older_than_days } => {
            let age = chrono::TimeDelta::try_days(older_than_days).ok_or_else(|| {
                anyhow::anyhow!("--older-than-days {older_than_days} is out of range")
            })?;
            let n = db.cleanup_older_than(age).await?;
            println!("Removed {n} finished result(s) older than {older_than_days} day(s)");
            Ok(())
        }
    }
}

fn telemetry(config: &Config) -> anyhow::Result<TelemetryGuard> {
    Ok(init_telemetry(TelemetryConfig {
        endpoint: config.otel_endpoint.clone(),
        service_name: "crawlq".to_string(),
        default_filter: config.log_level.clone(),
    })?)
}

fn read_stdin() -> anyhow::Result<Vec<String>> {
    let mut urls = Vec::new();
    for line in std::io::stdin().lock().lines() {
        let line = line?;
        let line = line.trim();
        if !line.is_empty() && !line.starts_with('#') {
            urls.push(line.to_string());
        }
    }
    Ok(urls)
}

fn build_queue(config: &Config, db: Arc<Db>) -> anyhow::Result<QueueService> {
    let analyzer = HttpAnalyzer::new(config.analyzer.clone())?;
    Ok(QueueService::new(config.queue.clone(), Arc::new(analyzer), db)?)
}

/// Wait for the pool to drain, or for Ctrl-C, then stop it.
async fn drain_and_stop(queue: &QueueService) {
    tokio::select! {
        _ = queue.wait_idle() => {}
        _ = tokio::signal::ctrl_c() => warn!("interrupted, stopping queue"),
    }
    queue.stop().await;
}

async fn cmd_crawl(config: &Config, db: Arc<Db>, urls: Vec<String>) -> anyhow::Result<()> {
    if urls.is_empty() {
        anyhow::bail!("no URLs given");
    }

    let queue = build_queue(config, Arc::clone(&db))?;
    queue.start().await;

    let mut admitted = Vec::new();
    for url in &urls {
        match queue.enqueue(url).await {
            Ok(record) => admitted.push(record.id),
            Err(e) if e.is_queue_full() => println!("REJECTED  {url}  ({e})"),
            Err(e) => println!("INVALID   {url}  ({e})"),
        }
    }

    drain_and_stop(&queue).await;
    report(&db, &admitted).await
}

async fn cmd_rerun(config: &Config, db: Arc<Db>, ids: Vec<TaskId>) -> anyhow::Result<()> {
    let queue = build_queue(config, Arc::clone(&db))?;
    queue.start().await;

    let mut admitted = Vec::new();
    for id in ids {
        match queue.requeue(id).await {
            Ok(()) => admitted.push(id),
            Err(e) => println!("FAILED    {id}  ({e})"),
        }
    }

    drain_and_stop(&queue).await;
    report(&db, &admitted).await
}

async fn report(db: &Db, ids: &[TaskId]) -> anyhow::Result<()> {
    for id in ids {
        let result = db.get_result(*id).await?;
        if !result.status.is_terminal() {
            println!("PENDING   {}  {}  (interrupted before it finished)", result.id, result.url);
            continue;
        }
        println!(
            "{:<10}{}  {}{}",
            result.status.as_str().to_uppercase(),
            result.id,
            result.url,
            result
                .error_message
                .as_deref()
                .map(|e| format!("  ({e})"))
                .unwrap_or_default()
        );
    }
    Ok(())
}

async fn cmd_list(db: &Db, filters: CrawlFilters, json: bool) -> anyhow::Result<()> {
    let page = db.list_results(filters).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&page)?);
        return Ok(());
    }

    if page.results.is_empty() {
        println!("No crawl results found.");
        return Ok(());
    }

    println!("{:<36}  {:<10}  {:<40}  UPDATED", "ID", "STATUS", "URL");
    println!("{}", "-".repeat(110));
    for result in &page.results {
        let url = if result.url.chars().count() > 40 {
            format!("{}...", result.url.chars().take(37).collect::<String>())
        } else {
            result.url.clone()
        };
        println!(
            "{:<36}  {:<10}  {:<40}  {}",
            result.id,
            result.status,
            url,
            result.updated_at.format("%Y-%m-%d %H:%M")
        );
    }

    println!(
        "\npage {}/{} ({} result(s) total)",
        page.page,
        page.total_pages.max(1),
        page.total
    );
    Ok(())
}

async fn cmd_show(db: &Db, id: TaskId, json: bool) -> anyhow::Result<()> {
    let result: CrawlResult = db.get_result(id).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    println!("ID:           {}", result.id);
    println!("URL:          {}", result.url);
    println!("Status:       {}", result.status);
    if let Some(ref err) = result.error_message {
        println!("Error:        {err}");
    }
    println!("Title:        {}", result.title);
    println!("HTML version: {}", result.html_version);
    let h = result.heading_counts;
    println!(
        "Headings:     h1={} h2={} h3={} h4={} h5={} h6={}",
        h.h1, h.h2, h.h3, h.h4, h.h5, h.h6
    );
    println!("Internal:     {}", result.internal_links_count);
    println!("External:     {}", result.external_links_count);
    println!("Inaccessible: {}", result.inaccessible_links_count);
    println!("Login form:   {}", if result.has_login_form { "yes" } else { "no" });
    for link in &result.broken_links {
        println!("  broken: {} ({} {})", link.url, link.status_code, link.status_text);
    }
    println!("Created:      {}", result.created_at);
    println!("Updated:      {}", result.updated_at);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cleanup_rejects_negative_days() {
        assert!(Cli::try_parse_from(["crawlq", "cleanup", "--older-than-days=-1"]).is_err());

        let cli = Cli::try_parse_from(["crawlq", "cleanup", "--older-than-days", "0"]).unwrap();
        assert!(matches!(cli.command, Command::Cleanup { older_than_days: 0 }));
    }

    #[test]
    fn list_parses_filters() {
        let cli = Cli::try_parse_from([
            "crawlq", "list", "--status", "error", "--sort", "url", "--dir", "asc",
        ])
        .unwrap();
        let Command::List {
            status, sort, dir, ..
        } = cli.command
        else {
            panic!("expected list");
        };
        assert_eq!(status, Some(CrawlStatus::Error));
        assert_eq!(sort, SortField::Url);
        assert_eq!(dir, SortDir::Asc);
    }
}
