//! Worker loop and per-task processing.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use opentelemetry::KeyValue;
use tokio::sync::Mutex;
use tokio::sync::mpsc::Receiver;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, error, info, warn};

use super::SAVE_FAILED_MESSAGE;
use super::service::{Shared, TaskReceiver};
use crate::error::Result;
use crate::model::{CrawlResult, CrawlStatus, Task};
use crate::telemetry::metrics;
use crate::telemetry::task::{record_state_transition, start_task_span};

/// Pull tasks until the buffer closes or the pool is cancelled.
///
/// Cancellation is only observed between tasks; a task that has been
/// received always runs to the end.
pub(super) async fn run(
    shared: Arc<Shared>,
    worker_id: usize,
    receiver: TaskReceiver,
    cancel: CancellationToken,
) {
    info!(worker_id, "worker started");

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!(worker_id, "worker cancelled, exiting");
                return;
            }
            task = next_task(&receiver) => task,
        };

        match next {
            Some(task) => process_task(&shared, worker_id, task, &cancel).await,
            None => {
                info!(worker_id, "queue closed, exiting");
                return;
            }
        }
    }
}

async fn next_task(receiver: &Mutex<Receiver<Task>>) -> Option<Task> {
    receiver.lock().await.recv().await
}

async fn process_task(shared: &Shared, worker_id: usize, task: Task, cancel: &CancellationToken) {
    let span = start_task_span(worker_id, &task.id, &task.url);

    async {
        let started = Instant::now();
        info!("processing task");

        shared.mark_running(task.id).await;
        record_state_transition(&span, "queued", "running");
        if let Err(e) = shared
            .store
            .update_status(task.id, CrawlStatus::Running, None)
            .await
        {
            // Bookkeeping only; the analysis still runs.
            warn!(error = %e, "failed to persist running status");
        }

        let status = match analyze_with_retries(shared, &task, cancel).await {
            Ok(mut result) => {
                result.id = task.id;
                result.status = CrawlStatus::Completed;
                result.error_message = None;
                result.updated_at = Utc::now();
                persist_completion(shared, &result).await
            }
            Err(e) => {
                let message = e.to_string();
                error!(error = %message, "analysis failed");
                if let Err(e) = shared
                    .store
                    .update_status(task.id, CrawlStatus::Error, Some(&message))
                    .await
                {
                    error!(error = %e, "failed to persist error status");
                }
                CrawlStatus::Error
            }
        };

        record_state_transition(&span, "running", status.as_str());
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        metrics::task_duration_ms().record(elapsed_ms, &[KeyValue::new("status", status.as_str())]);
        info!(%status, duration_ms = elapsed_ms as u64, "task finished");

        shared.finish(task.id).await;
    }
    .instrument(span.clone())
    .await
}

/// Save the completed result; a failed save turns the task into an error
/// so the outcome is not silently lost.
async fn persist_completion(shared: &Shared, result: &CrawlResult) -> CrawlStatus {
    match shared.store.save_result(result).await {
        Ok(()) => CrawlStatus::Completed,
        Err(e) => {
            error!(error = %e, "failed to save crawl result");
            if let Err(e) = shared
                .store
                .update_status(result.id, CrawlStatus::Error, Some(SAVE_FAILED_MESSAGE))
                .await
            {
                error!(error = %e, "failed to persist error status");
            }
            CrawlStatus::Error
        }
    }
}

/// Run the analyzer, retrying up to `max_retries` times. Pool cancellation
/// cuts the retry pause short and returns the last failure.
async fn analyze_with_retries(
    shared: &Shared,
    task: &Task,
    cancel: &CancellationToken,
) -> Result<CrawlResult> {
    let max_retries = shared.config.max_retries;
    let mut attempt = 0u32;

    loop {
        match shared.analyzer.analyze(&task.url).await {
            Ok(result) => return Ok(result),
            Err(e) if attempt < max_retries => {
                attempt += 1;
                warn!(attempt, max_retries, error = %e, "analysis failed, retrying");
                metrics::task_retries().add(1, &[]);
                tokio::select! {
                    _ = cancel.cancelled() => return Err(e),
                    _ = tokio::time::sleep(shared.config.retry_delay) => {}
                }
            }
            Err(e) => return Err(e),
        }
    }
}
