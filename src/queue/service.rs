//! Queue service: admission, lifecycle and in-flight bookkeeping.

use std::collections::HashMap;
use std::sync::Arc;

use opentelemetry::KeyValue;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{Mutex, Notify, RwLock, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::{QUEUE_CLOSED_MESSAGE, QUEUE_FULL_MESSAGE, QueueConfig, QueueStats, STOPPED_MESSAGE};
use crate::analyzer::Analyzer;
use crate::error::{Error, Result};
use crate::model::{CrawlResult, CrawlStatus, Task, TaskId};
use crate::storage::ResultStore;
use crate::telemetry::metrics;

pub(super) type TaskReceiver = Arc<Mutex<mpsc::Receiver<Task>>>;

/// State shared between the service handle and every worker.
pub(super) struct Shared {
    pub(super) config: QueueConfig,
    pub(super) analyzer: Arc<dyn Analyzer>,
    pub(super) store: Arc<dyn ResultStore>,
    state: RwLock<PoolState>,
    /// Serializes start/stop so a second `stop` also waits for the workers.
    lifecycle: Mutex<()>,
    /// Fired whenever the in-flight set becomes empty.
    idle: Notify,
}

/// Everything guarded by the pool's single read/write lock.
struct PoolState {
    running: bool,
    /// The only sender. Dropping it closes the buffer.
    sender: Option<mpsc::Sender<Task>>,
    receiver: TaskReceiver,
    cancel: CancellationToken,
    workers: Vec<JoinHandle<()>>,
    active: HashMap<TaskId, Task>,
}

impl Shared {
    pub(super) async fn mark_running(&self, id: TaskId) {
        if let Some(task) = self.state.write().await.active.get_mut(&id) {
            task.status = CrawlStatus::Running;
        }
    }

    /// Drop a finished task from the in-flight set.
    pub(super) async fn finish(&self, id: TaskId) {
        let mut state = self.state.write().await;
        state.active.remove(&id);
        if state.active.is_empty() {
            self.idle.notify_waiters();
        }
    }
}

/// Bounded task queue with a fixed pool of workers.
///
/// Cheap to clone; clones share the same pool.
#[derive(Clone)]
pub struct QueueService {
    shared: Arc<Shared>,
}

impl QueueService {
    pub fn new(
        config: QueueConfig,
        analyzer: Arc<dyn Analyzer>,
        store: Arc<dyn ResultStore>,
    ) -> Result<Self> {
        config.validate()?;
        let (sender, receiver) = mpsc::channel(config.buffer_size);
        Ok(Self {
            shared: Arc::new(Shared {
                config,
                analyzer,
                store,
                state: RwLock::new(PoolState {
                    running: false,
                    sender: Some(sender),
                    receiver: Arc::new(Mutex::new(receiver)),
                    cancel: CancellationToken::new(),
                    workers: Vec::new(),
                    active: HashMap::new(),
                }),
                lifecycle: Mutex::new(()),
                idle: Notify::new(),
            }),
        })
    }

    pub fn config(&self) -> &QueueConfig {
        &self.shared.config
    }

    /// Spawn the workers. No-op if already running.
    ///
    /// A pool that was stopped gets a fresh buffer and cancellation token,
    /// so start/stop cycles are allowed.
    pub async fn start(&self) {
        let _lifecycle = self.shared.lifecycle.lock().await;
        let mut state = self.shared.state.write().await;
        if state.running {
            return;
        }

        if state.sender.is_none() {
            let (sender, receiver) = mpsc::channel(self.shared.config.buffer_size);
            state.sender = Some(sender);
            state.receiver = Arc::new(Mutex::new(receiver));
        }
        if state.cancel.is_cancelled() {
            state.cancel = CancellationToken::new();
        }
        state.running = true;

        for worker_id in 0..self.shared.config.workers {
            let handle = tokio::spawn(super::worker::run(
                Arc::clone(&self.shared),
                worker_id,
                Arc::clone(&state.receiver),
                state.cancel.clone(),
            ));
            state.workers.push(handle);
        }

        info!(workers = self.shared.config.workers, "queue service started");
    }

    /// Stop the pool and wait for every worker to exit. No-op if not running.
    ///
    /// Workers are cancelled and the buffer is closed. A worker in the middle
    /// of a task finishes it first. Whatever is still buffered once all
    /// workers are gone is marked `error` and dropped from the in-flight set.
    pub async fn stop(&self) {
        let _lifecycle = self.shared.lifecycle.lock().await;
        let (workers, receiver) = {
            let mut state = self.shared.state.write().await;
            if !state.running {
                return;
            }
            state.running = false;
            state.cancel.cancel();
            state.sender = None;
            (
                std::mem::take(&mut state.workers),
                Arc::clone(&state.receiver),
            )
        };

        info!(workers = workers.len(), "waiting for workers to finish");
        for handle in workers {
            if let Err(e) = handle.await {
                error!(error = %e, "worker terminated abnormally");
            }
        }

        self.fail_leftovers(&receiver).await;
        info!("queue service stopped");
    }

    /// Validate, persist and admit a new URL.
    ///
    /// Returns the persisted `queued` record. Invalid input fails before
    /// anything is written. A full buffer yields [`Error::QueueFull`] and the
    /// record just written is marked `error`.
    pub async fn enqueue(&self, url: &str) -> Result<CrawlResult> {
        if let Err(e) = self.shared.analyzer.validate(url) {
            metrics::tasks_admitted().add(1, &[KeyValue::new("result", "invalid")]);
            return Err(e);
        }

        let id = TaskId::new();
        let record = CrawlResult::queued(id, url);
        self.shared.store.save_result(&record).await?;

        self.admit(Task::queued(id, url), false).await?;
        info!(task_id = %id, url, "task enqueued");
        Ok(record)
    }

    /// Re-admit a stored result under its existing id.
    ///
    /// The id is reserved in the in-flight set before storage is touched,
    /// so a concurrent requeue of the same id is refused without
    /// overwriting the stored status.
    pub async fn requeue(&self, id: TaskId) -> Result<()> {
        let existing = self.shared.store.get_result(id).await?;
        let task = Task::queued(id, existing.url.as_str());

        {
            let mut state = self.shared.state.write().await;
            if state.active.contains_key(&id) {
                return Err(Error::AlreadyActive(id.to_string()));
            }
            state.active.insert(id, task.clone());
        }

        if let Err(e) = self
            .shared
            .store
            .update_status(id, CrawlStatus::Queued, None)
            .await
        {
            self.shared.finish(id).await;
            return Err(e);
        }

        self.admit(task, true).await?;
        info!(task_id = %id, url = %existing.url, "task requeued");
        Ok(())
    }

    /// Look up an admitted, unfinished task. Never consults storage.
    pub async fn active_task(&self, id: TaskId) -> Option<Task> {
        self.shared.state.read().await.active.get(&id).cloned()
    }

    pub async fn stats(&self) -> QueueStats {
        let state = self.shared.state.read().await;
        let queue_length = state
            .sender
            .as_ref()
            .map(|tx| tx.max_capacity() - tx.capacity())
            .unwrap_or(0);
        QueueStats {
            queue_length,
            active_tasks: state.active.len(),
            workers: self.shared.config.workers,
            running: state.running,
        }
    }

    /// Resolve once no task is in flight.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.shared.idle.notified();
            if self.shared.state.read().await.active.is_empty() {
                return;
            }
            notified.await;
        }
    }

    /// Non-blocking hand-off into the buffer.
    ///
    /// The in-flight insert happens in the same critical section as the
    /// send, so a worker can never finish a task before it is recorded.
    /// `reserved` means the caller already holds the in-flight entry; it is
    /// released again if the send is rejected.
    async fn admit(&self, task: Task, reserved: bool) -> Result<()> {
        let id = task.id;
        let rejection = {
            let mut state = self.shared.state.write().await;
            if !reserved && state.active.contains_key(&id) {
                return Err(Error::AlreadyActive(id.to_string()));
            }
            let sent = match state.sender.as_ref() {
                Some(tx) => tx.try_send(task.clone()),
                None => Err(TrySendError::Closed(task.clone())),
            };
            match sent {
                Ok(()) => {
                    state.active.insert(id, task);
                    None
                }
                Err(TrySendError::Full(_)) => Some((Error::QueueFull, QUEUE_FULL_MESSAGE, "full")),
                Err(TrySendError::Closed(_)) => {
                    Some((Error::QueueClosed, QUEUE_CLOSED_MESSAGE, "closed"))
                }
            }
        };

        let Some((err, message, label)) = rejection else {
            metrics::tasks_admitted().add(1, &[KeyValue::new("result", "ok")]);
            return Ok(());
        };

        if reserved {
            self.shared.finish(id).await;
        }
        metrics::tasks_admitted().add(1, &[KeyValue::new("result", label)]);
        warn!(task_id = %id, "task rejected: {err}");
        if let Err(e) = self
            .shared
            .store
            .update_status(id, CrawlStatus::Error, Some(message))
            .await
        {
            error!(task_id = %id, error = %e, "failed to mark rejected task as error");
        }
        Err(err)
    }

    async fn fail_leftovers(&self, receiver: &TaskReceiver) {
        let mut rx = receiver.lock().await;
        let mut dropped = 0usize;
        while let Ok(task) = rx.try_recv() {
            dropped += 1;
            if let Err(e) = self
                .shared
                .store
                .update_status(task.id, CrawlStatus::Error, Some(STOPPED_MESSAGE))
                .await
            {
                error!(task_id = %task.id, error = %e, "failed to mark dropped task as error");
            }
            self.shared.finish(task.id).await;
        }
        if dropped > 0 {
            warn!(dropped, "buffered tasks dropped on shutdown");
        }
    }
}
