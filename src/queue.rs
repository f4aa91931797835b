//! Fixed-size task queue with a fixed pool of workers
//!
//! [`TaskQueue`] is the simple, non-adaptive primitive: a bounded buffer feeding a
//! pool of `worker_count` tokio tasks that never grows or shrinks. It is used for
//! work produced continuously while a build phase runs (resource downloads, link
//! validation). The adaptive counterpart for known batches is
//! [`Backend`](crate::dispatch::Backend).
//!
//! Admission is non-blocking: [`TaskQueue::add_task`] returns `false` when the
//! queue is closed or its buffer is full. The producer decides what a rejection
//! means (log and drop, or fail the scheduling call).

use crate::context::Context;
use crate::error::{ContextError, Error, Result, WorkerError};
use crate::worker::Worker;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// Buffer capacity used by [`TaskQueue::new`]
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Counters describing what a queue has done so far
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    /// Tasks accepted by `add_task`
    pub accepted: u64,
    /// Tasks refused by `add_task`
    pub rejected: u64,
    /// Tasks whose worker returned successfully
    pub completed: u64,
    /// Tasks whose worker returned an error
    pub failed: u64,
}

/// State shared between the queue handle, its controller and the worker tasks
struct QueueShared {
    name: String,
    fail_fast: bool,
    /// Admission flag; the write lock orders `stop` after any in-progress send
    open: RwLock<bool>,
    /// Fires when admission closes so idle workers drain and exit
    stopped: CancellationToken,
    /// Queue-scoped context, canceled on fail-fast abort
    ctx: Context,
    tracker: TaskTracker,
    first_error: Mutex<Option<WorkerError>>,
    aborted: Mutex<Option<ContextError>>,
    accepted: AtomicU64,
    rejected: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
}

impl QueueShared {
    fn close(&self) {
        match self.open.write() {
            Ok(mut open) => *open = false,
            Err(poisoned) => *poisoned.into_inner() = false,
        }
        self.stopped.cancel();
    }

    fn stats(&self) -> QueueStats {
        QueueStats {
            accepted: self.accepted.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }

    fn record_failure(&self, err: WorkerError) {
        self.failed.fetch_add(1, Ordering::Relaxed);

        if !self.fail_fast {
            tracing::warn!(queue = %self.name, code = err.code(), error = %err, "task failed, continuing");
            return;
        }

        let first = {
            let mut slot = self
                .first_error
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if slot.is_none() {
                *slot = Some(err.clone());
                true
            } else {
                false
            }
        };

        if first {
            tracing::error!(queue = %self.name, code = err.code(), error = %err, "task failed, aborting queue");
            self.close();
            self.ctx.cancel();
        }
    }

    fn record_abort(&self, err: ContextError) {
        let mut slot = self
            .aborted
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if slot.is_none() {
            *slot = Some(err);
        }
    }
}

/// Producer handle of a task queue
///
/// Cheap to clone; every clone feeds the same buffer.
pub struct TaskQueue<T> {
    shared: Arc<QueueShared>,
    sender: mpsc::Sender<T>,
}

impl<T> Clone for TaskQueue<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            sender: self.sender.clone(),
        }
    }
}

/// Handle to stop a queue and await its drain
#[derive(Clone)]
pub struct QueueController {
    shared: Arc<QueueShared>,
}

/// Outcome of one worker iteration
enum Next<T> {
    Task(T),
    Closed,
    Abort(ContextError),
}

impl<T> TaskQueue<T>
where
    T: Send + 'static,
{
    /// Create a queue with [`DEFAULT_QUEUE_CAPACITY`] and start its workers
    ///
    /// # Arguments
    ///
    /// * `ctx` - Context governing the queue; canceling it stops all workers
    /// * `name` - Queue name used in logs and errors
    /// * `worker_count` - Fixed number of workers (must be > 0)
    /// * `worker` - Work function shared by all workers
    /// * `fail_fast` - Abort the queue on the first task error instead of logging and continuing
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `worker_count` is zero.
    pub fn new<W>(
        ctx: &Context,
        name: &str,
        worker_count: usize,
        worker: W,
        fail_fast: bool,
    ) -> Result<(Self, QueueController)>
    where
        W: Worker<T> + 'static,
    {
        Self::with_capacity(
            ctx,
            name,
            worker_count,
            DEFAULT_QUEUE_CAPACITY,
            worker,
            fail_fast,
        )
    }

    /// Create a queue with an explicit buffer capacity and start its workers
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `worker_count` or `capacity` is zero.
    pub fn with_capacity<W>(
        ctx: &Context,
        name: &str,
        worker_count: usize,
        capacity: usize,
        worker: W,
        fail_fast: bool,
    ) -> Result<(Self, QueueController)>
    where
        W: Worker<T> + 'static,
    {
        if worker_count == 0 {
            return Err(Error::config(
                "worker_count",
                format!("queue {name} needs at least one worker"),
            ));
        }
        if capacity == 0 {
            return Err(Error::config(
                "capacity",
                format!("queue {name} needs a buffer capacity of at least one task"),
            ));
        }

        let (sender, receiver) = mpsc::channel(capacity);
        let receiver = Arc::new(tokio::sync::Mutex::new(receiver));
        let worker = Arc::new(worker);

        let shared = Arc::new(QueueShared {
            name: name.to_string(),
            fail_fast,
            open: RwLock::new(true),
            stopped: CancellationToken::new(),
            ctx: ctx.child(),
            tracker: TaskTracker::new(),
            first_error: Mutex::new(None),
            aborted: Mutex::new(None),
            accepted: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
            completed: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        });

        for slot in 0..worker_count {
            let shared = Arc::clone(&shared);
            let receiver = Arc::clone(&receiver);
            let worker = Arc::clone(&worker);
            shared
                .tracker
                .clone()
                .spawn(run_worker(slot, shared, receiver, worker));
        }
        shared.tracker.close();

        tracing::debug!(queue = %name, worker_count, capacity, fail_fast, "task queue started");

        Ok((
            Self {
                shared: Arc::clone(&shared),
                sender,
            },
            QueueController { shared },
        ))
    }

    /// Offer a task to the queue
    ///
    /// Returns `false` when the queue is closed or its buffer is full; the task is
    /// dropped and will never be executed. Never blocks.
    pub fn add_task(&self, task: T) -> bool {
        let open = match self.shared.open.read() {
            Ok(open) => open,
            Err(poisoned) => poisoned.into_inner(),
        };

        if !*open {
            self.shared.rejected.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(queue = %self.shared.name, "task rejected: queue closed");
            return false;
        }

        match self.sender.try_send(task) {
            Ok(()) => {
                self.shared.accepted.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(TrySendError::Full(_)) => {
                self.shared.rejected.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(queue = %self.shared.name, "task rejected: queue full");
                false
            }
            Err(TrySendError::Closed(_)) => {
                self.shared.rejected.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(queue = %self.shared.name, "task rejected: workers gone");
                false
            }
        }
    }

    /// Queue name
    pub fn name(&self) -> &str {
        &self.shared.name
    }
}

impl QueueController {
    /// Close admission; already buffered tasks still run
    pub fn stop(&self) {
        tracing::debug!(queue = %self.shared.name, "stopping task queue");
        self.shared.close();
    }

    /// Wait until every worker has exited
    ///
    /// Workers exit once [`stop`](Self::stop) was called and the buffer is
    /// drained, after a fail-fast abort, or when the governing context ends.
    ///
    /// # Errors
    ///
    /// - [`Error::Worker`] with the first task error in fail-fast mode
    /// - [`Error::Context`] when the governing context ended before the drain finished
    pub async fn wait(&self) -> Result<QueueStats> {
        self.shared.tracker.wait().await;

        let stats = self.shared.stats();
        let first_error = self
            .shared
            .first_error
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();
        if let Some(err) = first_error {
            return Err(Error::Worker(err));
        }

        let aborted = *self
            .shared
            .aborted
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(err) = aborted {
            return Err(Error::Context(err));
        }

        tracing::debug!(
            queue = %self.shared.name,
            completed = stats.completed,
            failed = stats.failed,
            rejected = stats.rejected,
            "task queue drained"
        );
        Ok(stats)
    }

    /// Stop admission and wait for the drain
    pub async fn shutdown(&self) -> Result<QueueStats> {
        self.stop();
        self.wait().await
    }

    /// Current counters
    pub fn stats(&self) -> QueueStats {
        self.shared.stats()
    }

    /// Returns true once admission is closed
    pub fn is_closed(&self) -> bool {
        match self.shared.open.read() {
            Ok(open) => !*open,
            Err(poisoned) => !*poisoned.into_inner(),
        }
    }

    /// Queue name
    pub fn name(&self) -> &str {
        &self.shared.name
    }
}

async fn run_worker<T, W>(
    slot: usize,
    shared: Arc<QueueShared>,
    receiver: Arc<tokio::sync::Mutex<mpsc::Receiver<T>>>,
    worker: Arc<W>,
) where
    T: Send + 'static,
    W: Worker<T> + 'static,
{
    loop {
        let next = {
            let mut receiver = receiver.lock().await;
            tokio::select! {
                biased;
                err = shared.ctx.done() => Next::Abort(err),
                task = receiver.recv() => match task {
                    Some(task) => Next::Task(task),
                    None => Next::Closed,
                },
                _ = shared.stopped.cancelled() => match receiver.try_recv() {
                    Ok(task) => Next::Task(task),
                    Err(_) => Next::Closed,
                },
            }
        };

        match next {
            Next::Task(task) => match worker.work(&shared.ctx, task).await {
                Ok(()) => {
                    shared.completed.fetch_add(1, Ordering::Relaxed);
                }
                Err(err) if err.is_cancellation() && shared.ctx.err().is_some() => {
                    // the task observed the queue shutting down
                    shared.failed.fetch_add(1, Ordering::Relaxed);
                }
                Err(err) => shared.record_failure(err),
            },
            Next::Closed => break,
            Next::Abort(err) => {
                let own_abort = shared
                    .first_error
                    .lock()
                    .map(|slot| slot.is_some())
                    .unwrap_or(true);
                if !own_abort {
                    tracing::warn!(queue = %shared.name, slot, error = %err, "task queue interrupted");
                    shared.record_abort(err);
                }
                shared.close();
                break;
            }
        }
    }
    tracing::trace!(queue = %shared.name, slot, "queue worker exited");
}
