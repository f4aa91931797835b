//! Adaptive batch dispatcher
//!
//! [`Backend::dispatch`] drives a known batch of inputs through a pool of tokio
//! tasks whose size follows backlog pressure between `min_workers` and
//! `max_workers`. It is unconditionally fail-fast: the first worker error cancels
//! the rest of the batch and becomes the result.
//!
//! Worker slot lifecycle:
//!
//! ```text
//! Idle -> Spawned -> Running -> Draining -> Stopped
//! ```
//!
//! A slot is spawned while the backlog exceeds the number of live slots (or the
//! pool is below `min_workers`), runs tasks until the backlog is empty, then
//! drains and stops. Slots are retired early when the batch is aborted.

use crate::context::Context;
use crate::error::{Error, Result, WorkerError};
use crate::worker::Worker;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::task::JoinSet;

/// Lifecycle state of one worker slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    /// Not yet allocated
    Idle,
    /// Task spawned, no input taken yet
    Spawned,
    /// Executing an input
    Running,
    /// Backlog empty, about to exit
    Draining,
    /// Exited
    Stopped,
}

/// Adaptive worker pool for one batch of inputs
///
/// `min_workers <= max_workers` must hold. [`Backend::new`] checks it and returns
/// a configuration error; a backend assembled by hand with inverted bounds makes
/// [`dispatch`](Self::dispatch) panic before anything executes.
///
/// # Example
///
/// ```no_run
/// use docweave::context::Context;
/// use docweave::dispatch::Backend;
/// use docweave::worker::WorkerFn;
/// use std::time::Duration;
///
/// # async fn example() -> docweave::Result<()> {
/// let backend = Backend::new(0, 8, WorkerFn::new(|_ctx: Context, url: String| async move {
///     tracing::info!(%url, "fetching");
///     Ok(())
/// }))?;
///
/// let ctx = Context::background().with_timeout(Duration::from_secs(30));
/// backend.dispatch(&ctx, vec!["https://example.com".to_string()]).await?;
/// # Ok(())
/// # }
/// ```
pub struct Backend<W> {
    /// Lower bound of the pool while work exists
    pub min_workers: usize,
    /// Upper bound of concurrently executing inputs
    pub max_workers: usize,
    /// Work function executed once per input
    pub worker: Arc<W>,
}

impl<W> Clone for Backend<W> {
    fn clone(&self) -> Self {
        Self {
            min_workers: self.min_workers,
            max_workers: self.max_workers,
            worker: Arc::clone(&self.worker),
        }
    }
}

impl<W> Backend<W> {
    /// Create a backend, validating the worker bounds
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `min_workers > max_workers`.
    pub fn new(min_workers: usize, max_workers: usize, worker: W) -> Result<Self> {
        if min_workers > max_workers {
            return Err(Error::config(
                "min_workers",
                format!("min_workers ({min_workers}) exceeds max_workers ({max_workers})"),
            ));
        }
        Ok(Self {
            min_workers,
            max_workers,
            worker: Arc::new(worker),
        })
    }
}

/// Pool bookkeeping shared with the slots
struct Pool<T> {
    backlog: Mutex<VecDeque<T>>,
    live: AtomicUsize,
    running: AtomicUsize,
}

impl<T> Pool<T> {
    fn pop(&self) -> Option<T> {
        self.backlog
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .pop_front()
    }

    fn backlog_len(&self) -> usize {
        self.backlog
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }
}

impl<W> Backend<W> {
    /// Execute every input exactly once and wait for the batch to finish
    ///
    /// # Errors
    ///
    /// - [`Error::Worker`] with the first error returned by any worker invocation
    /// - [`Error::Context`] when `ctx` is canceled or its deadline passes first
    /// - [`Error::Config`] when `max_workers` is zero, the input is non-empty and
    ///   `ctx` has no deadline (the call could never finish)
    ///
    /// # Panics
    ///
    /// Panics if `min_workers > max_workers`. No tasks execute in that case.
    pub async fn dispatch<T>(&self, ctx: &Context, inputs: Vec<T>) -> Result<()>
    where
        T: Send + 'static,
        W: Worker<T> + 'static,
    {
        assert!(
            self.min_workers <= self.max_workers,
            "invalid worker bounds: min_workers ({}) > max_workers ({})",
            self.min_workers,
            self.max_workers
        );

        if let Some(err) = ctx.err() {
            return Err(err.into());
        }
        if inputs.is_empty() {
            return Ok(());
        }
        if self.max_workers == 0 && ctx.deadline().is_none() {
            return Err(Error::config(
                "max_workers",
                "max_workers is 0 and the context has no deadline; dispatch would never finish",
            ));
        }

        let total = inputs.len();
        let batch_ctx = ctx.child();
        let pool = Arc::new(Pool {
            backlog: Mutex::new(inputs.into_iter().collect::<VecDeque<_>>()),
            live: AtomicUsize::new(0),
            running: AtomicUsize::new(0),
        });
        let mut slots: JoinSet<std::result::Result<(), WorkerError>> = JoinSet::new();
        let mut next_slot = 0usize;

        tracing::debug!(
            inputs = total,
            min_workers = self.min_workers,
            max_workers = self.max_workers,
            "dispatch started"
        );

        loop {
            let spawned = self.scale(&pool, &mut slots, &batch_ctx, &mut next_slot);
            if spawned > 0 {
                tracing::trace!(
                    spawned,
                    live = pool.live.load(Ordering::SeqCst),
                    running = pool.running.load(Ordering::SeqCst),
                    backlog = pool.backlog_len(),
                    "scaled worker pool up"
                );
            }

            if slots.is_empty() && pool.backlog_len() == 0 {
                tracing::debug!(inputs = total, "dispatch finished");
                return Ok(());
            }

            tokio::select! {
                biased;
                err = ctx.done() => {
                    batch_ctx.cancel();
                    slots.shutdown().await;
                    tracing::warn!(error = %err, "dispatch interrupted");
                    return Err(Error::Context(err));
                }
                Some(joined) = slots.join_next(), if !slots.is_empty() => {
                    let outcome = match joined {
                        Ok(outcome) => outcome,
                        Err(join_err) if join_err.is_panic() => {
                            Err(WorkerError::new(format!("worker panicked: {join_err}"), 0))
                        }
                        Err(join_err) => {
                            Err(WorkerError::new(format!("worker aborted: {join_err}"), 0))
                        }
                    };
                    if let Err(err) = outcome {
                        batch_ctx.cancel();
                        slots.shutdown().await;
                        return Err(self.terminal_error(ctx, err));
                    }
                }
            }
        }
    }

    /// Spawn slots until the backlog is covered or `max_workers` is reached
    fn scale<T>(
        &self,
        pool: &Arc<Pool<T>>,
        slots: &mut JoinSet<std::result::Result<(), WorkerError>>,
        ctx: &Context,
        next_slot: &mut usize,
    ) -> usize
    where
        T: Send + 'static,
        W: Worker<T> + 'static,
    {
        let backlog = pool.backlog_len();
        if backlog == 0 {
            return 0;
        }

        let live = pool.live.load(Ordering::SeqCst);
        let wanted = backlog.max(self.min_workers).min(self.max_workers);
        let to_spawn = wanted.saturating_sub(live);

        for _ in 0..to_spawn {
            pool.live.fetch_add(1, Ordering::SeqCst);
            let slot = *next_slot;
            *next_slot += 1;
            slots.spawn(run_slot(
                slot,
                Arc::clone(pool),
                Arc::clone(&self.worker),
                ctx.clone(),
            ));
        }
        to_spawn
    }

    /// Prefer the context error when a worker only reported the cancellation
    fn terminal_error(&self, ctx: &Context, err: WorkerError) -> Error {
        match ctx.err() {
            Some(ctx_err) if err.is_cancellation() => Error::Context(ctx_err),
            _ => {
                tracing::debug!(code = err.code(), error = %err, "dispatch aborted by worker error");
                Error::Worker(err)
            }
        }
    }
}

async fn run_slot<T, W>(
    slot: usize,
    pool: Arc<Pool<T>>,
    worker: Arc<W>,
    ctx: Context,
) -> std::result::Result<(), WorkerError>
where
    T: Send + 'static,
    W: Worker<T> + 'static,
{
    let mut state = SlotState::Spawned;
    let result = loop {
        if let Some(err) = ctx.err() {
            break Err(WorkerError::from(err));
        }
        let Some(input) = pool.pop() else {
            state = SlotState::Draining;
            break Ok(());
        };

        state = SlotState::Running;
        pool.running.fetch_add(1, Ordering::SeqCst);
        let outcome = tokio::select! {
            biased;
            err = ctx.done() => Err(WorkerError::from(err)),
            outcome = worker.work(&ctx, input) => outcome,
        };
        pool.running.fetch_sub(1, Ordering::SeqCst);

        if let Err(err) = outcome {
            break Err(err);
        }
    };

    pool.live.fetch_sub(1, Ordering::SeqCst);
    tracing::trace!(slot, last_state = ?state, next_state = ?SlotState::Stopped, "worker slot retired");
    result
}
