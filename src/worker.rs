//! The worker contract shared by every task queue and dispatcher

use crate::context::Context;
use crate::error::WorkerError;
use async_trait::async_trait;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

/// Executes exactly one task
///
/// Implementations must be stateless across tasks apart from injected,
/// concurrency-safe dependencies (registry, reader, writer, HTTP client), since a
/// single worker value is shared by every slot of a pool.
///
/// Expected failure modes (bad status, unreachable source, canceled context) are
/// reported through the returned [`WorkerError`], never by panicking.
#[async_trait]
pub trait Worker<T>: Send + Sync
where
    T: Send + 'static,
{
    /// Execute `task` under `ctx`
    async fn work(&self, ctx: &Context, task: T) -> Result<(), WorkerError>;
}

#[async_trait]
impl<T, W> Worker<T> for Arc<W>
where
    T: Send + 'static,
    W: Worker<T> + ?Sized,
{
    async fn work(&self, ctx: &Context, task: T) -> Result<(), WorkerError> {
        (**self).work(ctx, task).await
    }
}

/// Adapter turning an async closure into a [`Worker`]
///
/// ```
/// use docweave::worker::{Worker, WorkerFn};
/// use docweave::context::Context;
///
/// # async fn example() {
/// let worker = WorkerFn::new(|_ctx: Context, n: u32| async move {
///     tracing::debug!(n, "processing");
///     Ok(())
/// });
/// worker.work(&Context::background(), 7).await.ok();
/// # }
/// ```
pub struct WorkerFn<F, T> {
    f: F,
    _task: PhantomData<fn(T)>,
}

impl<F, Fut, T> WorkerFn<F, T>
where
    F: Fn(Context, T) -> Fut,
    Fut: Future<Output = Result<(), WorkerError>>,
{
    /// Wrap `f`
    pub fn new(f: F) -> Self {
        Self {
            f,
            _task: PhantomData,
        }
    }
}

#[async_trait]
impl<F, Fut, T> Worker<T> for WorkerFn<F, T>
where
    T: Send + 'static,
    F: Fn(Context, T) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), WorkerError>> + Send,
{
    async fn work(&self, ctx: &Context, task: T) -> Result<(), WorkerError> {
        (self.f)(ctx.clone(), task).await
    }
}
