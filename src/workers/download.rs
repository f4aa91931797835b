//! Resource download scheduling and execution

use crate::context::Context;
use crate::error::{Error, ResourceError, Result, WorkerError};
use crate::queue::{QueueController, TaskQueue};
use crate::registry::Registry;
use crate::worker::Worker;
use crate::writers::Writer;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

/// One resource to download
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct DownloadTask {
    /// Absolute source URI
    pub source: String,
    /// Destination relative to the resources root
    pub destination_path: String,
}

/// Accepts resource downloads for asynchronous execution
pub trait Scheduler: Send + Sync {
    /// Enqueue the download of `source` to `destination_path`
    ///
    /// # Errors
    ///
    /// Returns [`Error::SchedulingRejected`] if the download queue refused the task.
    fn schedule(&self, source: &str, destination_path: &str) -> Result<()>;
}

/// Reads a resource through its registry handler and writes it out
#[derive(Clone)]
pub struct ResourceDownloadWorker {
    registry: Arc<dyn Registry>,
    writer: Arc<dyn Writer>,
}

impl ResourceDownloadWorker {
    /// Create a worker
    pub fn new(registry: Arc<dyn Registry>, writer: Arc<dyn Writer>) -> Self {
        Self { registry, writer }
    }

    /// Download `source` and store it at `destination_path`
    ///
    /// # Errors
    ///
    /// Fails when no handler accepts `source`, or when reading or writing fails.
    pub async fn download(&self, ctx: &Context, source: &str, destination_path: &str) -> Result<()> {
        let handler = self
            .registry
            .get(source)
            .ok_or_else(|| ResourceError::NoHandler(source.to_string()))?;
        let bytes = handler.read(ctx, source).await?;

        let (dir, name) = destination_path
            .rsplit_once('/')
            .unwrap_or(("", destination_path));
        self.writer.write(name, dir, &bytes, None).await?;

        tracing::debug!(%source, destination = %destination_path, bytes = bytes.len(), "resource downloaded");
        Ok(())
    }
}

#[async_trait]
impl Worker<DownloadTask> for ResourceDownloadWorker {
    async fn work(&self, ctx: &Context, task: DownloadTask) -> std::result::Result<(), WorkerError> {
        self.download(ctx, &task.source, &task.destination_path)
            .await
            .map_err(|err| match err {
                Error::Context(e) => WorkerError::from(e),
                other => WorkerError::new(
                    format!("downloading {} as {} failed: {other}", task.source, task.destination_path),
                    0,
                ),
            })
    }
}

/// [`Scheduler`] backed by a [`TaskQueue`] of [`ResourceDownloadWorker`]s
///
/// Scheduling the same `(source, destination)` pair twice downloads it once.
pub struct DownloadScheduler {
    queue: TaskQueue<DownloadTask>,
    scheduled: Mutex<HashSet<DownloadTask>>,
}

impl DownloadScheduler {
    /// Start the download queue
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `worker_count` or `capacity` is zero.
    pub fn new(
        ctx: &Context,
        worker_count: usize,
        capacity: usize,
        fail_fast: bool,
        registry: Arc<dyn Registry>,
        writer: Arc<dyn Writer>,
    ) -> Result<(Self, QueueController)> {
        let worker = ResourceDownloadWorker::new(registry, writer);
        let (queue, controller) =
            TaskQueue::with_capacity(ctx, "Download", worker_count, capacity, worker, fail_fast)?;
        Ok((
            Self {
                queue,
                scheduled: Mutex::new(HashSet::new()),
            },
            controller,
        ))
    }
}

impl Scheduler for DownloadScheduler {
    fn schedule(&self, source: &str, destination_path: &str) -> Result<()> {
        let task = DownloadTask {
            source: source.to_string(),
            destination_path: destination_path.to_string(),
        };

        let mut scheduled = self
            .scheduled
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if scheduled.contains(&task) {
            tracing::trace!(%source, destination = %destination_path, "download already scheduled");
            return Ok(());
        }

        if !self.queue.add_task(task.clone()) {
            return Err(Error::SchedulingRejected {
                queue: self.queue.name().to_string(),
                task: format!("download of {source}"),
            });
        }
        scheduled.insert(task);
        Ok(())
    }
}
