//! # docweave
//!
//! Concurrent task-dispatch engine for building documentation bundles.
//!
//! ## Design Philosophy
//!
//! docweave is designed to be:
//! - **Bounded** - Every phase runs on a worker pool with a hard concurrency limit
//! - **Explicit about failure** - Fail-fast and fault-tolerant execution are chosen per queue
//! - **Cancellation-aware** - One [`Context`] stops a whole build and reports why
//! - **Library-first** - No CLI, purely a Rust crate for embedding
//!
//! ## Building blocks
//!
//! - [`TaskQueue`] - fixed worker pool over a bounded buffer, fed while a phase runs
//! - [`Backend`] - adaptive pool for a known batch, scaling between min and max workers
//! - [`Worker`] - the one-task contract shared by both
//! - [`Reactor`] - wires documents, downloads and link validation into one build
//!
//! ## Quick Start
//!
//! ```no_run
//! use docweave::{Backend, Context, WorkerFn};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let backend = Backend::new(2, 16, WorkerFn::new(|_ctx: Context, page: String| async move {
//!         tracing::info!(%page, "rendering");
//!         Ok(())
//!     }))?;
//!
//!     let ctx = Context::background().with_timeout(Duration::from_secs(60));
//!     backend.dispatch(&ctx, vec!["index.md".to_string(), "guide.md".to_string()]).await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Configuration types
pub mod config;
/// Cancellation and deadlines
pub mod context;
/// Adaptive batch dispatcher
pub mod dispatch;
/// Error types
pub mod error;
/// Shared HTTP helpers
pub mod http;
/// Request metrics
pub mod metrics;
/// Documentation tree
pub mod node;
/// Fixed-size task queue
pub mod queue;
/// Build orchestration
pub mod reactor;
/// Resource handlers and readers
pub mod registry;
/// HTTP retry policy for link validation
pub mod retry;
/// Worker contract
pub mod worker;
/// Concrete workers
pub mod workers;
/// Output writers
pub mod writers;

// Re-export commonly used types
pub use config::{Config, HttpConfig, ResourceConfig, ValidationConfig, WorkersConfig};
pub use context::Context;
pub use dispatch::Backend;
pub use error::{ContextError, Error, ResourceError, Result, WorkerError};
pub use metrics::RequestMetrics;
pub use node::Node;
pub use queue::{QueueController, QueueStats, TaskQueue};
pub use reactor::{BuildServices, Reactor};
pub use registry::{GenericReader, HandlerRegistry, HttpResourceHandler, Reader, Registry, ResourceHandler};
pub use worker::{Worker, WorkerFn};
pub use writers::{DryRunWriter, FsWriter, Writer};

/// Run a build that is canceled on a termination signal
///
/// Waits for the build to finish, or for Ctrl+C (and SIGTERM on Unix), in which
/// case the build context is canceled and the build reports
/// [`ContextError::Canceled`]. Canceling `ctx` ends the build the same way.
///
/// # Example
///
/// ```no_run
/// use docweave::{Config, Context, FsWriter, HandlerRegistry, Node, Reactor, run_with_shutdown};
/// use docweave::workers::LinkReconciler;
/// use std::sync::Arc;
///
/// # struct Passthrough;
/// # #[async_trait::async_trait]
/// # impl LinkReconciler for Passthrough {
/// #     async fn reconcile_links(&self, _ctx: &Context, _node: &Node, _source: &str, bytes: Vec<u8>) -> docweave::Result<Vec<u8>> { Ok(bytes) }
/// # }
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = Config::default();
///     let registry = Arc::new(HandlerRegistry::from_config(&config.http, &config.resources)?);
///     let reactor = Reactor::new(
///         config.clone(),
///         registry,
///         Arc::new(FsWriter::new(&config.resources.destination_path)),
///         Arc::new(FsWriter::new(&config.resources.resources_path)),
///     );
///
///     let structure = vec![Arc::new(Node::new("index.md").with_source("https://example.com/README.md"))];
///     run_with_shutdown(&reactor, &Context::background(), &structure, |_services| {
///         Arc::new(Passthrough) as Arc<dyn LinkReconciler>
///     })
///     .await?;
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown<F>(
    reactor: &Reactor,
    ctx: &Context,
    structure: &[std::sync::Arc<Node>],
    reconciler_factory: F,
) -> Result<()>
where
    F: FnOnce(BuildServices) -> std::sync::Arc<dyn workers::LinkReconciler>,
{
    run_until(reactor, ctx, structure, reconciler_factory, shutdown_signal()).await
}

/// Run a build that is canceled when `shutdown` completes
async fn run_until<F, S>(
    reactor: &Reactor,
    ctx: &Context,
    structure: &[std::sync::Arc<Node>],
    reconciler_factory: F,
    shutdown: S,
) -> Result<()>
where
    F: FnOnce(BuildServices) -> std::sync::Arc<dyn workers::LinkReconciler>,
    S: std::future::Future<Output = ()> + Send + 'static,
{
    let build_ctx = ctx.child();
    let watcher = tokio::spawn(cancel_on(build_ctx.clone(), shutdown));

    let result = reactor.run(&build_ctx, structure, reconciler_factory).await;

    // the build context is private to this call; canceling it releases the watcher
    build_ctx.cancel();
    if let Err(err) = watcher.await {
        tracing::debug!(error = %err, "shutdown watcher ended abnormally");
    }
    result
}

async fn cancel_on<S>(ctx: Context, shutdown: S)
where
    S: std::future::Future<Output = ()>,
{
    tokio::select! {
        _ = shutdown => {
            tracing::info!("termination signal received, canceling build");
            ctx.cancel();
        }
        _ = ctx.done() => {}
    }
}

/// Completes on Ctrl+C, or SIGTERM on Unix
///
/// A handler that cannot be installed never fires.
async fn shutdown_signal() {
    let interrupt = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %err, "could not listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                tracing::warn!(error = %err, "could not listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = interrupt => {}
        _ = terminate => {}
    }
}
