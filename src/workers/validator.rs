//! Link validation
//!
//! Broken external links never fail a build: every network-level outcome is logged
//! as a warning and the task succeeds. Only the governing context ending makes a
//! validation task fail.

use crate::config::ValidationConfig;
use crate::context::Context;
use crate::error::{Result, WorkerError};
use crate::queue::{QueueController, TaskQueue};
use crate::registry::Registry;
use crate::retry::{self, BackoffPolicy, Probe};
use crate::worker::Worker;
use async_trait::async_trait;
use std::sync::Arc;
use url::{Host, Url};

/// One link to check
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidationTask {
    /// Absolute link URL
    pub link_url: Url,
    /// Link destination as written in the content
    pub link_destination: String,
    /// Source of the content containing the link
    pub content_source_path: String,
}

/// Accepts links for asynchronous validation
pub trait Validator: Send + Sync {
    /// Enqueue a reachability check for `link_url`
    ///
    /// Returns true if the task was accepted, false if it was dropped.
    fn validate_link(&self, link_url: &Url, link_destination: &str, content_source_path: &str) -> bool;
}

/// [`Validator`] backed by a fault-tolerant [`TaskQueue`]
pub struct LinkValidator {
    queue: TaskQueue<ValidationTask>,
}

impl LinkValidator {
    /// Start the validation queue
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `worker_count` or `capacity` is zero.
    pub fn new(
        ctx: &Context,
        worker_count: usize,
        capacity: usize,
        worker: ValidatorWorker,
    ) -> Result<(Self, QueueController)> {
        let (queue, controller) =
            TaskQueue::with_capacity(ctx, "Validator", worker_count, capacity, worker, false)?;
        Ok((Self { queue }, controller))
    }
}

impl Validator for LinkValidator {
    fn validate_link(&self, link_url: &Url, link_destination: &str, content_source_path: &str) -> bool {
        let task = ValidationTask {
            link_url: link_url.clone(),
            link_destination: link_destination.to_string(),
            content_source_path: content_source_path.to_string(),
        };
        let added = self.queue.add_task(task);
        if !added {
            tracing::warn!(
                link = %link_url,
                source = %content_source_path,
                "link validation skipped: queue closed or full"
            );
        }
        added
    }
}

/// Checks that a link is reachable without downloading arbitrary content
#[derive(Clone)]
pub struct ValidatorWorker {
    client: reqwest::Client,
    registry: Arc<dyn Registry>,
    policy: BackoffPolicy,
    skip_loopback: bool,
    skip_hosts: Vec<String>,
    skip_host_fragments: Vec<String>,
}

impl ValidatorWorker {
    /// Create a worker using `client` unless a registry handler supplies its own
    pub fn new(client: reqwest::Client, registry: Arc<dyn Registry>, config: &ValidationConfig) -> Self {
        Self {
            client,
            registry,
            policy: BackoffPolicy::from_config(config),
            skip_loopback: config.skip_loopback,
            skip_hosts: config.skip_hosts.clone(),
            skip_host_fragments: config.skip_host_fragments.clone(),
        }
    }

    /// Returns true for loopback and designated test hosts
    fn is_skipped(&self, url: &Url) -> bool {
        match url.host() {
            Some(Host::Ipv4(ip)) if self.skip_loopback && ip.is_loopback() => true,
            Some(Host::Ipv6(ip)) if self.skip_loopback && ip.is_loopback() => true,
            Some(_) => {
                let host = url.host_str().unwrap_or_default();
                self.skip_hosts.iter().any(|h| h.eq_ignore_ascii_case(host))
                    || self.skip_host_fragments.iter().any(|f| host.contains(f.as_str()))
            }
            None => false,
        }
    }

    /// Check one link, logging unreachable ones
    ///
    /// # Errors
    ///
    /// Fails only with a cancellation error when `ctx` ends.
    pub async fn validate(&self, ctx: &Context, task: &ValidationTask) -> std::result::Result<(), WorkerError> {
        let url = &task.link_url;
        if self.is_skipped(url) {
            tracing::trace!(link = %url, "sample host, not validated");
            return Ok(());
        }

        let mut client = &self.client;
        let handler = self.registry.get(url.as_str());
        let handler_client = handler.as_ref().and_then(|h| h.client());
        if let Some(handler) = &handler {
            if handler
                .build_abs_link(&task.content_source_path, url.as_str())
                .is_ok()
            {
                tracing::trace!(link = %url, "link resolves locally");
                return Ok(());
            }
        }
        if let Some(c) = &handler_client {
            client = c;
        }

        match retry::probe(ctx, client, url.as_str(), &self.policy).await? {
            Probe::Reachable(_) => {}
            Probe::Broken(status) => tracing::warn!(
                link = %task.link_destination,
                source = %task.content_source_path,
                error = %format!("HTTP status {status}"),
                "failed to validate absolute link"
            ),
            Probe::Unreachable(err) => tracing::warn!(
                link = %task.link_destination,
                source = %task.content_source_path,
                error = %err,
                "failed to validate absolute link"
            ),
        }
        Ok(())
    }
}

#[async_trait]
impl Worker<ValidationTask> for ValidatorWorker {
    async fn work(&self, ctx: &Context, task: ValidationTask) -> std::result::Result<(), WorkerError> {
        self.validate(ctx, &task).await
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::HandlerRegistry;

    fn worker() -> ValidatorWorker {
        ValidatorWorker::new(
            reqwest::Client::new(),
            Arc::new(HandlerRegistry::default()),
            &ValidationConfig::default(),
        )
    }

    fn skipped(url: &str) -> bool {
        worker().is_skipped(&Url::parse(url).unwrap())
    }

    #[test]
    fn sample_hosts_are_skipped() {
        assert!(skipped("http://localhost:8080/a"));
        assert!(skipped("http://127.0.0.1/a"));
        assert!(skipped("http://127.0.0.2/a"));
        assert!(skipped("http://[::1]/a"));
        assert!(skipped("https://1.2.3.4/a"));
        assert!(skipped("https://docs.foo.bar/a"));
        assert!(!skipped("https://example.com/a"));
        assert!(!skipped("https://10.0.0.1/a"));
    }

    #[test]
    fn skip_lists_are_configurable() {
        let config = ValidationConfig {
            skip_hosts: vec!["internal.example".to_string()],
            skip_host_fragments: Vec::new(),
            ..ValidationConfig::default()
        };
        let w = ValidatorWorker::new(reqwest::Client::new(), Arc::new(HandlerRegistry::default()), &config);
        assert!(w.is_skipped(&Url::parse("https://internal.example/x").unwrap()));
        assert!(!w.is_skipped(&Url::parse("https://a.foo.bar/x").unwrap()));
        assert!(w.is_skipped(&Url::parse("http://127.0.0.1/x").unwrap()));
        assert!(!w.is_skipped(&Url::parse("http://localhost/x").unwrap()));
    }

    #[tokio::test]
    async fn canceled_context_fails_validation() {
        let ctx = Context::background();
        ctx.cancel();
        let task = ValidationTask {
            link_url: Url::parse("https://example.invalid/page").unwrap(),
            link_destination: "https://example.invalid/page".to_string(),
            content_source_path: "https://example.com/doc.md".to_string(),
        };
        let err = worker().validate(&ctx, &task).await.unwrap_err();
        assert!(err.is_cancellation());
    }
}
