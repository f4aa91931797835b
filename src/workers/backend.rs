//! HTTP backend worker: one bounded GET per input

use crate::context::Context;
use crate::error::{Error, WorkerError};
use crate::http;
use crate::metrics::RequestMetrics;
use crate::worker::Worker;
use async_trait::async_trait;
use std::sync::Arc;

/// Task of the [`BackendWorker`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkerInput {
    /// URL to fetch
    pub url: String,
}

impl WorkerInput {
    /// Input for `url`
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

/// Sends exactly one GET per input and enforces a response size limit
///
/// A non-2xx status fails the task with the status as error code. A body that
/// does not end within `max_response_body` bytes fails it with
/// "response body too large".
#[derive(Clone, Debug)]
pub struct BackendWorker {
    client: reqwest::Client,
    max_response_body: u64,
    metrics: Arc<RequestMetrics>,
}

impl BackendWorker {
    /// Create a worker
    pub fn new(client: reqwest::Client, max_response_body: u64, metrics: Arc<RequestMetrics>) -> Self {
        Self {
            client,
            max_response_body,
            metrics,
        }
    }

    /// Metrics sink this worker reports to
    pub fn metrics(&self) -> &Arc<RequestMetrics> {
        &self.metrics
    }

    async fn fetch(&self, input: &WorkerInput) -> Result<usize, WorkerError> {
        let response = self
            .client
            .get(&input.url)
            .send()
            .await
            .map_err(|e| WorkerError::new(format!("sending request to {} failed: {e}", input.url), 0))?;

        let status = response.status();
        if !status.is_success() {
            return Err(WorkerError::new(
                format!("sending request to {} failed with response code {}", input.url, status.as_u16()),
                i32::from(status.as_u16()),
            ));
        }

        match http::read_limited(response, &input.url, self.max_response_body).await {
            Ok(body) => Ok(body.len()),
            Err(Error::Resource(e)) => Err(WorkerError::new(e, 0)),
            Err(e) => Err(WorkerError::new(
                format!("reading response for {} failed: {e}", input.url),
                0,
            )),
        }
    }
}

#[async_trait]
impl Worker<WorkerInput> for BackendWorker {
    async fn work(&self, ctx: &Context, input: WorkerInput) -> Result<(), WorkerError> {
        let mut timer = self.metrics.start();
        let outcome = tokio::select! {
            biased;
            err = ctx.done() => Err(WorkerError::from(err)),
            outcome = self.fetch(&input) => outcome,
        };

        match outcome {
            Ok(len) => {
                tracing::debug!(url = %input.url, bytes = len, "request finished");
                Ok(())
            }
            Err(err) => {
                timer.fail();
                tracing::debug!(url = %input.url, code = err.code(), error = %err, "request failed");
                Err(err)
            }
        }
    }
}
