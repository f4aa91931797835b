//! HTTP retry policy for link validation
//!
//! Two layers:
//! - [`send_with_backoff`] repeats a single request while the server answers
//!   `429 Too Many Requests`, sleeping `table[i] + jitter` between attempts where
//!   `jitter = random(0..=i) * jitter_unit`. The table length is the retry budget.
//! - [`probe`] escalates from `HEAD` to `GET` when the cheap request is refused
//!   with an error status other than `401`/`403`.
//!
//! # Example
//!
//! ```no_run
//! use docweave::context::Context;
//! use docweave::retry::{BackoffPolicy, Probe, probe};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), docweave::error::ContextError> {
//! let policy = BackoffPolicy::new(vec![Duration::from_secs(1)], Duration::from_secs(1));
//! let client = reqwest::Client::new();
//! match probe(&Context::background(), &client, "https://example.com", &policy).await? {
//!     Probe::Reachable(status) => println!("ok: {status}"),
//!     other => println!("broken: {other:?}"),
//! }
//! # Ok(())
//! # }
//! ```

use crate::config::ValidationConfig;
use crate::context::Context;
use crate::error::ContextError;
use rand::Rng;
use reqwest::{Method, StatusCode};
use std::time::Duration;

/// Fixed backoff table plus jitter unit for `429` answers
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BackoffPolicy {
    table: Vec<Duration>,
    jitter_unit: Duration,
}

impl BackoffPolicy {
    /// Policy from explicit values
    pub fn new(table: Vec<Duration>, jitter_unit: Duration) -> Self {
        Self { table, jitter_unit }
    }

    /// Policy from the validation configuration
    pub fn from_config(config: &ValidationConfig) -> Self {
        Self::new(config.backoff_table.clone(), config.jitter_unit)
    }

    /// Number of retries after the first `429`
    pub fn retries(&self) -> usize {
        self.table.len()
    }

    /// Delay before retry number `attempt` (zero-based), jitter included
    ///
    /// Returns `None` once the table is exhausted.
    pub fn delay(&self, attempt: usize) -> Option<Duration> {
        let base = *self.table.get(attempt)?;
        Some(base.saturating_add(add_jitter(self.jitter_unit, attempt)))
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::from_config(&ValidationConfig::default())
    }
}

/// Random extra delay of `0..=attempt` jitter units
fn add_jitter(unit: Duration, attempt: usize) -> Duration {
    if unit.is_zero() {
        return Duration::ZERO;
    }
    let mut rng = rand::thread_rng();
    let units: u32 = rng.gen_range(0..=u32::try_from(attempt).unwrap_or(u32::MAX));
    unit.saturating_mul(units)
}

/// Failure of a single request chain
#[derive(Debug)]
pub enum SendError {
    /// The request never produced a response
    Network(reqwest::Error),
    /// The context ended while waiting for a response or a backoff delay
    Context(ContextError),
}

impl From<ContextError> for SendError {
    fn from(err: ContextError) -> Self {
        SendError::Context(err)
    }
}

/// Send `method url`, retrying on `429` according to `policy`
///
/// The response body is dropped before every retry. Returns the final status.
pub async fn send_with_backoff(
    ctx: &Context,
    client: &reqwest::Client,
    method: Method,
    url: &str,
    policy: &BackoffPolicy,
) -> Result<StatusCode, SendError> {
    let mut attempt = 0;
    loop {
        let request = client.request(method.clone(), url).send();
        let response = tokio::select! {
            biased;
            err = ctx.done() => return Err(err.into()),
            response = request => response.map_err(SendError::Network)?,
        };
        let status = response.status();
        drop(response);

        if status != StatusCode::TOO_MANY_REQUESTS {
            return Ok(status);
        }
        let Some(delay) = policy.delay(attempt) else {
            return Ok(status);
        };

        tracing::debug!(
            %url,
            %method,
            attempt = attempt + 1,
            retries = policy.retries(),
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "rate limited, backing off"
        );
        ctx.sleep(delay).await?;
        attempt += 1;
    }
}

/// Outcome of a reachability check
#[derive(Debug)]
pub enum Probe {
    /// A success status, or `401`/`403` (the resource exists behind auth)
    Reachable(StatusCode),
    /// Both `HEAD` and `GET` returned an error status
    Broken(StatusCode),
    /// No response at all
    Unreachable(reqwest::Error),
}

/// Returns true for statuses that make a link count as reachable
pub fn is_acceptable(status: StatusCode) -> bool {
    status.as_u16() < 400 || status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN
}

/// Check `url` with `HEAD`, escalating to `GET` on refusal
///
/// # Errors
///
/// Only the context ending is an error; every network outcome is a [`Probe`].
pub async fn probe(
    ctx: &Context,
    client: &reqwest::Client,
    url: &str,
    policy: &BackoffPolicy,
) -> Result<Probe, ContextError> {
    let head = match send_with_backoff(ctx, client, Method::HEAD, url, policy).await {
        Ok(status) => status,
        Err(SendError::Network(err)) => return Ok(Probe::Unreachable(err)),
        Err(SendError::Context(err)) => return Err(err),
    };
    if is_acceptable(head) {
        return Ok(Probe::Reachable(head));
    }

    tracing::debug!(%url, status = %head, "HEAD refused, retrying with GET");
    match send_with_backoff(ctx, client, Method::GET, url, policy).await {
        Ok(status) if is_acceptable(status) => Ok(Probe::Reachable(status)),
        Ok(status) => Ok(Probe::Broken(status)),
        Err(SendError::Network(err)) => Ok(Probe::Unreachable(err)),
        Err(SendError::Context(err)) => Err(err),
    }
}
