//! Concrete workers
//!
//! Every worker implements [`Worker`](crate::worker::Worker) for its own task type:
//! - [`backend`] - one bounded HTTP GET per input, reporting to [`RequestMetrics`](crate::metrics::RequestMetrics)
//! - [`document`] - assembles one document node from its sources and writes it
//! - [`download`] - resource download scheduling and execution
//! - [`validator`] - link reachability checks with the `429` backoff policy

pub mod backend;
pub mod document;
pub mod download;
pub mod validator;

pub use backend::{BackendWorker, WorkerInput};
pub use document::{DocumentWorkTask, DocumentWorker, LinkReconciler, Processor};
pub use download::{DownloadScheduler, DownloadTask, ResourceDownloadWorker, Scheduler};
pub use validator::{LinkValidator, ValidationTask, Validator, ValidatorWorker};
