//! Build orchestration
//!
//! A build runs three phases over one [`Context`]:
//! - documents, dispatched through an adaptive [`Backend`]
//! - resource downloads, fed by the link reconciler through a [`DownloadScheduler`]
//! - link validation, fed the same way through a [`LinkValidator`]
//!
//! The download and validation queues run for the whole document phase and are
//! drained after it.

use crate::config::Config;
use crate::context::Context;
use crate::dispatch::Backend;
use crate::error::Result;
use crate::http;
use crate::node::{self, Node};
use crate::queue::QueueController;
use crate::registry::{GenericReader, Registry};
use crate::workers::document::{DocumentWorker, LinkReconciler, Processor};
use crate::workers::download::{DownloadScheduler, Scheduler};
use crate::workers::validator::{LinkValidator, Validator, ValidatorWorker};
use crate::writers::{DryRunWriter, Writer};
use std::sync::Arc;

/// Services handed to the link reconciler of a build
#[derive(Clone)]
pub struct BuildServices {
    /// Schedules resource downloads
    pub downloader: Arc<dyn Scheduler>,
    /// Schedules link validation; `None` when validation is disabled
    pub validator: Option<Arc<dyn Validator>>,
}

/// Runs documentation builds
pub struct Reactor {
    config: Config,
    registry: Arc<dyn Registry>,
    content_writer: Arc<dyn Writer>,
    resource_writer: Arc<dyn Writer>,
    processor: Option<Arc<dyn Processor>>,
}

impl Reactor {
    /// Create a reactor
    ///
    /// With `resources.dry_run` set, both writers are replaced by [`DryRunWriter`]s.
    pub fn new(
        config: Config,
        registry: Arc<dyn Registry>,
        content_writer: Arc<dyn Writer>,
        resource_writer: Arc<dyn Writer>,
    ) -> Self {
        let (content_writer, resource_writer): (Arc<dyn Writer>, Arc<dyn Writer>) =
            if config.resources.dry_run {
                (Arc::new(DryRunWriter::new()), Arc::new(DryRunWriter::new()))
            } else {
                (content_writer, resource_writer)
            };
        Self {
            config,
            registry,
            content_writer,
            resource_writer,
            processor: None,
        }
    }

    /// Post-process every document with `processor`
    #[must_use]
    pub fn with_processor(mut self, processor: Arc<dyn Processor>) -> Self {
        self.processor = Some(processor);
        self
    }

    /// Build configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Build every node of `structure`
    ///
    /// `reconciler_factory` receives the build's download and validation services
    /// and returns the link reconciler used for all documents.
    ///
    /// # Errors
    ///
    /// Returns the document phase error if there is one, otherwise the download
    /// phase error. Link validation never fails a build; only the context ending
    /// during validation is reported.
    pub async fn run<F>(&self, ctx: &Context, structure: &[Arc<Node>], reconciler_factory: F) -> Result<()>
    where
        F: FnOnce(BuildServices) -> Arc<dyn LinkReconciler>,
    {
        self.config.validate()?;
        let workers = &self.config.workers;
        let phase_ctx = ctx.child();

        let (downloader, download_controller) = DownloadScheduler::new(
            &phase_ctx,
            workers.resource_download_workers,
            workers.queue_capacity,
            workers.fail_fast,
            Arc::clone(&self.registry),
            Arc::clone(&self.resource_writer),
        )?;

        let (validator, validation_controller) = match self.start_validation(&phase_ctx) {
            Ok(Some((validator, controller))) => (Some(validator), Some(controller)),
            Ok(None) => (None, None),
            Err(err) => {
                download_controller.stop();
                phase_ctx.cancel();
                if let Err(drain_err) = download_controller.wait().await {
                    tracing::debug!(error = %drain_err, "download queue drained with an error");
                }
                return Err(err);
            }
        };

        let reconciler = reconciler_factory(BuildServices {
            downloader: Arc::new(downloader),
            validator,
        });

        let tasks = node::tasks(structure);
        tracing::info!(
            documents = tasks.len(),
            min_workers = workers.min_workers,
            max_workers = workers.max_workers,
            "building documents"
        );

        let reader = Arc::new(GenericReader::new(Arc::clone(&self.registry)));
        let mut document_worker = DocumentWorker::new(reader, Arc::clone(&self.content_writer), reconciler);
        if let Some(processor) = &self.processor {
            document_worker = document_worker.with_processor(Arc::clone(processor));
        }
        let documents = match Backend::new(workers.min_workers, workers.max_workers, document_worker) {
            Ok(backend) => backend.dispatch(&phase_ctx, tasks).await,
            Err(err) => Err(err),
        };

        if let Err(err) = &documents {
            tracing::error!(error = %err, "document phase failed, aborting build");
            phase_ctx.cancel();
        } else {
            tracing::info!("documents built, waiting for downloads and link validation");
        }

        download_controller.stop();
        if let Some(controller) = &validation_controller {
            controller.stop();
        }

        let validation_wait = async {
            match &validation_controller {
                Some(controller) => Some(controller.wait().await),
                None => None,
            }
        };
        let (downloads, validation) = futures::future::join(download_controller.wait(), validation_wait).await;

        documents?;
        let download_stats = downloads?;
        tracing::info!(
            downloaded = download_stats.completed,
            failed = download_stats.failed,
            "resource downloads finished"
        );

        match validation {
            Some(Ok(stats)) => {
                tracing::info!(checked = stats.completed, "link validation finished");
            }
            Some(Err(err)) if err.is_cancellation() => return Err(err),
            Some(Err(err)) => tracing::warn!(error = %err, "link validation ended with an error"),
            None => {}
        }
        Ok(())
    }

    fn start_validation(&self, ctx: &Context) -> Result<Option<(Arc<dyn Validator>, QueueController)>> {
        if !self.config.validation.enabled {
            return Ok(None);
        }
        let client = http::build_client(&self.config.http)?;
        let worker = ValidatorWorker::new(client, Arc::clone(&self.registry), &self.config.validation);
        let (validator, controller) = LinkValidator::new(
            ctx,
            self.config.workers.validation_workers,
            self.config.workers.queue_capacity,
            worker,
        )?;
        Ok(Some((Arc::new(validator), controller)))
    }
}
