//! Document worker: assemble one node from its sources and write it

use crate::context::Context;
use crate::error::{Result, WorkerError};
use crate::node::Node;
use crate::registry::Reader;
use crate::worker::Worker;
use crate::writers::Writer;
use async_trait::async_trait;
use std::sync::Arc;

/// Task of the [`DocumentWorker`]
#[derive(Clone, Debug)]
pub struct DocumentWorkTask {
    /// Node to generate
    pub node: Arc<Node>,
}

/// Rewrites the links of one source block
///
/// Implementations typically schedule resource downloads and link validation as
/// a side effect.
#[async_trait]
pub trait LinkReconciler: Send + Sync {
    /// Return `bytes` with links reconciled for `node`
    async fn reconcile_links(&self, ctx: &Context, node: &Node, source: &str, bytes: Vec<u8>) -> Result<Vec<u8>>;
}

/// Post-processes an assembled document
pub trait Processor: Send + Sync {
    /// Transform the document bytes of `node`
    fn process(&self, bytes: Vec<u8>, node: &Node) -> Result<Vec<u8>>;
}

/// Reads, reconciles, concatenates and writes documents
pub struct DocumentWorker {
    reader: Arc<dyn Reader>,
    writer: Arc<dyn Writer>,
    reconciler: Arc<dyn LinkReconciler>,
    processor: Option<Arc<dyn Processor>>,
}

impl DocumentWorker {
    /// Create a worker without a post-processor
    pub fn new(reader: Arc<dyn Reader>, writer: Arc<dyn Writer>, reconciler: Arc<dyn LinkReconciler>) -> Self {
        Self {
            reader,
            writer,
            reconciler,
            processor: None,
        }
    }

    /// Run `processor` over every assembled document
    #[must_use]
    pub fn with_processor(mut self, processor: Arc<dyn Processor>) -> Self {
        self.processor = Some(processor);
        self
    }

    async fn assemble(&self, ctx: &Context, node: &Node) -> Result<Option<Vec<u8>>> {
        let mut blocks = Vec::with_capacity(node.sources.len());
        for source in &node.sources {
            let bytes = self.reader.read(ctx, source).await?;
            if bytes.is_empty() {
                tracing::debug!(node = %node.name, %source, "no bytes read from source");
                continue;
            }
            blocks.push(self.reconciler.reconcile_links(ctx, node, source, bytes).await?);
        }

        if blocks.is_empty() {
            return Ok(None);
        }

        let document = blocks.concat();
        match &self.processor {
            Some(processor) => processor.process(document, node).map(Some),
            None => Ok(Some(document)),
        }
    }
}

#[async_trait]
impl Worker<DocumentWorkTask> for DocumentWorker {
    async fn work(&self, ctx: &Context, task: DocumentWorkTask) -> std::result::Result<(), WorkerError> {
        let node = task.node.as_ref();

        let document = if node.sources.is_empty() {
            Vec::new()
        } else {
            match self.assemble(ctx, node).await? {
                Some(document) => document,
                None => {
                    tracing::debug!(node = %node.name, "all sources empty, skipping write");
                    return Ok(());
                }
            }
        };

        self.writer
            .write(&node.name, &node.path, &document, Some(node))
            .await?;
        Ok(())
    }
}
