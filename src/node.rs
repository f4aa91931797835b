//! Documentation tree nodes and the depth-first task walk

use crate::workers::document::DocumentWorkTask;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// One node of the documentation structure
///
/// A node with `sources` becomes a document whose content is the concatenation of
/// those sources; a node without sources is a container written with empty
/// content. `path` is the output directory of the node relative to the
/// destination root.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// File name of the generated document
    pub name: String,
    /// Output directory relative to the destination root
    #[serde(default)]
    pub path: String,
    /// Content source URIs, concatenated in this order
    #[serde(default)]
    pub sources: Vec<String>,
    /// Child nodes
    #[serde(default)]
    pub nodes: Vec<Arc<Node>>,
    /// Free-form metadata handed to writers and processors
    #[serde(default)]
    pub properties: HashMap<String, serde_json::Value>,
}

impl Node {
    /// Node without sources or children
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Set the output directory
    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Append a content source
    #[must_use]
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.sources.push(source.into());
        self
    }

    /// Append a child node
    #[must_use]
    pub fn with_child(mut self, child: Node) -> Self {
        self.nodes.push(Arc::new(child));
        self
    }
}

/// Walk `nodes` depth-first, producing one document task per node
///
/// Parents come before their children and siblings keep their order.
pub fn tasks(nodes: &[Arc<Node>]) -> Vec<DocumentWorkTask> {
    let mut out = Vec::new();
    collect(nodes, &mut out);
    out
}

fn collect(nodes: &[Arc<Node>], out: &mut Vec<DocumentWorkTask>) {
    for node in nodes {
        out.push(DocumentWorkTask {
            node: Arc::clone(node),
        });
        collect(&node.nodes, out);
    }
}
