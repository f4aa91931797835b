//! In-memory resource handlers for driving workers in tests

use async_trait::async_trait;
use docweave::context::Context;
use docweave::error::{ResourceError, Result};
use docweave::registry::{Registry, ResourceHandler};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Handler that serves fixed content and optionally resolves links locally
pub struct FakeHandler {
    pub prefix: String,
    pub content: HashMap<String, Vec<u8>>,
    pub local_links: Vec<String>,
    pub client: Option<reqwest::Client>,
    pub reads: AtomicUsize,
}

impl FakeHandler {
    pub fn new(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
            content: HashMap::new(),
            local_links: Vec::new(),
            client: None,
            reads: AtomicUsize::new(0),
        }
    }

    pub fn with_content(mut self, uri: &str, body: &str) -> Self {
        self.content.insert(uri.to_string(), body.as_bytes().to_vec());
        self
    }

    pub fn with_local_link(mut self, uri: &str) -> Self {
        self.local_links.push(uri.to_string());
        self
    }

    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = Some(client);
        self
    }
}

#[async_trait]
impl ResourceHandler for FakeHandler {
    fn accept(&self, uri: &str) -> bool {
        uri.starts_with(&self.prefix)
    }

    fn build_abs_link(&self, _content_path: &str, link: &str) -> std::result::Result<String, ResourceError> {
        if self.local_links.iter().any(|l| l == link) {
            Ok(link.to_string())
        } else {
            Err(ResourceError::NotFound(link.to_string()))
        }
    }

    fn client(&self) -> Option<reqwest::Client> {
        self.client.clone()
    }

    async fn read(&self, _ctx: &Context, uri: &str) -> Result<Vec<u8>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.content
            .get(uri)
            .cloned()
            .ok_or_else(|| ResourceError::NotFound(uri.to_string()).into())
    }
}

/// Registry over a fixed handler list
pub struct FakeRegistry(pub Vec<Arc<dyn ResourceHandler>>);

impl Registry for FakeRegistry {
    fn get(&self, uri: &str) -> Option<Arc<dyn ResourceHandler>> {
        self.0.iter().find(|h| h.accept(uri)).cloned()
    }
}
