//! Resource handlers and the registry that selects them
//!
//! A [`ResourceHandler`] knows how to fetch content for a family of URIs, whether
//! a link can be resolved without touching the network, and which HTTP client
//! should be used for its hosts. The [`Registry`] picks the handler for a URI.

use crate::config::{HttpConfig, ResourceConfig};
use crate::context::Context;
use crate::error::{Error, ResourceError, Result};
use crate::http;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use url::Url;

/// Per-destination resolver
#[async_trait]
pub trait ResourceHandler: Send + Sync {
    /// Returns true if this handler serves `uri`
    fn accept(&self, uri: &str) -> bool;

    /// Resolve `link` relative to the content at `content_path`
    ///
    /// An `Ok` means the destination exists locally and needs no network check.
    /// [`ResourceError::NotFound`] means it is not locally resolvable.
    fn build_abs_link(&self, content_path: &str, link: &str) -> std::result::Result<String, ResourceError>;

    /// HTTP client to use for this handler's hosts, if it has a dedicated one
    fn client(&self) -> Option<reqwest::Client>;

    /// Fetch the content behind `uri`
    async fn read(&self, ctx: &Context, uri: &str) -> Result<Vec<u8>>;
}

/// Lookup of the handler responsible for a URI
pub trait Registry: Send + Sync {
    /// The handler for `uri`, if any accepts it
    fn get(&self, uri: &str) -> Option<Arc<dyn ResourceHandler>>;
}

/// Reads bytes from a source URI
#[async_trait]
pub trait Reader: Send + Sync {
    /// Read the content at `source`
    async fn read(&self, ctx: &Context, source: &str) -> Result<Vec<u8>>;
}

/// Ordered list of handlers; the first one accepting a URI wins
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: Vec<Arc<dyn ResourceHandler>>,
}

impl HandlerRegistry {
    /// Create a registry from handlers in priority order
    pub fn new(handlers: Vec<Arc<dyn ResourceHandler>>) -> Self {
        Self { handlers }
    }

    /// Registry with a single unrestricted [`HttpResourceHandler`]
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn from_config(http_config: &HttpConfig, resources: &ResourceConfig) -> Result<Self> {
        let handler = HttpResourceHandler::new(http::build_client(http_config)?, http_config.max_response_body)
            .with_version_overrides(resources.version_overrides.clone());
        Ok(Self::new(vec![Arc::new(handler)]))
    }

    /// Append a handler with the lowest priority
    pub fn register(&mut self, handler: Arc<dyn ResourceHandler>) {
        self.handlers.push(handler);
    }

    /// Number of registered handlers
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Returns true if no handler is registered
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl Registry for HandlerRegistry {
    fn get(&self, uri: &str) -> Option<Arc<dyn ResourceHandler>> {
        self.handlers.iter().find(|h| h.accept(uri)).cloned()
    }
}

/// Generic handler for plain `http`/`https` resources
///
/// Never resolves links locally, so every link it accepts is validated over the
/// network. Reads are bounded by `max_response_body`.
#[derive(Clone, Debug)]
pub struct HttpResourceHandler {
    client: reqwest::Client,
    max_response_body: u64,
    hosts: Vec<String>,
    version_overrides: HashMap<String, String>,
}

impl HttpResourceHandler {
    /// Handler accepting every `http(s)` URL
    pub fn new(client: reqwest::Client, max_response_body: u64) -> Self {
        Self {
            client,
            max_response_body,
            hosts: Vec::new(),
            version_overrides: HashMap::new(),
        }
    }

    /// Restrict the handler to the given host names
    #[must_use]
    pub fn with_hosts<I, S>(mut self, hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.hosts = hosts.into_iter().map(Into::into).collect();
        self
    }

    /// Attach repository to version overrides
    #[must_use]
    pub fn with_version_overrides(mut self, overrides: HashMap<String, String>) -> Self {
        self.version_overrides = overrides;
        self
    }

    /// Version override for the repository `uri` belongs to
    ///
    /// Keys are repository URL prefixes matched on path segment boundaries; the
    /// longest matching prefix wins.
    pub fn version_override(&self, uri: &str) -> Option<&str> {
        self.matching_override(uri).map(|(_, version)| version)
    }

    fn matching_override(&self, uri: &str) -> Option<(&str, &str)> {
        self.version_overrides
            .iter()
            .filter(|(repo, _)| {
                let repo = repo.trim_end_matches('/');
                uri.strip_prefix(repo)
                    .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
            })
            .max_by_key(|(repo, _)| repo.len())
            .map(|(repo, version)| (repo.trim_end_matches('/'), version.as_str()))
    }

    /// `uri` with its ref segment replaced by the repository's version override
    ///
    /// Only `<repo>/{blob,raw,tree}/<ref>/...` URLs carry a ref; any other URI
    /// is returned unchanged.
    pub fn versioned_uri(&self, uri: &str) -> String {
        let Some((repo, version)) = self.matching_override(uri) else {
            return uri.to_string();
        };
        let rest = &uri[repo.len()..];
        let mut segments: Vec<&str> = rest.trim_start_matches('/').split('/').collect();
        if segments.len() < 2 || !matches!(segments[0], "blob" | "raw" | "tree") {
            return uri.to_string();
        }
        segments[1] = version;
        format!("{repo}/{}", segments.join("/"))
    }
}

#[async_trait]
impl ResourceHandler for HttpResourceHandler {
    fn accept(&self, uri: &str) -> bool {
        let Ok(url) = Url::parse(uri) else {
            return false;
        };
        if !matches!(url.scheme(), "http" | "https") {
            return false;
        }
        if self.hosts.is_empty() {
            return true;
        }
        url.host_str()
            .is_some_and(|host| self.hosts.iter().any(|h| h.eq_ignore_ascii_case(host)))
    }

    fn build_abs_link(&self, _content_path: &str, link: &str) -> std::result::Result<String, ResourceError> {
        Err(ResourceError::NotFound(link.to_string()))
    }

    fn client(&self) -> Option<reqwest::Client> {
        Some(self.client.clone())
    }

    async fn read(&self, ctx: &Context, uri: &str) -> Result<Vec<u8>> {
        let target = self.versioned_uri(uri);
        if target != uri {
            tracing::debug!(%uri, %target, "reading pinned repository version");
        }
        let uri = target.as_str();

        let fetch = async {
            let response = self.client.get(uri).send().await?;
            let status = response.status();
            if !status.is_success() {
                return Err(Error::Resource(ResourceError::Status {
                    uri: uri.to_string(),
                    status: status.as_u16(),
                }));
            }
            http::read_limited(response, uri, self.max_response_body).await
        };

        tokio::select! {
            biased;
            err = ctx.done() => Err(err.into()),
            result = fetch => result,
        }
    }
}

/// [`Reader`] delegating to whichever registry handler accepts the source
#[derive(Clone)]
pub struct GenericReader {
    registry: Arc<dyn Registry>,
}

impl GenericReader {
    /// Create a reader over `registry`
    pub fn new(registry: Arc<dyn Registry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl Reader for GenericReader {
    async fn read(&self, ctx: &Context, source: &str) -> Result<Vec<u8>> {
        match self.registry.get(source) {
            Some(handler) => handler.read(ctx, source).await,
            None => Err(ResourceError::NoHandler(source.to_string()).into()),
        }
    }
}
