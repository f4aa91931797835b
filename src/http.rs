//! Shared HTTP helpers

use crate::config::HttpConfig;
use crate::error::{Error, ResourceError, Result};

/// Build the default HTTP client for a build
///
/// # Errors
///
/// Returns [`Error::Network`] if the TLS backend cannot be initialized.
pub fn build_client(config: &HttpConfig) -> Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .timeout(config.request_timeout)
        .user_agent(concat!("docweave/", env!("CARGO_PKG_VERSION")))
        .build()?;
    Ok(client)
}

/// Read a response body, refusing bodies larger than `limit` bytes
///
/// At most `limit` bytes are buffered; the stream is abandoned as soon as it
/// exceeds the limit.
///
/// # Errors
///
/// - [`ResourceError::TooLarge`] when the body does not end within `limit` bytes
/// - [`Error::Network`] when the body stream fails
pub async fn read_limited(mut response: reqwest::Response, uri: &str, limit: u64) -> Result<Vec<u8>> {
    let too_large = || {
        Error::Resource(ResourceError::TooLarge {
            uri: uri.to_string(),
            limit,
        })
    };

    if response.content_length().is_some_and(|len| len > limit) {
        return Err(too_large());
    }

    let mut body = Vec::new();
    while let Some(chunk) = response.chunk().await? {
        if body.len() as u64 + chunk.len() as u64 > limit {
            return Err(too_large());
        }
        body.extend_from_slice(&chunk);
    }
    Ok(body)
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn fetch(server: &MockServer, limit: u64) -> Result<Vec<u8>> {
        let url = format!("{}/body", server.uri());
        let response = reqwest::get(&url).await.unwrap();
        read_limited(response, &url, limit).await
    }

    #[tokio::test]
    async fn body_within_limit_is_returned() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/body"))
            .respond_with(ResponseTemplate::new(200).set_body_string("0123456789"))
            .mount(&server)
            .await;

        let body = fetch(&server, 10).await.unwrap();
        assert_eq!(body, b"0123456789");
    }

    #[tokio::test]
    async fn body_over_limit_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/body"))
            .respond_with(ResponseTemplate::new(200).set_body_string("0123456789"))
            .mount(&server)
            .await;

        let err = fetch(&server, 9).await.unwrap_err();
        assert!(err.to_string().contains("too large"), "got: {err}");
    }

    #[test]
    fn client_builds_from_default_config() {
        build_client(&HttpConfig::default()).unwrap();
    }
}
