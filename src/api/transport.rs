//! Raw HTTP access to the service, abstracted for testability.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::{Error, Result};

/// Performs a GET request and returns the body of a successful reply.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Fetches `url`.
    ///
    /// # Errors
    ///
    /// Fails on connection errors and on non-success status codes.
    async fn get(&self, url: &reqwest::Url) -> Result<String>;
}

/// [`Transport`] backed by a shared `reqwest` client.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Wraps an existing client.
    #[must_use]
    pub const fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn get(&self, url: &reqwest::Url) -> Result<String> {
        let shown = redact(url);
        let response = self.client.get(url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            log::warn!("request failed ({status}): {shown}");
            return Err(Error::Status {
                status: status.as_u16(),
                url: shown,
            });
        }
        log::info!("{shown} -> ({status})");
        let body = response.text().await?;
        log::debug!("{body}");
        Ok(body)
    }
}

/// Builds the shared HTTP client used for service calls and transfers.
///
/// # Errors
///
/// Returns an error if the TLS backend cannot be initialised.
pub fn build_http_client(user_agent: &str, timeout: Duration) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(user_agent)
        .connect_timeout(timeout)
        .read_timeout(timeout)
        .pool_idle_timeout(Duration::from_secs(60))
        .tcp_keepalive(Duration::from_secs(30))
        .build()
}

/// Renders a URL with its `password` query parameter masked.
#[must_use]
pub fn redact(url: &reqwest::Url) -> String {
    if !url.query_pairs().any(|(k, _)| k == "password") {
        return url.to_string();
    }
    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| {
            let v = if k == "password" { "***".to_string() } else { v.into_owned() };
            (k.into_owned(), v)
        })
        .collect();
    let mut shown = url.clone();
    shown.query_pairs_mut().clear().extend_pairs(pairs);
    shown.to_string()
}
