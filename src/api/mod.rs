//! Client for the online video recorder's XML API.
//!
//! Three endpoints are used, all authenticated with `username`/`password`
//! query parameters and all answering with a document whose top-level
//! `status` element must read `true`:
//!
//! - `/api/users.xml` checks the credentials,
//! - `/api/recordings.xml` lists the recordings,
//! - `/api/recordings/<id>/delete.xml` deletes a recording.

pub mod cache;
pub mod parse;
pub mod transport;

use std::collections::BTreeSet;

use async_trait::async_trait;

use crate::config::ServiceConfig;
use crate::error::{Error, Result};

pub use cache::{CacheKind, ResponseCache};
pub use parse::{Inventory, Reply, parse_reply};
pub use transport::{ReqwestTransport, Transport, build_http_client, redact};

/// Remote side of the synchronisation.
#[async_trait]
pub trait RemoteCatalog: Send {
    /// Checks that the service accepts the configured credentials.
    ///
    /// # Errors
    ///
    /// Fails on transport errors or a negative status.
    async fn check_credentials(&mut self) -> Result<()>;

    /// Returns the complete list of recordings.
    ///
    /// # Errors
    ///
    /// Fails on transport errors, a negative status, or when any recording
    /// lacks a required attribute. No partial inventory is ever returned.
    async fn fetch_inventory(&mut self) -> Result<Inventory>;

    /// Deletes a recording on the service.
    ///
    /// # Errors
    ///
    /// Fails on transport errors or a negative status.
    async fn retire_recording(&mut self, id: &str) -> Result<()>;
}

/// [`RemoteCatalog`] talking to the real service.
pub struct ServiceClient<T: Transport = ReqwestTransport> {
    transport: T,
    base_url: String,
    username: String,
    password: String,
    cache: ResponseCache,
    inventory: Inventory,
}

impl<T: Transport> ServiceClient<T> {
    /// Creates a client for the configured service.
    #[must_use]
    pub fn new(transport: T, service: &ServiceConfig, cache: ResponseCache) -> Self {
        Self {
            transport,
            base_url: service.base_url(),
            username: service.username.clone(),
            password: service.password.clone(),
            cache,
            inventory: Inventory::new(),
        }
    }

    /// Identifiers of the most recently fetched inventory.
    #[must_use]
    pub fn known_ids(&self) -> BTreeSet<String> {
        self.inventory.keys().cloned().collect()
    }

    /// Returns the reply cache.
    #[must_use]
    pub const fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    fn endpoint(&self, path: &str) -> Result<reqwest::Url> {
        let raw = format!("{}/api/{path}", self.base_url);
        reqwest::Url::parse_with_params(
            &raw,
            &[("username", &self.username), ("password", &self.password)],
        )
        .map_err(|e| Error::Config(format!("invalid service URL {raw}: {e}")))
    }

    /// Returns a validated reply, from the cache when it is fresh and sound.
    ///
    /// A fresh reply is stored in the cache only after `validate` accepted
    /// it, so a rejected reply never replaces a previous good one.
    async fn query<V, R>(&self, kind: CacheKind, path: &str, validate: V) -> Result<R>
    where
        V: Fn(Reply) -> Result<R> + Send,
        R: Send,
    {
        if let Some(body) = self.cache.fresh(kind).await {
            match parse_reply(&body).and_then(|reply| {
                reply.ensure_positive()?;
                validate(reply)
            }) {
                Ok(result) => {
                    log::info!("using cached response for {}", kind.file_name());
                    return Ok(result);
                }
                Err(e) => {
                    log::warn!("ignoring unusable cached {}: {e}", kind.file_name());
                    self.cache.invalidate(kind).await;
                }
            }
        }

        let url = self.endpoint(path)?;
        let body = self.transport.get(&url).await?;
        let reply = parse_reply(&body)?;
        reply.ensure_positive()?;
        let result = validate(reply)?;
        self.cache.store(kind, &body).await;
        Ok(result)
    }
}

#[async_trait]
impl<T: Transport> RemoteCatalog for ServiceClient<T> {
    async fn check_credentials(&mut self) -> Result<()> {
        self.query(CacheKind::Credentials, "users.xml", |_| Ok(()))
            .await
    }

    async fn fetch_inventory(&mut self) -> Result<Inventory> {
        self.inventory.clear();

        let inventory = self
            .query(CacheKind::Recordings, "recordings.xml", Reply::into_inventory)
            .await
            .inspect_err(|e| log::warn!("cannot fetch recordings: {e}"))?;

        let extra: BTreeSet<&str> = inventory
            .values()
            .flat_map(|r| r.extra.keys().map(String::as_str))
            .collect();
        if !extra.is_empty() {
            log::info!("the list of recordings contains additional attributes: {extra:?}");
        }
        for record in inventory.values() {
            log::debug!("values for recording {}", record.id);
            for (name, value) in record.attributes() {
                log::debug!("  {name} = {value:?}");
            }
        }

        self.inventory.clone_from(&inventory);
        Ok(inventory)
    }

    async fn retire_recording(&mut self, id: &str) -> Result<()> {
        let url = self.endpoint(&format!("recordings/{id}/delete.xml"))?;
        let result = self.transport.get(&url).await;
        // The listing no longer reflects the server whatever the outcome.
        self.cache.invalidate(CacheKind::Recordings).await;
        parse_reply(&result?)?.ensure_positive()
    }
}
