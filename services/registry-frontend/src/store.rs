//! The set of registries known to the frontend.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use futures::StreamExt as _;
use parking_lot::RwLock;

use crate::blob::BlobSizeCache;
use crate::client::RegistryClient;
use crate::error::Error;
use crate::options::ClientOptions;
use crate::overview::RegistrySummary;
use crate::registry::Registry;

/// Creates clients for registries held in a [`RegistryStore`].
pub trait Connector: fmt::Debug + Send + Sync {
    /// Create a client for `registry`.
    fn connect(
        &self,
        registry: &Registry,
        cache: BlobSizeCache,
        options: ClientOptions,
    ) -> Result<RegistryClient, Error>;
}

/// Connects to registries over the network.
#[derive(Debug, Clone, Copy, Default)]
pub struct Network;

impl Connector for Network {
    fn connect(
        &self,
        registry: &Registry,
        cache: BlobSizeCache,
        options: ClientOptions,
    ) -> Result<RegistryClient, Error> {
        RegistryClient::new(registry, cache, options)
    }
}

/// An in-memory collection of registries, keyed by name.
///
/// Every client created by one store shares a single [`BlobSizeCache`].
#[derive(Debug, Clone)]
pub struct RegistryStore {
    registries: Arc<RwLock<BTreeMap<String, Registry>>>,
    cache: BlobSizeCache,
    options: ClientOptions,
    connector: Arc<dyn Connector>,
}

impl Default for RegistryStore {
    fn default() -> Self {
        Self::new(ClientOptions::default())
    }
}

impl RegistryStore {
    /// An empty store whose clients connect over the network.
    pub fn new(options: ClientOptions) -> Self {
        Self::with_connector(options, Network)
    }

    /// An empty store whose clients are created by `connector`.
    pub fn with_connector<C>(options: ClientOptions, connector: C) -> Self
    where
        C: Connector + 'static,
    {
        RegistryStore {
            registries: Default::default(),
            cache: BlobSizeCache::new(),
            options,
            connector: Arc::new(connector),
        }
    }

    /// The blob size cache shared by this store's clients.
    pub fn cache(&self) -> &BlobSizeCache {
        &self.cache
    }

    /// Options applied to every client.
    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    /// Number of registries.
    pub fn len(&self) -> usize {
        self.registries.read().len()
    }

    /// True when no registry is known.
    pub fn is_empty(&self) -> bool {
        self.registries.read().is_empty()
    }

    /// All registries, sorted by name.
    pub fn registries(&self) -> Vec<Registry> {
        self.registries.read().values().cloned().collect()
    }

    /// Look up a registry by name.
    pub fn registry(&self, name: &str) -> Result<Registry, Error> {
        self.registries
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| Error::NotFound {
                kind: "registry",
                name: name.to_owned(),
            })
    }

    /// A client for the named registry.
    pub fn client(&self, name: &str) -> Result<RegistryClient, Error> {
        let registry = self.registry(name)?;
        self.connect(&registry)
    }

    /// Clients for every registry, sorted by name.
    pub fn clients(&self) -> Result<Vec<RegistryClient>, Error> {
        self.registries()
            .iter()
            .map(|registry| self.connect(registry))
            .collect()
    }

    fn connect(&self, registry: &Registry) -> Result<RegistryClient, Error> {
        self.connector
            .connect(registry, self.cache.clone(), self.options.clone())
    }

    /// Add a registry, replacing any registry of the same name.
    pub fn add(&self, registry: Registry) -> Result<(), Error> {
        registry.validate()?;
        tracing::debug!(registry = %registry.name, url = %registry.url, "adding registry");
        self.registries
            .write()
            .insert(registry.name.clone(), registry);
        Ok(())
    }

    /// Replace a registry. Same as [`RegistryStore::add`].
    pub fn update(&self, registry: Registry) -> Result<(), Error> {
        self.add(registry)
    }

    /// Remove a registry by name, returning it.
    pub fn remove(&self, name: &str) -> Result<Registry, Error> {
        self.registries
            .write()
            .remove(name)
            .ok_or_else(|| Error::NotFound {
                kind: "registry",
                name: name.to_owned(),
            })
    }

    /// Forget every registry.
    pub fn clear(&self) {
        self.registries.write().clear();
    }

    /// Summaries of every registry, sorted by name, probing at most `concurrency` at a time.
    ///
    /// Registries which cannot be reached are reported offline.
    pub async fn overview(&self, concurrency: usize) -> Vec<RegistrySummary> {
        let registries = self.registries();

        futures::stream::iter(registries)
            .map(|registry| async move {
                match self.connect(&registry) {
                    Ok(client) => client.summary().await,
                    Err(error) => {
                        tracing::warn!(registry = %registry.name, %error, "cannot connect");
                        RegistrySummary {
                            name: registry.name,
                            url: registry.url,
                            online: false,
                            repositories: None,
                        }
                    }
                }
            })
            .buffered(concurrency.max(1))
            .collect()
            .await
    }
}
