//! Cache store model and the versioned shell-cache lifecycle.

use std::sync::Arc;

use hashbrown::HashMap;
use tokio::sync::RwLock;
use tracing::{debug, error, info};
use url::Url;

use crate::{NetworkBackend, Request, Response, SwError};

// ==================== Cache ====================

/// A named cache namespace holding request-identity → response snapshots.
#[derive(Debug, Default)]
pub struct Cache {
    /// Cache name.
    pub name: String,

    /// Cached entries, keyed by request identity (method + URL).
    entries: HashMap<String, Response>,
}

impl Cache {
    /// Create a new cache.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            entries: HashMap::new(),
        }
    }

    /// Match a request against the stored entries.
    pub fn match_request(&self, request: &Request) -> Option<&Response> {
        self.entries.get(&request.identity())
    }

    /// Store a response snapshot for a request. Overwrites any previous
    /// snapshot for the same identity (last write wins).
    pub fn put(&mut self, request: &Request, response: Response) {
        self.entries.insert(request.identity(), response);
    }

    /// Delete the entry for a request.
    pub fn delete(&mut self, request: &Request) -> bool {
        self.entries.remove(&request.identity()).is_some()
    }

    /// Get all stored identities.
    pub fn keys(&self) -> Vec<&str> {
        self.entries.keys().map(|s| s.as_str()).collect()
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ==================== Cache Storage ====================

/// The browser cache store: named namespaces of cached entries.
#[derive(Debug, Default)]
pub struct CacheStorage {
    caches: HashMap<String, Cache>,
}

impl CacheStorage {
    /// Create new cache storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a cache namespace, creating it if absent.
    pub fn open(&mut self, name: &str) -> &mut Cache {
        self.caches
            .entry(name.to_string())
            .or_insert_with(|| Cache::new(name))
    }

    /// Get a cache namespace without creating it.
    pub fn get(&self, name: &str) -> Option<&Cache> {
        self.caches.get(name)
    }

    /// Check if a namespace exists.
    pub fn has(&self, name: &str) -> bool {
        self.caches.contains_key(name)
    }

    /// Delete a namespace.
    pub fn delete(&mut self, name: &str) -> bool {
        self.caches.remove(name).is_some()
    }

    /// Get all namespace names.
    pub fn names(&self) -> Vec<String> {
        self.caches.keys().cloned().collect()
    }
}

// ==================== Shell Cache Manager ====================

/// Owns the current versioned cache namespace.
///
/// Install warms the shell manifest into the current namespace; activation
/// deletes every other namespace carrying the application prefix. A version
/// bump is the only cache-invalidation mechanism.
pub struct ShellCacheManager {
    prefix: String,
    version: String,
    manifest: Vec<String>,
    origin: Url,
    storage: Arc<RwLock<CacheStorage>>,
    network: Arc<dyn NetworkBackend>,
}

impl ShellCacheManager {
    pub fn new(
        prefix: impl Into<String>,
        version: impl Into<String>,
        manifest: Vec<String>,
        origin: Url,
        storage: Arc<RwLock<CacheStorage>>,
        network: Arc<dyn NetworkBackend>,
    ) -> Self {
        Self {
            prefix: prefix.into(),
            version: version.into(),
            manifest,
            origin,
            storage,
            network,
        }
    }

    /// Name of the current cache namespace: `<prefix>-<version>`.
    pub fn cache_name(&self) -> String {
        format!("{}-{}", self.prefix, self.version)
    }

    /// Warm the shell manifest into the current namespace.
    ///
    /// Every manifest URL is fetched with cache-bypass semantics before any
    /// entry is stored, so a single failure leaves the namespace untouched.
    pub async fn handle_install(&self) -> Result<(), SwError> {
        let cache_name = self.cache_name();
        let mut entries = Vec::with_capacity(self.manifest.len());

        for path in &self.manifest {
            let url = self
                .origin
                .join(path)
                .map_err(|e| SwError::InvalidUrl(format!("{path}: {e}")))?;
            let request = Request::reload(url);
            let response = match self.network.fetch(&request) {
                Ok(response) => response,
                Err(err) => {
                    error!(%path, %err, "shell warm-up fetch failed");
                    return Err(err);
                }
            };
            if !response.status.is_success() {
                error!(%path, status = %response.status, "shell warm-up rejected");
                return Err(SwError::CacheError(format!(
                    "shell fetch for {path} returned {}",
                    response.status
                )));
            }
            entries.push((request, response));
        }

        let mut storage = self.storage.write().await;
        let cache = storage.open(&cache_name);
        for (request, response) in entries {
            cache.put(&request, response);
        }
        info!(cache = %cache_name, urls = self.manifest.len(), "shell cache populated");
        Ok(())
    }

    /// Delete every namespace with the application prefix except the current
    /// one. Returns the deleted names; deleting nothing is not a failure.
    pub async fn handle_activate(&self) -> Result<Vec<String>, SwError> {
        let current = self.cache_name();
        let stale_prefix = format!("{}-", self.prefix);

        let mut storage = self.storage.write().await;
        let stale: Vec<String> = storage
            .names()
            .into_iter()
            .filter(|name| name.starts_with(&stale_prefix) && *name != current)
            .collect();

        for name in &stale {
            storage.delete(name);
            debug!(cache = %name, "deleted stale cache");
        }
        Ok(stale)
    }
}
