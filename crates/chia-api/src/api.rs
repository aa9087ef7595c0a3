//! Store composition: registry, transport adapter, cache and endpoints.
//!
//! [`ChiaApi`] is the entry point. Configure it once with
//! [`initialize_config`](ChiaApi::initialize_config), then open queries by
//! endpoint name. Each distinct `(endpoint, args)` pair shares one cache entry;
//! the entry's first subscriber triggers the fetch and, for endpoints that
//! declare invalidations, the push-subscription lifecycle.
//!
//! # Example
//!
//! ```rust,ignore
//! use chia_api::{ChiaApi, ClientConfig};
//! use serde_json::json;
//!
//! let api = ChiaApi::new();
//! api.initialize_config(ClientConfig::from_chia_root(root)?);
//!
//! let wallets = api.query("getWallets", json!({}))?;
//! let state = wallets.settled().await;
//! println!("{:?}", state.data);
//! ```

use crate::base_query::{BaseQuery, QueryResult, RequestDescriptor};
use crate::cache::{CacheEntry, QueryCache, QueryKey, QueryState};
use crate::config::{ClientConfig, ClientDefaults};
use crate::endpoints::{self, Endpoint, EndpointKind};
use crate::invalidation::{on_cache_entry_added_invalidate, LifecycleContext, RefetchDispatch};
use crate::registry::ServiceRegistry;
use crate::{ChiaError, Result};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, warn};

/// Builder for [`ChiaApi`].
pub struct ChiaApiBuilder {
    keep_unused_for: Duration,
    endpoints: Vec<Endpoint>,
}

impl Default for ChiaApiBuilder {
    fn default() -> Self {
        Self {
            keep_unused_for: ClientDefaults::KEEP_UNUSED_DATA_FOR,
            endpoints: endpoints::all(),
        }
    }
}

impl ChiaApiBuilder {
    /// How long an entry without subscribers stays cached.
    ///
    /// Default: 60 seconds
    pub fn keep_unused_for(mut self, duration: Duration) -> Self {
        self.keep_unused_for = duration;
        self
    }

    /// Replace the endpoint set.
    ///
    /// Default: every built-in endpoint
    pub fn endpoints(mut self, endpoints: Vec<Endpoint>) -> Self {
        self.endpoints = endpoints;
        self
    }

    pub fn add_endpoint(mut self, endpoint: Endpoint) -> Self {
        self.endpoints.push(endpoint);
        self
    }

    pub fn build(self) -> ChiaApi {
        let registry = Arc::new(ServiceRegistry::new());
        let endpoints = self
            .endpoints
            .into_iter()
            .map(|endpoint| (endpoint.name, Arc::new(endpoint)))
            .collect();

        ChiaApi {
            inner: Arc::new(ApiInner {
                base_query: BaseQuery::new(registry.clone()),
                registry,
                cache: Arc::new(QueryCache::new(self.keep_unused_for)),
                endpoints,
            }),
        }
    }
}

struct ApiInner {
    registry: Arc<ServiceRegistry>,
    base_query: BaseQuery,
    cache: Arc<QueryCache>,
    endpoints: HashMap<&'static str, Arc<Endpoint>>,
}

/// Handle to the query layer. Cheap to clone.
#[derive(Clone)]
pub struct ChiaApi {
    inner: Arc<ApiInner>,
}

impl std::fmt::Debug for ChiaApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChiaApi")
            .field("configured", &self.inner.registry.is_configured())
            .field("cache", &self.inner.cache)
            .field("endpoints", &self.inner.endpoints.len())
            .finish()
    }
}

impl Default for ChiaApi {
    fn default() -> Self {
        Self::new()
    }
}

impl ChiaApi {
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> ChiaApiBuilder {
        ChiaApiBuilder::default()
    }

    /// Set the connection configuration. Required before any request succeeds.
    pub fn initialize_config(&self, config: ClientConfig) {
        self.inner.registry.initialize_config(config);
    }

    pub fn registry(&self) -> &Arc<ServiceRegistry> {
        &self.inner.registry
    }

    pub fn cache(&self) -> &Arc<QueryCache> {
        &self.inner.cache
    }

    pub fn endpoint(&self, name: &str) -> Result<Arc<Endpoint>> {
        self.inner
            .endpoints
            .get(name)
            .cloned()
            .ok_or_else(|| ChiaError::UnknownEndpoint(name.to_string()))
    }

    pub fn endpoint_names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.inner.endpoints.keys().copied().collect();
        names.sort_unstable();
        names
    }

    /// Subscribe to the cache entry for `endpoint(args)`.
    ///
    /// The first subscriber starts the fetch. Errors, including a missing
    /// configuration, surface in the entry's state rather than here; only an
    /// unknown or non-query endpoint fails immediately.
    pub fn query(&self, endpoint: &str, args: Value) -> Result<QuerySubscription> {
        let endpoint = self.endpoint(endpoint)?;
        if endpoint.kind != EndpointKind::Query {
            return Err(ChiaError::InvalidParams {
                message: format!("{} is a mutation", endpoint.name),
            });
        }

        let args = endpoint.normalize_args(args);
        let key = QueryKey::new(endpoint.name, &args);
        let provides = endpoint.provided_tags(&args);
        let (entry, created) = self.inner.cache.acquire(key, args, provides);

        if created {
            self.start_fetch(endpoint.clone(), entry.clone());
            if !endpoint.invalidations.is_empty() {
                self.start_lifecycle(endpoint, entry.clone());
            }
        }

        Ok(QuerySubscription {
            api: self.clone(),
            entry,
            released: AtomicBool::new(false),
        })
    }

    /// Run a mutation, then refetch every cached entry it invalidates.
    pub async fn mutate(&self, endpoint: &str, args: Value) -> Result<Value> {
        let endpoint = self.endpoint(endpoint)?;
        let args = endpoint.normalize_args(args);
        let data = self.run(&endpoint, &args).await?;

        let tags = endpoint.invalidated_tags(&args);
        if !tags.is_empty() {
            let stale = self.inner.cache.entries_with_tags(&tags);
            debug!("{} invalidated {} cache entries", endpoint.name, stale.len());
            for entry in stale {
                match self.endpoint(&entry.key().endpoint) {
                    Ok(target) => self.start_fetch(target, entry),
                    Err(e) => warn!("Cannot refetch {}: {}", entry.key(), e),
                }
            }
        }

        Ok(data)
    }

    /// Fetch `endpoint(args)` once, bypassing the cache.
    pub async fn fetch(&self, endpoint: &str, args: &Value) -> Result<Value> {
        let endpoint = self.endpoint(endpoint)?;
        self.run(&endpoint, args).await
    }

    /// Refetch an existing entry without adding a subscriber.
    ///
    /// Returns `false` when no entry exists for `endpoint(args)`.
    pub fn force_refetch(&self, endpoint: &str, args: Value) -> bool {
        let args = match self.endpoint(endpoint) {
            Ok(resolved) => resolved.normalize_args(args),
            Err(_) => args,
        };
        let key = QueryKey::new(endpoint, &args);
        let Some(entry) = self.inner.cache.get(&key) else {
            debug!("No cache entry to refetch for {}", key);
            return false;
        };

        match self.endpoint(endpoint) {
            Ok(endpoint) => {
                self.start_fetch(endpoint, entry);
                true
            }
            Err(e) => {
                warn!("Cannot refetch {}: {}", key, e);
                false
            }
        }
    }

    /// Run a raw request through the transport adapter.
    pub async fn execute(&self, request: RequestDescriptor) -> QueryResult {
        self.inner.base_query.execute(request).await
    }

    /// Remove every cache entry (ending their subscriptions) and close the connection.
    pub async fn shutdown(&self) {
        self.inner.cache.clear();
        self.inner.registry.shutdown().await;
    }

    async fn run(&self, endpoint: &Endpoint, args: &Value) -> Result<Value> {
        let result = self.inner.base_query.execute(endpoint.request(args)).await;
        endpoint.apply_transform(result.into_data()?)
    }

    fn start_fetch(&self, endpoint: Arc<Endpoint>, entry: Arc<CacheEntry>) {
        let fetch_id = entry.begin_fetch();
        let api = self.clone();
        tokio::spawn(async move {
            let outcome = api.run(&endpoint, entry.args()).await;
            entry.complete_fetch(fetch_id, outcome);
        });
    }

    fn start_lifecycle(&self, endpoint: Arc<Endpoint>, entry: Arc<CacheEntry>) {
        let ctx = LifecycleContext {
            entry,
            source: Arc::new(self.inner.base_query.clone()),
            refetch: Arc::new(WeakApi(Arc::downgrade(&self.inner))),
        };
        tokio::spawn(async move {
            let key = ctx.entry.key().clone();
            let report = on_cache_entry_added_invalidate(ctx, &endpoint.invalidations).await;
            debug!(
                "Lifecycle of {} finished: {} subscribed, {} failed, {} released",
                key,
                report.subscribed,
                report.failed.len(),
                report.released
            );
        });
    }
}

/// Refetch dispatch that does not keep the api alive.
struct WeakApi(Weak<ApiInner>);

impl RefetchDispatch for WeakApi {
    fn force_refetch(&self, endpoint: &str, args: Value) {
        if let Some(inner) = self.0.upgrade() {
            ChiaApi { inner }.force_refetch(endpoint, args);
        }
    }
}

/// One subscriber of a cache entry. Releases its subscription on drop.
pub struct QuerySubscription {
    api: ChiaApi,
    entry: Arc<CacheEntry>,
    released: AtomicBool,
}

impl std::fmt::Debug for QuerySubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuerySubscription")
            .field("key", self.entry.key())
            .field("released", &self.released.load(Ordering::SeqCst))
            .finish()
    }
}

impl QuerySubscription {
    pub fn key(&self) -> &QueryKey {
        self.entry.key()
    }

    pub fn state(&self) -> QueryState {
        self.entry.snapshot()
    }

    pub fn data(&self) -> Option<Value> {
        self.entry.snapshot().data
    }

    pub fn error(&self) -> Option<Arc<ChiaError>> {
        self.entry.snapshot().error
    }

    /// Wait until no fetch is in flight and return the state.
    pub async fn settled(&self) -> QueryState {
        let mut changes = self.entry.watch();
        let settled = changes
            .wait_for(QueryState::is_settled)
            .await
            .map(|state| state.clone());
        settled.unwrap_or_else(|_| self.entry.snapshot())
    }

    pub fn watch(&self) -> watch::Receiver<QueryState> {
        self.entry.watch()
    }

    /// Refetch this entry in the background.
    pub fn refetch(&self) {
        self.api
            .force_refetch(&self.entry.key().endpoint, self.entry.args().clone());
    }

    pub fn release(&self) {
        if !self.released.swap(true, Ordering::SeqCst) {
            self.api.inner.cache.release(self.entry.key());
        }
    }
}

impl Drop for QuerySubscription {
    fn drop(&mut self) {
        self.release();
    }
}
