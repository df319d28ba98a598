//! Fetch interception: same-origin cache-first with network and shell
//! fallback.

use std::sync::Arc;

use http::Method;
use tokio::sync::RwLock;
use tracing::{debug, trace, warn};
use url::Url;

use crate::cache::CacheStorage;
use crate::clients::ClientId;
use crate::{EventExtension, NetworkBackend, Request, Response, ResponseType, SwError};

// ==================== Fetch Event ====================

/// A fetch event delivered by the browser.
#[derive(Debug, Clone)]
pub struct FetchEvent {
    /// The intercepted request.
    pub request: Request,

    /// The client the request originated from, if any.
    pub client_id: Option<ClientId>,

    /// Whether this is a navigation request.
    pub is_navigation: bool,
}

impl FetchEvent {
    pub fn new(request: Request) -> Self {
        Self {
            request,
            client_id: None,
            is_navigation: false,
        }
    }

    pub fn navigation(request: Request) -> Self {
        Self {
            is_navigation: true,
            ..Self::new(request)
        }
    }
}

/// The interceptor's decision for a fetch event.
#[derive(Debug, Clone)]
pub enum FetchOutcome {
    /// Cross-origin request; the browser handles it natively.
    PassThrough,
    /// Respond with this response (cache hit, network, or shell fallback).
    Respond(Response),
}

// ==================== Fetch Interceptor ====================

/// Decides, per request, between the cache store and the network.
///
/// Policy: cross-origin passes through untouched; same-origin is answered
/// cache-first from the current namespace; misses go to the network and a
/// qualifying response (GET, 200, basic) is written back asynchronously; a
/// failed network fetch degrades to the cached shell entry point.
pub struct FetchInterceptor {
    origin: Url,
    cache_name: String,
    offline_fallback: String,
    storage: Arc<RwLock<CacheStorage>>,
    network: Arc<dyn NetworkBackend>,
}

impl FetchInterceptor {
    pub fn new(
        origin: Url,
        cache_name: impl Into<String>,
        offline_fallback: impl Into<String>,
        storage: Arc<RwLock<CacheStorage>>,
        network: Arc<dyn NetworkBackend>,
    ) -> Self {
        Self {
            origin,
            cache_name: cache_name.into(),
            offline_fallback: offline_fallback.into(),
            storage,
            network,
        }
    }

    /// Handle a fetch event.
    ///
    /// The cache write for a qualifying network response is registered on
    /// `ext` rather than awaited, so delivering the response never waits on
    /// cache I/O; the dispatcher settles the extension at the event boundary.
    pub async fn handle_fetch(
        &self,
        event: &FetchEvent,
        ext: &mut EventExtension,
    ) -> Result<FetchOutcome, SwError> {
        let request = &event.request;

        if !request.is_same_origin(&self.origin) {
            trace!(url = %request.url, "cross-origin request passed through");
            return Ok(FetchOutcome::PassThrough);
        }

        if let Some(cached) = self.match_cached(request).await {
            trace!(url = %request.url, "served from cache");
            return Ok(FetchOutcome::Respond(cached));
        }

        // The original request body is single-use; the network gets a clone.
        let fetch_request = request.clone();
        match self.network.fetch(&fetch_request) {
            Ok(response) => {
                if request.method == Method::GET && is_cacheable(&response) {
                    self.spawn_cache_write(request, response.clone(), ext);
                }
                Ok(FetchOutcome::Respond(response))
            }
            Err(err) => {
                warn!(url = %request.url, navigation = event.is_navigation, %err,
                    "network fetch failed, trying shell fallback");
                match self.match_shell_fallback().await {
                    Some(shell) => Ok(FetchOutcome::Respond(shell)),
                    None => Err(err),
                }
            }
        }
    }

    /// Look the request up in the current namespace only.
    async fn match_cached(&self, request: &Request) -> Option<Response> {
        let storage = self.storage.read().await;
        storage
            .get(&self.cache_name)
            .and_then(|cache| cache.match_request(request))
            .cloned()
    }

    async fn match_shell_fallback(&self) -> Option<Response> {
        let url = self.origin.join(&self.offline_fallback).ok()?;
        self.match_cached(&Request::get(url)).await
    }

    /// Register the fire-and-forget cache write on the event extension.
    fn spawn_cache_write(&self, request: &Request, response: Response, ext: &mut EventExtension) {
        let storage = Arc::clone(&self.storage);
        let cache_name = self.cache_name.clone();
        let request = request.clone();
        ext.wait_until(tokio::spawn(async move {
            let mut storage = storage.write().await;
            storage.open(&cache_name).put(&request, response);
            debug!(cache = %cache_name, identity = %request.identity(), "cached network response");
        }));
    }
}

/// A response qualifies for caching when it is a same-origin 200.
fn is_cacheable(response: &Response) -> bool {
    response.status == http::StatusCode::OK && response.response_type == ResponseType::Basic
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use hashbrown::HashMap;
    use http::StatusCode;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StaticNetwork {
        routes: HashMap<String, Response>,
        calls: AtomicUsize,
    }

    impl StaticNetwork {
        fn new() -> Self {
            Self {
                routes: HashMap::new(),
                calls: AtomicUsize::new(0),
            }
        }

        fn route(mut self, url: &str, response: Response) -> Self {
            self.routes.insert(url.to_string(), response);
            self
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl NetworkBackend for StaticNetwork {
        fn fetch(&self, request: &Request) -> Result<Response, SwError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.routes
                .get(request.url.as_str())
                .cloned()
                .ok_or_else(|| SwError::NetworkError(format!("offline: {}", request.url)))
        }
    }

    fn origin() -> Url {
        Url::parse("https://booking.example/").unwrap()
    }

    fn interceptor(
        network: Arc<StaticNetwork>,
        storage: Arc<RwLock<CacheStorage>>,
    ) -> FetchInterceptor {
        FetchInterceptor::new(origin(), "bookwave-v1", "/index.html", storage, network)
    }

    fn get_event(path: &str) -> FetchEvent {
        FetchEvent::new(Request::get(origin().join(path).unwrap()))
    }

    #[tokio::test]
    async fn test_cache_hit_skips_network() {
        let storage = Arc::new(RwLock::new(CacheStorage::new()));
        let request = Request::get(origin().join("/app.js").unwrap());
        storage
            .write()
            .await
            .open("bookwave-v1")
            .put(&request, Response::ok(Bytes::from_static(b"cached")));

        let network = Arc::new(StaticNetwork::new());
        let interceptor = interceptor(Arc::clone(&network), storage);

        let mut ext = EventExtension::new();
        let outcome = interceptor
            .handle_fetch(&get_event("/app.js"), &mut ext)
            .await
            .unwrap();

        match outcome {
            FetchOutcome::Respond(response) => assert_eq!(response.body, "cached"),
            other => panic!("expected cached response, got {other:?}"),
        }
        assert_eq!(network.call_count(), 0);
        assert_eq!(ext.pending(), 0);
    }

    #[tokio::test]
    async fn test_miss_fetches_and_caches_get_200_basic() {
        let storage = Arc::new(RwLock::new(CacheStorage::new()));
        let network = Arc::new(
            StaticNetwork::new().route(
                "https://booking.example/app.js",
                Response::ok(Bytes::from_static(b"fresh")),
            ),
        );
        let interceptor = interceptor(network, Arc::clone(&storage));

        let mut ext = EventExtension::new();
        let outcome = interceptor
            .handle_fetch(&get_event("/app.js"), &mut ext)
            .await
            .unwrap();

        match outcome {
            FetchOutcome::Respond(response) => assert_eq!(response.body, "fresh"),
            other => panic!("expected network response, got {other:?}"),
        }

        // Exactly one write, settled at the event boundary.
        assert_eq!(ext.pending(), 1);
        ext.settle().await;

        let storage = storage.read().await;
        let cached = storage
            .get("bookwave-v1")
            .unwrap()
            .match_request(&Request::get(origin().join("/app.js").unwrap()))
            .expect("response should be cached after settle");
        assert_eq!(cached.body, "fresh");
    }

    #[tokio::test]
    async fn test_non_200_response_returned_uncached() {
        let storage = Arc::new(RwLock::new(CacheStorage::new()));
        let network = Arc::new(StaticNetwork::new().route(
            "https://booking.example/missing",
            Response::with_status(StatusCode::NOT_FOUND, Bytes::from_static(b"nope")),
        ));
        let interceptor = interceptor(network, Arc::clone(&storage));

        let mut ext = EventExtension::new();
        let outcome = interceptor
            .handle_fetch(&get_event("/missing"), &mut ext)
            .await
            .unwrap();

        match outcome {
            FetchOutcome::Respond(response) => assert_eq!(response.status, StatusCode::NOT_FOUND),
            other => panic!("expected pass-along response, got {other:?}"),
        }
        assert_eq!(ext.pending(), 0);
        assert!(storage.read().await.get("bookwave-v1").is_none());
    }

    #[tokio::test]
    async fn test_opaque_response_not_cached() {
        let storage = Arc::new(RwLock::new(CacheStorage::new()));
        let network = Arc::new(
            StaticNetwork::new().route("https://booking.example/widget", Response::opaque()),
        );
        let interceptor = interceptor(network, Arc::clone(&storage));

        let mut ext = EventExtension::new();
        interceptor
            .handle_fetch(&get_event("/widget"), &mut ext)
            .await
            .unwrap();
        assert_eq!(ext.pending(), 0);
    }

    #[tokio::test]
    async fn test_post_response_not_cached() {
        let storage = Arc::new(RwLock::new(CacheStorage::new()));
        let network = Arc::new(StaticNetwork::new().route(
            "https://booking.example/api/book",
            Response::ok(Bytes::from_static(b"{\"id\":42}")),
        ));
        let interceptor = interceptor(network, Arc::clone(&storage));

        let mut request = Request::get(origin().join("/api/book").unwrap());
        request.method = Method::POST;
        request.body = Some(Bytes::from_static(b"{\"slot\":7}"));

        let mut ext = EventExtension::new();
        let outcome = interceptor
            .handle_fetch(&FetchEvent::new(request), &mut ext)
            .await
            .unwrap();

        assert!(matches!(outcome, FetchOutcome::Respond(_)));
        assert_eq!(ext.pending(), 0);
    }

    #[tokio::test]
    async fn test_cross_origin_passes_through_untouched() {
        let storage = Arc::new(RwLock::new(CacheStorage::new()));
        let network = Arc::new(StaticNetwork::new());
        let interceptor = interceptor(Arc::clone(&network), Arc::clone(&storage));

        let event = FetchEvent::new(Request::get(
            Url::parse("https://cdn.example/analytics.js").unwrap(),
        ));
        let mut ext = EventExtension::new();
        let outcome = interceptor.handle_fetch(&event, &mut ext).await.unwrap();

        assert!(matches!(outcome, FetchOutcome::PassThrough));
        assert_eq!(network.call_count(), 0);
        assert_eq!(ext.pending(), 0);
        assert!(storage.read().await.names().is_empty());
    }

    #[tokio::test]
    async fn test_offline_navigation_falls_back_to_shell() {
        let storage = Arc::new(RwLock::new(CacheStorage::new()));
        let shell_request = Request::get(origin().join("/index.html").unwrap());
        storage
            .write()
            .await
            .open("bookwave-v1")
            .put(&shell_request, Response::ok(Bytes::from_static(b"<html>shell</html>")));

        // Network is fully offline.
        let network = Arc::new(StaticNetwork::new());
        let interceptor = interceptor(network, storage);

        let event = FetchEvent::navigation(Request::get(origin().join("/dashboard").unwrap()));
        let mut ext = EventExtension::new();
        let outcome = interceptor.handle_fetch(&event, &mut ext).await.unwrap();

        match outcome {
            FetchOutcome::Respond(response) => {
                assert_eq!(response.body, Bytes::from_static(b"<html>shell</html>"))
            }
            other => panic!("expected shell fallback, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_offline_without_shell_propagates_error() {
        let storage = Arc::new(RwLock::new(CacheStorage::new()));
        let network = Arc::new(StaticNetwork::new());
        let interceptor = interceptor(network, storage);

        let mut ext = EventExtension::new();
        let result = interceptor
            .handle_fetch(&get_event("/dashboard"), &mut ext)
            .await;
        assert!(matches!(result, Err(SwError::NetworkError(_))));
    }
}
