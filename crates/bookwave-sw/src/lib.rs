//! # BookWave Service Worker Core
//!
//! Offline shell caching and fetch interception for the BookWave booking
//! application's background worker.
//!
//! ## Features
//!
//! - **Versioned shell cache**: one `<prefix>-<version>` namespace is current;
//!   activation deletes every stale namespace with the application prefix
//! - **Install-time warm-up**: the shell manifest is fetched with cache-bypass
//!   semantics and stored all-or-nothing
//! - **Fetch interception**: same-origin cache-first with network fallback and
//!   an offline shell fallback
//! - **Clients API**: window-client registry, focus, message posting
//! - **Control protocol**: `SKIP_WAITING` / `EXIT_APP` style messages
//!
//! ## Architecture
//!
//! ```text
//! BackgroundWorker (bookwave-worker)
//!     │
//!     ├── ShellCacheManager ──── install / activate ──→ CacheStorage
//!     │                                                     │
//!     ├── FetchInterceptor ──── cache-first lookup ────────┘
//!     │          └── NetworkBackend (collaborator)
//!     │
//!     └── Clients
//!             └── Client ── post_message ──→ application window
//! ```

use bookwave_common::BookwaveError;
use bytes::Bytes;
use hashbrown::HashMap;
use http::{Method, StatusCode};
use thiserror::Error;
use tracing::error;
use url::Url;

pub mod cache;
pub mod clients;
pub mod fetch;
pub mod messages;

pub use cache::{Cache, CacheStorage, ShellCacheManager};
pub use clients::{Client, ClientId, ClientMatchOptions, ClientType, Clients, VisibilityState};
pub use fetch::{FetchEvent, FetchInterceptor, FetchOutcome};
pub use messages::{ClientMessage, WorkerMessage};

// ==================== Errors ====================

/// Errors that can occur in worker-core operations.
#[derive(Error, Debug, Clone)]
pub enum SwError {
    #[error("Cache error: {0}")]
    CacheError(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Security error: {0}")]
    SecurityError(String),

    #[error("State error: {0}")]
    StateError(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl From<SwError> for BookwaveError {
    fn from(err: SwError) -> Self {
        match err {
            SwError::CacheError(msg) => BookwaveError::cache(msg),
            SwError::NetworkError(msg) => BookwaveError::network(msg),
            SwError::SecurityError(msg) | SwError::StateError(msg) => {
                BookwaveError::InvalidArgument(msg)
            }
            SwError::InvalidUrl(msg) => BookwaveError::config(msg),
            SwError::NotFound(msg) => BookwaveError::NotFound(msg),
        }
    }
}

// ==================== Requests ====================

/// Cache interaction mode for an outgoing request.
///
/// `Reload` forces revalidation against the network, ignoring any HTTP
/// cache — the mode used for install-time shell warming.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheMode {
    #[default]
    Default,
    Reload,
}

/// An intercepted (or outgoing) HTTP request.
///
/// The body stream of a real request is single-use; callers hand the network
/// backend a clone and keep the original for identity bookkeeping.
#[derive(Debug, Clone)]
pub struct Request {
    pub url: Url,
    pub method: Method,
    pub headers: HashMap<String, String>,
    pub body: Option<Bytes>,
    pub cache_mode: CacheMode,
}

impl Request {
    /// Create a GET request.
    pub fn get(url: Url) -> Self {
        Self {
            url,
            method: Method::GET,
            headers: HashMap::new(),
            body: None,
            cache_mode: CacheMode::Default,
        }
    }

    /// Create a GET request that bypasses any HTTP cache.
    pub fn reload(url: Url) -> Self {
        Self {
            cache_mode: CacheMode::Reload,
            ..Self::get(url)
        }
    }

    /// The request identity used as the cache key: method + full URL.
    pub fn identity(&self) -> String {
        format!("{} {}", self.method, self.url)
    }

    /// Whether this request shares the worker's origin.
    pub fn is_same_origin(&self, origin: &Url) -> bool {
        self.url.origin() == origin.origin()
    }
}

// ==================== Responses ====================

/// Response type as visible to the intercepting worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseType {
    /// Same-origin response with a readable body.
    Basic,
    /// Cross-origin response obtained via CORS.
    Cors,
    /// Cross-origin response with an unreadable body.
    Opaque,
}

/// A response snapshot.
///
/// Bodies are `Bytes`, so cloning a response for a cache write never copies
/// the payload.
#[derive(Debug, Clone)]
pub struct Response {
    pub status: StatusCode,
    pub headers: HashMap<String, String>,
    pub body: Bytes,
    pub response_type: ResponseType,
}

impl Response {
    /// Create a 200 same-origin response.
    pub fn ok(body: impl Into<Bytes>) -> Self {
        Self {
            status: StatusCode::OK,
            headers: HashMap::new(),
            body: body.into(),
            response_type: ResponseType::Basic,
        }
    }

    /// Create a response with an explicit status.
    pub fn with_status(status: StatusCode, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            ..Self::ok(body)
        }
    }

    /// Create an opaque cross-origin response.
    pub fn opaque() -> Self {
        Self {
            status: StatusCode::OK,
            headers: HashMap::new(),
            body: Bytes::new(),
            response_type: ResponseType::Opaque,
        }
    }
}

// ==================== Network Seam ====================

/// Network collaborator the interceptor and cache manager fetch through.
pub trait NetworkBackend: Send + Sync {
    /// Perform a network fetch for the given request.
    fn fetch(&self, request: &Request) -> Result<Response, SwError>;
}

// ==================== Event Extension ====================

/// Tracks asynchronous sub-work registered by an event handler.
///
/// The worker is only allowed to consider an event settled once every task
/// registered here has completed; `settle` is awaited at the dispatch
/// boundary rather than detaching the tasks.
#[derive(Debug, Default)]
pub struct EventExtension {
    tasks: Vec<tokio::task::JoinHandle<()>>,
}

impl EventExtension {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a task that must complete before the event is settled.
    pub fn wait_until(&mut self, task: tokio::task::JoinHandle<()>) {
        self.tasks.push(task);
    }

    /// Number of still-registered tasks.
    pub fn pending(&self) -> usize {
        self.tasks.len()
    }

    /// Await every registered task.
    pub async fn settle(self) {
        for task in self.tasks {
            if let Err(err) = task.await {
                error!("event extension task failed: {err}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_identity() {
        let url = Url::parse("https://booking.example/index.html?tab=1").unwrap();
        let request = Request::get(url);
        assert_eq!(
            request.identity(),
            "GET https://booking.example/index.html?tab=1"
        );
    }

    #[test]
    fn test_request_reload_mode() {
        let url = Url::parse("https://booking.example/logo.png").unwrap();
        let request = Request::reload(url);
        assert_eq!(request.cache_mode, CacheMode::Reload);
        assert_eq!(request.method, Method::GET);
    }

    #[test]
    fn test_same_origin_check() {
        let origin = Url::parse("https://booking.example/").unwrap();
        let same = Request::get(Url::parse("https://booking.example/api/slots").unwrap());
        let other = Request::get(Url::parse("https://cdn.example/lib.js").unwrap());
        assert!(same.is_same_origin(&origin));
        assert!(!other.is_same_origin(&origin));
    }

    #[test]
    fn test_response_clone_shares_body() {
        let response = Response::ok(Bytes::from_static(b"<html></html>"));
        let clone = response.clone();
        assert_eq!(response.body, clone.body);
        assert_eq!(clone.response_type, ResponseType::Basic);
    }

    #[tokio::test]
    async fn test_event_extension_settles_tasks() {
        let mut ext = EventExtension::new();
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        ext.wait_until(tokio::spawn(async move {
            let _ = tx.send(42u32);
        }));
        assert_eq!(ext.pending(), 1);
        ext.settle().await;
        assert_eq!(rx.recv().await, Some(42));
    }
}
