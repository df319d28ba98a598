//! # BookWave Worker
//!
//! The background-worker container for the BookWave booking application:
//! owns the shell cache, the fetch interceptor, the notification pipeline,
//! and the window clients, and routes every browser-delivered event through
//! one auditable dispatch table.
//!
//! ## Features
//!
//! - **Lifecycle**: install → activate state machine with skip-waiting
//! - **Dispatch table**: the full set of handled event kinds is a constant,
//!   constructed once at startup
//! - **Event settlement**: asynchronous sub-work (cache writes, click
//!   routing) is registered on the event's extension and joined before
//!   dispatch returns
//! - **Top-level error capture**: a failing handler is logged at the
//!   dispatch boundary; the worker keeps serving subsequent events
//!
//! ## Architecture
//!
//! ```text
//! browser events                BackgroundWorker
//!   install ───────────────→ ShellCacheManager::handle_install
//!   activate ──────────────→ ShellCacheManager::handle_activate + claim
//!   fetch ─────────────────→ FetchInterceptor::handle_fetch
//!   message ───────────────→ skip-waiting / exit broadcast / provider config
//!   push delivery ─────────→ ProviderBootstrap gate → NotificationRenderer
//!   notificationclick ─────→ ClickRouter (extension-tracked)
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};
use url::Url;

use bookwave_common::{BookwaveError, Result};
use bookwave_push::{
    ClickRouter, NotificationClick, NotificationPayload, NotificationRenderer,
    NotificationSurface, ProviderBootstrap, ProviderState,
};
use bookwave_sw::cache::{CacheStorage, ShellCacheManager};
use bookwave_sw::clients::Clients;
use bookwave_sw::fetch::{FetchEvent, FetchInterceptor, FetchOutcome};
use bookwave_sw::messages::{ClientMessage, WorkerMessage};
use bookwave_sw::{EventExtension, NetworkBackend};

pub mod config;

pub use config::WorkerConfig;

// ==================== Worker State ====================

/// Lifecycle state of the worker instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WorkerState {
    /// Initial state, script loaded.
    #[default]
    Parsed,
    /// Install event in progress.
    Installing,
    /// Installed; eligible for activation.
    Installed,
    /// Activate event in progress.
    Activating,
    /// Active and controlling clients.
    Activated,
    /// Replaced by a newer worker.
    Redundant,
}

// ==================== Events ====================

/// The kinds of browser events this worker handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Install,
    Activate,
    Fetch,
    Message,
    Push,
    NotificationClick,
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            EventKind::Install => "install",
            EventKind::Activate => "activate",
            EventKind::Fetch => "fetch",
            EventKind::Message => "message",
            EventKind::Push => "push",
            EventKind::NotificationClick => "notificationclick",
        };
        write!(f, "{name}")
    }
}

/// Every event kind the worker registers a handler for.
pub const REGISTERED_EVENTS: [EventKind; 6] = [
    EventKind::Install,
    EventKind::Activate,
    EventKind::Fetch,
    EventKind::Message,
    EventKind::Push,
    EventKind::NotificationClick,
];

/// A browser-delivered event.
#[derive(Debug)]
pub enum WorkerEvent {
    Install,
    Activate,
    Fetch(FetchEvent),
    Message(ClientMessage),
    Push(NotificationPayload),
    NotificationClick(NotificationClick),
}

impl WorkerEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            WorkerEvent::Install => EventKind::Install,
            WorkerEvent::Activate => EventKind::Activate,
            WorkerEvent::Fetch(_) => EventKind::Fetch,
            WorkerEvent::Message(_) => EventKind::Message,
            WorkerEvent::Push(_) => EventKind::Push,
            WorkerEvent::NotificationClick(_) => EventKind::NotificationClick,
        }
    }
}

/// What a dispatched event produced.
#[derive(Debug)]
pub enum DispatchOutcome {
    Completed,
    /// The interceptor's decision, handed back to the embedder.
    Fetch(FetchOutcome),
}

// ==================== Background Worker ====================

/// The worker container.
pub struct BackgroundWorker {
    config: WorkerConfig,
    state: RwLock<WorkerState>,
    skip_waiting: AtomicBool,
    storage: Arc<RwLock<CacheStorage>>,
    clients: Arc<RwLock<Clients>>,
    shell_cache: ShellCacheManager,
    interceptor: FetchInterceptor,
    renderer: NotificationRenderer,
    router: Arc<ClickRouter>,
    bootstrap: RwLock<ProviderBootstrap>,
    events: [EventKind; 6],
}

impl BackgroundWorker {
    /// Build a worker from its config and platform collaborators.
    pub fn new(
        config: WorkerConfig,
        network: Arc<dyn NetworkBackend>,
        surface: Arc<dyn NotificationSurface>,
    ) -> Result<Self> {
        let origin = Url::parse(&config.origin)
            .map_err(|e| BookwaveError::config(format!("origin {}: {e}", config.origin)))?;

        let storage = Arc::new(RwLock::new(CacheStorage::new()));
        let clients = Arc::new(RwLock::new(Clients::new()));

        let shell_cache = ShellCacheManager::new(
            &config.cache_prefix,
            &config.cache_version,
            config.shell_manifest.clone(),
            origin.clone(),
            Arc::clone(&storage),
            Arc::clone(&network),
        );
        let interceptor = FetchInterceptor::new(
            origin.clone(),
            config.cache_name(),
            &config.offline_fallback,
            Arc::clone(&storage),
            network,
        );
        let renderer = NotificationRenderer::new(config.notification.clone(), Arc::clone(&surface));
        let router = Arc::new(ClickRouter::new(origin, Arc::clone(&clients), surface));
        let bootstrap = RwLock::new(ProviderBootstrap::new(config.provider_fallback.clone()));

        Ok(Self {
            config,
            state: RwLock::new(WorkerState::Parsed),
            skip_waiting: AtomicBool::new(false),
            storage,
            clients,
            shell_cache,
            interceptor,
            renderer,
            router,
            bootstrap,
            events: REGISTERED_EVENTS,
        })
    }

    /// The event kinds this worker handles.
    pub fn registered_events(&self) -> &[EventKind] {
        &self.events
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub async fn state(&self) -> WorkerState {
        *self.state.read().await
    }

    /// Whether a skip-waiting request (or a successful install) has made the
    /// worker eligible for immediate activation.
    pub fn skip_waiting_requested(&self) -> bool {
        self.skip_waiting.load(Ordering::SeqCst)
    }

    pub async fn provider_state(&self) -> ProviderState {
        self.bootstrap.read().await.state()
    }

    /// The window-client registry, for the embedder to register windows on.
    pub fn clients(&self) -> Arc<RwLock<Clients>> {
        Arc::clone(&self.clients)
    }

    /// The cache store shared with the embedder.
    pub fn storage(&self) -> Arc<RwLock<CacheStorage>> {
        Arc::clone(&self.storage)
    }

    /// Dispatch one browser event.
    ///
    /// Every handler error is captured and logged here; asynchronous
    /// sub-work registered on the event's extension is settled before this
    /// returns, so the platform may suspend the worker afterwards.
    pub async fn dispatch(&self, event: WorkerEvent) -> Result<DispatchOutcome> {
        let kind = event.kind();
        debug!(event = %kind, "dispatching");

        let mut ext = EventExtension::new();
        let result = self.handle(event, &mut ext).await;
        ext.settle().await;

        if let Err(ref err) = result {
            error!(event = %kind, category = err.category(), %err, "worker event failed");
        }
        result
    }

    async fn handle(
        &self,
        event: WorkerEvent,
        ext: &mut EventExtension,
    ) -> Result<DispatchOutcome> {
        match event {
            WorkerEvent::Install => {
                self.set_state(WorkerState::Installing).await;
                let warmed = self.shell_cache.handle_install().await;
                // A failed warm-up leaves the worker installed; the
                // interceptor fills the gaps lazily on later fetches.
                self.set_state(WorkerState::Installed).await;
                match warmed {
                    Ok(()) => {
                        self.skip_waiting.store(true, Ordering::SeqCst);
                        Ok(DispatchOutcome::Completed)
                    }
                    Err(err) => Err(err.into()),
                }
            }

            WorkerEvent::Activate => {
                self.set_state(WorkerState::Activating).await;
                let deleted = self.shell_cache.handle_activate().await?;
                let claimed = self.clients.write().await.claim();
                self.set_state(WorkerState::Activated).await;
                info!(stale = deleted.len(), claimed, "worker activated");
                Ok(DispatchOutcome::Completed)
            }

            WorkerEvent::Fetch(fetch) => {
                let outcome = self.interceptor.handle_fetch(&fetch, ext).await?;
                Ok(DispatchOutcome::Fetch(outcome))
            }

            WorkerEvent::Message(message) => {
                self.handle_message(message).await;
                Ok(DispatchOutcome::Completed)
            }

            WorkerEvent::Push(payload) => {
                if !self.bootstrap.read().await.is_ready() {
                    warn!("push delivered before provider ready, dropping");
                    return Ok(DispatchOutcome::Completed);
                }
                self.renderer.handle_push(&payload);
                Ok(DispatchOutcome::Completed)
            }

            WorkerEvent::NotificationClick(click) => {
                // The routing promise keeps the event open until it lands.
                let router = Arc::clone(&self.router);
                ext.wait_until(tokio::spawn(async move {
                    match router.route(click).await {
                        Ok(outcome) => debug!(?outcome, "notification click routed"),
                        Err(err) => error!(%err, "notification click routing failed"),
                    }
                }));
                Ok(DispatchOutcome::Completed)
            }
        }
    }

    async fn handle_message(&self, message: ClientMessage) {
        match message {
            ClientMessage::SkipWaiting => {
                self.skip_waiting.store(true, Ordering::SeqCst);
                info!("skip-waiting requested by a window");
            }
            ClientMessage::ExitApp => {
                let delivered = self.clients.read().await.broadcast(WorkerMessage::AppExit);
                info!(windows = delivered, "application exit broadcast");
            }
            ClientMessage::FirebaseConfig { config } => {
                let state = self.bootstrap.write().await.configure(config);
                debug!(?state, "provider bootstrap updated");
            }
        }
    }

    async fn set_state(&self, next: WorkerState) {
        let mut state = self.state.write().await;
        debug!(from = ?*state, to = ?next, "worker state change");
        *state = next;
    }
}
