//! # BookWave Push
//!
//! Push-notification rendering and click routing for the BookWave booking
//! application's background worker.
//!
//! ## Features
//!
//! - **Payload model**: every field of a delivered push payload is optional
//! - **Rendering**: payload → display-ready notification with booking defaults
//! - **Provider bootstrap**: explicit {uninitialized, initializing, ready,
//!   failed} state; the rest of the worker sees only `is_ready()`
//! - **Click routing**: focus an open window, post it a routing message, or
//!   open a new window at the notification's target URL
//!
//! ## Architecture
//!
//! ```text
//! push delivery (external provider)
//!     │
//!     └── NotificationPayload ──→ NotificationRenderer ──→ NotificationSurface
//!                                                              │ user click
//!                                                              ▼
//!                                      ClickRouter ◄── NotificationClick
//!                                          │
//!                                          ├── focus + post_message ──→ Clients
//!                                          └── open_window ───────────→ Clients
//! ```

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};
use url::Url;

use bookwave_common::BookwaveError;
use bookwave_sw::clients::{ClientId, ClientMatchOptions, Clients};
use bookwave_sw::messages::WorkerMessage;

// ==================== Errors ====================

/// Errors that can occur in notification handling.
#[derive(Error, Debug, Clone)]
pub enum PushError {
    #[error("Display failed: {0}")]
    DisplayFailed(String),

    #[error("Invalid provider config: {0}")]
    InvalidConfig(String),

    #[error("Routing failed: {0}")]
    RoutingFailed(String),
}

impl From<PushError> for BookwaveError {
    fn from(err: PushError) -> Self {
        match err {
            PushError::DisplayFailed(msg) => BookwaveError::notification(msg),
            PushError::InvalidConfig(msg) => BookwaveError::config(msg),
            PushError::RoutingFailed(msg) => BookwaveError::routing(msg),
        }
    }
}

// ==================== Payload ====================

/// The notification block of a push payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PayloadNotification {
    pub title: Option<String>,
    pub body: Option<String>,
    pub icon: Option<String>,
    pub image: Option<String>,
}

/// A push payload as handed over by the external provider.
///
/// Every field is optional; malformed or partial payloads render with
/// defaults instead of faulting.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NotificationPayload {
    pub notification: Option<PayloadNotification>,
    pub data: Option<JsonValue>,
}

// ==================== Rendered Notification ====================

/// A user action attached to a displayed notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationAction {
    pub action: String,
    pub title: String,
    pub icon: Option<String>,
}

/// The display-ready form of a push payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderedNotification {
    pub title: String,
    pub body: String,
    pub icon: String,
    pub badge: String,
    pub image: Option<String>,
    /// Dedup tag; a later notification with the same tag replaces this one.
    pub tag: String,
    /// The notification stays visible until the user acts on it.
    pub require_interaction: bool,
    pub vibrate: Vec<u32>,
    pub actions: Vec<NotificationAction>,
    /// Carries the payload's `data` verbatim, plus resolved `url` and
    /// `clickAction`. This is exactly what the click router receives later.
    pub data: JsonValue,
}

/// Defaults applied when a payload omits a field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationDefaults {
    pub title: String,
    pub icon: String,
    pub tag: String,
    pub url: String,
    pub click_action: String,
}

impl Default for NotificationDefaults {
    fn default() -> Self {
        Self {
            title: "New Notification".to_string(),
            icon: "/logo.png".to_string(),
            tag: "booking-notification".to_string(),
            url: "/".to_string(),
            click_action: "navigate".to_string(),
        }
    }
}

// ==================== Notification Surface ====================

/// Platform notification surface the renderer displays through.
pub trait NotificationSurface: Send + Sync {
    /// Display a notification.
    fn show(&self, notification: &RenderedNotification) -> Result<(), PushError>;

    /// Close the notification with the given tag.
    fn close(&self, tag: &str);
}

// ==================== Renderer ====================

/// Renders push payloads and requests their display.
pub struct NotificationRenderer {
    defaults: NotificationDefaults,
    surface: Arc<dyn NotificationSurface>,
}

impl NotificationRenderer {
    pub fn new(defaults: NotificationDefaults, surface: Arc<dyn NotificationSurface>) -> Self {
        Self { defaults, surface }
    }

    /// Produce the display-ready notification for a payload.
    pub fn render(&self, payload: &NotificationPayload) -> RenderedNotification {
        let notification = payload.notification.clone().unwrap_or_default();

        // Non-object `data` is treated as absent rather than faulting.
        let mut data = match payload.data.clone() {
            Some(JsonValue::Object(map)) => map,
            _ => serde_json::Map::new(),
        };
        if !data.contains_key("clickAction") {
            data.insert(
                "clickAction".to_string(),
                JsonValue::String(self.defaults.click_action.clone()),
            );
        }
        if !data.contains_key("url") {
            data.insert(
                "url".to_string(),
                JsonValue::String(self.defaults.url.clone()),
            );
        }

        let tag = data
            .get("tag")
            .and_then(JsonValue::as_str)
            .unwrap_or(&self.defaults.tag)
            .to_string();

        RenderedNotification {
            title: notification
                .title
                .unwrap_or_else(|| self.defaults.title.clone()),
            body: notification.body.unwrap_or_default(),
            icon: notification
                .icon
                .unwrap_or_else(|| self.defaults.icon.clone()),
            badge: self.defaults.icon.clone(),
            image: notification.image,
            tag,
            require_interaction: true,
            vibrate: vec![200, 100, 200],
            actions: vec![
                NotificationAction {
                    action: "view".to_string(),
                    title: "View Details".to_string(),
                    icon: Some(self.defaults.icon.clone()),
                },
                NotificationAction {
                    action: "dismiss".to_string(),
                    title: "Dismiss".to_string(),
                    icon: None,
                },
            ],
            data: JsonValue::Object(data),
        }
    }

    /// Render and display a delivered payload.
    ///
    /// A failing display call is logged and dropped; a missed notification is
    /// not recoverable and must not poison later deliveries.
    pub fn handle_push(&self, payload: &NotificationPayload) {
        let rendered = self.render(payload);
        debug!(title = %rendered.title, tag = %rendered.tag, "displaying notification");
        if let Err(err) = self.surface.show(&rendered) {
            error!(%err, tag = %rendered.tag, "notification display failed");
        }
    }
}

// ==================== Provider Bootstrap ====================

/// Initialization state of the external push provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProviderState {
    #[default]
    Uninitialized,
    Initializing,
    Ready,
    Failed,
}

/// Owns the provider initialization state.
///
/// The rest of the worker consults only `is_ready()`; nothing else reads or
/// writes the state.
#[derive(Debug, Default)]
pub struct ProviderBootstrap {
    state: ProviderState,
    fallback_config: Option<JsonValue>,
}

impl ProviderBootstrap {
    /// Create a bootstrap with an optional compiled-in fallback config.
    pub fn new(fallback_config: Option<JsonValue>) -> Self {
        Self {
            state: ProviderState::Uninitialized,
            fallback_config,
        }
    }

    /// Apply a configuration received from an application window.
    ///
    /// A config without an API key falls back to the compiled-in one; if
    /// neither carries a key the bootstrap fails. Re-configuration after
    /// `Ready` is a no-op.
    pub fn configure(&mut self, config: JsonValue) -> ProviderState {
        if self.state == ProviderState::Ready {
            info!("push provider already initialized");
            return self.state;
        }
        self.state = ProviderState::Initializing;

        let chosen = if has_api_key(&config) {
            Some(config)
        } else {
            warn!("provider config carries no API key, falling back to defaults");
            self.fallback_config.clone().filter(has_api_key)
        };

        self.state = match chosen {
            Some(_) => {
                info!("push provider initialized");
                ProviderState::Ready
            }
            None => {
                error!("no usable push provider config");
                ProviderState::Failed
            }
        };
        self.state
    }

    /// Whether notification rendering may be attempted.
    pub fn is_ready(&self) -> bool {
        self.state == ProviderState::Ready
    }

    pub fn state(&self) -> ProviderState {
        self.state
    }
}

fn has_api_key(config: &JsonValue) -> bool {
    config
        .get("apiKey")
        .and_then(JsonValue::as_str)
        .map_or(false, |key| !key.is_empty())
}

// ==================== Click Routing ====================

/// Which notification action the user invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickAction {
    View,
    Dismiss,
    /// The notification body itself was clicked.
    Default,
}

impl ClickAction {
    /// Map a platform action identifier onto the routing action.
    pub fn from_action_id(action: Option<&str>) -> Self {
        match action {
            Some("view") => Self::View,
            Some("dismiss") => Self::Dismiss,
            _ => Self::Default,
        }
    }
}

/// A user interaction with a displayed notification.
#[derive(Debug, Clone)]
pub struct NotificationClick {
    pub action: ClickAction,
    pub tag: String,
    /// The rendered notification's data blob.
    pub data: JsonValue,
}

/// Where a click ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutingOutcome {
    /// `dismiss`: the notification was closed, nothing else happened.
    Dismissed,
    /// An existing window was focused and messaged.
    FocusedExisting(ClientId),
    /// A new window was opened at the target URL.
    OpenedWindow(ClientId),
    /// No window available and window-opening unsupported.
    NoWindow,
}

/// Routes notification clicks back into the application's windows.
pub struct ClickRouter {
    origin: Url,
    clients: Arc<RwLock<Clients>>,
    surface: Arc<dyn NotificationSurface>,
}

impl ClickRouter {
    pub fn new(
        origin: Url,
        clients: Arc<RwLock<Clients>>,
        surface: Arc<dyn NotificationSurface>,
    ) -> Self {
        Self {
            origin,
            clients,
            surface,
        }
    }

    /// Route a click.
    ///
    /// The notification is closed before the window search begins, so it
    /// never remains visible after any click. Windows are enumerated fresh;
    /// only the first same-origin focusable one is used.
    pub async fn route(&self, click: NotificationClick) -> Result<RoutingOutcome, PushError> {
        self.surface.close(&click.tag);

        if click.action == ClickAction::Dismiss {
            debug!(tag = %click.tag, "notification dismissed");
            return Ok(RoutingOutcome::Dismissed);
        }

        let target = click
            .data
            .get("url")
            .and_then(JsonValue::as_str)
            .unwrap_or("/")
            .to_string();

        let mut clients = self.clients.write().await;
        let existing = clients
            .match_all(ClientMatchOptions::any_window())
            .iter()
            .find(|client| client.is_same_origin(&self.origin) && client.focusable)
            .map(|client| client.id);

        if let Some(id) = existing {
            let client = clients
                .get_mut(id)
                .ok_or_else(|| PushError::RoutingFailed("window vanished mid-routing".to_string()))?;
            client
                .focus()
                .map_err(|e| PushError::RoutingFailed(e.to_string()))?;

            let message = match click.action {
                ClickAction::View => WorkerMessage::Navigate {
                    url: target.clone(),
                    data: click.data.clone(),
                },
                _ => WorkerMessage::NotificationClick {
                    data: click.data.clone(),
                },
            };
            client
                .post_message(message)
                .map_err(|e| PushError::RoutingFailed(e.to_string()))?;
            info!(client = id.raw(), url = %target, "focused existing window");
            return Ok(RoutingOutcome::FocusedExisting(id));
        }

        if clients.can_open_windows() {
            let url = self
                .origin
                .join(&target)
                .map_err(|e| PushError::RoutingFailed(format!("{target}: {e}")))?;
            let (id, _receiver) = clients
                .open_window(url)
                .map_err(|e| PushError::RoutingFailed(e.to_string()))?;
            info!(client = id.raw(), url = %target, "opened new window");
            return Ok(RoutingOutcome::OpenedWindow(id));
        }

        warn!(url = %target, "no window available for notification click");
        Ok(RoutingOutcome::NoWindow)
    }
}
