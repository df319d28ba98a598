//! Window-client registry: the open browsing contexts this worker controls.

use std::sync::atomic::{AtomicU64, Ordering};

use hashbrown::HashMap;
use tokio::sync::mpsc;
use tracing::debug;
use url::Url;

use crate::messages::WorkerMessage;
use crate::SwError;

// ==================== Types ====================

/// Unique identifier for a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClientId(u64);

impl ClientId {
    fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// Client type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClientType {
    #[default]
    Window,
    Worker,
    All,
}

/// Visibility state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisibilityState {
    Hidden,
    Visible,
}

// ==================== Client ====================

/// An open browsing context controlled (or controllable) by the worker.
#[derive(Debug)]
pub struct Client {
    /// Client ID.
    pub id: ClientId,

    /// Current URL.
    pub url: Url,

    /// Client type.
    pub client_type: ClientType,

    /// Visibility state.
    pub visibility_state: VisibilityState,

    /// Whether focused.
    pub focused: bool,

    /// Whether the client can receive focus.
    pub focusable: bool,

    /// Whether this worker controls the client.
    pub controlled: bool,

    sender: mpsc::UnboundedSender<WorkerMessage>,
}

impl Client {
    /// Post a message to the client's window.
    pub fn post_message(&self, message: WorkerMessage) -> Result<(), SwError> {
        self.sender
            .send(message)
            .map_err(|_| SwError::StateError(format!("client {} window closed", self.id.raw())))
    }

    /// Focus the client.
    pub fn focus(&mut self) -> Result<(), SwError> {
        if self.client_type != ClientType::Window {
            return Err(SwError::StateError(
                "can only focus window clients".to_string(),
            ));
        }
        if !self.focusable {
            return Err(SwError::StateError(format!(
                "client {} is not focusable",
                self.id.raw()
            )));
        }
        self.focused = true;
        Ok(())
    }

    /// Whether the client's URL shares the given origin.
    pub fn is_same_origin(&self, origin: &Url) -> bool {
        self.url.origin() == origin.origin()
    }
}

/// Options for enumerating clients.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClientMatchOptions {
    pub include_uncontrolled: bool,
    pub client_type: ClientType,
}

impl ClientMatchOptions {
    /// Window clients, controlled or not — the click-routing enumeration.
    pub fn any_window() -> Self {
        Self {
            include_uncontrolled: true,
            client_type: ClientType::Window,
        }
    }
}

// ==================== Clients ====================

/// Registry of the worker's clients.
///
/// Enumeration is fresh on every call; nothing about window state is cached
/// between routing decisions.
#[derive(Debug)]
pub struct Clients {
    clients: HashMap<ClientId, Client>,
    can_open_windows: bool,
}

impl Default for Clients {
    fn default() -> Self {
        Self::new()
    }
}

impl Clients {
    pub fn new() -> Self {
        Self {
            clients: HashMap::new(),
            can_open_windows: true,
        }
    }

    /// Disable `open_window`, for platforms without window-opening support.
    pub fn set_can_open_windows(&mut self, supported: bool) {
        self.can_open_windows = supported;
    }

    pub fn can_open_windows(&self) -> bool {
        self.can_open_windows
    }

    /// Register an already-open application window.
    ///
    /// Returns the id and the receiving end of the window's message channel.
    pub fn add_window(&mut self, url: Url) -> (ClientId, mpsc::UnboundedReceiver<WorkerMessage>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let id = ClientId::new();
        self.clients.insert(
            id,
            Client {
                id,
                url,
                client_type: ClientType::Window,
                visibility_state: VisibilityState::Visible,
                focused: false,
                focusable: true,
                controlled: false,
                sender,
            },
        );
        (id, receiver)
    }

    pub fn get(&self, id: ClientId) -> Option<&Client> {
        self.clients.get(&id)
    }

    pub fn get_mut(&mut self, id: ClientId) -> Option<&mut Client> {
        self.clients.get_mut(&id)
    }

    /// Remove a client (window closed).
    pub fn remove(&mut self, id: ClientId) -> Option<Client> {
        self.clients.remove(&id)
    }

    /// Enumerate matching clients in window-open order.
    pub fn match_all(&self, options: ClientMatchOptions) -> Vec<&Client> {
        let mut matched: Vec<&Client> = self
            .clients
            .values()
            .filter(|client| {
                if !options.include_uncontrolled && !client.controlled {
                    return false;
                }
                match options.client_type {
                    ClientType::All => true,
                    wanted => client.client_type == wanted,
                }
            })
            .collect();
        matched.sort_by_key(|client| client.id);
        matched
    }

    /// Open a new window at the given URL.
    pub fn open_window(
        &mut self,
        url: Url,
    ) -> Result<(ClientId, mpsc::UnboundedReceiver<WorkerMessage>), SwError> {
        if !self.can_open_windows {
            return Err(SwError::StateError(
                "window opening not supported".to_string(),
            ));
        }
        let (id, receiver) = self.add_window(url);
        if let Some(client) = self.clients.get_mut(&id) {
            client.focused = true;
            client.controlled = true;
        }
        debug!(client = id.raw(), "opened new window");
        Ok((id, receiver))
    }

    /// Take control of every client. Returns how many were claimed.
    pub fn claim(&mut self) -> usize {
        let mut claimed = 0;
        for client in self.clients.values_mut() {
            if !client.controlled {
                client.controlled = true;
                claimed += 1;
            }
        }
        claimed
    }

    /// Post a message to every matching window. Returns delivery count.
    pub fn broadcast(&self, message: WorkerMessage) -> usize {
        let mut delivered = 0;
        for client in self.match_all(ClientMatchOptions::default()) {
            if client.post_message(message.clone()).is_ok() {
                delivered += 1;
            }
        }
        delivered
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn app_url(path: &str) -> Url {
        Url::parse("https://booking.example/")
            .unwrap()
            .join(path)
            .unwrap()
    }

    #[test]
    fn test_match_all_in_open_order() {
        let mut clients = Clients::new();
        let (first, _rx1) = clients.add_window(app_url("/"));
        let (second, _rx2) = clients.add_window(app_url("/bookings"));

        let matched = clients.match_all(ClientMatchOptions::any_window());
        assert_eq!(matched.len(), 2);
        assert_eq!(matched[0].id, first);
        assert_eq!(matched[1].id, second);
    }

    #[test]
    fn test_match_all_default_excludes_uncontrolled() {
        let mut clients = Clients::new();
        let (_id, _rx) = clients.add_window(app_url("/"));

        assert!(clients.match_all(ClientMatchOptions::default()).is_empty());
        assert_eq!(clients.claim(), 1);
        assert_eq!(clients.match_all(ClientMatchOptions::default()).len(), 1);
        // Repeated claim finds nothing new.
        assert_eq!(clients.claim(), 0);
    }

    #[test]
    fn test_post_message_delivery() {
        let mut clients = Clients::new();
        let (id, mut rx) = clients.add_window(app_url("/"));

        clients
            .get(id)
            .unwrap()
            .post_message(WorkerMessage::AppExit)
            .unwrap();
        assert_eq!(rx.try_recv().unwrap(), WorkerMessage::AppExit);
    }

    #[test]
    fn test_post_message_to_closed_window_fails() {
        let mut clients = Clients::new();
        let (id, rx) = clients.add_window(app_url("/"));
        drop(rx);

        let result = clients.get(id).unwrap().post_message(WorkerMessage::AppExit);
        assert!(matches!(result, Err(SwError::StateError(_))));
    }

    #[test]
    fn test_open_window_respects_capability() {
        let mut clients = Clients::new();
        clients.set_can_open_windows(false);
        assert!(clients.open_window(app_url("/bookings/42")).is_err());

        clients.set_can_open_windows(true);
        let (id, _rx) = clients.open_window(app_url("/bookings/42")).unwrap();
        let client = clients.get(id).unwrap();
        assert!(client.focused);
        assert!(client.controlled);
    }

    #[test]
    fn test_broadcast_reaches_every_controlled_window() {
        let mut clients = Clients::new();
        let (_a, mut rx_a) = clients.add_window(app_url("/"));
        let (_b, mut rx_b) = clients.add_window(app_url("/bookings"));
        clients.claim();

        assert_eq!(clients.broadcast(WorkerMessage::AppExit), 2);
        assert_eq!(rx_a.try_recv().unwrap(), WorkerMessage::AppExit);
        assert_eq!(rx_b.try_recv().unwrap(), WorkerMessage::AppExit);
    }

    #[test]
    fn test_removed_window_no_longer_enumerated() {
        let mut clients = Clients::new();
        let (id, _rx) = clients.add_window(app_url("/"));
        assert!(clients.remove(id).is_some());
        assert!(clients.match_all(ClientMatchOptions::any_window()).is_empty());
        assert!(clients.is_empty());
    }

    #[test]
    fn test_focus_unfocusable_client_fails() {
        let mut clients = Clients::new();
        let (id, _rx) = clients.add_window(app_url("/"));
        clients.get_mut(id).unwrap().focusable = false;

        assert!(clients.get_mut(id).unwrap().focus().is_err());
    }
}
