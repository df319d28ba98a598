//! Control-message protocol between application windows and the worker.
//!
//! Fire-and-forget JSON messages; there is no request/response pairing.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Window → worker control messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    /// Force this worker to become active without waiting for old clients.
    #[serde(rename = "SKIP_WAITING")]
    SkipWaiting,

    /// Ask the worker to broadcast an application-exit notice.
    #[serde(rename = "EXIT_APP")]
    ExitApp,

    /// Push-provider configuration, forwarded to the provider bootstrap.
    #[serde(rename = "FIREBASE_CONFIG")]
    FirebaseConfig { config: JsonValue },
}

/// Worker → window messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WorkerMessage {
    /// The application is shutting down.
    #[serde(rename = "APP_EXIT")]
    AppExit,

    /// Navigate the window to `url` (explicit `view` action).
    #[serde(rename = "NAVIGATE")]
    Navigate { url: String, data: JsonValue },

    /// A notification was clicked without a specific action.
    #[serde(rename = "NOTIFICATION_CLICK")]
    NotificationClick { data: JsonValue },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_client_message_wire_shape() {
        let msg: ClientMessage = serde_json::from_str(r#"{"type":"SKIP_WAITING"}"#).unwrap();
        assert_eq!(msg, ClientMessage::SkipWaiting);

        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"FIREBASE_CONFIG","config":{"apiKey":"k"}}"#).unwrap();
        assert_eq!(
            msg,
            ClientMessage::FirebaseConfig {
                config: json!({"apiKey": "k"})
            }
        );
    }

    #[test]
    fn test_worker_message_wire_shape() {
        let msg = WorkerMessage::Navigate {
            url: "/bookings/42".to_string(),
            data: json!({"url": "/bookings/42", "clickAction": "navigate"}),
        };
        let wire = serde_json::to_value(&msg).unwrap();
        assert_eq!(wire["type"], "NAVIGATE");
        assert_eq!(wire["url"], "/bookings/42");
        assert_eq!(wire["data"]["clickAction"], "navigate");
    }

    #[test]
    fn test_app_exit_round_trip() {
        let wire = serde_json::to_string(&WorkerMessage::AppExit).unwrap();
        assert_eq!(wire, r#"{"type":"APP_EXIT"}"#);
        let parsed: WorkerMessage = serde_json::from_str(&wire).unwrap();
        assert_eq!(parsed, WorkerMessage::AppExit);
    }
}
