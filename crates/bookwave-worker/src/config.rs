//! Worker configuration.

use bookwave_push::NotificationDefaults;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Configuration compiled into a worker build.
///
/// The cache version is the only cache-invalidation mechanism: shipping a
/// worker with a bumped version retires every older namespace on activation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// The worker's own origin.
    pub origin: String,

    /// Application prefix for cache namespaces.
    pub cache_prefix: String,

    /// Version tag; the current namespace is `<prefix>-<version>`.
    pub cache_version: String,

    /// Shell resources warmed at install time.
    pub shell_manifest: Vec<String>,

    /// Served when a navigation fails offline.
    pub offline_fallback: String,

    /// Defaults for rendered notifications.
    pub notification: NotificationDefaults,

    /// Compiled-in fallback for the push-provider config.
    pub provider_fallback: Option<JsonValue>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            origin: "https://app.bookwave.example".to_string(),
            cache_prefix: "bookwave".to_string(),
            cache_version: "v1".to_string(),
            shell_manifest: vec![
                "/".to_string(),
                "/index.html".to_string(),
                "/manifest.json".to_string(),
                "/logo.png".to_string(),
                "/logo.svg".to_string(),
                "/icon-192x192.png".to_string(),
                "/icon-512x512.png".to_string(),
            ],
            offline_fallback: "/index.html".to_string(),
            notification: NotificationDefaults::default(),
            provider_fallback: None,
        }
    }
}

impl WorkerConfig {
    /// Name of the current cache namespace.
    pub fn cache_name(&self) -> String {
        format!("{}-{}", self.cache_prefix, self.cache_version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = WorkerConfig::default();
        assert_eq!(config.cache_name(), "bookwave-v1");
        assert!(config
            .shell_manifest
            .contains(&"/index.html".to_string()));
        assert_eq!(config.offline_fallback, "/index.html");
    }

    #[test]
    fn test_config_round_trips_through_json() {
        let config = WorkerConfig {
            cache_version: "v2".to_string(),
            ..Default::default()
        };
        let wire = serde_json::to_string(&config).unwrap();
        let parsed: WorkerConfig = serde_json::from_str(&wire).unwrap();
        assert_eq!(parsed.cache_name(), "bookwave-v2");
    }
}
