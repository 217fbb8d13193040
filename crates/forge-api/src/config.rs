//! API server configuration.

use std::time::Duration;

/// Default port of the Forge HTTP surface.
pub const DEFAULT_PORT: u16 = 9876;

/// API server configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Bind host. Localhost by default; LAN exposure is an explicit opt-in
    /// with security implications.
    pub host: String,
    pub port: u16,
    /// Whether this deployment profile supports Resolve jobs at all.
    pub resolve_enabled: bool,
    /// Timeout applied to read handlers.
    pub request_timeout: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            resolve_enabled: true,
            request_timeout: Duration::from_secs(10),
        }
    }
}

impl ApiConfig {
    /// Create config from environment variables.
    ///
    /// `FORGE_MONITOR_LAN=true` widens the bind address to 0.0.0.0; anyone
    /// on the network can then view job data.
    pub fn from_env() -> Self {
        let lan = std::env::var("FORGE_MONITOR_LAN")
            .map(|v| v.to_lowercase() == "true" || v == "1")
            .unwrap_or(false);
        Self {
            host: if lan {
                "0.0.0.0".to_string()
            } else {
                "127.0.0.1".to_string()
            },
            port: std::env::var("FORGE_API_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_PORT),
            resolve_enabled: std::env::var("FORGE_RESOLVE_ENABLED")
                .map(|v| v.to_lowercase() != "false" && v != "0")
                .unwrap_or(true),
            request_timeout: Duration::from_secs(
                std::env::var("FORGE_REQUEST_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(10),
            ),
        }
    }

    pub fn is_lan_exposed(&self) -> bool {
        self.host == "0.0.0.0"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_local_only() {
        let config = ApiConfig::default();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, DEFAULT_PORT);
        assert!(!config.is_lan_exposed());
        assert!(config.resolve_enabled);
    }
}
