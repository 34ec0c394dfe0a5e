//! Client configuration
//!
//! The socket endpoint comes from the environment (or a TOML file); the
//! reconnect constants default to 5 attempts, 1s base delay and 30s cap.

use crate::client::backoff::ReconnectPolicy;
use crate::error::{LiveError, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::str::FromStr;

/// Default live update endpoint
pub const DEFAULT_WS_URL: &str = "ws://localhost:3000/ws";

/// Environment variable holding the endpoint URL
pub const ENV_WS_URL: &str = "LIVESCORE_WS_URL";
/// Environment variable overriding the reconnect ceiling
pub const ENV_MAX_ATTEMPTS: &str = "LIVESCORE_RECONNECT_MAX_ATTEMPTS";
/// Environment variable overriding the base delay (milliseconds)
pub const ENV_BASE_DELAY_MS: &str = "LIVESCORE_RECONNECT_BASE_MS";
/// Environment variable overriding the delay cap (milliseconds)
pub const ENV_MAX_DELAY_MS: &str = "LIVESCORE_RECONNECT_MAX_MS";

/// Configuration for the live update connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LiveConfig {
    /// WebSocket endpoint (e.g., "ws://localhost:3000/ws")
    pub ws_url: String,

    /// Reconnect backoff
    pub reconnect: ReconnectPolicy,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            ws_url: DEFAULT_WS_URL.to_string(),
            reconnect: ReconnectPolicy::default(),
        }
    }
}

impl LiveConfig {
    /// Create a configuration for the given endpoint
    pub fn new(ws_url: impl Into<String>) -> Self {
        Self {
            ws_url: ws_url.into(),
            ..Self::default()
        }
    }

    /// Set the reconnect policy
    pub fn with_reconnect(mut self, reconnect: ReconnectPolicy) -> Self {
        self.reconnect = reconnect;
        self
    }

    /// Load configuration from environment variables, falling back to defaults
    pub fn from_env() -> Result<Self> {
        let defaults = ReconnectPolicy::default();

        let config = Self {
            ws_url: get_env(ENV_WS_URL)?.unwrap_or_else(|| DEFAULT_WS_URL.to_string()),
            reconnect: ReconnectPolicy {
                max_attempts: get_env_parse(ENV_MAX_ATTEMPTS)?.unwrap_or(defaults.max_attempts),
                base_delay_ms: get_env_parse(ENV_BASE_DELAY_MS)?
                    .unwrap_or(defaults.base_delay_ms),
                max_delay_ms: get_env_parse(ENV_MAX_DELAY_MS)?.unwrap_or(defaults.max_delay_ms),
            },
        };

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub async fn from_file(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| LiveError::Config(format!("Failed to read config {}: {}", path.display(), e)))?;

        let config: LiveConfig = toml::from_str(&content)?;
        config.validate()?;

        Ok(config)
    }

    /// Save configuration to a TOML file
    pub async fn save_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| LiveError::Config(format!("Failed to serialize config: {}", e)))?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, content).await?;

        Ok(())
    }

    /// Check the endpoint scheme and the delay bounds
    pub fn validate(&self) -> Result<()> {
        if !(self.ws_url.starts_with("ws://") || self.ws_url.starts_with("wss://")) {
            return Err(LiveError::Config(format!(
                "WebSocket URL must start with ws:// or wss://, got '{}'",
                self.ws_url
            )));
        }

        if self.reconnect.base_delay_ms == 0 {
            return Err(LiveError::Config(
                "Reconnect base delay must be non-zero".to_string(),
            ));
        }

        if self.reconnect.max_delay_ms < self.reconnect.base_delay_ms {
            return Err(LiveError::Config(format!(
                "Reconnect max delay ({}ms) is below the base delay ({}ms)",
                self.reconnect.max_delay_ms, self.reconnect.base_delay_ms
            )));
        }

        Ok(())
    }
}

fn get_env(key: &str) -> Result<Option<String>> {
    match env::var(key) {
        Ok(val) => Ok(Some(val)),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(env::VarError::NotUnicode(_)) => Err(LiveError::Config(format!(
            "Environment variable {} contains invalid UTF-8",
            key
        ))),
    }
}

fn get_env_parse<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    get_env(key)?
        .map(|val| {
            val.parse::<T>().map_err(|e| {
                LiveError::Config(format!("Failed to parse environment variable {}: {}", key, e))
            })
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = LiveConfig::default();
        assert_eq!(config.ws_url, "ws://localhost:3000/ws");
        assert_eq!(config.reconnect, ReconnectPolicy::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_new() {
        let config = LiveConfig::new("wss://scores.example.com/ws")
            .with_reconnect(ReconnectPolicy::new(2));
        assert_eq!(config.ws_url, "wss://scores.example.com/ws");
        assert_eq!(config.reconnect.max_attempts, 2);
    }

    #[test]
    fn test_validate_rejects_http_url() {
        let config = LiveConfig::new("http://localhost:3000/ws");
        assert!(matches!(config.validate(), Err(LiveError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_inverted_delays() {
        let mut config = LiveConfig::default();
        config.reconnect.max_delay_ms = 10;
        assert!(config.validate().is_err());

        config.reconnect.base_delay_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: LiveConfig = toml::from_str("ws_url = \"ws://10.0.0.2:4000/ws\"").unwrap();
        assert_eq!(config.ws_url, "ws://10.0.0.2:4000/ws");
        assert_eq!(config.reconnect.max_attempts, 5);

        let config: LiveConfig = toml::from_str("[reconnect]\nmax_attempts = 8\n").unwrap();
        assert_eq!(config.ws_url, DEFAULT_WS_URL);
        assert_eq!(config.reconnect.max_attempts, 8);
        assert_eq!(config.reconnect.base_delay_ms, 1000);
    }

    #[test]
    fn test_get_env_parse_invalid() {
        env::set_var("LIVESCORE_TEST_INVALID_NUMBER", "soon");
        let result: Result<Option<u32>> = get_env_parse("LIVESCORE_TEST_INVALID_NUMBER");
        assert!(result.is_err());
        env::remove_var("LIVESCORE_TEST_INVALID_NUMBER");
    }

    #[test]
    fn test_get_env_missing() {
        let result: Option<u64> = get_env_parse("LIVESCORE_TEST_MISSING_VAR_12345").unwrap();
        assert!(result.is_none());
    }
}
