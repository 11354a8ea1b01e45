use std::time::Duration;

use serde::Deserialize;

pub const DEFAULT_API_BASE_URL: &str = "http://localhost:5000/api";

/// Bridge configuration, read from `JOBBYFY__*` environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct BridgeConfig {
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    /// Overrides the default session storage file.
    #[serde(default)]
    pub storage_path: Option<String>,
    /// Unset means proxied calls wait for the privileged process indefinitely.
    #[serde(default)]
    pub proxy_reply_timeout_ms: Option<u64>,
    #[serde(default = "default_bus_reply_timeout_ms")]
    pub bus_reply_timeout_ms: u64,
}

impl BridgeConfig {
    pub fn from_env() -> Self {
        config::Config::builder()
            .add_source(
                config::Environment::with_prefix("JOBBYFY")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .and_then(|c| c.try_deserialize::<BridgeConfig>())
            .map(BridgeConfig::normalize)
            .unwrap_or_else(|err| {
                tracing::warn!(target: "bridge.config", error = %err, "invalid configuration; using defaults");
                BridgeConfig::default()
            })
    }

    pub fn proxy_reply_timeout(&self) -> Option<Duration> {
        self.proxy_reply_timeout_ms.map(Duration::from_millis)
    }

    pub fn bus_reply_timeout(&self) -> Duration {
        Duration::from_millis(self.bus_reply_timeout_ms)
    }

    fn normalize(mut self) -> Self {
        let base = self.api_base_url.trim().trim_end_matches('/');
        self.api_base_url = if base.is_empty() {
            default_api_base_url()
        } else {
            base.to_string()
        };
        self.storage_path = self.storage_path.take().and_then(|path| {
            let trimmed = path.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        });
        self.proxy_reply_timeout_ms = self.proxy_reply_timeout_ms.filter(|ms| *ms > 0);
        if self.bus_reply_timeout_ms == 0 {
            self.bus_reply_timeout_ms = default_bus_reply_timeout_ms();
        }
        self
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            storage_path: None,
            proxy_reply_timeout_ms: None,
            bus_reply_timeout_ms: default_bus_reply_timeout_ms(),
        }
    }
}

fn default_api_base_url() -> String {
    DEFAULT_API_BASE_URL.to_string()
}

fn default_bus_reply_timeout_ms() -> u64 {
    30_000
}
