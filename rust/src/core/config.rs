// App config loaded from `<data_dir>/sierra_config.json`; every field optional.

use std::path::Path;
use std::time::Duration;

use chrono::{FixedOffset, Local, Offset};
use serde::{Deserialize, Serialize};

pub(crate) const CONFIG_FILE_NAME: &str = "sierra_config.json";

pub(crate) const DEFAULT_API_BASE_URL: &str = "https://sierra-backend.onrender.com";
const DEFAULT_RECONNECT_INITIAL_MS: u64 = 1_000;
const DEFAULT_RECONNECT_MAX_MS: u64 = 30_000;
const DEFAULT_TYPING_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_COMPOSER_IDLE_MS: u64 = 3_000;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub api_base_url: Option<String>,
    #[serde(default)]
    pub socket_url: Option<String>,
    #[serde(default)]
    pub disable_realtime: Option<bool>,
    #[serde(default)]
    pub reconnect_initial_ms: Option<u64>,
    #[serde(default)]
    pub reconnect_max_ms: Option<u64>,
    #[serde(default)]
    pub typing_timeout_ms: Option<u64>,
    #[serde(default)]
    pub composer_idle_ms: Option<u64>,
    #[serde(default)]
    pub utc_offset_minutes: Option<i32>,
}

pub(crate) fn load_app_config(data_dir: &str) -> AppConfig {
    let path = Path::new(data_dir).join(CONFIG_FILE_NAME);
    let Ok(raw) = std::fs::read_to_string(&path) else {
        return AppConfig::default();
    };
    match serde_json::from_str::<AppConfig>(&raw) {
        Ok(cfg) => cfg,
        Err(e) => {
            tracing::warn!(%e, path = %path.display(), "config: ignoring unparsable file");
            AppConfig::default()
        }
    }
}

fn non_empty(value: Option<&String>) -> Option<String> {
    value
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
}

fn env_override(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

impl AppConfig {
    /// Whether sessions open the realtime socket. REST always goes through the backend.
    pub fn realtime_enabled(&self) -> bool {
        self.disable_realtime != Some(true)
    }

    pub fn api_base_url(&self) -> String {
        env_override("SIERRA_API_URL")
            .or_else(|| non_empty(self.api_base_url.as_ref()))
            .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string())
    }

    /// Falls back to the API host with a ws(s) scheme.
    pub fn socket_url(&self) -> String {
        if let Some(url) =
            env_override("SIERRA_SOCKET_URL").or_else(|| non_empty(self.socket_url.as_ref()))
        {
            return url;
        }
        websocket_url_for(&self.api_base_url())
    }

    pub fn reconnect_initial(&self) -> Duration {
        Duration::from_millis(
            self.reconnect_initial_ms
                .unwrap_or(DEFAULT_RECONNECT_INITIAL_MS)
                .max(1),
        )
    }

    pub fn reconnect_max(&self) -> Duration {
        Duration::from_millis(self.reconnect_max_ms.unwrap_or(DEFAULT_RECONNECT_MAX_MS))
            .max(self.reconnect_initial())
    }

    pub fn typing_timeout(&self) -> Duration {
        Duration::from_millis(self.typing_timeout_ms.unwrap_or(DEFAULT_TYPING_TIMEOUT_MS))
    }

    pub fn composer_idle(&self) -> Duration {
        Duration::from_millis(self.composer_idle_ms.unwrap_or(DEFAULT_COMPOSER_IDLE_MS))
    }

    pub fn utc_offset(&self) -> FixedOffset {
        self.utc_offset_minutes
            .and_then(|m| FixedOffset::east_opt(m.saturating_mul(60)))
            .unwrap_or_else(|| Local::now().offset().fix())
    }
}

pub(crate) fn websocket_url_for(api_base: &str) -> String {
    let Ok(mut url) = url::Url::parse(api_base) else {
        return api_base.to_string();
    };
    let scheme = match url.scheme() {
        "https" => "wss",
        "http" => "ws",
        other => other,
    }
    .to_string();
    if url.set_scheme(&scheme).is_err() {
        return api_base.to_string();
    }
    url.to_string()
}
