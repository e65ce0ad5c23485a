use std::{fs, path::Path, time::Duration};

use serde::Deserialize;
use tracing::warn;
use url::Url;

use crate::error::ClientError;

pub const SETTINGS_FILE: &str = "client.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSettings {
    pub base_url: String,
    /// Explicit realtime endpoint; derived from `base_url` when unset.
    pub realtime_url: Option<String>,
    pub request_timeout_secs: u64,
    pub connect_timeout_secs: u64,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".into(),
            realtime_url: None,
            request_timeout_secs: 10,
            connect_timeout_secs: 10,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct FileSettings {
    base_url: Option<String>,
    realtime_url: Option<String>,
    request_timeout_secs: Option<u64>,
    connect_timeout_secs: Option<u64>,
}

impl ClientSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn realtime_endpoint(&self) -> Result<Url, ClientError> {
        match &self.realtime_url {
            Some(raw) => Url::parse(raw)
                .map_err(|err| ClientError::InvalidEndpoint(format!("{raw}: {err}"))),
            None => realtime_endpoint(&self.base_url),
        }
    }
}

/// Defaults, then `client.toml` in the working directory, then environment.
pub fn load_settings() -> ClientSettings {
    load_settings_from(Path::new(SETTINGS_FILE), |key| std::env::var(key).ok())
}

pub fn load_settings_from(
    path: &Path,
    env: impl Fn(&str) -> Option<String>,
) -> ClientSettings {
    let mut settings = ClientSettings::default();

    if let Ok(raw) = fs::read_to_string(path) {
        match toml::from_str::<FileSettings>(&raw) {
            Ok(file_cfg) => {
                if let Some(v) = file_cfg.base_url {
                    settings.base_url = v;
                }
                if let Some(v) = file_cfg.realtime_url {
                    settings.realtime_url = Some(v);
                }
                if let Some(v) = file_cfg.request_timeout_secs {
                    settings.request_timeout_secs = v;
                }
                if let Some(v) = file_cfg.connect_timeout_secs {
                    settings.connect_timeout_secs = v;
                }
            }
            Err(err) => warn!("config: ignoring unreadable {}: {err}", path.display()),
        }
    }

    if let Some(v) = env("CHAT_BASE_URL") {
        settings.base_url = v;
    }
    if let Some(v) = env("APP__BASE_URL") {
        settings.base_url = v;
    }

    if let Some(v) = env("CHAT_REALTIME_URL") {
        settings.realtime_url = Some(v);
    }
    if let Some(v) = env("APP__REALTIME_URL") {
        settings.realtime_url = Some(v);
    }

    if let Some(v) = env("APP__REQUEST_TIMEOUT_SECS") {
        if let Ok(parsed) = v.parse::<u64>() {
            settings.request_timeout_secs = parsed;
        }
    }
    if let Some(v) = env("APP__CONNECT_TIMEOUT_SECS") {
        if let Ok(parsed) = v.parse::<u64>() {
            settings.connect_timeout_secs = parsed;
        }
    }

    settings
}

/// Socket.IO WebSocket endpoint for an `http(s)://` server address.
pub fn realtime_endpoint(base_url: &str) -> Result<Url, ClientError> {
    let mut url = Url::parse(base_url.trim())
        .map_err(|err| ClientError::InvalidEndpoint(format!("{base_url}: {err}")))?;
    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(ClientError::InvalidEndpoint(format!(
                "{base_url}: unsupported scheme '{other}', expected http:// or https://"
            )))
        }
    };
    url.set_scheme(scheme)
        .map_err(|()| ClientError::InvalidEndpoint(format!("{base_url}: cannot use {scheme}")))?;
    url.set_path("/socket.io/");
    url.set_query(Some("EIO=4&transport=websocket"));
    url.set_fragment(None);
    Ok(url)
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
