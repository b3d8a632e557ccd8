//! Client configuration.
//!
//! `ClientConfig` is stored as JSON under the platform config directory and
//! can be overridden per process through `NOTELY_API_URL` and `NOTELY_TOKEN`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::sync::{SessionToken, SyncSettings, DEFAULT_DEBOUNCE};
use crate::util::{is_http_url, normalize_text_option};

pub const API_URL_ENV: &str = "NOTELY_API_URL";
pub const TOKEN_ENV: &str = "NOTELY_TOKEN";

const APP_DIR: &str = "notely";
const CONFIG_FILE: &str = "config.json";
const DATABASE_FILE: &str = "notes.db";
const MAX_DEBOUNCE_MS: u64 = 600_000;

/// Settings for a Notely client on this device
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ClientConfig {
    #[serde(default)]
    pub api_base_url: Option<String>,
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    #[serde(default)]
    pub access_token: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: None,
            debounce_ms: default_debounce_ms(),
            access_token: None,
        }
    }
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("ClientConfig")
            .field("api_base_url", &self.api_base_url)
            .field("debounce_ms", &self.debounce_ms)
            .field(
                "access_token",
                &self.access_token.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

impl ClientConfig {
    /// `<config dir>/notely/config.json`, when the platform has a config dir
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(APP_DIR).join(CONFIG_FILE))
    }

    /// `<local data dir>/notely/notes.db`, when the platform has a data dir
    pub fn default_database_path() -> Option<PathBuf> {
        dirs::data_local_dir().map(|dir| dir.join(APP_DIR).join(DATABASE_FILE))
    }

    /// Read the config file, falling back to defaults when it does not exist
    pub fn load(path: &Path) -> Result<Self> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Self::default());
            }
            Err(error) => return Err(error.into()),
        };

        let config: Self = serde_json::from_str(&raw)?;
        config.normalized()
    }

    /// Write the config file, creating its directory if needed
    pub fn save(&self, path: &Path) -> Result<()> {
        let normalized = self.clone().normalized()?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, serde_json::to_string_pretty(&normalized)?)?;
        tracing::debug!("Saved client config to {}", path.display());
        Ok(())
    }

    /// Apply `NOTELY_API_URL` and `NOTELY_TOKEN` from the process environment
    pub fn with_env_overrides(self) -> Result<Self> {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary lookup. Blank values are ignored.
    pub fn with_overrides_from<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = normalize_text_option(lookup(API_URL_ENV)) {
            self.api_base_url = Some(url);
        }
        if let Some(token) = normalize_text_option(lookup(TOKEN_ENV)) {
            self.access_token = Some(token);
        }
        self.normalized()
    }

    /// Trim values, turn blanks into `None` and validate the server URL
    pub fn normalized(self) -> Result<Self> {
        let api_base_url = normalize_text_option(self.api_base_url)
            .map(|url| normalize_api_url(&url))
            .transpose()?;

        if self.debounce_ms > MAX_DEBOUNCE_MS {
            return Err(Error::InvalidInput(format!(
                "debounce_ms must be at most {MAX_DEBOUNCE_MS}"
            )));
        }

        Ok(Self {
            api_base_url,
            debounce_ms: self.debounce_ms,
            access_token: normalize_text_option(self.access_token),
        })
    }

    pub fn set_api_base_url(&mut self, url: &str) -> Result<()> {
        self.api_base_url = Some(normalize_api_url(url)?);
        Ok(())
    }

    pub fn set_access_token(&mut self, token: &str) -> Result<()> {
        self.access_token = Some(SessionToken::new(token)?.expose().to_string());
        Ok(())
    }

    pub fn clear_access_token(&mut self) {
        self.access_token = None;
    }

    pub fn sync_settings(&self) -> SyncSettings {
        SyncSettings {
            debounce: Duration::from_millis(self.debounce_ms),
            ..SyncSettings::default()
        }
    }

    /// Session credential, when a token is configured
    pub fn session(&self) -> Option<SessionToken> {
        self.access_token
            .as_deref()
            .and_then(|token| SessionToken::new(token).ok())
    }

    /// True when both a server and a token are configured
    pub fn can_sync(&self) -> bool {
        self.api_base_url.is_some() && self.access_token.is_some()
    }
}

fn default_debounce_ms() -> u64 {
    u64::try_from(DEFAULT_DEBOUNCE.as_millis()).unwrap_or(3000)
}

fn normalize_api_url(raw: &str) -> Result<String> {
    let url = raw.trim();
    if is_http_url(url) {
        Ok(url.trim_end_matches('/').to_string())
    } else {
        Err(Error::InvalidInput(format!(
            "Server URL must include http:// or https://: {url}"
        )))
    }
}
