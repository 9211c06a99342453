//! Client configuration.
//!
//! All settings live in a single `config.toml` file at
//! `~/.config/koci-planner/config.toml` by default.

use std::path::{Path, PathBuf};
use std::time::Duration;

use planner_drive::{DriveConfig, OAuthCredentials};
use serde::{Deserialize, Serialize};

const APP_DIR: &str = "koci-planner";

/// Configuration for the planner client.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Google sign-in and Drive settings.
    pub google: Option<GoogleSettings>,

    /// Debug mode.
    pub debug: bool,

    #[serde(default)]
    pub storage: StorageSettings,

    #[serde(default)]
    pub notifications: NotificationSettings,
}

/// Where the local task mirror lives.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// Path of the local store file.
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationSettings {
    /// Also raise desktop notifications.
    pub desktop: bool,
}

/// Google settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GoogleSettings {
    /// OAuth client ID.
    pub client_id: Option<String>,

    /// OAuth client secret.
    pub client_secret: Option<String>,

    /// Google Cloud Console credentials JSON, used when the inline values are absent.
    pub credentials_file: Option<PathBuf>,

    /// Path to token storage.
    pub token_path: Option<PathBuf>,

    /// Name of the task file on Drive.
    pub file_name: Option<String>,

    /// HTTP request timeout in seconds.
    pub timeout_secs: Option<u64>,

    /// Seconds to wait for the browser sign-in to finish.
    pub consent_timeout_secs: Option<u64>,

    /// Port range for the sign-in redirect listener, e.g. `[8080, 8090]`.
    pub loopback_ports: Option<(u16, u16)>,
}

impl ClientConfig {
    /// Loads configuration from the default path.
    pub fn load() -> Result<Self, String> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Loads configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self, String> {
        let content =
            std::fs::read_to_string(path).map_err(|e| format!("failed to read config: {}", e))?;
        toml::from_str(&content).map_err(|e| format!("failed to parse config: {}", e))
    }

    /// Returns the default configuration file path.
    pub fn default_path() -> PathBuf {
        Self::default_config_dir().join("config.toml")
    }

    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR)
    }

    pub fn default_data_dir() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR)
    }

    /// Path of the local task store.
    pub fn store_path(&self) -> PathBuf {
        self.storage
            .path
            .clone()
            .unwrap_or_else(|| Self::default_data_dir().join("store.json"))
    }

    /// Path of the OAuth token file.
    pub fn token_path(&self) -> PathBuf {
        self.google
            .as_ref()
            .and_then(|g| g.token_path.clone())
            .unwrap_or_else(DriveConfig::default_token_path)
    }
}

impl GoogleSettings {
    /// Returns true if credentials are configured in some form.
    pub fn has_credentials(&self) -> bool {
        (self.client_id.is_some() && self.client_secret.is_some())
            || self.credentials_file.is_some()
    }

    /// Resolves the OAuth credentials from the inline fields or the credentials file.
    pub fn resolve_credentials(&self) -> Result<OAuthCredentials, String> {
        if let (Some(id), Some(secret)) = (&self.client_id, &self.client_secret) {
            return Ok(OAuthCredentials::new(id, secret));
        }

        if let Some(ref path) = self.credentials_file {
            return OAuthCredentials::from_file(path)
                .map_err(|e| format!("failed to load {}: {}", path.display(), e));
        }

        if self.client_id.is_some() || self.client_secret.is_some() {
            return Err("both client_id and client_secret are required in [google]".to_string());
        }

        Err(format!(
            "Google credentials not found. Add to {}:\n  \
             [google]\n  \
             client_id = \"YOUR_ID.apps.googleusercontent.com\"\n  \
             client_secret = \"YOUR_SECRET\"\n\n  \
             Or run: koci-planner login --credentials-file <path>",
            ClientConfig::default_path().display()
        ))
    }

    /// Builds the Drive configuration for the given credentials.
    pub fn to_drive_config(&self, credentials: OAuthCredentials) -> DriveConfig {
        let mut config = DriveConfig::new(credentials);
        if let Some(ref path) = self.token_path {
            config = config.with_token_path(path);
        }
        if let Some(ref name) = self.file_name {
            config = config.with_file_name(name);
        }
        if let Some(secs) = self.timeout_secs {
            config = config.with_timeout(Duration::from_secs(secs));
        }
        if let Some(secs) = self.consent_timeout_secs {
            config = config.with_consent_timeout(Duration::from_secs(secs));
        }
        if let Some((start, end)) = self.loopback_ports {
            config = config.with_loopback_port_range(start, end);
        }
        config
    }
}
