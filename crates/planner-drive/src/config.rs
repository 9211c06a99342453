//! OAuth client credentials and Drive sync configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

/// OAuth 2.0 client credentials of the installed application.
#[derive(Debug, Clone)]
pub struct OAuthCredentials {
    pub client_id: String,
    pub client_secret: String,
}

/// Layout of the credentials JSON downloaded from the Google Cloud Console.
///
/// Accepts the nested `installed` / `web` form and the flat form.
#[derive(Debug, Deserialize)]
struct CredentialsFile {
    installed: Option<NestedCredentials>,
    web: Option<NestedCredentials>,
    client_id: Option<String>,
    client_secret: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NestedCredentials {
    client_id: String,
    client_secret: String,
    /// Registered redirect URIs. Loopback redirects pick their own port, so
    /// these are only logged.
    #[serde(default)]
    redirect_uris: Vec<String>,
}

impl OAuthCredentials {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }

    /// Loads credentials from a Google Cloud Console JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, String> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| format!("failed to read credentials file: {}", e))?;
        Self::from_json(&content)
    }

    /// Parses credentials from a Google credentials JSON string.
    pub fn from_json(json: &str) -> Result<Self, String> {
        let file: CredentialsFile = serde_json::from_str(json)
            .map_err(|e| format!("failed to parse credentials JSON: {}", e))?;

        if let Some(creds) = file.installed.or(file.web) {
            if !creds.redirect_uris.is_empty() {
                tracing::debug!(uris = ?creds.redirect_uris, "ignoring registered redirect URIs");
            }
            return Ok(Self::new(creds.client_id, creds.client_secret));
        }

        if let (Some(client_id), Some(client_secret)) = (file.client_id, file.client_secret) {
            return Ok(Self::new(client_id, client_secret));
        }

        Err("credentials must contain an 'installed'/'web' section or a root 'client_id'/'client_secret'".to_string())
    }

    /// Checks the values look like Google OAuth client credentials.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.client_id.is_empty() {
            return Err("client_id is required");
        }
        if !self.client_id.ends_with(".apps.googleusercontent.com") {
            return Err("client_id should end with .apps.googleusercontent.com");
        }
        if self.client_secret.is_empty() {
            return Err("client_secret is required");
        }
        Ok(())
    }
}

/// Endpoints used by the OAuth and Drive clients.
///
/// Overridable so tests can point them at a local mock server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub auth_url: String,
    pub token_url: String,
    /// Base for metadata calls (`files.list`, `files.get`).
    pub drive_api: String,
    /// Base for media uploads (`files.create`, `files.update`).
    pub drive_upload: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            auth_url: "https://accounts.google.com/o/oauth2/v2/auth".to_string(),
            token_url: "https://oauth2.googleapis.com/token".to_string(),
            drive_api: "https://www.googleapis.com/drive/v3".to_string(),
            drive_upload: "https://www.googleapis.com/upload/drive/v3".to_string(),
        }
    }
}

impl Endpoints {
    /// Points every endpoint at `base` (used with mock servers).
    pub fn local(base: &str) -> Self {
        let base = base.trim_end_matches('/');
        Self {
            auth_url: format!("{}/o/oauth2/v2/auth", base),
            token_url: format!("{}/token", base),
            drive_api: format!("{}/drive/v3", base),
            drive_upload: format!("{}/upload/drive/v3", base),
        }
    }
}

/// Configuration for Google sign-in and the Drive-backed task file.
#[derive(Debug, Clone)]
pub struct DriveConfig {
    pub credentials: OAuthCredentials,

    /// Where the token bundle is persisted.
    ///
    /// Defaults to `<data dir>/koci-planner/token.json`.
    pub token_path: PathBuf,

    /// Reserved name of the remote task file.
    pub file_name: String,

    /// Number of files inspected when locating the task file.
    pub page_size: u32,

    /// OAuth scopes to request.
    pub scopes: Vec<String>,

    /// Per-request HTTP timeout.
    pub timeout: Duration,

    /// How long the consent window waits for the redirect.
    pub consent_timeout: Duration,

    /// Ports tried for the loopback redirect listener.
    pub loopback_port_range: (u16, u16),

    pub endpoints: Endpoints,
}

impl DriveConfig {
    pub const DEFAULT_FILE_NAME: &'static str = "koci_planer_todos.json";
    pub const DEFAULT_SCOPE: &'static str = "https://www.googleapis.com/auth/drive";
    pub const DEFAULT_PAGE_SIZE: u32 = 10;
    pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
    pub const DEFAULT_CONSENT_TIMEOUT_SECS: u64 = 300;

    pub fn new(credentials: OAuthCredentials) -> Self {
        Self {
            credentials,
            token_path: Self::default_token_path(),
            file_name: Self::DEFAULT_FILE_NAME.to_string(),
            page_size: Self::DEFAULT_PAGE_SIZE,
            scopes: vec![Self::DEFAULT_SCOPE.to_string()],
            timeout: Duration::from_secs(Self::DEFAULT_TIMEOUT_SECS),
            consent_timeout: Duration::from_secs(Self::DEFAULT_CONSENT_TIMEOUT_SECS),
            loopback_port_range: (8080, 8090),
            endpoints: Endpoints::default(),
        }
    }

    /// Returns the default token file location.
    pub fn default_token_path() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("koci-planner")
            .join("token.json")
    }

    pub fn with_token_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.token_path = path.into();
        self
    }

    pub fn with_file_name(mut self, name: impl Into<String>) -> Self {
        self.file_name = name.into();
        self
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = scopes;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_consent_timeout(mut self, timeout: Duration) -> Self {
        self.consent_timeout = timeout;
        self
    }

    pub fn with_loopback_port_range(mut self, start: u16, end: u16) -> Self {
        self.loopback_port_range = (start, end);
        self
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), String> {
        self.credentials
            .validate()
            .map_err(|e| format!("invalid credentials: {}", e))?;

        if self.scopes.is_empty() {
            return Err("at least one OAuth scope is required".to_string());
        }
        if self.file_name.trim().is_empty() {
            return Err("remote file name must not be empty".to_string());
        }
        if self.page_size == 0 {
            return Err("page size must be at least 1".to_string());
        }
        if self.loopback_port_range.0 > self.loopback_port_range.1 {
            return Err("invalid loopback port range".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_credentials() -> OAuthCredentials {
        OAuthCredentials::new("test-client.apps.googleusercontent.com", "test-secret")
    }

    #[test]
    fn credentials_validation() {
        assert!(test_credentials().validate().is_ok());
        assert!(OAuthCredentials::new("", "secret").validate().is_err());
        assert!(OAuthCredentials::new("bad-id", "secret").validate().is_err());
        assert!(
            OAuthCredentials::new("x.apps.googleusercontent.com", "")
                .validate()
                .is_err()
        );
    }

    #[test]
    fn credentials_from_installed_json() {
        let json = r#"{
            "installed": {
                "client_id": "desk.apps.googleusercontent.com",
                "client_secret": "desk-secret",
                "project_id": "koci",
                "redirect_uris": ["http://localhost"]
            }
        }"#;

        let creds = OAuthCredentials::from_json(json).unwrap();
        assert_eq!(creds.client_id, "desk.apps.googleusercontent.com");
        assert_eq!(creds.client_secret, "desk-secret");
    }

    #[test]
    fn credentials_from_flat_json() {
        let json = r#"{"client_id": "flat.apps.googleusercontent.com", "client_secret": "s"}"#;
        let creds = OAuthCredentials::from_json(json).unwrap();
        assert_eq!(creds.client_id, "flat.apps.googleusercontent.com");
    }

    #[test]
    fn credentials_from_json_errors() {
        assert!(
            OAuthCredentials::from_json(r#"{"other": {}}"#)
                .unwrap_err()
                .contains("client_id")
        );
        assert!(OAuthCredentials::from_json("nope").unwrap_err().contains("parse"));
    }

    #[test]
    fn credentials_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.json");
        std::fs::write(
            &path,
            r#"{"web": {"client_id": "w.apps.googleusercontent.com", "client_secret": "ws"}}"#,
        )
        .unwrap();

        let creds = OAuthCredentials::from_file(&path).unwrap();
        assert_eq!(creds.client_secret, "ws");
    }

    #[test]
    fn config_defaults() {
        let config = DriveConfig::new(test_credentials());
        assert_eq!(config.file_name, "koci_planer_todos.json");
        assert_eq!(config.page_size, 10);
        assert_eq!(config.scopes, vec![DriveConfig::DEFAULT_SCOPE.to_string()]);
        assert!(config.token_path.ends_with("koci-planner/token.json"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn config_validation_failures() {
        let config = DriveConfig::new(test_credentials()).with_scopes(vec![]);
        assert!(config.validate().is_err());

        let config = DriveConfig::new(test_credentials()).with_page_size(0);
        assert!(config.validate().is_err());

        let config = DriveConfig::new(test_credentials()).with_loopback_port_range(9000, 8000);
        assert!(config.validate().is_err());

        let config = DriveConfig::new(test_credentials()).with_file_name(" ");
        assert!(config.validate().is_err());
    }

    #[test]
    fn local_endpoints() {
        let endpoints = Endpoints::local("http://127.0.0.1:4000/");
        assert_eq!(endpoints.token_url, "http://127.0.0.1:4000/token");
        assert_eq!(endpoints.drive_api, "http://127.0.0.1:4000/drive/v3");
        assert_eq!(
            endpoints.drive_upload,
            "http://127.0.0.1:4000/upload/drive/v3"
        );
    }
}
