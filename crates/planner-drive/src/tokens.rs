//! OAuth token bundle and its on-disk storage.
//!
//! The bundle is written wholesale to a JSON file. Refreshes are merged in so
//! that a refresh response without a `refresh_token` never erases the one
//! obtained at consent time.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{DriveError, DriveResult};

/// Seconds subtracted from the server-reported lifetime so tokens are
/// refreshed slightly before they actually expire.
const EXPIRY_MARGIN_SECS: i64 = 60;

fn expiry_from(expires_in_secs: Option<i64>) -> Option<DateTime<Utc>> {
    expires_in_secs
        .map(|secs| Utc::now() + Duration::seconds(secs) - Duration::seconds(EXPIRY_MARGIN_SECS))
}

/// The credential bundle obtained from the token endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenInfo {
    pub access_token: String,

    /// Only returned on first consent or forced re-consent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    /// When the access token stops being usable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<DateTime<Utc>>,

    /// Space separated granted scopes.
    #[serde(default)]
    pub scope: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,

    pub last_refresh: DateTime<Utc>,
}

impl TokenInfo {
    pub fn new(
        access_token: impl Into<String>,
        refresh_token: Option<String>,
        expires_in_secs: Option<i64>,
        scope: impl Into<String>,
        token_type: Option<String>,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token,
            expiry: expiry_from(expires_in_secs),
            scope: scope.into(),
            token_type,
            last_refresh: Utc::now(),
        }
    }

    /// Returns true if the access token is expired or about to expire.
    pub fn is_expired(&self) -> bool {
        self.expiry.is_some_and(|expiry| Utc::now() >= expiry)
    }

    /// Returns true if every required scope was granted.
    pub fn has_scopes(&self, required: &[String]) -> bool {
        let granted: Vec<&str> = self.scope.split_whitespace().collect();
        required.iter().all(|scope| granted.contains(&scope.as_str()))
    }

    /// Merges a refresh into this bundle.
    ///
    /// The access token and expiry are always replaced; the refresh token,
    /// scope and token type only when the refresh carries them.
    pub fn apply_refresh(&mut self, refresh: &TokenRefresh) {
        self.access_token = refresh.access_token.clone();
        self.expiry = expiry_from(refresh.expires_in);
        if let Some(ref token) = refresh.refresh_token {
            self.refresh_token = Some(token.clone());
        }
        if let Some(ref scope) = refresh.scope {
            self.scope = scope.clone();
        }
        if let Some(ref token_type) = refresh.token_type {
            self.token_type = Some(token_type.clone());
        }
        self.last_refresh = Utc::now();
    }
}

/// A silent token refresh, as delivered to the persistence task.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TokenRefresh {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
}

/// File-backed token storage with an in-memory copy.
#[derive(Debug)]
pub struct TokenStorage {
    path: PathBuf,
    tokens: RwLock<Option<TokenInfo>>,
}

impl TokenStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            tokens: RwLock::new(None),
        }
    }

    /// Loads tokens from disk. Returns `Ok(false)` if there is no token file.
    pub fn load(&self) -> DriveResult<bool> {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "no token file");
            return Ok(false);
        }

        let content = fs::read_to_string(&self.path).map_err(|e| {
            DriveError::configuration(format!("failed to read token file: {}", e))
        })?;
        let tokens: TokenInfo = serde_json::from_str(&content).map_err(|e| {
            DriveError::configuration(format!("failed to parse token file: {}", e))
        })?;

        info!(path = %self.path.display(), "loaded tokens");
        *self.tokens.write().unwrap() = Some(tokens);
        Ok(true)
    }

    fn write_file(&self, tokens: &TokenInfo) -> DriveResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                DriveError::configuration(format!("failed to create token directory: {}", e))
            })?;
        }

        let temp_path = self.path.with_extension("json.tmp");
        let content = serde_json::to_string_pretty(tokens)
            .map_err(|e| DriveError::internal(format!("failed to serialize tokens: {}", e)))?;

        fs::write(&temp_path, content).map_err(|e| {
            DriveError::configuration(format!("failed to write token file: {}", e))
        })?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let _ = fs::set_permissions(&temp_path, fs::Permissions::from_mode(0o600));
        }

        fs::rename(&temp_path, &self.path).map_err(|e| {
            DriveError::configuration(format!("failed to rename token file: {}", e))
        })?;

        debug!(path = %self.path.display(), "saved tokens");
        Ok(())
    }

    /// Returns a copy of the current tokens.
    pub fn get(&self) -> Option<TokenInfo> {
        self.tokens.read().unwrap().clone()
    }

    /// Replaces the tokens and writes them to disk.
    ///
    /// The in-memory copy is replaced even when the write fails, so later
    /// refreshes still have a bundle to merge into.
    pub fn set(&self, tokens: TokenInfo) -> DriveResult<()> {
        *self.tokens.write().unwrap() = Some(tokens.clone());
        self.write_file(&tokens)
    }

    /// Merges a refresh into the stored bundle and writes it to disk.
    pub fn merge_refresh(&self, refresh: &TokenRefresh) -> DriveResult<()> {
        let mut guard = self.tokens.write().unwrap();
        let tokens = guard
            .as_mut()
            .ok_or_else(|| DriveError::internal("no tokens to update"))?;
        tokens.apply_refresh(refresh);
        let snapshot = tokens.clone();
        drop(guard);
        self.write_file(&snapshot)
    }

    /// Removes the tokens from memory and disk.
    pub fn clear(&self) -> DriveResult<()> {
        *self.tokens.write().unwrap() = None;
        if self.path.exists() {
            fs::remove_file(&self.path).map_err(|e| {
                DriveError::configuration(format!("failed to remove token file: {}", e))
            })?;
            info!(path = %self.path.display(), "cleared tokens");
        }
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn has_refresh_token(&self) -> bool {
        self.tokens
            .read()
            .unwrap()
            .as_ref()
            .is_some_and(|t| t.refresh_token.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bundle() -> TokenInfo {
        TokenInfo::new(
            "access-1",
            Some("refresh-1".to_string()),
            Some(3600),
            "https://www.googleapis.com/auth/drive",
            Some("Bearer".to_string()),
        )
    }

    fn refresh(access: &str, refresh_token: Option<&str>) -> TokenRefresh {
        TokenRefresh {
            access_token: access.to_string(),
            refresh_token: refresh_token.map(String::from),
            expires_in: Some(3599),
            scope: None,
            token_type: None,
        }
    }

    #[test]
    fn token_expiry() {
        let mut token = bundle();
        assert!(!token.is_expired());
        token.expiry = Some(Utc::now() - Duration::hours(1));
        assert!(token.is_expired());
        token.expiry = None;
        assert!(!token.is_expired());
    }

    #[test]
    fn token_scopes() {
        let token = TokenInfo::new("a", None, None, "scope1 scope2", None);
        assert!(token.has_scopes(&["scope2".to_string()]));
        assert!(!token.has_scopes(&["scope3".to_string()]));
    }

    #[test]
    fn refresh_without_refresh_token_keeps_old_one() {
        let mut token = bundle();
        token.apply_refresh(&refresh("access-2", None));
        assert_eq!(token.access_token, "access-2");
        assert_eq!(token.refresh_token.as_deref(), Some("refresh-1"));
        assert_eq!(token.token_type.as_deref(), Some("Bearer"));
    }

    #[test]
    fn refresh_with_refresh_token_replaces_it() {
        let mut token = bundle();
        token.apply_refresh(&refresh("access-2", Some("refresh-2")));
        assert_eq!(token.refresh_token.as_deref(), Some("refresh-2"));
    }

    #[test]
    fn storage_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data").join("token.json");

        let storage = TokenStorage::new(&path);
        storage.set(bundle()).unwrap();
        assert!(path.exists());

        let reopened = TokenStorage::new(&path);
        assert!(reopened.load().unwrap());
        assert_eq!(reopened.get().unwrap().access_token, "access-1");
        assert!(reopened.has_refresh_token());
    }

    #[cfg(unix)]
    #[test]
    fn storage_file_is_private() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token.json");

        TokenStorage::new(&path).set(bundle()).unwrap();
        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn merge_refresh_persists_and_preserves_refresh_token() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token.json");

        let storage = TokenStorage::new(&path);
        storage.set(bundle()).unwrap();
        storage.merge_refresh(&refresh("access-2", None)).unwrap();

        let on_disk: TokenInfo =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(on_disk.access_token, "access-2");
        assert_eq!(on_disk.refresh_token.as_deref(), Some("refresh-1"));
    }

    #[test]
    fn failed_write_still_keeps_tokens_for_refreshes() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, "").unwrap();
        let path = blocker.join("token.json");

        let storage = TokenStorage::new(&path);
        assert!(storage.set(bundle()).is_err());
        assert_eq!(storage.get().unwrap().access_token, "access-1");

        // Once the directory is writable the next refresh lands on disk whole.
        fs::remove_file(&blocker).unwrap();
        storage.merge_refresh(&refresh("access-2", None)).unwrap();

        let on_disk: TokenInfo =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(on_disk.access_token, "access-2");
        assert_eq!(on_disk.refresh_token.as_deref(), Some("refresh-1"));
    }

    #[test]
    fn merge_refresh_without_tokens_fails() {
        let dir = tempfile::tempdir().unwrap();
        let storage = TokenStorage::new(dir.path().join("token.json"));
        assert!(storage.merge_refresh(&refresh("a", None)).is_err());
    }

    #[test]
    fn storage_clear_and_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token.json");
        let storage = TokenStorage::new(&path);
        assert!(!storage.load().unwrap());

        storage.set(bundle()).unwrap();
        storage.clear().unwrap();
        assert!(!path.exists());
        assert!(storage.get().is_none());
    }

    #[test]
    fn corrupt_token_file_is_a_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token.json");
        fs::write(&path, "{").unwrap();

        let err = TokenStorage::new(&path).load().unwrap_err();
        assert_eq!(err.code(), crate::DriveErrorCode::ConfigurationError);
    }
}
