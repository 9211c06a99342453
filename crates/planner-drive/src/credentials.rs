//! Shared access-token provider with silent refresh.
//!
//! The provider holds the in-memory token bundle. When a request needs a
//! bearer token and the current one has expired, it refreshes it and sends
//! the refresh to a single persistence task that merges it into the token
//! file.

use std::sync::{Arc, Mutex};

use tokio::sync::{RwLock, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{DriveError, DriveResult};
use crate::oauth::TokenExchanger;
use crate::tokens::{TokenInfo, TokenRefresh, TokenStorage};

/// Provides bearer tokens to the Drive client.
pub struct CredentialProvider {
    tokens: RwLock<Option<TokenInfo>>,
    exchanger: Arc<dyn TokenExchanger>,
    refresh_tx: Mutex<Option<mpsc::UnboundedSender<TokenRefresh>>>,
}

impl std::fmt::Debug for CredentialProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialProvider").finish_non_exhaustive()
    }
}

impl CredentialProvider {
    /// Creates an empty provider and the receiving end of its refresh events.
    pub fn new(
        exchanger: Arc<dyn TokenExchanger>,
    ) -> (Self, mpsc::UnboundedReceiver<TokenRefresh>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let provider = Self {
            tokens: RwLock::new(None),
            exchanger,
            refresh_tx: Mutex::new(Some(tx)),
        };
        (provider, rx)
    }

    /// Installs a freshly obtained or restored bundle.
    pub async fn install(&self, tokens: TokenInfo) {
        *self.tokens.write().await = Some(tokens);
    }

    pub async fn clear(&self) {
        *self.tokens.write().await = None;
    }

    pub async fn is_installed(&self) -> bool {
        self.tokens.read().await.is_some()
    }

    /// Stops sending refresh events; lets the persistence task finish.
    pub fn close_refresh_channel(&self) {
        if let Ok(mut tx) = self.refresh_tx.lock() {
            tx.take();
        }
    }

    /// Returns a usable access token, refreshing it first if it expired.
    pub async fn bearer_token(&self) -> DriveResult<String> {
        {
            let guard = self.tokens.read().await;
            match guard.as_ref() {
                None => return Err(DriveError::authentication("not signed in")),
                Some(tokens) if !tokens.is_expired() => return Ok(tokens.access_token.clone()),
                Some(_) => {}
            }
        }

        // Re-check under the write lock; another caller may have refreshed.
        let mut guard = self.tokens.write().await;
        let tokens = guard
            .as_mut()
            .ok_or_else(|| DriveError::authentication("not signed in"))?;
        if !tokens.is_expired() {
            return Ok(tokens.access_token.clone());
        }

        let refresh_token = tokens.refresh_token.clone().ok_or_else(|| {
            DriveError::authentication("access token expired and no refresh token available")
        })?;

        debug!("access token expired, refreshing");
        let refresh = self.exchanger.refresh(&refresh_token).await?;
        tokens.apply_refresh(&refresh);
        let access_token = tokens.access_token.clone();
        drop(guard);

        self.notify_refresh(refresh);
        Ok(access_token)
    }

    fn notify_refresh(&self, refresh: TokenRefresh) {
        let sent = self
            .refresh_tx
            .lock()
            .ok()
            .and_then(|tx| tx.as_ref().map(|tx| tx.send(refresh).is_ok()))
            .unwrap_or(false);
        if !sent {
            warn!("token refresh not persisted: persistence task is gone");
        }
    }
}

/// Spawns the task that writes refreshes into the token file.
///
/// The task ends once every sender is dropped or closed.
pub fn spawn_refresh_persister(
    mut rx: mpsc::UnboundedReceiver<TokenRefresh>,
    storage: Arc<TokenStorage>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(refresh) = rx.recv().await {
            match storage.merge_refresh(&refresh) {
                Ok(()) => info!(
                    rotated = refresh.refresh_token.is_some(),
                    "persisted refreshed token"
                ),
                Err(e) => warn!(error = %e, "failed to persist refreshed token"),
            }
        }
        debug!("refresh persister stopped");
    })
}
