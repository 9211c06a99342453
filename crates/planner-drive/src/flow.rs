//! Interactive sign-in, token restore and sign-out.
//!
//! The session's [`AuthPhase`] is the re-entrancy guard: a login started
//! while another one waits for consent or exchanges its code is ignored.

use std::sync::{Arc, Mutex};

use planner_core::{AuthPhase, EventBridge, SharedSession, TransitionError, UiEvent};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::credentials::{CredentialProvider, spawn_refresh_persister};
use crate::error::{DriveError, DriveResult};
use crate::oauth::{CodeGrant, ConsentWindow, PkceFlow, TokenExchanger};
use crate::sync::DriveSync;
use crate::tokens::{TokenInfo, TokenRefresh, TokenStorage};

pub const LOGIN_SUCCESS_MESSAGE: &str = "Logged in to Google Drive successfully!";
pub const LOADED_MESSAGE: &str = "Loaded todos from Google Drive";
const LOGIN_FAILED_PREFIX: &str = "Authentication not successful";

/// How a login attempt ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginOutcome {
    Authenticated,
    /// The consent window closed or consent was denied.
    Cancelled,
    /// Another attempt is still running; nothing was done.
    AlreadyInProgress,
    Failed(String),
}

/// Values used to build the consent URL.
#[derive(Debug, Clone)]
pub struct ConsentSettings {
    pub auth_url: String,
    pub client_id: String,
    pub scopes: Vec<String>,
}

/// Everything the auth flow drives.
pub struct AuthFlowParts {
    pub settings: ConsentSettings,
    pub window: Arc<dyn ConsentWindow>,
    pub exchanger: Arc<dyn TokenExchanger>,
    pub credentials: Arc<CredentialProvider>,
    pub refresh_rx: mpsc::UnboundedReceiver<TokenRefresh>,
    pub storage: Arc<TokenStorage>,
    pub session: SharedSession,
    pub bridge: EventBridge,
    pub sync: Arc<DriveSync>,
}

/// Runs the OAuth consent flow and keeps the session and credentials in step.
pub struct AuthFlow {
    settings: ConsentSettings,
    window: Arc<dyn ConsentWindow>,
    exchanger: Arc<dyn TokenExchanger>,
    credentials: Arc<CredentialProvider>,
    storage: Arc<TokenStorage>,
    session: SharedSession,
    bridge: EventBridge,
    sync: Arc<DriveSync>,
    refresh_rx: Mutex<Option<mpsc::UnboundedReceiver<TokenRefresh>>>,
    persister: Mutex<Option<JoinHandle<()>>>,
}

impl AuthFlow {
    pub fn new(parts: AuthFlowParts) -> Self {
        Self {
            settings: parts.settings,
            window: parts.window,
            exchanger: parts.exchanger,
            credentials: parts.credentials,
            storage: parts.storage,
            session: parts.session,
            bridge: parts.bridge,
            sync: parts.sync,
            refresh_rx: Mutex::new(Some(parts.refresh_rx)),
            persister: Mutex::new(None),
        }
    }

    pub fn storage(&self) -> &TokenStorage {
        &self.storage
    }

    /// Runs one interactive login.
    pub async fn login(&self) -> LoginOutcome {
        {
            let mut session = self.session.write().await;
            if let Err(e) = session.auth_phase_mut().begin() {
                info!(phase = %e.from, "login already in progress");
                return LoginOutcome::AlreadyInProgress;
            }
        }

        let pkce = PkceFlow::new();
        let consent_url = |redirect_uri: &str| {
            pkce.consent_url(
                &self.settings.auth_url,
                &self.settings.client_id,
                redirect_uri,
                &self.settings.scopes,
            )
        };

        let outcome = match self.window.present(&consent_url).await {
            Ok(outcome) => outcome,
            Err(e) => return self.fail(e).await,
        };

        let Some(redirect) = outcome.redirect.filter(|r| r.code().is_some()) else {
            info!("consent window closed without an authorization code");
            self.transition(AuthPhase::cancelled).await;
            return LoginOutcome::Cancelled;
        };

        if redirect.state() != Some(pkce.state.as_str()) {
            return self
                .fail(DriveError::authentication("state mismatch in redirect"))
                .await;
        }

        self.transition(AuthPhase::code_received).await;
        let grant = CodeGrant {
            code: redirect.code().unwrap_or_default(),
            verifier: &pkce.verifier,
            redirect_uri: &outcome.redirect_uri,
        };

        match self.exchanger.exchange(grant).await {
            Ok(tokens) => {
                self.complete(tokens).await;
                LoginOutcome::Authenticated
            }
            Err(e) => self.fail(e).await,
        }
    }

    async fn transition(&self, step: impl FnOnce(&mut AuthPhase) -> Result<(), TransitionError>) {
        let mut session = self.session.write().await;
        if let Err(e) = step(session.auth_phase_mut()) {
            warn!(error = %e, "unexpected auth transition");
        }
    }

    async fn fail(&self, error: DriveError) -> LoginOutcome {
        let reason = error.message().to_string();
        warn!(error = %error, "login failed");
        self.transition(|phase| phase.failed(reason.clone())).await;
        self.bridge.emit(UiEvent::notification(format!(
            "{}: {}",
            LOGIN_FAILED_PREFIX, reason
        )));
        LoginOutcome::Failed(reason)
    }

    async fn complete(&self, tokens: TokenInfo) {
        {
            let mut session = self.session.write().await;
            if let Err(e) = session.auth_phase_mut().succeeded() {
                warn!(error = %e, "unexpected auth transition");
            }
            session.set_authenticated(true);
        }

        self.credentials.install(tokens.clone()).await;
        self.ensure_persister();
        if let Err(e) = self.storage.set(tokens) {
            warn!(error = %e, "failed to persist tokens; login lasts for this run only");
        }

        info!("logged in to Google Drive");
        self.bridge.emit(UiEvent::AuthenticationStatus(true));
        self.bridge.emit(UiEvent::notification(LOGIN_SUCCESS_MESSAGE));

        match self.sync.load().await {
            Ok(Some(tasks)) => {
                self.session.write().await.set_remote_tasks(tasks.clone());
                self.bridge.emit(UiEvent::notification(LOADED_MESSAGE));
                self.bridge.emit(UiEvent::LoadedTodos(tasks));
            }
            Ok(None) => debug!("nothing to load after login"),
            Err(e) => warn!(error = %e, "failed to load todos after login"),
        }
    }

    fn ensure_persister(&self) {
        let Ok(mut handle) = self.persister.lock() else {
            return;
        };
        if handle.is_some() {
            return;
        }
        let rx = self.refresh_rx.lock().ok().and_then(|mut rx| rx.take());
        if let Some(rx) = rx {
            *handle = Some(spawn_refresh_persister(rx, self.storage.clone()));
        }
    }

    /// Reinstates the stored token, if there is a usable one.
    ///
    /// Returns true when the session is now authenticated.
    pub async fn restore(&self) -> bool {
        match self.storage.load() {
            Ok(true) => {}
            Ok(false) => return false,
            Err(e) => {
                warn!(error = %e, "ignoring unreadable token file");
                return false;
            }
        }

        let Some(tokens) = self.storage.get() else {
            return false;
        };
        if !tokens.has_scopes(&self.settings.scopes) {
            info!("stored token lacks the required scopes, sign in again");
            return false;
        }
        if tokens.is_expired() && tokens.refresh_token.is_none() {
            info!("stored token expired and cannot be refreshed, sign in again");
            return false;
        }

        self.credentials.install(tokens).await;
        self.ensure_persister();
        self.session.write().await.set_authenticated(true);
        self.bridge.emit(UiEvent::AuthenticationStatus(true));
        debug!("restored stored token");
        true
    }

    /// Forgets the tokens in memory and on disk.
    pub async fn logout(&self) -> DriveResult<()> {
        self.credentials.clear().await;
        let cleared = self.storage.clear();
        {
            let mut session = self.session.write().await;
            session.set_authenticated(false);
            if !session.is_authenticating() {
                *session.auth_phase_mut() = AuthPhase::Idle;
            }
        }
        self.bridge.emit(UiEvent::AuthenticationStatus(false));
        info!("logged out");
        cleared
    }

    /// Stops the refresh persister after it wrote any pending refresh.
    pub async fn shutdown(&self) {
        self.credentials.close_refresh_channel();
        let handle = self.persister.lock().ok().and_then(|mut h| h.take());
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(error = %e, "refresh persister ended abnormally");
            }
        }
    }
}
