//! Process-scoped session state.
//!
//! One [`SessionState`] exists per process. It starts unauthenticated and
//! idle, and is mutated only by the auth flow and the sync backend, which
//! receive it as a [`SharedSession`].

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::RwLock;

use crate::task::Task;

/// Phase of the OAuth authorization flow.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum AuthPhase {
    /// No flow running.
    #[default]
    Idle,
    /// Consent page shown, waiting for the redirect.
    AwaitingConsent,
    /// Authorization code received, exchanging it for tokens.
    ExchangingCode,
    /// Tokens obtained and installed.
    Authenticated,
    /// The last attempt failed. Accepts a new attempt like `Idle`.
    Failed(String),
}

impl AuthPhase {
    /// Returns true while a consent or exchange step is pending.
    pub fn is_in_progress(&self) -> bool {
        matches!(self, Self::AwaitingConsent | Self::ExchangingCode)
    }

    /// Returns a short name for logging.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::AwaitingConsent => "awaiting_consent",
            Self::ExchangingCode => "exchanging_code",
            Self::Authenticated => "authenticated",
            Self::Failed(_) => "failed",
        }
    }

    /// Starts a new attempt.
    pub fn begin(&mut self) -> Result<(), TransitionError> {
        match self {
            Self::Idle | Self::Authenticated | Self::Failed(_) => {
                *self = Self::AwaitingConsent;
                Ok(())
            }
            _ => Err(self.invalid("begin")),
        }
    }

    /// The redirect carried an authorization code.
    pub fn code_received(&mut self) -> Result<(), TransitionError> {
        match self {
            Self::AwaitingConsent => {
                *self = Self::ExchangingCode;
                Ok(())
            }
            _ => Err(self.invalid("code_received")),
        }
    }

    /// The consent window closed without a code.
    pub fn cancelled(&mut self) -> Result<(), TransitionError> {
        match self {
            Self::AwaitingConsent => {
                *self = Self::Idle;
                Ok(())
            }
            _ => Err(self.invalid("cancelled")),
        }
    }

    /// The code exchange produced tokens.
    pub fn succeeded(&mut self) -> Result<(), TransitionError> {
        match self {
            Self::ExchangingCode => {
                *self = Self::Authenticated;
                Ok(())
            }
            _ => Err(self.invalid("succeeded")),
        }
    }

    /// The attempt failed.
    pub fn failed(&mut self, reason: impl Into<String>) -> Result<(), TransitionError> {
        match self {
            Self::AwaitingConsent | Self::ExchangingCode => {
                *self = Self::Failed(reason.into());
                Ok(())
            }
            _ => Err(self.invalid("failed")),
        }
    }

    fn invalid(&self, transition: &'static str) -> TransitionError {
        TransitionError {
            from: self.as_str(),
            transition,
        }
    }
}

impl fmt::Display for AuthPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Failed(reason) => write!(f, "failed: {}", reason),
            other => f.write_str(other.as_str()),
        }
    }
}

/// An auth transition that is not allowed from the current phase.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid auth transition `{transition}` from phase {from}")]
pub struct TransitionError {
    pub from: &'static str,
    pub transition: &'static str,
}

/// Session flags and caches for the running process.
#[derive(Debug)]
pub struct SessionState {
    is_authenticated: bool,
    auth_phase: AuthPhase,
    remote_tasks: Vec<Task>,
    last_remote_sync: Option<DateTime<Utc>>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionState {
    /// Creates a fresh, unauthenticated session.
    pub fn new() -> Self {
        Self {
            is_authenticated: false,
            auth_phase: AuthPhase::Idle,
            remote_tasks: Vec::new(),
            last_remote_sync: None,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.is_authenticated
    }

    pub fn set_authenticated(&mut self, value: bool) {
        self.is_authenticated = value;
    }

    /// Returns true while a login flow is running.
    pub fn is_authenticating(&self) -> bool {
        self.auth_phase.is_in_progress()
    }

    pub fn auth_phase(&self) -> &AuthPhase {
        &self.auth_phase
    }

    /// Mutable access to the phase for the auth flow's transitions.
    pub fn auth_phase_mut(&mut self) -> &mut AuthPhase {
        &mut self.auth_phase
    }

    /// Tasks from the last successful remote load or save.
    pub fn remote_tasks(&self) -> &[Task] {
        &self.remote_tasks
    }

    pub fn last_remote_sync(&self) -> Option<DateTime<Utc>> {
        self.last_remote_sync
    }

    /// Records the list as last seen on the remote side.
    pub fn set_remote_tasks(&mut self, tasks: Vec<Task>) {
        self.remote_tasks = tasks;
        self.last_remote_sync = Some(Utc::now());
    }
}

/// Session shared between the auth flow, the backend and the surface.
pub type SharedSession = Arc<RwLock<SessionState>>;

/// Creates a new shared session.
pub fn new_shared_session() -> SharedSession {
    Arc::new(RwLock::new(SessionState::new()))
}
