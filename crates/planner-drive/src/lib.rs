//! Google sign-in and Drive sync for the planner.
//!
//! - [`AuthFlow`] - interactive OAuth consent, token restore and sign-out
//! - [`CredentialProvider`] - bearer tokens with silent refresh
//! - [`DriveSync`] - load and save the task list file
//! - [`DriveBackend`] - dispatches [`planner_core::UiCommand`]s
//!
//! # Architecture
//!
//! ```text
//!  UiCommand ──► DriveBackend ──► AuthFlow ──► ConsentWindow / TokenExchanger
//!                     │               │
//!                     ▼               ▼
//!                 DriveSync     CredentialProvider ──► refresh persister ──► TokenStorage
//!                     │               ▲
//!                     ▼               │
//!               FileLocator ──► DriveClient
//! ```

use std::future::Future;
use std::pin::Pin;

pub mod backend;
pub mod client;
pub mod config;
pub mod credentials;
pub mod error;
pub mod flow;
pub mod locator;
pub mod oauth;
pub mod sync;
pub mod tokens;

/// A boxed future, used to keep the Drive and OAuth traits object-safe.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub use backend::{DriveBackend, LOGIN_REQUIRED_MESSAGE};
pub use client::{DriveApi, DriveClient, FileRecord, ListQuery};
pub use config::{DriveConfig, Endpoints, OAuthCredentials};
pub use credentials::{CredentialProvider, spawn_refresh_persister};
pub use error::{DriveError, DriveErrorCode, DriveResult};
pub use flow::{AuthFlow, AuthFlowParts, ConsentSettings, LoginOutcome};
pub use locator::FileLocator;
pub use oauth::{
    CodeGrant, ConsentOutcome, ConsentWindow, LoopbackWindow, OAuthClient, PkceFlow, Redirect,
    TokenExchanger,
};
pub use sync::{DriveSync, SyncError};
pub use tokens::{TokenInfo, TokenRefresh, TokenStorage};
