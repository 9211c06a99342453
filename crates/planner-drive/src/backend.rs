//! Dispatches display-surface commands to the auth flow and the sync service.

use std::sync::Arc;

use planner_core::{EventBridge, SharedSession, UiCommand, UiEvent};
use tracing::{debug, info, warn};

use crate::client::DriveClient;
use crate::config::DriveConfig;
use crate::credentials::CredentialProvider;
use crate::error::{DriveError, DriveResult};
use crate::flow::{AuthFlow, AuthFlowParts, ConsentSettings, LOADED_MESSAGE, LoginOutcome};
use crate::oauth::{ConsentWindow, LoopbackWindow, OAuthClient};
use crate::sync::DriveSync;
use crate::tokens::TokenStorage;

pub const LOGIN_REQUIRED_MESSAGE: &str = "Please log in to Google Drive first";

/// The Drive side of the application.
pub struct DriveBackend {
    flow: AuthFlow,
    sync: Arc<DriveSync>,
    session: SharedSession,
    bridge: EventBridge,
}

impl DriveBackend {
    /// Wires up the real OAuth client, loopback window and Drive client.
    pub fn from_config(
        config: &DriveConfig,
        session: SharedSession,
        bridge: EventBridge,
    ) -> DriveResult<Self> {
        Self::from_config_with_window(
            config,
            Arc::new(LoopbackWindow::new(
                config.loopback_port_range,
                config.consent_timeout,
            )),
            session,
            bridge,
        )
    }

    /// Like [`DriveBackend::from_config`] with a custom consent window.
    pub fn from_config_with_window(
        config: &DriveConfig,
        window: Arc<dyn ConsentWindow>,
        session: SharedSession,
        bridge: EventBridge,
    ) -> DriveResult<Self> {
        config.validate().map_err(DriveError::configuration)?;

        let exchanger = Arc::new(OAuthClient::new(
            config.credentials.clone(),
            &config.endpoints,
            config.scopes.clone(),
            config.timeout,
        )?);
        let (credentials, refresh_rx) = CredentialProvider::new(exchanger.clone());
        let credentials = Arc::new(credentials);
        let client = DriveClient::new(config.endpoints.clone(), credentials.clone(), config.timeout)?;
        let sync = Arc::new(DriveSync::new(
            Arc::new(client),
            config.file_name.clone(),
            config.page_size,
        ));

        let flow = AuthFlow::new(AuthFlowParts {
            settings: ConsentSettings {
                auth_url: config.endpoints.auth_url.clone(),
                client_id: config.credentials.client_id.clone(),
                scopes: config.scopes.clone(),
            },
            window,
            exchanger,
            credentials,
            refresh_rx,
            storage: Arc::new(TokenStorage::new(&config.token_path)),
            session: session.clone(),
            bridge: bridge.clone(),
            sync: sync.clone(),
        });

        Ok(Self::new(flow, sync, session, bridge))
    }

    pub fn new(flow: AuthFlow, sync: Arc<DriveSync>, session: SharedSession, bridge: EventBridge) -> Self {
        Self {
            flow,
            sync,
            session,
            bridge,
        }
    }

    pub fn flow(&self) -> &AuthFlow {
        &self.flow
    }

    pub fn session(&self) -> &SharedSession {
        &self.session
    }

    /// Handles one command from the display surface.
    pub async fn handle(&self, command: UiCommand) {
        match command {
            UiCommand::Login => {
                let outcome = self.flow.login().await;
                debug!(?outcome, "login finished");
            }
            UiCommand::Save(tasks) => self.save(tasks).await,
            UiCommand::Load => self.load().await,
        }
    }

    /// Runs a login and reports how it ended.
    pub async fn login(&self) -> LoginOutcome {
        self.flow.login().await
    }

    async fn require_login(&self) -> bool {
        if self.session.read().await.is_authenticated() {
            return true;
        }
        info!("not signed in");
        self.bridge.emit(UiEvent::notification(LOGIN_REQUIRED_MESSAGE));
        false
    }

    async fn save(&self, tasks: Vec<planner_core::Task>) {
        if !self.require_login().await {
            return;
        }
        let status = self.sync.upload(&tasks).await;
        if status.success {
            self.session.write().await.set_remote_tasks(tasks);
        }
        self.bridge.emit(UiEvent::SaveStatus(status));
    }

    async fn load(&self) {
        if !self.require_login().await {
            return;
        }
        match self.sync.load().await {
            Ok(Some(tasks)) => {
                self.session.write().await.set_remote_tasks(tasks.clone());
                self.bridge.emit(UiEvent::notification(LOADED_MESSAGE));
                self.bridge.emit(UiEvent::LoadedTodos(tasks));
            }
            Ok(None) => info!(name = %self.sync.file_name(), "no remote task file to load"),
            Err(e) => warn!(error = %e, "failed to load todos"),
        }
    }

    /// Restores a stored login, if any.
    pub async fn restore(&self) -> bool {
        self.flow.restore().await
    }

    pub async fn logout(&self) -> DriveResult<()> {
        self.flow.logout().await
    }

    /// Lets background work finish before exit.
    pub async fn shutdown(&self) {
        self.flow.shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::tests::FakeExchanger;
    use crate::flow::tests::{Consent, harness};
    use crate::locator::tests::FakeDrive;
    use planner_core::{SaveStatus, Subscription, Task};

    const NAME: &str = "koci_planer_todos.json";

    struct Fixture {
        backend: DriveBackend,
        events: Subscription,
        drive: Arc<FakeDrive>,
        _dir: tempfile::TempDir,
    }

    fn fixture(drive: FakeDrive) -> Fixture {
        let h = harness(Consent::Grant, FakeExchanger::default(), drive);
        Fixture {
            backend: DriveBackend::new(h.flow, h.sync, h.session, h.bridge),
            events: h.events,
            drive: h.drive,
            _dir: h._dir,
        }
    }

    #[tokio::test]
    async fn save_requires_login() {
        let Fixture { backend, mut events, drive, _dir } = fixture(FakeDrive::default());

        backend.handle(UiCommand::Save(vec![Task::new("todo-1", "a")])).await;

        assert_eq!(
            events.drain(),
            vec![UiEvent::notification(LOGIN_REQUIRED_MESSAGE)]
        );
        assert!(drive.files.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn login_then_save_then_load() {
        let Fixture { backend, mut events, drive, _dir } = fixture(FakeDrive::default());

        backend.handle(UiCommand::Login).await;
        assert!(backend.session().read().await.is_authenticated());
        events.drain();

        let tasks = vec![Task::new("todo-1", "Buy milk")];
        backend.handle(UiCommand::Save(tasks.clone())).await;
        assert_eq!(events.drain(), vec![UiEvent::SaveStatus(SaveStatus::ok())]);
        assert_eq!(backend.session().read().await.remote_tasks(), tasks.as_slice());

        backend.handle(UiCommand::Load).await;
        assert_eq!(
            events.drain(),
            vec![
                UiEvent::notification(LOADED_MESSAGE),
                UiEvent::LoadedTodos(tasks),
            ]
        );
        assert_eq!(*drive.creates.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn failed_save_reports_status() {
        let Fixture { backend, mut events, drive, _dir } = fixture(FakeDrive::default());
        backend.login().await;
        events.drain();

        *drive.fail_writes.lock().unwrap() = Some("backend error".to_string());
        backend.handle(UiCommand::Save(vec![Task::new("todo-1", "a")])).await;

        match events.drain().as_slice() {
            [UiEvent::SaveStatus(status)] => {
                assert!(!status.success);
                assert!(status.error.as_deref().unwrap().contains("backend error"));
            }
            other => panic!("unexpected events: {:?}", other),
        }
        assert!(backend.session().read().await.remote_tasks().is_empty());
    }

    #[tokio::test]
    async fn load_errors_are_swallowed() {
        let drive = FakeDrive::with_files(&[("f1", NAME, "garbage")]);
        let Fixture { backend, mut events, _dir, .. } = fixture(drive);
        backend.login().await;
        events.drain();

        backend.handle(UiCommand::Load).await;
        assert!(events.drain().is_empty());
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = DriveConfig::new(crate::config::OAuthCredentials::new("bad", "secret"));
        let err = DriveBackend::from_config(
            &config,
            planner_core::new_shared_session(),
            EventBridge::new(),
        )
        .err()
        .unwrap();
        assert_eq!(err.code(), crate::error::DriveErrorCode::ConfigurationError);
    }
}
