//! Google sign-in and Drive sync commands.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use planner_core::{
    EventBridge, KeyValueStore, Subscription, TodoMirror, UiCommand, new_shared_session,
};
use planner_drive::{
    DriveBackend, DriveConfig, LoginOutcome, LoopbackWindow, OAuthCredentials, TokenStorage,
};
use tracing::info;

use crate::config::{ClientConfig, GoogleSettings};
use crate::error::{ClientError, ClientResult};
use crate::surface::{SurfaceReport, TerminalSurface};

/// A backend wired to a fresh session, with the terminal as its surface.
struct Connection {
    backend: DriveBackend,
    events: Subscription,
}

impl Connection {
    fn open(drive_config: &DriveConfig, no_browser: bool) -> ClientResult<Self> {
        let bridge = EventBridge::new();
        let events = bridge.attach();
        let mut window =
            LoopbackWindow::new(drive_config.loopback_port_range, drive_config.consent_timeout);
        if no_browser {
            window = window.without_browser();
        }
        let backend = DriveBackend::from_config_with_window(
            drive_config,
            Arc::new(window),
            new_shared_session(),
            bridge,
        )?;
        Ok(Self { backend, events })
    }

    fn from_config(config: &ClientConfig) -> ClientResult<Self> {
        let google = config.google.clone().unwrap_or_default();
        let credentials = google.resolve_credentials().map_err(ClientError::Config)?;
        Self::open(&google.to_drive_config(credentials), false)
    }

    /// Restores the stored login or fails with a hint to sign in.
    async fn require_login(&self) -> ClientResult<()> {
        if self.backend.restore().await {
            return Ok(());
        }
        Err(ClientError::AuthRequired(
            "no valid Google login, run `koci-planner login` first".to_string(),
        ))
    }

    fn pump<S: KeyValueStore>(&mut self, mirror: &TodoMirror<S>, desktop: bool) -> SurfaceReport {
        TerminalSurface::new(mirror, desktop).pump(&mut self.events)
    }
}

/// Login arguments from the command line.
#[derive(Debug, Default)]
pub struct LoginArgs {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub credentials_file: Option<PathBuf>,
    pub force: bool,
    pub no_browser: bool,
}

/// Run the Google sign-in flow.
///
/// Credentials given on the command line are persisted to `config.toml`
/// once the login succeeds.
pub async fn login<S: KeyValueStore>(
    args: LoginArgs,
    config: &ClientConfig,
    config_path: &Path,
    mirror: &TodoMirror<S>,
) -> ClientResult<()> {
    let google = config.google.clone().unwrap_or_default();
    let (credentials, source) = resolve_google_credentials(
        args.client_id,
        args.client_secret,
        args.credentials_file,
        &google,
    )?;
    let drive_config = google.to_drive_config(credentials.clone());
    drive_config
        .credentials
        .validate()
        .map_err(|e| ClientError::Config(format!("invalid Google credentials: {}", e)))?;

    let mut conn = Connection::open(&drive_config, args.no_browser)?;

    if !args.force && conn.backend.restore().await {
        conn.pump(mirror, false);
        save_credentials_to_config(config_path, &credentials, source);
        println!("Already logged in to Google Drive.");
        println!("Use --force to log in again.");
        conn.backend.shutdown().await;
        return Ok(());
    }

    println!("Starting Google Drive login...");
    println!("A browser window will open for you to authorize access.");
    println!();

    let outcome = conn.backend.login().await;
    conn.pump(mirror, config.notifications.desktop);
    conn.backend.shutdown().await;

    match outcome {
        LoginOutcome::Authenticated => {
            save_credentials_to_config(config_path, &credentials, source);
            info!("Google login successful");
            Ok(())
        }
        LoginOutcome::Cancelled => {
            println!("Login cancelled.");
            Ok(())
        }
        LoginOutcome::AlreadyInProgress => Ok(()),
        LoginOutcome::Failed(reason) => Err(ClientError::Drive(reason)),
    }
}

/// Upload the local tasks.
pub async fn save<S: KeyValueStore>(
    config: &ClientConfig,
    mirror: &TodoMirror<S>,
) -> ClientResult<()> {
    let tasks = mirror.load();
    let mut conn = Connection::from_config(config)?;
    conn.require_login().await?;

    conn.backend.handle(UiCommand::Save(tasks.clone())).await;
    let report = conn.pump(mirror, config.notifications.desktop);
    conn.backend.shutdown().await;

    // Keep the local copy in the same shape as what was uploaded.
    mirror.save(&tasks)?;

    match report.save {
        Some(status) if !status.success => Err(ClientError::Drive(
            status.error.unwrap_or_else(|| "save failed".to_string()),
        )),
        _ => Ok(()),
    }
}

/// Replace the local tasks with the remote ones.
pub async fn load<S: KeyValueStore>(
    config: &ClientConfig,
    mirror: &TodoMirror<S>,
) -> ClientResult<()> {
    let mut conn = Connection::from_config(config)?;
    conn.require_login().await?;

    conn.backend.handle(UiCommand::Load).await;
    let report = conn.pump(mirror, config.notifications.desktop);
    conn.backend.shutdown().await;

    if report.loaded.is_none() {
        println!("No todos found on Google Drive.");
    }
    Ok(())
}

/// Forget the stored login.
pub async fn logout(config: &ClientConfig) -> ClientResult<()> {
    let configured = config.google.as_ref().is_some_and(GoogleSettings::has_credentials);
    if configured {
        let conn = Connection::from_config(config)?;
        conn.backend.logout().await?;
        conn.backend.shutdown().await;
    } else {
        TokenStorage::new(config.token_path()).clear()?;
    }
    println!("Logged out of Google Drive.");
    Ok(())
}

/// Show where things are stored and whether a login is available.
pub async fn status<S: KeyValueStore>(
    config: &ClientConfig,
    config_path: &Path,
    mirror: &TodoMirror<S>,
) -> ClientResult<()> {
    let tasks = mirror.load();
    let done = tasks.iter().filter(|t| t.is_checked).count();

    println!("config:  {}", config_path.display());
    println!("store:   {}", config.store_path().display());
    println!("tasks:   {} ({} done)", tasks.len(), done);

    let token_path = config.token_path();
    let google = config.google.clone().unwrap_or_default();
    if !google.has_credentials() {
        println!("google:  not configured");
        return Ok(());
    }

    let conn = Connection::from_config(config)?;
    let signed_in = conn.backend.restore().await;
    conn.backend.shutdown().await;
    println!("token:   {}", token_path.display());
    println!(
        "google:  {}",
        if signed_in { "logged in" } else { "not logged in" }
    );
    Ok(())
}

/// Where the credentials were resolved from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CredentialSource {
    /// From CLI flags (--client-id/--client-secret or --credentials-file)
    Cli,
    /// From config.toml (already persisted)
    Config,
}

/// Resolves Google credentials.
///
/// Priority (highest to lowest):
/// 1. CLI `--client-id` + `--client-secret`
/// 2. CLI `--credentials-file` (Google Cloud Console JSON)
/// 3. `config.toml` `[google]` section
fn resolve_google_credentials(
    cli_client_id: Option<String>,
    cli_client_secret: Option<String>,
    cli_credentials_file: Option<PathBuf>,
    google: &GoogleSettings,
) -> ClientResult<(OAuthCredentials, CredentialSource)> {
    if let (Some(id), Some(secret)) = (&cli_client_id, &cli_client_secret) {
        return Ok((OAuthCredentials::new(id, secret), CredentialSource::Cli));
    }

    if let Some(ref path) = cli_credentials_file {
        let creds = OAuthCredentials::from_file(path).map_err(|e| {
            ClientError::Config(format!(
                "failed to load credentials from {}: {}",
                path.display(),
                e
            ))
        })?;
        return Ok((creds, CredentialSource::Cli));
    }

    if google.has_credentials() {
        let creds = google.resolve_credentials().map_err(ClientError::Config)?;
        return Ok((creds, CredentialSource::Config));
    }

    if cli_client_id.is_some() || cli_client_secret.is_some() {
        return Err(ClientError::Config(
            "both --client-id and --client-secret are required when providing credentials directly"
                .to_string(),
        ));
    }

    Err(ClientError::Config(format!(
        "Google credentials are required. Provide via:\n  \
         - client_id + client_secret in {}\n  \
         - --client-id and --client-secret flags\n  \
         - --credentials-file flag (path to Google Cloud Console JSON)\n  \
         - GOOGLE_CLIENT_ID and GOOGLE_CLIENT_SECRET env vars",
        ClientConfig::default_path().display()
    )))
}

/// Writes CLI-supplied credentials into the `[google]` table of `config.toml`,
/// keeping the rest of the file as is.
fn save_credentials_to_config(
    config_path: &Path,
    credentials: &OAuthCredentials,
    source: CredentialSource,
) {
    if source == CredentialSource::Config {
        return;
    }

    match write_credentials(config_path, credentials) {
        Ok(()) => println!("Credentials saved to {}", config_path.display()),
        Err(e) => info!(
            path = %config_path.display(),
            error = %e,
            "could not save credentials"
        ),
    }
}

fn write_credentials(config_path: &Path, credentials: &OAuthCredentials) -> Result<(), String> {
    let content = if config_path.exists() {
        std::fs::read_to_string(config_path).map_err(|e| e.to_string())?
    } else {
        String::new()
    };

    let mut doc = content
        .parse::<toml_edit::DocumentMut>()
        .map_err(|e| format!("could not parse config.toml for writing: {}", e))?;

    if !doc.contains_key("google") {
        doc["google"] = toml_edit::Item::Table(toml_edit::Table::new());
    }
    let google = doc["google"]
        .as_table_mut()
        .ok_or_else(|| "[google] is not a table".to_string())?;
    google["client_id"] = toml_edit::value(credentials.client_id.as_str());
    google["client_secret"] = toml_edit::value(credentials.client_secret.as_str());

    if let Some(parent) = config_path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| e.to_string())?;
    }
    std::fs::write(config_path, doc.to_string()).map_err(|e| e.to_string())
}
