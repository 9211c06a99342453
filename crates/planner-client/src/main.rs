//! koci-planner CLI entry point.

use std::process::ExitCode;

use clap::Parser;

use planner_client::cli::{Cli, Command, ConfigAction};
use planner_client::commands::{self, drive::LoginArgs};
use planner_client::config::ClientConfig;
use planner_client::error::{ClientError, ClientResult};
use planner_core::{FileStore, TodoMirror, TracingConfig, init_tracing};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(ClientConfig::default_path);
    let config = if cli.config.is_some() {
        ClientConfig::load_from(&config_path)
    } else {
        ClientConfig::load()
    };
    let config = match config {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {}", ClientError::Config(e));
            return ExitCode::FAILURE;
        }
    };

    let tracing_config = if cli.debug || config.debug {
        TracingConfig::cli_debug()
    } else {
        TracingConfig::cli()
    };
    if let Err(e) = init_tracing(tracing_config) {
        eprintln!("warning: {}", e);
    }

    match run(cli, &config, &config_path).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli, config: &ClientConfig, config_path: &std::path::Path) -> ClientResult<()> {
    let mirror = TodoMirror::new(FileStore::new(config.store_path()));

    let Some(command) = cli.command else {
        return commands::tasks::list(&mirror, false);
    };

    match command {
        Command::Add { text } => commands::tasks::add(&mirror, &text).map(drop),
        Command::List { json } => commands::tasks::list(&mirror, json),
        Command::Check { id } => commands::tasks::set_checked(&mirror, &id, true).map(drop),
        Command::Uncheck { id } => commands::tasks::set_checked(&mirror, &id, false).map(drop),
        Command::Toggle { id } => commands::tasks::toggle(&mirror, &id).map(drop),
        Command::Delete { id } => commands::tasks::delete(&mirror, &id).map(drop),
        Command::Login {
            client_id,
            client_secret,
            credentials_file,
            force,
            no_browser,
        } => {
            let args = LoginArgs {
                client_id,
                client_secret,
                credentials_file,
                force,
                no_browser,
            };
            commands::drive::login(args, config, config_path, &mirror).await
        }
        Command::Save => commands::drive::save(config, &mirror).await,
        Command::Load => commands::drive::load(config, &mirror).await,
        Command::Logout => commands::drive::logout(config).await,
        Command::Status => commands::drive::status(config, config_path, &mirror).await,
        Command::Config { action } => match action {
            ConfigAction::Dump => commands::config::dump(config, config_path),
            ConfigAction::Path => commands::config::path(config, config_path),
        },
    }
}
