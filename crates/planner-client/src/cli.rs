//! Command-line interface definition.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// koci-planner - a to-do list synced through Google Drive
#[derive(Debug, Parser)]
#[command(name = "koci-planner")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(long, short, env = "KOCI_PLANNER_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug output
    #[arg(long, short = 'v', global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Add a task
    Add {
        /// Task text
        #[arg(required = true, num_args = 1..)]
        text: Vec<String>,
    },

    /// List tasks
    List {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Mark a task as done
    Check { id: String },

    /// Mark a task as not done
    Uncheck { id: String },

    /// Flip a task's done state
    Toggle { id: String },

    /// Delete a task
    Delete { id: String },

    /// Sign in to Google Drive
    Login {
        /// OAuth client ID (from Google Cloud Console)
        #[arg(long, env = "GOOGLE_CLIENT_ID")]
        client_id: Option<String>,

        /// OAuth client secret (from Google Cloud Console)
        #[arg(long, env = "GOOGLE_CLIENT_SECRET")]
        client_secret: Option<String>,

        /// Path to Google Cloud Console credentials JSON file
        ///
        /// Alternative to providing client_id and client_secret separately.
        #[arg(long, env = "GOOGLE_CREDENTIALS_FILE")]
        credentials_file: Option<PathBuf>,

        /// Sign in again even if a stored login exists
        #[arg(long, short)]
        force: bool,

        /// Print the consent URL instead of opening a browser
        #[arg(long)]
        no_browser: bool,
    },

    /// Upload the local tasks to Google Drive
    Save,

    /// Replace the local tasks with the ones on Google Drive
    Load,

    /// Forget the stored Google login
    Logout,

    /// Show sign-in and storage status
    Status,

    /// Configuration commands
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Configuration actions.
#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// Dump current configuration
    Dump,

    /// Show configuration file path
    Path,
}
