//! Configuration commands.

use std::path::Path;

use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};

/// Dump the current configuration to stdout.
pub fn dump(config: &ClientConfig, path: &Path) -> ClientResult<()> {
    let toml_str = toml::to_string_pretty(config)
        .map_err(|e| ClientError::Config(format!("failed to serialize config: {}", e)))?;
    println!("# config.toml ({})", path.display());
    println!("{}", toml_str);
    Ok(())
}

/// Show the configuration, store and token paths.
pub fn path(config: &ClientConfig, path: &Path) -> ClientResult<()> {
    println!("config: {}", path.display());
    println!("store:  {}", config.store_path().display());
    println!("token:  {}", config.token_path().display());
    Ok(())
}
