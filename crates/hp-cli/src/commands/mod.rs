//! CLI command implementations

mod config;
mod remote;
mod secret;
mod servers;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};

use hp_core::config::{self as core_config, HpymonConfig};
use hp_core::KeyringStore;
use hp_remote::RemoteClient;

pub use config::{config_init, config_show};
pub use remote::{check_command, jobs_command, kill_command, send_command};
pub use secret::secret_set_command;
pub use servers::servers_command;

/// Configuration file in use: the explicit path or the default location
pub fn config_file(config_path: Option<&PathBuf>) -> PathBuf {
    config_path
        .cloned()
        .unwrap_or_else(core_config::default_config_path)
}

/// Load and validate the configuration file
pub fn load_settings(config_path: Option<&PathBuf>) -> Result<HpymonConfig> {
    let path = config_file(config_path);
    load_settings_from(&path)
}

fn load_settings_from(path: &Path) -> Result<HpymonConfig> {
    let config: HpymonConfig = core_config::load_config(path)
        .with_context(|| format!("Failed to load config from {:?}", path))?;
    config
        .validate()
        .with_context(|| format!("Invalid configuration in {:?}", path))?;
    Ok(config)
}

/// SSH client over the system keyring
pub fn remote_client(config: &HpymonConfig) -> Result<RemoteClient> {
    let client = RemoteClient::from_config(config, Arc::new(KeyringStore::new()))?;
    Ok(client)
}
