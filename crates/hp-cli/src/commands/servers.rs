//! Servers command implementation

use std::path::PathBuf;

use anyhow::Result;

use hp_core::ServerRegistry;

use super::load_settings;
use crate::output::format_servers;

/// List configured servers with their tunnel paths
pub fn servers_command(config_path: Option<&PathBuf>, json: bool) -> Result<()> {
    let config = load_settings(config_path)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&config.servers)?);
        return Ok(());
    }

    let registry = ServerRegistry::from_servers(config.servers)?;
    println!("{}", format_servers(&registry));
    Ok(())
}
