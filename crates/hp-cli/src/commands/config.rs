//! Config command implementations

use std::path::PathBuf;

use anyhow::{Context, Result};

use hp_core::config::{self, HpymonConfig};

use super::config_file;
use crate::output::{print_error, print_info, print_success, print_warning};

/// Show current configuration
pub fn config_show(config_path: Option<&PathBuf>) -> Result<()> {
    let path = config_file(config_path);

    if !path.exists() {
        print_warning(&format!("No configuration file found at {:?}", path));
        print_info("Run 'hpymon config init' to create one");
        return Ok(());
    }

    print_info(&format!("Configuration file: {:?}", path));
    println!();

    let config: HpymonConfig = config::load_config(&path)
        .with_context(|| format!("Failed to load config from {:?}", path))?;
    if let Err(e) = config.validate() {
        print_warning(&format!("Configuration is not valid: {}", e));
    }

    println!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}

/// Write a starter configuration
pub fn config_init(config_path: Option<&PathBuf>, force: bool) -> Result<()> {
    let path = config_file(config_path);

    if path.exists() && !force {
        print_error(&format!("Config file already exists: {:?}", path));
        print_info("Use --force to overwrite");
        return Ok(());
    }

    config::save_config(&path, &config::sample_config())
        .with_context(|| format!("Failed to write config file: {:?}", path))?;

    print_success(&format!("Created configuration file: {:?}", path));
    print_info("Edit the [[servers]] entries, then run 'hpymon check <server>'");
    Ok(())
}
