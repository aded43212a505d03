//! Secret command implementation

use std::io::{BufRead, IsTerminal};
use std::path::PathBuf;

use anyhow::{Context, Result};
use zeroize::Zeroizing;

use super::{load_settings, remote_client};
use crate::output::print_success;

/// Prompt for a password and store it for `server`
///
/// On a terminal the password is read without echo. Piped input supplies
/// the password as its first line.
pub fn secret_set_command(config_path: Option<&PathBuf>, server: &str) -> Result<()> {
    let config = load_settings(config_path)?;
    let client = remote_client(&config)?;

    let stdin = std::io::stdin();
    let secret = if stdin.is_terminal() {
        Zeroizing::new(
            rpassword::prompt_password(format!("Password for '{}': ", server))
                .context("Failed to read password")?,
        )
    } else {
        read_secret(&mut stdin.lock())?
    };

    if secret.is_empty() {
        anyhow::bail!("Empty password, nothing stored");
    }

    client.store_secret(server, &secret)?;
    print_success(&format!(
        "Stored password for '{}' under service '{}'",
        server,
        client.resolver().service()
    ));
    Ok(())
}

/// Read one password line from non-interactive input
fn read_secret(reader: &mut impl BufRead) -> Result<Zeroizing<String>> {
    let secret = rpassword::read_password_from_bufread(reader)
        .context("Failed to read password from stdin")?;
    Ok(Zeroizing::new(secret))
}
