//! Commands that reach a remote server

use std::path::PathBuf;

use anyhow::Result;

use hp_core::{BatchOutput, OutputFlags};

use super::{load_settings, remote_client};
use crate::output::{print_error, print_success};

/// Run commands on a server and print the captured outputs
pub async fn send_command(
    config_path: Option<&PathBuf>,
    server: &str,
    commands: &[String],
    flags: OutputFlags,
) -> Result<()> {
    let config = load_settings(config_path)?;
    let client = remote_client(&config)?;

    match client.send_commands(server, commands.iter().cloned(), flags).await {
        Ok(BatchOutput::Captured(outputs)) => {
            for output in outputs {
                print!("{}", output);
            }
            Ok(())
        }
        Ok(BatchOutput::NoOutput) => {
            print_success(&format!(
                "{} command(s) completed on {}",
                commands.len(),
                server
            ));
            Ok(())
        }
        Err(e) => {
            print_error(&format!("Failed to run commands on {}: {}", server, e));
            Err(e.into())
        }
    }
}

/// Probe a server; returns whether it is reachable
pub async fn check_command(config_path: Option<&PathBuf>, server: &str) -> Result<bool> {
    let config = load_settings(config_path)?;
    let client = remote_client(&config)?;

    if client.registry().get(server).is_none() {
        print_error(&format!("Unknown server: {}", server));
        return Ok(false);
    }

    if client.check_connection(server).await {
        print_success(&format!("{} is reachable", server));
        Ok(true)
    } else {
        print_error(&format!("{} is unreachable (run with -v for details)", server));
        Ok(false)
    }
}

/// Print the raw job listing of a server
pub async fn jobs_command(config_path: Option<&PathBuf>, server: &str) -> Result<()> {
    let config = load_settings(config_path)?;
    let client = remote_client(&config)?;

    match client.fetch_job_list(server).await {
        Ok(listing) => {
            print!("{}", listing);
            Ok(())
        }
        Err(e) => {
            print_error(&format!("Failed to list jobs on {}: {}", server, e));
            Err(e.into())
        }
    }
}

/// Cancel jobs on a server
pub async fn kill_command(
    config_path: Option<&PathBuf>,
    server: &str,
    job_ids: &[String],
) -> Result<()> {
    let config = load_settings(config_path)?;
    let client = remote_client(&config)?;

    match client.kill_jobs(server, job_ids).await {
        Ok(()) => {
            print_success(&format!(
                "Requested cancellation of {} job(s) on {}",
                job_ids.len(),
                server
            ));
            Ok(())
        }
        Err(e) => {
            print_error(&format!("Failed to kill jobs on {}: {}", server, e));
            Err(e.into())
        }
    }
}
