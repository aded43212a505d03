//! HPyMon CLI
//!
//! Runs job-monitoring commands on remote compute hosts, directly or
//! through chains of SSH jump hosts.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use hp_core::OutputFlags;
use hpymon_cli::commands;

#[derive(Parser)]
#[command(name = "hpymon")]
#[command(author, version, about = "Remote job monitor for SSH-reachable compute hosts")]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, env = "HPYMON_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List configured servers and their tunnel paths
    Servers {
        /// Print the server list as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run commands on a server, in order
    Send {
        /// Server name
        server: String,
        /// Commands to run
        #[arg(required = true)]
        commands: Vec<String>,
        /// Discard the output of every command
        #[arg(long, conflicts_with = "flags")]
        no_output: bool,
        /// Per-command capture flags, e.g. true,false,true
        #[arg(long, value_delimiter = ',')]
        flags: Option<Vec<bool>>,
    },

    /// Check whether a server is reachable
    Check {
        /// Server name
        server: String,
    },

    /// Show the job listing of a server
    Jobs {
        /// Server name
        server: String,
    },

    /// Cancel jobs on a server
    Kill {
        /// Server name
        server: String,
        /// Job identifiers to cancel
        #[arg(required = true)]
        job_ids: Vec<String>,
    },

    /// Manage stored passwords
    Secret {
        #[command(subcommand)]
        action: SecretAction,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum SecretAction {
    /// Store the password for a server (prompted without echo)
    Set {
        /// Server name
        server: String,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration
    Show,
    /// Show config file path
    Path,
    /// Write a starter configuration
    Init {
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    let log_level = match (cli.quiet, cli.verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, 2) => "debug",
        (false, _) => "trace",
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| log_level.into()),
        ))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let config = cli.config.as_ref();

    match cli.command {
        Commands::Servers { json } => {
            commands::servers_command(config, json)?;
        }

        Commands::Send {
            server,
            commands: batch,
            no_output,
            flags,
        } => {
            let flags = match (no_output, flags) {
                (true, _) => OutputFlags::All(false),
                (false, Some(flags)) => OutputFlags::PerCommand(flags),
                (false, None) => OutputFlags::All(true),
            };
            commands::send_command(config, &server, &batch, flags).await?;
        }

        Commands::Check { server } => {
            if !commands::check_command(config, &server).await? {
                std::process::exit(1);
            }
        }

        Commands::Jobs { server } => {
            commands::jobs_command(config, &server).await?;
        }

        Commands::Kill { server, job_ids } => {
            commands::kill_command(config, &server, &job_ids).await?;
        }

        Commands::Secret { action } => match action {
            SecretAction::Set { server } => {
                commands::secret_set_command(config, &server)?;
            }
        },

        Commands::Config { action } => match action {
            ConfigAction::Show => {
                commands::config_show(config)?;
            }
            ConfigAction::Path => {
                println!("{}", commands::config_file(config).display());
            }
            ConfigAction::Init { force } => {
                commands::config_init(config, force)?;
            }
        },
    }

    Ok(())
}
