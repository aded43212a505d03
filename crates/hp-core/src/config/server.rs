//! Server descriptor configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{CommandError, ConfigError};
use crate::types::Endpoint;

/// Default SSH port
pub const DEFAULT_SSH_PORT: u16 = 22;

fn default_port() -> u16 {
    DEFAULT_SSH_PORT
}

fn default_kill_column() -> String {
    "JOBID".to_string()
}

/// How a server authenticates the connecting user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Identification {
    /// Authenticate with a local private key (no passphrase support)
    PublicKey { key_path: PathBuf },
    /// Authenticate with a password kept in the secret store
    Password { secret_ref: String },
}

impl Default for Identification {
    fn default() -> Self {
        Identification::PublicKey {
            key_path: PathBuf::from("~/.ssh/id_rsa"),
        }
    }
}

impl Identification {
    /// Short label for listings
    pub fn kind(&self) -> &'static str {
        match self {
            Identification::PublicKey { .. } => "publickey",
            Identification::Password { .. } => "password",
        }
    }
}

/// Job-scheduler command templates for a server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobCommands {
    /// Lists jobs; the query name is appended
    pub list_jobs: String,
    /// Cancels jobs; the job identifiers are appended
    pub kill_jobs: String,
}

impl Default for JobCommands {
    fn default() -> Self {
        Self {
            list_jobs: "squeue -o %all -u".to_string(),
            kill_jobs: "scancel".to_string(),
        }
    }
}

/// Static description of one remote host
///
/// Descriptors are read-only while connecting; no connection state lives
/// here. `tunnel` names another descriptor in the same registry that must be
/// traversed to reach this one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerDescriptor {
    /// Unique name of the server
    pub name: String,

    /// Hostname or IP address as seen from the previous hop
    pub address: String,

    /// SSH port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Username used to connect
    pub username: String,

    /// Authentication method
    #[serde(default)]
    pub identification: Identification,

    /// Username used when querying jobs, if different from `username`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queryname: Option<String>,

    /// Name of the server this one is reached through
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tunnel: Option<String>,

    /// Job-scheduler command templates
    #[serde(default)]
    pub commands: JobCommands,

    /// Column holding job identifiers in the job list
    #[serde(default = "default_kill_column")]
    pub kill_column: String,
}

impl ServerDescriptor {
    /// Create a descriptor with public key authentication and default commands
    pub fn new(
        name: impl Into<String>,
        address: impl Into<String>,
        username: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
            port: DEFAULT_SSH_PORT,
            username: username.into(),
            identification: Identification::default(),
            queryname: None,
            tunnel: None,
            commands: JobCommands::default(),
            kill_column: default_kill_column(),
        }
    }

    /// Set the SSH port
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the identification
    pub fn with_identification(mut self, identification: Identification) -> Self {
        self.identification = identification;
        self
    }

    /// Route connections through another server
    pub fn with_tunnel(mut self, tunnel: impl Into<String>) -> Self {
        self.tunnel = Some(tunnel.into());
        self
    }

    /// Set the username used for job queries
    pub fn with_queryname(mut self, queryname: impl Into<String>) -> Self {
        self.queryname = Some(queryname.into());
        self
    }

    /// The real address of this server
    pub fn endpoint(&self) -> Endpoint {
        Endpoint::new(self.address.clone(), self.port)
    }

    /// Username used for job queries, falling back to the login name
    pub fn query_name(&self) -> &str {
        self.queryname.as_deref().unwrap_or(&self.username)
    }

    /// Command listing this user's jobs
    pub fn list_jobs_command(&self) -> String {
        format!(
            "{} {}",
            self.commands.list_jobs.trim(),
            self.query_name().trim()
        )
    }

    /// Command cancelling the given jobs
    ///
    /// Fails when no job id is given or an id is blank.
    pub fn kill_jobs_command<I, S>(&self, job_ids: I) -> Result<String, CommandError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut command = self.commands.kill_jobs.trim().to_string();
        let mut count = 0;
        for id in job_ids {
            let id = id.as_ref().trim();
            if id.is_empty() {
                return Err(CommandError::InvalidBatch("job id is empty".to_string()));
            }
            command.push(' ');
            command.push_str(id);
            count += 1;
        }

        if count == 0 {
            return Err(CommandError::InvalidBatch(
                "at least one job id is required".to_string(),
            ));
        }
        Ok(command)
    }

    /// Check the fields that have no valid default
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::Invalid("server name is empty".to_string()));
        }
        if self.address.trim().is_empty() {
            return Err(ConfigError::Invalid(format!(
                "server '{}' has no address",
                self.name
            )));
        }
        if self.port == 0 {
            return Err(ConfigError::Invalid(format!(
                "server '{}' has port 0",
                self.name
            )));
        }
        if self.username.trim().is_empty() {
            return Err(ConfigError::Invalid(format!(
                "server '{}' has no username",
                self.name
            )));
        }
        Ok(())
    }
}
