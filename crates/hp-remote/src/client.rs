//! Remote client
//!
//! Entry point used by the monitor: resolves a server name to its tunnel
//! chain and runs command batches on it.

use std::sync::Arc;

use hp_core::config::{ForwardSettings, HostKeyPolicy, HpymonConfig};
use hp_core::error::{ConfigError, HpError, TunnelChainError};
use hp_core::traits::Transport;
use hp_core::{
    build_chain, BatchOutput, CommandBatch, CredentialResolver, OutputFlags, SecretStore,
    ServerDescriptor, ServerRegistry,
};

use crate::tunnel::{run_chain, SshTransport};

/// Command run by [`RemoteClient::check_connection`]
pub const PROBE_COMMAND: &str = "ls";

/// Settings shared by every chain a client opens
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientOptions {
    /// Synthetic loopback addresses for nested forwards
    pub forwarding: ForwardSettings,
    /// Host key policy before per-server resolution
    pub host_key_policy: HostKeyPolicy,
}

impl From<&HpymonConfig> for ClientOptions {
    fn from(config: &HpymonConfig) -> Self {
        Self {
            forwarding: config.forwarding.clone(),
            host_key_policy: config.ssh.host_key_policy,
        }
    }
}

/// Sends command batches to named servers
pub struct RemoteClient<T: Transport = SshTransport> {
    transport: T,
    resolver: CredentialResolver,
    registry: ServerRegistry,
    options: ClientOptions,
}

impl RemoteClient<SshTransport> {
    /// Build an SSH client from a validated configuration
    pub fn from_config(
        config: &HpymonConfig,
        store: Arc<dyn SecretStore>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let registry = ServerRegistry::from_servers(config.servers.iter().cloned())?;
        let resolver = CredentialResolver::new(store, config.secrets.service.clone());

        Ok(Self::new(
            SshTransport::new(&config.ssh.known_hosts),
            resolver,
            registry,
            ClientOptions::from(config),
        ))
    }
}

impl<T: Transport> RemoteClient<T> {
    /// Create a client over any transport
    pub fn new(
        transport: T,
        resolver: CredentialResolver,
        registry: ServerRegistry,
        options: ClientOptions,
    ) -> Self {
        Self {
            transport,
            resolver,
            registry,
            options,
        }
    }

    /// Servers this client can reach
    pub fn registry(&self) -> &ServerRegistry {
        &self.registry
    }

    /// Resolver supplying hop credentials
    pub fn resolver(&self) -> &CredentialResolver {
        &self.resolver
    }

    /// Host key and forwarding options applied to every call
    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    /// Run an already validated batch on `server`
    pub async fn send_batch(
        &self,
        server: &str,
        batch: &CommandBatch,
    ) -> Result<BatchOutput, HpError> {
        let chain = build_chain(&self.registry, server)?;
        run_chain(&self.transport, &self.resolver, &self.options, &chain, batch).await
    }

    /// Run `commands` on `server`, in order, capturing the flagged outputs
    ///
    /// `flags` is either one flag for every command or one flag per command.
    pub async fn send_commands<I, S>(
        &self,
        server: &str,
        commands: I,
        flags: impl Into<OutputFlags>,
    ) -> Result<BatchOutput, HpError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let batch = CommandBatch::new(commands, flags)?;
        self.send_batch(server, &batch).await
    }

    /// Whether `server` is reachable and accepts commands
    ///
    /// Runs a harmless probe through the full chain. Never fails: every
    /// error is logged and reported as `false`.
    pub async fn check_connection(&self, server: &str) -> bool {
        match self
            .send_batch(server, &CommandBatch::single(PROBE_COMMAND))
            .await
        {
            Ok(_) => {
                tracing::debug!("{} is reachable", server);
                true
            }
            Err(e) => {
                tracing::warn!("{} is unreachable: {}", server, e);
                false
            }
        }
    }

    /// Raw job listing for `server`
    pub async fn fetch_job_list(&self, server: &str) -> Result<String, HpError> {
        let descriptor = self.descriptor(server)?;
        let output = self
            .send_batch(server, &CommandBatch::single(descriptor.list_jobs_command()))
            .await?;

        Ok(output
            .into_outputs()
            .and_then(|outputs| outputs.into_iter().next())
            .unwrap_or_default())
    }

    /// Cancel the given jobs on `server`
    pub async fn kill_jobs<I, S>(&self, server: &str, job_ids: I) -> Result<(), HpError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let descriptor = self.descriptor(server)?;
        let command = descriptor.kill_jobs_command(job_ids)?;
        tracing::info!("Killing jobs on {}: '{}'", server, command);

        self.send_commands(server, [command], false).await?;
        Ok(())
    }

    /// Store the password for `server` in the secret store
    pub fn store_secret(&self, server: &str, secret: &str) -> Result<(), HpError> {
        let descriptor = self.descriptor(server)?;
        self.resolver.store_secret(descriptor, secret)?;
        Ok(())
    }

    fn descriptor(&self, server: &str) -> Result<&ServerDescriptor, HpError> {
        self.registry
            .get(server)
            .ok_or_else(|| TunnelChainError::UnknownServer(server.to_string()).into())
    }
}
