//! Hop connector
//!
//! Opens one authenticated SSH session per hop and runs commands on it.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use russh::client::{self, Config, Handle};
use russh::{ChannelMsg, Disconnect};
use russh_keys::key::PublicKey;

use hp_core::config::{expand_tilde, HostKeyPolicy};
use hp_core::error::{CommandError, ConnectionError};
use hp_core::traits::{HopTarget, RemoteSession, Transport};
use hp_core::{Endpoint, ResolvedAuth};

use super::forward::LocalForward;

/// Opens direct SSH sessions with russh
#[derive(Debug, Clone)]
pub struct SshTransport {
    /// known_hosts file consulted by the host key policy
    known_hosts: PathBuf,
}

impl SshTransport {
    /// Create a transport checking host keys against `known_hosts`
    pub fn new(known_hosts: impl AsRef<Path>) -> Self {
        Self {
            known_hosts: expand_tilde(known_hosts.as_ref()),
        }
    }

    /// Path of the known_hosts file in use
    pub fn known_hosts(&self) -> &Path {
        &self.known_hosts
    }
}

impl Default for SshTransport {
    fn default() -> Self {
        Self::new("~/.ssh/known_hosts")
    }
}

#[async_trait]
impl Transport for SshTransport {
    type Session = SshSession;

    async fn connect(
        &self,
        target: &HopTarget,
        auth: &ResolvedAuth,
    ) -> Result<SshSession, ConnectionError> {
        // Load key material before touching the network
        let key = match auth {
            ResolvedAuth::PublicKey { key_path } => {
                let key = russh_keys::load_secret_key(key_path, None).map_err(|e| {
                    ConnectionError::KeyUnavailable {
                        path: key_path.clone(),
                        reason: e.to_string(),
                    }
                })?;
                Some(Arc::new(key))
            }
            ResolvedAuth::Password { .. } => None,
        };

        let ssh_config = Arc::new(Config::default());
        let rejected = Arc::new(AtomicBool::new(false));
        let handler = HopHandler::new(
            target.host.clone(),
            target.host_key_policy,
            self.known_hosts.clone(),
            Arc::clone(&rejected),
        );

        tracing::debug!("Connecting to {} at {}", target.name, target.dial);
        let mut session = client::connect(
            ssh_config,
            (target.dial.host.as_str(), target.dial.port),
            handler,
        )
        .await
        .map_err(|e| {
            if rejected.load(Ordering::SeqCst) {
                ConnectionError::HostKeyVerificationFailed {
                    host: target.host.to_string(),
                }
            } else {
                ConnectionError::Unreachable {
                    host: target.dial.to_string(),
                    reason: e.to_string(),
                }
            }
        })?;

        tracing::debug!("Authenticating to {} as '{}'", target.name, target.username);
        let authenticated = match (auth, key) {
            (_, Some(key)) => session.authenticate_publickey(&target.username, key).await,
            (ResolvedAuth::Password { password }, None) => {
                session
                    .authenticate_password(&target.username, password)
                    .await
            }
            (ResolvedAuth::PublicKey { .. }, None) => Ok(false),
        }
        .map_err(|e| ConnectionError::Transport(format!("Authentication error: {}", e)))?;

        if !authenticated {
            return Err(ConnectionError::AuthenticationFailed {
                user: target.username.clone(),
                host: target.host.to_string(),
            });
        }

        tracing::debug!("Session to {} established", target.name);
        Ok(SshSession {
            name: target.name.clone(),
            handle: Arc::new(session),
        })
    }
}

/// An authenticated SSH session on one hop
pub struct SshSession {
    /// Server name, for logging
    name: String,
    /// Shared with the accept loops of forwards opened through this session
    handle: Arc<Handle<HopHandler>>,
}

impl SshSession {
    /// Name of the server this session is connected to
    pub fn name(&self) -> &str {
        &self.name
    }
}

#[async_trait]
impl RemoteSession for SshSession {
    type Forward = LocalForward;

    async fn exec(&mut self, command: &str) -> Result<Vec<u8>, CommandError> {
        let mut channel =
            self.handle
                .channel_open_session()
                .await
                .map_err(|e| CommandError::Exec {
                    command: command.to_string(),
                    reason: format!("failed to open channel: {}", e),
                })?;

        channel
            .exec(true, command)
            .await
            .map_err(|e| CommandError::Exec {
                command: command.to_string(),
                reason: e.to_string(),
            })?;

        let mut stdout = Vec::new();
        let mut finished = false;

        // Drain until the server closes the channel; exit status may arrive
        // before the last data packet.
        while let Some(msg) = channel.wait().await {
            match msg {
                ChannelMsg::Data { ref data } => stdout.extend_from_slice(data),
                ChannelMsg::ExitStatus { exit_status } => {
                    tracing::trace!("'{}' exited with status {}", command, exit_status);
                    finished = true;
                }
                ChannelMsg::ExitSignal { signal_name, .. } => {
                    tracing::trace!("'{}' killed by signal {:?}", command, signal_name);
                    finished = true;
                }
                ChannelMsg::Eof => finished = true,
                _ => {}
            }
        }

        if !finished {
            return Err(CommandError::Read {
                command: command.to_string(),
                reason: "channel closed before the command completed".to_string(),
            });
        }

        Ok(stdout)
    }

    async fn forward_local(
        &self,
        bind: SocketAddr,
        remote: &Endpoint,
    ) -> Result<LocalForward, ConnectionError> {
        LocalForward::open(Arc::clone(&self.handle), bind, remote.clone()).await
    }

    async fn close(self) -> Result<(), ConnectionError> {
        tracing::debug!("Disconnecting from {}", self.name);
        self.handle
            .disconnect(Disconnect::ByApplication, "closing", "en")
            .await
            .map_err(|e| ConnectionError::Transport(e.to_string()))
    }
}

/// SSH client handler enforcing the host key policy
pub(crate) struct HopHandler {
    /// Real address of the server, used for known_hosts lookups
    host: Endpoint,
    /// Policy for keys missing from known_hosts
    policy: HostKeyPolicy,
    /// known_hosts file
    known_hosts: PathBuf,
    /// Set when the server key was refused
    rejected: Arc<AtomicBool>,
}

impl HopHandler {
    fn new(
        host: Endpoint,
        policy: HostKeyPolicy,
        known_hosts: PathBuf,
        rejected: Arc<AtomicBool>,
    ) -> Self {
        Self {
            host,
            policy,
            known_hosts,
            rejected,
        }
    }

    fn accept(&self, server_public_key: &PublicKey) -> bool {
        let known = russh_keys::check_known_hosts_path(
            &self.host.host,
            self.host.port,
            server_public_key,
            &self.known_hosts,
        );

        match (known, self.policy) {
            (Ok(true), _) => true,
            (Err(russh_keys::Error::KeyChanged { line }), _) => {
                tracing::error!(
                    "Host key for {} does not match {}:{}",
                    self.host,
                    self.known_hosts.display(),
                    line
                );
                false
            }
            (_, HostKeyPolicy::Strict) => {
                tracing::warn!(
                    "Host key for {} is not in {}, refusing",
                    self.host,
                    self.known_hosts.display()
                );
                false
            }
            (_, HostKeyPolicy::AcceptNew | HostKeyPolicy::Auto) => {
                // Trust on first use; the key is not written back
                tracing::warn!(
                    "Accepting unknown host key {} for {}",
                    server_public_key.fingerprint(),
                    self.host
                );
                true
            }
        }
    }
}

#[async_trait]
impl client::Handler for HopHandler {
    type Error = anyhow::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> Result<bool, Self::Error> {
        tracing::debug!(
            "Server host key for {}: {}",
            self.host,
            server_public_key.fingerprint()
        );

        let accepted = self.accept(server_public_key);
        if !accepted {
            self.rejected.store(true, Ordering::SeqCst);
        }
        Ok(accepted)
    }
}
