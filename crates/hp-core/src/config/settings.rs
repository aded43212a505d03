//! Application configuration

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;

use super::{Identification, ServerDescriptor};
use crate::error::{ConfigError, TunnelChainError};

/// Number of distinct synthetic loopback addresses, one per nesting depth
pub const MAX_FORWARD_DEPTH: usize = 256;

/// Top-level HPyMon configuration file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HpymonConfig {
    /// SSH client behavior
    pub ssh: SshSettings,

    /// Local forwarding endpoints used for multi-hop tunnels
    pub forwarding: ForwardSettings,

    /// Secret store settings
    pub secrets: SecretSettings,

    /// Known servers
    pub servers: Vec<ServerDescriptor>,
}

impl HpymonConfig {
    /// Validate every section and the server list
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.forwarding.validate()?;

        let mut seen = HashSet::new();
        for server in &self.servers {
            server.validate()?;
            if !seen.insert(server.name.as_str()) {
                return Err(ConfigError::DuplicateServer(server.name.clone()));
            }
        }

        Ok(())
    }
}

/// Host key verification policy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HostKeyPolicy {
    /// Trust-on-first-use for forwarding hops and public key targets,
    /// known hosts only for a password target
    #[default]
    Auto,
    /// Accept keys not seen before, reject keys that changed
    AcceptNew,
    /// Only accept keys already present in known_hosts
    Strict,
}

impl HostKeyPolicy {
    /// Concrete policy for one hop of a chain
    ///
    /// `is_target` is true only for the innermost hop, the one that runs
    /// commands.
    pub fn for_hop(self, identification: &Identification, is_target: bool) -> HostKeyPolicy {
        match (self, identification, is_target) {
            (HostKeyPolicy::Auto, Identification::Password { .. }, true) => HostKeyPolicy::Strict,
            (HostKeyPolicy::Auto, _, _) => HostKeyPolicy::AcceptNew,
            (policy, _, _) => policy,
        }
    }
}

/// SSH client settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SshSettings {
    /// Host key verification policy
    pub host_key_policy: HostKeyPolicy,

    /// known_hosts file consulted for host key checks
    pub known_hosts: PathBuf,
}

impl Default for SshSettings {
    fn default() -> Self {
        Self {
            host_key_policy: HostKeyPolicy::Auto,
            known_hosts: PathBuf::from("~/.ssh/known_hosts"),
        }
    }
}

/// Local forwarding settings
///
/// Nesting depth `d` binds `<loopback_prefix>.<d>:<local_port>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForwardSettings {
    /// First three octets of a 127/8 address
    pub loopback_prefix: String,

    /// Port every forwarding endpoint listens on
    pub local_port: u16,
}

impl Default for ForwardSettings {
    fn default() -> Self {
        Self {
            loopback_prefix: "127.0.1".to_string(),
            local_port: 10022,
        }
    }
}

impl ForwardSettings {
    /// Synthetic loopback address for a nesting depth
    pub fn bind_address(&self, depth: usize) -> Result<SocketAddr, TunnelChainError> {
        if depth >= MAX_FORWARD_DEPTH {
            return Err(TunnelChainError::TooDeep {
                hops: depth + 2,
                max: MAX_FORWARD_DEPTH + 1,
            });
        }

        let ip = self
            .parse_address(depth)
            .ok_or_else(|| TunnelChainError::TooDeep {
                hops: depth + 2,
                max: MAX_FORWARD_DEPTH + 1,
            })?;
        Ok(SocketAddr::new(ip.into(), self.local_port))
    }

    fn parse_address(&self, depth: usize) -> Option<Ipv4Addr> {
        format!("{}.{}", self.loopback_prefix.trim_end_matches('.'), depth)
            .parse()
            .ok()
    }

    /// Check the prefix forms loopback addresses and the port is usable
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.parse_address(0) {
            Some(ip) if ip.is_loopback() => {}
            _ => {
                return Err(ConfigError::Invalid(format!(
                    "forwarding.loopback_prefix '{}' must be three octets of a 127.x.y.z address",
                    self.loopback_prefix
                )))
            }
        }
        if self.local_port == 0 {
            return Err(ConfigError::Invalid(
                "forwarding.local_port must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Secret store settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecretSettings {
    /// Service name entries are stored under
    pub service: String,
}

impl Default for SecretSettings {
    fn default() -> Self {
        Self {
            service: "hpymon".to_string(),
        }
    }
}
