//! Transport traits
//!
//! The tunnel forwarder and command dispatcher are written against these
//! traits; the SSH implementation lives in `hp-remote`.

use async_trait::async_trait;
use std::net::SocketAddr;

use crate::config::HostKeyPolicy;
use crate::credentials::ResolvedAuth;
use crate::error::{CommandError, ConnectionError};
use crate::types::Endpoint;

/// Everything needed to open one hop
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HopTarget {
    /// Server name, for logging
    pub name: String,
    /// Address actually dialed (a forwarding endpoint for nested hops)
    pub dial: Endpoint,
    /// The server's real address, used for host key lookups
    pub host: Endpoint,
    /// Login name
    pub username: String,
    /// Host key policy for this hop
    pub host_key_policy: HostKeyPolicy,
}

/// Opens authenticated sessions
#[async_trait]
pub trait Transport: Send + Sync {
    /// The session type produced by this transport
    type Session: RemoteSession;

    /// Open and authenticate one session; no retry
    async fn connect(
        &self,
        target: &HopTarget,
        auth: &ResolvedAuth,
    ) -> Result<Self::Session, ConnectionError>;
}

/// An established session on one hop
#[async_trait]
pub trait RemoteSession: Send + Sync {
    /// The forwarding endpoint type opened through this session
    type Forward: PortForward;

    /// Run one command, wait for it to finish and return its full stdout
    ///
    /// Standard error is never collected.
    async fn exec(&mut self, command: &str) -> Result<Vec<u8>, CommandError>;

    /// Listen on `bind` and relay every accepted connection to `remote`
    async fn forward_local(
        &self,
        bind: SocketAddr,
        remote: &Endpoint,
    ) -> Result<Self::Forward, ConnectionError>;

    /// Disconnect the session
    async fn close(self) -> Result<(), ConnectionError>;
}

/// An active local forwarding endpoint
#[async_trait]
pub trait PortForward: Send + Sync {
    /// The local address clients should dial
    fn local_endpoint(&self) -> Endpoint;

    /// Stop listening and release the endpoint
    async fn close(self) -> Result<(), ConnectionError>;
}
