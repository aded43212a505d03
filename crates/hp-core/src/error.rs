//! Core error types for HPyMon

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for the HPyMon ecosystem
#[derive(Error, Debug)]
pub enum HpError {
    /// Connection error
    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),

    /// Tunnel chain error
    #[error("Tunnel chain error: {0}")]
    TunnelChain(#[from] TunnelChainError),

    /// Credential error
    #[error("Credential error: {0}")]
    Credential(#[from] CredentialError),

    /// Command execution error
    #[error("Command execution error: {0}")]
    Command(#[from] CommandError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Transport and authentication failures at any hop
#[derive(Error, Debug)]
pub enum ConnectionError {
    /// Authentication was rejected by the server
    #[error("Authentication rejected for {user}@{host}")]
    AuthenticationFailed { user: String, host: String },

    /// Could not reach the host
    #[error("Connection to {host} failed: {reason}")]
    Unreachable { host: String, reason: String },

    /// Host key verification failed
    #[error("Host key verification failed for {host}")]
    HostKeyVerificationFailed { host: String },

    /// Private key could not be loaded
    #[error("Private key not usable at {path}: {reason}")]
    KeyUnavailable { path: PathBuf, reason: String },

    /// Local forwarding endpoint could not be opened
    #[error("Failed to open forward {local} -> {remote}: {reason}")]
    ForwardFailed {
        local: String,
        remote: String,
        reason: String,
    },

    /// Transport-level failure after the session was established
    #[error("SSH transport error: {0}")]
    Transport(String),
}

/// Malformed or cyclic tunnel chains
#[derive(Error, Debug, PartialEq, Eq)]
pub enum TunnelChainError {
    /// The requested server is not in the registry
    #[error("Unknown server: {0}")]
    UnknownServer(String),

    /// A descriptor tunnels through a server that does not exist
    #[error("Server '{from}' tunnels through unknown server '{to}'")]
    DanglingTunnel { from: String, to: String },

    /// Following tunnel references revisited a descriptor
    #[error("Tunnel cycle detected: {}", path.join(" -> "))]
    Cycle { path: Vec<String> },

    /// The chain needs more nested forwards than there are synthetic addresses
    #[error("Tunnel chain of {hops} hops exceeds the maximum of {max}")]
    TooDeep { hops: usize, max: usize },
}

/// Credential resolution failures
#[derive(Error, Debug)]
pub enum CredentialError {
    /// No secret is stored yet; the store has been primed for the next attempt
    #[error("Password for '{entry}' is not available in secure storage yet")]
    Unresolved { entry: String },

    /// The secret store itself failed
    #[error("Secret store error: {0}")]
    Store(String),
}

/// Failures while issuing or reading a remote command
#[derive(Error, Debug)]
pub enum CommandError {
    /// The batch itself is malformed
    #[error("Invalid command batch: {0}")]
    InvalidBatch(String),

    /// Opening the exec channel failed
    #[error("Failed to start '{command}': {reason}")]
    Exec { command: String, reason: String },

    /// Reading the command's output failed
    #[error("Failed to read output of '{command}': {reason}")]
    Read { command: String, reason: String },

    /// Captured output is not valid UTF-8
    #[error("Output of '{command}' is not valid UTF-8")]
    InvalidUtf8 { command: String },
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file not found
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    /// Invalid configuration
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// Two descriptors share a name
    #[error("Duplicate server name: {0}")]
    DuplicateServer(String),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialize error
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
}
