//! hp-core: Core abstractions and configuration for HPyMon
//!
//! This crate provides the server descriptors, the name-keyed server
//! registry, tunnel chain construction, credential resolution and the
//! transport traits shared by the remote-execution crate and the CLI.

pub mod chain;
pub mod config;
pub mod credentials;
pub mod error;
pub mod registry;
pub mod traits;
pub mod types;

pub use chain::{build_chain, TunnelChain};
pub use config::{Identification, JobCommands, ServerDescriptor};
pub use credentials::{CredentialResolver, KeyringStore, MemoryStore, ResolvedAuth, SecretStore};
pub use error::HpError;
pub use registry::ServerRegistry;
pub use types::{BatchOutput, CommandBatch, Endpoint, OutputFlags};
