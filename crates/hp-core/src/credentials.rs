//! Credential resolution
//!
//! Public key servers resolve to their key path. Password servers resolve
//! through a secret store keyed by `<name>_<address>_<username>`:
//!
//! 1. the derived key is looked up;
//! 2. otherwise the configured `secret_ref` is tried as an entry key;
//! 3. otherwise the configured value is saved under the derived key and
//!    [`CredentialError::Unresolved`] is returned, so the next attempt
//!    resolves from step 1.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;

use crate::config::{expand_tilde, Identification, ServerDescriptor};
use crate::error::CredentialError;

/// Secure key/value storage for passwords
pub trait SecretStore: Send + Sync {
    /// Fetch a secret, `None` when the entry does not exist
    fn get(&self, service: &str, entry: &str) -> Result<Option<String>, CredentialError>;

    /// Create or overwrite a secret
    fn set(&self, service: &str, entry: &str, secret: &str) -> Result<(), CredentialError>;
}

/// Secret store backed by the platform keychain
#[derive(Debug, Default, Clone, Copy)]
pub struct KeyringStore;

impl KeyringStore {
    /// Create a keychain-backed store
    pub fn new() -> Self {
        Self
    }

    fn entry(service: &str, entry: &str) -> Result<keyring::Entry, CredentialError> {
        keyring::Entry::new(service, entry)
            .map_err(|e| CredentialError::Store(format!("Failed to create keyring entry: {}", e)))
    }
}

impl SecretStore for KeyringStore {
    fn get(&self, service: &str, entry: &str) -> Result<Option<String>, CredentialError> {
        match Self::entry(service, entry)?.get_password() {
            Ok(secret) => Ok(Some(secret)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(CredentialError::Store(format!(
                "Failed to read '{}' from keyring: {}",
                entry, e
            ))),
        }
    }

    fn set(&self, service: &str, entry: &str, secret: &str) -> Result<(), CredentialError> {
        Self::entry(service, entry)?
            .set_password(secret)
            .map_err(|e| {
                CredentialError::Store(format!("Failed to store '{}' in keyring: {}", entry, e))
            })
    }
}

/// In-process secret store
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<(String, String), String>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored secrets
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is stored
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl SecretStore for MemoryStore {
    fn get(&self, service: &str, entry: &str) -> Result<Option<String>, CredentialError> {
        Ok(self
            .entries
            .get(&(service.to_string(), entry.to_string()))
            .map(|v| v.value().clone()))
    }

    fn set(&self, service: &str, entry: &str, secret: &str) -> Result<(), CredentialError> {
        self.entries
            .insert((service.to_string(), entry.to_string()), secret.to_string());
        Ok(())
    }
}

/// A credential ready to hand to the SSH layer
#[derive(Clone, PartialEq, Eq)]
pub enum ResolvedAuth {
    /// Private key file, `~` already expanded
    PublicKey { key_path: PathBuf },
    /// Plain password
    Password { password: String },
}

impl fmt::Debug for ResolvedAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolvedAuth::PublicKey { key_path } => f
                .debug_struct("PublicKey")
                .field("key_path", key_path)
                .finish(),
            ResolvedAuth::Password { .. } => f
                .debug_struct("Password")
                .field("password", &"<redacted>")
                .finish(),
        }
    }
}

/// Storage key for a server's password
pub fn storage_key(server: &ServerDescriptor) -> String {
    format!("{}_{}_{}", server.name, server.address, server.username)
}

/// Turns a server's identification into a usable credential
#[derive(Clone)]
pub struct CredentialResolver {
    store: Arc<dyn SecretStore>,
    service: String,
}

impl CredentialResolver {
    /// Create a resolver over a secret store and service name
    pub fn new(store: Arc<dyn SecretStore>, service: impl Into<String>) -> Self {
        Self {
            store,
            service: service.into(),
        }
    }

    /// Service name entries are stored under
    pub fn service(&self) -> &str {
        &self.service
    }

    /// Resolve the credential for `server`
    pub fn resolve(&self, server: &ServerDescriptor) -> Result<ResolvedAuth, CredentialError> {
        match &server.identification {
            Identification::PublicKey { key_path } => Ok(ResolvedAuth::PublicKey {
                key_path: expand_tilde(key_path),
            }),
            Identification::Password { secret_ref } => self.resolve_password(server, secret_ref),
        }
    }

    fn resolve_password(
        &self,
        server: &ServerDescriptor,
        secret_ref: &str,
    ) -> Result<ResolvedAuth, CredentialError> {
        let key = storage_key(server);

        if let Some(password) = self.store.get(&self.service, &key)? {
            return Ok(ResolvedAuth::Password { password });
        }

        if !secret_ref.is_empty() && secret_ref != key {
            if let Some(password) = self.store.get(&self.service, secret_ref)? {
                return Ok(ResolvedAuth::Password { password });
            }
        }

        tracing::info!(
            "No stored password for '{}', priming secret store entry",
            server.name
        );
        self.store.set(&self.service, &key, secret_ref)?;

        Err(CredentialError::Unresolved { entry: key })
    }

    /// Store a password for `server` under its derived key
    pub fn store_secret(
        &self,
        server: &ServerDescriptor,
        secret: &str,
    ) -> Result<(), CredentialError> {
        self.store.set(&self.service, &storage_key(server), secret)
    }
}

impl fmt::Debug for CredentialResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialResolver")
            .field("service", &self.service)
            .finish_non_exhaustive()
    }
}
