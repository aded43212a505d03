//! Name-keyed server registry
//!
//! Tunnel references are stored as names and resolved through the registry
//! when a chain is built, so a malformed configuration can never produce a
//! self-referencing object graph.

use std::collections::BTreeMap;

use crate::config::ServerDescriptor;
use crate::error::ConfigError;

/// All known servers, keyed by their unique name
#[derive(Debug, Clone, Default)]
pub struct ServerRegistry {
    servers: BTreeMap<String, ServerDescriptor>,
}

impl ServerRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry, rejecting invalid descriptors and duplicate names
    pub fn from_servers(
        servers: impl IntoIterator<Item = ServerDescriptor>,
    ) -> Result<Self, ConfigError> {
        let mut registry = Self::new();
        for server in servers {
            registry.insert(server)?;
        }
        Ok(registry)
    }

    /// Add a server; names must be unique
    pub fn insert(&mut self, server: ServerDescriptor) -> Result<(), ConfigError> {
        server.validate()?;
        if self.servers.contains_key(&server.name) {
            return Err(ConfigError::DuplicateServer(server.name));
        }
        self.servers.insert(server.name.clone(), server);
        Ok(())
    }

    /// Replace or add a server
    pub fn upsert(&mut self, server: ServerDescriptor) -> Result<(), ConfigError> {
        server.validate()?;
        self.servers.insert(server.name.clone(), server);
        Ok(())
    }

    /// Remove a server by name
    pub fn remove(&mut self, name: &str) -> Option<ServerDescriptor> {
        self.servers.remove(name)
    }

    /// Look up a server by name
    pub fn get(&self, name: &str) -> Option<&ServerDescriptor> {
        self.servers.get(name)
    }

    /// Servers sorted by name
    pub fn iter(&self) -> impl Iterator<Item = &ServerDescriptor> {
        self.servers.values()
    }

    /// Number of servers
    pub fn len(&self) -> usize {
        self.servers.len()
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_by_name() {
        let registry = ServerRegistry::from_servers([
            ServerDescriptor::new("gateway", "gw", "alice"),
            ServerDescriptor::new("compute", "10.0.0.2", "alice").with_tunnel("gateway"),
        ])
        .unwrap();

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.get("compute").unwrap().address, "10.0.0.2");
        assert!(registry.get("missing").is_none());
    }

    #[test]
    fn test_duplicate_insert_rejected() {
        let mut registry = ServerRegistry::new();
        registry
            .insert(ServerDescriptor::new("gateway", "gw", "alice"))
            .unwrap();
        let err = registry
            .insert(ServerDescriptor::new("gateway", "gw2", "bob"))
            .unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateServer(_)));
    }

    #[test]
    fn test_upsert_replaces() {
        let mut registry = ServerRegistry::new();
        registry
            .upsert(ServerDescriptor::new("gateway", "gw", "alice"))
            .unwrap();
        registry
            .upsert(ServerDescriptor::new("gateway", "gw2", "alice"))
            .unwrap();
        assert_eq!(registry.get("gateway").unwrap().address, "gw2");
    }

    #[test]
    fn test_iter_sorted_by_name() {
        let registry = ServerRegistry::from_servers([
            ServerDescriptor::new("zeta", "z", "u"),
            ServerDescriptor::new("alpha", "a", "u"),
        ])
        .unwrap();
        let names: Vec<_> = registry.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
    }
}
