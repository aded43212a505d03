//! Tunnel chain construction

use std::collections::HashSet;

use crate::config::ServerDescriptor;
use crate::error::TunnelChainError;
use crate::registry::ServerRegistry;

/// Ordered hops from the directly reachable entry point to the target
///
/// Computed per request and never persisted. A chain of length 1 means the
/// target is connected to directly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TunnelChain {
    hops: Vec<ServerDescriptor>,
}

impl TunnelChain {
    /// Hops, outermost first
    pub fn hops(&self) -> &[ServerDescriptor] {
        &self.hops
    }

    /// Number of hops including the target
    pub fn len(&self) -> usize {
        self.hops.len()
    }

    /// Always false for a built chain
    pub fn is_empty(&self) -> bool {
        self.hops.is_empty()
    }

    /// Whether the target is reached without any tunnel
    pub fn is_direct(&self) -> bool {
        self.hops.len() == 1
    }

    /// The directly reachable first hop
    pub fn entry(&self) -> &ServerDescriptor {
        &self.hops[0]
    }

    /// The final destination
    pub fn target(&self) -> &ServerDescriptor {
        &self.hops[self.hops.len() - 1]
    }

    /// Human-readable path, e.g. `gateway -> login -> compute`
    pub fn path_description(&self) -> String {
        self.hops
            .iter()
            .map(|h| h.name.as_str())
            .collect::<Vec<_>>()
            .join(" -> ")
    }
}

/// Walk tunnel references from `target` and return the hops outermost first
///
/// Fails fast when a referenced server is missing or when a descriptor is
/// visited twice.
pub fn build_chain(registry: &ServerRegistry, target: &str) -> Result<TunnelChain, TunnelChainError> {
    let mut current = registry
        .get(target)
        .ok_or_else(|| TunnelChainError::UnknownServer(target.to_string()))?;

    let mut visited: HashSet<&str> = HashSet::new();
    let mut hops: Vec<ServerDescriptor> = Vec::new();

    loop {
        if !visited.insert(current.name.as_str()) {
            let mut path: Vec<String> = hops.iter().map(|h| h.name.clone()).collect();
            path.push(current.name.clone());
            return Err(TunnelChainError::Cycle { path });
        }
        hops.push(current.clone());

        match current.tunnel.as_deref() {
            None => break,
            Some(next) => {
                current = registry
                    .get(next)
                    .ok_or_else(|| TunnelChainError::DanglingTunnel {
                        from: current.name.clone(),
                        to: next.to_string(),
                    })?;
            }
        }
    }

    hops.reverse();
    tracing::debug!(
        "Built tunnel chain for '{}' with {} hop(s)",
        target,
        hops.len()
    );

    Ok(TunnelChain { hops })
}
