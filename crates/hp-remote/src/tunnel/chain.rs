//! Tunnel forwarder
//!
//! Walks a [`TunnelChain`] from the entry hop inwards. Every hop except the
//! innermost opens a local forward to the next hop's real address, and the
//! next session is dialed through that forward. Nesting depth `d` binds the
//! synthetic loopback address for `d`, so the forwards of one call never
//! collide with each other. Overlapping calls both start at depth 0 and are
//! not kept apart.
//!
//! Everything opened is released innermost-first, whether the batch
//! succeeded or not.

use hp_core::error::{ConnectionError, HpError};
use hp_core::traits::{HopTarget, PortForward, RemoteSession, Transport};
use hp_core::{BatchOutput, CommandBatch, CredentialResolver, ResolvedAuth, TunnelChain};

use crate::client::ClientOptions;
use crate::dispatch::execute_batch;

/// One opened hop: its session and the forward it serves to the next hop
struct HopLayer<S: RemoteSession> {
    name: String,
    session: S,
    forward: Option<S::Forward>,
}

/// Run `batch` on the innermost hop of `chain`
///
/// Credentials for every hop are resolved before any connection is made.
pub async fn run_chain<T: Transport>(
    transport: &T,
    resolver: &CredentialResolver,
    options: &ClientOptions,
    chain: &TunnelChain,
    batch: &CommandBatch,
) -> Result<BatchOutput, HpError> {
    if chain.len() > 1 {
        // Deepest forward sits at depth len - 2
        options.forwarding.bind_address(chain.len() - 2)?;
    }

    let credentials = chain
        .hops()
        .iter()
        .map(|hop| resolver.resolve(hop))
        .collect::<Result<Vec<_>, _>>()?;

    tracing::info!(
        "Running {} command(s) via {}",
        batch.len(),
        chain.path_description()
    );

    let mut layers: Vec<HopLayer<T::Session>> = Vec::with_capacity(chain.len());
    let result = open_and_dispatch(transport, options, chain, &credentials, batch, &mut layers).await;
    release(layers).await;

    result
}

async fn open_and_dispatch<T: Transport>(
    transport: &T,
    options: &ClientOptions,
    chain: &TunnelChain,
    credentials: &[ResolvedAuth],
    batch: &CommandBatch,
    layers: &mut Vec<HopLayer<T::Session>>,
) -> Result<BatchOutput, HpError> {
    let hops = chain.hops();
    let Some(entry) = hops.first() else {
        return Err(empty_chain());
    };
    let mut dial = entry.endpoint();

    for (depth, (hop, auth)) in hops.iter().zip(credentials).enumerate() {
        let target = HopTarget {
            name: hop.name.clone(),
            dial: dial.clone(),
            host: hop.endpoint(),
            username: hop.username.clone(),
            host_key_policy: options
                .host_key_policy
                .for_hop(&hop.identification, depth + 1 == hops.len()),
        };

        let session = transport.connect(&target, auth).await?;
        layers.push(HopLayer {
            name: hop.name.clone(),
            session,
            forward: None,
        });

        if let Some(next) = hops.get(depth + 1) {
            let bind = options.forwarding.bind_address(depth)?;
            let Some(layer) = layers.last_mut() else {
                break;
            };
            let forward = layer.session.forward_local(bind, &next.endpoint()).await?;
            tracing::debug!(
                "{} forwards {} -> {}",
                layer.name,
                forward.local_endpoint(),
                next.endpoint()
            );
            dial = forward.local_endpoint();
            layer.forward = Some(forward);
        }
    }

    let Some(innermost) = layers.last_mut() else {
        return Err(empty_chain());
    };

    Ok(execute_batch(&mut innermost.session, batch).await?)
}

fn empty_chain() -> HpError {
    ConnectionError::Transport("tunnel chain has no hops".to_string()).into()
}

async fn release<S: RemoteSession>(layers: Vec<HopLayer<S>>) {
    for layer in layers.into_iter().rev() {
        if let Some(forward) = layer.forward {
            if let Err(e) = forward.close().await {
                tracing::warn!("Failed to close forward on {}: {}", layer.name, e);
            }
        }
        if let Err(e) = layer.session.close().await {
            tracing::warn!("Failed to close session to {}: {}", layer.name, e);
        }
    }
}
