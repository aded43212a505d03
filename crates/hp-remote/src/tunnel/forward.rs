//! Local forwarding endpoint
//!
//! ```text
//! [hop client] -> [bind_addr:port] -> [direct-tcpip channel] -> [remote host:port]
//! ```
//!
//! The accept loop is owned by the [`LocalForward`] guard: closing or
//! dropping the guard stops the listener and every relay it started.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use russh::client::Handle;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use hp_core::error::ConnectionError;
use hp_core::traits::PortForward;
use hp_core::Endpoint;

use super::connector::HopHandler;

/// Pause after a failed `accept` before trying again
pub(crate) const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// A listening local endpoint relaying to a remote address through a session
pub struct LocalForward {
    /// Address the listener is bound to
    local: SocketAddr,
    /// Destination as seen from the hop
    remote: Endpoint,
    /// Stops the accept loop and all relays
    cancel: CancellationToken,
    /// Accept loop task
    task: Option<JoinHandle<()>>,
}

impl LocalForward {
    /// Bind `bind` and start relaying accepted connections to `remote`
    pub(crate) async fn open(
        handle: Arc<Handle<HopHandler>>,
        bind: SocketAddr,
        remote: Endpoint,
    ) -> Result<Self, ConnectionError> {
        let forward_failed = |reason: String| ConnectionError::ForwardFailed {
            local: bind.to_string(),
            remote: remote.to_string(),
            reason,
        };

        let listener = TcpListener::bind(bind)
            .await
            .map_err(|e| forward_failed(e.to_string()))?;
        let local = listener
            .local_addr()
            .map_err(|e| forward_failed(e.to_string()))?;

        let cancel = CancellationToken::new();
        let task = tokio::spawn(accept_loop(
            handle,
            listener,
            remote.clone(),
            cancel.clone(),
        ));

        tracing::debug!("Forwarding {} -> {}", local, remote);

        Ok(Self {
            local,
            remote,
            cancel,
            task: Some(task),
        })
    }

    /// Destination of this forward
    pub fn remote(&self) -> &Endpoint {
        &self.remote
    }
}

#[async_trait]
impl PortForward for LocalForward {
    fn local_endpoint(&self) -> Endpoint {
        Endpoint::new(self.local.ip().to_string(), self.local.port())
    }

    async fn close(mut self) -> Result<(), ConnectionError> {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    return Err(ConnectionError::Transport(format!(
                        "forward {} -> {} failed: {}",
                        self.local, self.remote, e
                    )));
                }
            }
        }
        tracing::debug!("Closed forward {} -> {}", self.local, self.remote);
        Ok(())
    }
}

impl Drop for LocalForward {
    fn drop(&mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Accept TCP connections and bridge each through its own SSH channel
async fn accept_loop(
    handle: Arc<Handle<HopHandler>>,
    listener: TcpListener,
    remote: Endpoint,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            accepted = listener.accept() => {
                let Some((tcp, peer)) = accepted_or_backoff(accepted).await else {
                    continue;
                };

                let channel = match handle
                    .channel_open_direct_tcpip(
                        remote.host.clone(),
                        u32::from(remote.port),
                        peer.ip().to_string(),
                        u32::from(peer.port()),
                    )
                    .await
                {
                    Ok(channel) => channel,
                    Err(e) => {
                        tracing::warn!("Failed to open direct-tcpip channel to {}: {}", remote, e);
                        continue;
                    }
                };

                tokio::spawn(relay(tcp, channel, cancel.child_token()));
            }
        }
    }

    tracing::trace!("Forward to {} stopped accepting", remote);
}

/// Pass an accepted connection through, or wait out an accept error
///
/// Persistent errors such as EMFILE would otherwise spin the accept loop.
async fn accepted_or_backoff(
    accepted: std::io::Result<(TcpStream, SocketAddr)>,
) -> Option<(TcpStream, SocketAddr)> {
    match accepted {
        Ok(conn) => Some(conn),
        Err(e) => {
            tracing::warn!("Forward listener accept error: {}", e);
            tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
            None
        }
    }
}

async fn relay(
    mut tcp: TcpStream,
    channel: russh::Channel<russh::client::Msg>,
    cancel: CancellationToken,
) {
    let mut stream = channel.into_stream();
    tokio::select! {
        _ = cancel.cancelled() => {}
        result = tokio::io::copy_bidirectional(&mut tcp, &mut stream) => {
            match result {
                Ok((sent, received)) => {
                    tracing::trace!("Relay closed ({} bytes out, {} bytes in)", sent, received);
                }
                Err(e) => tracing::debug!("Relay error: {}", e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn test_accept_error_waits_before_retry() {
        let started = Instant::now();
        let accepted = accepted_or_backoff(Err(io::Error::new(
            io::ErrorKind::Other,
            "too many open files",
        )))
        .await;

        assert!(accepted.is_none());
        assert!(started.elapsed() >= ACCEPT_ERROR_BACKOFF);
    }

    #[tokio::test]
    async fn test_accepted_connection_passes_through() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let _client = TcpStream::connect(addr).await.unwrap();

        let started = Instant::now();
        let accepted = accepted_or_backoff(listener.accept().await).await;

        assert!(accepted.is_some());
        assert!(started.elapsed() < ACCEPT_ERROR_BACKOFF);
    }
}
