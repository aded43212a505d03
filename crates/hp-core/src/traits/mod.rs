//! Core trait definitions

mod transport;

pub use transport::{HopTarget, PortForward, RemoteSession, Transport};
