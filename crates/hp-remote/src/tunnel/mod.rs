//! SSH hops and tunnel chains

mod chain;
mod connector;
mod forward;

pub use chain::run_chain;
pub use connector::{SshSession, SshTransport};
pub use forward::LocalForward;
