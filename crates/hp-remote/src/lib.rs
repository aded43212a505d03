//! hp-remote: Remote command execution for HPyMon
//!
//! Opens SSH sessions to compute hosts, either directly or through a chain
//! of intermediate hosts using nested local forwards, and runs ordered
//! command batches on the innermost session.

pub mod client;
pub mod dispatch;
pub mod tunnel;

pub use client::{ClientOptions, RemoteClient, PROBE_COMMAND};
pub use dispatch::execute_batch;
pub use tunnel::{run_chain, LocalForward, SshSession, SshTransport};
