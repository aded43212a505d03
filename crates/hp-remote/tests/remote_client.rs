//! Tunnel forwarder and dispatcher tests over an in-memory network

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use hp_core::config::{ForwardSettings, HostKeyPolicy};
use hp_core::error::{CommandError, ConnectionError, CredentialError, HpError, TunnelChainError};
use hp_core::traits::{HopTarget, PortForward, RemoteSession, Transport};
use hp_core::{
    BatchOutput, CredentialResolver, Endpoint, Identification, MemoryStore, ResolvedAuth,
    SecretStore, ServerDescriptor, ServerRegistry,
};
use hp_remote::{ClientOptions, RemoteClient, PROBE_COMMAND};

#[derive(Default)]
struct NetworkState {
    events: Vec<String>,
    forwards: HashMap<Endpoint, Endpoint>,
    down: HashSet<String>,
    refuse_auth: HashSet<String>,
    replies: HashMap<String, Vec<u8>>,
    policies: Vec<(String, HostKeyPolicy)>,
}

/// Shared view of everything the fake hosts saw
#[derive(Clone, Default)]
struct Network(Arc<Mutex<NetworkState>>);

impl Network {
    fn reply(&self, command: &str, stdout: &[u8]) -> &Self {
        self.0
            .lock()
            .unwrap()
            .replies
            .insert(command.to_string(), stdout.to_vec());
        self
    }

    fn take_down(&self, server: &str) {
        self.0.lock().unwrap().down.insert(server.to_string());
    }

    fn refuse_auth(&self, server: &str) {
        self.0.lock().unwrap().refuse_auth.insert(server.to_string());
    }

    fn events(&self) -> Vec<String> {
        self.0.lock().unwrap().events.clone()
    }

    fn policies(&self) -> Vec<(String, HostKeyPolicy)> {
        self.0.lock().unwrap().policies.clone()
    }

    fn open_forwards(&self) -> usize {
        self.0.lock().unwrap().forwards.len()
    }

    fn record(&self, event: String) {
        self.0.lock().unwrap().events.push(event);
    }
}

struct FakeTransport {
    net: Network,
}

#[async_trait]
impl Transport for FakeTransport {
    type Session = FakeSession;

    async fn connect(
        &self,
        target: &HopTarget,
        _auth: &ResolvedAuth,
    ) -> Result<FakeSession, ConnectionError> {
        let mut state = self.net.0.lock().unwrap();
        state
            .policies
            .push((target.name.clone(), target.host_key_policy));

        if state.down.contains(&target.name) {
            return Err(ConnectionError::Unreachable {
                host: target.dial.to_string(),
                reason: "connection refused".to_string(),
            });
        }
        if target.dial != target.host && state.forwards.get(&target.dial) != Some(&target.host) {
            return Err(ConnectionError::Unreachable {
                host: target.dial.to_string(),
                reason: "nothing listening".to_string(),
            });
        }
        if state.refuse_auth.contains(&target.name) {
            return Err(ConnectionError::AuthenticationFailed {
                user: target.username.clone(),
                host: target.host.to_string(),
            });
        }

        state
            .events
            .push(format!("connect {} via {}", target.name, target.dial));
        Ok(FakeSession {
            name: target.name.clone(),
            net: self.net.clone(),
        })
    }
}

struct FakeSession {
    name: String,
    net: Network,
}

#[async_trait]
impl RemoteSession for FakeSession {
    type Forward = FakeForward;

    async fn exec(&mut self, command: &str) -> Result<Vec<u8>, CommandError> {
        self.net.record(format!("exec {}: {}", self.name, command));
        let reply = self.net.0.lock().unwrap().replies.get(command).cloned();
        reply.ok_or_else(|| CommandError::Exec {
            command: command.to_string(),
            reason: "command not found".to_string(),
        })
    }

    async fn forward_local(
        &self,
        bind: SocketAddr,
        remote: &Endpoint,
    ) -> Result<FakeForward, ConnectionError> {
        let local = Endpoint::new(bind.ip().to_string(), bind.port());
        let mut state = self.net.0.lock().unwrap();
        if state.forwards.contains_key(&local) {
            return Err(ConnectionError::ForwardFailed {
                local: local.to_string(),
                remote: remote.to_string(),
                reason: "address in use".to_string(),
            });
        }
        state.forwards.insert(local.clone(), remote.clone());
        state
            .events
            .push(format!("forward {} {} -> {}", self.name, local, remote));
        Ok(FakeForward {
            local,
            net: self.net.clone(),
        })
    }

    async fn close(self) -> Result<(), ConnectionError> {
        self.net.record(format!("close {}", self.name));
        Ok(())
    }
}

struct FakeForward {
    local: Endpoint,
    net: Network,
}

#[async_trait]
impl PortForward for FakeForward {
    fn local_endpoint(&self) -> Endpoint {
        self.local.clone()
    }

    async fn close(self) -> Result<(), ConnectionError> {
        let mut state = self.net.0.lock().unwrap();
        state.forwards.remove(&self.local);
        state.events.push(format!("close forward {}", self.local));
        Ok(())
    }
}

fn registry() -> ServerRegistry {
    ServerRegistry::from_servers([
        ServerDescriptor::new("s1", "h1", "alice"),
        ServerDescriptor::new("s2", "h2", "alice").with_tunnel("s1"),
        ServerDescriptor::new("s3", "h3", "alice").with_tunnel("s2"),
        ServerDescriptor::new("loop-a", "ha", "alice").with_tunnel("loop-b"),
        ServerDescriptor::new("loop-b", "hb", "alice").with_tunnel("loop-a"),
        ServerDescriptor::new("pw", "h4", "alice").with_identification(Identification::Password {
            secret_ref: "token".to_string(),
        }),
        ServerDescriptor::new("behind-pw", "h5", "alice").with_tunnel("pw"),
    ])
    .unwrap()
}

fn client_with(
    net: &Network,
    store: Arc<MemoryStore>,
    options: ClientOptions,
) -> RemoteClient<FakeTransport> {
    RemoteClient::new(
        FakeTransport { net: net.clone() },
        CredentialResolver::new(store, "hpymon"),
        registry(),
        options,
    )
}

fn client(net: &Network) -> RemoteClient<FakeTransport> {
    client_with(net, Arc::new(MemoryStore::new()), ClientOptions::default())
}

fn captured(outputs: &[&str]) -> BatchOutput {
    BatchOutput::Captured(outputs.iter().map(|s| s.to_string()).collect())
}

#[tokio::test]
async fn test_direct_server_single_session() {
    let net = Network::default();
    net.reply("echo hi", b"hi\n");

    let output = client(&net)
        .send_commands("s1", ["echo hi"], true)
        .await
        .unwrap();

    assert_eq!(output, captured(&["hi\n"]));
    assert_eq!(
        net.events(),
        vec!["connect s1 via h1:22", "exec s1: echo hi", "close s1"]
    );
}

#[tokio::test]
async fn test_two_hop_chain_end_to_end() {
    let net = Network::default();
    net.reply("echo hi", b"hi\n");

    let output = client(&net)
        .send_commands("s2", ["echo hi"], true)
        .await
        .unwrap();

    assert_eq!(output, captured(&["hi\n"]));
    assert_eq!(
        net.events(),
        vec![
            "connect s1 via h1:22",
            "forward s1 127.0.1.0:10022 -> h2:22",
            "connect s2 via 127.0.1.0:10022",
            "exec s2: echo hi",
            "close s2",
            "close forward 127.0.1.0:10022",
            "close s1",
        ]
    );
    assert_eq!(net.open_forwards(), 0);
}

#[tokio::test]
async fn test_three_hop_chain_uses_one_address_per_depth() {
    let net = Network::default();
    net.reply("hostname", b"h3\n");

    let output = client(&net)
        .send_commands("s3", ["hostname"], true)
        .await
        .unwrap();

    assert_eq!(output, captured(&["h3\n"]));
    assert_eq!(
        net.events(),
        vec![
            "connect s1 via h1:22",
            "forward s1 127.0.1.0:10022 -> h2:22",
            "connect s2 via 127.0.1.0:10022",
            "forward s2 127.0.1.1:10022 -> h3:22",
            "connect s3 via 127.0.1.1:10022",
            "exec s3: hostname",
            "close s3",
            "close forward 127.0.1.1:10022",
            "close s2",
            "close forward 127.0.1.0:10022",
            "close s1",
        ]
    );
}

#[tokio::test]
async fn test_forward_addresses_follow_settings() {
    let net = Network::default();
    net.reply("true", b"");

    let options = ClientOptions {
        forwarding: ForwardSettings {
            loopback_prefix: "127.9.9".to_string(),
            local_port: 2222,
        },
        ..Default::default()
    };
    client_with(&net, Arc::new(MemoryStore::new()), options)
        .send_commands("s2", ["true"], true)
        .await
        .unwrap();

    assert!(net
        .events()
        .contains(&"connect s2 via 127.9.9.0:2222".to_string()));
}

#[tokio::test]
async fn test_mixed_flags_through_tunnel() {
    let net = Network::default();
    net.reply("a", b"A\n").reply("b", b"B\n").reply("c", b"C\n");

    let output = client(&net)
        .send_commands("s2", ["a", "b", "c"], vec![true, false, true])
        .await
        .unwrap();

    assert_eq!(output, captured(&["A\n", "C\n"]));
    let execs: Vec<_> = net
        .events()
        .into_iter()
        .filter(|e| e.starts_with("exec"))
        .collect();
    assert_eq!(execs, vec!["exec s2: a", "exec s2: b", "exec s2: c"]);
}

#[tokio::test]
async fn test_no_flags_returns_sentinel_on_every_path() {
    let net = Network::default();
    net.reply("a", b"A\n");

    let client = client(&net);
    let direct = client.send_commands("s1", ["a"], false).await.unwrap();
    let tunneled = client.send_commands("s2", ["a"], false).await.unwrap();

    assert!(direct.is_no_output());
    assert!(tunneled.is_no_output());
}

#[tokio::test]
async fn test_teardown_after_failing_command() {
    let net = Network::default();
    net.reply("a", b"A\n");

    let err = client(&net)
        .send_commands("s2", ["a", "missing"], true)
        .await
        .unwrap_err();

    assert!(matches!(err, HpError::Command(CommandError::Exec { .. })));
    let events = net.events();
    assert_eq!(
        &events[events.len() - 3..],
        &["close s2", "close forward 127.0.1.0:10022", "close s1"]
    );
    assert_eq!(net.open_forwards(), 0);
}

#[tokio::test]
async fn test_teardown_after_inner_hop_unreachable() {
    let net = Network::default();
    net.take_down("s3");

    let err = client(&net)
        .send_commands("s3", ["hostname"], true)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        HpError::Connection(ConnectionError::Unreachable { .. })
    ));
    let events = net.events();
    assert!(!events.iter().any(|e| e.starts_with("exec")));
    assert_eq!(
        &events[events.len() - 4..],
        &[
            "close forward 127.0.1.1:10022",
            "close s2",
            "close forward 127.0.1.0:10022",
            "close s1",
        ]
    );
    assert_eq!(net.open_forwards(), 0);
}

#[tokio::test]
async fn test_invalid_batches_open_nothing() {
    let net = Network::default();
    let client = client(&net);

    let empty: [&str; 0] = [];
    let err = client.send_commands("s1", empty, true).await.unwrap_err();
    assert!(matches!(err, HpError::Command(CommandError::InvalidBatch(_))));

    let err = client
        .send_commands("s1", ["a", "b"], vec![true])
        .await
        .unwrap_err();
    assert!(matches!(err, HpError::Command(CommandError::InvalidBatch(_))));

    assert!(net.events().is_empty());
}

#[tokio::test]
async fn test_unknown_server_rejected() {
    let net = Network::default();

    let err = client(&net)
        .send_commands("nope", ["ls"], true)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        HpError::TunnelChain(TunnelChainError::UnknownServer(ref name)) if name == "nope"
    ));
}

#[tokio::test]
async fn test_check_connection_reachable() {
    let net = Network::default();
    net.reply(PROBE_COMMAND, b"file\n");

    assert!(client(&net).check_connection("s2").await);
    assert!(net.events().contains(&"exec s2: ls".to_string()));
}

#[tokio::test]
async fn test_check_connection_cycle_is_false() {
    let net = Network::default();

    assert!(!client(&net).check_connection("loop-a").await);
    assert!(net.events().is_empty());
}

#[tokio::test]
async fn test_check_connection_auth_failure_is_false() {
    let net = Network::default();
    net.reply(PROBE_COMMAND, b"");
    net.refuse_auth("s2");

    assert!(!client(&net).check_connection("s2").await);
    assert_eq!(
        net.events(),
        vec![
            "connect s1 via h1:22",
            "forward s1 127.0.1.0:10022 -> h2:22",
            "close forward 127.0.1.0:10022",
            "close s1",
        ]
    );
}

#[tokio::test]
async fn test_unresolved_password_primes_store() {
    let net = Network::default();
    let store = Arc::new(MemoryStore::new());
    let client = client_with(&net, Arc::clone(&store), ClientOptions::default());

    let err = client.send_commands("pw", ["ls"], true).await.unwrap_err();
    assert!(matches!(
        err,
        HpError::Credential(CredentialError::Unresolved { ref entry }) if entry == "pw_h4_alice"
    ));
    assert_eq!(
        store.get("hpymon", "pw_h4_alice").unwrap(),
        Some("token".to_string())
    );
    assert!(net.events().is_empty());
}

#[tokio::test]
async fn test_every_hop_resolved_before_connecting() {
    let net = Network::default();
    net.reply("ls", b"");

    let store = Arc::new(MemoryStore::new());
    let client = client_with(&net, Arc::clone(&store), ClientOptions::default());

    // Entry hop needs a password that is not stored yet
    assert!(!client.check_connection("behind-pw").await);
    assert!(net.events().is_empty());

    client.store_secret("pw", "hunter2").unwrap();
    assert!(client.check_connection("behind-pw").await);
}

#[tokio::test]
async fn test_job_helpers() {
    let net = Network::default();
    net.reply("squeue -o %all -u alice", b"JOBID|NAME\n42|sim\n")
        .reply("scancel 42 43", b"");

    let client = client(&net);
    let listing = client.fetch_job_list("s2").await.unwrap();
    assert_eq!(listing, "JOBID|NAME\n42|sim\n");

    client.kill_jobs("s2", ["42", "43"]).await.unwrap();
    assert!(net
        .events()
        .contains(&"exec s2: scancel 42 43".to_string()));
}

#[tokio::test]
async fn test_kill_jobs_without_ids_sends_nothing() {
    let net = Network::default();
    let client = client(&net);

    let none: [&str; 0] = [];
    let err = client.kill_jobs("s2", none).await.unwrap_err();
    assert!(matches!(err, HpError::Command(CommandError::InvalidBatch(_))));

    let err = client.kill_jobs("s2", [" "]).await.unwrap_err();
    assert!(matches!(err, HpError::Command(CommandError::InvalidBatch(_))));

    assert!(net.events().is_empty());
}

#[tokio::test]
async fn test_password_entry_hop_trusted_on_first_use() {
    let net = Network::default();
    net.reply("ls", b"");

    let client = client(&net);
    client.store_secret("pw", "hunter2").unwrap();

    client.send_commands("behind-pw", ["ls"], true).await.unwrap();
    assert_eq!(
        net.policies(),
        vec![
            ("pw".to_string(), HostKeyPolicy::AcceptNew),
            ("behind-pw".to_string(), HostKeyPolicy::AcceptNew),
        ]
    );

    // The same server as the command target needs a known host key
    client.send_commands("pw", ["ls"], true).await.unwrap();
    assert_eq!(
        net.policies().last(),
        Some(&("pw".to_string(), HostKeyPolicy::Strict))
    );
}

#[tokio::test]
async fn test_configured_policy_applies_to_every_hop() {
    let net = Network::default();
    net.reply("ls", b"");

    let options = ClientOptions {
        host_key_policy: HostKeyPolicy::Strict,
        ..Default::default()
    };
    client_with(&net, Arc::new(MemoryStore::new()), options)
        .send_commands("s2", ["ls"], true)
        .await
        .unwrap();

    assert_eq!(
        net.policies(),
        vec![
            ("s1".to_string(), HostKeyPolicy::Strict),
            ("s2".to_string(), HostKeyPolicy::Strict),
        ]
    );
}
