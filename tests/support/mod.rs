//! Test fixtures: an in-process SSH server with scripted exec replies and
//! direct-tcpip forwarding, and a TCP proxy whose live connections can be
//! severed to simulate a dying transport.

// Each test binary compiles this module separately and uses a different
// subset of it.
#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use russh::server::{self, Auth, Msg, Server};
use russh::{Channel, ChannelId, CryptoVec};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

use aosgate::inventory::{Device, JumpHost};

pub struct MockState {
    user: String,
    password: String,
    replies: Mutex<HashMap<String, String>>,
    exec_delay: Mutex<Duration>,
    connections: AtomicUsize,
    execs: AtomicUsize,
    tunnels: AtomicUsize,
}

impl MockState {
    fn reply_for(&self, command: &str) -> String {
        self.replies
            .lock()
            .expect("replies lock")
            .get(command)
            .cloned()
            .unwrap_or_else(|| format!("unknown command: {command}"))
    }
}

/// A scripted SSH server on an ephemeral port.
pub struct MockSshServer {
    pub addr: SocketAddr,
    state: Arc<MockState>,
    task: JoinHandle<()>,
}

impl MockSshServer {
    pub async fn start(user: &str, password: &str) -> MockSshServer {
        MockSshServer::start_on("127.0.0.1", user, password).await
    }

    /// Binds on `bind_host` so tests can hand out distinct endpoint
    /// addresses on the loopback range.
    pub async fn start_on(bind_host: &str, user: &str, password: &str) -> MockSshServer {
        let key = russh::keys::PrivateKey::random(
            &mut rand_core::OsRng,
            russh::keys::Algorithm::Ed25519,
        )
        .expect("generate host key");
        let config = Arc::new(server::Config {
            keys: vec![key],
            auth_rejection_time: Duration::from_millis(0),
            ..Default::default()
        });

        let listener = TcpListener::bind((bind_host, 0))
            .await
            .expect("bind mock ssh server");
        let addr = listener.local_addr().expect("mock server addr");

        let state = Arc::new(MockState {
            user: user.to_string(),
            password: password.to_string(),
            replies: Mutex::new(HashMap::new()),
            exec_delay: Mutex::new(Duration::ZERO),
            connections: AtomicUsize::new(0),
            execs: AtomicUsize::new(0),
            tunnels: AtomicUsize::new(0),
        });

        let mut acceptor = MockAcceptor {
            state: state.clone(),
        };
        let task = tokio::spawn(async move {
            let _ = acceptor.run_on_socket(config, &listener).await;
        });

        MockSshServer { addr, state, task }
    }

    /// Registers the stdout returned for an exact command string.
    pub fn script(&self, command: &str, stdout: &str) {
        self.state
            .replies
            .lock()
            .expect("replies lock")
            .insert(command.to_string(), stdout.to_string());
    }

    /// Delays every exec reply, for contention tests.
    pub fn set_exec_delay(&self, delay: Duration) {
        *self.state.exec_delay.lock().expect("delay lock") = delay;
    }

    /// Number of SSH connections accepted so far.
    pub fn connections(&self) -> usize {
        self.state.connections.load(Ordering::SeqCst)
    }

    /// Number of exec requests served so far.
    pub fn execs(&self) -> usize {
        self.state.execs.load(Ordering::SeqCst)
    }

    /// Number of direct-tcpip channels opened so far.
    pub fn tunnels(&self) -> usize {
        self.state.tunnels.load(Ordering::SeqCst)
    }
}

impl Drop for MockSshServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

struct MockAcceptor {
    state: Arc<MockState>,
}

impl Server for MockAcceptor {
    type Handler = MockHandler;

    fn new_client(&mut self, _peer_addr: Option<SocketAddr>) -> MockHandler {
        self.state.connections.fetch_add(1, Ordering::SeqCst);
        MockHandler {
            state: self.state.clone(),
        }
    }
}

struct MockHandler {
    state: Arc<MockState>,
}

impl server::Handler for MockHandler {
    type Error = russh::Error;

    async fn auth_password(&mut self, user: &str, password: &str) -> Result<Auth, Self::Error> {
        // A scripted password of "*" accepts anything, for re-provisioning
        // scenarios.
        if user == self.state.user && (self.state.password == "*" || password == self.state.password)
        {
            Ok(Auth::Accept)
        } else {
            Ok(Auth::Reject {
                proceed_with_methods: None,
                partial_success: false,
            })
        }
    }

    async fn channel_open_session(
        &mut self,
        _channel: Channel<Msg>,
        _session: &mut server::Session,
    ) -> Result<bool, Self::Error> {
        Ok(true)
    }

    async fn exec_request(
        &mut self,
        channel: ChannelId,
        data: &[u8],
        session: &mut server::Session,
    ) -> Result<(), Self::Error> {
        let command = String::from_utf8_lossy(data).to_string();
        self.state.execs.fetch_add(1, Ordering::SeqCst);
        let reply = self.state.reply_for(&command);
        let delay = *self.state.exec_delay.lock().expect("delay lock");
        let handle = session.handle();
        tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            let _ = handle.channel_success(channel).await;
            let _ = handle.data(channel, CryptoVec::from_slice(reply.as_bytes())).await;
            let _ = handle.exit_status_request(channel, 0).await;
            let _ = handle.eof(channel).await;
            let _ = handle.close(channel).await;
        });
        Ok(())
    }

    async fn channel_open_direct_tcpip(
        &mut self,
        channel: Channel<Msg>,
        host_to_connect: &str,
        port_to_connect: u32,
        _originator_address: &str,
        _originator_port: u32,
        _session: &mut server::Session,
    ) -> Result<bool, Self::Error> {
        self.state.tunnels.fetch_add(1, Ordering::SeqCst);
        let target = format!("{host_to_connect}:{port_to_connect}");
        tokio::spawn(async move {
            if let Ok(mut tcp) = TcpStream::connect(&target).await {
                let mut stream = channel.into_stream();
                let _ = tokio::io::copy_bidirectional(&mut stream, &mut tcp).await;
            }
        });
        Ok(true)
    }
}

/// TCP forwarder in front of a mock server. `sever` aborts every proxied
/// connection while keeping the listener alive, so the next dial succeeds.
pub struct TcpProxy {
    pub addr: SocketAddr,
    live: Arc<Mutex<Vec<JoinHandle<()>>>>,
    accept_task: JoinHandle<()>,
}

impl TcpProxy {
    pub async fn start(target: SocketAddr) -> TcpProxy {
        let listener = TcpListener::bind(("127.0.0.1", 0))
            .await
            .expect("bind tcp proxy");
        let addr = listener.local_addr().expect("proxy addr");
        let live: Arc<Mutex<Vec<JoinHandle<()>>>> = Arc::new(Mutex::new(Vec::new()));

        let conns = live.clone();
        let accept_task = tokio::spawn(async move {
            loop {
                let Ok((mut inbound, _)) = listener.accept().await else {
                    break;
                };
                let task = tokio::spawn(async move {
                    if let Ok(mut outbound) = TcpStream::connect(target).await {
                        let _ = tokio::io::copy_bidirectional(&mut inbound, &mut outbound).await;
                    }
                });
                conns.lock().expect("conns lock").push(task);
            }
        });

        TcpProxy {
            addr,
            live,
            accept_task,
        }
    }

    /// Kills every live connection through the proxy.
    pub fn sever(&self) {
        for task in self.live.lock().expect("conns lock").drain(..) {
            task.abort();
        }
    }
}

impl Drop for TcpProxy {
    fn drop(&mut self) {
        self.sever();
        self.accept_task.abort();
    }
}

/// Device record pointing at a mock server.
pub fn device_for(addr: SocketAddr, user: &str, password: &str) -> Device {
    Device {
        host: addr.ip().to_string(),
        user: Some(user.to_string()),
        password: Some(password.to_string()),
        key_file: None,
        port: addr.port(),
        jump_ssh_name: None,
        tags: Vec::new(),
    }
}

/// Jump-host record pointing at a mock server (or a proxy in front of one).
pub fn jump_for(name: &str, addr: SocketAddr, user: &str, password: &str) -> JumpHost {
    JumpHost {
        name: name.to_string(),
        public_host: addr.ip().to_string(),
        public_port: addr.port(),
        private_host: "192.168.255.1".to_string(),
        private_port: 22,
        user: user.to_string(),
        password: password.to_string(),
    }
}
