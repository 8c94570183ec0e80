// Copyright (c) 2024-present, snapdb
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The listener (component J, `spec.md` §4.J): binds the configured
//! address, accepts connections on a dedicated thread, and spawns one
//! worker thread per connection — no async runtime, per `spec.md` §5's
//! "blocking I/O, one OS thread per connection" concurrency model.

mod cancel;
mod error;
pub mod registry;
mod stream;
mod worker;

pub use error::{Error, Result};
pub use registry::{ConnectionHandle, ConnectionRegistry};

use crate::config::ServerConfig;
use crate::security::{CredentialStore, ResumeRegistry, TlsAcceptor};
use crate::session::Catalog;
use std::net::TcpListener;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Everything a connection worker needs, shared read-only across every
/// thread for the listener's lifetime.
pub struct ServerOptions {
    pub config: Arc<ServerConfig>,
    pub catalog: Arc<Catalog>,
    pub credentials: Arc<dyn CredentialStore + Send + Sync>,
    pub tls_acceptor: Option<Arc<TlsAcceptor>>,
    pub resumes: Arc<ResumeRegistry>,
}

/// One connection's entry in a [`ServerStatus`] snapshot.
#[derive(Debug, Clone)]
pub struct ConnectionSummary {
    pub id: u64,
    pub peer: std::net::SocketAddr,
    pub user: Option<String>,
    pub connected_for: Duration,
}

/// A point-in-time summary of the listener's state, for a `status`
/// command or an admin endpoint (`spec.md`'s supplemented ambient
/// surface; the source exposes an equivalent via its service control
/// panel).
#[derive(Debug, Clone)]
pub struct ServerStatus {
    pub server_name: String,
    pub local_port: u16,
    pub connection_count: usize,
    pub connections: Vec<ConnectionSummary>,
    pub attached_archive_count: usize,
    pub uptime: Duration,
}

/// Grounded on the teacher's `StopSignal`: a cloneable atomic flag the
/// accept loop polls once per iteration.
#[derive(Clone, Default)]
struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    fn send(&self) {
        self.0.store(true, Ordering::Release);
    }

    fn is_stopped(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// The running TCP listener. Dropping or calling [`Listener::shutdown`]
/// stops the accept loop; in-flight connections are allowed to finish
/// their current command before their thread notices and exits.
pub struct Listener {
    tcp: TcpListener,
    options: Arc<ServerOptions>,
    connections: Arc<ConnectionRegistry>,
    stop: StopSignal,
    started_at: Instant,
}

/// The accept-loop poll interval: how promptly `shutdown` is noticed.
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(200);

impl Listener {
    /// Binds `options.config.local_ip:local_port` (`spec.md` §6.3).
    pub fn bind(options: ServerOptions) -> std::io::Result<Self> {
        let addr = std::net::SocketAddr::new(options.config.local_ip, options.config.local_port);
        let tcp = TcpListener::bind(addr)?;
        tcp.set_nonblocking(true)?;
        Ok(Self { tcp, options: Arc::new(options), connections: Arc::new(ConnectionRegistry::new()), stop: StopSignal::default(), started_at: Instant::now() })
    }

    /// Runs the accept loop on the calling thread until [`Self::shutdown`]
    /// is called from another thread (typically a signal handler wired
    /// up by `bin/snapdbd.rs`).
    pub fn run(&self) -> std::io::Result<()> {
        log::info!("listening on {} as {}", self.tcp.local_addr()?, self.options.config.server_name);

        while !self.stop.is_stopped() {
            match self.tcp.accept() {
                Ok((stream, peer)) => {
                    if stream.set_nonblocking(false).is_err() {
                        continue;
                    }
                    log::debug!("accepted connection from {peer}");
                    let options = Arc::clone(&self.options);
                    let connections = Arc::clone(&self.connections);
                    thread::spawn(move || {
                        if let Err(err) = worker::serve(stream, options, connections) {
                            log::warn!("connection from {peer} failed: {err}");
                        }
                    });
                }
                Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                    thread::sleep(ACCEPT_POLL_INTERVAL);
                }
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }

    /// Stops the accept loop; does not forcibly close already-accepted
    /// connections, which run their own command loop to completion.
    pub fn shutdown(&self) {
        self.stop.send();
    }

    #[must_use]
    pub fn status(&self) -> ServerStatus {
        let snapshot = self.connections.snapshot();
        let connections = snapshot
            .iter()
            .map(|handle| ConnectionSummary { id: handle.id, peer: handle.peer, user: handle.user(), connected_for: handle.connected_at.elapsed() })
            .collect();
        let attached_archive_count = self.options.catalog.names().iter().filter_map(|name| self.options.catalog.get(name)).map(|e| e.archives().len()).sum();

        ServerStatus {
            server_name: self.options.config.server_name.clone(),
            local_port: self.options.config.local_port,
            connection_count: snapshot.len(),
            connections,
            attached_archive_count,
            uptime: self.started_at.elapsed(),
        }
    }

    #[must_use]
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.tcp.local_addr()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::srp;
    use crate::security::scram;
    use test_log::test;

    struct EmptyStore;
    impl CredentialStore for EmptyStore {
        fn srp_verifier(&self, _user: &str) -> Option<srp::Verifier> {
            None
        }
        fn scram_credential(&self, _user: &str) -> Option<scram::StoredCredential<sha2::Sha256>> {
            None
        }
        fn user_exists(&self, _user: &str) -> bool {
            false
        }
    }

    fn test_options() -> ServerOptions {
        ServerOptions {
            config: Arc::new(crate::config::ConfigBuilder::new().freeze()),
            catalog: Arc::new(Catalog::new()),
            credentials: Arc::new(EmptyStore),
            tls_acceptor: None,
            resumes: Arc::new(ResumeRegistry::default()),
        }
    }

    #[test]
    fn bind_picks_an_ephemeral_port_when_configured_for_one() {
        let mut builder = crate::config::ConfigBuilder::new();
        builder.local_port = 0;
        let mut options = test_options();
        options.config = Arc::new(builder.freeze());

        let listener = Listener::bind(options).expect("bind");
        assert_ne!(listener.local_addr().expect("addr").port(), 0);
    }

    #[test]
    fn shutdown_stops_a_running_accept_loop() {
        let mut builder = crate::config::ConfigBuilder::new();
        builder.local_port = 0;
        let mut options = test_options();
        options.config = Arc::new(builder.freeze());

        let listener = Arc::new(Listener::bind(options).expect("bind"));
        let runner = Arc::clone(&listener);
        let join = thread::spawn(move || runner.run());

        thread::sleep(Duration::from_millis(50));
        listener.shutdown();
        join.join().expect("thread join").expect("run returns Ok");
    }

    #[test]
    fn status_reports_the_configured_name_and_an_empty_connection_list() {
        let mut builder = crate::config::ConfigBuilder::new();
        builder.local_port = 0;
        builder.server_name = "test-server".to_string();
        let mut options = test_options();
        options.config = Arc::new(builder.freeze());

        let listener = Listener::bind(options).expect("bind");
        let status = listener.status();
        assert_eq!(status.server_name, "test-server");
        assert_eq!(status.connection_count, 0);
        assert!(status.connections.is_empty());
        assert_eq!(status.attached_archive_count, 0);
    }
}
