//! Proxy server module
//!
//! This module implements the listener and dispatcher: it binds the local
//! endpoint, accepts clients and hands each one to its own session task.

use log::{debug, error, info, warn};
use openssl::ssl::SslConnector;
use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tokio::select;

use super::handler::handle_connection;
use super::message::{create_channel, ForwarderHandle, ForwarderMessage};
use super::stats::SessionStats;
use crate::common::{Endpoint, ProxyError, Result};
use crate::config::{ForwarderConfig, SessionSettings};

/// Pending connection queue length for the listening socket
const LISTEN_BACKLOG: i32 = 1024;

/// Pause after a failed accept so resource exhaustion does not spin the loop
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// TCP to TLS forwarder
///
/// Owns the bound listener. Nothing is accepted until `start` is called.
pub struct Forwarder {
    /// Bound listening socket
    listener: TcpListener,
    /// Address the listener is actually bound to
    local_addr: SocketAddr,
    /// Remote TLS endpoint, fixed for the lifetime of the forwarder
    remote: Arc<Endpoint>,
    /// TLS connector shared by all sessions
    connector: Arc<SslConnector>,
    /// Settings shared by all sessions
    settings: Arc<SessionSettings>,
    /// How long in-flight sessions may keep running after shutdown
    shutdown_timeout: Duration,
}

impl Forwarder {
    /// Bind the local endpoint
    ///
    /// Address reuse is enabled on the listening socket. Bind failures are
    /// returned immediately and never retried.
    ///
    /// # Errors
    ///
    /// * `ProxyError::Config` if an endpoint is missing or does not resolve
    /// * `ProxyError::Bind` if the socket cannot be bound or put in listening state
    pub async fn bind(config: &ForwarderConfig, connector: SslConnector) -> Result<Self> {
        let local = config.local()?;
        // Fail on a missing remote before touching the network
        config.remote()?;

        let addr = local.resolve().await?;
        let listener = bind_listener(addr)?;

        Self::from_listener(listener, config, connector)
    }

    /// Build a forwarder around an already bound listener
    ///
    /// `config.local` is ignored; everything else applies as in `bind`.
    pub fn from_listener(
        listener: TcpListener,
        config: &ForwarderConfig,
        connector: SslConnector,
    ) -> Result<Self> {
        let remote = config.remote()?.clone();
        let local_addr = listener.local_addr()?;

        Ok(Self {
            listener,
            local_addr,
            remote: Arc::new(remote),
            connector: Arc::new(connector),
            settings: Arc::new(config.session_settings()),
            shutdown_timeout: config.shutdown_timeout(),
        })
    }

    /// Address the listener is bound to
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Remote endpoint every session connects to
    pub fn remote(&self) -> &Endpoint {
        &self.remote
    }

    /// Start accepting connections on a background task
    ///
    /// # Returns
    ///
    /// A control handle and the dispatcher's join handle. The join handle
    /// resolves after shutdown once in-flight sessions have drained.
    pub fn start(self) -> (ForwarderHandle, JoinHandle<Result<()>>) {
        let stats = Arc::new(SessionStats::default());
        let (handle, rx) = create_channel(Arc::clone(&stats));
        let task = tokio::spawn(self.run(rx, stats));
        (handle, task)
    }

    /// Dispatcher loop
    async fn run(self, mut rx: mpsc::Receiver<ForwarderMessage>, stats: Arc<SessionStats>) -> Result<()> {
        let Forwarder {
            listener,
            local_addr,
            remote,
            connector,
            settings,
            shutdown_timeout,
        } = self;

        info!("TLS forwarder listening on {}", local_addr);
        info!("Forwarding to {} with TLS", remote);

        let mut sessions: JoinSet<()> = JoinSet::new();

        loop {
            select! {
                accepted = listener.accept() => {
                    match accepted {
                        Ok((client_stream, client_addr)) => {
                            info!("New connection from {}", client_addr);
                            spawn_session(
                                &mut sessions,
                                &stats,
                                client_stream,
                                client_addr,
                                Arc::clone(&remote),
                                Arc::clone(&connector),
                                Arc::clone(&settings),
                            );
                        }
                        Err(e) => {
                            error!("Error accepting connection: {}", e);
                            tokio::time::sleep(ACCEPT_BACKOFF).await;
                        }
                    }
                }

                message = rx.recv() => {
                    match message {
                        Some(ForwarderMessage::Stats { response }) => {
                            let _ = response.send(stats.snapshot());
                        }
                        Some(ForwarderMessage::Shutdown) => {
                            info!("Shutting down, no longer accepting connections");
                            break;
                        }
                        None => {
                            info!("All forwarder handles dropped, shutting down");
                            break;
                        }
                    }
                }

                Some(joined) = sessions.join_next() => {
                    if let Err(e) = joined {
                        error!("Session task error: {}", e);
                    }
                }
            }
        }

        // Release the port before waiting on sessions
        drop(listener);
        drain_sessions(&mut sessions, shutdown_timeout).await;

        info!("TLS forwarder on {} stopped", local_addr);
        Ok(())
    }
}

/// Spawn the task owning one session
fn spawn_session(
    sessions: &mut JoinSet<()>,
    stats: &Arc<SessionStats>,
    client_stream: TcpStream,
    client_addr: SocketAddr,
    remote: Arc<Endpoint>,
    connector: Arc<SslConnector>,
    settings: Arc<SessionSettings>,
) {
    let guard = stats.session_started();

    sessions.spawn(async move {
        debug!("Starting session {} -> {}", client_addr, remote);

        if let Err(e) = handle_connection(client_stream, client_addr, &remote, &connector, &settings).await {
            guard.mark_failed();
            if e.is_session_error() {
                warn!("Session {} -> {} ended: {}", client_addr, remote, e);
            } else {
                error!("Session {} -> {} failed: {}", client_addr, remote, e);
            }
        }

        drop(guard);
        debug!("Connection from {} closed", client_addr);
    });
}

/// Wait for in-flight sessions, aborting whatever is left after `grace`
async fn drain_sessions(sessions: &mut JoinSet<()>, grace: Duration) {
    if sessions.is_empty() {
        return;
    }

    info!("Waiting up to {:?} for {} active sessions to finish", grace, sessions.len());

    let drained = tokio::time::timeout(grace, async {
        while let Some(joined) = sessions.join_next().await {
            if let Err(e) = joined {
                error!("Session task error during shutdown: {}", e);
            }
        }
    })
    .await;

    if drained.is_err() {
        warn!("Shutdown timeout reached, closing {} remaining sessions", sessions.len());
        sessions.shutdown().await;
    }
}

/// Create a listening socket with address reuse enabled
fn bind_listener(addr: SocketAddr) -> Result<TcpListener> {
    let bind_error = |source: io::Error| ProxyError::Bind { addr, source };

    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))
        .map_err(bind_error)?;
    socket.set_reuse_address(true).map_err(bind_error)?;
    socket.set_nonblocking(true).map_err(bind_error)?;
    socket.bind(&addr.into()).map_err(bind_error)?;
    socket.listen(LISTEN_BACKLOG).map_err(bind_error)?;

    TcpListener::from_std(socket.into()).map_err(bind_error)
}
