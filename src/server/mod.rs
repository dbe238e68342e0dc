//! The SSH honeypot server: TCP accept loop and per-connection fan-out.
//!
//! A producer task owns the listener and publishes accepted connections on an
//! in-memory channel; the main loop selects between that channel and the
//! shutdown token and spawns one session task per connection. Cancellation
//! closes the listener while in-flight sessions drain; a second (force)
//! cancellation aborts them.

pub mod handler;
pub mod terminal;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use russh::{MethodKind, SshId};
use russh::keys::ssh_key::PrivateKey;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::SshConfig;
use crate::errors::EngineError;
use crate::event::Event;
use crate::policy::AuthPolicy;
use crate::server::handler::SessionHandler;

/// Backlog of accepted-but-not-yet-handled connections.
const ACCEPT_QUEUE: usize = 16;

/// The SSH honeypot service.
pub struct SshServer {
    config: Arc<russh::server::Config>,
    policy: Arc<AuthPolicy>,
    prompt: String,
    tx: mpsc::Sender<Event>,
}

impl SshServer {
    /// Build the server from its configuration and installed host keys.
    pub fn new(config: &SshConfig, keys: Vec<PrivateKey>, tx: mpsc::Sender<Event>) -> Self {
        let policy = Arc::new(AuthPolicy {
            username: config.username.clone(),
            password: config.password.clone(),
            max_retry: config.max_retry,
        });

        let server_config = russh::server::Config {
            server_id: SshId::Standard(config.banner.clone()),
            keys,
            methods: (&[MethodKind::Password]).as_slice().into(),
            auth_rejection_time: Duration::from_secs(1),
            auth_rejection_time_initial: Some(Duration::ZERO),
            // Attackers may idle; every extra second on the wire is data.
            inactivity_timeout: None,
            ..Default::default()
        };

        Self {
            config: Arc::new(server_config),
            policy,
            prompt: config.prompt.clone(),
            tx,
        }
    }

    /// Bind `addr` and serve until `shutdown` is cancelled.
    pub async fn serve(
        &self,
        addr: &str,
        shutdown: CancellationToken,
        force: CancellationToken,
    ) -> Result<(), EngineError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| EngineError::Bind {
                addr: addr.to_string(),
                source,
            })?;
        info!(addr = %listener.local_addr()?, "SSH honeypot listening");
        self.serve_with(listener, shutdown, force).await
    }

    /// Serve connections from an already-bound listener.
    pub async fn serve_with(
        &self,
        listener: TcpListener,
        shutdown: CancellationToken,
        force: CancellationToken,
    ) -> Result<(), EngineError> {
        let (conn_tx, mut conn_rx) = mpsc::channel::<(TcpStream, SocketAddr)>(ACCEPT_QUEUE);

        let accept_shutdown = shutdown.clone();
        let producer = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = accept_shutdown.cancelled() => break,
                    accepted = listener.accept() => match accepted {
                        Ok(pair) => {
                            if conn_tx.send(pair).await.is_err() {
                                break;
                            }
                        }
                        Err(err) => {
                            // Transient accept errors must not take down the
                            // listener.
                            warn!(error = %err, "failed to accept incoming connection");
                        }
                    }
                }
            }
        });

        let mut sessions = JoinSet::new();
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                conn = conn_rx.recv() => {
                    let Some((stream, peer)) = conn else { break };
                    debug!(%peer, "accepted TCP connection");

                    let config = self.config.clone();
                    let handler = SessionHandler::new(
                        peer,
                        self.tx.clone(),
                        self.policy.clone(),
                        self.prompt.clone(),
                    );
                    sessions.spawn(async move {
                        match russh::server::run_stream(config, stream, handler).await {
                            Ok(session) => {
                                if let Err(err) = session.await {
                                    debug!(%peer, error = %err, "SSH session ended with error");
                                }
                            }
                            Err(err) => {
                                debug!(%peer, error = %err, "SSH handshake failed");
                            }
                        }
                    });
                }
            }
        }

        drop(conn_rx);
        let _ = producer.await;

        if !sessions.is_empty() {
            info!(count = sessions.len(), "waiting for in-flight SSH sessions");
        }
        loop {
            tokio::select! {
                _ = force.cancelled() => {
                    warn!("force shutdown, aborting in-flight SSH sessions");
                    sessions.abort_all();
                    while sessions.join_next().await.is_some() {}
                    break;
                }
                joined = sessions.join_next() => {
                    if joined.is_none() {
                        break;
                    }
                }
            }
        }

        info!("SSH honeypot stopped");
        Ok(())
    }
}
