//! TCP server for the pairchat relay.
//!
//! The server:
//! - Listens on a TCP address for client connections
//! - Spawns a `Session` task for each client
//! - Logs registry events as they happen
//! - Supports graceful shutdown via CancellationToken
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │   ChatServer    │
//! │                 │
//! │   TcpListener   │
//! └───────┬─────────┘
//!         │ accept()
//!         ▼
//! ┌─────────────────┐     ┌─────────────────┐
//! │     Session     │────▶│  RegistryHandle │
//! │   (per client)  │     │                 │
//! └─────────────────┘     └────────┬────────┘
//!         ▲                        │
//!         │ Outbound               │ RegistryEvent
//!         │ (partner lines)        ▼
//! ┌─────────────────┐     ┌─────────────────┐
//! │ partner Session │     │  event logger   │
//! └─────────────────┘     └─────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Accept errors are logged and the loop continues
//! - Session failures stay inside their own task

mod session;

pub use session::{Session, SessionError, SessionState};

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{Config, DEFAULT_MAX_LINE_LENGTH};
use crate::registry::{RegistryEvent, RegistryHandle};

/// Per-connection limits handed to every session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSettings {
    /// Longest accepted input line in bytes
    pub max_line_length: usize,
    /// Disconnect after this long without input
    pub idle_timeout: Option<Duration>,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
            idle_timeout: None,
        }
    }
}

impl From<&Config> for SessionSettings {
    fn from(config: &Config) -> Self {
        Self {
            max_line_length: config.max_line_length,
            idle_timeout: config.idle_timeout,
        }
    }
}

/// TCP server for the relay.
///
/// Owns the listener and spawns one session per accepted connection.
pub struct ChatServer {
    /// Bound listener
    listener: TcpListener,

    /// Handle to the name registry
    registry: RegistryHandle,

    /// Limits applied to every session
    settings: SessionSettings,

    /// Cancellation token for graceful shutdown
    cancel_token: CancellationToken,

    /// Connection counter used as a log correlation id
    connection_counter: AtomicU64,
}

impl ChatServer {
    /// Binds the listener.
    ///
    /// # Errors
    ///
    /// Returns `ServerError::Bind` if the address cannot be bound. This is
    /// fatal to the process.
    pub async fn bind(
        addr: &str,
        registry: RegistryHandle,
        settings: SessionSettings,
        cancel_token: CancellationToken,
    ) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::Bind {
                addr: addr.to_string(),
                error: e.to_string(),
            })?;

        Ok(Self {
            listener,
            registry,
            settings,
            cancel_token,
            connection_counter: AtomicU64::new(0),
        })
    }

    /// Returns the address actually bound (useful with port 0).
    ///
    /// # Errors
    ///
    /// Returns `ServerError::LocalAddr` if the socket cannot report it.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        self.listener
            .local_addr()
            .map_err(|e| ServerError::LocalAddr(e.to_string()))
    }

    /// Runs the server.
    ///
    /// Accepts connections until the cancellation token is triggered.
    /// Sessions hold child tokens, so they end and release their names on
    /// the same signal.
    pub async fn run(self) -> Result<(), ServerError> {
        let addr = self.local_addr()?;
        info!(addr = %addr, "Relay server listening");

        self.spawn_event_logger();

        loop {
            tokio::select! {
                _ = self.cancel_token.cancelled() => {
                    info!("Server shutdown requested");
                    break;
                }

                result = self.listener.accept() => {
                    match result {
                        Ok((stream, peer)) => {
                            let conn_num = self.connection_counter.fetch_add(1, Ordering::Relaxed);
                            self.handle_connection(stream, peer, conn_num);
                        }
                        Err(e) => {
                            error!(error = %e, "Failed to accept connection");
                        }
                    }
                }
            }
        }

        self.cleanup();
        Ok(())
    }

    /// Spawns a session task for a new connection.
    fn handle_connection(&self, stream: TcpStream, peer: SocketAddr, connection_number: u64) {
        debug!(connection = connection_number, peer = %peer, "Client connected");

        if let Err(e) = stream.set_nodelay(true) {
            debug!(connection = connection_number, error = %e, "Failed to set TCP_NODELAY");
        }

        let (reader, writer) = stream.into_split();
        let session = Session::new(
            reader,
            writer,
            self.registry.clone(),
            self.settings,
            self.cancel_token.child_token(),
            connection_number,
        );

        tokio::spawn(async move {
            let name = session.run().await;
            debug!(
                connection = connection_number,
                peer = %peer,
                name = ?name,
                "Client disconnected"
            );
        });
    }

    /// Spawns the task that logs registry events.
    fn spawn_event_logger(&self) {
        let mut event_rx = self.registry.subscribe();
        let cancel_token = self.cancel_token.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel_token.cancelled() => {
                        debug!("Event logger shutting down");
                        break;
                    }

                    result = event_rx.recv() => {
                        match result {
                            Ok(event) => log_event(&event),
                            Err(broadcast::error::RecvError::Lagged(n)) => {
                                warn!(skipped = n, "Event logger lagged, skipped events");
                            }
                            Err(broadcast::error::RecvError::Closed) => {
                                debug!("Event channel closed");
                                break;
                            }
                        }
                    }
                }
            }
        });
    }

    /// Performs cleanup on shutdown.
    fn cleanup(&self) {
        info!(
            connections = self.connection_counter.load(Ordering::Relaxed),
            "Server cleanup complete"
        );
    }
}

fn log_event(event: &RegistryEvent) {
    match event {
        RegistryEvent::Registered { name } => debug!(name = %name, "event: registered"),
        RegistryEvent::Paired {
            requester,
            candidate,
        } => debug!(requester = %requester, candidate = %candidate, "event: paired"),
        RegistryEvent::Released { name, partner } => {
            debug!(name = %name, partner = ?partner, "event: released")
        }
    }
}

/// Errors that can occur in server operations.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Failed to bind {addr}: {error}")]
    Bind { addr: String, error: String },

    #[error("Failed to read local address: {0}")]
    LocalAddr(String),
}
