//! Error types for the pairchat terminal client.
//!
//! **Panic-Free Policy:** No `.unwrap()`, `.expect()`, `panic!()`,
//! `unreachable!()`, or `todo!()` outside of tests.

use std::io;

use pairchat_protocol::ProtocolError;
use thiserror::Error;
use tokio_util::codec::LinesCodecError;

// ============================================================================
// Client Error Type
// ============================================================================

/// Errors that end a client run.
#[derive(Error, Debug)]
pub enum ClientError {
    /// Could not reach the relay server.
    ///
    /// Usually the server is not running or the address is wrong.
    #[error("Failed to connect to {addr}: {error}")]
    Connect {
        /// Address that was dialed
        addr: String,
        /// Underlying failure
        error: String,
    },

    /// A line could not be read from the server or from the terminal.
    #[error("Failed to read line: {0}")]
    Read(#[from] LinesCodecError),

    /// Outgoing text could not be encoded as a protocol line.
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// I/O error passthrough.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Convenience Result type alias for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;
