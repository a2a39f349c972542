//! pairchat protocol - the newline-delimited text protocol
//!
//! Server-to-client control lines are fixed literal tokens
//! (`SUBMITNAME`, `NAMEACCEPTED`, `SUBMITPART`, `PARTACCEPTED`,
//! `PARTLEFT`) plus `MESSAGE <text>` payloads. Client-to-server lines are
//! free text: a requested name or partner before pairing, relayed content
//! after it.

pub mod message;
pub mod parse;

pub use message::ServerLine;
pub use parse::{encode_message, ClientLine, ProtocolError};

/// Port the relay listens on in the reference deployment.
pub const DEFAULT_PORT: u16 = 8999;

/// Prefix marking a content line in both directions.
pub const MESSAGE_PREFIX: &str = "MESSAGE ";
