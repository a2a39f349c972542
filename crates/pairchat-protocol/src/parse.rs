//! Client-to-server line handling.
//!
//! Once paired, every line a client sends is relayed. Lines carrying the
//! `MESSAGE ` marker are content and get re-wrapped with the sender's name;
//! everything else is passed through untouched.

use pairchat_core::ScreenName;
use thiserror::Error;

use crate::message::ServerLine;
use crate::MESSAGE_PREFIX;

/// Errors building outgoing protocol lines.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// A line break inside a payload would split it into several lines.
    #[error("payload contains a line break")]
    EmbeddedNewline,
}

/// A line received from a paired client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientLine<'a> {
    /// Text following the `MESSAGE ` marker.
    Content(&'a str),

    /// Any other line (header framing, blank lines, stray text).
    PassThrough(&'a str),
}

impl<'a> ClientLine<'a> {
    /// Classifies a raw input line.
    pub fn classify(line: &'a str) -> Self {
        match line.strip_prefix(MESSAGE_PREFIX) {
            Some(text) => Self::Content(text),
            None => Self::PassThrough(line),
        }
    }

    /// Builds the line delivered to the partner of `sender`.
    pub fn relay(self, sender: &ScreenName) -> ServerLine {
        match self {
            Self::Content(text) => ServerLine::Message(format!("{sender}: {text}")),
            Self::PassThrough(line) => ServerLine::Raw(line.to_string()),
        }
    }
}

/// Encodes user text as a client content line (`MESSAGE <text>`).
///
/// # Errors
///
/// Returns `ProtocolError::EmbeddedNewline` if `text` contains `\n` or `\r`.
pub fn encode_message(text: &str) -> Result<String, ProtocolError> {
    if text.contains(['\n', '\r']) {
        return Err(ProtocolError::EmbeddedNewline);
    }
    Ok(format!("{MESSAGE_PREFIX}{text}"))
}
