//! Server-to-client lines.

use std::fmt;

use crate::MESSAGE_PREFIX;

const SUBMIT_NAME: &str = "SUBMITNAME";
const NAME_ACCEPTED: &str = "NAMEACCEPTED";
const SUBMIT_PART: &str = "SUBMITPART";
const PART_ACCEPTED: &str = "PARTACCEPTED";
const PART_LEFT: &str = "PARTLEFT";

/// A single line written by the server to a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerLine {
    /// Client must reply with a candidate screen name.
    SubmitName,

    /// Name registered; client may now request a partner.
    NameAccepted,

    /// Client must reply with a desired partner's screen name.
    SubmitPart,

    /// Pairing established; client may now exchange messages.
    PartAccepted,

    /// Partner disconnected; no further relay will occur.
    PartLeft,

    /// Relayed message; the payload is what the user sees.
    Message(String),

    /// A line relayed verbatim from the partner (e.g. header framing).
    Raw(String),
}

impl ServerLine {
    /// Classifies a line received from the server.
    ///
    /// Control tokens are matched as line prefixes, the way line clients
    /// historically read them. Anything unrecognized comes back as `Raw`.
    pub fn parse(line: &str) -> Self {
        if let Some(text) = line.strip_prefix(MESSAGE_PREFIX) {
            return Self::Message(text.to_string());
        }

        if line.starts_with(SUBMIT_NAME) {
            Self::SubmitName
        } else if line.starts_with(NAME_ACCEPTED) {
            Self::NameAccepted
        } else if line.starts_with(SUBMIT_PART) {
            Self::SubmitPart
        } else if line.starts_with(PART_ACCEPTED) {
            Self::PartAccepted
        } else if line.starts_with(PART_LEFT) {
            Self::PartLeft
        } else {
            Self::Raw(line.to_string())
        }
    }

    /// Returns true for the two prompt lines that expect a reply.
    #[must_use]
    pub fn is_prompt(&self) -> bool {
        matches!(self, Self::SubmitName | Self::SubmitPart)
    }
}

impl fmt::Display for ServerLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SubmitName => f.write_str(SUBMIT_NAME),
            Self::NameAccepted => f.write_str(NAME_ACCEPTED),
            Self::SubmitPart => f.write_str(SUBMIT_PART),
            Self::PartAccepted => f.write_str(PART_ACCEPTED),
            Self::PartLeft => f.write_str(PART_LEFT),
            Self::Message(text) => write!(f, "{MESSAGE_PREFIX}{text}"),
            Self::Raw(line) => f.write_str(line),
        }
    }
}
