//! Per-client output channels.
//!
//! Every session owns the receiving end of one unbounded channel; the
//! sending end (`OutputChannel`) is published to the registry and handed to
//! the session's partner. Sends never block. A send to a session that has
//! gone away fails and is otherwise silent.

use pairchat_core::ScreenName;
use pairchat_protocol::ServerLine;
use tokio::sync::mpsc;

/// Items delivered to a session's outbox.
#[derive(Debug, Clone)]
pub enum Outbound {
    /// A line to write to the client as-is.
    Line(ServerLine),

    /// Another client paired with this one.
    ///
    /// Carries the partner's channel so the receiving session can relay
    /// without another registry round-trip.
    Paired {
        /// Name of the client that initiated the pairing
        partner: ScreenName,
        /// Where to send lines addressed to that partner
        output: OutputChannel,
    },

    /// The partner disconnected; no further relay will occur.
    PartnerLeft,
}

/// Sending half of a client's outbox.
#[derive(Debug, Clone)]
pub struct OutputChannel {
    sender: mpsc::UnboundedSender<Outbound>,
}

impl OutputChannel {
    /// Creates a channel, returning the sender and the session's outbox.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Outbound>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }

    /// Delivers an item. Returns `false` if the owning session is gone.
    pub fn send(&self, item: Outbound) -> bool {
        self.sender.send(item).is_ok()
    }

    /// Delivers a single protocol line.
    pub fn send_line(&self, line: ServerLine) -> bool {
        self.send(Outbound::Line(line))
    }

    /// Returns `true` once the owning session has dropped its outbox.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    /// Returns `true` if both handles feed the same outbox.
    pub fn same_channel(&self, other: &Self) -> bool {
        self.sender.same_channel(&other.sender)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_send_line_reaches_outbox() {
        let (output, mut outbox) = OutputChannel::new();

        assert!(output.send_line(ServerLine::PartLeft));

        match outbox.recv().await {
            Some(Outbound::Line(ServerLine::PartLeft)) => {}
            other => panic!("unexpected outbox item: {other:?}"),
        }
    }

    #[test]
    fn test_send_fails_after_outbox_dropped() {
        let (output, outbox) = OutputChannel::new();
        assert!(!output.is_closed());

        drop(outbox);

        assert!(output.is_closed());
        assert!(!output.send(Outbound::PartnerLeft));
    }

    #[test]
    fn test_same_channel() {
        let (first, _rx1) = OutputChannel::new();
        let (second, _rx2) = OutputChannel::new();

        assert!(first.same_channel(&first.clone()));
        assert!(!first.same_channel(&second));
    }
}
