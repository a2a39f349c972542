//! Per-connection session state machine.
//!
//! Each accepted connection gets its own `Session` that:
//! - Prompts for and registers a screen name
//! - Prompts for a partner and asks the registry to pair
//! - Relays lines to the partner's outbox once paired
//! - Writes everything queued on its own outbox to the socket
//! - Releases its name on every exit path
//!
//! Input is framed on `\n` as raw bytes. A trailing `\r` is stripped and
//! bytes that are not UTF-8 are replaced with U+FFFD, so a legacy encoding
//! never ends a conversation.
//!
//! A session is a single task. It waits on its input lines, its outbox,
//! the shutdown token and an optional idle deadline at the same time, so
//! a `PARTACCEPTED` or `PARTLEFT` addressed to it is written immediately
//! even while the client is silent.
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - I/O failures end the session and are logged, never propagated
//! - Sends to a departed partner are dropped silently

use std::time::Duration;

use futures_util::StreamExt;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufWriter};
use tokio::sync::mpsc;
use tokio::time::{sleep_until, timeout, Instant};
use tokio_util::codec::{AnyDelimiterCodec, AnyDelimiterCodecError, FramedRead};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use pairchat_core::ScreenName;
use pairchat_protocol::{ClientLine, ServerLine};

use crate::registry::{
    NameLease, Outbound, OutputChannel, PairOutcome, RegistryError, RegistryHandle,
};

use super::SessionSettings;

/// Write timeout (10 seconds)
const WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// Where a session is in the protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// `SUBMITNAME` sent, waiting for a name.
    AwaitingName,
    /// Name registered and `NAMEACCEPTED` sent.
    NameAccepted,
    /// `SUBMITPART` sent, waiting for a partner name or an incoming pairing.
    AwaitingPartner,
    /// Relaying lines to the partner.
    Paired,
    /// `PARTLEFT` sent; input is dropped until another client pairs with us.
    PartnerLeft,
    /// Connection closed and name released.
    Ended,
}

/// The other side of an active pairing.
#[derive(Debug)]
struct Partner {
    name: ScreenName,
    /// `None` if the partner left between pairing and lookup; the
    /// matching `PartnerLeft` is already queued on our outbox.
    output: Option<OutputChannel>,
}

/// Why a session stopped.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("client closed the connection")]
    Eof,

    #[error("I/O error: {0}")]
    Io(String),

    #[error("line exceeds {max} bytes")]
    LineTooLong { max: usize },

    #[error("idle for longer than {}s", .0.as_secs())]
    IdleTimeout(Duration),

    #[error("write timeout")]
    WriteTimeout,

    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("server shutting down")]
    Shutdown,
}

/// Session driving one client connection.
pub struct Session<R, W> {
    /// Incoming lines as raw bytes (cancel-safe across `select!`)
    lines: FramedRead<R, AnyDelimiterCodec>,

    /// Buffered writer to the client
    writer: BufWriter<W>,

    /// Handle to the name registry
    registry: RegistryHandle,

    /// Sending half of our own outbox, published once the name is accepted
    output: OutputChannel,

    /// Lines and pairing notifications addressed to this client
    outbox: mpsc::UnboundedReceiver<Outbound>,

    /// Registered name, released when the session ends
    lease: Option<NameLease>,

    /// Current partner, if paired
    partner: Option<Partner>,

    state: SessionState,
    settings: SessionSettings,
    cancel_token: CancellationToken,
    connection_number: u64,
    /// Last line read from or relayed to this client
    last_activity: Instant,
}

impl<R, W> Session<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    /// Creates a session for a freshly accepted connection.
    pub fn new(
        reader: R,
        writer: W,
        registry: RegistryHandle,
        settings: SessionSettings,
        cancel_token: CancellationToken,
        connection_number: u64,
    ) -> Self {
        let (output, outbox) = OutputChannel::new();

        Self {
            lines: FramedRead::new(
                reader,
                AnyDelimiterCodec::new_with_max_length(
                    b"\n".to_vec(),
                    Vec::new(),
                    settings.max_line_length,
                ),
            ),
            writer: BufWriter::new(writer),
            registry,
            output,
            outbox,
            lease: None,
            partner: None,
            state: SessionState::AwaitingName,
            settings,
            cancel_token,
            connection_number,
            last_activity: Instant::now(),
        }
    }

    /// Runs the session until the connection ends.
    ///
    /// Returns the name the client held, if it got that far.
    pub async fn run(mut self) -> Option<ScreenName> {
        debug!(connection = self.connection_number, "Session started");

        let reason = match self.event_loop().await {
            Ok(()) => SessionError::Eof,
            Err(e) => e,
        };
        self.state = SessionState::Ended;

        let name = self.own_name().cloned();
        match reason {
            SessionError::Eof | SessionError::Shutdown => {
                debug!(
                    connection = self.connection_number,
                    name = ?name,
                    reason = %reason,
                    "Session ended"
                );
            }
            ref e => {
                warn!(
                    connection = self.connection_number,
                    name = ?name,
                    error = %e,
                    "Session ended with error"
                );
            }
        }

        if let Some(lease) = self.lease.take() {
            lease.release().await;
        }

        if let Err(e) = self.writer.shutdown().await {
            trace!(connection = self.connection_number, error = %e, "Shutdown after close failed");
        }

        name
    }

    /// Current protocol state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    fn own_name(&self) -> Option<&ScreenName> {
        self.lease.as_ref().and_then(NameLease::name)
    }

    async fn event_loop(&mut self) -> Result<(), SessionError> {
        self.write_line(&ServerLine::SubmitName).await?;

        loop {
            let idle_deadline = self.settings.idle_timeout.map(|d| (self.last_activity + d, d));
            let idle = async move {
                match idle_deadline {
                    Some((deadline, _)) => sleep_until(deadline).await,
                    None => std::future::pending().await,
                }
            };

            tokio::select! {
                biased;

                _ = self.cancel_token.cancelled() => {
                    return Err(SessionError::Shutdown);
                }

                Some(item) = self.outbox.recv() => {
                    if matches!(item, Outbound::Line(_)) {
                        self.last_activity = Instant::now();
                    }
                    self.handle_outbound(item).await?;
                }

                next = self.lines.next() => {
                    match next {
                        Some(Ok(chunk)) => {
                            self.last_activity = Instant::now();
                            self.handle_line(decode_line(&chunk)).await?;
                        }
                        Some(Err(e)) => return Err(self.read_error(e)),
                        None => return Ok(()),
                    }
                }

                _ = idle => {
                    let limit = idle_deadline.map(|(_, d)| d).unwrap_or_default();
                    return Err(SessionError::IdleTimeout(limit));
                }
            }
        }
    }

    fn read_error(&self, error: AnyDelimiterCodecError) -> SessionError {
        match error {
            AnyDelimiterCodecError::MaxChunkLengthExceeded => SessionError::LineTooLong {
                max: self.settings.max_line_length,
            },
            AnyDelimiterCodecError::Io(e) => SessionError::Io(e.to_string()),
        }
    }

    // ========================================================================
    // Client input
    // ========================================================================

    async fn handle_line(&mut self, line: String) -> Result<(), SessionError> {
        match self.state {
            SessionState::AwaitingName => self.handle_name(&line).await,
            SessionState::AwaitingPartner => self.handle_partner_request(&line).await,
            SessionState::Paired => {
                self.relay(&line);
                Ok(())
            }
            SessionState::NameAccepted | SessionState::PartnerLeft | SessionState::Ended => {
                trace!(
                    connection = self.connection_number,
                    state = ?self.state,
                    len = line.len(),
                    "Dropping input line"
                );
                Ok(())
            }
        }
    }

    async fn handle_name(&mut self, line: &str) -> Result<(), SessionError> {
        let name = match ScreenName::parse(line) {
            Ok(name) => name,
            Err(e) => {
                debug!(connection = self.connection_number, error = %e, "Rejected name");
                return self.write_line(&ServerLine::SubmitName).await;
            }
        };

        if !self.registry.try_register(name.clone()).await? {
            return self.write_line(&ServerLine::SubmitName).await;
        }

        // Hold the lease before anything else can fail
        self.lease = Some(NameLease::new(self.registry.clone(), name.clone()));
        self.registry
            .publish_output(name.clone(), self.output.clone())
            .await?;

        info!(connection = self.connection_number, name = %name, "Name accepted");
        self.state = SessionState::NameAccepted;
        self.write_line(&ServerLine::NameAccepted).await?;

        self.state = SessionState::AwaitingPartner;
        self.write_line(&ServerLine::SubmitPart).await
    }

    async fn handle_partner_request(&mut self, line: &str) -> Result<(), SessionError> {
        let Some(own_name) = self.own_name().cloned() else {
            return Ok(());
        };

        let candidate = match ScreenName::parse(line) {
            Ok(candidate) => candidate,
            Err(_) => return self.write_line(&ServerLine::SubmitPart).await,
        };

        match self.registry.try_pair(own_name, candidate.clone()).await? {
            PairOutcome::Paired => {
                let output = self.registry.lookup_output(candidate.clone()).await;
                self.enter_paired(candidate, output).await
            }
            PairOutcome::Unavailable => self.write_line(&ServerLine::SubmitPart).await,
            PairOutcome::AlreadyPaired => {
                // Another session paired with us first; its notice is on the outbox
                debug!(
                    connection = self.connection_number,
                    candidate = %candidate,
                    "Pair request superseded by incoming pairing"
                );
                Ok(())
            }
        }
    }

    fn relay(&self, line: &str) {
        let (Some(own_name), Some(partner)) = (self.own_name(), self.partner.as_ref()) else {
            return;
        };

        let relayed = ClientLine::classify(line).relay(own_name);
        let delivered = partner
            .output
            .as_ref()
            .is_some_and(|output| output.send_line(relayed));

        if delivered {
            debug!(
                from = %own_name,
                to = %partner.name,
                len = line.len(),
                "Relayed line"
            );
        } else {
            trace!(from = %own_name, to = %partner.name, "Partner gone, line dropped");
        }
    }

    // ========================================================================
    // Outbox
    // ========================================================================

    async fn handle_outbound(&mut self, item: Outbound) -> Result<(), SessionError> {
        match item {
            Outbound::Line(line) => self.write_line(&line).await,
            Outbound::Paired { partner, output } => match self.state {
                SessionState::NameAccepted
                | SessionState::AwaitingPartner
                | SessionState::PartnerLeft => self.enter_paired(partner, Some(output)).await,
                state => {
                    warn!(
                        connection = self.connection_number,
                        partner = %partner,
                        state = ?state,
                        "Ignoring pairing notice in unexpected state"
                    );
                    Ok(())
                }
            },
            Outbound::PartnerLeft => {
                if self.state != SessionState::Paired {
                    return Ok(());
                }
                if let Some(partner) = self.partner.take() {
                    info!(
                        connection = self.connection_number,
                        partner = %partner.name,
                        "Partner left"
                    );
                }
                self.state = SessionState::PartnerLeft;
                self.write_line(&ServerLine::PartLeft).await
            }
        }
    }

    async fn enter_paired(
        &mut self,
        partner: ScreenName,
        output: Option<OutputChannel>,
    ) -> Result<(), SessionError> {
        debug!(
            connection = self.connection_number,
            partner = %partner,
            "Entering paired state"
        );
        self.partner = Some(Partner {
            name: partner,
            output,
        });
        self.state = SessionState::Paired;
        self.write_line(&ServerLine::PartAccepted).await
    }

    // ========================================================================
    // Socket output
    // ========================================================================

    async fn write_line(&mut self, line: &ServerLine) -> Result<(), SessionError> {
        let text = format!("{line}\n");
        let write = async {
            self.writer.write_all(text.as_bytes()).await?;
            self.writer.flush().await
        };

        match timeout(WRITE_TIMEOUT, write).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(SessionError::Io(e.to_string())),
            Err(_) => Err(SessionError::WriteTimeout),
        }
    }
}

/// Turns one framed chunk into a line: drops a trailing `\r` and replaces
/// invalid UTF-8.
fn decode_line(chunk: &[u8]) -> String {
    let chunk = chunk.strip_suffix(b"\r").unwrap_or(chunk);
    String::from_utf8_lossy(chunk).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::spawn_registry;
    use tokio::io::{AsyncBufReadExt, BufReader, DuplexStream, Lines, ReadHalf, WriteHalf};

    const STEP: Duration = Duration::from_secs(2);

    struct Peer {
        lines: Lines<BufReader<ReadHalf<DuplexStream>>>,
        writer: WriteHalf<DuplexStream>,
    }

    impl Peer {
        async fn expect(&mut self, expected: &str) {
            let line = timeout(STEP, self.lines.next_line())
                .await
                .expect("timed out waiting for line")
                .unwrap()
                .expect("stream closed");
            assert_eq!(line, expected);
        }

        async fn send(&mut self, line: &str) {
            self.writer.write_all(format!("{line}\n").as_bytes()).await.unwrap();
        }
    }

    fn settings() -> SessionSettings {
        SessionSettings {
            max_line_length: 64,
            idle_timeout: None,
        }
    }

    fn start(
        registry: &RegistryHandle,
        settings: SessionSettings,
        cancel: &CancellationToken,
    ) -> (Peer, tokio::task::JoinHandle<Option<ScreenName>>) {
        let (client, server) = tokio::io::duplex(4096);
        let (server_read, server_write) = tokio::io::split(server);
        let session = Session::new(
            server_read,
            server_write,
            registry.clone(),
            settings,
            cancel.clone(),
            0,
        );
        let task = tokio::spawn(session.run());

        let (client_read, client_write) = tokio::io::split(client);
        let peer = Peer {
            lines: BufReader::new(client_read).lines(),
            writer: client_write,
        };
        (peer, task)
    }

    #[tokio::test]
    async fn test_blank_name_reprompts() {
        let registry = spawn_registry();
        let cancel = CancellationToken::new();
        let (mut peer, _task) = start(&registry, settings(), &cancel);

        peer.expect("SUBMITNAME").await;
        peer.send("   ").await;
        peer.expect("SUBMITNAME").await;
        peer.send("  alice  ").await;
        peer.expect("NAMEACCEPTED").await;
        peer.expect("SUBMITPART").await;

        let clients = registry.snapshot().await;
        assert_eq!(clients.len(), 1);
        assert_eq!(clients[0].name.as_str(), "alice");
    }

    #[tokio::test]
    async fn test_eof_releases_name() {
        let registry = spawn_registry();
        let cancel = CancellationToken::new();
        let (mut peer, task) = start(&registry, settings(), &cancel);

        peer.expect("SUBMITNAME").await;
        peer.send("alice").await;
        peer.expect("NAMEACCEPTED").await;
        drop(peer);

        let name = timeout(STEP, task).await.unwrap().unwrap();
        assert_eq!(name.map(String::from), Some("alice".to_string()));
        assert!(registry.snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_partner_reprompts() {
        let registry = spawn_registry();
        let cancel = CancellationToken::new();
        let (mut peer, _task) = start(&registry, settings(), &cancel);

        peer.expect("SUBMITNAME").await;
        peer.send("alice").await;
        peer.expect("NAMEACCEPTED").await;
        peer.expect("SUBMITPART").await;
        peer.send("nobody").await;
        peer.expect("SUBMITPART").await;
        peer.send("alice").await;
        peer.expect("SUBMITPART").await;
    }

    #[tokio::test]
    async fn test_pairing_notifies_both_sides() {
        let registry = spawn_registry();
        let cancel = CancellationToken::new();
        let (mut alice, _a) = start(&registry, settings(), &cancel);
        let (mut bob, _b) = start(&registry, settings(), &cancel);

        alice.expect("SUBMITNAME").await;
        alice.send("alice").await;
        alice.expect("NAMEACCEPTED").await;
        alice.expect("SUBMITPART").await;

        bob.expect("SUBMITNAME").await;
        bob.send("bob").await;
        bob.expect("NAMEACCEPTED").await;
        bob.expect("SUBMITPART").await;

        alice.send("bob").await;
        alice.expect("PARTACCEPTED").await;
        bob.expect("PARTACCEPTED").await;

        alice.send("MESSAGE hi").await;
        bob.expect("MESSAGE alice: hi").await;
        bob.send("Host: example").await;
        alice.expect("Host: example").await;
    }

    async fn pair(alice: &mut Peer, bob: &mut Peer) {
        alice.expect("SUBMITNAME").await;
        alice.send("alice").await;
        alice.expect("NAMEACCEPTED").await;
        alice.expect("SUBMITPART").await;

        bob.expect("SUBMITNAME").await;
        bob.send("bob").await;
        bob.expect("NAMEACCEPTED").await;
        bob.expect("SUBMITPART").await;

        alice.send("bob").await;
        alice.expect("PARTACCEPTED").await;
        bob.expect("PARTACCEPTED").await;
    }

    #[test]
    fn test_decode_line() {
        assert_eq!(decode_line(b"MESSAGE hi"), "MESSAGE hi");
        assert_eq!(decode_line(b"MESSAGE hi\r"), "MESSAGE hi");
        assert_eq!(decode_line(b"caf\xe9"), "caf\u{FFFD}");
        assert_eq!(decode_line(b""), "");
    }

    #[tokio::test]
    async fn test_non_utf8_line_is_relayed() {
        let registry = spawn_registry();
        let cancel = CancellationToken::new();
        let (mut alice, _a) = start(&registry, settings(), &cancel);
        let (mut bob, _b) = start(&registry, settings(), &cancel);
        pair(&mut alice, &mut bob).await;

        alice.writer.write_all(b"MESSAGE caf\xe9\n").await.unwrap();
        bob.expect("MESSAGE alice: caf\u{FFFD}").await;

        // Both sides are still paired
        alice.send("MESSAGE again").await;
        bob.expect("MESSAGE alice: again").await;
        bob.send("MESSAGE ok").await;
        alice.expect("MESSAGE bob: ok").await;
    }

    #[tokio::test]
    async fn test_relayed_traffic_keeps_reader_alive() {
        let registry = spawn_registry();
        let cancel = CancellationToken::new();
        let settings = SessionSettings {
            max_line_length: 64,
            idle_timeout: Some(Duration::from_millis(300)),
        };
        let (mut alice, _a) = start(&registry, settings, &cancel);
        let (mut bob, _b) = start(&registry, settings, &cancel);
        pair(&mut alice, &mut bob).await;

        // Bob only reads, for well past his idle limit
        for i in 0..6 {
            alice.send(&format!("MESSAGE tick {i}")).await;
            bob.expect(&format!("MESSAGE alice: tick {i}")).await;
            tokio::time::sleep(Duration::from_millis(100)).await;
        }

        bob.send("MESSAGE still here").await;
        alice.expect("MESSAGE bob: still here").await;
        assert_eq!(registry.snapshot().await.len(), 2);
    }

    #[tokio::test]
    async fn test_line_too_long_ends_session() {
        let registry = spawn_registry();
        let cancel = CancellationToken::new();
        let (mut peer, task) = start(&registry, settings(), &cancel);

        peer.expect("SUBMITNAME").await;
        peer.send(&"x".repeat(200)).await;

        let name = timeout(STEP, task).await.unwrap().unwrap();
        assert!(name.is_none());
    }

    #[tokio::test]
    async fn test_idle_timeout_ends_session() {
        let registry = spawn_registry();
        let cancel = CancellationToken::new();
        let settings = SessionSettings {
            max_line_length: 64,
            idle_timeout: Some(Duration::from_millis(100)),
        };
        let (mut peer, task) = start(&registry, settings, &cancel);

        peer.expect("SUBMITNAME").await;
        peer.send("alice").await;
        peer.expect("NAMEACCEPTED").await;

        let name = timeout(STEP, task).await.unwrap().unwrap();
        assert_eq!(name.map(String::from), Some("alice".to_string()));
        assert!(registry.snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn test_cancellation_ends_session() {
        let registry = spawn_registry();
        let cancel = CancellationToken::new();
        let (mut peer, task) = start(&registry, settings(), &cancel);

        peer.expect("SUBMITNAME").await;
        peer.send("alice").await;
        peer.expect("NAMEACCEPTED").await;

        cancel.cancel();
        timeout(STEP, task).await.unwrap().unwrap();
        assert!(registry.snapshot().await.is_empty());
    }
}
