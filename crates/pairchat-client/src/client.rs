//! Line client for the pairchat relay.
//!
//! This module provides the `ChatClient` which handles:
//! - Answering the server's name and partner prompts from user input
//! - Sending user lines as `MESSAGE <text>` while paired
//! - Printing relayed messages and notices for the user
//!
//! The protocol logic (`on_server_line` / `on_user_line`) is separate from
//! the I/O loop so it can be exercised without a socket.
//!
//! **Panic-Free Policy:** No `.unwrap()`, `.expect()`, `panic!()`,
//! `unreachable!()`, or `todo!()` outside of tests.

use futures_util::StreamExt;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufWriter};
use tokio::net::TcpStream;
use tokio_util::codec::{FramedRead, LinesCodec};
use tracing::{debug, info};

use pairchat_protocol::{encode_message, ServerLine, DEFAULT_PORT};

use crate::error::{ClientError, Result};

/// Default server address.
pub fn default_server() -> String {
    format!("127.0.0.1:{DEFAULT_PORT}")
}

// ============================================================================
// Client State
// ============================================================================

/// Where the client is in the conversation with the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Connected, no prompt seen yet.
    Connecting,
    /// Server asked for a screen name.
    EnteringName,
    /// Name sent, waiting for the verdict.
    WaitingForName,
    /// Server asked for a partner name.
    EnteringPartner,
    /// Partner name sent, waiting for the verdict.
    WaitingForPartner,
    /// Messages go to the partner.
    Paired,
    /// Partner disconnected.
    PartnerLeft,
}

/// What to do with a line the user typed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserAction {
    /// Write this line to the server.
    Send(String),
    /// Show this notice instead of sending anything.
    Notice(&'static str),
    /// Do nothing.
    Ignore,
}

const NOTICE_WAITING: &str = "(waiting for the server)";
const NOTICE_PARTNER_GONE: &str = "(your partner has left; message not sent)";

/// Protocol driver for one connection.
#[derive(Debug)]
pub struct ChatClient {
    phase: Phase,
}

impl Default for ChatClient {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatClient {
    /// Creates a client that has not seen any server line yet.
    pub fn new() -> Self {
        Self {
            phase: Phase::Connecting,
        }
    }

    /// Current phase.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Handles one server line, returning the text to show the user.
    pub fn on_server_line(&mut self, line: ServerLine) -> String {
        match line {
            ServerLine::SubmitName => {
                self.phase = Phase::EnteringName;
                "Enter a screen name:".to_string()
            }
            ServerLine::NameAccepted => "Name accepted.".to_string(),
            ServerLine::SubmitPart => {
                self.phase = Phase::EnteringPartner;
                "Enter the name of the person to chat with:".to_string()
            }
            ServerLine::PartAccepted => {
                self.phase = Phase::Paired;
                "Connected. Type a message and press enter.".to_string()
            }
            ServerLine::PartLeft => {
                self.phase = Phase::PartnerLeft;
                "Your partner left. Reconnect to pick someone else, or wait here until \
                 someone picks you."
                    .to_string()
            }
            ServerLine::Message(text) => text,
            ServerLine::Raw(line) => line,
        }
    }

    /// Decides what a line typed by the user turns into.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Protocol` if a message cannot be encoded.
    pub fn on_user_line(&mut self, text: &str) -> Result<UserAction> {
        match self.phase {
            Phase::EnteringName | Phase::EnteringPartner => {
                let answer = text.trim();
                if answer.is_empty() {
                    return Ok(UserAction::Ignore);
                }
                self.phase = if self.phase == Phase::EnteringName {
                    Phase::WaitingForName
                } else {
                    Phase::WaitingForPartner
                };
                Ok(UserAction::Send(answer.to_string()))
            }
            Phase::Paired => Ok(UserAction::Send(encode_message(text)?)),
            Phase::PartnerLeft => Ok(UserAction::Notice(NOTICE_PARTNER_GONE)),
            Phase::Connecting | Phase::WaitingForName | Phase::WaitingForPartner => {
                Ok(UserAction::Notice(NOTICE_WAITING))
            }
        }
    }

    /// Connects to `addr` and runs against the process's stdin and stdout.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Connect` if the server cannot be reached, or
    /// any error from [`ChatClient::run`].
    pub async fn connect_and_run(self, addr: &str) -> Result<()> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|e| ClientError::Connect {
                addr: addr.to_string(),
                error: e.to_string(),
            })?;
        info!(addr = %addr, "Connected to relay");

        let (reader, writer) = stream.into_split();
        self.run(reader, writer, tokio::io::stdin(), tokio::io::stdout())
            .await
    }

    /// Runs until the server closes the connection or user input ends.
    ///
    /// # Errors
    ///
    /// Returns an error if reading or writing either side fails.
    pub async fn run<R, W, I, O>(
        mut self,
        server_read: R,
        server_write: W,
        input: I,
        output: O,
    ) -> Result<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
        I: AsyncRead + Unpin,
        O: AsyncWrite + Unpin,
    {
        let mut server_lines = FramedRead::new(server_read, LinesCodec::new());
        let mut user_lines = FramedRead::new(input, LinesCodec::new());
        let mut server = BufWriter::new(server_write);
        let mut output = BufWriter::new(output);

        loop {
            tokio::select! {
                next = server_lines.next() => {
                    let Some(line) = next else {
                        debug!("Server closed the connection");
                        show(&mut output, "Disconnected from server.").await?;
                        return Ok(());
                    };
                    let text = self.on_server_line(ServerLine::parse(&line?));
                    show(&mut output, &text).await?;
                }

                next = user_lines.next() => {
                    let Some(line) = next else {
                        debug!("Input closed");
                        return Ok(());
                    };
                    match self.on_user_line(&line?)? {
                        UserAction::Send(line) => {
                            server.write_all(line.as_bytes()).await?;
                            server.write_all(b"\n").await?;
                            server.flush().await?;
                        }
                        UserAction::Notice(notice) => show(&mut output, notice).await?,
                        UserAction::Ignore => {}
                    }
                }
            }
        }
    }
}

async fn show<O: AsyncWrite + Unpin>(output: &mut BufWriter<O>, text: &str) -> Result<()> {
    output.write_all(text.as_bytes()).await?;
    output.write_all(b"\n").await?;
    output.flush().await?;
    Ok(())
}
