//! pairchat client library
//!
//! A terminal front-end for the pairchat relay. It answers the server's
//! prompts from user input, sends typed lines as `MESSAGE <text>` while
//! paired, and prints whatever the partner sends.
//!
//! # Modules
//!
//! - [`client`] - Protocol driver and I/O loop
//! - [`error`] - Error types

pub mod client;
pub mod error;

pub use client::{default_server, ChatClient, Phase, UserAction};
pub use error::{ClientError, Result};
