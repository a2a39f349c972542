//! pairchat terminal client
//!
//! Connects to a relay server, asks for a screen name and a partner on
//! stdin, then sends each typed line to the partner.
//!
//! # Usage
//!
//! ```text
//! pairchat                          # connect to 127.0.0.1:8999
//! pairchat --server chat.lan:8999   # connect elsewhere
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use pairchat_client::{default_server, ChatClient};

/// pairchat terminal client
#[derive(Parser, Debug)]
#[command(name = "pairchat", version, about)]
struct Args {
    /// Relay server address (HOST:PORT)
    #[arg(short, long, default_value_t = default_server())]
    server: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Logs go to stderr so they never mix with the conversation
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("pairchat_client=warn".parse()?),
        )
        .init();

    ChatClient::new()
        .connect_and_run(&args.server)
        .await
        .with_context(|| format!("Chat session with {} failed", args.server))
}
