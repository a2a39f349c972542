//! pairchat daemon - name registry and one-to-one line relay
//!
//! This crate provides the server side of pairchat:
//! - `registry` - Registry actor owning names, output channels and pairings
//! - `server` - TCP listener and the per-connection `Session` state machine
//! - `config` - CLI / environment / TOML configuration
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      pairchatd                              │
//! ├─────────────────────────────────────────────────────────────┤
//! │                                                             │
//! │  ┌─────────────────┐     ┌─────────────────────────────┐   │
//! │  │   ChatServer    │────▶│      RegistryActor          │   │
//! │  │ (TcpListener)   │     │ (names, outputs, pairs)     │   │
//! │  └────────┬────────┘     └──────────────┬──────────────┘   │
//! │           │                             │                   │
//! │           │ one task per connection     │ Outbound          │
//! │           ▼                             ▼                   │
//! │  ┌─────────────────┐     ┌─────────────────────────────┐   │
//! │  │    Session      │◀───▶│  OutputChannel (per client) │   │
//! │  │ (state machine) │     │  Paired / PartnerLeft / Line│   │
//! │  └─────────────────┘     └─────────────────────────────┘   │
//! │                                                             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! All production code in this crate follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations return `Result` or `Option`
//! - Channel operations handle closure gracefully

pub mod config;
pub mod registry;
pub mod server;
