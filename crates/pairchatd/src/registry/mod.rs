//! Name registry using Actor pattern.
//!
//! The registry is the only shared mutable state in the server. It tracks
//! registered names, their busy flag, where to deliver lines for each name,
//! and who is paired with whom. Sessions talk to it through
//! `RegistryHandle`; every operation is one command handled to completion by
//! the actor, so check-and-set operations cannot interleave.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌─────────────────┐     ┌──────────────────┐
//! │    Session      │────▶│  RegistryActor  │────▶│ Broadcast Channel│
//! └─────────────────┘     └─────────────────┘     └──────────────────┘
//!         │                       │                       │
//!         │   RegistryCommand     │   Outbound            │   RegistryEvent
//!         │   (mpsc + oneshot)    │   (partner outbox)    │   (broadcast)
//!         ▼                       ▼                       ▼
//!    Register/Pair/          names, outputs,         Event logger,
//!    Release                 pairs                   tests
//! ```

use tokio::sync::{broadcast, mpsc};
use tokio::time::{interval, Duration};
use tracing::debug;

mod actor;
mod commands;
mod handle;
mod lease;
mod output;

pub use actor::{RegistryActor, MAX_CLIENTS};
pub use commands::{ClientView, PairOutcome, RegistryCommand, RegistryError, RegistryEvent};
pub use handle::RegistryHandle;
pub use lease::NameLease;
pub use output::{Outbound, OutputChannel};

/// Channel buffer sizes
const COMMAND_BUFFER: usize = 100;
const EVENT_BUFFER: usize = 100;

/// Sweep interval in seconds
const SWEEP_INTERVAL_SECS: u64 = 30;

/// Spawn the registry actor with the default capacity.
///
/// # Example
///
/// ```no_run
/// use pairchatd::registry::spawn_registry;
///
/// #[tokio::main]
/// async fn main() {
///     let handle = spawn_registry();
///     let clients = handle.snapshot().await;
///     assert!(clients.is_empty());
/// }
/// ```
pub fn spawn_registry() -> RegistryHandle {
    spawn_registry_with_capacity(MAX_CLIENTS)
}

/// Spawn the registry actor and return a handle for interaction.
///
/// This function:
/// 1. Creates command and event channels
/// 2. Spawns the RegistryActor on a tokio task
/// 3. Spawns a background sweep task
/// 4. Returns a RegistryHandle for session use
pub fn spawn_registry_with_capacity(max_clients: usize) -> RegistryHandle {
    let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_BUFFER);
    let (event_tx, _) = broadcast::channel(EVENT_BUFFER);

    let actor = RegistryActor::new(cmd_rx, event_tx.clone(), max_clients);
    tokio::spawn(actor.run());

    let handle = RegistryHandle::new(cmd_tx.clone(), event_tx);

    spawn_sweep_task(cmd_tx.downgrade());

    handle
}

/// Spawn a background task that periodically sweeps vanished sessions.
///
/// Holds only a weak sender so the actor stops once every handle is gone.
fn spawn_sweep_task(sender: mpsc::WeakSender<RegistryCommand>) {
    tokio::spawn(async move {
        let mut ticker = interval(Duration::from_secs(SWEEP_INTERVAL_SECS));
        // First tick completes immediately
        ticker.tick().await;

        loop {
            ticker.tick().await;

            let Some(sender) = sender.upgrade() else {
                debug!("Sweep task stopping: registry handles dropped");
                break;
            };

            if sender.send(RegistryCommand::SweepClosed).await.is_err() {
                debug!("Sweep task stopping: registry channel closed");
                break;
            }
        }
    });
}
