//! Registry actor - owns all name and pairing state and processes commands.
//!
//! The RegistryActor is the single owner of the registry maps. It receives
//! commands via an mpsc channel, handles them one at a time, and publishes
//! events via broadcast.
//!
//! # Invariants
//!
//! - a name is in `names` iff a live session holds it
//! - a name is busy iff it appears in `pairs`
//! - `pairs` is symmetric: `a -> b` iff `b -> a`
//! - `outputs` only holds names that are in `names`
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Reply send failures are ignored (the requester went away)

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use pairchat_core::ScreenName;

use super::commands::{ClientView, PairOutcome, RegistryCommand, RegistryError, RegistryEvent};
use super::output::{Outbound, OutputChannel};

// ============================================================================
// Resource Limits
// ============================================================================

/// Default maximum number of names the registry holds at once.
pub const MAX_CLIENTS: usize = 1024;

// ============================================================================
// Registry Actor
// ============================================================================

/// Per-name bookkeeping.
#[derive(Debug, Clone)]
struct NameEntry {
    busy: bool,
    registered_at: DateTime<Utc>,
    paired_at: Option<DateTime<Utc>>,
}

impl NameEntry {
    fn new() -> Self {
        Self {
            busy: false,
            registered_at: Utc::now(),
            paired_at: None,
        }
    }
}

/// The registry actor - owns all registry state.
///
/// # Ownership
///
/// The actor owns:
/// - `names`: every registered name and its busy flag
/// - `outputs`: name → output channel, filled in once a session publishes it
/// - `pairs`: name → partner name, both directions
///
/// All state mutations happen within this single task.
pub struct RegistryActor {
    /// Command receiver
    receiver: mpsc::Receiver<RegistryCommand>,

    /// Registered names → busy flag and timestamps
    names: HashMap<ScreenName, NameEntry>,

    /// Published output channels
    outputs: HashMap<ScreenName, OutputChannel>,

    /// Current pairings, stored symmetrically
    pairs: HashMap<ScreenName, ScreenName>,

    /// Capacity limit for `names`
    max_clients: usize,

    /// Event publisher for subscribers
    event_publisher: broadcast::Sender<RegistryEvent>,
}

impl RegistryActor {
    /// Creates a new registry actor.
    ///
    /// # Arguments
    ///
    /// * `receiver` - Channel for receiving commands
    /// * `event_publisher` - Broadcast channel for publishing events
    /// * `max_clients` - Maximum number of names held at once
    pub fn new(
        receiver: mpsc::Receiver<RegistryCommand>,
        event_publisher: broadcast::Sender<RegistryEvent>,
        max_clients: usize,
    ) -> Self {
        Self {
            receiver,
            names: HashMap::new(),
            outputs: HashMap::new(),
            pairs: HashMap::new(),
            max_clients,
            event_publisher,
        }
    }

    /// Runs the actor event loop.
    ///
    /// Processes commands until the channel closes (all senders dropped).
    pub async fn run(mut self) {
        info!(max_clients = self.max_clients, "Registry actor starting");

        while let Some(cmd) = self.receiver.recv().await {
            self.handle_command(cmd);
        }

        info!(clients = self.names.len(), "Registry actor stopped");
    }

    /// Dispatches a command to the appropriate handler.
    fn handle_command(&mut self, cmd: RegistryCommand) {
        match cmd {
            RegistryCommand::Register { name, respond_to } => {
                let result = self.handle_register(name);
                let _ = respond_to.send(result);
            }
            RegistryCommand::PublishOutput {
                name,
                output,
                respond_to,
            } => {
                let result = self.handle_publish_output(name, output);
                let _ = respond_to.send(result);
            }
            RegistryCommand::TryPair {
                requester,
                candidate,
                respond_to,
            } => {
                let result = self.handle_try_pair(requester, candidate);
                let _ = respond_to.send(result);
            }
            RegistryCommand::LookupOutput { name, respond_to } => {
                let _ = respond_to.send(self.outputs.get(&name).cloned());
            }
            RegistryCommand::Release { name, respond_to } => {
                let result = self.handle_release(&name);
                let _ = respond_to.send(result);
            }
            RegistryCommand::Snapshot { respond_to } => {
                let _ = respond_to.send(self.handle_snapshot());
            }
            RegistryCommand::SweepClosed => {
                self.handle_sweep_closed();
            }
        }
    }

    // ========================================================================
    // Command Handlers
    // ========================================================================

    fn handle_register(&mut self, name: ScreenName) -> Result<bool, RegistryError> {
        if self.names.contains_key(&name) {
            debug!(name = %name, "Name already taken");
            return Ok(false);
        }

        if self.names.len() >= self.max_clients {
            warn!(
                name = %name,
                current = self.names.len(),
                max = self.max_clients,
                "Registry is full, rejecting registration"
            );
            return Err(RegistryError::RegistryFull {
                max: self.max_clients,
            });
        }

        self.names.insert(name.clone(), NameEntry::new());
        info!(name = %name, clients = self.names.len(), "Name registered");
        self.publish(RegistryEvent::Registered { name });

        Ok(true)
    }

    fn handle_publish_output(
        &mut self,
        name: ScreenName,
        output: OutputChannel,
    ) -> Result<(), RegistryError> {
        if !self.names.contains_key(&name) {
            return Err(RegistryError::NotRegistered(name));
        }

        self.outputs.insert(name, output);
        Ok(())
    }

    /// The availability check and both busy flags flip in one step.
    fn handle_try_pair(&mut self, requester: ScreenName, candidate: ScreenName) -> PairOutcome {
        let requester_busy = match self.names.get(&requester) {
            Some(entry) => entry.busy,
            None => {
                warn!(requester = %requester, "Pair request from unregistered name");
                return PairOutcome::Unavailable;
            }
        };

        if requester_busy {
            return PairOutcome::AlreadyPaired;
        }

        if requester == candidate {
            debug!(requester = %requester, "Refusing self-pairing");
            return PairOutcome::Unavailable;
        }

        match self.names.get(&candidate) {
            Some(entry) if !entry.busy => {}
            Some(_) => {
                debug!(requester = %requester, candidate = %candidate, "Candidate busy");
                return PairOutcome::Unavailable;
            }
            None => {
                debug!(requester = %requester, candidate = %candidate, "Candidate unknown");
                return PairOutcome::Unavailable;
            }
        }

        // Both sides must be reachable before anyone is told they are paired
        let (Some(requester_output), Some(candidate_output)) =
            (self.outputs.get(&requester), self.outputs.get(&candidate))
        else {
            debug!(requester = %requester, candidate = %candidate, "Output not yet published");
            return PairOutcome::Unavailable;
        };

        let notified = candidate_output.send(Outbound::Paired {
            partner: requester.clone(),
            output: requester_output.clone(),
        });
        if !notified {
            // Candidate's session is gone; its release will dissolve the pair
            debug!(candidate = %candidate, "Candidate outbox closed at pairing time");
        }

        let now = Utc::now();
        for name in [&requester, &candidate] {
            if let Some(entry) = self.names.get_mut(name) {
                entry.busy = true;
                entry.paired_at = Some(now);
            }
        }
        self.pairs.insert(requester.clone(), candidate.clone());
        self.pairs.insert(candidate.clone(), requester.clone());

        info!(requester = %requester, candidate = %candidate, "Clients paired");
        self.publish(RegistryEvent::Paired {
            requester,
            candidate,
        });

        PairOutcome::Paired
    }

    fn handle_release(&mut self, name: &ScreenName) -> bool {
        let entry = self.names.remove(name);
        let had_output = self.outputs.remove(name).is_some();
        let partner = self.pairs.remove(name);

        if entry.is_none() && !had_output && partner.is_none() {
            return false;
        }

        if let Some(ref partner) = partner {
            // Only dissolve the reverse edge if it still points back at us
            if self.pairs.get(partner) == Some(name) {
                self.pairs.remove(partner);
            }

            if let Some(partner_entry) = self.names.get_mut(partner) {
                partner_entry.busy = false;
                partner_entry.paired_at = None;
            }

            let delivered = self
                .outputs
                .get(partner)
                .is_some_and(|output| output.send(Outbound::PartnerLeft));

            let paired_secs = entry
                .as_ref()
                .and_then(|e| e.paired_at)
                .map(|at| (Utc::now() - at).num_seconds());

            info!(
                name = %name,
                partner = %partner,
                delivered,
                paired_secs = ?paired_secs,
                "Pairing dissolved"
            );
        }

        info!(name = %name, clients = self.names.len(), "Name released");
        self.publish(RegistryEvent::Released {
            name: name.clone(),
            partner,
        });

        true
    }

    fn handle_snapshot(&self) -> Vec<ClientView> {
        let mut views: Vec<ClientView> = self
            .names
            .iter()
            .map(|(name, entry)| ClientView {
                name: name.clone(),
                busy: entry.busy,
                partner: self.pairs.get(name).cloned(),
                reachable: self.outputs.contains_key(name),
                registered_at: entry.registered_at,
                paired_at: entry.paired_at,
            })
            .collect();

        views.sort_by(|a, b| a.name.cmp(&b.name));
        views
    }

    fn handle_sweep_closed(&mut self) {
        let closed: Vec<ScreenName> = self
            .outputs
            .iter()
            .filter(|(_, output)| output.is_closed())
            .map(|(name, _)| name.clone())
            .collect();

        for name in closed {
            warn!(name = %name, "Sweeping name whose session vanished");
            self.handle_release(&name);
        }
    }

    fn publish(&self, event: RegistryEvent) {
        // No subscribers is fine
        let _ = self.event_publisher.send(event);
    }
}
