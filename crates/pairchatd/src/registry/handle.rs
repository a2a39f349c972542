//! Client interface for interacting with the RegistryActor.
//!
//! The `RegistryHandle` provides a cheap-to-clone interface for sending commands
//! to the registry actor and subscribing to registry events.
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Channel errors are mapped to `RegistryError::ChannelClosed` or a
//!   conservative default (`None`, `false`, an empty snapshot)

use tokio::sync::{broadcast, mpsc, oneshot};

use pairchat_core::ScreenName;

use super::commands::{ClientView, PairOutcome, RegistryCommand, RegistryError, RegistryEvent};
use super::output::OutputChannel;

// ============================================================================
// Registry Handle
// ============================================================================

/// Handle for interacting with the registry actor.
///
/// This is a cheap-to-clone handle that can be shared across tasks.
/// All methods are async and communicate with the actor via channels.
///
/// # Usage
///
/// ```ignore
/// let handle = registry_handle.clone();
///
/// if handle.try_register(name.clone()).await? {
///     handle.publish_output(name.clone(), output).await?;
/// }
///
/// match handle.try_pair(name, candidate).await? {
///     PairOutcome::Paired => { /* relay */ }
///     _ => { /* re-prompt */ }
/// }
/// ```
#[derive(Clone)]
pub struct RegistryHandle {
    /// Command sender to the actor
    sender: mpsc::Sender<RegistryCommand>,

    /// Event broadcaster for subscribing to updates
    event_sender: broadcast::Sender<RegistryEvent>,
}

impl RegistryHandle {
    /// Create a new registry handle.
    ///
    /// # Arguments
    ///
    /// * `sender` - The command channel sender for communicating with the actor
    /// * `event_sender` - The broadcast sender for subscribing to events
    pub fn new(
        sender: mpsc::Sender<RegistryCommand>,
        event_sender: broadcast::Sender<RegistryEvent>,
    ) -> Self {
        Self {
            sender,
            event_sender,
        }
    }

    /// Claim a screen name.
    ///
    /// Returns `Ok(true)` if the name is now held by the caller and
    /// `Ok(false)` if another client already holds it.
    ///
    /// # Errors
    ///
    /// - `RegistryError::RegistryFull` if the registry is at maximum capacity
    /// - `RegistryError::ChannelClosed` if the actor has shut down
    pub async fn try_register(&self, name: ScreenName) -> Result<bool, RegistryError> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(RegistryCommand::Register {
                name,
                respond_to: tx,
            })
            .await
            .map_err(|_| RegistryError::ChannelClosed)?;

        rx.await.map_err(|_| RegistryError::ChannelClosed)?
    }

    /// Record where lines for `name` should be delivered.
    ///
    /// # Errors
    ///
    /// - `RegistryError::NotRegistered` if `name` was never accepted
    /// - `RegistryError::ChannelClosed` if the actor has shut down
    pub async fn publish_output(
        &self,
        name: ScreenName,
        output: OutputChannel,
    ) -> Result<(), RegistryError> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(RegistryCommand::PublishOutput {
                name,
                output,
                respond_to: tx,
            })
            .await
            .map_err(|_| RegistryError::ChannelClosed)?;

        rx.await.map_err(|_| RegistryError::ChannelClosed)?
    }

    /// Pair `requester` with `candidate`.
    ///
    /// On `PairOutcome::Paired` the candidate's session has already been
    /// sent `Outbound::Paired`.
    ///
    /// # Errors
    ///
    /// - `RegistryError::ChannelClosed` if the actor has shut down
    pub async fn try_pair(
        &self,
        requester: ScreenName,
        candidate: ScreenName,
    ) -> Result<PairOutcome, RegistryError> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(RegistryCommand::TryPair {
                requester,
                candidate,
                respond_to: tx,
            })
            .await
            .map_err(|_| RegistryError::ChannelClosed)?;

        rx.await.map_err(|_| RegistryError::ChannelClosed)
    }

    /// Resolve the output channel published for `name`.
    ///
    /// Returns `None` if the name has no channel or if communication
    /// with the actor fails.
    pub async fn lookup_output(&self, name: ScreenName) -> Option<OutputChannel> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(RegistryCommand::LookupOutput {
                name,
                respond_to: tx,
            })
            .await
            .ok()?;

        rx.await.ok()?
    }

    /// Release `name`, dissolving its pairing and notifying the partner.
    ///
    /// Returns `true` if anything was removed. Idempotent; returns `false`
    /// if the actor has shut down.
    pub async fn release(&self, name: ScreenName) -> bool {
        let (tx, rx) = oneshot::channel();

        if self
            .sender
            .send(RegistryCommand::Release {
                name,
                respond_to: tx,
            })
            .await
            .is_err()
        {
            return false;
        }

        rx.await.unwrap_or(false)
    }

    /// Get a consistent view of every registered client, sorted by name.
    ///
    /// Returns an empty vector if communication with the actor fails.
    pub async fn snapshot(&self) -> Vec<ClientView> {
        let (tx, rx) = oneshot::channel();

        if self
            .sender
            .send(RegistryCommand::Snapshot { respond_to: tx })
            .await
            .is_err()
        {
            return Vec::new();
        }

        rx.await.unwrap_or_default()
    }

    /// Trigger a sweep of names whose session vanished.
    ///
    /// Fire-and-forget.
    pub async fn sweep_closed(&self) {
        let _ = self.sender.send(RegistryCommand::SweepClosed).await;
    }

    /// Subscribe to registry events.
    ///
    /// This is a synchronous operation - it doesn't communicate with the actor.
    pub fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.event_sender.subscribe()
    }

    /// Check if the actor is still running.
    pub fn is_connected(&self) -> bool {
        !self.sender.is_closed()
    }
}
