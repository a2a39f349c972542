//! Registry actor commands, errors, and events.
//!
//! This module defines the message types for communicating with the `RegistryActor`:
//! - `RegistryCommand`: Commands sent to the actor
//! - `RegistryError`: Errors that can occur during registry operations
//! - `PairOutcome`: Result of a pairing attempt
//! - `RegistryEvent`: Events published by the registry for subscribers
//! - `ClientView`: Read-only view of one registered client

use chrono::{DateTime, Utc};
use pairchat_core::ScreenName;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::oneshot;

use super::output::OutputChannel;

// ============================================================================
// Registry Commands
// ============================================================================

/// Commands sent to the registry actor.
///
/// Each command is handled to completion before the next one is looked at,
/// which makes every check-and-set below indivisible with respect to all
/// other sessions.
#[derive(Debug)]
pub enum RegistryCommand {
    /// Claim a screen name.
    ///
    /// Responds `Ok(true)` if the name was free and is now held (not busy),
    /// `Ok(false)` if it was already taken.
    ///
    /// # Errors
    /// - `RegistryError::RegistryFull` if at maximum capacity
    Register {
        /// Requested name
        name: ScreenName,
        /// Channel to send the result
        respond_to: oneshot::Sender<Result<bool, RegistryError>>,
    },

    /// Record the output channel for an accepted name.
    ///
    /// # Errors
    /// - `RegistryError::NotRegistered` if the name was never accepted
    PublishOutput {
        /// Name the channel belongs to
        name: ScreenName,
        /// Sending half of that client's outbox
        output: OutputChannel,
        /// Channel to send the result
        respond_to: oneshot::Sender<Result<(), RegistryError>>,
    },

    /// Pair `requester` with `candidate` if the candidate is available.
    TryPair {
        /// Name of the session asking
        requester: ScreenName,
        /// Name of the desired partner
        candidate: ScreenName,
        /// Channel to send the result
        respond_to: oneshot::Sender<PairOutcome>,
    },

    /// Resolve the output channel published for a name.
    LookupOutput {
        /// Name to look up
        name: ScreenName,
        /// Channel to send the result
        respond_to: oneshot::Sender<Option<OutputChannel>>,
    },

    /// Drop a name and dissolve its pairing, notifying the partner.
    ///
    /// Responds `true` if anything was removed. Releasing an unknown name
    /// is a no-op.
    Release {
        /// Name to release
        name: ScreenName,
        /// Channel to send the result
        respond_to: oneshot::Sender<bool>,
    },

    /// Get a consistent view of every registered client.
    Snapshot {
        /// Channel to send the results
        respond_to: oneshot::Sender<Vec<ClientView>>,
    },

    /// Drop names whose session disappeared without releasing.
    ///
    /// Fire-and-forget; sent by the periodic sweep task.
    SweepClosed,
}

// ============================================================================
// Outcomes and Errors
// ============================================================================

/// Result of a pairing attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairOutcome {
    /// Both clients are now busy and paired with each other.
    Paired,

    /// The candidate is unknown, busy, not yet reachable, or the requester
    /// itself. Clients are not told which.
    Unavailable,

    /// The requester was paired by someone else before this request ran.
    AlreadyPaired,
}

impl PairOutcome {
    /// Returns `true` if the pairing was established.
    #[must_use]
    pub fn is_paired(self) -> bool {
        self == Self::Paired
    }
}

/// Errors that can occur during registry operations.
#[derive(Debug, Clone, Error)]
pub enum RegistryError {
    /// The registry has reached its maximum client capacity.
    #[error("registry is full (max: {max} clients)")]
    RegistryFull {
        /// Maximum number of clients allowed
        max: usize,
    },

    /// An operation referenced a name that is not registered.
    #[error("name not registered: {0}")]
    NotRegistered(ScreenName),

    /// The response channel was closed before receiving a response.
    ///
    /// This typically indicates the actor was shut down.
    #[error("response channel closed")]
    ChannelClosed,
}

// ============================================================================
// Events and Views
// ============================================================================

/// Events published by the registry to subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryEvent {
    /// A name was accepted.
    Registered {
        /// The accepted name
        name: ScreenName,
    },

    /// Two clients were paired.
    Paired {
        /// Client that asked
        requester: ScreenName,
        /// Client that was asked for
        candidate: ScreenName,
    },

    /// A name was released.
    Released {
        /// The released name
        name: ScreenName,
        /// Partner that was notified, if the name was paired
        partner: Option<ScreenName>,
    },
}

/// Read-only view of one registered client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClientView {
    /// Registered screen name
    pub name: ScreenName,
    /// Whether the client is currently paired
    pub busy: bool,
    /// Current partner, if paired
    pub partner: Option<ScreenName>,
    /// Whether an output channel has been published
    pub reachable: bool,
    /// When the name was accepted
    pub registered_at: DateTime<Utc>,
    /// When the current pairing was established
    pub paired_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_error_display() {
        let err = RegistryError::RegistryFull { max: 100 };
        assert_eq!(err.to_string(), "registry is full (max: 100 clients)");

        let err = RegistryError::NotRegistered(ScreenName::parse("ghost").unwrap());
        assert_eq!(err.to_string(), "name not registered: ghost");

        let err = RegistryError::ChannelClosed;
        assert_eq!(err.to_string(), "response channel closed");
    }

    #[test]
    fn test_pair_outcome_is_paired() {
        assert!(PairOutcome::Paired.is_paired());
        assert!(!PairOutcome::Unavailable.is_paired());
        assert!(!PairOutcome::AlreadyPaired.is_paired());
    }

    #[tokio::test]
    async fn test_command_channel_closed_error() {
        let (tx, rx) = oneshot::channel::<Result<bool, RegistryError>>();

        drop(tx);

        let result = rx.await;
        assert!(result.is_err());
    }
}
