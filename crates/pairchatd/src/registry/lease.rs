//! Scoped ownership of a registered name.
//!
//! A `NameLease` is created the moment a name is accepted and guarantees a
//! matching `release`: explicitly via [`NameLease::release`] on normal exit
//! paths, or from `Drop` when the owning task unwinds or is aborted first.

use tokio::runtime::Handle;
use tracing::{debug, warn};

use pairchat_core::ScreenName;

use super::handle::RegistryHandle;

/// Holds a registered name until released.
pub struct NameLease {
    registry: RegistryHandle,
    name: Option<ScreenName>,
}

impl NameLease {
    /// Takes ownership of an accepted name.
    pub fn new(registry: RegistryHandle, name: ScreenName) -> Self {
        Self {
            registry,
            name: Some(name),
        }
    }

    /// The leased name.
    pub fn name(&self) -> Option<&ScreenName> {
        self.name.as_ref()
    }

    /// Releases the name and waits for the registry to apply it.
    ///
    /// Returns what `RegistryHandle::release` returned.
    pub async fn release(mut self) -> bool {
        match self.name.take() {
            Some(name) => self.registry.release(name).await,
            None => false,
        }
    }
}

impl Drop for NameLease {
    fn drop(&mut self) {
        let Some(name) = self.name.take() else {
            return;
        };

        match Handle::try_current() {
            Ok(runtime) => {
                debug!(name = %name, "Releasing name from drop");
                let registry = self.registry.clone();
                runtime.spawn(async move {
                    registry.release(name).await;
                });
            }
            Err(_) => {
                // Runtime already gone; the registry actor went with it
                warn!(name = %name, "Name lease dropped outside of a runtime");
            }
        }
    }
}
