// stake-registry/src/events.rs

use serde::{Deserialize, Serialize};
use stake_primitives::Identity;

/// Membership change emitted by a registry mutation.
///
/// Each mutating call returns its events in the order the changes happened;
/// callers and tests rely on that order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RegistryEvent {
    AddedToTop { owner: Identity },
    RemovedFromTop { owner: Identity },
    AddedToQueue { owner: Identity },
    RemovedFromQueue { owner: Identity },
    TopCapacityChanged { old: usize, new: usize },
}

impl RegistryEvent {
    /// Identity the event is about, if any
    pub fn owner(&self) -> Option<&Identity> {
        match self {
            RegistryEvent::AddedToTop { owner }
            | RegistryEvent::RemovedFromTop { owner }
            | RegistryEvent::AddedToQueue { owner }
            | RegistryEvent::RemovedFromQueue { owner } => Some(owner),
            RegistryEvent::TopCapacityChanged { .. } => None,
        }
    }
}
