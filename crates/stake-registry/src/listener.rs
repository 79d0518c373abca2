// stake-registry/src/listener.rs

use crate::{RegistryError, RegistryResult};
use stake_primitives::{BlockNumber, Identity};

/// Receives a callback for every processed block
pub trait BlockListener: Send + Sync {
    fn on_block(&mut self, block: BlockNumber);
}

/// Listeners in registration order
#[derive(Default)]
pub struct ListenerSet {
    listeners: Vec<(Identity, Box<dyn BlockListener>)>,
}

impl ListenerSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, id: Identity, listener: Box<dyn BlockListener>) -> RegistryResult<()> {
        if self.contains(&id) {
            return Err(RegistryError::ListenerExists(id));
        }
        self.listeners.push((id, listener));
        Ok(())
    }

    /// Remove a listener, keeping the order of the others
    pub fn remove(&mut self, id: &Identity) -> RegistryResult<Box<dyn BlockListener>> {
        let position = self
            .listeners
            .iter()
            .position(|(listener_id, _)| listener_id == id)
            .ok_or(RegistryError::ListenerNotFound(*id))?;
        Ok(self.listeners.remove(position).1)
    }

    pub fn contains(&self, id: &Identity) -> bool {
        self.listeners.iter().any(|(listener_id, _)| listener_id == id)
    }

    pub fn ids(&self) -> Vec<Identity> {
        self.listeners.iter().map(|(id, _)| *id).collect()
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    /// Call every listener in order, returning how many were notified
    pub fn notify(&mut self, block: BlockNumber) -> usize {
        for (_, listener) in self.listeners.iter_mut() {
            listener.on_block(block);
        }
        self.listeners.len()
    }
}

impl std::fmt::Debug for ListenerSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerSet")
            .field("listeners", &self.ids())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    struct Recorder {
        tag: u8,
        seen: Arc<Mutex<Vec<(u8, BlockNumber)>>>,
    }

    impl BlockListener for Recorder {
        fn on_block(&mut self, block: BlockNumber) {
            self.seen.lock().unwrap().push((self.tag, block));
        }
    }

    #[test]
    fn test_notify_in_registration_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut set = ListenerSet::new();

        for tag in [3u8, 1, 2] {
            set.add(
                Identity::from_low_u64(tag as u64),
                Box::new(Recorder { tag, seen: seen.clone() }),
            )
            .unwrap();
        }

        assert_eq!(set.notify(7), 3);
        assert_eq!(*seen.lock().unwrap(), vec![(3, 7), (1, 7), (2, 7)]);
    }

    #[test]
    fn test_duplicate_and_missing() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let id = Identity::from_low_u64(1);
        let mut set = ListenerSet::new();

        set.add(id, Box::new(Recorder { tag: 1, seen: seen.clone() })).unwrap();
        assert!(matches!(
            set.add(id, Box::new(Recorder { tag: 1, seen })),
            Err(RegistryError::ListenerExists(_))
        ));

        set.remove(&id).unwrap();
        assert!(set.is_empty());
        assert!(matches!(set.remove(&id), Err(RegistryError::ListenerNotFound(_))));
    }
}
