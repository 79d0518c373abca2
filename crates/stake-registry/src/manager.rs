// stake-registry/src/manager.rs

use crate::{RegistryError, RegistryResult};
use stake_primitives::{Identity, StakeAmount};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

/// Contract-side owner of stakes.
///
/// A manager creates and adjusts the stakes it custodies, receives the block
/// reward for each of them and is told when one of its validators is
/// reported for misbehaviour.
pub trait StakeManager: Send + Sync {
    /// Credit `amount` earned by the stake of `owner`
    fn reward(&mut self, owner: &Identity, amount: &StakeAmount);

    /// A validator managed here was reported
    fn report(&mut self, owner: &Identity);
}

/// Registered stake managers by identity
#[derive(Default)]
pub struct ManagerDirectory {
    managers: HashMap<Identity, Box<dyn StakeManager>>,
}

impl ManagerDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, id: Identity, manager: Box<dyn StakeManager>) -> RegistryResult<()> {
        if self.managers.contains_key(&id) {
            return Err(RegistryError::ManagerExists(id));
        }
        self.managers.insert(id, manager);
        Ok(())
    }

    pub fn unregister(&mut self, id: &Identity) -> RegistryResult<Box<dyn StakeManager>> {
        self.managers
            .remove(id)
            .ok_or(RegistryError::UnknownManager(*id))
    }

    pub fn get_mut(&mut self, id: &Identity) -> Option<&mut (dyn StakeManager + 'static)> {
        self.managers.get_mut(id).map(|manager| manager.as_mut())
    }

    pub fn contains(&self, id: &Identity) -> bool {
        self.managers.contains_key(id)
    }

    /// Registered identities, sorted
    pub fn ids(&self) -> Vec<Identity> {
        let mut ids: Vec<_> = self.managers.keys().copied().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.managers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.managers.is_empty()
    }
}

impl std::fmt::Debug for ManagerDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagerDirectory")
            .field("managers", &self.ids())
            .finish()
    }
}

#[derive(Debug, Default)]
struct Ledger {
    rewards: BTreeMap<Identity, StakeAmount>,
    reports: BTreeMap<Identity, u64>,
}

/// In-memory manager that books rewards and reports per validator.
///
/// Clones share the same ledger, so a node can hand one clone to the
/// registry and keep another for queries.
#[derive(Debug, Clone, Default)]
pub struct LedgerManager {
    ledger: Arc<Mutex<Ledger>>,
}

impl LedgerManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Ledger> {
        // A poisoned ledger still holds consistent totals
        self.ledger.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Rewards credited to `owner` so far
    pub fn rewards_of(&self, owner: &Identity) -> StakeAmount {
        self.lock().rewards.get(owner).cloned().unwrap_or_default()
    }

    /// All rewards credited so far
    pub fn total_rewards(&self) -> StakeAmount {
        self.lock().rewards.values().cloned().sum()
    }

    pub fn reports_of(&self, owner: &Identity) -> u64 {
        self.lock().reports.get(owner).copied().unwrap_or(0)
    }

    /// Snapshot of per-validator rewards, ordered by identity
    pub fn rewards(&self) -> BTreeMap<Identity, StakeAmount> {
        self.lock().rewards.clone()
    }
}

impl StakeManager for LedgerManager {
    fn reward(&mut self, owner: &Identity, amount: &StakeAmount) {
        let mut ledger = self.lock();
        let balance = ledger.rewards.entry(*owner).or_default();
        *balance = balance.clone() + amount.clone();
    }

    fn report(&mut self, owner: &Identity) {
        *self.lock().reports.entry(*owner).or_insert(0) += 1;
        tracing::warn!("Validator {} reported", owner.short());
    }
}
