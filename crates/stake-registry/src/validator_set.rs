// stake-registry/src/validator_set.rs

use crate::{
    config::RegistryConfig,
    events::RegistryEvent,
    listener::{BlockListener, ListenerSet},
    manager::{ManagerDirectory, StakeManager},
    registry::{RegistrySnapshot, StakeRegistry},
    rewards::{BlockReport, RewardEmitter},
    RegistryError, RegistryResult,
};
use stake_primitives::{BlockNumber, Identity, StakeAmount};
use std::collections::VecDeque;

/// Registry plus the managers, listeners and reward emitter around it.
///
/// Stake mutations are made on behalf of a registered manager, and only the
/// manager that created a stake may change it afterwards.
#[derive(Debug)]
pub struct ValidatorSet {
    config: RegistryConfig,
    registry: StakeRegistry,
    managers: ManagerDirectory,
    listeners: ListenerSet,
    emitter: RewardEmitter,
    journal: VecDeque<RegistryEvent>,
    last_block: Option<BlockNumber>,
}

impl ValidatorSet {
    /// Create an empty validator set
    pub fn new(config: RegistryConfig) -> RegistryResult<Self> {
        let registry = StakeRegistry::new(config.top_capacity)?;
        Ok(Self::with_registry(config, registry))
    }

    /// Resume from a snapshot. A configured top capacity that differs from
    /// the snapshot's is applied as a resize. Managers and listeners must be
    /// registered again by the caller.
    pub fn restore(config: RegistryConfig, snapshot: RegistrySnapshot) -> RegistryResult<Self> {
        let registry = StakeRegistry::from_snapshot(snapshot)?;
        let configured = config.top_capacity;

        tracing::info!(
            "Restored registry with {} top and {} queued stakes",
            registry.top().len(),
            registry.queue().len()
        );

        let mut set = Self::with_registry(config, registry);
        let restored = set.registry.top_capacity();
        set.config.top_capacity = restored;

        if configured != restored {
            tracing::info!(
                "Snapshot top capacity {} differs from configured {}, resizing",
                restored,
                configured
            );
            set.change_top_capacity(configured)?;
        }

        Ok(set)
    }

    fn with_registry(config: RegistryConfig, registry: StakeRegistry) -> Self {
        Self {
            emitter: RewardEmitter::new(config.base_reward.clone()),
            journal: VecDeque::with_capacity(config.event_journal_size.min(1_024)),
            config,
            registry,
            managers: ManagerDirectory::new(),
            listeners: ListenerSet::new(),
            last_block: None,
        }
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    pub fn registry(&self) -> &StakeRegistry {
        &self.registry
    }

    pub fn snapshot(&self) -> RegistrySnapshot {
        self.registry.snapshot()
    }

    pub fn last_block(&self) -> Option<BlockNumber> {
        self.last_block
    }

    pub fn base_reward(&self) -> &StakeAmount {
        self.emitter.base_reward()
    }

    pub fn total_emitted(&self) -> &StakeAmount {
        self.emitter.total_emitted()
    }

    // ----- managers --------------------------------------------------------

    pub fn register_manager(&mut self, id: Identity, manager: Box<dyn StakeManager>) -> RegistryResult<()> {
        self.managers.register(id, manager)?;
        tracing::info!("Registered stake manager {}", id.short());
        Ok(())
    }

    /// Remove a manager that no longer owns any stake
    pub fn unregister_manager(&mut self, id: &Identity) -> RegistryResult<()> {
        if !self.managers.contains(id) {
            return Err(RegistryError::UnknownManager(*id));
        }
        let stakes = self.registry.count_by_manager(id);
        if stakes > 0 {
            return Err(RegistryError::ManagerHasStakes {
                manager: *id,
                stakes,
            });
        }

        self.managers.unregister(id)?;
        tracing::info!("Unregistered stake manager {}", id.short());
        Ok(())
    }

    pub fn managers(&self) -> Vec<Identity> {
        self.managers.ids()
    }

    // ----- listeners -------------------------------------------------------

    pub fn add_listener(&mut self, id: Identity, listener: Box<dyn BlockListener>) -> RegistryResult<()> {
        self.listeners.add(id, listener)?;
        tracing::debug!("Added block listener {}", id.short());
        Ok(())
    }

    pub fn remove_listener(&mut self, id: &Identity) -> RegistryResult<()> {
        self.listeners.remove(id)?;
        tracing::debug!("Removed block listener {}", id.short());
        Ok(())
    }

    pub fn listeners(&self) -> Vec<Identity> {
        self.listeners.ids()
    }

    // ----- stakes ----------------------------------------------------------

    pub fn create_stake(
        &mut self,
        manager: &Identity,
        owner: Identity,
        amount: StakeAmount,
        is_always_top: bool,
    ) -> RegistryResult<Vec<RegistryEvent>> {
        self.ensure_manager(manager)?;
        let events = self
            .registry
            .create_stake(owner, *manager, amount, is_always_top)?;

        tracing::info!(
            "Stake {} created by {} ({})",
            owner.short(),
            manager.short(),
            if self.registry.is_top(&owner) { "top" } else { "queued" }
        );
        Ok(self.record(events))
    }

    pub fn increase_stake(
        &mut self,
        manager: &Identity,
        owner: &Identity,
        delta: &StakeAmount,
    ) -> RegistryResult<Vec<RegistryEvent>> {
        self.ensure_owner(manager, owner)?;
        let events = self.registry.increase_stake(owner, delta)?;
        Ok(self.record(events))
    }

    pub fn decrease_stake(
        &mut self,
        manager: &Identity,
        owner: &Identity,
        delta: &StakeAmount,
    ) -> RegistryResult<Vec<RegistryEvent>> {
        self.ensure_owner(manager, owner)?;
        let events = self.registry.decrease_stake(owner, delta)?;
        Ok(self.record(events))
    }

    pub fn remove_stake(&mut self, manager: &Identity, owner: &Identity) -> RegistryResult<Vec<RegistryEvent>> {
        self.ensure_owner(manager, owner)?;
        let events = self.registry.remove_stake(owner)?;
        tracing::info!("Stake {} removed by {}", owner.short(), manager.short());
        Ok(self.record(events))
    }

    // ----- administration --------------------------------------------------

    pub fn change_top_capacity(&mut self, capacity: usize) -> RegistryResult<Vec<RegistryEvent>> {
        let events = self.registry.change_top_capacity(capacity)?;
        self.config.top_capacity = capacity;
        Ok(self.record(events))
    }

    pub fn set_base_reward(&mut self, base_reward: StakeAmount) {
        self.config.base_reward = base_reward.clone();
        self.emitter.set_base_reward(base_reward);
    }

    /// Forward a misbehaviour report to the validator's manager
    pub fn report(&mut self, owner: &Identity) -> RegistryResult<()> {
        let manager = self
            .registry
            .record(owner)
            .map(|record| record.manager)
            .ok_or(RegistryError::NotFound(*owner))?;

        self.managers
            .get_mut(&manager)
            .ok_or(RegistryError::UnknownManager(manager))?
            .report(owner);
        Ok(())
    }

    // ----- blocks ----------------------------------------------------------

    /// Notify every listener, then pay the block reward to the top set
    pub fn process_block(&mut self, block: BlockNumber) -> RegistryResult<BlockReport> {
        if let Some(last) = self.last_block {
            if block <= last {
                return Err(RegistryError::StaleBlock { block, last });
            }
        }

        // Fail before any listener runs if a reward could not be delivered
        if let Some(record) = self
            .registry
            .top_records()
            .into_iter()
            .find(|record| !self.managers.contains(&record.manager))
        {
            return Err(RegistryError::UnknownManager(record.manager));
        }

        let listeners_notified = self.listeners.notify(block);
        let payouts = self.emitter.emit(&self.registry, &mut self.managers)?;
        let total_paid: StakeAmount = payouts.iter().map(|p| p.amount.clone()).sum();
        self.last_block = Some(block);

        tracing::debug!(
            "Processed block {}: {} listeners, {} payouts totalling {}",
            block,
            listeners_notified,
            payouts.len(),
            total_paid
        );

        Ok(BlockReport {
            block,
            listeners_notified,
            payouts,
            total_paid,
        })
    }

    // ----- journal ---------------------------------------------------------

    /// Most recent events, oldest first
    pub fn recent_events(&self) -> Vec<RegistryEvent> {
        self.journal.iter().cloned().collect()
    }

    fn record(&mut self, events: Vec<RegistryEvent>) -> Vec<RegistryEvent> {
        let limit = self.config.event_journal_size;
        if limit > 0 {
            for event in &events {
                if self.journal.len() == limit {
                    self.journal.pop_front();
                }
                self.journal.push_back(event.clone());
            }
        }
        events
    }

    fn ensure_manager(&self, manager: &Identity) -> RegistryResult<()> {
        if self.managers.contains(manager) {
            Ok(())
        } else {
            Err(RegistryError::UnknownManager(*manager))
        }
    }

    fn ensure_owner(&self, manager: &Identity, owner: &Identity) -> RegistryResult<()> {
        self.ensure_manager(manager)?;
        let record = self
            .registry
            .record(owner)
            .ok_or(RegistryError::NotFound(*owner))?;
        if record.manager != *manager {
            return Err(RegistryError::NotStakeManager {
                owner: *owner,
                caller: *manager,
            });
        }
        Ok(())
    }
}
