// stake-registry/src/rewards.rs

use crate::{manager::ManagerDirectory, registry::StakeRegistry, RegistryError, RegistryResult};
use serde::{Deserialize, Serialize};
use stake_primitives::{BlockNumber, Identity, StakeAmount};

/// Reward owed to one top-set validator for one block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardPayout {
    /// Validator
    pub owner: Identity,
    /// Manager credited with the reward
    pub manager: Identity,
    /// Reward amount
    pub amount: StakeAmount,
}

/// Outcome of processing one block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockReport {
    pub block: BlockNumber,
    pub listeners_notified: usize,
    pub payouts: Vec<RewardPayout>,
    pub total_paid: StakeAmount,
}

/// Per-block reward distributor.
///
/// R(i) = base_reward × S(i) / Σ S(top)
///
/// Integer division; the undistributed remainder is simply not paid.
#[derive(Debug, Clone)]
pub struct RewardEmitter {
    base_reward: StakeAmount,
    total_emitted: StakeAmount,
}

impl RewardEmitter {
    pub fn new(base_reward: StakeAmount) -> Self {
        Self {
            base_reward,
            total_emitted: StakeAmount::zero(),
        }
    }

    pub fn base_reward(&self) -> &StakeAmount {
        &self.base_reward
    }

    pub fn set_base_reward(&mut self, base_reward: StakeAmount) {
        tracing::info!("Base reward changed from {} to {}", self.base_reward, base_reward);
        self.base_reward = base_reward;
    }

    /// Everything paid out since creation
    pub fn total_emitted(&self) -> &StakeAmount {
        &self.total_emitted
    }

    /// Split the base reward over the top set, in top-array order
    pub fn calculate(&self, registry: &StakeRegistry) -> Vec<RewardPayout> {
        let total = registry.top_stake();
        if total.is_zero() || self.base_reward.is_zero() {
            return Vec::new();
        }

        registry
            .top_records()
            .into_iter()
            .filter_map(|record| {
                let amount = self.base_reward.mul_div(&record.amount, &total)?;
                (!amount.is_zero()).then(|| RewardPayout {
                    owner: record.owner,
                    manager: record.manager,
                    amount,
                })
            })
            .collect()
    }

    /// Pay this block's rewards through each validator's manager.
    ///
    /// Every manager is resolved before the first payment, so a missing one
    /// fails the block without paying anybody.
    pub fn emit(
        &mut self,
        registry: &StakeRegistry,
        managers: &mut ManagerDirectory,
    ) -> RegistryResult<Vec<RewardPayout>> {
        let payouts = self.calculate(registry);

        if let Some(missing) = payouts.iter().find(|p| !managers.contains(&p.manager)) {
            return Err(RegistryError::UnknownManager(missing.manager));
        }

        for payout in &payouts {
            if let Some(manager) = managers.get_mut(&payout.manager) {
                manager.reward(&payout.owner, &payout.amount);
            }
            self.total_emitted = self.total_emitted.clone() + payout.amount.clone();
        }

        Ok(payouts)
    }
}
