// stake-registry/src/config.rs

use serde::{Deserialize, Serialize};
use stake_primitives::StakeAmount;

/// Configuration for the validator registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Number of active (top) validator slots
    pub top_capacity: usize,
    /// Reward emitted per block, split across the top set by stake
    pub base_reward: StakeAmount,
    /// Number of registry events kept in the in-memory journal
    pub event_journal_size: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            top_capacity: 200,
            base_reward: StakeAmount::from_u64(1_000),
            event_journal_size: 1_024,
        }
    }
}

impl RegistryConfig {
    /// Config with the given top capacity and defaults elsewhere
    pub fn with_capacity(top_capacity: usize) -> Self {
        Self {
            top_capacity,
            ..Default::default()
        }
    }
}
