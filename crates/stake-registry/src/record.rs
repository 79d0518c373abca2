// stake-registry/src/record.rs

use serde::{Deserialize, Serialize};
use stake_primitives::{Identity, StakeAmount};
use std::cmp::Ordering;

/// Which of the two registry arrays holds a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StakeSet {
    /// Active validators, bounded by the top capacity
    Top,
    /// Candidates waiting for a top slot
    Queue,
}

/// One stake per staking identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakeRecord {
    /// Staking identity
    pub owner: Identity,
    /// Manager that created the stake and custodies its funds
    pub manager: Identity,
    /// Current stake
    pub amount: StakeAmount,
    /// Never demoted from the top set, whatever the amount
    pub is_always_top: bool,
}

impl StakeRecord {
    pub fn new(owner: Identity, manager: Identity, amount: StakeAmount, is_always_top: bool) -> Self {
        Self {
            owner,
            manager,
            amount,
            is_always_top,
        }
    }

    /// Total order used for eviction and promotion.
    ///
    /// Always-top records rank above everything else, then larger amounts rank
    /// higher, and equal amounts are ordered by identity with the smaller
    /// identity ranking higher.
    pub fn rank_cmp(&self, other: &StakeRecord) -> Ordering {
        self.is_always_top
            .cmp(&other.is_always_top)
            .then_with(|| self.amount.cmp(&other.amount))
            .then_with(|| other.owner.cmp(&self.owner))
    }

    /// Strictly ranks above `other`
    pub fn outranks(&self, other: &StakeRecord) -> bool {
        self.rank_cmp(other) == Ordering::Greater
    }

    /// Can be pushed out of the top set
    pub fn is_evictable(&self) -> bool {
        !self.is_always_top
    }
}
