// stake-registry/src/lib.rs

//! Validator Stake Registry
//!
//! This crate implements the two-tier validator ranking state machine:
//! - A bounded *top* set (active validators) and an unbounded *queue*
//!   (candidates), kept ordered by stake through cached extremum indices
//! - Stake managers that own records and receive rewards
//! - Block listeners notified once per processed block
//! - Per-block reward emission over the top set

pub mod config;
pub mod events;
pub mod listener;
pub mod manager;
pub mod record;
pub mod registry;
pub mod rewards;
pub mod shared;
pub mod validator_set;

pub use config::RegistryConfig;
pub use events::RegistryEvent;
pub use listener::{BlockListener, ListenerSet};
pub use manager::{LedgerManager, ManagerDirectory, StakeManager};
pub use record::{StakeRecord, StakeSet};
pub use registry::{RegistrySnapshot, StakeOperation, StakeRegistry};
pub use rewards::{BlockReport, RewardEmitter, RewardPayout};
pub use shared::SharedValidatorSet;
pub use validator_set::ValidatorSet;

use stake_primitives::{BlockNumber, Identity, PrimitivesError, StakeAmount};

/// Result type for registry operations
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Errors that can occur in registry operations
///
/// Every failing call leaves the registry exactly as it was.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("Stake not found: {0}")]
    NotFound(Identity),

    #[error("Stake already exists: {0}")]
    AlreadyExists(Identity),

    #[error("Insufficient stake for {owner}: requested {requested}, available {available}")]
    InsufficientStake {
        owner: Identity,
        requested: StakeAmount,
        available: StakeAmount,
    },

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Invalid capacity: {0}")]
    InvalidCapacity(String),

    #[error("Capacity invariant violated: {0}")]
    CapacityInvariantViolation(String),

    #[error("Unknown stake manager: {0}")]
    UnknownManager(Identity),

    #[error("Stake manager already registered: {0}")]
    ManagerExists(Identity),

    #[error("Stake manager {manager} still owns {stakes} stakes")]
    ManagerHasStakes { manager: Identity, stakes: usize },

    #[error("{caller} is not the manager of stake {owner}")]
    NotStakeManager { owner: Identity, caller: Identity },

    #[error("Block listener already registered: {0}")]
    ListenerExists(Identity),

    #[error("Block listener not found: {0}")]
    ListenerNotFound(Identity),

    #[error("Block {block} is not after last processed block {last}")]
    StaleBlock { block: BlockNumber, last: BlockNumber },

    #[error("Primitive error: {0}")]
    Primitives(#[from] PrimitivesError),
}
