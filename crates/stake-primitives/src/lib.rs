// stake-primitives/src/lib.rs

//! Primitive types shared by the stake registry crates
//!
//! This crate provides:
//! - `Identity`: 20-byte staking identity (validator or manager address)
//! - `Amount` / `StakeAmount`: arbitrary-precision token amounts
//! - Block numbering

pub mod amount;
pub mod identity;

pub use amount::{Amount, StakeAmount};
pub use identity::{Identity, IDENTITY_SIZE};

/// Block number/height
pub type BlockNumber = u64;

/// Result type for primitive conversions
pub type PrimitivesResult<T> = Result<T, PrimitivesError>;

/// Errors that can occur while parsing or converting primitives
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PrimitivesError {
    #[error("Invalid identity: {0}")]
    InvalidIdentity(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),
}
