// registry-node/src/lib.rs
pub mod config;
pub mod fuzz;
pub mod runtime;
pub mod script;

pub use config::{GenesisConfig, GenesisStake, NodeConfig};
pub use runtime::{Node, PersistedState};
pub use script::{Script, ScriptOutcome, ScriptStep};

use stake_primitives::Identity;

/// Resolve a human-written identity: `0x`-prefixed hex is taken as is, any
/// other string is hashed into an identity.
pub fn identity_from_label(label: &str) -> anyhow::Result<Identity> {
    if label.starts_with("0x") {
        Ok(Identity::from_hex(label)?)
    } else {
        Ok(Identity::derive(label.as_bytes()))
    }
}
