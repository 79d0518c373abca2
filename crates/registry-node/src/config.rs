// registry-node/src/config.rs
use serde::{Deserialize, Serialize};
use stake_primitives::StakeAmount;
use stake_registry::RegistryConfig;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeConfig {
    pub data_dir: String,
    /// Milliseconds between processed blocks
    pub block_time_ms: u64,
    pub blocks_per_epoch: u64,
    /// Persist the registry every this many blocks
    pub snapshot_interval: u64,
    pub registry: RegistryConfig,
    pub genesis: GenesisConfig,
}

/// Stakes created on first start, all owned by one manager
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisConfig {
    pub manager: String,
    #[serde(default)]
    pub stakes: Vec<GenesisStake>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisStake {
    pub owner: String,
    pub amount: StakeAmount,
    #[serde(default)]
    pub always_top: bool,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            data_dir: "./data".into(),
            block_time_ms: 3_000,
            blocks_per_epoch: 100,
            snapshot_interval: 10,
            registry: RegistryConfig::default(),
            genesis: GenesisConfig {
                manager: "genesis-manager".into(),
                stakes: vec![
                    GenesisStake {
                        owner: "foundation".into(),
                        amount: StakeAmount::zero(),
                        always_top: true,
                    },
                    GenesisStake {
                        owner: "validator-1".into(),
                        amount: StakeAmount::from_u64(10_000),
                        always_top: false,
                    },
                    GenesisStake {
                        owner: "validator-2".into(),
                        amount: StakeAmount::from_u64(7_500),
                        always_top: false,
                    },
                ],
            },
        }
    }
}

impl NodeConfig {
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config = toml::from_str(&contents)?;
        Ok(config)
    }

    pub fn to_file(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Where the registry snapshot lives
    pub fn snapshot_path(&self) -> PathBuf {
        Path::new(&self.data_dir).join("registry.snapshot")
    }
}
