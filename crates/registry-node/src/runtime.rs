// registry-node/src/runtime.rs
use crate::{identity_from_label, NodeConfig};
use serde::{Deserialize, Serialize};
use stake_primitives::{BlockNumber, Identity};
use stake_registry::{
    BlockListener, LedgerManager, RegistrySnapshot, SharedValidatorSet, ValidatorSet,
};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::{interval, Duration};

/// What the node writes to disk between runs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedState {
    pub last_block: Option<BlockNumber>,
    pub registry: RegistrySnapshot,
}

impl PersistedState {
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let bytes = std::fs::read(path)?;
        Ok(bincode::deserialize(&bytes)?)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, bincode::serialize(self)?)?;
        Ok(())
    }
}

/// Logs epoch boundaries and counts completed epochs
pub struct EpochListener {
    blocks_per_epoch: u64,
    epochs: Arc<AtomicU64>,
}

impl EpochListener {
    pub fn new(blocks_per_epoch: u64, epochs: Arc<AtomicU64>) -> Self {
        Self {
            blocks_per_epoch: blocks_per_epoch.max(1),
            epochs,
        }
    }
}

impl BlockListener for EpochListener {
    fn on_block(&mut self, block: BlockNumber) {
        if block % self.blocks_per_epoch == 0 {
            let epoch = self.epochs.fetch_add(1, Ordering::SeqCst) + 1;
            tracing::info!("Epoch {} complete at block {}", epoch, block);
        }
    }
}

pub struct Node {
    config: NodeConfig,
    validators: SharedValidatorSet,
    ledger: LedgerManager,
    manager: Identity,
    epochs: Arc<AtomicU64>,
    next_block: Mutex<BlockNumber>,
}

impl Node {
    /// Resume from the snapshot in `data_dir`, or seed the genesis stakes
    pub fn new(config: NodeConfig) -> anyhow::Result<Self> {
        tracing::info!("Initializing registry node");

        let manager = identity_from_label(&config.genesis.manager)?;
        let ledger = LedgerManager::new();
        let epochs = Arc::new(AtomicU64::new(0));
        let snapshot_path = config.snapshot_path();

        let (mut set, last_block, fresh) = if snapshot_path.exists() {
            let state = PersistedState::load(&snapshot_path)?;
            tracing::info!("Loaded snapshot from {}", snapshot_path.display());
            let set = ValidatorSet::restore(config.registry.clone(), state.registry)?;
            (set, state.last_block, false)
        } else {
            (ValidatorSet::new(config.registry.clone())?, None, true)
        };

        set.register_manager(manager, Box::new(ledger.clone()))?;
        set.add_listener(
            Identity::derive(b"epoch-listener"),
            Box::new(EpochListener::new(config.blocks_per_epoch, epochs.clone())),
        )?;

        if fresh {
            for stake in &config.genesis.stakes {
                let owner = identity_from_label(&stake.owner)?;
                set.create_stake(&manager, owner, stake.amount.clone(), stake.always_top)?;
            }
            tracing::info!(
                "✓ Genesis registry: {} top, {} queued",
                set.registry().top().len(),
                set.registry().queue().len()
            );
        }

        Ok(Self {
            config,
            validators: SharedValidatorSet::new(set),
            ledger,
            manager,
            epochs,
            next_block: Mutex::new(last_block.map_or(1, |block| block + 1)),
        })
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn validators(&self) -> &SharedValidatorSet {
        &self.validators
    }

    pub fn ledger(&self) -> &LedgerManager {
        &self.ledger
    }

    pub fn manager(&self) -> Identity {
        self.manager
    }

    pub fn epochs(&self) -> u64 {
        self.epochs.load(Ordering::SeqCst)
    }

    /// Process the next block and return its number
    pub async fn tick(&self) -> anyhow::Result<BlockNumber> {
        let mut next = self.next_block.lock().await;
        let block = *next;

        let report = self.validators.process_block(block).await?;
        *next = block + 1;

        tracing::debug!(
            "Block {}: paid {} to {} validators",
            block,
            report.total_paid,
            report.payouts.len()
        );

        if self.config.snapshot_interval > 0 && block % self.config.snapshot_interval == 0 {
            self.persist(Some(block)).await?;
        }

        Ok(block)
    }

    /// Write the current registry to the snapshot file
    pub async fn persist(&self, last_block: Option<BlockNumber>) -> anyhow::Result<()> {
        let state = PersistedState {
            last_block,
            registry: self.validators.snapshot().await,
        };
        state.save(self.config.snapshot_path())?;
        tracing::debug!("Snapshot written at block {:?}", last_block);
        Ok(())
    }

    /// Produce blocks until `max_blocks` have been processed or ctrl-c
    pub async fn run(&self, max_blocks: Option<u64>) -> anyhow::Result<()> {
        tracing::info!(
            "Starting block ticker: {}ms per block, {} blocks per epoch",
            self.config.block_time_ms,
            self.config.blocks_per_epoch
        );

        let mut ticker = interval(Duration::from_millis(self.config.block_time_ms.max(1)));
        let mut processed = 0u64;
        let shutdown = tokio::signal::ctrl_c();
        tokio::pin!(shutdown);

        loop {
            if max_blocks.is_some_and(|max| processed >= max) {
                break;
            }

            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.tick().await {
                        tracing::error!("Block production halted: {}", e);
                        self.stop().await?;
                        return Err(e);
                    }
                    processed += 1;
                }
                _ = &mut shutdown => {
                    tracing::info!("Received shutdown signal");
                    break;
                }
            }
        }

        self.stop().await
    }

    pub async fn stop(&self) -> anyhow::Result<()> {
        let last_block = (*self.next_block.lock().await).checked_sub(1).filter(|b| *b > 0);
        self.persist(last_block).await?;
        tracing::info!(
            "Node stopped after block {:?}, {} rewards emitted",
            last_block,
            self.ledger.total_rewards()
        );
        Ok(())
    }
}
