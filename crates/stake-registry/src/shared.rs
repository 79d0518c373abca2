// stake-registry/src/shared.rs

use crate::{
    registry::RegistrySnapshot, rewards::BlockReport, validator_set::ValidatorSet, RegistryResult,
};
use stake_primitives::BlockNumber;
use std::sync::Arc;
use tokio::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Cloneable handle to a validator set shared between tasks.
///
/// Writers are serialized by the lock, so every mutation sees the effects of
/// all earlier ones.
#[derive(Debug, Clone)]
pub struct SharedValidatorSet {
    inner: Arc<RwLock<ValidatorSet>>,
}

impl SharedValidatorSet {
    pub fn new(set: ValidatorSet) -> Self {
        Self {
            inner: Arc::new(RwLock::new(set)),
        }
    }

    pub async fn read(&self) -> RwLockReadGuard<'_, ValidatorSet> {
        self.inner.read().await
    }

    pub async fn write(&self) -> RwLockWriteGuard<'_, ValidatorSet> {
        self.inner.write().await
    }

    /// Run `f` under the read lock
    pub async fn with<R>(&self, f: impl FnOnce(&ValidatorSet) -> R) -> R {
        let guard = self.inner.read().await;
        f(&guard)
    }

    /// Run `f` under the write lock
    pub async fn with_mut<R>(&self, f: impl FnOnce(&mut ValidatorSet) -> R) -> R {
        let mut guard = self.inner.write().await;
        f(&mut guard)
    }

    pub async fn snapshot(&self) -> RegistrySnapshot {
        self.inner.read().await.snapshot()
    }

    pub async fn process_block(&self, block: BlockNumber) -> RegistryResult<BlockReport> {
        self.inner.write().await.process_block(block)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::RegistryConfig, manager::LedgerManager};
    use stake_primitives::{Identity, StakeAmount};

    fn shared() -> (SharedValidatorSet, Identity) {
        let manager = Identity::from_low_u64(100);
        let mut set = ValidatorSet::new(RegistryConfig::with_capacity(3)).unwrap();
        set.register_manager(manager, Box::new(LedgerManager::new())).unwrap();
        (SharedValidatorSet::new(set), manager)
    }

    #[tokio::test]
    async fn test_concurrent_writers_are_serialized() {
        let (shared, manager) = shared();

        let mut handles = Vec::new();
        for n in 1..=20u64 {
            let shared = shared.clone();
            handles.push(tokio::spawn(async move {
                shared
                    .with_mut(|set| {
                        set.create_stake(
                            &manager,
                            Identity::from_low_u64(n),
                            StakeAmount::from_u64(n * 10),
                            false,
                        )
                    })
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let snapshot = shared.snapshot().await;
        assert_eq!(snapshot.top.len(), 3);
        assert_eq!(snapshot.queue.len(), 17);

        let mut top: Vec<_> = snapshot.top.iter().map(|r| r.owner).collect();
        top.sort();
        assert_eq!(
            top,
            vec![
                Identity::from_low_u64(18),
                Identity::from_low_u64(19),
                Identity::from_low_u64(20)
            ]
        );

        shared
            .with(|set| set.registry().check_integrity())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_process_block_through_handle() {
        let (shared, manager) = shared();
        shared
            .with_mut(|set| set.create_stake(&manager, Identity::from_low_u64(1), StakeAmount::from_u64(5), false))
            .await
            .unwrap();

        let report = shared.process_block(1).await.unwrap();
        assert_eq!(report.payouts.len(), 1);
        assert_eq!(shared.read().await.last_block(), Some(1));
    }
}
