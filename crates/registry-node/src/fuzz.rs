// registry-node/src/fuzz.rs
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use stake_primitives::{Identity, StakeAmount};
use stake_registry::{RegistryError, RegistryResult, StakeOperation, StakeRegistry};

/// Summary of a random workload
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FuzzReport {
    pub seed: u64,
    pub steps: usize,
    pub applied: usize,
    pub rejected: usize,
    pub events: usize,
    pub top: usize,
    pub queue: usize,
}

pub struct Fuzzer {
    rng: StdRng,
    registry: StakeRegistry,
    owners: u64,
    manager: Identity,
}

impl Fuzzer {
    pub fn new(seed: u64, top_capacity: usize, owners: u64) -> RegistryResult<Self> {
        Ok(Self {
            rng: StdRng::seed_from_u64(seed),
            registry: StakeRegistry::new(top_capacity)?,
            owners: owners.max(1),
            manager: Identity::derive(b"fuzz-manager"),
        })
    }

    pub fn registry(&self) -> &StakeRegistry {
        &self.registry
    }

    fn random_owner(&mut self) -> Identity {
        Identity::from_low_u64(self.rng.gen_range(1..=self.owners))
    }

    fn random_amount(&mut self) -> StakeAmount {
        StakeAmount::from_u64(self.rng.gen_range(0..1_000))
    }

    fn random_operation(&mut self) -> StakeOperation {
        match self.rng.gen_range(0..12) {
            0..=3 => StakeOperation::Create {
                owner: self.random_owner(),
                manager: self.manager,
                amount: self.random_amount(),
                always_top: self.rng.gen_bool(0.05),
            },
            4..=6 => StakeOperation::Increase {
                owner: self.random_owner(),
                delta: self.random_amount(),
            },
            7..=9 => StakeOperation::Decrease {
                owner: self.random_owner(),
                delta: self.random_amount(),
            },
            10 => StakeOperation::Remove {
                owner: self.random_owner(),
            },
            _ => {
                let capacity = self.rng.gen_range(1..=8);
                StakeOperation::ChangeTopCapacity { capacity }
            }
        }
    }

    /// Apply `steps` random operations, verifying every invariant after each.
    /// Every tenth step is a small batch instead of a single operation.
    pub fn run(&mut self, seed: u64, steps: usize) -> RegistryResult<FuzzReport> {
        let mut report = FuzzReport {
            seed,
            steps,
            applied: 0,
            rejected: 0,
            events: 0,
            top: 0,
            queue: 0,
        };

        for step in 0..steps {
            let result = if step % 10 == 9 {
                let ops: Vec<_> = (0..3).map(|_| self.random_operation()).collect();
                self.registry.apply_batch(&ops)
            } else {
                let op = self.random_operation();
                self.registry.apply(&op)
            };

            match result {
                Ok(events) => {
                    report.applied += 1;
                    report.events += events.len();
                }
                Err(e @ RegistryError::CapacityInvariantViolation(_)) => return Err(e),
                Err(_) => report.rejected += 1,
            }

            self.registry.check_integrity().map_err(|e| {
                tracing::error!("Invariant broken at step {}: {}", step, e);
                e
            })?;
        }

        report.top = self.registry.top().len();
        report.queue = self.registry.queue().len();
        Ok(report)
    }
}

/// Run a seeded workload against a fresh registry
pub fn run(seed: u64, steps: usize, top_capacity: usize) -> RegistryResult<FuzzReport> {
    let mut fuzzer = Fuzzer::new(seed, top_capacity, 32)?;
    let report = fuzzer.run(seed, steps)?;
    tracing::info!(
        "Fuzzed {} steps with seed {}: {} applied, {} rejected",
        report.steps,
        report.seed,
        report.applied,
        report.rejected
    );
    Ok(report)
}
