// registry-node/src/script.rs
use crate::identity_from_label;
use serde::{Deserialize, Serialize};
use stake_primitives::{BlockNumber, Identity, StakeAmount};
use stake_registry::{
    BlockReport, LedgerManager, RegistryConfig, RegistryEvent, RegistryResult, RegistrySnapshot,
    ValidatorSet,
};
use std::collections::BTreeMap;
use std::path::Path;

fn default_manager() -> String {
    "script-manager".into()
}

/// A JSON workload replayed against a fresh validator set
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Script {
    #[serde(default)]
    pub registry: RegistryConfig,
    /// Manager used by steps that don't name one
    #[serde(default = "default_manager")]
    pub manager: String,
    pub steps: Vec<ScriptStep>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ScriptStep {
    Create {
        owner: String,
        amount: StakeAmount,
        #[serde(default)]
        always_top: bool,
        #[serde(default)]
        manager: Option<String>,
    },
    Increase {
        owner: String,
        amount: StakeAmount,
    },
    Decrease {
        owner: String,
        amount: StakeAmount,
    },
    Remove {
        owner: String,
    },
    SetCapacity {
        capacity: usize,
    },
    SetBaseReward {
        amount: StakeAmount,
    },
    Report {
        owner: String,
    },
    Blocks {
        count: u64,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct StepOutcome {
    pub step: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub events: Vec<RegistryEvent>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub blocks: Vec<BlockReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScriptOutcome {
    pub steps: Vec<StepOutcome>,
    pub registry: RegistrySnapshot,
    pub rewards: BTreeMap<Identity, StakeAmount>,
}

impl ScriptOutcome {
    /// Steps that were rejected
    pub fn failures(&self) -> impl Iterator<Item = &StepOutcome> {
        self.steps.iter().filter(|step| step.error.is_some())
    }
}

impl Script {
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    /// Replay every step. A rejected step is recorded and leaves the registry
    /// as it was; the remaining steps still run.
    pub fn run(&self) -> anyhow::Result<ScriptOutcome> {
        let mut runner = Runner::new(self)?;
        let mut steps = Vec::with_capacity(self.steps.len());

        for (index, step) in self.steps.iter().enumerate() {
            let mut outcome = StepOutcome {
                step: index,
                events: Vec::new(),
                blocks: Vec::new(),
                error: None,
            };

            match runner.apply(step, &mut outcome) {
                Ok(()) => {}
                Err(e) => {
                    tracing::warn!("Step {} rejected: {}", index, e);
                    outcome.error = Some(e.to_string());
                }
            }
            steps.push(outcome);
        }

        runner.set.registry().check_integrity()?;

        Ok(ScriptOutcome {
            steps,
            registry: runner.set.snapshot(),
            rewards: runner.ledger.rewards(),
        })
    }
}

struct Runner {
    set: ValidatorSet,
    ledger: LedgerManager,
    default_manager: Identity,
    next_block: BlockNumber,
}

impl Runner {
    fn new(script: &Script) -> anyhow::Result<Self> {
        let set = ValidatorSet::new(script.registry.clone())?;
        let mut runner = Self {
            set,
            ledger: LedgerManager::new(),
            default_manager: identity_from_label(&script.manager)?,
            next_block: 1,
        };
        runner.ensure_manager(runner.default_manager)?;
        Ok(runner)
    }

    /// Register `manager` unless it is known; true if it was added
    fn ensure_manager(&mut self, manager: Identity) -> RegistryResult<bool> {
        if self.set.managers().contains(&manager) {
            return Ok(false);
        }
        self.set
            .register_manager(manager, Box::new(self.ledger.clone()))?;
        Ok(true)
    }

    /// Manager that owns `owner`, or the default one for unknown stakes
    fn manager_of(&self, owner: &Identity) -> Identity {
        self.set
            .registry()
            .record(owner)
            .map(|record| record.manager)
            .unwrap_or(self.default_manager)
    }

    fn apply(&mut self, step: &ScriptStep, outcome: &mut StepOutcome) -> anyhow::Result<()> {
        match step {
            ScriptStep::Create {
                owner,
                amount,
                always_top,
                manager,
            } => {
                let manager = match manager {
                    Some(label) => identity_from_label(label)?,
                    None => self.default_manager,
                };
                let owner = identity_from_label(owner)?;
                let added = self.ensure_manager(manager)?;
                match self
                    .set
                    .create_stake(&manager, owner, amount.clone(), *always_top)
                {
                    Ok(events) => outcome.events = events,
                    Err(e) => {
                        if added {
                            self.set.unregister_manager(&manager)?;
                        }
                        return Err(e.into());
                    }
                }
            }
            ScriptStep::Increase { owner, amount } => {
                let owner = identity_from_label(owner)?;
                let manager = self.manager_of(&owner);
                outcome.events = self.set.increase_stake(&manager, &owner, amount)?;
            }
            ScriptStep::Decrease { owner, amount } => {
                let owner = identity_from_label(owner)?;
                let manager = self.manager_of(&owner);
                outcome.events = self.set.decrease_stake(&manager, &owner, amount)?;
            }
            ScriptStep::Remove { owner } => {
                let owner = identity_from_label(owner)?;
                let manager = self.manager_of(&owner);
                outcome.events = self.set.remove_stake(&manager, &owner)?;
            }
            ScriptStep::SetCapacity { capacity } => {
                outcome.events = self.set.change_top_capacity(*capacity)?;
            }
            ScriptStep::SetBaseReward { amount } => {
                self.set.set_base_reward(amount.clone());
            }
            ScriptStep::Report { owner } => {
                let owner = identity_from_label(owner)?;
                self.set.report(&owner)?;
            }
            ScriptStep::Blocks { count } => {
                for _ in 0..*count {
                    outcome.blocks.push(self.set.process_block(self.next_block)?);
                    self.next_block += 1;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn script(json: &str) -> Script {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_steps_parse() {
        let script = script(
            r#"{
                "registry": { "top_capacity": 2 },
                "steps": [
                    { "action": "create", "owner": "a", "amount": 100 },
                    { "action": "create", "owner": "p", "amount": "0", "always_top": true },
                    { "action": "set_capacity", "capacity": 3 },
                    { "action": "blocks", "count": 2 }
                ]
            }"#,
        );

        assert_eq!(script.registry.top_capacity, 2);
        assert_eq!(script.manager, "script-manager");
        assert_eq!(script.steps.len(), 4);
        assert!(matches!(
            script.steps[1],
            ScriptStep::Create { always_top: true, .. }
        ));
    }

    #[test]
    fn test_rejected_step_is_recorded() {
        let outcome = script(
            r#"{
                "registry": { "top_capacity": 1 },
                "steps": [
                    { "action": "create", "owner": "a", "amount": 10 },
                    { "action": "decrease", "owner": "a", "amount": 11 },
                    { "action": "create", "owner": "b", "amount": 20, "manager": "other" },
                    { "action": "remove", "owner": "a" }
                ]
            }"#,
        )
        .run()
        .unwrap();

        assert_eq!(outcome.failures().count(), 1);
        let failure = &outcome.steps[1];
        assert!(failure.error.as_deref().unwrap().contains("Insufficient stake"));

        // b was created by "other"; removing a refills nothing
        assert_eq!(outcome.registry.top.len(), 1);
        assert_eq!(outcome.registry.top[0].owner, Identity::derive(b"b"));
        assert!(outcome.registry.queue.is_empty());
    }

    #[test]
    fn test_rejected_create_drops_new_manager() {
        let script = script(
            r#"{
                "registry": { "top_capacity": 1 },
                "steps": []
            }"#,
        );
        let mut runner = Runner::new(&script).unwrap();
        let step = ScriptStep::Create {
            owner: "a".into(),
            amount: StakeAmount::zero(),
            always_top: false,
            manager: Some("other".into()),
        };
        let mut outcome = StepOutcome {
            step: 0,
            events: Vec::new(),
            blocks: Vec::new(),
            error: None,
        };

        assert!(runner.apply(&step, &mut outcome).is_err());
        assert_eq!(runner.set.managers(), vec![runner.default_manager]);
        assert_eq!(runner.set.registry().len(), 0);
    }
}
