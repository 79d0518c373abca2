// stake-registry/src/registry.rs

use crate::{
    events::RegistryEvent,
    record::{StakeRecord, StakeSet},
    RegistryError, RegistryResult,
};
use serde::{Deserialize, Serialize};
use stake_primitives::{Identity, StakeAmount};
use std::cmp::Ordering;
use std::collections::HashMap;

/// A record plus its current position
#[derive(Debug, Clone)]
struct Entry {
    record: StakeRecord,
    set: StakeSet,
    index: usize,
}

/// A single registry mutation, as replayed by batches and scripts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum StakeOperation {
    Create {
        owner: Identity,
        manager: Identity,
        amount: StakeAmount,
        #[serde(default)]
        always_top: bool,
    },
    Increase {
        owner: Identity,
        delta: StakeAmount,
    },
    Decrease {
        owner: Identity,
        delta: StakeAmount,
    },
    Remove {
        owner: Identity,
    },
    ChangeTopCapacity {
        capacity: usize,
    },
}

/// Point-in-time copy of the registry, in array order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrySnapshot {
    pub top_capacity: usize,
    pub top: Vec<StakeRecord>,
    pub queue: Vec<StakeRecord>,
    pub lowest_top_index: Option<usize>,
    pub highest_queue_index: Option<usize>,
}

/// Two-tier stake registry.
///
/// `top` holds at most `top_capacity` records and every evictable top record
/// ranks at least as high as every queued record. `lowest_top` caches the
/// evictable minimum of `top`, `highest_queue` the maximum of `queue`; both
/// are kept current incrementally and only rescanned when the array that
/// held the extremum loses it.
#[derive(Debug, Clone)]
pub struct StakeRegistry {
    records: HashMap<Identity, Entry>,
    top: Vec<Identity>,
    queue: Vec<Identity>,
    top_capacity: usize,
    lowest_top: Option<usize>,
    highest_queue: Option<usize>,
}

impl StakeRegistry {
    /// Create an empty registry
    pub fn new(top_capacity: usize) -> RegistryResult<Self> {
        if top_capacity == 0 {
            return Err(RegistryError::InvalidCapacity(
                "top capacity must be at least 1".into(),
            ));
        }

        Ok(Self {
            records: HashMap::new(),
            top: Vec::new(),
            queue: Vec::new(),
            top_capacity,
            lowest_top: None,
            highest_queue: None,
        })
    }

    /// Rebuild a registry from a snapshot, re-deriving the extremum indices
    pub fn from_snapshot(snapshot: RegistrySnapshot) -> RegistryResult<Self> {
        let mut registry = Self::new(snapshot.top_capacity)?;

        for (set, records) in [(StakeSet::Top, snapshot.top), (StakeSet::Queue, snapshot.queue)] {
            for record in records {
                if registry.records.contains_key(&record.owner) {
                    return Err(RegistryError::AlreadyExists(record.owner));
                }
                registry.insert(record, set);
            }
        }

        registry.check_integrity()?;
        Ok(registry)
    }

    // ----- mutations -------------------------------------------------------

    /// Register a new stake.
    ///
    /// Goes straight to top while there is room. On a full top set the new
    /// record replaces the evictable minimum if it outranks it, otherwise it
    /// joins the queue.
    pub fn create_stake(
        &mut self,
        owner: Identity,
        manager: Identity,
        amount: StakeAmount,
        is_always_top: bool,
    ) -> RegistryResult<Vec<RegistryEvent>> {
        if self.records.contains_key(&owner) {
            return Err(RegistryError::AlreadyExists(owner));
        }
        if amount.is_zero() && !is_always_top {
            return Err(RegistryError::InvalidAmount(format!(
                "stake for {} must be non-zero",
                owner
            )));
        }

        let record = StakeRecord::new(owner, manager, amount, is_always_top);
        let mut events = Vec::new();

        if self.top.len() < self.top_capacity {
            self.insert(record, StakeSet::Top);
            events.push(RegistryEvent::AddedToTop { owner });
        } else {
            let lowest = self.lowest_top;
            match lowest {
                Some(lowest) if record.outranks(self.record_at(StakeSet::Top, lowest)) => {
                    // The new record takes the evicted record's slot
                    self.records.insert(
                        owner,
                        Entry {
                            record,
                            set: StakeSet::Top,
                            index: lowest,
                        },
                    );
                    let evicted = self.replace(StakeSet::Top, lowest, owner);
                    self.attach(StakeSet::Queue, evicted);

                    tracing::debug!(
                        "Stake {} entered top, evicting {}",
                        owner.short(),
                        evicted.short()
                    );

                    events.push(RegistryEvent::AddedToTop { owner });
                    events.push(RegistryEvent::RemovedFromTop { owner: evicted });
                    events.push(RegistryEvent::AddedToQueue { owner: evicted });
                }
                _ => {
                    self.insert(record, StakeSet::Queue);
                    events.push(RegistryEvent::AddedToQueue { owner });
                }
            }
        }

        Ok(events)
    }

    /// Add `delta` to an existing stake, promoting it if it now outranks the
    /// lowest top record
    pub fn increase_stake(
        &mut self,
        owner: &Identity,
        delta: &StakeAmount,
    ) -> RegistryResult<Vec<RegistryEvent>> {
        let entry = self
            .records
            .get_mut(owner)
            .ok_or(RegistryError::NotFound(*owner))?;
        if delta.is_zero() {
            return Err(RegistryError::InvalidAmount("increase must be non-zero".into()));
        }

        entry.record.amount = entry.record.amount.clone() + delta.clone();
        let (set, index) = (entry.set, entry.index);

        match set {
            // A growing record can only stop being the minimum
            StakeSet::Top => {
                if self.lowest_top == Some(index) {
                    self.rescan(StakeSet::Top);
                }
            }
            StakeSet::Queue => self.consider(StakeSet::Queue, index),
        }

        Ok(self.rebalance())
    }

    /// Subtract `delta` from a stake. A non-always-top stake that reaches zero
    /// is removed.
    pub fn decrease_stake(
        &mut self,
        owner: &Identity,
        delta: &StakeAmount,
    ) -> RegistryResult<Vec<RegistryEvent>> {
        let entry = self
            .records
            .get(owner)
            .ok_or(RegistryError::NotFound(*owner))?;
        if delta.is_zero() {
            return Err(RegistryError::InvalidAmount("decrease must be non-zero".into()));
        }

        let remaining = entry.record.amount.checked_sub(delta).ok_or_else(|| {
            RegistryError::InsufficientStake {
                owner: *owner,
                requested: delta.clone(),
                available: entry.record.amount.clone(),
            }
        })?;

        if remaining.is_zero() && entry.record.is_evictable() {
            return self.remove_stake(owner);
        }

        let (set, index) = (entry.set, entry.index);
        if let Some(entry) = self.records.get_mut(owner) {
            entry.record.amount = remaining;
        }

        match set {
            StakeSet::Top => self.consider(StakeSet::Top, index),
            // A shrinking record can only stop being the maximum
            StakeSet::Queue => {
                if self.highest_queue == Some(index) {
                    self.rescan(StakeSet::Queue);
                }
            }
        }

        Ok(self.rebalance())
    }

    /// Delete a stake. A freed top slot is refilled from the queue.
    pub fn remove_stake(&mut self, owner: &Identity) -> RegistryResult<Vec<RegistryEvent>> {
        let (set, index) = self
            .records
            .get(owner)
            .map(|entry| (entry.set, entry.index))
            .ok_or(RegistryError::NotFound(*owner))?;

        self.detach(set, index);
        self.records.remove(owner);

        let mut events = vec![match set {
            StakeSet::Top => RegistryEvent::RemovedFromTop { owner: *owner },
            StakeSet::Queue => RegistryEvent::RemovedFromQueue { owner: *owner },
        }];

        if set == StakeSet::Top {
            events.extend(self.fill_top());
        }

        tracing::debug!("Stake {} removed from {:?}", owner.short(), set);
        Ok(events)
    }

    /// Resize the top set, promoting or demoting as many records as needed
    pub fn change_top_capacity(&mut self, new_capacity: usize) -> RegistryResult<Vec<RegistryEvent>> {
        if new_capacity == 0 {
            return Err(RegistryError::InvalidCapacity(
                "top capacity must be at least 1".into(),
            ));
        }

        let pinned = self
            .top
            .iter()
            .filter(|owner| !self.record_of(owner).is_evictable())
            .count();
        if new_capacity < pinned {
            return Err(RegistryError::InvalidCapacity(format!(
                "{} always-top records do not fit in {} slots",
                pinned, new_capacity
            )));
        }

        let old = self.top_capacity;
        self.top_capacity = new_capacity;

        let mut events = self.fill_top();

        while self.top.len() > self.top_capacity {
            let Some(lowest) = self.lowest_top else {
                return Err(RegistryError::CapacityInvariantViolation(
                    "no evictable record left while shrinking top".into(),
                ));
            };
            let demoted = self.detach(StakeSet::Top, lowest);
            self.attach(StakeSet::Queue, demoted);

            events.push(RegistryEvent::RemovedFromTop { owner: demoted });
            events.push(RegistryEvent::AddedToQueue { owner: demoted });
        }

        events.push(RegistryEvent::TopCapacityChanged {
            old,
            new: new_capacity,
        });

        tracing::info!(
            "Top capacity changed from {} to {} ({} top, {} queued)",
            old,
            new_capacity,
            self.top.len(),
            self.queue.len()
        );

        Ok(events)
    }

    /// Apply one operation
    pub fn apply(&mut self, op: &StakeOperation) -> RegistryResult<Vec<RegistryEvent>> {
        match op {
            StakeOperation::Create {
                owner,
                manager,
                amount,
                always_top,
            } => self.create_stake(*owner, *manager, amount.clone(), *always_top),
            StakeOperation::Increase { owner, delta } => self.increase_stake(owner, delta),
            StakeOperation::Decrease { owner, delta } => self.decrease_stake(owner, delta),
            StakeOperation::Remove { owner } => self.remove_stake(owner),
            StakeOperation::ChangeTopCapacity { capacity } => self.change_top_capacity(*capacity),
        }
    }

    /// Apply a sequence of operations on a staged copy and commit only if all
    /// of them succeed
    pub fn apply_batch(&mut self, ops: &[StakeOperation]) -> RegistryResult<Vec<RegistryEvent>> {
        let mut staged = self.clone();
        let mut events = Vec::new();

        for op in ops {
            events.extend(staged.apply(op)?);
        }

        *self = staged;
        Ok(events)
    }

    // ----- queries ---------------------------------------------------------

    pub fn top_capacity(&self) -> usize {
        self.top_capacity
    }

    /// Top set owners in array order
    pub fn top(&self) -> &[Identity] {
        &self.top
    }

    /// Queued owners in array order
    pub fn queue(&self) -> &[Identity] {
        &self.queue
    }

    pub fn record(&self, owner: &Identity) -> Option<&StakeRecord> {
        self.records.get(owner).map(|entry| &entry.record)
    }

    /// Which array holds `owner`, and where
    pub fn position(&self, owner: &Identity) -> Option<(StakeSet, usize)> {
        self.records.get(owner).map(|entry| (entry.set, entry.index))
    }

    pub fn contains(&self, owner: &Identity) -> bool {
        self.records.contains_key(owner)
    }

    pub fn is_top(&self, owner: &Identity) -> bool {
        matches!(self.position(owner), Some((StakeSet::Top, _)))
    }

    pub fn top_records(&self) -> Vec<&StakeRecord> {
        self.top.iter().map(|owner| self.record_of(owner)).collect()
    }

    pub fn queue_records(&self) -> Vec<&StakeRecord> {
        self.queue.iter().map(|owner| self.record_of(owner)).collect()
    }

    /// Stakes created by `manager`, top set first, each part in array order
    pub fn records_by_manager(&self, manager: &Identity) -> Vec<&StakeRecord> {
        self.top
            .iter()
            .chain(self.queue.iter())
            .map(|owner| self.record_of(owner))
            .filter(|record| record.manager == *manager)
            .collect()
    }

    pub fn count_by_manager(&self, manager: &Identity) -> usize {
        self.records
            .values()
            .filter(|entry| entry.record.manager == *manager)
            .count()
    }

    pub fn lowest_top_index(&self) -> Option<usize> {
        self.lowest_top
    }

    pub fn highest_queue_index(&self) -> Option<usize> {
        self.highest_queue
    }

    /// Next record to be evicted from top
    pub fn lowest_top_owner(&self) -> Option<Identity> {
        self.lowest_top.map(|index| self.top[index])
    }

    /// Next record to be promoted from the queue
    pub fn highest_queue_owner(&self) -> Option<Identity> {
        self.highest_queue.map(|index| self.queue[index])
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Total stake across both sets
    pub fn total_stake(&self) -> StakeAmount {
        self.records.values().map(|entry| entry.record.amount.clone()).sum()
    }

    /// Total stake of the top set
    pub fn top_stake(&self) -> StakeAmount {
        self.top
            .iter()
            .map(|owner| self.record_of(owner).amount.clone())
            .sum()
    }

    pub fn snapshot(&self) -> RegistrySnapshot {
        RegistrySnapshot {
            top_capacity: self.top_capacity,
            top: self.top_records().into_iter().cloned().collect(),
            queue: self.queue_records().into_iter().cloned().collect(),
            lowest_top_index: self.lowest_top,
            highest_queue_index: self.highest_queue,
        }
    }

    /// Re-derive every membership invariant by linear scan
    pub fn check_integrity(&self) -> RegistryResult<()> {
        if self.top.len() > self.top_capacity {
            return Err(violation(format!(
                "top holds {} records, capacity is {}",
                self.top.len(),
                self.top_capacity
            )));
        }
        if !self.queue.is_empty() && self.top.len() < self.top_capacity {
            return Err(violation(format!(
                "{} records queued while top has {} free slots",
                self.queue.len(),
                self.top_capacity - self.top.len()
            )));
        }
        if self.records.len() != self.top.len() + self.queue.len() {
            return Err(violation(format!(
                "{} records but {} array slots",
                self.records.len(),
                self.top.len() + self.queue.len()
            )));
        }

        for set in [StakeSet::Top, StakeSet::Queue] {
            for (index, owner) in self.array(set).iter().enumerate() {
                let entry = self
                    .records
                    .get(owner)
                    .ok_or_else(|| violation(format!("{} in {:?} has no record", owner, set)))?;

                if entry.set != set || entry.index != index {
                    return Err(violation(format!(
                        "{} found at {:?}[{}] but recorded at {:?}[{}]",
                        owner, set, index, entry.set, entry.index
                    )));
                }
                if entry.record.owner != *owner {
                    return Err(violation(format!("record keyed {} names {}", owner, entry.record.owner)));
                }
                if entry.record.amount.is_zero() && entry.record.is_evictable() {
                    return Err(violation(format!("{} holds a zero stake", owner)));
                }
            }
        }

        let lowest = self.scan_lowest_top();
        if self.lowest_top != lowest {
            return Err(violation(format!(
                "lowest top index is {:?}, scan found {:?}",
                self.lowest_top, lowest
            )));
        }
        let highest = self.scan_highest_queue();
        if self.highest_queue != highest {
            return Err(violation(format!(
                "highest queue index is {:?}, scan found {:?}",
                self.highest_queue, highest
            )));
        }

        if let (Some(low), Some(high)) = (lowest, highest) {
            let low = self.record_at(StakeSet::Top, low);
            let high = self.record_at(StakeSet::Queue, high);
            if high.outranks(low) {
                return Err(violation(format!(
                    "queued {} outranks top {}",
                    high.owner, low.owner
                )));
            }
        }

        Ok(())
    }

    // ----- array bookkeeping ----------------------------------------------

    fn array(&self, set: StakeSet) -> &Vec<Identity> {
        match set {
            StakeSet::Top => &self.top,
            StakeSet::Queue => &self.queue,
        }
    }

    fn array_mut(&mut self, set: StakeSet) -> &mut Vec<Identity> {
        match set {
            StakeSet::Top => &mut self.top,
            StakeSet::Queue => &mut self.queue,
        }
    }

    fn extremum(&self, set: StakeSet) -> Option<usize> {
        match set {
            StakeSet::Top => self.lowest_top,
            StakeSet::Queue => self.highest_queue,
        }
    }

    fn set_extremum(&mut self, set: StakeSet, index: Option<usize>) {
        match set {
            StakeSet::Top => self.lowest_top = index,
            StakeSet::Queue => self.highest_queue = index,
        }
    }

    // Arrays only ever hold owners present in `records`
    fn record_of(&self, owner: &Identity) -> &StakeRecord {
        &self.records[owner].record
    }

    fn record_at(&self, set: StakeSet, index: usize) -> &StakeRecord {
        self.record_of(&self.array(set)[index])
    }

    fn insert(&mut self, record: StakeRecord, set: StakeSet) {
        let owner = record.owner;
        self.records.insert(
            owner,
            Entry {
                record,
                set,
                index: 0,
            },
        );
        self.attach(set, owner);
    }

    /// Append `owner` to `set` and update that set's extremum in O(1)
    fn attach(&mut self, set: StakeSet, owner: Identity) {
        let array = self.array_mut(set);
        array.push(owner);
        let index = array.len() - 1;

        if let Some(entry) = self.records.get_mut(&owner) {
            entry.set = set;
            entry.index = index;
        }

        self.consider(set, index);
    }

    /// Swap-remove `set[index]`; the last element takes the freed slot
    fn detach(&mut self, set: StakeSet, index: usize) -> Identity {
        let array = self.array_mut(set);
        let last = array.len() - 1;
        let removed = array.swap_remove(index);
        let moved = array.get(index).copied();

        if let Some(moved) = moved {
            if let Some(entry) = self.records.get_mut(&moved) {
                entry.index = index;
            }
        }

        match self.extremum(set) {
            Some(current) if current == index => self.rescan(set),
            Some(current) if current == last => self.set_extremum(set, Some(index)),
            _ => {}
        }

        removed
    }

    /// Put `owner` in `set[index]`, returning the previous occupant
    fn replace(&mut self, set: StakeSet, index: usize, owner: Identity) -> Identity {
        let previous = std::mem::replace(&mut self.array_mut(set)[index], owner);

        if let Some(entry) = self.records.get_mut(&owner) {
            entry.set = set;
            entry.index = index;
        }

        if self.extremum(set) == Some(index) {
            self.rescan(set);
        } else {
            self.consider(set, index);
        }

        previous
    }

    /// Promote queue maxima while top has free slots
    fn fill_top(&mut self) -> Vec<RegistryEvent> {
        let mut events = Vec::new();

        while self.top.len() < self.top_capacity {
            let Some(highest) = self.highest_queue else {
                break;
            };
            let promoted = self.detach(StakeSet::Queue, highest);
            self.attach(StakeSet::Top, promoted);

            events.push(RegistryEvent::RemovedFromQueue { owner: promoted });
            events.push(RegistryEvent::AddedToTop { owner: promoted });
        }

        events
    }

    /// Swap the lowest top record and the highest queued record for as long
    /// as the latter outranks the former
    fn rebalance(&mut self) -> Vec<RegistryEvent> {
        let mut events = Vec::new();

        while let (Some(low), Some(high)) = (self.lowest_top, self.highest_queue) {
            let due = self.top.len() == self.top_capacity
                && self
                    .record_at(StakeSet::Queue, high)
                    .outranks(self.record_at(StakeSet::Top, low));
            if !due {
                break;
            }
            events.extend(self.exchange(low, high));
        }

        events
    }

    /// Demote `top[top_index]` into the slot of `queue[queue_index]` and
    /// append the queued record to top
    fn exchange(&mut self, top_index: usize, queue_index: usize) -> Vec<RegistryEvent> {
        let promoted = self.queue[queue_index];
        let demoted = self.detach(StakeSet::Top, top_index);
        self.replace(StakeSet::Queue, queue_index, demoted);
        self.attach(StakeSet::Top, promoted);

        tracing::debug!(
            "Stake {} promoted to top, {} demoted to queue",
            promoted.short(),
            demoted.short()
        );

        vec![
            RegistryEvent::RemovedFromQueue { owner: promoted },
            RegistryEvent::AddedToTop { owner: promoted },
            RegistryEvent::RemovedFromTop { owner: demoted },
            RegistryEvent::AddedToQueue { owner: demoted },
        ]
    }

    /// O(1) extremum update after `set[index]` was added or changed in the
    /// direction that can only make it a better extremum
    fn consider(&mut self, set: StakeSet, index: usize) {
        let candidate = self.record_at(set, index);

        let better = match set {
            StakeSet::Top => {
                candidate.is_evictable()
                    && self.lowest_top.map_or(true, |current| {
                        candidate.rank_cmp(self.record_at(StakeSet::Top, current)) == Ordering::Less
                    })
            }
            StakeSet::Queue => self.highest_queue.map_or(true, |current| {
                candidate.rank_cmp(self.record_at(StakeSet::Queue, current)) == Ordering::Greater
            }),
        };

        if better {
            self.set_extremum(set, Some(index));
        }
    }

    fn rescan(&mut self, set: StakeSet) {
        let found = match set {
            StakeSet::Top => self.scan_lowest_top(),
            StakeSet::Queue => self.scan_highest_queue(),
        };
        self.set_extremum(set, found);
    }

    fn scan_lowest_top(&self) -> Option<usize> {
        self.top
            .iter()
            .map(|owner| self.record_of(owner))
            .enumerate()
            .filter(|(_, record)| record.is_evictable())
            .min_by(|(_, a), (_, b)| a.rank_cmp(b))
            .map(|(index, _)| index)
    }

    fn scan_highest_queue(&self) -> Option<usize> {
        self.queue
            .iter()
            .map(|owner| self.record_of(owner))
            .enumerate()
            .max_by(|(_, a), (_, b)| a.rank_cmp(b))
            .map(|(index, _)| index)
    }
}

fn violation(reason: String) -> RegistryError {
    RegistryError::CapacityInvariantViolation(reason)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(n: u64) -> Identity {
        Identity::from_low_u64(n)
    }

    fn amt(n: u64) -> StakeAmount {
        StakeAmount::from_u64(n)
    }

    const MANAGER: u64 = 1000;

    fn create(registry: &mut StakeRegistry, owner: u64, amount: u64) -> Vec<RegistryEvent> {
        let events = registry
            .create_stake(id(owner), id(MANAGER), amt(amount), false)
            .unwrap();
        registry.check_integrity().unwrap();
        events
    }

    /// top=[C=300,D=400], queue=[A=100,B=200]
    fn four_stakes() -> (StakeRegistry, [Identity; 4]) {
        let (a, b, c, d) = (1, 2, 3, 4);
        let mut registry = StakeRegistry::new(2).unwrap();
        create(&mut registry, c, 300);
        create(&mut registry, d, 400);
        create(&mut registry, a, 100);
        create(&mut registry, b, 200);

        assert_eq!(registry.top(), &[id(c), id(d)]);
        assert_eq!(registry.queue(), &[id(a), id(b)]);
        (registry, [id(a), id(b), id(c), id(d)])
    }

    #[test]
    fn test_fill_then_queue() {
        let mut registry = StakeRegistry::new(2).unwrap();

        create(&mut registry, 1, 100);
        assert_eq!(registry.top(), &[id(1)]);

        create(&mut registry, 2, 50);
        assert_eq!(registry.top(), &[id(1), id(2)]);

        let events = create(&mut registry, 3, 10);
        assert_eq!(registry.top(), &[id(1), id(2)]);
        assert_eq!(registry.queue(), &[id(3)]);
        assert_eq!(events, vec![RegistryEvent::AddedToQueue { owner: id(3) }]);
        assert_eq!(registry.lowest_top_index(), Some(1));
        assert_eq!(registry.highest_queue_index(), Some(0));
    }

    #[test]
    fn test_create_evicts_lowest_top() {
        let mut registry = StakeRegistry::new(2).unwrap();
        create(&mut registry, 1, 100);
        create(&mut registry, 2, 50);
        create(&mut registry, 3, 10);

        let events = create(&mut registry, 4, 500);

        assert_eq!(registry.top(), &[id(1), id(4)]);
        assert_eq!(registry.queue(), &[id(3), id(2)]);
        assert_eq!(
            events,
            vec![
                RegistryEvent::AddedToTop { owner: id(4) },
                RegistryEvent::RemovedFromTop { owner: id(2) },
                RegistryEvent::AddedToQueue { owner: id(2) },
            ]
        );
        assert_eq!(registry.highest_queue_index(), Some(1));
    }

    #[test]
    fn test_remove_top_promotes_queue_max() {
        let (mut registry, [a, b, c, d]) = four_stakes();

        let events = registry.decrease_stake(&c, &amt(300)).unwrap();
        registry.check_integrity().unwrap();

        assert_eq!(registry.top(), &[d, b]);
        assert_eq!(registry.queue(), &[a]);
        assert!(registry.record(&c).is_none());
        assert_eq!(
            events,
            vec![
                RegistryEvent::RemovedFromTop { owner: c },
                RegistryEvent::RemovedFromQueue { owner: b },
                RegistryEvent::AddedToTop { owner: b },
            ]
        );
    }

    #[test]
    fn test_increase_swaps_with_lowest_top() {
        let (mut registry, [a, b, c, d]) = four_stakes();

        let events = registry.increase_stake(&a, &amt(250)).unwrap();
        registry.check_integrity().unwrap();

        assert_eq!(registry.top(), &[d, a]);
        assert_eq!(registry.queue(), &[c, b]);
        assert_eq!(registry.record(&a).unwrap().amount, amt(350));
        assert_eq!(
            events,
            vec![
                RegistryEvent::RemovedFromQueue { owner: a },
                RegistryEvent::AddedToTop { owner: a },
                RegistryEvent::RemovedFromTop { owner: c },
                RegistryEvent::AddedToQueue { owner: c },
            ]
        );
    }

    #[test]
    fn test_always_top_with_zero_stake_evicts() {
        let mut registry = StakeRegistry::new(2).unwrap();
        create(&mut registry, 1, 100);
        create(&mut registry, 2, 200);

        let events = registry
            .create_stake(id(9), id(MANAGER), StakeAmount::zero(), true)
            .unwrap();
        registry.check_integrity().unwrap();

        assert_eq!(registry.top(), &[id(9), id(2)]);
        assert_eq!(registry.queue(), &[id(1)]);
        assert_eq!(events[0], RegistryEvent::AddedToTop { owner: id(9) });
        assert_eq!(events[1], RegistryEvent::RemovedFromTop { owner: id(1) });
        // The pinned record is never the eviction candidate
        assert_eq!(registry.lowest_top_index(), Some(1));
    }

    #[test]
    fn test_create_takes_freed_slot() {
        let mut registry = StakeRegistry::new(2).unwrap();
        create(&mut registry, 2, 50);
        create(&mut registry, 1, 100);
        assert_eq!(registry.lowest_top_index(), Some(0));

        let events = create(&mut registry, 4, 500);

        assert_eq!(registry.top(), &[id(4), id(1)]);
        assert_eq!(registry.queue(), &[id(2)]);
        assert_eq!(registry.position(&id(4)), Some((StakeSet::Top, 0)));
        assert_eq!(registry.lowest_top_owner(), Some(id(1)));
        assert_eq!(registry.highest_queue_owner(), Some(id(2)));
        assert_eq!(
            events,
            vec![
                RegistryEvent::AddedToTop { owner: id(4) },
                RegistryEvent::RemovedFromTop { owner: id(2) },
                RegistryEvent::AddedToQueue { owner: id(2) },
            ]
        );
    }

    #[test]
    fn test_always_top_survives_zero_and_decrease() {
        let mut registry = StakeRegistry::new(1).unwrap();
        registry
            .create_stake(id(9), id(MANAGER), amt(10), true)
            .unwrap();
        create(&mut registry, 1, 1_000);

        registry.decrease_stake(&id(9), &amt(10)).unwrap();
        registry.check_integrity().unwrap();

        assert_eq!(registry.top(), &[id(9)]);
        assert_eq!(registry.queue(), &[id(1)]);
        assert!(registry.record(&id(9)).unwrap().amount.is_zero());
        assert_eq!(registry.lowest_top_index(), None);
    }

    #[test]
    fn test_always_top_waits_in_queue_when_top_is_pinned() {
        let mut registry = StakeRegistry::new(1).unwrap();
        registry.create_stake(id(8), id(MANAGER), amt(5), true).unwrap();
        registry.create_stake(id(9), id(MANAGER), amt(5), true).unwrap();
        registry.check_integrity().unwrap();
        assert_eq!(registry.queue(), &[id(9)]);

        let events = registry.change_top_capacity(2).unwrap();
        registry.check_integrity().unwrap();
        assert_eq!(registry.top(), &[id(8), id(9)]);
        assert_eq!(events[0], RegistryEvent::RemovedFromQueue { owner: id(9) });
    }

    #[test]
    fn test_decrease_demotes_below_queue_max() {
        let mut registry = StakeRegistry::new(2).unwrap();
        create(&mut registry, 1, 300);
        create(&mut registry, 2, 400);
        create(&mut registry, 3, 200);
        create(&mut registry, 4, 150);

        let events = registry.decrease_stake(&id(2), &amt(300)).unwrap();
        registry.check_integrity().unwrap();

        assert_eq!(registry.top(), &[id(1), id(3)]);
        assert_eq!(registry.queue(), &[id(2), id(4)]);
        assert_eq!(registry.highest_queue_index(), Some(1));
        assert_eq!(
            events,
            vec![
                RegistryEvent::RemovedFromQueue { owner: id(3) },
                RegistryEvent::AddedToTop { owner: id(3) },
                RegistryEvent::RemovedFromTop { owner: id(2) },
                RegistryEvent::AddedToQueue { owner: id(2) },
            ]
        );
    }

    #[test]
    fn test_decrease_in_queue_rescans_max() {
        let (mut registry, [a, b, _, _]) = four_stakes();
        assert_eq!(registry.highest_queue_index(), Some(1));

        let events = registry.decrease_stake(&b, &amt(150)).unwrap();
        registry.check_integrity().unwrap();

        assert!(events.is_empty());
        assert_eq!(registry.queue()[registry.highest_queue_index().unwrap()], a);
    }

    #[test]
    fn test_increase_top_minimum_rescans() {
        let (mut registry, [_, _, c, d]) = four_stakes();
        assert_eq!(registry.top()[registry.lowest_top_index().unwrap()], c);

        registry.increase_stake(&c, &amt(500)).unwrap();
        registry.check_integrity().unwrap();

        assert_eq!(registry.top()[registry.lowest_top_index().unwrap()], d);
    }

    #[test]
    fn test_failures_leave_state_untouched() {
        let (mut registry, [a, _, c, _]) = four_stakes();
        let before = registry.snapshot();

        assert_eq!(
            registry.create_stake(a, id(MANAGER), amt(1), false),
            Err(RegistryError::AlreadyExists(a))
        );
        assert!(matches!(
            registry.create_stake(id(77), id(MANAGER), StakeAmount::zero(), false),
            Err(RegistryError::InvalidAmount(_))
        ));
        assert_eq!(
            registry.increase_stake(&id(77), &amt(1)),
            Err(RegistryError::NotFound(id(77)))
        );
        assert!(matches!(
            registry.increase_stake(&a, &StakeAmount::zero()),
            Err(RegistryError::InvalidAmount(_))
        ));
        assert_eq!(
            registry.decrease_stake(&c, &amt(301)),
            Err(RegistryError::InsufficientStake {
                owner: c,
                requested: amt(301),
                available: amt(300),
            })
        );
        assert_eq!(registry.remove_stake(&id(77)), Err(RegistryError::NotFound(id(77))));
        assert!(registry.change_top_capacity(0).is_err());

        assert_eq!(registry.snapshot(), before);
    }

    #[test]
    fn test_remove_from_queue_keeps_arrays_dense() {
        let mut registry = StakeRegistry::new(1).unwrap();
        create(&mut registry, 1, 1_000);
        create(&mut registry, 2, 10);
        create(&mut registry, 3, 30);
        create(&mut registry, 4, 20);

        let events = registry.remove_stake(&id(2)).unwrap();
        registry.check_integrity().unwrap();

        assert_eq!(events, vec![RegistryEvent::RemovedFromQueue { owner: id(2) }]);
        assert_eq!(registry.queue(), &[id(4), id(3)]);
        assert_eq!(registry.position(&id(4)), Some((StakeSet::Queue, 0)));
        assert_eq!(registry.highest_queue_index(), Some(1));
    }

    #[test]
    fn test_change_capacity_grow_and_shrink() {
        let (mut registry, [a, b, c, d]) = four_stakes();

        let events = registry.change_top_capacity(3).unwrap();
        registry.check_integrity().unwrap();
        assert_eq!(registry.top(), &[c, d, b]);
        assert_eq!(registry.queue(), &[a]);
        assert_eq!(events.last(), Some(&RegistryEvent::TopCapacityChanged { old: 2, new: 3 }));

        let events = registry.change_top_capacity(1).unwrap();
        registry.check_integrity().unwrap();
        assert_eq!(registry.top(), &[d]);
        assert_eq!(registry.queue().len(), 3);
        assert_eq!(
            &events[..4],
            &[
                RegistryEvent::RemovedFromTop { owner: b },
                RegistryEvent::AddedToQueue { owner: b },
                RegistryEvent::RemovedFromTop { owner: c },
                RegistryEvent::AddedToQueue { owner: c },
            ]
        );

        registry.change_top_capacity(10).unwrap();
        registry.check_integrity().unwrap();
        assert_eq!(registry.top().len(), 4);
        assert!(registry.queue().is_empty());
        assert_eq!(registry.highest_queue_index(), None);
    }

    #[test]
    fn test_capacity_cannot_drop_below_pinned() {
        let mut registry = StakeRegistry::new(3).unwrap();
        registry.create_stake(id(1), id(MANAGER), amt(1), true).unwrap();
        registry.create_stake(id(2), id(MANAGER), amt(1), true).unwrap();
        create(&mut registry, 3, 50);

        let before = registry.snapshot();
        assert!(matches!(
            registry.change_top_capacity(1),
            Err(RegistryError::InvalidCapacity(_))
        ));
        assert_eq!(registry.snapshot(), before);

        registry.change_top_capacity(2).unwrap();
        registry.check_integrity().unwrap();
        assert_eq!(registry.queue(), &[id(3)]);
    }

    #[test]
    fn test_equal_amounts_break_ties_by_identity() {
        let mut registry = StakeRegistry::new(1).unwrap();
        create(&mut registry, 5, 100);

        // Smaller identity ranks higher on equal stake
        let events = create(&mut registry, 2, 100);
        assert_eq!(registry.top(), &[id(2)]);
        assert_eq!(events[1], RegistryEvent::RemovedFromTop { owner: id(5) });

        // Larger identity with equal stake waits
        create(&mut registry, 7, 100);
        assert_eq!(registry.top(), &[id(2)]);
        assert_eq!(registry.queue(), &[id(5), id(7)]);
        assert_eq!(registry.highest_queue_index(), Some(0));
    }

    #[test]
    fn test_create_then_remove_restores_state() {
        let (mut registry, _) = four_stakes();
        let before = registry.snapshot();

        registry
            .create_stake(id(50), id(MANAGER), amt(10_000), false)
            .unwrap();
        registry.remove_stake(&id(50)).unwrap();
        registry.check_integrity().unwrap();

        // Removal from top swaps in the last element, so positions may move;
        // the extrema still name the same records
        let after = registry.snapshot();
        let at = |records: &[StakeRecord], index: Option<usize>| index.map(|i| records[i].owner);
        assert_eq!(
            at(&after.top, after.lowest_top_index),
            at(&before.top, before.lowest_top_index)
        );
        assert_eq!(
            at(&after.queue, after.highest_queue_index),
            at(&before.queue, before.highest_queue_index)
        );
        assert_eq!(after.queue, before.queue);

        let owners = |records: &[StakeRecord]| {
            let mut owners: Vec<_> = records.iter().map(|r| r.owner).collect();
            owners.sort();
            owners
        };
        assert_eq!(owners(&after.top), owners(&before.top));
        assert_eq!(owners(&after.queue), owners(&before.queue));
    }

    #[test]
    fn test_batch_is_all_or_nothing() {
        let (mut registry, [a, b, _, _]) = four_stakes();
        let before = registry.snapshot();

        let failing = vec![
            StakeOperation::Increase { owner: a, delta: amt(1_000) },
            StakeOperation::Remove { owner: id(99) },
        ];
        assert_eq!(registry.apply_batch(&failing), Err(RegistryError::NotFound(id(99))));
        assert_eq!(registry.snapshot(), before);

        let ok = vec![
            StakeOperation::Increase { owner: a, delta: amt(1_000) },
            StakeOperation::Decrease { owner: b, delta: amt(200) },
            StakeOperation::ChangeTopCapacity { capacity: 3 },
        ];
        let events = registry.apply_batch(&ok).unwrap();
        registry.check_integrity().unwrap();
        assert!(registry.is_top(&a));
        assert!(!registry.contains(&b));
        assert!(matches!(events.last(), Some(RegistryEvent::TopCapacityChanged { .. })));
    }

    #[test]
    fn test_queries() {
        let (mut registry, [a, _, c, d]) = four_stakes();
        registry.create_stake(id(20), id(2000), amt(5), false).unwrap();

        assert_eq!(registry.len(), 5);
        assert_eq!(registry.total_stake(), amt(1_005));
        assert_eq!(registry.top_stake(), amt(700));
        assert_eq!(registry.count_by_manager(&id(MANAGER)), 4);

        let managed: Vec<_> = registry
            .records_by_manager(&id(MANAGER))
            .into_iter()
            .map(|r| r.owner)
            .collect();
        assert_eq!(managed[..2], [c, d]);
        assert!(managed.contains(&a));

        let other = registry.records_by_manager(&id(2000));
        assert_eq!(other.len(), 1);
        assert_eq!(other[0].owner, id(20));
    }

    #[test]
    fn test_snapshot_restore() {
        let (registry, _) = four_stakes();
        let snapshot = registry.snapshot();

        let restored = StakeRegistry::from_snapshot(snapshot.clone()).unwrap();
        assert_eq!(restored.snapshot(), snapshot);

        let mut broken = snapshot;
        broken.top.push(broken.queue[0].clone());
        assert!(StakeRegistry::from_snapshot(broken).is_err());
    }

    #[test]
    fn test_zero_capacity_rejected() {
        assert!(matches!(
            StakeRegistry::new(0),
            Err(RegistryError::InvalidCapacity(_))
        ));
    }
}
