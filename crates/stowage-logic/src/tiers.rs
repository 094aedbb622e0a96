//! Storage groups bucketed by priority, highest first.
//!
//! Rebuilt only when a group is created, removed, emptied or re-prioritised;
//! every search walks the cached order.

use std::collections::{BTreeMap, HashMap};

use crate::region::{GroupId, StorageGroup, StoragePriority};

/// One priority level and the groups in it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tier {
    pub priority: StoragePriority,
    pub groups: Vec<GroupId>,
    /// Regions across all groups of the tier.
    pub region_count: usize,
}

#[derive(Debug, Clone)]
pub struct PriorityTiers {
    tiers: Vec<Tier>,
    dirty: bool,
}

impl PriorityTiers {
    pub fn new() -> Self {
        Self {
            tiers: Vec::new(),
            dirty: true,
        }
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Tiers in descending priority. Stale while dirty.
    pub fn tiers(&self) -> &[Tier] {
        &self.tiers
    }

    pub fn refresh(&mut self, groups: &HashMap<GroupId, StorageGroup>) {
        if self.dirty {
            self.rebuild(groups);
        }
    }

    pub fn rebuild(&mut self, groups: &HashMap<GroupId, StorageGroup>) {
        let mut by_priority: BTreeMap<StoragePriority, Tier> = BTreeMap::new();
        for group in groups.values().filter(|g| !g.members.is_empty()) {
            let tier = by_priority
                .entry(group.settings.priority)
                .or_insert_with(|| Tier {
                    priority: group.settings.priority,
                    groups: Vec::new(),
                    region_count: 0,
                });
            tier.groups.push(group.id);
            tier.region_count += group.members.len();
        }
        self.tiers = by_priority.into_values().rev().collect();
        for tier in &mut self.tiers {
            tier.groups.sort();
        }
        self.dirty = false;
        log::debug!("rebuilt priority tiers: {} tiers", self.tiers.len());
    }

    /// Cached region count for `priority`.
    pub fn region_count(&self, priority: StoragePriority) -> usize {
        self.tiers
            .iter()
            .find(|t| t.priority == priority)
            .map_or(0, |t| t.region_count)
    }
}

impl Default for PriorityTiers {
    fn default() -> Self {
        Self::new()
    }
}
