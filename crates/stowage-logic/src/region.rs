//! Storage regions, storage groups and their shared settings.
//!
//! A region is an ordered set of cells with one capacity cache and one
//! district layout. Priority and acceptance live on the region's group:
//! every region belongs to exactly one group, and a region created on its
//! own gets a private single-member group. Membership therefore implies
//! identical acceptance decisions, which lets a search reject every member
//! of a group with one check.

use std::collections::HashSet;

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

use crate::capacity::RegionCapacityCache;
use crate::cell::Cell;
use crate::defs::{DefId, FactionId};
use crate::district::DistrictPartitioner;
use crate::item::StorableItem;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RegionId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GroupId(pub u32);

/// Storage priority, lowest first. `Unstored` is the priority of an item
/// lying outside any storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum StoragePriority {
    Unstored,
    Low,
    Normal,
    Preferred,
    Important,
    Critical,
}

/// Category filter for a storage group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AcceptancePolicy {
    /// Everything except the listed categories.
    AllowAll { except: HashSet<DefId> },
    /// Only the listed categories.
    Only(HashSet<DefId>),
}

impl AcceptancePolicy {
    pub fn allow_all() -> Self {
        AcceptancePolicy::AllowAll {
            except: HashSet::new(),
        }
    }

    pub fn only(defs: impl IntoIterator<Item = DefId>) -> Self {
        AcceptancePolicy::Only(defs.into_iter().collect())
    }

    pub fn accepts(&self, def: DefId) -> bool {
        match self {
            AcceptancePolicy::AllowAll { except } => !except.contains(&def),
            AcceptancePolicy::Only(allowed) => allowed.contains(&def),
        }
    }

    pub fn allow(&mut self, def: DefId) {
        match self {
            AcceptancePolicy::AllowAll { except } => {
                except.remove(&def);
            }
            AcceptancePolicy::Only(allowed) => {
                allowed.insert(def);
            }
        }
    }

    pub fn deny(&mut self, def: DefId) {
        match self {
            AcceptancePolicy::AllowAll { except } => {
                except.insert(def);
            }
            AcceptancePolicy::Only(allowed) => {
                allowed.remove(&def);
            }
        }
    }
}

impl Default for AcceptancePolicy {
    fn default() -> Self {
        Self::allow_all()
    }
}

/// Settings shared by every region of a group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageSettings {
    pub priority: StoragePriority,
    pub acceptance: AcceptancePolicy,
}

impl StorageSettings {
    pub fn new(priority: StoragePriority) -> Self {
        Self {
            priority,
            acceptance: AcceptancePolicy::allow_all(),
        }
    }

    pub fn with_acceptance(mut self, acceptance: AcceptancePolicy) -> Self {
        self.acceptance = acceptance;
        self
    }
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self::new(StoragePriority::Normal)
    }
}

/// Regions sharing one settings object.
#[derive(Debug, Clone)]
pub struct StorageGroup {
    pub id: GroupId,
    pub settings: StorageSettings,
    pub(crate) members: Vec<RegionId>,
    /// Private group created for a lone region; dropped when it empties.
    pub(crate) implicit: bool,
}

impl StorageGroup {
    pub fn members(&self) -> &[RegionId] {
        &self.members
    }

    pub fn is_implicit(&self) -> bool {
        self.implicit
    }
}

/// Parameters for creating a region.
#[derive(Debug, Clone)]
pub struct RegionSpec {
    pub cells: Vec<Cell>,
    pub slots_per_cell: u32,
    pub owner: Option<FactionId>,
    /// Host handle of the structure that owns the region, if any.
    pub parent: Option<u64>,
}

impl RegionSpec {
    /// A zone: no owning structure, one stack per cell.
    pub fn zone(cells: impl IntoIterator<Item = Cell>) -> Self {
        Self {
            cells: cells.into_iter().collect(),
            slots_per_cell: 1,
            owner: None,
            parent: None,
        }
    }

    pub fn with_owner(mut self, owner: FactionId) -> Self {
        self.owner = Some(owner);
        self
    }

    pub fn with_parent(mut self, parent: u64, slots_per_cell: u32) -> Self {
        self.parent = Some(parent);
        self.slots_per_cell = slots_per_cell;
        self
    }
}

/// One storage region: its cells, occupancy cache and district layout.
#[derive(Debug, Clone)]
pub struct StorageRegion {
    pub id: RegionId,
    pub owner: Option<FactionId>,
    pub parent: Option<u64>,
    pub(crate) group: GroupId,
    pub(crate) cells: IndexSet<Cell>,
    pub(crate) capacity: RegionCapacityCache,
    pub(crate) districts: DistrictPartitioner,
}

impl StorageRegion {
    pub(crate) fn new(
        id: RegionId,
        group: GroupId,
        spec: &RegionSpec,
        districts: DistrictPartitioner,
    ) -> Self {
        Self {
            id,
            owner: spec.owner,
            parent: spec.parent,
            group,
            cells: IndexSet::new(),
            capacity: RegionCapacityCache::new(spec.slots_per_cell),
            districts,
        }
    }

    pub fn group(&self) -> GroupId {
        self.group
    }

    pub fn cells(&self) -> &IndexSet<Cell> {
        &self.cells
    }

    pub fn capacity(&self) -> &RegionCapacityCache {
        &self.capacity
    }

    pub fn districts(&self) -> &DistrictPartitioner {
        &self.districts
    }

    pub(crate) fn insert_cell(&mut self, cell: Cell) -> bool {
        if !self.cells.insert(cell) {
            return false;
        }
        self.capacity.add_cell();
        self.districts.mark_dirty();
        true
    }

    /// Returns the stacks that were stored in the cell.
    pub(crate) fn take_cell(&mut self, cell: Cell) -> Vec<StorableItem> {
        if !self.cells.shift_remove(&cell) {
            return Vec::new();
        }
        self.districts.mark_dirty();
        self.capacity.remove_cell(cell)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_order() {
        assert!(StoragePriority::Critical > StoragePriority::Important);
        assert!(StoragePriority::Low > StoragePriority::Unstored);
        let mut all = vec![
            StoragePriority::Normal,
            StoragePriority::Critical,
            StoragePriority::Low,
        ];
        all.sort();
        assert_eq!(
            all,
            vec![
                StoragePriority::Low,
                StoragePriority::Normal,
                StoragePriority::Critical
            ]
        );
    }

    #[test]
    fn test_allow_all_with_exceptions() {
        let mut policy = AcceptancePolicy::allow_all();
        assert!(policy.accepts(DefId(1)));
        policy.deny(DefId(1));
        assert!(!policy.accepts(DefId(1)));
        assert!(policy.accepts(DefId(2)));
        policy.allow(DefId(1));
        assert!(policy.accepts(DefId(1)));
    }

    #[test]
    fn test_whitelist() {
        let mut policy = AcceptancePolicy::only([DefId(3)]);
        assert!(policy.accepts(DefId(3)));
        assert!(!policy.accepts(DefId(4)));
        policy.allow(DefId(4));
        assert!(policy.accepts(DefId(4)));
        policy.deny(DefId(3));
        assert!(!policy.accepts(DefId(3)));
    }

    #[test]
    fn test_region_cell_membership_marks_districts_dirty() {
        let spec = RegionSpec::zone(Vec::new());
        let mut region = StorageRegion::new(
            RegionId(0),
            GroupId(0),
            &spec,
            DistrictPartitioner::new(10, 5),
        );
        assert!(region.insert_cell(Cell::flat(0, 0)));
        assert!(!region.insert_cell(Cell::flat(0, 0)), "duplicate cell");
        assert_eq!(region.capacity().total_slots(), 1);

        region
            .districts
            .rebuild(&region.cells, &region.capacity);
        assert!(!region.districts().is_dirty());

        region.take_cell(Cell::flat(0, 0));
        assert!(region.districts().is_dirty());
        assert_eq!(region.capacity().total_slots(), 0);
        assert!(region.take_cell(Cell::flat(0, 0)).is_empty());
    }
}
