//! Per-map storage state: regions, groups, cell ownership and the caches
//! that sit on top of them.
//!
//! `StorageMap` is the single owner of every region's capacity cache and
//! district layout, the blocker bitmap, the relocation queue and haul
//! reservations. It is created per map and dropped with it; nothing here is
//! global.
//!
//! Structural changes (regions created or removed, cells added or removed)
//! unstore the items they displace and put them on the relocation queue.
//! Item arrivals and departures are reported by the host through
//! [`StorageMap::item_received`] and [`StorageMap::item_lost`].

use std::collections::HashMap;

use indexmap::IndexSet;
use thiserror::Error;

use crate::blocker::BlockerIndex;
use crate::capacity::{Arrival, CapacityMismatch};
use crate::cell::{Cell, MapSize};
use crate::config::StowageConfig;
use crate::defs::FactionId;
use crate::district::DistrictPartitioner;
use crate::item::{ItemId, StorableItem};
use crate::region::{
    GroupId, RegionId, RegionSpec, StorageGroup, StoragePriority, StorageRegion, StorageSettings,
};
use crate::search::{cell_is_legal, Requester, SearchWorld};
use crate::tiers::PriorityTiers;

/// Errors from structural changes to the storage layout.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    #[error("unknown region {0:?}")]
    UnknownRegion(RegionId),
    #[error("unknown storage group {0:?}")]
    UnknownGroup(GroupId),
    #[error("cell {cell:?} already belongs to region {owner:?}")]
    CellOwned { cell: Cell, owner: RegionId },
    #[error("cell {0:?} is outside the map")]
    OutOfBounds(Cell),
}

/// All storage state for one map.
#[derive(Debug)]
pub struct StorageMap {
    config: StowageConfig,
    pub(crate) regions: HashMap<RegionId, StorageRegion>,
    pub(crate) groups: HashMap<GroupId, StorageGroup>,
    pub(crate) tiers: PriorityTiers,
    pub(crate) cell_owner: HashMap<Cell, RegionId>,
    pub(crate) stored_in: HashMap<ItemId, RegionId>,
    pub(crate) blockers: BlockerIndex,
    pub(crate) relocation: IndexSet<ItemId>,
    pub(crate) reservations: HashMap<Cell, FactionId>,
    next_region: u32,
    next_group: u32,
}

impl StorageMap {
    pub fn new(size: MapSize, config: StowageConfig) -> Self {
        Self {
            config,
            regions: HashMap::new(),
            groups: HashMap::new(),
            tiers: PriorityTiers::new(),
            cell_owner: HashMap::new(),
            stored_in: HashMap::new(),
            blockers: BlockerIndex::new(size),
            relocation: IndexSet::new(),
            reservations: HashMap::new(),
            next_region: 0,
            next_group: 0,
        }
    }

    pub fn config(&self) -> &StowageConfig {
        &self.config
    }

    pub fn size(&self) -> MapSize {
        self.blockers.size()
    }

    // ── Groups ─────────────────────────────────────────────────────────

    /// Create an explicit, initially empty storage group.
    pub fn create_group(&mut self, settings: StorageSettings) -> GroupId {
        self.insert_group(settings, false)
    }

    pub fn group(&self, id: GroupId) -> Option<&StorageGroup> {
        self.groups.get(&id)
    }

    pub fn groups(&self) -> impl Iterator<Item = &StorageGroup> {
        self.groups.values()
    }

    /// Move `region` into `group`. Items the new settings reject are queued
    /// for relocation.
    pub fn join_group(&mut self, region: RegionId, group: GroupId) -> Result<(), StorageError> {
        if !self.groups.contains_key(&group) {
            return Err(StorageError::UnknownGroup(group));
        }
        let current = self
            .regions
            .get(&region)
            .map(|r| r.group)
            .ok_or(StorageError::UnknownRegion(region))?;
        if current == group {
            return Ok(());
        }
        self.detach_from_group(region, current);
        if let Some(g) = self.groups.get_mut(&group) {
            g.members.push(region);
        }
        if let Some(r) = self.regions.get_mut(&region) {
            r.group = group;
        }
        self.tiers.mark_dirty();
        self.requeue_rejected(region);
        Ok(())
    }

    /// Take `region` out of its group into a private group with a copy of
    /// the same settings.
    pub fn leave_group(&mut self, region: RegionId) -> Result<GroupId, StorageError> {
        let current = self
            .regions
            .get(&region)
            .map(|r| r.group)
            .ok_or(StorageError::UnknownRegion(region))?;
        if self.groups.get(&current).is_some_and(|g| g.implicit) {
            return Ok(current);
        }
        let settings = self
            .groups
            .get(&current)
            .map(|g| g.settings.clone())
            .unwrap_or_default();
        self.detach_from_group(region, current);
        let private = self.insert_group(settings, true);
        if let Some(g) = self.groups.get_mut(&private) {
            g.members.push(region);
        }
        if let Some(r) = self.regions.get_mut(&region) {
            r.group = private;
        }
        self.tiers.mark_dirty();
        Ok(private)
    }

    /// Replace a group's settings. Returns the stored items the new
    /// acceptance policy rejects; they are queued for relocation.
    pub fn set_settings(
        &mut self,
        group: GroupId,
        settings: StorageSettings,
    ) -> Result<Vec<ItemId>, StorageError> {
        let g = self
            .groups
            .get_mut(&group)
            .ok_or(StorageError::UnknownGroup(group))?;
        if g.settings.priority != settings.priority {
            self.tiers.mark_dirty();
        }
        g.settings = settings;
        let members = g.members.clone();
        let mut rejected = Vec::new();
        for region in members {
            rejected.extend(self.requeue_rejected(region));
        }
        Ok(rejected)
    }

    pub fn settings_of(&self, region: RegionId) -> Option<&StorageSettings> {
        let group = self.regions.get(&region)?.group;
        self.groups.get(&group).map(|g| &g.settings)
    }

    pub fn priority_of(&self, region: RegionId) -> StoragePriority {
        self.settings_of(region)
            .map_or(StoragePriority::Unstored, |s| s.priority)
    }

    // ── Regions ────────────────────────────────────────────────────────

    /// Create a region in a private group with `settings`.
    pub fn create_region(
        &mut self,
        spec: RegionSpec,
        settings: StorageSettings,
    ) -> Result<RegionId, StorageError> {
        self.check_cells_free(&spec.cells)?;
        let group = self.insert_group(settings, true);
        Ok(self.insert_region(spec, group))
    }

    /// Create a region inside an existing group.
    pub fn create_region_in_group(
        &mut self,
        spec: RegionSpec,
        group: GroupId,
    ) -> Result<RegionId, StorageError> {
        if !self.groups.contains_key(&group) {
            return Err(StorageError::UnknownGroup(group));
        }
        self.check_cells_free(&spec.cells)?;
        Ok(self.insert_region(spec, group))
    }

    /// Destroy a region. Its stored items are unstored and returned.
    pub fn remove_region(&mut self, id: RegionId) -> Result<Vec<StorableItem>, StorageError> {
        let region = self
            .regions
            .remove(&id)
            .ok_or(StorageError::UnknownRegion(id))?;
        for cell in &region.cells {
            self.cell_owner.remove(cell);
            self.reservations.remove(cell);
        }
        let lost: Vec<StorableItem> = region.capacity.stored_items().copied().collect();
        for item in &lost {
            self.stored_in.remove(&item.id);
            self.relocation.insert(item.id);
        }
        self.detach_from_group(id, region.group);
        self.tiers.mark_dirty();
        log::debug!("removed region {:?} ({} items unstored)", id, lost.len());
        Ok(lost)
    }

    /// Owning faction changed, e.g. the structure was captured.
    pub fn set_region_owner(
        &mut self,
        id: RegionId,
        owner: Option<FactionId>,
    ) -> Result<(), StorageError> {
        let region = self
            .regions
            .get_mut(&id)
            .ok_or(StorageError::UnknownRegion(id))?;
        region.owner = owner;
        Ok(())
    }

    pub fn region(&self, id: RegionId) -> Option<&StorageRegion> {
        self.regions.get(&id)
    }

    pub fn regions(&self) -> impl Iterator<Item = &StorageRegion> {
        self.regions.values()
    }

    pub fn region_count(&self) -> usize {
        self.regions.len()
    }

    /// Region that owns `cell`.
    pub fn region_at(&self, cell: Cell) -> Option<RegionId> {
        self.cell_owner.get(&cell).copied()
    }

    pub fn add_cell(&mut self, region: RegionId, cell: Cell) -> Result<(), StorageError> {
        if !self.blockers.size().contains(cell) {
            return Err(StorageError::OutOfBounds(cell));
        }
        match self.cell_owner.get(&cell) {
            Some(&owner) if owner == region => return Ok(()),
            Some(&owner) => return Err(StorageError::CellOwned { cell, owner }),
            None => {}
        }
        let r = self
            .regions
            .get_mut(&region)
            .ok_or(StorageError::UnknownRegion(region))?;
        r.insert_cell(cell);
        self.cell_owner.insert(cell, region);
        Ok(())
    }

    /// Remove a cell from a region. Items stored there are unstored,
    /// queued for relocation and returned.
    pub fn remove_cell(
        &mut self,
        region: RegionId,
        cell: Cell,
    ) -> Result<Vec<StorableItem>, StorageError> {
        let r = self
            .regions
            .get_mut(&region)
            .ok_or(StorageError::UnknownRegion(region))?;
        if self.cell_owner.get(&cell) != Some(&region) {
            return Ok(Vec::new());
        }
        let lost = r.take_cell(cell);
        self.cell_owner.remove(&cell);
        self.reservations.remove(&cell);
        for item in &lost {
            self.stored_in.remove(&item.id);
            self.relocation.insert(item.id);
        }
        Ok(lost)
    }

    // ── Items ──────────────────────────────────────────────────────────

    /// Report that `item` now rests at `cell`. Returns the receiving region
    /// and how the cache absorbed it, or `None` when the cell is not storage.
    pub fn item_received(&mut self, item: &StorableItem, cell: Cell) -> Option<(RegionId, Arrival)> {
        // A stored item reported somewhere else moved without a loss event.
        if let Some(&previous) = self.stored_in.get(&item.id) {
            let same_cell = self.region_at(cell) == Some(previous)
                && self
                    .regions
                    .get(&previous)
                    .and_then(|r| r.capacity.cell_of(item.id))
                    == Some(cell);
            if !same_cell {
                log::warn!("{:?} arrived at {:?} while still stored in {:?}", item.id, cell, previous);
                self.item_lost(item.id);
            }
        }
        let Some(region_id) = self.region_at(cell) else {
            self.relocation.insert(item.id);
            return None;
        };
        let group = self.regions.get(&region_id)?.group;
        let accepted = self
            .groups
            .get(&group)
            .is_some_and(|g| g.settings.acceptance.accepts(item.def));
        let region = self.regions.get_mut(&region_id)?;

        let arrival = region.capacity.notify_received(item, cell);
        match arrival {
            Arrival::NewOccupant => {
                region.districts.notify_received(item, cell);
                self.stored_in.insert(item.id, region_id);
                if accepted {
                    self.relocation.shift_remove(&item.id);
                } else {
                    self.relocation.insert(item.id);
                }
            }
            Arrival::StackGrowth { into } => {
                if let Some(count) = region.capacity.stored(into).map(|s| s.stack_count) {
                    region.districts.update_stack_count(into, cell, count);
                }
                self.relocation.shift_remove(&item.id);
            }
            Arrival::AlreadyStored => {}
        }
        Some((region_id, arrival))
    }

    /// Report that `item` left its cell (picked up, destroyed, consumed).
    /// Unknown items are a no-op.
    pub fn item_lost(&mut self, item: ItemId) -> Option<RegionId> {
        self.relocation.shift_remove(&item);
        let region_id = self.stored_in.remove(&item)?;
        let region = self.regions.get_mut(&region_id)?;
        if let Some(cell) = region.capacity.cell_of(item) {
            region.capacity.notify_lost(item);
            region.districts.notify_lost(item, cell);
        }
        Some(region_id)
    }

    /// A stored stack was split or topped up in place.
    pub fn update_stack_count(&mut self, item: ItemId, count: u32) {
        let Some(region) = self
            .stored_in
            .get(&item)
            .and_then(|id| self.regions.get_mut(id))
        else {
            return;
        };
        if let Some(cell) = region.capacity.cell_of(item) {
            region.capacity.update_stack_count(item, count);
            region.districts.update_stack_count(item, cell, count);
        }
    }

    pub fn current_storage_of(&self, item: ItemId) -> Option<RegionId> {
        self.stored_in.get(&item).copied()
    }

    /// Priority of the storage `item` sits in. `Unstored` if it is loose or
    /// its storage no longer accepts it.
    pub fn current_priority_of(&self, item: &StorableItem) -> StoragePriority {
        match self.current_storage_of(item.id).and_then(|r| self.settings_of(r)) {
            Some(settings) if settings.acceptance.accepts(item.def) => settings.priority,
            _ => StoragePriority::Unstored,
        }
    }

    // ── Blockers, reservations, relocation ─────────────────────────────

    pub fn is_storage_blocked(&self, cell: Cell) -> bool {
        self.blockers.is_blocked(cell)
    }

    pub fn blockers(&self) -> &BlockerIndex {
        &self.blockers
    }

    pub fn blockers_mut(&mut self) -> &mut BlockerIndex {
        &mut self.blockers
    }

    /// Claim `cell` for an inbound haul by `faction`. Fails if already
    /// claimed. The claim hides the cell from that faction's searches and
    /// from searches with no faction.
    pub fn reserve_cell(&mut self, cell: Cell, faction: FactionId) -> bool {
        if self.reservations.contains_key(&cell) {
            return false;
        }
        self.reservations.insert(cell, faction);
        true
    }

    pub fn release_cell(&mut self, cell: Cell) {
        self.reservations.remove(&cell);
    }

    pub fn is_reserved(&self, cell: Cell) -> bool {
        self.reservations.contains_key(&cell)
    }

    pub fn reserved_by(&self, cell: Cell) -> Option<FactionId> {
        self.reservations.get(&cell).copied()
    }

    pub fn enqueue_relocation(&mut self, item: ItemId) {
        self.relocation.insert(item);
    }

    pub fn dequeue_relocation(&mut self, item: ItemId) -> bool {
        self.relocation.shift_remove(&item)
    }

    /// Items that may benefit from moving, oldest first.
    pub fn pending_relocations(&self) -> &IndexSet<ItemId> {
        &self.relocation
    }

    // ── Search support ─────────────────────────────────────────────────

    pub fn refresh_tiers(&mut self) {
        self.tiers.refresh(&self.groups);
    }

    pub fn tiers(&self) -> &PriorityTiers {
        &self.tiers
    }

    /// Full legality check for putting `item` at `cell`, as used by search.
    pub fn is_valid_storage_cell(
        &self,
        cell: Cell,
        item: &StorableItem,
        requester: &Requester,
        world: &dyn SearchWorld,
    ) -> bool {
        let Some(region) = self.region_at(cell).and_then(|id| self.regions.get(&id)) else {
            return false;
        };
        cell_is_legal(
            &self.blockers,
            &self.reservations,
            &region.capacity,
            world,
            cell,
            item,
            requester,
        )
    }

    /// Rebuild a region's districts now instead of on next search.
    pub fn rebuild_districts(&mut self, id: RegionId) -> Result<(), StorageError> {
        let region = self
            .regions
            .get_mut(&id)
            .ok_or(StorageError::UnknownRegion(id))?;
        region.districts.rebuild(&region.cells, &region.capacity);
        Ok(())
    }

    /// Whether the region's current districts partition its cells exactly.
    pub fn districts_cover_region(&self, id: RegionId) -> bool {
        self.regions
            .get(&id)
            .is_some_and(|r| r.districts.covers_exactly(&r.cells))
    }

    // ── Verification ───────────────────────────────────────────────────

    /// Compare a region's cache with `actual`, the number of distinct stacks
    /// the host sees in the region's cells. Mismatches are logged.
    pub fn verify_region(&self, id: RegionId, actual: usize) -> Result<(), CapacityMismatch> {
        let Some(region) = self.regions.get(&id) else {
            return Ok(());
        };
        let result = region.capacity.verify(id, actual);
        if let Err(err) = &result {
            log::error!("capacity verification failed: {}", err);
        }
        result
    }

    /// Check that clean districts agree with their region cache.
    pub fn verify_districts(&self, id: RegionId) -> Result<(), CapacityMismatch> {
        let Some(region) = self.regions.get(&id) else {
            return Ok(());
        };
        if region.districts.is_dirty() {
            return Ok(());
        }
        for district in region.districts.current() {
            let actual: usize = district
                .cells()
                .iter()
                .map(|&c| region.capacity.occupants_at(c).len())
                .sum();
            if let Err(err) = district.capacity().verify(id, actual) {
                log::error!("district verification failed: {}", err);
                return Err(err);
            }
        }
        Ok(())
    }

    /// Drop every region, group and index, e.g. when a new map is loaded.
    pub fn clear(&mut self) {
        self.regions.clear();
        self.groups.clear();
        self.tiers = PriorityTiers::new();
        self.cell_owner.clear();
        self.stored_in.clear();
        self.blockers.clear();
        self.relocation.clear();
        self.reservations.clear();
    }

    // ── Internals ──────────────────────────────────────────────────────

    fn insert_group(&mut self, settings: StorageSettings, implicit: bool) -> GroupId {
        let id = GroupId(self.next_group);
        self.next_group += 1;
        self.groups.insert(
            id,
            StorageGroup {
                id,
                settings,
                members: Vec::new(),
                implicit,
            },
        );
        id
    }

    fn insert_region(&mut self, spec: RegionSpec, group: GroupId) -> RegionId {
        let id = RegionId(self.next_region);
        self.next_region += 1;
        let districts =
            DistrictPartitioner::new(self.config.district_threshold, self.config.district_size);
        let mut region = StorageRegion::new(id, group, &spec, districts);
        for &cell in &spec.cells {
            if region.insert_cell(cell) {
                self.cell_owner.insert(cell, id);
            }
        }
        self.regions.insert(id, region);
        if let Some(g) = self.groups.get_mut(&group) {
            g.members.push(id);
        }
        self.tiers.mark_dirty();
        log::debug!("created region {:?} with {} cells", id, spec.cells.len());
        id
    }

    fn check_cells_free(&self, cells: &[Cell]) -> Result<(), StorageError> {
        for &cell in cells {
            if !self.blockers.size().contains(cell) {
                return Err(StorageError::OutOfBounds(cell));
            }
            if let Some(&owner) = self.cell_owner.get(&cell) {
                return Err(StorageError::CellOwned { cell, owner });
            }
        }
        Ok(())
    }

    fn detach_from_group(&mut self, region: RegionId, group: GroupId) {
        let drop_group = match self.groups.get_mut(&group) {
            Some(g) => {
                g.members.retain(|r| *r != region);
                g.implicit && g.members.is_empty()
            }
            None => false,
        };
        if drop_group {
            self.groups.remove(&group);
        }
        self.tiers.mark_dirty();
    }

    /// Queue stored items of `region` that its settings no longer accept.
    fn requeue_rejected(&mut self, region: RegionId) -> Vec<ItemId> {
        let Some(r) = self.regions.get(&region) else {
            return Vec::new();
        };
        let Some(settings) = self.groups.get(&r.group).map(|g| &g.settings) else {
            return Vec::new();
        };
        let rejected: Vec<ItemId> = r
            .capacity
            .stored_items()
            .filter(|item| !settings.acceptance.accepts(item.def))
            .map(|item| item.id)
            .collect();
        for id in &rejected {
            self.relocation.insert(*id);
        }
        rejected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::defs::{DefId, ObjectDef};
    use crate::region::AcceptancePolicy;

    fn map() -> StorageMap {
        StorageMap::new(MapSize::flat(32, 32), StowageConfig::default())
    }

    fn row(z: i32, xs: std::ops::Range<i32>) -> Vec<Cell> {
        xs.map(|x| Cell::flat(x, z)).collect()
    }

    fn steel() -> ObjectDef {
        ObjectDef::item(DefId(1), "steel", 75)
    }

    #[test]
    fn test_create_region_claims_cells() {
        let mut map = map();
        let id = map
            .create_region(RegionSpec::zone(row(0, 0..4)), StorageSettings::default())
            .unwrap();
        assert_eq!(map.region_at(Cell::flat(2, 0)), Some(id));
        assert_eq!(map.region(id).unwrap().capacity().free_slots(), 4);

        let err = map
            .create_region(RegionSpec::zone(row(0, 3..6)), StorageSettings::default())
            .unwrap_err();
        assert_eq!(
            err,
            StorageError::CellOwned {
                cell: Cell::flat(3, 0),
                owner: id
            }
        );
    }

    #[test]
    fn test_out_of_bounds_region_rejected() {
        let mut map = map();
        let err = map
            .create_region(RegionSpec::zone(row(40, 0..2)), StorageSettings::default())
            .unwrap_err();
        assert!(matches!(err, StorageError::OutOfBounds(_)));
        assert_eq!(map.region_count(), 0);
    }

    #[test]
    fn test_item_received_and_lost() {
        let mut map = map();
        let id = map
            .create_region(RegionSpec::zone(row(0, 0..4)), StorageSettings::default())
            .unwrap();
        let item = StorableItem::new(ItemId(7), &steel(), 10);
        let (region, arrival) = map.item_received(&item, Cell::flat(1, 0)).unwrap();
        assert_eq!(region, id);
        assert_eq!(arrival, Arrival::NewOccupant);
        assert_eq!(map.current_storage_of(ItemId(7)), Some(id));
        assert_eq!(map.current_priority_of(&item), StoragePriority::Normal);

        assert_eq!(map.item_lost(ItemId(7)), Some(id));
        assert_eq!(map.current_storage_of(ItemId(7)), None);
        assert_eq!(map.region(id).unwrap().capacity().free_slots(), 4);
        assert_eq!(map.item_lost(ItemId(7)), None, "second loss is a no-op");
    }

    #[test]
    fn test_loose_item_is_queued() {
        let mut map = map();
        let item = StorableItem::new(ItemId(3), &steel(), 10);
        assert!(map.item_received(&item, Cell::flat(9, 9)).is_none());
        assert!(map.pending_relocations().contains(&ItemId(3)));
        assert_eq!(map.current_priority_of(&item), StoragePriority::Unstored);
    }

    #[test]
    fn test_remove_cell_unstores_items() {
        let mut map = map();
        let id = map
            .create_region(RegionSpec::zone(row(0, 0..4)), StorageSettings::default())
            .unwrap();
        let item = StorableItem::new(ItemId(1), &steel(), 10);
        map.item_received(&item, Cell::flat(0, 0));

        let lost = map.remove_cell(id, Cell::flat(0, 0)).unwrap();
        assert_eq!(lost.len(), 1);
        assert_eq!(map.region_at(Cell::flat(0, 0)), None);
        assert_eq!(map.current_storage_of(ItemId(1)), None);
        assert!(map.pending_relocations().contains(&ItemId(1)));
        assert!(map.verify_region(id, 0).is_ok());
    }

    #[test]
    fn test_remove_region_drops_implicit_group() {
        let mut map = map();
        let id = map
            .create_region(RegionSpec::zone(row(0, 0..2)), StorageSettings::default())
            .unwrap();
        let group = map.region(id).unwrap().group();
        map.remove_region(id).unwrap();
        assert!(map.group(group).is_none());
        assert_eq!(map.region_at(Cell::flat(0, 0)), None);
        assert_eq!(map.remove_region(id), Err(StorageError::UnknownRegion(id)));
    }

    #[test]
    fn test_group_settings_shared() {
        let mut map = map();
        let group = map.create_group(StorageSettings::new(StoragePriority::Important));
        let a = map
            .create_region_in_group(RegionSpec::zone(row(0, 0..2)), group)
            .unwrap();
        let b = map
            .create_region(RegionSpec::zone(row(1, 0..2)), StorageSettings::default())
            .unwrap();
        map.join_group(b, group).unwrap();
        assert_eq!(map.priority_of(a), StoragePriority::Important);
        assert_eq!(map.priority_of(b), StoragePriority::Important);
        assert_eq!(map.group(group).unwrap().members().len(), 2);

        let private = map.leave_group(b).unwrap();
        assert_ne!(private, group);
        assert_eq!(map.priority_of(b), StoragePriority::Important, "settings copied");
        assert_eq!(map.group(group).unwrap().members(), &[a]);
    }

    #[test]
    fn test_settings_change_requeues_rejected() {
        let mut map = map();
        let id = map
            .create_region(RegionSpec::zone(row(0, 0..4)), StorageSettings::default())
            .unwrap();
        let item = StorableItem::new(ItemId(1), &steel(), 10);
        map.item_received(&item, Cell::flat(0, 0));
        assert!(!map.pending_relocations().contains(&ItemId(1)));

        let group = map.region(id).unwrap().group();
        let strict = StorageSettings::default().with_acceptance(AcceptancePolicy::only([DefId(99)]));
        let rejected = map.set_settings(group, strict).unwrap();
        assert_eq!(rejected, vec![ItemId(1)]);
        assert!(map.pending_relocations().contains(&ItemId(1)));
    }

    #[test]
    fn test_priority_change_marks_tiers_dirty() {
        let mut map = map();
        let id = map
            .create_region(RegionSpec::zone(row(0, 0..4)), StorageSettings::default())
            .unwrap();
        map.refresh_tiers();
        assert!(!map.tiers().is_dirty());
        let group = map.region(id).unwrap().group();
        map.set_settings(group, StorageSettings::new(StoragePriority::Critical))
            .unwrap();
        assert!(map.tiers().is_dirty());
        map.refresh_tiers();
        assert_eq!(map.tiers().tiers()[0].priority, StoragePriority::Critical);
    }

    #[test]
    fn test_reservations() {
        let mut map = map();
        let cell = Cell::flat(1, 1);
        assert!(map.reserve_cell(cell, FactionId(1)));
        assert!(!map.reserve_cell(cell, FactionId(2)));
        assert_eq!(map.reserved_by(cell), Some(FactionId(1)));
        map.release_cell(cell);
        assert!(!map.is_reserved(cell));
    }

    #[test]
    fn test_rejected_storage_counts_as_unstored() {
        let mut map = map();
        let id = map
            .create_region(RegionSpec::zone(row(0, 0..2)), StorageSettings::default())
            .unwrap();
        let item = StorableItem::new(ItemId(4), &steel(), 10);
        map.item_received(&item, Cell::flat(0, 0));
        assert_eq!(map.current_priority_of(&item), StoragePriority::Normal);

        let group = map.region(id).unwrap().group();
        let only_wood = StorageSettings::default().with_acceptance(AcceptancePolicy::only([DefId(2)]));
        map.set_settings(group, only_wood).unwrap();
        assert_eq!(map.current_storage_of(ItemId(4)), Some(id), "still physically stored");
        assert_eq!(map.current_priority_of(&item), StoragePriority::Unstored);
    }

    #[test]
    fn test_arrival_elsewhere_frees_previous_slot() {
        let mut map = map();
        let a = map
            .create_region(RegionSpec::zone(row(0, 0..2)), StorageSettings::default())
            .unwrap();
        let b = map
            .create_region(RegionSpec::zone(row(5, 5..7)), StorageSettings::default())
            .unwrap();
        let item = StorableItem::new(ItemId(9), &steel(), 10);
        map.item_received(&item, Cell::flat(0, 0));
        map.item_received(&item, Cell::flat(5, 5));
        assert_eq!(map.current_storage_of(ItemId(9)), Some(b));
        assert_eq!(map.region(a).unwrap().capacity().free_slots(), 2);
        assert!(map.verify_districts(a).is_ok());

        // Same region, different cell.
        map.item_received(&item, Cell::flat(6, 5));
        assert_eq!(map.region(b).unwrap().capacity().cell_of(ItemId(9)), Some(Cell::flat(6, 5)));
        assert_eq!(map.region(b).unwrap().capacity().free_slots(), 1);

        // Out of storage entirely.
        assert!(map.item_received(&item, Cell::flat(20, 20)).is_none());
        assert_eq!(map.current_storage_of(ItemId(9)), None);
        assert_eq!(map.region(b).unwrap().capacity().free_slots(), 2);

        map.item_lost(ItemId(9));
        assert_eq!(map.region(a).unwrap().capacity().free_slots(), 2);
        assert_eq!(map.region(b).unwrap().capacity().free_slots(), 2);
    }

    #[test]
    fn test_stack_growth_mirrors_into_districts() {
        let config = StowageConfig {
            district_threshold: 4,
            district_size: 2,
            ..StowageConfig::default()
        };
        let mut map = StorageMap::new(MapSize::flat(32, 32), config);
        let id = map
            .create_region(RegionSpec::zone(row(0, 0..8)), StorageSettings::default())
            .unwrap();
        map.rebuild_districts(id).unwrap();

        let first = StorableItem::new(ItemId(1), &steel(), 10);
        let second = StorableItem::new(ItemId(2), &steel(), 10);
        map.item_received(&first, Cell::flat(0, 0));
        let (_, arrival) = map.item_received(&second, Cell::flat(0, 0)).unwrap();
        assert_eq!(arrival, Arrival::StackGrowth { into: ItemId(1) });
        assert!(map.verify_districts(id).is_ok());
        assert!(map.districts_cover_region(id));

        let region = map.region(id).unwrap();
        let district = &region.districts().current()[0];
        assert_eq!(
            district.capacity().stored(ItemId(1)).map(|s| s.stack_count),
            Some(20)
        );
    }
}
