//! Incremental capacity and occupancy cache for one storage region.
//!
//! The cache tracks how many stack slots remain free and which item stacks
//! are stored, grouped by category. It is never rebuilt by rescanning the
//! map: it stays correct only because every arrival and departure is
//! reported exactly once through [`RegionCapacityCache::notify_received`]
//! and [`RegionCapacityCache::notify_lost`].
//!
//! An arrival that merges into a stackable counterpart already in the same
//! cell is stack growth and consumes no slot.

use std::collections::HashMap;

use indexmap::IndexSet;
use thiserror::Error;

use crate::cell::Cell;
use crate::defs::DefId;
use crate::item::{ItemId, StorableItem};
use crate::region::RegionId;

/// Outcome of reporting an arrival to the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arrival {
    /// The item occupies a new slot.
    NewOccupant,
    /// The item was absorbed by an existing stack in the same cell. The
    /// host must merge it physically into `into`.
    StackGrowth { into: ItemId },
    /// The item was already tracked; nothing changed.
    AlreadyStored,
}

/// Debug verification found the cached count out of step with the map.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("region {region:?}: cache reports {cached} occupied slots, map has {actual}")]
pub struct CapacityMismatch {
    pub region: RegionId,
    pub cached: i64,
    pub actual: i64,
}

#[derive(Debug, Clone, Copy)]
struct StoredStack {
    item: StorableItem,
    cell: Cell,
}

/// Free-slot count plus per-category index of stored stacks.
#[derive(Debug, Clone)]
pub struct RegionCapacityCache {
    slots_per_cell: u32,
    total_slots: i64,
    free_slots: i64,
    stacks: HashMap<ItemId, StoredStack>,
    by_category: HashMap<DefId, IndexSet<ItemId>>,
    by_cell: HashMap<Cell, Vec<ItemId>>,
}

impl RegionCapacityCache {
    pub fn new(slots_per_cell: u32) -> Self {
        Self {
            slots_per_cell: slots_per_cell.max(1),
            total_slots: 0,
            free_slots: 0,
            stacks: HashMap::new(),
            by_category: HashMap::new(),
            by_cell: HashMap::new(),
        }
    }

    /// Cache over `cells` seeded once from the stacks `source` holds in those
    /// cells. Used to give each district its own summary.
    pub fn seeded_from(cells: &[Cell], source: &RegionCapacityCache) -> Self {
        let mut cache = Self::new(source.slots_per_cell);
        for &cell in cells {
            cache.add_cell();
            for id in source.occupants_at(cell) {
                if let Some(stored) = source.stacks.get(id) {
                    cache.insert_stack(stored.item, cell);
                }
            }
        }
        cache
    }

    pub fn slots_per_cell(&self) -> u32 {
        self.slots_per_cell
    }

    pub fn total_slots(&self) -> i64 {
        self.total_slots
    }

    /// Free slots. Negative only if an event was reported twice.
    pub fn free_slots(&self) -> i64 {
        self.free_slots
    }

    pub fn occupied_slots(&self) -> i64 {
        self.total_slots - self.free_slots
    }

    pub fn stored_count(&self) -> usize {
        self.stacks.len()
    }

    /// A cell joined the region.
    pub fn add_cell(&mut self) {
        self.total_slots += self.slots_per_cell as i64;
        self.free_slots += self.slots_per_cell as i64;
    }

    /// A cell left the region. Returns the stacks that were stored there;
    /// they are no longer tracked.
    pub fn remove_cell(&mut self, cell: Cell) -> Vec<StorableItem> {
        let ids = self.by_cell.remove(&cell).unwrap_or_default();
        let mut lost = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(stored) = self.stacks.remove(&id) {
                self.unindex_category(&stored.item);
                self.free_slots += 1;
                lost.push(stored.item);
            }
        }
        self.total_slots -= self.slots_per_cell as i64;
        self.free_slots -= self.slots_per_cell as i64;
        lost
    }

    /// Report that `item` arrived at `cell`.
    pub fn notify_received(&mut self, item: &StorableItem, cell: Cell) -> Arrival {
        if self.stacks.contains_key(&item.id) {
            return Arrival::AlreadyStored;
        }
        if let Some(into) = self.merge_target(cell, item) {
            if let Some(stored) = self.stacks.get_mut(&into) {
                stored.item.stack_count += item.stack_count;
            }
            return Arrival::StackGrowth { into };
        }
        self.insert_stack(*item, cell);
        if self.free_slots < 0 {
            log::warn!(
                "capacity cache went negative ({}) after receiving {:?} at {:?}",
                self.free_slots,
                item.id,
                cell
            );
        }
        Arrival::NewOccupant
    }

    /// Report that `item` left the region. Unknown items are a no-op.
    pub fn notify_lost(&mut self, item: ItemId) -> bool {
        let Some(stored) = self.stacks.remove(&item) else {
            return false;
        };
        self.unindex_category(&stored.item);
        if let Some(ids) = self.by_cell.get_mut(&stored.cell) {
            ids.retain(|id| *id != item);
            if ids.is_empty() {
                self.by_cell.remove(&stored.cell);
            }
        }
        self.free_slots += 1;
        true
    }

    /// A stored stack was split or topped up in place. Slots are unchanged.
    pub fn update_stack_count(&mut self, item: ItemId, count: u32) -> bool {
        match self.stacks.get_mut(&item) {
            Some(stored) => {
                stored.item.stack_count = count;
                true
            }
            None => false,
        }
    }

    /// Stored stacks of category `def`.
    pub fn stored_of_category(&self, def: DefId) -> impl Iterator<Item = &StorableItem> + '_ {
        self.by_category
            .get(&def)
            .into_iter()
            .flat_map(|ids| ids.iter())
            .filter_map(|id| self.stacks.get(id).map(|s| &s.item))
    }

    /// Whether the region could take `item` somewhere: a free slot, or a
    /// stored stack it could merge into.
    pub fn can_accept(&self, item: &StorableItem) -> bool {
        self.free_slots > 0
            || self
                .stored_of_category(item.def)
                .any(|stored| stored.can_stack_with(item) && stored.has_room())
    }

    /// Whether `cell` itself can take `item`: an unused slot in the cell, or
    /// a stack there with room for the whole incoming count.
    pub fn cell_accepts(&self, cell: Cell, item: &StorableItem) -> bool {
        let occupants = self.occupants_at(cell);
        if (occupants.len() as u32) < self.slots_per_cell {
            return true;
        }
        self.merge_target(cell, item).is_some()
    }

    pub fn occupants_at(&self, cell: Cell) -> &[ItemId] {
        self.by_cell.get(&cell).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn contains(&self, item: ItemId) -> bool {
        self.stacks.contains_key(&item)
    }

    pub fn stored(&self, item: ItemId) -> Option<&StorableItem> {
        self.stacks.get(&item).map(|s| &s.item)
    }

    pub fn cell_of(&self, item: ItemId) -> Option<Cell> {
        self.stacks.get(&item).map(|s| s.cell)
    }

    pub fn stored_items(&self) -> impl Iterator<Item = &StorableItem> + '_ {
        self.stacks.values().map(|s| &s.item)
    }

    /// Debug check against ground truth: `actual` distinct stacks occupy
    /// the region's cells.
    pub fn verify(&self, region: RegionId, actual: usize) -> Result<(), CapacityMismatch> {
        let cached = self.occupied_slots();
        if cached == actual as i64 {
            Ok(())
        } else {
            Err(CapacityMismatch {
                region,
                cached,
                actual: actual as i64,
            })
        }
    }

    fn merge_target(&self, cell: Cell, item: &StorableItem) -> Option<ItemId> {
        self.occupants_at(cell).iter().copied().find(|id| {
            self.stacks.get(id).is_some_and(|stored| {
                stored.item.can_stack_with(item) && stored.item.room_left() >= item.stack_count
            })
        })
    }

    fn insert_stack(&mut self, item: StorableItem, cell: Cell) {
        self.stacks.insert(item.id, StoredStack { item, cell });
        self.by_category.entry(item.def).or_default().insert(item.id);
        self.by_cell.entry(cell).or_default().push(item.id);
        self.free_slots -= 1;
    }

    fn unindex_category(&mut self, item: &StorableItem) {
        if let Some(ids) = self.by_category.get_mut(&item.def) {
            ids.swap_remove(&item.id);
            if ids.is_empty() {
                self.by_category.remove(&item.def);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::defs::ObjectDef;

    fn steel() -> ObjectDef {
        ObjectDef::item(DefId(1), "steel", 75)
    }

    fn rifle() -> ObjectDef {
        ObjectDef::item(DefId(2), "rifle", 1)
    }

    fn cache_with_cells(slots_per_cell: u32, cells: usize) -> RegionCapacityCache {
        let mut cache = RegionCapacityCache::new(slots_per_cell);
        for _ in 0..cells {
            cache.add_cell();
        }
        cache
    }

    #[test]
    fn test_new_occupant_consumes_slot() {
        let mut cache = cache_with_cells(1, 4);
        let item = StorableItem::new(ItemId(1), &steel(), 10);
        assert_eq!(cache.notify_received(&item, Cell::flat(0, 0)), Arrival::NewOccupant);
        assert_eq!(cache.free_slots(), 3);
        assert_eq!(cache.stored_of_category(DefId(1)).count(), 1);
    }

    #[test]
    fn test_stack_growth_consumes_no_slot() {
        let mut cache = cache_with_cells(1, 4);
        let cell = Cell::flat(0, 0);
        let first = StorableItem::new(ItemId(1), &steel(), 10);
        let second = StorableItem::new(ItemId(2), &steel(), 20);
        cache.notify_received(&first, cell);
        let arrival = cache.notify_received(&second, cell);
        assert_eq!(arrival, Arrival::StackGrowth { into: ItemId(1) });
        assert_eq!(cache.free_slots(), 3, "merge must not take a slot");
        assert_eq!(cache.stored(ItemId(1)).map(|s| s.stack_count), Some(30));
        assert!(!cache.contains(ItemId(2)));
    }

    #[test]
    fn test_no_growth_without_room() {
        let mut cache = cache_with_cells(2, 1);
        let cell = Cell::flat(0, 0);
        cache.notify_received(&StorableItem::new(ItemId(1), &steel(), 70), cell);
        let arrival = cache.notify_received(&StorableItem::new(ItemId(2), &steel(), 10), cell);
        assert_eq!(arrival, Arrival::NewOccupant, "5 room left, 10 incoming");
        assert_eq!(cache.free_slots(), 0);
    }

    #[test]
    fn test_no_growth_across_cells() {
        let mut cache = cache_with_cells(1, 2);
        cache.notify_received(&StorableItem::new(ItemId(1), &steel(), 10), Cell::flat(0, 0));
        let arrival =
            cache.notify_received(&StorableItem::new(ItemId(2), &steel(), 10), Cell::flat(1, 0));
        assert_eq!(arrival, Arrival::NewOccupant);
        assert_eq!(cache.free_slots(), 0);
    }

    #[test]
    fn test_duplicate_receive_is_noop() {
        let mut cache = cache_with_cells(1, 3);
        let item = StorableItem::new(ItemId(1), &rifle(), 1);
        cache.notify_received(&item, Cell::flat(0, 0));
        assert_eq!(
            cache.notify_received(&item, Cell::flat(0, 0)),
            Arrival::AlreadyStored
        );
        assert_eq!(cache.free_slots(), 2);
    }

    #[test]
    fn test_lost_frees_slot_once() {
        let mut cache = cache_with_cells(1, 3);
        let item = StorableItem::new(ItemId(1), &rifle(), 1);
        cache.notify_received(&item, Cell::flat(0, 0));
        assert!(cache.notify_lost(ItemId(1)));
        assert!(!cache.notify_lost(ItemId(1)), "second loss is a no-op");
        assert_eq!(cache.free_slots(), 3);
        assert!(cache.occupants_at(Cell::flat(0, 0)).is_empty());
        assert_eq!(cache.stored_of_category(DefId(2)).count(), 0);
    }

    #[test]
    fn test_can_accept_via_stacking_when_full() {
        let mut cache = cache_with_cells(1, 1);
        cache.notify_received(&StorableItem::new(ItemId(1), &steel(), 40), Cell::flat(0, 0));
        assert_eq!(cache.free_slots(), 0);

        let query = StorableItem::new(ItemId(9), &steel(), 5);
        assert!(cache.can_accept(&query), "stackable counterpart has room");
        assert!(cache.cell_accepts(Cell::flat(0, 0), &query));

        let other = StorableItem::new(ItemId(10), &rifle(), 1);
        assert!(!cache.can_accept(&other));
    }

    #[test]
    fn test_cell_accepts_respects_slots_per_cell() {
        let mut cache = cache_with_cells(2, 2);
        let cell = Cell::flat(0, 0);
        cache.notify_received(&StorableItem::new(ItemId(1), &rifle(), 1), cell);
        let next = StorableItem::new(ItemId(2), &rifle(), 1);
        assert!(cache.cell_accepts(cell, &next));
        cache.notify_received(&next, cell);
        let third = StorableItem::new(ItemId(3), &rifle(), 1);
        assert!(!cache.cell_accepts(cell, &third));
        assert!(cache.cell_accepts(Cell::flat(1, 0), &third));
    }

    #[test]
    fn test_remove_cell_drops_occupants() {
        let mut cache = cache_with_cells(1, 3);
        cache.notify_received(&StorableItem::new(ItemId(1), &rifle(), 1), Cell::flat(0, 0));
        cache.notify_received(&StorableItem::new(ItemId(2), &rifle(), 1), Cell::flat(1, 0));
        let lost = cache.remove_cell(Cell::flat(0, 0));
        assert_eq!(lost.len(), 1);
        assert_eq!(lost[0].id, ItemId(1));
        assert_eq!(cache.total_slots(), 2);
        assert_eq!(cache.free_slots(), 1);
        assert!(cache.verify(RegionId(0), 1).is_ok());
    }

    #[test]
    fn test_update_stack_count() {
        let mut cache = cache_with_cells(1, 1);
        cache.notify_received(&StorableItem::new(ItemId(1), &steel(), 75), Cell::flat(0, 0));
        let query = StorableItem::new(ItemId(2), &steel(), 5);
        assert!(!cache.can_accept(&query), "full stack, no slot");
        cache.update_stack_count(ItemId(1), 50);
        assert!(cache.can_accept(&query));
        assert_eq!(cache.free_slots(), 0, "splits do not touch slots");
    }

    #[test]
    fn test_verify_reports_mismatch() {
        let mut cache = cache_with_cells(1, 3);
        cache.notify_received(&StorableItem::new(ItemId(1), &rifle(), 1), Cell::flat(0, 0));
        let err = cache.verify(RegionId(4), 2).unwrap_err();
        assert_eq!(err.cached, 1);
        assert_eq!(err.actual, 2);
        assert!(err.to_string().contains("RegionId(4)"));
    }

    #[test]
    fn test_seeded_from_copies_only_chunk() {
        let mut region = cache_with_cells(1, 3);
        region.notify_received(&StorableItem::new(ItemId(1), &rifle(), 1), Cell::flat(0, 0));
        region.notify_received(&StorableItem::new(ItemId(2), &rifle(), 1), Cell::flat(2, 0));
        let district = RegionCapacityCache::seeded_from(&[Cell::flat(0, 0), Cell::flat(1, 0)], &region);
        assert_eq!(district.total_slots(), 2);
        assert_eq!(district.free_slots(), 1);
        assert!(district.contains(ItemId(1)));
        assert!(!district.contains(ItemId(2)));
    }
}
