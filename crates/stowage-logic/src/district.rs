//! Partitioning of large storage regions into districts.
//!
//! A region with more cells than `threshold` is split into row-major chunks
//! of at most `size` cells. Each chunk gets its own capacity cache, seeded
//! once from the region cache, so a search can skip a full district without
//! touching its cells.
//!
//! Rebuilds are lazy and full: any change to the region's cell list marks
//! the partition dirty, and the next search that reaches the region pays a
//! single O(region) rebuild.

use std::collections::HashMap;

use indexmap::IndexSet;

use crate::capacity::RegionCapacityCache;
use crate::cell::Cell;
use crate::item::{ItemId, StorableItem};

/// Bounded sub-partition of one region's cells.
#[derive(Debug, Clone)]
pub struct District {
    cells: Vec<Cell>,
    capacity: RegionCapacityCache,
}

impl District {
    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    pub fn capacity(&self) -> &RegionCapacityCache {
        &self.capacity
    }
}

/// Lazily rebuilt district layout for one region.
#[derive(Debug, Clone)]
pub struct DistrictPartitioner {
    threshold: usize,
    size: usize,
    districts: Vec<District>,
    district_of: HashMap<Cell, usize>,
    dirty: bool,
    rebuilds: u64,
}

impl DistrictPartitioner {
    pub fn new(threshold: usize, size: usize) -> Self {
        Self {
            threshold,
            size: size.max(1),
            districts: Vec::new(),
            district_of: HashMap::new(),
            dirty: true,
            rebuilds: 0,
        }
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Number of full rebuilds performed so far.
    pub fn rebuild_count(&self) -> u64 {
        self.rebuilds
    }

    /// Districts for the region, rebuilding first if the layout is stale.
    pub fn districts(
        &mut self,
        cells: &IndexSet<Cell>,
        capacity: &RegionCapacityCache,
    ) -> &[District] {
        if self.dirty {
            self.rebuild(cells, capacity);
        }
        &self.districts
    }

    /// Current districts without rebuilding. Empty or stale while dirty.
    pub fn current(&self) -> &[District] {
        &self.districts
    }

    pub fn district_of(&self, cell: Cell) -> Option<usize> {
        if self.dirty {
            return None;
        }
        self.district_of.get(&cell).copied()
    }

    /// Full repartition from the region's cell list and cache.
    pub fn rebuild(&mut self, cells: &IndexSet<Cell>, capacity: &RegionCapacityCache) {
        self.districts.clear();
        self.district_of.clear();

        let mut ordered: Vec<Cell> = cells.iter().copied().collect();
        if ordered.len() > self.threshold {
            ordered.sort_by_key(Cell::row_major_key);
        }
        let chunk_size = if ordered.len() > self.threshold {
            self.size
        } else {
            ordered.len().max(1)
        };

        for chunk in ordered.chunks(chunk_size) {
            let index = self.districts.len();
            for &cell in chunk {
                self.district_of.insert(cell, index);
            }
            self.districts.push(District {
                cells: chunk.to_vec(),
                capacity: RegionCapacityCache::seeded_from(chunk, capacity),
            });
        }

        self.dirty = false;
        self.rebuilds += 1;
        log::debug!(
            "rebuilt districts: {} cells into {} districts",
            cells.len(),
            self.districts.len()
        );
    }

    /// Mirror an arrival into the owning district's cache. Skipped while
    /// dirty; the next rebuild reseeds from the region cache.
    pub fn notify_received(&mut self, item: &StorableItem, cell: Cell) {
        if let Some(idx) = self.district_of(cell) {
            self.districts[idx].capacity.notify_received(item, cell);
        }
    }

    pub fn notify_lost(&mut self, item: ItemId, cell: Cell) {
        if let Some(idx) = self.district_of(cell) {
            self.districts[idx].capacity.notify_lost(item);
        }
    }

    pub fn update_stack_count(&mut self, item: ItemId, cell: Cell, count: u32) {
        if let Some(idx) = self.district_of(cell) {
            self.districts[idx].capacity.update_stack_count(item, count);
        }
    }

    /// Whether the districts partition `cells` exactly: every cell in
    /// exactly one district, nothing extra.
    pub fn covers_exactly(&self, cells: &IndexSet<Cell>) -> bool {
        if self.dirty {
            return false;
        }
        let mut seen = IndexSet::with_capacity(cells.len());
        for district in &self.districts {
            for &cell in &district.cells {
                if !seen.insert(cell) || !cells.contains(&cell) {
                    return false;
                }
            }
        }
        seen.len() == cells.len()
    }
}
