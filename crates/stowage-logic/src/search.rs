//! Best-cell search: nearest legal storage cell at the highest priority.
//!
//! Walk order is tier → group → region → district → cell, with a cheap
//! reject at every level before anything more expensive runs:
//!
//! | Level | Skip when |
//! |-------|-----------|
//! | Tier | priority ≤ item's current storage, or below a candidate already found |
//! | Group | shared acceptance policy rejects the item's def |
//! | Region | hostile owner, or capacity cache has no slot and no stackable counterpart |
//! | District | district cache likewise disallows the item |
//! | Cell | squared distance not strictly better than the best so far |
//!
//! Only cells that survive all of these get the full legality check.
//! Equal distances keep the earliest cell found, so results are
//! deterministic for a given cache state and walk order.

use std::collections::HashMap;

use rand::rngs::StdRng;
use rand::SeedableRng;
use thiserror::Error;

use crate::blocker::BlockerIndex;
use crate::capacity::RegionCapacityCache;
use crate::cell::Cell;
use crate::config::{SamplingConfig, StowageConfig};
use crate::defs::FactionId;
use crate::item::StorableItem;
use crate::region::{RegionId, StoragePriority, StorageRegion};
use crate::storage::StorageMap;

/// Forced rebuilds allowed per region before a mismatch is an error.
const MAX_DISTRICT_RETRIES: u32 = 1;

/// Outbound queries the search makes of the host. Must be side-effect free.
pub trait SearchWorld {
    /// Whether the requester can physically reach and use `cell`.
    fn is_accessible(&self, cell: Cell, requester: &Requester) -> bool;

    fn is_hostile(&self, _a: FactionId, _b: FactionId) -> bool {
        false
    }
}

/// Every cell reachable, nobody hostile.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenWorld;

impl SearchWorld for OpenWorld {
    fn is_accessible(&self, _cell: Cell, _requester: &Requester) -> bool {
        true
    }
}

/// Who is asking, and from where.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Requester {
    pub position: Cell,
    pub faction: Option<FactionId>,
}

impl Requester {
    pub fn at(position: Cell) -> Self {
        Self {
            position,
            faction: None,
        }
    }

    pub fn with_faction(mut self, faction: FactionId) -> Self {
        self.faction = Some(faction);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchAccuracy {
    /// Evaluate every cell of every viable district.
    High,
    /// Stop scanning a region after a bounded random sample once a
    /// candidate is in hand.
    #[default]
    Approximate,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StoreRequest {
    pub item: StorableItem,
    pub requester: Requester,
    /// Priority of the storage the item currently sits in.
    pub current_priority: StoragePriority,
    pub accuracy: SearchAccuracy,
}

impl StoreRequest {
    pub fn new(item: StorableItem, requester: Requester) -> Self {
        Self {
            item,
            requester,
            current_priority: StoragePriority::Unstored,
            accuracy: SearchAccuracy::default(),
        }
    }

    pub fn with_current_priority(mut self, priority: StoragePriority) -> Self {
        self.current_priority = priority;
        self
    }

    pub fn with_accuracy(mut self, accuracy: SearchAccuracy) -> Self {
        self.accuracy = accuracy;
        self
    }
}

/// A chosen destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageTarget {
    pub cell: Cell,
    pub priority: StoragePriority,
    pub region: RegionId,
}

/// Counters for the most recent search.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchStats {
    pub cells_examined: usize,
    /// Regions in the tiers the walk entered, from the cached tier counts.
    pub regions_in_tiers: usize,
    pub legality_checks: usize,
    pub groups_skipped: usize,
    pub regions_skipped: usize,
    pub districts_skipped: usize,
    pub forced_rebuilds: usize,
    pub sampling_cutoffs: usize,
    /// The item was dropped from the relocation queue.
    pub dequeued: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SearchError {
    #[error("district layout of region {region:?} still disagrees with cell ownership at {cell:?} after a forced rebuild")]
    DistrictMismatch { region: RegionId, cell: Cell },
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    cell: Cell,
    distance_squared: i64,
    priority: StoragePriority,
    region: RegionId,
}

impl From<Candidate> for StorageTarget {
    fn from(c: Candidate) -> Self {
        StorageTarget {
            cell: c.cell,
            priority: c.priority,
            region: c.region,
        }
    }
}

/// Shared read-only state for scanning one region.
struct ScanContext<'a> {
    item: &'a StorableItem,
    requester: &'a Requester,
    world: &'a dyn SearchWorld,
    cell_owner: &'a HashMap<Cell, RegionId>,
    blockers: &'a BlockerIndex,
    reservations: &'a HashMap<Cell, FactionId>,
}

/// Whether a claim on `cell` hides it from `requester`. A faction's claim
/// hides the cell from that faction and from requesters with no faction;
/// other factions, hostile or not, may still pick it.
pub(crate) fn reserved_against(
    reservations: &HashMap<Cell, FactionId>,
    cell: Cell,
    requester: &Requester,
) -> bool {
    match (reservations.get(&cell), requester.faction) {
        (None, _) => false,
        (Some(_), None) => true,
        (Some(owner), Some(faction)) => *owner == faction,
    }
}

/// Full per-cell legality: blocker bit, reservation, slot or stack room,
/// then host accessibility. Ordered cheapest first; a blocked cell never
/// reaches the host query.
pub(crate) fn cell_is_legal(
    blockers: &BlockerIndex,
    reservations: &HashMap<Cell, FactionId>,
    capacity: &RegionCapacityCache,
    world: &dyn SearchWorld,
    cell: Cell,
    item: &StorableItem,
    requester: &Requester,
) -> bool {
    if blockers.is_blocked(cell) {
        return false;
    }
    if reserved_against(reservations, cell, requester) {
        return false;
    }
    if !capacity.cell_accepts(cell, item) {
        return false;
    }
    world.is_accessible(cell, requester)
}

fn faction_allows(owner: Option<FactionId>, requester: &Requester, world: &dyn SearchWorld) -> bool {
    match (owner, requester.faction) {
        (Some(owner), Some(faction)) if owner != faction => !world.is_hostile(faction, owner),
        _ => true,
    }
}

/// Stateful search driver: owns the sampling RNG and last-run stats.
#[derive(Debug, Clone)]
pub struct BestCellSearch {
    sampling: SamplingConfig,
    rng: StdRng,
    stats: SearchStats,
}

impl BestCellSearch {
    pub fn new(config: &StowageConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            sampling: config.sampling,
            rng,
            stats: SearchStats::default(),
        }
    }

    /// Counters from the most recent call to [`Self::find_best_cell`].
    pub fn last_stats(&self) -> &SearchStats {
        &self.stats
    }

    /// Find the best storage cell for `request.item`.
    ///
    /// Returns `Ok(None)` when no legal cell beats the item's current
    /// storage. Stale district layouts are rebuilt in place; a mismatch that
    /// survives one forced rebuild is returned as an error.
    pub fn find_best_cell(
        &mut self,
        map: &mut StorageMap,
        world: &dyn SearchWorld,
        request: &StoreRequest,
    ) -> Result<Option<StorageTarget>, SearchError> {
        self.stats = SearchStats::default();
        map.refresh_tiers();

        let StorageMap {
            regions,
            groups,
            tiers,
            cell_owner,
            blockers,
            relocation,
            reservations,
            ..
        } = map;
        let item = &request.item;
        let ctx = ScanContext {
            item,
            requester: &request.requester,
            world,
            cell_owner,
            blockers,
            reservations,
        };
        let mut best: Option<Candidate> = None;

        for tier in tiers.tiers() {
            if tier.priority <= request.current_priority {
                if best.is_none() && relocation.shift_remove(&item.id) {
                    self.stats.dequeued = true;
                }
                break;
            }
            if best.is_some_and(|b| tier.priority < b.priority) {
                break;
            }
            self.stats.regions_in_tiers += tier.region_count;

            for group_id in &tier.groups {
                let Some(group) = groups.get(group_id) else {
                    continue;
                };
                if !group.settings.acceptance.accepts(item.def) {
                    self.stats.groups_skipped += 1;
                    continue;
                }

                for region_id in &group.members {
                    let Some(region) = regions.get_mut(region_id) else {
                        continue;
                    };
                    if !faction_allows(region.owner, ctx.requester, world)
                        || !region.capacity.can_accept(item)
                    {
                        self.stats.regions_skipped += 1;
                        continue;
                    }
                    let sample_limit = match request.accuracy {
                        SearchAccuracy::High => usize::MAX,
                        SearchAccuracy::Approximate => {
                            self.sampling.sample_limit(region.cells.len(), &mut self.rng)
                        }
                    };

                    let before = best;
                    let mut retries = 0;
                    loop {
                        match self.scan_region(region, tier.priority, &ctx, &mut best, sample_limit) {
                            Ok(()) => break,
                            Err(cell) if retries < MAX_DISTRICT_RETRIES => {
                                log::warn!(
                                    "district mismatch in region {:?} at {:?}; forcing rebuild",
                                    region.id,
                                    cell
                                );
                                retries += 1;
                                self.stats.forced_rebuilds += 1;
                                best = before;
                                region.districts.rebuild(&region.cells, &region.capacity);
                            }
                            Err(cell) => {
                                log::error!(
                                    "district mismatch in region {:?} at {:?} persisted after rebuild",
                                    region.id,
                                    cell
                                );
                                return Err(SearchError::DistrictMismatch {
                                    region: region.id,
                                    cell,
                                });
                            }
                        }
                    }
                }
            }
        }

        Ok(best.map(StorageTarget::from))
    }

    /// Scan one region's districts, updating `best`. Returns the offending
    /// cell if a district lists a cell the region no longer owns.
    fn scan_region(
        &mut self,
        region: &mut StorageRegion,
        priority: StoragePriority,
        ctx: &ScanContext<'_>,
        best: &mut Option<Candidate>,
        sample_limit: usize,
    ) -> Result<(), Cell> {
        let StorageRegion {
            id,
            cells,
            capacity,
            districts,
            ..
        } = region;
        let region_id = *id;
        let mut examined = 0usize;

        for district in districts.districts(cells, capacity) {
            if !district.capacity().can_accept(ctx.item) {
                self.stats.districts_skipped += 1;
                continue;
            }
            for &cell in district.cells() {
                if examined >= sample_limit && best.is_some() {
                    self.stats.sampling_cutoffs += 1;
                    return Ok(());
                }
                examined += 1;
                self.stats.cells_examined += 1;

                let distance = cell.distance_squared(ctx.requester.position);
                if best.is_some_and(|b| distance >= b.distance_squared) {
                    continue;
                }
                if ctx.cell_owner.get(&cell) != Some(&region_id) {
                    return Err(cell);
                }
                self.stats.legality_checks += 1;
                if cell_is_legal(
                    ctx.blockers,
                    ctx.reservations,
                    capacity,
                    ctx.world,
                    cell,
                    ctx.item,
                    ctx.requester,
                ) {
                    *best = Some(Candidate {
                        cell,
                        distance_squared: distance,
                        priority,
                        region: region_id,
                    });
                }
            }
        }
        Ok(())
    }
}

/// Slow reference search: every cell of every region that has room for the
/// item, with no district, distance or sampling shortcuts. Used to
/// cross-check [`BestCellSearch`] in tests and the harness.
///
/// A region whose aggregate shows no room is skipped here too. A host that
/// overfills some cells can leave a free cell elsewhere in such a region.
pub fn find_best_cell_exhaustive(
    map: &StorageMap,
    world: &dyn SearchWorld,
    request: &StoreRequest,
) -> Option<StorageTarget> {
    let item = &request.item;
    let mut region_ids: Vec<RegionId> = map.regions.keys().copied().collect();
    region_ids.sort();

    let mut best: Option<Candidate> = None;
    for id in region_ids {
        let Some(region) = map.regions.get(&id) else {
            continue;
        };
        let Some(settings) = map.groups.get(&region.group).map(|g| &g.settings) else {
            continue;
        };
        if settings.priority <= request.current_priority
            || !settings.acceptance.accepts(item.def)
            || !faction_allows(region.owner, &request.requester, world)
            || !region.capacity.can_accept(item)
        {
            continue;
        }
        for &cell in &region.cells {
            if !cell_is_legal(
                &map.blockers,
                &map.reservations,
                &region.capacity,
                world,
                cell,
                item,
                &request.requester,
            ) {
                continue;
            }
            let distance = cell.distance_squared(request.requester.position);
            let better = match best {
                None => true,
                Some(b) => {
                    settings.priority > b.priority
                        || (settings.priority == b.priority && distance < b.distance_squared)
                }
            };
            if better {
                best = Some(Candidate {
                    cell,
                    distance_squared: distance,
                    priority: settings.priority,
                    region: id,
                });
            }
        }
    }
    best.map(StorageTarget::from)
}
