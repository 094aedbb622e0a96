//! Storage engine - per-map owner of the ECS mirror and every cache

use std::collections::HashMap;

use hecs::{Entity, EntityBuilder, World};
use indexmap::IndexSet;
use thiserror::Error;

use stowage_logic::capacity::{Arrival, CapacityMismatch};
use stowage_logic::categorical::CategoricalIndex;
use stowage_logic::cell::Cell;
use stowage_logic::config::{validate_config, ConfigError, StowageConfig};
use stowage_logic::defs::{ClassTag, DefDatabase, DefId, FactionId, ObjectDef};
use stowage_logic::item::{ItemId, StorableItem};
use stowage_logic::region::{GroupId, RegionId, RegionSpec, StorageSettings};
use stowage_logic::search::{
    find_best_cell_exhaustive, BestCellSearch, Requester, SearchAccuracy, SearchError, SearchStats, SearchWorld,
    StorageTarget, StoreRequest,
};
use stowage_logic::storage::{StorageError, StorageMap};

use crate::components::*;
use crate::terrain::{FactionRelations, Terrain};

/// Host misuse that cannot be a silent no-op.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("invalid configuration: {0:?}")]
    Config(Vec<ConfigError>),
    #[error("unknown def {0:?}")]
    UnknownDef(DefId),
    #[error("entity {0:?} is not a registered storable item")]
    UnknownItem(Entity),
    #[error("cell {0:?} is outside the map")]
    OutOfBounds(Cell),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Search(#[from] SearchError),
}

/// What to spawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Spawn {
    pub def: DefId,
    pub stack: Option<Stack>,
    pub owner: Option<FactionId>,
}

impl Spawn {
    pub fn object(def: DefId) -> Self {
        Self {
            def,
            stack: None,
            owner: None,
        }
    }

    pub fn item(def: DefId, count: u32) -> Self {
        Self {
            def,
            stack: Some(Stack::new(count)),
            owner: None,
        }
    }

    pub fn with_material(mut self, material: DefId) -> Self {
        if let Some(stack) = &mut self.stack {
            stack.material = Some(material);
        }
        self
    }

    pub fn owned_by(mut self, faction: FactionId) -> Self {
        self.owner = Some(faction);
        self
    }
}

/// Key for [`StowageEngine::categorical_lookup`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LookupKey {
    Tag(ClassTag),
    Def(DefId),
    Owned(FactionId, ClassTag),
}

/// Cache key for an item entity.
pub fn item_id(entity: Entity) -> ItemId {
    ItemId(entity.to_bits().get())
}

pub fn entity_of(item: ItemId) -> Option<Entity> {
    Entity::from_bits(item.0)
}

/// Search's view of the host: terrain passability and faction hostility.
struct EngineWorld<'a> {
    terrain: &'a dyn Terrain,
    relations: &'a FactionRelations,
}

impl SearchWorld for EngineWorld<'_> {
    fn is_accessible(&self, cell: Cell, _requester: &Requester) -> bool {
        self.terrain.is_passable(cell)
    }

    fn is_hostile(&self, a: FactionId, b: FactionId) -> bool {
        self.relations.is_hostile(a, b)
    }
}

/// Per-map storage engine
pub struct StowageEngine {
    /// ECS world mirroring host objects
    pub world: World,
    defs: DefDatabase,
    storage: StorageMap,
    search: BestCellSearch,
    /// Placed objects per occupied cell
    things_at: HashMap<Cell, Vec<Entity>>,
    by_tag: CategoricalIndex<ClassTag, Entity>,
    by_def: CategoricalIndex<DefId, Entity>,
    by_owner: CategoricalIndex<(FactionId, ClassTag), Entity>,
    terrain: Box<dyn Terrain>,
    relations: FactionRelations,
    config: StowageConfig,
}

impl StowageEngine {
    /// Create an engine for one map. Rejects invalid configuration.
    pub fn new(
        defs: DefDatabase,
        terrain: Box<dyn Terrain>,
        config: StowageConfig,
    ) -> Result<Self, EngineError> {
        let errors = validate_config(&config);
        if !errors.is_empty() {
            return Err(EngineError::Config(errors));
        }
        Ok(Self {
            world: World::new(),
            defs,
            storage: StorageMap::new(terrain.size(), config.clone()),
            search: BestCellSearch::new(&config),
            things_at: HashMap::new(),
            by_tag: CategoricalIndex::with_initializer(|tag: &ClassTag| {
                if *tag == ClassTag::Thing {
                    IndexSet::with_capacity(1024)
                } else {
                    IndexSet::new()
                }
            }),
            by_def: CategoricalIndex::new(),
            by_owner: CategoricalIndex::new(),
            terrain,
            relations: FactionRelations::new(),
            config,
        })
    }

    pub fn config(&self) -> &StowageConfig {
        &self.config
    }

    pub fn defs(&self) -> &DefDatabase {
        &self.defs
    }

    pub fn storage(&self) -> &StorageMap {
        &self.storage
    }

    pub fn relations_mut(&mut self) -> &mut FactionRelations {
        &mut self.relations
    }

    // ── Inbound lifecycle events ───────────────────────────────────────

    /// Register a new object. It is not on the map until placed.
    pub fn object_spawned(&mut self, spawn: Spawn) -> Result<Entity, EngineError> {
        let def = self
            .defs
            .get(spawn.def)
            .ok_or(EngineError::UnknownDef(spawn.def))?;

        let mut builder = EntityBuilder::new();
        builder.add(Def(def.id));
        if def.is_item() {
            let mut stack = spawn.stack.unwrap_or_else(|| Stack::new(1));
            stack.count = stack.count.max(1).min(def.stack_limit.max(1));
            builder.add(stack);
        }
        if def.blocks_storage() {
            builder.add(BlocksStorage);
        }
        if let Some(faction) = spawn.owner {
            builder.add(Owner(faction));
        }
        let entity = self.world.spawn(builder.build());

        self.by_tag.add_all(def.class_tags(), entity);
        self.by_def.add(def.id, entity);
        if let Some(faction) = spawn.owner {
            for &tag in def.class_tags() {
                self.by_owner.add((faction, tag), entity);
            }
        }
        Ok(entity)
    }

    /// The object now rests at `cell` (its anchor, for multi-cell
    /// structures). Returns how storage absorbed an item, if it landed in
    /// storage. A stack-growth arrival is merged physically: the incoming
    /// entity is despawned into the stack it joined.
    pub fn object_placed_at_cell(
        &mut self,
        entity: Entity,
        cell: Cell,
    ) -> Result<Option<Arrival>, EngineError> {
        if !self.world.contains(entity) {
            log::warn!("placement of unknown entity {:?} at {:?}", entity, cell);
            return Ok(None);
        }
        if !self.storage.size().contains(cell) {
            return Err(EngineError::OutOfBounds(cell));
        }
        if let Some(previous) = self.placed_cell(entity) {
            if previous == cell {
                return Ok(None);
            }
            self.object_removed_from_cell(entity, previous)?;
        }
        let Some(def_id) = self.def_id(entity) else {
            return Ok(None);
        };
        let Some(def) = self.defs.get(def_id) else {
            return Ok(None);
        };

        let cells = occupied_cells(def, cell);
        if let Some(&outside) = cells.iter().find(|c| !self.storage.size().contains(**c)) {
            return Err(EngineError::OutOfBounds(outside));
        }

        let mut region = None;
        if let Some(props) = def.storage {
            let owner = self.world.get::<&Owner>(entity).ok().map(|o| o.0);
            let mut spec = RegionSpec::zone(cells.clone()).with_parent(item_id(entity).0, props.slots_per_cell);
            if let Some(owner) = owner {
                spec = spec.with_owner(owner);
            }
            region = Some(
                self.storage
                    .create_region(spec, StorageSettings::new(props.default_priority))?,
            );
        }

        if self.world.get::<&BlocksStorage>(entity).is_ok() {
            for &c in &cells {
                self.storage.blockers_mut().on_blocker_placed(c, def);
            }
        }
        let is_item = def.is_item();

        let _ = self.world.insert_one(entity, Placed { cell });
        for &c in &cells {
            self.things_at.entry(c).or_default().push(entity);
        }

        let mut arrival = None;
        if let Some(region) = region {
            let _ = self.world.insert_one(entity, StorageStructure { region });
            self.receive_items_at(&cells);
        } else if is_item {
            arrival = self.receive_item(entity, cell);
        }
        self.after_mutation();
        Ok(arrival)
    }

    /// The object left `cell` (picked up, moved, deconstructed). Unknown
    /// or mismatched notifications are no-ops.
    pub fn object_removed_from_cell(&mut self, entity: Entity, cell: Cell) -> Result<(), EngineError> {
        let Some(anchor) = self.placed_cell(entity) else {
            log::warn!("removal of unplaced entity {:?} from {:?}", entity, cell);
            return Ok(());
        };
        if anchor != cell {
            log::warn!(
                "removal of {:?} from {:?} but it is placed at {:?}",
                entity,
                cell,
                anchor
            );
            return Ok(());
        }
        let cells = self.detach_from_cells(entity);

        if self.world.get::<&BlocksStorage>(entity).is_ok() {
            let world = &self.world;
            let defs = &self.defs;
            for &c in &cells {
                let remaining = self
                    .things_at
                    .get(&c)
                    .into_iter()
                    .flatten()
                    .filter_map(|e| world.get::<&Def>(*e).ok().and_then(|d| defs.get(d.0)));
                self.storage.blockers_mut().on_blocker_removed(c, remaining);
            }
        }

        if let Ok(structure) = self.world.remove_one::<StorageStructure>(entity) {
            self.storage.remove_region(structure.region)?;
        }
        if self.is_item(entity) {
            self.storage.item_lost(item_id(entity));
        }
        self.after_mutation();
        Ok(())
    }

    /// The object no longer exists. Placed objects are removed from their
    /// cell first. Unknown entities are a no-op.
    pub fn object_despawned(&mut self, entity: Entity) -> Result<(), EngineError> {
        if !self.world.contains(entity) {
            log::warn!("despawn of unknown entity {:?}", entity);
            return Ok(());
        }
        if let Some(anchor) = self.placed_cell(entity) {
            self.object_removed_from_cell(entity, anchor)?;
        }
        self.storage.item_lost(item_id(entity));
        self.unindex(entity);
        let _ = self.world.despawn(entity);
        Ok(())
    }

    /// A cell joined a region. Items already lying there become stored.
    pub fn region_cell_added(&mut self, region: RegionId, cell: Cell) -> Result<(), EngineError> {
        self.storage.add_cell(region, cell)?;
        self.receive_items_at(&[cell]);
        self.after_mutation();
        Ok(())
    }

    /// A cell left a region. Returns the items that were unstored.
    pub fn region_cell_removed(
        &mut self,
        region: RegionId,
        cell: Cell,
    ) -> Result<Vec<Entity>, EngineError> {
        let lost = self.storage.remove_cell(region, cell)?;
        self.after_mutation();
        Ok(lost.iter().filter_map(|item| entity_of(item.id)).collect())
    }

    /// Replace the settings of `region`'s group. Returns stored items the
    /// new acceptance policy rejects; they are queued for relocation.
    pub fn acceptance_settings_changed(
        &mut self,
        region: RegionId,
        settings: StorageSettings,
    ) -> Result<Vec<Entity>, EngineError> {
        let group = self
            .storage
            .region(region)
            .map(|r| r.group())
            .ok_or(StorageError::UnknownRegion(region))?;
        let rejected = self.storage.set_settings(group, settings)?;
        Ok(rejected.into_iter().filter_map(entity_of).collect())
    }

    // ── Zones and groups ───────────────────────────────────────────────

    /// Create a storage zone: a region with no owning structure.
    pub fn add_zone(
        &mut self,
        cells: Vec<Cell>,
        settings: StorageSettings,
    ) -> Result<RegionId, EngineError> {
        let region = self
            .storage
            .create_region(RegionSpec::zone(cells.clone()), settings)?;
        self.receive_items_at(&cells);
        self.after_mutation();
        Ok(region)
    }

    /// Remove a zone. Returns the items that were unstored.
    pub fn remove_zone(&mut self, region: RegionId) -> Result<Vec<Entity>, EngineError> {
        let lost = self.storage.remove_region(region)?;
        Ok(lost.iter().filter_map(|item| entity_of(item.id)).collect())
    }

    pub fn create_group(&mut self, settings: StorageSettings) -> GroupId {
        self.storage.create_group(settings)
    }

    pub fn join_group(&mut self, region: RegionId, group: GroupId) -> Result<(), EngineError> {
        Ok(self.storage.join_group(region, group)?)
    }

    pub fn leave_group(&mut self, region: RegionId) -> Result<GroupId, EngineError> {
        Ok(self.storage.leave_group(region)?)
    }

    // ── Ownership, stacks, reservations ────────────────────────────────

    /// Transfer ownership. The entity moves between ownership buckets in
    /// one step; a storage structure's region follows its owner.
    pub fn set_faction(&mut self, entity: Entity, faction: Option<FactionId>) -> Result<(), EngineError> {
        if !self.world.contains(entity) {
            log::warn!("faction change for unknown entity {:?}", entity);
            return Ok(());
        }
        let previous = self.world.get::<&Owner>(entity).ok().map(|o| o.0);
        if previous == faction {
            return Ok(());
        }
        let tags: Vec<ClassTag> = self
            .def_id(entity)
            .and_then(|id| self.defs.get(id))
            .map(|d| d.class_tags().to_vec())
            .unwrap_or_default();

        for tag in tags {
            match (previous, faction) {
                (Some(old), Some(new)) => {
                    self.by_owner.move_member(&(old, tag), (new, tag), entity);
                }
                (Some(old), None) => {
                    self.by_owner.remove(&(old, tag), &entity);
                }
                (None, Some(new)) => {
                    self.by_owner.add((new, tag), entity);
                }
                (None, None) => {}
            }
        }
        match faction {
            Some(f) => {
                let _ = self.world.insert_one(entity, Owner(f));
            }
            None => {
                let _ = self.world.remove_one::<Owner>(entity);
            }
        }
        let region = self.world.get::<&StorageStructure>(entity).ok().map(|s| s.region);
        if let Some(region) = region {
            self.storage.set_region_owner(region, faction)?;
        }
        Ok(())
    }

    /// A stack was split or merged in place. Zero means fully consumed.
    pub fn set_stack_count(&mut self, entity: Entity, count: u32) -> Result<(), EngineError> {
        if count == 0 {
            return self.object_despawned(entity);
        }
        let limit = self
            .def_id(entity)
            .and_then(|id| self.defs.get(id))
            .map_or(1, |d| d.stack_limit.max(1));
        let count = count.min(limit);
        match self.world.get::<&mut Stack>(entity) {
            Ok(mut stack) => stack.count = count,
            Err(_) => return Err(EngineError::UnknownItem(entity)),
        }
        self.storage.update_stack_count(item_id(entity), count);
        self.after_mutation();
        Ok(())
    }

    /// Claim a destination cell for an inbound haul.
    pub fn reserve_cell(&mut self, cell: Cell, faction: FactionId) -> bool {
        self.storage.reserve_cell(cell, faction)
    }

    pub fn release_cell(&mut self, cell: Cell) {
        self.storage.release_cell(cell);
    }

    // ── Public queries ─────────────────────────────────────────────────

    /// Best storage cell for `entity`, or `None` if nothing beats where it
    /// is now. `accuracy` defaults to the configured mode.
    pub fn find_best_cell(
        &mut self,
        entity: Entity,
        requester: Requester,
        accuracy: Option<SearchAccuracy>,
    ) -> Result<Option<StorageTarget>, EngineError> {
        let accuracy = accuracy.unwrap_or(if self.config.high_accuracy {
            SearchAccuracy::High
        } else {
            SearchAccuracy::Approximate
        });
        let request = self.store_request(entity, requester)?.with_accuracy(accuracy);
        let world = EngineWorld {
            terrain: self.terrain.as_ref(),
            relations: &self.relations,
        };
        Ok(self.search.find_best_cell(&mut self.storage, &world, &request)?)
    }

    /// Brute-force answer to the same question, scanning every cell of
    /// every region. Does not touch the relocation queue.
    pub fn find_best_cell_exhaustive(
        &self,
        entity: Entity,
        requester: Requester,
    ) -> Result<Option<StorageTarget>, EngineError> {
        let request = self.store_request(entity, requester)?;
        let world = EngineWorld {
            terrain: self.terrain.as_ref(),
            relations: &self.relations,
        };
        Ok(find_best_cell_exhaustive(&self.storage, &world, &request))
    }

    pub fn last_search_stats(&self) -> &SearchStats {
        self.search.last_stats()
    }

    pub fn current_storage_of(&self, entity: Entity) -> Option<RegionId> {
        self.storage.current_storage_of(item_id(entity))
    }

    /// The storage structure that owns `region`; `None` for zones.
    pub fn structure_of(&self, region: RegionId) -> Option<Entity> {
        let parent = self.storage.region(region)?.parent?;
        entity_of(ItemId(parent)).filter(|e| self.world.contains(*e))
    }

    pub fn is_storage_blocked(&self, cell: Cell) -> bool {
        self.storage.is_storage_blocked(cell)
    }

    /// All live objects with the given classification.
    pub fn categorical_lookup(&self, key: &LookupKey) -> &IndexSet<Entity> {
        match key {
            LookupKey::Tag(tag) => self.by_tag.get(tag),
            LookupKey::Def(def) => self.by_def.get(def),
            LookupKey::Owned(faction, tag) => self.by_owner.get(&(*faction, *tag)),
        }
    }

    pub fn objects_at(&self, cell: Cell) -> &[Entity] {
        self.things_at.get(&cell).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Items queued for relocation, oldest first.
    pub fn pending_relocations(&self) -> Vec<Entity> {
        self.storage
            .pending_relocations()
            .iter()
            .filter_map(|id| entity_of(*id))
            .collect()
    }

    pub fn stack_of(&self, entity: Entity) -> Option<Stack> {
        self.world.get::<&Stack>(entity).ok().map(|s| *s)
    }

    // ── Verification and teardown ──────────────────────────────────────

    /// Recount every region's occupancy from the placed item entities and
    /// compare with the caches. Mismatches are logged and returned; the
    /// caches are left untouched.
    pub fn verify_caches(&self) -> Vec<CapacityMismatch> {
        let mut mismatches = Vec::new();
        for region in self.storage.regions() {
            let actual: usize = region
                .cells()
                .iter()
                .map(|c| self.objects_at(*c).iter().filter(|e| self.is_item(**e)).count())
                .sum();
            if let Err(err) = self.storage.verify_region(region.id, actual) {
                mismatches.push(err);
            }
            if let Err(err) = self.storage.verify_districts(region.id) {
                mismatches.push(err);
            }
        }
        mismatches
    }

    /// Drop every object and cache, e.g. before loading a new map.
    pub fn reset(&mut self) {
        self.world.clear();
        self.storage.clear();
        self.things_at.clear();
        self.by_tag.clear();
        self.by_def.clear();
        self.by_owner.clear();
        log::debug!("storage engine reset");
    }

    // ── Internals ──────────────────────────────────────────────────────

    fn def_id(&self, entity: Entity) -> Option<DefId> {
        self.world.get::<&Def>(entity).ok().map(|d| d.0)
    }

    fn placed_cell(&self, entity: Entity) -> Option<Cell> {
        self.world.get::<&Placed>(entity).ok().map(|p| p.cell)
    }

    fn is_item(&self, entity: Entity) -> bool {
        self.world.get::<&Stack>(entity).is_ok()
    }

    fn store_request(&self, entity: Entity, requester: Requester) -> Result<StoreRequest, EngineError> {
        let item = self.storable(entity).ok_or(EngineError::UnknownItem(entity))?;
        Ok(StoreRequest::new(item, requester)
            .with_current_priority(self.storage.current_priority_of(&item)))
    }

    /// Snapshot of an item entity for the caches.
    fn storable(&self, entity: Entity) -> Option<StorableItem> {
        let def = self.defs.get(self.def_id(entity)?)?;
        let stack = self.stack_of(entity)?;
        let item = StorableItem::new(item_id(entity), def, stack.count);
        Some(match stack.material {
            Some(material) => item.with_material(material),
            None => item,
        })
    }

    fn receive_item(&mut self, entity: Entity, cell: Cell) -> Option<Arrival> {
        let item = self.storable(entity)?;
        let (_, arrival) = self.storage.item_received(&item, cell)?;
        if let Arrival::StackGrowth { into } = arrival {
            self.absorb(entity, into);
        }
        Some(arrival)
    }

    fn receive_items_at(&mut self, cells: &[Cell]) {
        for &cell in cells {
            let items: Vec<Entity> = self
                .objects_at(cell)
                .iter()
                .copied()
                .filter(|e| self.is_item(*e))
                .collect();
            for entity in items {
                self.receive_item(entity, cell);
            }
        }
    }

    /// Merge `incoming` physically into the stack the cache grew.
    fn absorb(&mut self, incoming: Entity, into: ItemId) {
        let added = self.stack_of(incoming).map_or(0, |s| s.count);
        if let Some(target) = entity_of(into) {
            if let Ok(mut stack) = self.world.get::<&mut Stack>(target) {
                stack.count += added;
            }
        }
        self.detach_from_cells(incoming);
        self.unindex(incoming);
        let _ = self.world.despawn(incoming);
    }

    /// Remove the placement and per-cell entries. Returns the cells the
    /// object covered.
    fn detach_from_cells(&mut self, entity: Entity) -> Vec<Cell> {
        let Ok(placed) = self.world.remove_one::<Placed>(entity) else {
            return Vec::new();
        };
        let cells = match self.def_id(entity).and_then(|id| self.defs.get(id)) {
            Some(def) => occupied_cells(def, placed.cell),
            None => vec![placed.cell],
        };
        for cell in &cells {
            if let Some(entities) = self.things_at.get_mut(cell) {
                entities.retain(|e| *e != entity);
                if entities.is_empty() {
                    self.things_at.remove(cell);
                }
            }
        }
        cells
    }

    fn unindex(&mut self, entity: Entity) {
        let Some(def) = self.def_id(entity).and_then(|id| self.defs.get(id)) else {
            return;
        };
        self.by_tag.remove_all(def.class_tags(), &entity);
        self.by_def.remove(&def.id, &entity);
        if let Ok(owner) = self.world.get::<&Owner>(entity) {
            for &tag in def.class_tags() {
                self.by_owner.remove(&(owner.0, tag), &entity);
            }
        }
    }

    fn after_mutation(&self) {
        if self.config.verify_after_mutation {
            self.verify_caches();
        }
    }
}

fn occupied_cells(def: &ObjectDef, anchor: Cell) -> Vec<Cell> {
    match &def.storage {
        Some(props) => footprint_cells(anchor, props),
        None => vec![anchor],
    }
}
