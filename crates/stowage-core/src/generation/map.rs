//! Map generation - random zones, shelves, blockers and loose items

use hecs::Entity;
use rand::Rng;
use serde::{Deserialize, Serialize};
use stowage_logic::cell::{Cell, MapSize};
use stowage_logic::config::StowageConfig;
use stowage_logic::defs::FactionId;
use stowage_logic::region::{RegionId, StoragePriority, StorageSettings};

use super::catalog::*;
use crate::engine::{EngineError, Spawn, StowageEngine};
use crate::terrain::GridTerrain;

/// Configuration for map generation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MapConfig {
    pub width: i32,
    pub depth: i32,
    /// Storage zones to attempt; overlapping attempts are dropped
    pub zones: u32,
    pub zone_min: i32,
    pub zone_max: i32,
    pub shelves: u32,
    /// Fraction of cells that are impassable rock
    pub rock_fraction: f64,
    pub blockers: u32,
    pub items: u32,
    /// Shelves are owned by factions 1..=factions
    pub factions: u32,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            width: 200,
            depth: 200,
            zones: 12,
            zone_min: 8,
            zone_max: 40,
            shelves: 60,
            rock_fraction: 0.02,
            blockers: 400,
            items: 3000,
            factions: 2,
        }
    }
}

impl MapConfig {
    pub fn size(&self) -> MapSize {
        MapSize::flat(self.width, self.depth)
    }
}

/// Handles to what was generated
#[derive(Debug, Clone, Default)]
pub struct GeneratedMap {
    pub zones: Vec<RegionId>,
    pub shelves: Vec<Entity>,
    pub blockers: Vec<Entity>,
    /// Items still alive after placement; merged stacks are not listed
    pub items: Vec<Entity>,
}

const ZONE_PRIORITIES: [StoragePriority; 4] = [
    StoragePriority::Low,
    StoragePriority::Normal,
    StoragePriority::Important,
    StoragePriority::Critical,
];

fn random_cell(config: &MapConfig, rng: &mut impl Rng) -> Cell {
    Cell::flat(rng.gen_range(0..config.width), rng.gen_range(0..config.depth))
}

/// Terrain with randomly scattered rock
pub fn generate_terrain(config: &MapConfig, rng: &mut impl Rng) -> GridTerrain {
    let mut terrain = GridTerrain::new(config.size());
    for cell in config.size().cells() {
        if rng.gen_bool(config.rock_fraction.clamp(0.0, 1.0)) {
            terrain.set_rock(cell, true);
        }
    }
    terrain
}

/// Build an engine over generated terrain and populate it
pub fn generate_engine(
    config: &MapConfig,
    stowage: StowageConfig,
    rng: &mut impl Rng,
) -> Result<(StowageEngine, GeneratedMap), EngineError> {
    let terrain = generate_terrain(config, rng);
    let mut engine = StowageEngine::new(standard_defs(), Box::new(terrain), stowage)?;
    let map = populate_map(&mut engine, config, rng)?;
    Ok((engine, map))
}

/// Scatter zones, shelves, blockers and items over an existing engine
pub fn populate_map(
    engine: &mut StowageEngine,
    config: &MapConfig,
    rng: &mut impl Rng,
) -> Result<GeneratedMap, EngineError> {
    let mut map = GeneratedMap::default();

    for _ in 0..config.zones * 4 {
        if map.zones.len() as u32 >= config.zones {
            break;
        }
        let w = rng.gen_range(config.zone_min..=config.zone_max).min(config.width);
        let h = rng.gen_range(config.zone_min..=config.zone_max).min(config.depth);
        let x0 = rng.gen_range(0..=config.width - w);
        let z0 = rng.gen_range(0..=config.depth - h);
        let cells: Vec<Cell> = (z0..z0 + h)
            .flat_map(|z| (x0..x0 + w).map(move |x| Cell::flat(x, z)))
            .collect();
        if cells.iter().any(|c| engine.storage().region_at(*c).is_some()) {
            continue;
        }
        let priority = ZONE_PRIORITIES[rng.gen_range(0..ZONE_PRIORITIES.len())];
        map.zones
            .push(engine.add_zone(cells, StorageSettings::new(priority))?);
    }

    for _ in 0..config.shelves {
        let anchor = Cell::flat(rng.gen_range(0..config.width - 1), rng.gen_range(0..config.depth));
        let footprint = [anchor, Cell::flat(anchor.x + 1, anchor.z)];
        if footprint.iter().any(|c| engine.storage().region_at(*c).is_some()) {
            continue;
        }
        let mut spawn = Spawn::object(SHELF);
        if config.factions > 0 {
            spawn = spawn.owned_by(FactionId(rng.gen_range(1..=config.factions)));
        }
        let shelf = engine.object_spawned(spawn)?;
        engine.object_placed_at_cell(shelf, anchor)?;
        map.shelves.push(shelf);
    }

    for _ in 0..config.blockers {
        let def = BLOCKER_DEFS[rng.gen_range(0..BLOCKER_DEFS.len())];
        let blocker = engine.object_spawned(Spawn::object(def))?;
        engine.object_placed_at_cell(blocker, random_cell(config, rng))?;
        map.blockers.push(blocker);
    }

    for _ in 0..config.items {
        let def = ITEM_DEFS[rng.gen_range(0..ITEM_DEFS.len())];
        let limit = engine.defs().get(def).map_or(1, |d| d.stack_limit);
        let item = engine.object_spawned(Spawn::item(def, rng.gen_range(1..=limit)))?;
        engine.object_placed_at_cell(item, random_cell(config, rng))?;
        if engine.world.contains(item) {
            map.items.push(item);
        }
    }

    log::debug!(
        "generated map: {} zones, {} shelves, {} blockers, {} items",
        map.zones.len(),
        map.shelves.len(),
        map.blockers.len(),
        map.items.len()
    );
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn small() -> MapConfig {
        MapConfig {
            width: 60,
            depth: 60,
            zones: 4,
            zone_min: 4,
            zone_max: 12,
            shelves: 10,
            blockers: 40,
            items: 300,
            ..MapConfig::default()
        }
    }

    #[test]
    fn test_generated_map_is_consistent() {
        let mut rng = StdRng::seed_from_u64(42);
        let (engine, map) = generate_engine(&small(), StowageConfig::default(), &mut rng).unwrap();
        assert!(!map.zones.is_empty());
        assert!(!map.items.is_empty());
        assert!(engine.verify_caches().is_empty(), "caches must match ground truth");
    }

    #[test]
    fn test_generation_is_deterministic() {
        let mut a = StdRng::seed_from_u64(7);
        let mut b = StdRng::seed_from_u64(7);
        let (_, first) = generate_engine(&small(), StowageConfig::default(), &mut a).unwrap();
        let (_, second) = generate_engine(&small(), StowageConfig::default(), &mut b).unwrap();
        assert_eq!(first.zones, second.zones);
        assert_eq!(first.items.len(), second.items.len());
    }
}
