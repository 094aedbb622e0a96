//! Host terrain and faction relations, as seen by the search.

use std::collections::HashSet;

use stowage_logic::cell::{Cell, MapSize};
use stowage_logic::defs::FactionId;

/// The map's terrain grid. Owned by the host; the engine only asks.
pub trait Terrain {
    fn size(&self) -> MapSize;

    /// Whether movers can stand on `cell`.
    fn is_passable(&self, cell: Cell) -> bool;
}

/// Flat, fully passable terrain.
#[derive(Debug, Clone, Copy)]
pub struct OpenTerrain {
    size: MapSize,
}

impl OpenTerrain {
    pub fn new(size: MapSize) -> Self {
        Self { size }
    }
}

impl Terrain for OpenTerrain {
    fn size(&self) -> MapSize {
        self.size
    }

    fn is_passable(&self, cell: Cell) -> bool {
        self.size.contains(cell)
    }
}

/// Terrain with impassable rock cells.
#[derive(Debug, Clone)]
pub struct GridTerrain {
    size: MapSize,
    rock: HashSet<Cell>,
}

impl GridTerrain {
    pub fn new(size: MapSize) -> Self {
        Self {
            size,
            rock: HashSet::new(),
        }
    }

    pub fn set_rock(&mut self, cell: Cell, rock: bool) {
        if rock {
            self.rock.insert(cell);
        } else {
            self.rock.remove(&cell);
        }
    }

    pub fn rock_count(&self) -> usize {
        self.rock.len()
    }
}

impl Terrain for GridTerrain {
    fn size(&self) -> MapSize {
        self.size
    }

    fn is_passable(&self, cell: Cell) -> bool {
        self.size.contains(cell) && !self.rock.contains(&cell)
    }
}

/// Symmetric hostility between factions. Unlisted pairs are neutral.
#[derive(Debug, Clone, Default)]
pub struct FactionRelations {
    hostile: HashSet<(FactionId, FactionId)>,
}

impl FactionRelations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_hostile(&mut self, a: FactionId, b: FactionId, hostile: bool) {
        let key = (a.min(b), a.max(b));
        if hostile {
            self.hostile.insert(key);
        } else {
            self.hostile.remove(&key);
        }
    }

    pub fn is_hostile(&self, a: FactionId, b: FactionId) -> bool {
        self.hostile.contains(&(a.min(b), a.max(b)))
    }
}
