//! Stowage Core - per-map storage engine
//!
//! Mirrors the host simulation's objects as ECS entities and keeps the
//! storage caches of `stowage-logic` in step with them, so that "where
//! should this item go" is answered without rescanning the map.
//!
//! # Architecture
//!
//! The engine uses an Entity Component System (ECS) via `hecs`:
//! - **Entities**: items, storage structures, blockers, movers
//! - **Components**: pure data (Def, Stack, Owner, Placed, StorageStructure)
//! - **Engine**: consumes lifecycle events and answers storage queries
//!
//! # Example
//!
//! ```rust
//! use stowage_core::prelude::*;
//! use stowage_core::generation::{standard_defs, STEEL};
//! use stowage_logic::cell::{Cell, MapSize};
//! use stowage_logic::config::StowageConfig;
//! use stowage_logic::region::StorageSettings;
//! use stowage_logic::search::Requester;
//!
//! let terrain = OpenTerrain::new(MapSize::flat(32, 32));
//! let mut engine =
//!     StowageEngine::new(standard_defs(), Box::new(terrain), StowageConfig::default()).unwrap();
//! let zone = engine
//!     .add_zone(vec![Cell::flat(3, 3), Cell::flat(4, 3)], StorageSettings::default())
//!     .unwrap();
//!
//! let steel = engine.object_spawned(Spawn::item(STEEL, 20)).unwrap();
//! engine.object_placed_at_cell(steel, Cell::flat(10, 10)).unwrap();
//!
//! let target = engine
//!     .find_best_cell(steel, Requester::at(Cell::flat(10, 10)), None)
//!     .unwrap()
//!     .unwrap();
//! assert_eq!(target.region, zone);
//! ```

pub mod components;
pub mod engine;
pub mod events;
pub mod generation;
pub mod terrain;

/// Commonly used types for convenient importing
pub mod prelude {
    pub use crate::components::*;
    pub use crate::engine::{EngineError, LookupKey, Spawn, StowageEngine};
    pub use crate::events::MapEvent;
    pub use crate::terrain::{FactionRelations, GridTerrain, OpenTerrain, Terrain};
}
