//! Inbound lifecycle events as data.
//!
//! Hosts that already have an event bus can forward each notification as a
//! [`MapEvent`] instead of calling the engine methods one by one.

use hecs::Entity;
use stowage_logic::cell::Cell;
use stowage_logic::region::{RegionId, StorageSettings};

use crate::engine::{EngineError, Spawn, StowageEngine};

#[derive(Debug, Clone, PartialEq)]
pub enum MapEvent {
    Spawned(Spawn),
    Despawned(Entity),
    PlacedAtCell { entity: Entity, cell: Cell },
    RemovedFromCell { entity: Entity, cell: Cell },
    RegionCellAdded { region: RegionId, cell: Cell },
    RegionCellRemoved { region: RegionId, cell: Cell },
    AcceptanceSettingsChanged { region: RegionId, settings: StorageSettings },
}

impl StowageEngine {
    /// Apply one event. Returns the new entity for [`MapEvent::Spawned`].
    pub fn handle(&mut self, event: MapEvent) -> Result<Option<Entity>, EngineError> {
        match event {
            MapEvent::Spawned(spawn) => return self.object_spawned(spawn).map(Some),
            MapEvent::Despawned(entity) => self.object_despawned(entity)?,
            MapEvent::PlacedAtCell { entity, cell } => {
                self.object_placed_at_cell(entity, cell)?;
            }
            MapEvent::RemovedFromCell { entity, cell } => {
                self.object_removed_from_cell(entity, cell)?
            }
            MapEvent::RegionCellAdded { region, cell } => self.region_cell_added(region, cell)?,
            MapEvent::RegionCellRemoved { region, cell } => {
                self.region_cell_removed(region, cell)?;
            }
            MapEvent::AcceptanceSettingsChanged { region, settings } => {
                self.acceptance_settings_changed(region, settings)?;
            }
        }
        Ok(None)
    }

    /// Apply events in order, stopping at the first error.
    pub fn handle_all(
        &mut self,
        events: impl IntoIterator<Item = MapEvent>,
    ) -> Result<Vec<Entity>, EngineError> {
        let mut spawned = Vec::new();
        for event in events {
            if let Some(entity) = self.handle(event)? {
                spawned.push(entity);
            }
        }
        Ok(spawned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::terrain::OpenTerrain;
    use stowage_logic::cell::MapSize;
    use stowage_logic::config::StowageConfig;
    use stowage_logic::defs::{DefDatabase, DefId, ObjectDef};

    fn engine() -> StowageEngine {
        let defs: DefDatabase = [ObjectDef::item(DefId(1), "steel", 75)].into_iter().collect();
        StowageEngine::new(
            defs,
            Box::new(OpenTerrain::new(MapSize::flat(16, 16))),
            StowageConfig::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_event_stream_stores_item() {
        let mut engine = engine();
        let zone = engine
            .add_zone(vec![Cell::flat(2, 2)], StorageSettings::default())
            .unwrap();
        let spawned = engine
            .handle_all([MapEvent::Spawned(Spawn::item(DefId(1), 10))])
            .unwrap();
        let item = spawned[0];
        engine
            .handle(MapEvent::PlacedAtCell {
                entity: item,
                cell: Cell::flat(2, 2),
            })
            .unwrap();
        assert_eq!(engine.current_storage_of(item), Some(zone));

        engine.handle(MapEvent::Despawned(item)).unwrap();
        assert_eq!(engine.current_storage_of(item), None);
        assert!(engine.verify_caches().is_empty());
    }

    #[test]
    fn test_unknown_def_is_error() {
        let mut engine = engine();
        let err = engine
            .handle(MapEvent::Spawned(Spawn::object(DefId(99))))
            .unwrap_err();
        assert_eq!(err, EngineError::UnknownDef(DefId(99)));
    }
}
