//! Standard object catalog used by generated maps.

use stowage_logic::defs::{DefDatabase, DefId, ObjectDef, Passability, StorageProps, SurfaceType};
use stowage_logic::region::StoragePriority;

pub const STEEL: DefId = DefId(1);
pub const WOOD: DefId = DefId(2);
pub const COMPONENTS: DefId = DefId(3);
pub const MEAL: DefId = DefId(4);
pub const RIFLE: DefId = DefId(5);
pub const SHELF: DefId = DefId(10);
pub const WALL: DefId = DefId(11);
pub const WALL_FRAME: DefId = DefId(12);
pub const TABLE: DefId = DefId(13);
pub const TREE: DefId = DefId(14);
pub const COLONIST: DefId = DefId(20);

/// Item defs a generated map scatters around.
pub const ITEM_DEFS: [DefId; 5] = [STEEL, WOOD, COMPONENTS, MEAL, RIFLE];

/// Defs that block storage where they stand.
pub const BLOCKER_DEFS: [DefId; 3] = [WALL, WALL_FRAME, TREE];

pub fn standard_defs() -> DefDatabase {
    [
        ObjectDef::item(STEEL, "steel", 75),
        ObjectDef::item(WOOD, "wood", 75),
        ObjectDef::item(COMPONENTS, "components", 25),
        ObjectDef::item(MEAL, "meal", 10),
        ObjectDef::item(RIFLE, "rifle", 1),
        ObjectDef::storage_building(
            SHELF,
            "shelf",
            StorageProps {
                slots_per_cell: 3,
                footprint: (2, 1),
                default_priority: StoragePriority::Preferred,
            },
        ),
        ObjectDef::building(WALL, "wall", Passability::Impassable),
        ObjectDef::frame(WALL_FRAME, "wall frame", Passability::Impassable),
        ObjectDef::building(TABLE, "table", Passability::Impassable)
            .with_surface(SurfaceType::Eat),
        ObjectDef::plant(TREE, "tree", Passability::Impassable),
        ObjectDef::mover(COLONIST, "colonist"),
    ]
    .into_iter()
    .collect()
}
