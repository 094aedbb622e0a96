//! Object definitions and their static classification.
//!
//! Every object on the map is an instance of an [`ObjectDef`]. Anything the
//! caches need to know about a kind of object (whether it blocks storage,
//! which classification buckets it belongs to, how large its stacks get) is
//! computed once here when the def is built, never per instance.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::region::StoragePriority;

/// Identity of an object definition. Doubles as the item category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DefId(pub u32);

/// A faction that can own objects and storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FactionId(pub u32);

/// How movers interact with the cell an object stands on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Passability {
    Standable,
    PassThroughOnly,
    Impassable,
}

/// Whether items can rest on top of the object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SurfaceType {
    None,
    Item,
    Eat,
}

/// Broad kind of an object definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObjectKind {
    Item,
    Building,
    /// A construction site; `finished` is the passability of the result.
    Frame { finished: Passability },
    Plant,
    Mover,
}

/// Classification tag. Objects are indexed under their leaf tag and every
/// ancestor of it, so "all buildings" includes storage and frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ClassTag {
    Thing,
    Item,
    Building,
    Storage,
    Frame,
    Plant,
    Mover,
}

impl ClassTag {
    pub fn parent(self) -> Option<ClassTag> {
        match self {
            ClassTag::Thing => None,
            ClassTag::Item | ClassTag::Building | ClassTag::Plant | ClassTag::Mover => {
                Some(ClassTag::Thing)
            }
            ClassTag::Storage | ClassTag::Frame => Some(ClassTag::Building),
        }
    }

    /// This tag followed by all of its ancestors up to [`ClassTag::Thing`].
    pub fn with_ancestors(self) -> Vec<ClassTag> {
        let mut tags = vec![self];
        let mut current = self;
        while let Some(parent) = current.parent() {
            tags.push(parent);
            current = parent;
        }
        tags
    }
}

/// Storage properties of a structure that holds items (shelves, racks).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageProps {
    /// Distinct stacks each footprint cell can hold.
    pub slots_per_cell: u32,
    /// Footprint size along x and z, anchored at the placement cell.
    pub footprint: (i32, i32),
    pub default_priority: StoragePriority,
}

impl Default for StorageProps {
    fn default() -> Self {
        Self {
            slots_per_cell: 1,
            footprint: (1, 1),
            default_priority: StoragePriority::Normal,
        }
    }
}

/// Static definition shared by every instance of one kind of object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectDef {
    pub id: DefId,
    pub label: String,
    pub kind: ObjectKind,
    pub passability: Passability,
    pub surface: SurfaceType,
    /// Maximum stack size. Non-items use 1.
    pub stack_limit: u32,
    pub storage: Option<StorageProps>,
    class_tags: Vec<ClassTag>,
}

impl ObjectDef {
    fn new(id: DefId, label: impl Into<String>, kind: ObjectKind) -> Self {
        let mut def = Self {
            id,
            label: label.into(),
            kind,
            passability: Passability::Standable,
            surface: SurfaceType::None,
            stack_limit: 1,
            storage: None,
            class_tags: Vec::new(),
        };
        def.refresh_tags();
        def
    }

    pub fn item(id: DefId, label: impl Into<String>, stack_limit: u32) -> Self {
        let mut def = Self::new(id, label, ObjectKind::Item);
        def.stack_limit = stack_limit.max(1);
        def
    }

    pub fn building(id: DefId, label: impl Into<String>, passability: Passability) -> Self {
        let mut def = Self::new(id, label, ObjectKind::Building);
        def.passability = passability;
        def
    }

    pub fn storage_building(id: DefId, label: impl Into<String>, props: StorageProps) -> Self {
        let mut def = Self::new(id, label, ObjectKind::Building);
        def.passability = Passability::PassThroughOnly;
        def.surface = SurfaceType::Item;
        def.storage = Some(props);
        def.refresh_tags();
        def
    }

    pub fn frame(id: DefId, label: impl Into<String>, finished: Passability) -> Self {
        Self::new(id, label, ObjectKind::Frame { finished })
    }

    pub fn plant(id: DefId, label: impl Into<String>, passability: Passability) -> Self {
        let mut def = Self::new(id, label, ObjectKind::Plant);
        def.passability = passability;
        def
    }

    pub fn mover(id: DefId, label: impl Into<String>) -> Self {
        Self::new(id, label, ObjectKind::Mover)
    }

    pub fn with_surface(mut self, surface: SurfaceType) -> Self {
        self.surface = surface;
        self
    }

    pub fn is_item(&self) -> bool {
        self.kind == ObjectKind::Item
    }

    /// Precomputed classification tags, leaf first.
    pub fn class_tags(&self) -> &[ClassTag] {
        &self.class_tags
    }

    pub fn leaf_tag(&self) -> ClassTag {
        match self.kind {
            ObjectKind::Item => ClassTag::Item,
            ObjectKind::Building if self.storage.is_some() => ClassTag::Storage,
            ObjectKind::Building => ClassTag::Building,
            ObjectKind::Frame { .. } => ClassTag::Frame,
            ObjectKind::Plant => ClassTag::Plant,
            ObjectKind::Mover => ClassTag::Mover,
        }
    }

    /// Whether an instance of this def makes its cell permanently unusable
    /// for storage: impassable non-surface structures, and frames that will
    /// become impassable when finished.
    pub fn blocks_storage(&self) -> bool {
        match self.kind {
            ObjectKind::Item | ObjectKind::Mover => false,
            ObjectKind::Frame { finished } => finished == Passability::Impassable,
            ObjectKind::Building | ObjectKind::Plant => {
                self.passability == Passability::Impassable
                    && self.surface == SurfaceType::None
                    && self.storage.is_none()
            }
        }
    }

    fn refresh_tags(&mut self) {
        self.class_tags = self.leaf_tag().with_ancestors();
    }
}

/// Registry of all object definitions known to a map.
#[derive(Debug, Clone, Default)]
pub struct DefDatabase {
    defs: HashMap<DefId, ObjectDef>,
}

impl DefDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a def, replacing any previous def with the same id.
    pub fn insert(&mut self, def: ObjectDef) {
        self.defs.insert(def.id, def);
    }

    pub fn get(&self, id: DefId) -> Option<&ObjectDef> {
        self.defs.get(&id)
    }

    pub fn len(&self) -> usize {
        self.defs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ObjectDef> {
        self.defs.values()
    }
}

impl FromIterator<ObjectDef> for DefDatabase {
    fn from_iter<I: IntoIterator<Item = ObjectDef>>(iter: I) -> Self {
        let mut db = DefDatabase::new();
        for def in iter {
            db.insert(def);
        }
        db
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wall_blocks_storage() {
        let wall = ObjectDef::building(DefId(1), "wall", Passability::Impassable);
        assert!(wall.blocks_storage());
    }

    #[test]
    fn test_impassable_surface_does_not_block() {
        let table = ObjectDef::building(DefId(2), "table", Passability::Impassable)
            .with_surface(SurfaceType::Eat);
        assert!(!table.blocks_storage(), "items can rest on a table");
    }

    #[test]
    fn test_shelf_does_not_block() {
        let shelf = ObjectDef::storage_building(DefId(3), "shelf", StorageProps::default());
        assert!(!shelf.blocks_storage());
        assert_eq!(shelf.leaf_tag(), ClassTag::Storage);
    }

    #[test]
    fn test_frame_blocks_only_if_finished_impassable() {
        let wall_frame = ObjectDef::frame(DefId(4), "wall frame", Passability::Impassable);
        let floor_frame = ObjectDef::frame(DefId(5), "floor frame", Passability::Standable);
        assert!(wall_frame.blocks_storage());
        assert!(!floor_frame.blocks_storage());
    }

    #[test]
    fn test_items_and_movers_never_block() {
        assert!(!ObjectDef::item(DefId(6), "steel", 75).blocks_storage());
        assert!(!ObjectDef::mover(DefId(7), "hauler").blocks_storage());
    }

    #[test]
    fn test_class_tags_include_ancestors() {
        let shelf = ObjectDef::storage_building(DefId(3), "shelf", StorageProps::default());
        assert_eq!(
            shelf.class_tags(),
            &[ClassTag::Storage, ClassTag::Building, ClassTag::Thing]
        );
        let steel = ObjectDef::item(DefId(6), "steel", 75);
        assert_eq!(steel.class_tags(), &[ClassTag::Item, ClassTag::Thing]);
    }

    #[test]
    fn test_item_stack_limit_at_least_one() {
        let def = ObjectDef::item(DefId(8), "odd", 0);
        assert_eq!(def.stack_limit, 1);
    }

    #[test]
    fn test_database_lookup() {
        let db: DefDatabase = [
            ObjectDef::item(DefId(1), "steel", 75),
            ObjectDef::building(DefId(2), "wall", Passability::Impassable),
        ]
        .into_iter()
        .collect();
        assert_eq!(db.len(), 2);
        assert_eq!(db.get(DefId(1)).map(|d| d.label.as_str()), Some("steel"));
        assert!(db.get(DefId(99)).is_none());
    }
}
