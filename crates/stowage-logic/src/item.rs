//! Storable items as seen by the capacity caches.

use serde::{Deserialize, Serialize};

use crate::defs::{DefId, ObjectDef};

/// Stable identity of a storable item. Hosts derive it from their own
/// object handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ItemId(pub u64);

/// Snapshot of one item stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorableItem {
    pub id: ItemId,
    /// Category of the item (its definition).
    pub def: DefId,
    /// Material the item is made from, if any. Stacks never mix materials.
    pub material: Option<DefId>,
    pub stack_count: u32,
    pub stack_limit: u32,
}

impl StorableItem {
    pub fn new(id: ItemId, def: &ObjectDef, stack_count: u32) -> Self {
        Self {
            id,
            def: def.id,
            material: None,
            stack_count,
            stack_limit: def.stack_limit,
        }
    }

    pub fn with_material(mut self, material: DefId) -> Self {
        self.material = Some(material);
        self
    }

    /// Whether `other` could merge into the same stack as this item.
    /// Capacity is not considered; see [`StorableItem::room_left`].
    pub fn can_stack_with(&self, other: &StorableItem) -> bool {
        self.id != other.id
            && self.def == other.def
            && self.material == other.material
            && self.stack_limit > 1
    }

    pub fn room_left(&self) -> u32 {
        self.stack_limit.saturating_sub(self.stack_count)
    }

    pub fn has_room(&self) -> bool {
        self.room_left() > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn steel() -> ObjectDef {
        ObjectDef::item(DefId(1), "steel", 75)
    }

    #[test]
    fn test_same_def_stacks() {
        let a = StorableItem::new(ItemId(1), &steel(), 10);
        let b = StorableItem::new(ItemId(2), &steel(), 20);
        assert!(a.can_stack_with(&b));
        assert!(b.can_stack_with(&a));
    }

    #[test]
    fn test_never_stacks_with_self() {
        let a = StorableItem::new(ItemId(1), &steel(), 10);
        assert!(!a.can_stack_with(&a));
    }

    #[test]
    fn test_material_mismatch_does_not_stack() {
        let a = StorableItem::new(ItemId(1), &steel(), 10).with_material(DefId(50));
        let b = StorableItem::new(ItemId(2), &steel(), 10).with_material(DefId(51));
        assert!(!a.can_stack_with(&b));
    }

    #[test]
    fn test_unstackable_def() {
        let rifle = ObjectDef::item(DefId(2), "rifle", 1);
        let a = StorableItem::new(ItemId(1), &rifle, 1);
        let b = StorableItem::new(ItemId(2), &rifle, 1);
        assert!(!a.can_stack_with(&b));
    }

    #[test]
    fn test_room_left() {
        let full = StorableItem::new(ItemId(1), &steel(), 75);
        let partial = StorableItem::new(ItemId(2), &steel(), 70);
        assert!(!full.has_room());
        assert_eq!(partial.room_left(), 5);
    }
}
