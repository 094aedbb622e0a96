//! Components shared by every mirrored object.

use serde::{Deserialize, Serialize};
use stowage_logic::cell::Cell;
use stowage_logic::defs::{DefId, FactionId};

/// Definition the object was spawned from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Def(pub DefId);

/// Stack size and material of an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stack {
    pub count: u32,
    pub material: Option<DefId>,
}

impl Stack {
    pub fn new(count: u32) -> Self {
        Self {
            count,
            material: None,
        }
    }

    pub fn with_material(mut self, material: DefId) -> Self {
        self.material = Some(material);
        self
    }
}

/// Owning faction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Owner(pub FactionId);

/// Anchor cell of a placed object. Absent while carried or unspawned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Placed {
    pub cell: Cell,
}

/// Marker: the object makes its cell unusable for storage. Classified once
/// at spawn from the def.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlocksStorage;
