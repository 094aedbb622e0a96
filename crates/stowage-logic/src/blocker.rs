//! Per-map bitmap of cells that can never hold storage.
//!
//! A cell is blocked while at least one object classified by
//! [`ObjectDef::blocks_storage`] stands on it. The bit turns a per-request
//! "is this cell physically storable" check into a single lookup. Clearing
//! the bit on removal needs a rescan of the objects still at the cell, which
//! is bounded by local density rather than map size.

use crate::cell::{Cell, MapSize};
use crate::defs::ObjectDef;

const WORD_BITS: usize = 64;

/// Bitmap over every cell of one map.
#[derive(Debug, Clone)]
pub struct BlockerIndex {
    size: MapSize,
    words: Vec<u64>,
    blocked_count: usize,
}

impl BlockerIndex {
    pub fn new(size: MapSize) -> Self {
        let words = size.cell_count().div_ceil(WORD_BITS);
        Self {
            size,
            words: vec![0; words],
            blocked_count: 0,
        }
    }

    pub fn size(&self) -> MapSize {
        self.size
    }

    /// Out-of-bounds cells are never blocked.
    pub fn is_blocked(&self, cell: Cell) -> bool {
        match self.size.index_of(cell) {
            Some(idx) => self.words[idx / WORD_BITS] & (1 << (idx % WORD_BITS)) != 0,
            None => false,
        }
    }

    /// Set or clear the bit for `cell`. Idempotent; out-of-bounds is a no-op.
    pub fn set_blocked(&mut self, cell: Cell, blocked: bool) {
        let Some(idx) = self.size.index_of(cell) else {
            return;
        };
        let word = &mut self.words[idx / WORD_BITS];
        let mask = 1u64 << (idx % WORD_BITS);
        let was = *word & mask != 0;
        if blocked && !was {
            *word |= mask;
            self.blocked_count += 1;
        } else if !blocked && was {
            *word &= !mask;
            self.blocked_count -= 1;
        }
    }

    /// A blocker was placed at `cell`.
    pub fn on_blocker_placed(&mut self, cell: Cell, def: &ObjectDef) {
        if def.blocks_storage() {
            self.set_blocked(cell, true);
        }
    }

    /// A blocker left `cell`. `remaining` are the defs of every object still
    /// at the cell; the bit stays set if any of them is also a blocker.
    pub fn on_blocker_removed<'a>(
        &mut self,
        cell: Cell,
        remaining: impl IntoIterator<Item = &'a ObjectDef>,
    ) {
        let still_blocked = remaining.into_iter().any(ObjectDef::blocks_storage);
        self.set_blocked(cell, still_blocked);
    }

    /// Number of blocked cells.
    pub fn blocked_count(&self) -> usize {
        self.blocked_count
    }

    /// Drop all bits, e.g. when a new map is loaded.
    pub fn clear(&mut self) {
        self.words.iter_mut().for_each(|w| *w = 0);
        self.blocked_count = 0;
    }
}
