//! Storage-specific components.

use serde::{Deserialize, Serialize};
use stowage_logic::cell::Cell;
use stowage_logic::defs::StorageProps;
use stowage_logic::region::RegionId;

/// A placed structure that owns a storage region over its footprint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageStructure {
    pub region: RegionId,
}

/// Cells covered by an object anchored at `anchor` with `props`' footprint.
pub fn footprint_cells(anchor: Cell, props: &StorageProps) -> Vec<Cell> {
    let (w, h) = props.footprint;
    let mut cells = Vec::with_capacity((w.max(1) * h.max(1)) as usize);
    for dz in 0..h.max(1) {
        for dx in 0..w.max(1) {
            cells.push(Cell::new(anchor.x + dx, anchor.y, anchor.z + dz));
        }
    }
    cells
}

#[cfg(test)]
mod tests {
    use super::*;
    use stowage_logic::region::StoragePriority;

    #[test]
    fn test_footprint_cells() {
        let props = StorageProps {
            slots_per_cell: 3,
            footprint: (2, 1),
            default_priority: StoragePriority::Preferred,
        };
        let cells = footprint_cells(Cell::new(4, 0, 7), &props);
        assert_eq!(cells, vec![Cell::new(4, 0, 7), Cell::new(5, 0, 7)]);
    }

    #[test]
    fn test_degenerate_footprint_is_one_cell() {
        let props = StorageProps {
            footprint: (0, 0),
            ..StorageProps::default()
        };
        assert_eq!(footprint_cells(Cell::flat(1, 1), &props).len(), 1);
    }
}
