//! Grid cells and map bounds.
//!
//! A [`Cell`] is a plain integer coordinate. Caches key their associations
//! by cell but never own the cell itself; the host map owns terrain.

use serde::{Deserialize, Serialize};

/// A grid coordinate. `y` is the vertical level; flat maps use `y = 0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Cell {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl Cell {
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Cell on the ground level of a flat (x, z) map.
    pub const fn flat(x: i32, z: i32) -> Self {
        Self { x, y: 0, z }
    }

    /// Squared euclidean distance. Widened to `i64` so map-scale distances
    /// never overflow.
    pub fn distance_squared(&self, other: Cell) -> i64 {
        let dx = (self.x - other.x) as i64;
        let dy = (self.y - other.y) as i64;
        let dz = (self.z - other.z) as i64;
        dx * dx + dy * dy + dz * dz
    }

    /// Row-major ordering key (level, row, column).
    pub(crate) fn row_major_key(&self) -> (i32, i32, i32) {
        (self.y, self.z, self.x)
    }
}

/// Dimensions of a map, used to index per-cell bitmaps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapSize {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl MapSize {
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Single-level map.
    pub const fn flat(x: i32, z: i32) -> Self {
        Self { x, y: 1, z }
    }

    pub fn contains(&self, cell: Cell) -> bool {
        (0..self.x).contains(&cell.x) && (0..self.y).contains(&cell.y) && (0..self.z).contains(&cell.z)
    }

    /// Dense index of `cell`, or `None` when out of bounds.
    pub fn index_of(&self, cell: Cell) -> Option<usize> {
        if !self.contains(cell) {
            return None;
        }
        let idx = (cell.y as i64 * self.z as i64 + cell.z as i64) * self.x as i64 + cell.x as i64;
        Some(idx as usize)
    }

    pub fn cell_count(&self) -> usize {
        (self.x.max(0) as usize) * (self.y.max(0) as usize) * (self.z.max(0) as usize)
    }

    /// All cells in row-major order.
    pub fn cells(&self) -> impl Iterator<Item = Cell> + '_ {
        (0..self.y).flat_map(move |y| {
            (0..self.z).flat_map(move |z| (0..self.x).map(move |x| Cell::new(x, y, z)))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance_squared() {
        let a = Cell::new(0, 0, 0);
        let b = Cell::new(3, 0, 4);
        assert_eq!(a.distance_squared(b), 25);
        assert_eq!(b.distance_squared(a), 25);
        assert_eq!(a.distance_squared(a), 0);
    }

    #[test]
    fn test_distance_does_not_overflow() {
        let a = Cell::flat(i32::MIN / 2, 0);
        let b = Cell::flat(i32::MAX / 2, 0);
        assert!(a.distance_squared(b) > 0);
    }

    #[test]
    fn test_index_of_is_dense_and_unique() {
        let size = MapSize::new(4, 2, 3);
        let mut seen = std::collections::HashSet::new();
        for cell in size.cells() {
            let idx = size.index_of(cell).unwrap();
            assert!(idx < size.cell_count());
            assert!(seen.insert(idx), "index {idx} reused");
        }
        assert_eq!(seen.len(), 24);
    }

    #[test]
    fn test_out_of_bounds() {
        let size = MapSize::flat(10, 10);
        assert_eq!(size.index_of(Cell::flat(-1, 0)), None);
        assert_eq!(size.index_of(Cell::flat(10, 0)), None);
        assert_eq!(size.index_of(Cell::new(0, 1, 0)), None);
        assert!(size.contains(Cell::flat(9, 9)));
    }
}
