//! Integer world-grid addressing: cells, chunks and cell bounds.

use kurbo::Point;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Width and height of one chunk (and its tile bitmap) in cells.
pub const CHUNK_SIZE: i32 = 64;

/// Round half toward positive infinity (`-2.5 -> -2`, `2.5 -> 3`).
pub(crate) fn round_half_up(v: f64) -> f64 {
    (v + 0.5).floor()
}

/// An integer grid-cell address in world space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct WorldPosition {
    pub x: i32,
    pub y: i32,
}

impl WorldPosition {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// The cell containing a fractional world point.
    pub fn floor(point: Point) -> Self {
        Self {
            x: point.x.floor() as i32,
            y: point.y.floor() as i32,
        }
    }

    /// The cell nearest to a fractional world point.
    pub fn round(point: Point) -> Self {
        Self {
            x: round_half_up(point.x) as i32,
            y: round_half_up(point.y) as i32,
        }
    }

    /// The chunk this cell belongs to.
    pub fn chunk(self) -> ChunkKey {
        ChunkKey {
            x: self.x.div_euclid(CHUNK_SIZE),
            y: self.y.div_euclid(CHUNK_SIZE),
        }
    }

    /// Offset of this cell inside its chunk, always in `0..CHUNK_SIZE`.
    pub fn local(self) -> (usize, usize) {
        (
            self.x.rem_euclid(CHUNK_SIZE) as usize,
            self.y.rem_euclid(CHUNK_SIZE) as usize,
        )
    }

    /// Top-left corner of the cell as a world point.
    pub fn to_point(self) -> Point {
        Point::new(f64::from(self.x), f64::from(self.y))
    }
}

/// Identifies one fixed-size square tile of the world grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct ChunkKey {
    pub x: i32,
    pub y: i32,
}

impl ChunkKey {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// The world cell at this chunk's top-left corner.
    pub fn origin(self) -> WorldPosition {
        WorldPosition::new(self.x * CHUNK_SIZE, self.y * CHUNK_SIZE)
    }

    /// Parse the `"x:y"` form used on the realtime feed.
    pub fn parse(s: &str) -> Option<Self> {
        let (x, y) = s.split_once(':')?;
        Some(Self {
            x: x.trim().parse().ok()?,
            y: y.trim().parse().ok()?,
        })
    }

    /// Chebyshev distance in chunks.
    pub fn distance(self, other: ChunkKey) -> u32 {
        self.x.abs_diff(other.x).max(self.y.abs_diff(other.y))
    }
}

impl fmt::Display for ChunkKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.x, self.y)
    }
}

/// Inclusive axis-aligned box of cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CellBounds {
    pub min: WorldPosition,
    pub max: WorldPosition,
}

impl CellBounds {
    /// Box spanned by two opposite corners, in any order.
    pub fn from_corners(a: WorldPosition, b: WorldPosition) -> Self {
        Self {
            min: WorldPosition::new(a.x.min(b.x), a.y.min(b.y)),
            max: WorldPosition::new(a.x.max(b.x), a.y.max(b.y)),
        }
    }

    /// Smallest box containing every cell, or `None` for no cells.
    pub fn enclosing<'a>(cells: impl IntoIterator<Item = &'a WorldPosition>) -> Option<Self> {
        let mut iter = cells.into_iter();
        let first = *iter.next()?;
        Some(iter.fold(Self { min: first, max: first }, |acc, p| Self {
            min: WorldPosition::new(acc.min.x.min(p.x), acc.min.y.min(p.y)),
            max: WorldPosition::new(acc.max.x.max(p.x), acc.max.y.max(p.y)),
        }))
    }

    pub fn width(&self) -> u32 {
        self.max.x.abs_diff(self.min.x) + 1
    }

    pub fn height(&self) -> u32 {
        self.max.y.abs_diff(self.min.y) + 1
    }

    pub fn contains(&self, p: WorldPosition) -> bool {
        (self.min.x..=self.max.x).contains(&p.x) && (self.min.y..=self.max.y).contains(&p.y)
    }

    /// Every chunk overlapping this box, row-major.
    pub fn chunks(&self) -> Vec<ChunkKey> {
        let lo = self.min.chunk();
        let hi = self.max.chunk();
        (lo.y..=hi.y)
            .flat_map(|cy| (lo.x..=hi.x).map(move |cx| ChunkKey::new(cx, cy)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_of_negative_cells() {
        assert_eq!(WorldPosition::new(-1, -1).chunk(), ChunkKey::new(-1, -1));
        assert_eq!(WorldPosition::new(-CHUNK_SIZE, 0).chunk(), ChunkKey::new(-1, 0));
        assert_eq!(WorldPosition::new(-CHUNK_SIZE - 1, 0).chunk(), ChunkKey::new(-2, 0));
        assert_eq!(WorldPosition::new(CHUNK_SIZE - 1, CHUNK_SIZE).chunk(), ChunkKey::new(0, 1));
    }

    #[test]
    fn test_local_offset_is_in_range() {
        let p = WorldPosition::new(-1, -CHUNK_SIZE - 3);
        let (lx, ly) = p.local();
        assert_eq!(lx, (CHUNK_SIZE - 1) as usize);
        assert_eq!(ly, (CHUNK_SIZE - 3) as usize);

        let origin = p.chunk().origin();
        assert_eq!(origin.x + lx as i32, p.x);
        assert_eq!(origin.y + ly as i32, p.y);
    }

    #[test]
    fn test_floor_and_round() {
        let p = Point::new(-0.5, 2.5);
        assert_eq!(WorldPosition::floor(p), WorldPosition::new(-1, 2));
        assert_eq!(WorldPosition::round(p), WorldPosition::new(0, 3));
        assert_eq!(WorldPosition::round(Point::new(-2.5, -2.6)), WorldPosition::new(-2, -3));
    }

    #[test]
    fn test_chunk_key_wire_form() {
        let key = ChunkKey::new(-3, 7);
        assert_eq!(key.to_string(), "-3:7");
        assert_eq!(ChunkKey::parse("-3:7"), Some(key));
        assert_eq!(ChunkKey::parse("nope"), None);
        assert_eq!(ChunkKey::parse("1:"), None);
    }

    #[test]
    fn test_bounds_enclosing() {
        let cells = [
            WorldPosition::new(3, -1),
            WorldPosition::new(-2, 4),
            WorldPosition::new(0, 0),
        ];
        let b = CellBounds::enclosing(&cells).unwrap();
        assert_eq!(b.min, WorldPosition::new(-2, -1));
        assert_eq!(b.max, WorldPosition::new(3, 4));
        assert_eq!(b.width(), 6);
        assert_eq!(b.height(), 6);
        assert!(CellBounds::enclosing(&Vec::<WorldPosition>::new()).is_none());
    }

    #[test]
    fn test_bounds_chunks() {
        let b = CellBounds::from_corners(
            WorldPosition::new(-1, 0),
            WorldPosition::new(CHUNK_SIZE, 1),
        );
        assert_eq!(
            b.chunks(),
            vec![ChunkKey::new(-1, 0), ChunkKey::new(0, 0), ChunkKey::new(1, 0)]
        );
    }
}
