//! Rasterization toolkit: turn a gesture into the exact set of grid cells a
//! tool selects.
//!
//! Every function here is total. Degenerate gestures (no samples, one
//! sample, zero radius) yield an empty or single-cell path, never an error.

use crate::coords::{CellBounds, WorldPosition, round_half_up};
use crate::tools::ToolKind;
use kurbo::Point;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Ordered, duplicate-free sequence of cells produced by a tool.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SelectionPath {
    cells: Vec<WorldPosition>,
}

impl SelectionPath {
    pub const EMPTY: SelectionPath = SelectionPath { cells: Vec::new() };

    /// Build a path, dropping repeated cells while keeping first-seen order.
    pub fn from_cells(cells: impl IntoIterator<Item = WorldPosition>) -> Self {
        let mut seen = HashSet::new();
        Self {
            cells: cells.into_iter().filter(|c| seen.insert(*c)).collect(),
        }
    }

    pub fn cells(&self) -> &[WorldPosition] {
        &self.cells
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Bounding box of all cells.
    pub fn bounds(&self) -> Option<CellBounds> {
        CellBounds::enclosing(&self.cells)
    }

    pub fn into_cells(self) -> Vec<WorldPosition> {
        self.cells
    }
}

/// Rasterize a gesture (world-space samples, in order) with a tool.
pub fn rasterize(gesture: &[Point], tool: ToolKind) -> SelectionPath {
    let (Some(&first), Some(&last)) = (gesture.first(), gesture.last()) else {
        return SelectionPath::default();
    };

    let cells = match tool {
        ToolKind::None | ToolKind::Bucket => Vec::new(),
        ToolKind::Pen => pen_path(gesture),
        ToolKind::Line => line_between(first, last),
        ToolKind::Rectangle => rectangle(WorldPosition::floor(first), WorldPosition::floor(last)),
        ToolKind::FilledRectangle => {
            filled_rectangle(WorldPosition::floor(first), WorldPosition::floor(last))
        }
        ToolKind::Circle => {
            let (center, radius) = circle_from_gesture(gesture);
            circle(center, radius)
        }
        ToolKind::FilledCircle => {
            let (center, radius) = circle_from_gesture(gesture);
            filled_circle(center, radius)
        }
    };
    SelectionPath::from_cells(cells)
}

/// Bresenham line from `a` to `b`, inclusive of both ends.
///
/// The walk always runs from the lexicographically smaller endpoint and is
/// reversed afterwards when needed, so `line(a, b)` and `line(b, a)` cover
/// the same cells.
pub fn line(a: WorldPosition, b: WorldPosition) -> Vec<WorldPosition> {
    if a == b {
        return vec![a];
    }
    if b < a {
        let mut cells = bresenham(b, a);
        cells.reverse();
        cells
    } else {
        bresenham(a, b)
    }
}

fn bresenham(from: WorldPosition, to: WorldPosition) -> Vec<WorldPosition> {
    let dx = (to.x - from.x).abs();
    let dy = (to.y - from.y).abs();
    let sx = if from.x < to.x { 1 } else { -1 };
    let sy = if from.y < to.y { 1 } else { -1 };
    let mut err = dx - dy;
    let (mut x, mut y) = (from.x, from.y);

    let mut cells = Vec::with_capacity(dx.max(dy) as usize + 1);
    loop {
        cells.push(WorldPosition::new(x, y));
        if x == to.x && y == to.y {
            break;
        }
        let e2 = 2 * err;
        if e2 > -dy {
            err -= dy;
            x += sx;
        }
        if e2 < dx {
            err += dx;
            y += sy;
        }
    }
    cells
}

/// Straight line between two fractional world points (floored to cells).
pub fn line_between(start: Point, end: Point) -> Vec<WorldPosition> {
    line(WorldPosition::floor(start), WorldPosition::floor(end))
}

/// Polyline through every sample, shared vertices emitted once.
pub fn pen_path(samples: &[Point]) -> Vec<WorldPosition> {
    let Some(&first) = samples.first() else {
        return Vec::new();
    };
    let mut seen = HashSet::new();
    let mut cells = Vec::new();
    let mut push = |c: WorldPosition| {
        if seen.insert(c) {
            cells.push(c);
        }
    };

    push(WorldPosition::floor(first));
    for pair in samples.windows(2) {
        let a = WorldPosition::floor(pair[0]);
        let b = WorldPosition::floor(pair[1]);
        if a == b {
            continue;
        }
        line(a, b).into_iter().for_each(&mut push);
    }
    cells
}

/// Hollow axis-aligned box with corners `a` and `b`: top row, bottom row,
/// then the interior rows' left and right cells. Each border cell once.
pub fn rectangle(a: WorldPosition, b: WorldPosition) -> Vec<WorldPosition> {
    let CellBounds { min, max } = CellBounds::from_corners(a, b);
    let mut cells = Vec::new();

    cells.extend((min.x..=max.x).map(|x| WorldPosition::new(x, min.y)));
    if max.y != min.y {
        cells.extend((min.x..=max.x).map(|x| WorldPosition::new(x, max.y)));
    }
    for y in (min.y + 1)..max.y {
        cells.push(WorldPosition::new(min.x, y));
        if max.x != min.x {
            cells.push(WorldPosition::new(max.x, y));
        }
    }
    cells
}

/// Every cell of the closed box with corners `a` and `b`, row-major.
pub fn filled_rectangle(a: WorldPosition, b: WorldPosition) -> Vec<WorldPosition> {
    let CellBounds { min, max } = CellBounds::from_corners(a, b);
    (min.y..=max.y)
        .flat_map(|y| (min.x..=max.x).map(move |x| WorldPosition::new(x, y)))
        .collect()
}

/// Center and radius for the circle tools: the center is the midpoint of the
/// first and last samples, the radius half the smaller side of the bounding
/// box of all samples.
pub fn circle_from_gesture(samples: &[Point]) -> (Point, f64) {
    let (Some(&first), Some(&last)) = (samples.first(), samples.last()) else {
        return (Point::ZERO, 0.0);
    };
    let center = first.midpoint(last);
    let (mut min_x, mut min_y) = (f64::INFINITY, f64::INFINITY);
    let (mut max_x, mut max_y) = (f64::NEG_INFINITY, f64::NEG_INFINITY);
    for p in samples {
        min_x = min_x.min(p.x);
        min_y = min_y.min(p.y);
        max_x = max_x.max(p.x);
        max_y = max_y.max(p.y);
    }
    let radius = (max_x - min_x).min(max_y - min_y) / 2.0;
    (center, radius)
}

/// Hollow circle: every cell in the bounding square whose distance to
/// `center` lies in `[r - 0.5, r + 0.5]`. O(r²).
pub fn circle(center: Point, radius: f64) -> Vec<WorldPosition> {
    let r = radius.abs();
    let x0 = (center.x - r).floor() as i32;
    let y0 = (center.y - r).floor() as i32;
    let x1 = (center.x + r).floor() as i32;
    let y1 = (center.y + r).floor() as i32;

    let mut cells = Vec::new();
    for y in y0..=y1 {
        for x in x0..=x1 {
            let dist = (f64::from(x) - center.x).hypot(f64::from(y) - center.y);
            if dist >= r - 0.5 && dist <= r + 0.5 {
                cells.push(WorldPosition::new(x, y));
            }
        }
    }
    cells
}

/// Filled circle by scan lines: one square root per row, then the whole
/// contiguous row `[cx - dx, cx + dx]` is emitted. A non-positive radius
/// yields the rounded center cell.
pub fn filled_circle(center: Point, radius: f64) -> Vec<WorldPosition> {
    if radius <= 0.0 {
        return vec![WorldPosition::round(center)];
    }
    let c = WorldPosition::round(center);
    let r = round_half_up(radius) as i32;
    let r2 = i64::from(r) * i64::from(r);

    let mut cells = Vec::new();
    for dy in -r..=r {
        let rest = r2 - i64::from(dy) * i64::from(dy);
        let dx = (rest as f64).sqrt().floor() as i32;
        let y = c.y + dy;
        cells.extend(((c.x - dx)..=(c.x + dx)).map(|x| WorldPosition::new(x, y)));
    }
    cells
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(x: i32, y: i32) -> WorldPosition {
        WorldPosition::new(x, y)
    }

    fn set(cells: &[WorldPosition]) -> HashSet<WorldPosition> {
        cells.iter().copied().collect()
    }

    fn has_duplicates(cells: &[WorldPosition]) -> bool {
        set(cells).len() != cells.len()
    }

    #[test]
    fn test_line_single_point() {
        for a in [p(0, 0), p(-5, 12), p(100, -100)] {
            assert_eq!(line(a, a), vec![a]);
        }
    }

    #[test]
    fn test_line_diagonal() {
        assert_eq!(line(p(0, 0), p(3, 3)), vec![p(0, 0), p(1, 1), p(2, 2), p(3, 3)]);
    }

    #[test]
    fn test_line_endpoints_and_order() {
        let cells = line(p(7, -2), p(-3, 4));
        assert_eq!(cells.first(), Some(&p(7, -2)));
        assert_eq!(cells.last(), Some(&p(-3, 4)));
        assert!(!has_duplicates(&cells));
        // Consecutive cells are 8-connected.
        for w in cells.windows(2) {
            assert!((w[0].x - w[1].x).abs() <= 1 && (w[0].y - w[1].y).abs() <= 1);
        }
    }

    #[test]
    fn test_line_direction_symmetric() {
        let points = [p(0, 0), p(2, 1), p(-7, 3), p(5, -11), p(13, 13), p(-4, -9), p(0, 6)];
        for &a in &points {
            for &b in &points {
                assert_eq!(set(&line(a, b)), set(&line(b, a)), "{:?} -> {:?}", a, b);
            }
        }
    }

    #[test]
    fn test_line_between_floors() {
        let cells = line_between(Point::new(0.9, -0.1), Point::new(2.2, -0.9));
        assert_eq!(cells, vec![p(0, -1), p(1, -1), p(2, -1)]);
    }

    #[test]
    fn test_pen_dedups_shared_vertices() {
        let samples = [
            Point::new(0.5, 0.5),
            Point::new(3.5, 0.5),
            Point::new(3.5, 2.5),
            Point::new(0.5, 0.5),
        ];
        let cells = pen_path(&samples);
        assert!(!has_duplicates(&cells));
        assert_eq!(cells[0], p(0, 0));
        assert_eq!(&cells[..4], &[p(0, 0), p(1, 0), p(2, 0), p(3, 0)]);
        assert!(cells.contains(&p(3, 2)));
    }

    #[test]
    fn test_pen_single_sample() {
        assert_eq!(pen_path(&[Point::new(-0.5, 1.5)]), vec![p(-1, 1)]);
        assert!(pen_path(&[]).is_empty());
    }

    #[test]
    fn test_rectangle_border_cells() {
        let cells = rectangle(p(0, 0), p(2, 1));
        assert_eq!(cells.len(), 6);
        assert!(!has_duplicates(&cells));
        assert_eq!(
            set(&cells),
            set(&[p(0, 0), p(1, 0), p(2, 0), p(0, 1), p(1, 1), p(2, 1)])
        );
    }

    #[test]
    fn test_rectangle_no_interior_no_duplicates() {
        let cells = rectangle(p(5, 4), p(-1, -2));
        assert!(!has_duplicates(&cells));
        // 7 x 7 box: perimeter 2*7 + 2*5.
        assert_eq!(cells.len(), 24);
        assert!(!cells.contains(&p(2, 1)));
        assert_eq!(&cells[..2], &[p(-1, -2), p(0, -2)]);
    }

    #[test]
    fn test_rectangle_degenerate() {
        assert_eq!(rectangle(p(1, 1), p(1, 1)), vec![p(1, 1)]);
        assert_eq!(rectangle(p(1, 1), p(1, 3)), vec![p(1, 1), p(1, 3), p(1, 2)]);
        assert_eq!(rectangle(p(0, 0), p(2, 0)), vec![p(0, 0), p(1, 0), p(2, 0)]);
    }

    #[test]
    fn test_filled_rectangle_any_corner_order() {
        let cells = filled_rectangle(p(2, 1), p(0, 0));
        assert_eq!(cells, vec![p(0, 0), p(1, 0), p(2, 0), p(0, 1), p(1, 1), p(2, 1)]);
    }

    #[test]
    fn test_filled_circle_zero_radius() {
        assert_eq!(filled_circle(Point::new(2.5, -3.4), 0.0), vec![p(3, -3)]);
        assert_eq!(filled_circle(Point::new(1.0, 1.0), -2.0), vec![p(1, 1)]);
    }

    #[test]
    fn test_filled_circle_matches_brute_force() {
        for (center, radius) in [
            (Point::new(0.0, 0.0), 1.0),
            (Point::new(10.2, -4.7), 3.4),
            (Point::new(-7.5, 2.5), 6.0),
            (Point::new(0.0, 0.0), 17.0),
        ] {
            let cells = filled_circle(center, radius);
            assert!(!has_duplicates(&cells));

            let c = WorldPosition::round(center);
            let r = round_half_up(radius) as i32;
            let mut expected = 0;
            for y in (c.y - r)..=(c.y + r) {
                for x in (c.x - r)..=(c.x + r) {
                    let (dx, dy) = (x - c.x, y - c.y);
                    if dx * dx + dy * dy <= r * r {
                        expected += 1;
                    }
                }
            }
            assert_eq!(cells.len(), expected);
            for cell in &cells {
                let d = f64::from(cell.x - c.x).hypot(f64::from(cell.y - c.y));
                assert!(d <= f64::from(r) + 1e-9);
            }
        }
    }

    #[test]
    fn test_circle_ring() {
        let cells = circle(Point::new(0.0, 0.0), 5.0);
        assert!(!has_duplicates(&cells));
        assert!(cells.contains(&p(5, 0)));
        assert!(cells.contains(&p(0, -5)));
        assert!(cells.contains(&p(3, 4)));
        assert!(!cells.contains(&p(0, 0)));
        for c in &cells {
            let d = f64::from(c.x).hypot(f64::from(c.y));
            assert!((4.5..=5.5).contains(&d));
        }
    }

    #[test]
    fn test_circle_from_gesture() {
        let samples = [Point::new(0.0, 0.0), Point::new(10.0, 2.0), Point::new(8.0, 6.0)];
        let (center, radius) = circle_from_gesture(&samples);
        assert_eq!(center, Point::new(4.0, 3.0));
        assert!((radius - 3.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_rasterize_dispatch() {
        let gesture = [Point::new(0.2, 0.2), Point::new(1.5, 1.5), Point::new(3.1, 3.9)];
        assert!(rasterize(&gesture, ToolKind::None).is_empty());
        assert!(rasterize(&gesture, ToolKind::Bucket).is_empty());
        assert_eq!(
            rasterize(&gesture, ToolKind::Line).cells(),
            &[p(0, 0), p(1, 1), p(2, 2), p(3, 3)]
        );
        assert_eq!(rasterize(&gesture, ToolKind::Rectangle).len(), 12);
        assert_eq!(rasterize(&gesture, ToolKind::FilledRectangle).len(), 16);
        assert!(!rasterize(&gesture, ToolKind::FilledCircle).is_empty());
    }

    #[test]
    fn test_rasterize_degenerate_gestures() {
        for tool in ToolKind::ALL {
            assert!(rasterize(&[], tool).is_empty());
            assert!(rasterize(&[Point::new(4.5, 4.5)], tool).len() <= 1);
        }
    }

    #[test]
    fn test_selection_path_dedup_and_bounds() {
        let path = SelectionPath::from_cells([p(1, 1), p(0, 2), p(1, 1), p(-3, 0)]);
        assert_eq!(path.cells(), &[p(1, 1), p(0, 2), p(-3, 0)]);
        let b = path.bounds().unwrap();
        assert_eq!((b.min, b.max), (p(-3, 0), p(1, 2)));
        assert!(SelectionPath::default().bounds().is_none());
    }
}
