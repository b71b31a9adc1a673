//! Viewport module for pan/zoom transforms between screen pixels and world cells.

use crate::coords::{CHUNK_SIZE, WorldPosition};
use kurbo::{Point, Rect, Size, Vec2};
use serde::{Deserialize, Serialize};

/// Smallest allowed scale (pixels per cell).
pub const MIN_SCALE: f64 = 3.0 / 8.0;
/// Largest allowed scale (pixels per cell).
pub const MAX_SCALE: f64 = 20.0;
/// Scale used for a fresh viewport.
pub const DEFAULT_SCALE: f64 = 4.0;

/// Scale change per unit of wheel delta.
const WHEEL_ZOOM_STEP: f64 = 0.01;
/// Scale change per pixel of pinch spread.
const PINCH_ZOOM_STEP: f64 = 0.005;

/// Viewport manages the view transform for the map.
///
/// `offset` is the (fractional) world coordinate shown at the screen origin and
/// `scale` is the number of screen pixels per world cell. All conversions stay
/// in floating point; callers truncate to cells only when they need a cell.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    /// World coordinate at the screen origin.
    pub offset: Point,
    /// Screen pixels per cell.
    pub scale: f64,
    /// Screen size in pixels.
    pub size: Size,
    /// Minimum allowed scale.
    pub min_scale: f64,
    /// Maximum allowed scale.
    pub max_scale: f64,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            offset: Point::ZERO,
            scale: DEFAULT_SCALE,
            size: Size::new(1280.0, 800.0),
            min_scale: MIN_SCALE,
            max_scale: MAX_SCALE,
        }
    }
}

impl Viewport {
    /// Create a viewport of the given screen size with default settings.
    pub fn new(size: Size) -> Self {
        Self {
            size,
            ..Self::default()
        }
    }

    /// Builder-style scale limits; the current scale is clamped into them.
    pub fn with_scale_limits(mut self, min_scale: f64, max_scale: f64) -> Self {
        self.min_scale = min_scale;
        self.max_scale = max_scale.max(min_scale);
        self.scale = self.scale.clamp(self.min_scale, self.max_scale);
        self
    }

    /// Convert a screen point to (fractional) world coordinates.
    pub fn world_from_screen(&self, screen: Point) -> Point {
        Point::new(
            self.offset.x + screen.x / self.scale,
            self.offset.y + screen.y / self.scale,
        )
    }

    /// Convert a world point to screen coordinates.
    pub fn screen_from_world(&self, world: Point) -> Point {
        Point::new(
            (world.x - self.offset.x) * self.scale,
            (world.y - self.offset.y) * self.scale,
        )
    }

    /// The cell under a screen point.
    pub fn cell_at(&self, screen: Point) -> WorldPosition {
        WorldPosition::floor(self.world_from_screen(screen))
    }

    /// Screen-space square covered by a cell.
    pub fn cell_rect(&self, cell: WorldPosition) -> Rect {
        let origin = self.screen_from_world(cell.to_point());
        Rect::from_origin_size(origin, Size::new(self.scale, self.scale))
    }

    /// Visible world rectangle.
    pub fn world_bounds(&self) -> Rect {
        Rect::from_points(
            self.offset,
            self.world_from_screen(Point::new(self.size.width, self.size.height)),
        )
    }

    /// Screen extent of one chunk in pixels.
    pub fn chunk_extent(&self) -> f64 {
        f64::from(CHUNK_SIZE) * self.scale
    }

    /// Pan by a delta in screen pixels (dragging right moves the world right).
    pub fn pan(&mut self, delta: Vec2) {
        self.offset.x -= delta.x / self.scale;
        self.offset.y -= delta.y / self.scale;
    }

    /// Set the scale, keeping the world point under `pivot` fixed on screen.
    ///
    /// The scale is clamped to the limits. Returns `false` without touching any
    /// state when the clamped scale equals the current one.
    pub fn zoom_at(&mut self, pivot: Point, new_scale: f64) -> bool {
        let new_scale = new_scale.clamp(self.min_scale, self.max_scale);
        if (new_scale - self.scale).abs() < f64::EPSILON {
            return false;
        }

        let world = self.world_from_screen(pivot);
        self.offset = Point::new(world.x - pivot.x / new_scale, world.y - pivot.y / new_scale);
        self.scale = new_scale;
        true
    }

    /// Additive wheel zoom; a negative `delta_y` (wheel up) zooms in.
    pub fn wheel_zoom(&mut self, pivot: Point, delta_y: f64) -> bool {
        self.zoom_at(pivot, self.scale - delta_y * WHEEL_ZOOM_STEP)
    }

    /// Pinch zoom driven by the change of average finger spread in pixels.
    pub fn pinch_zoom(&mut self, pivot: Point, spread_delta: f64) -> bool {
        self.zoom_at(pivot, self.scale + spread_delta * PINCH_ZOOM_STEP)
    }

    /// Update the screen size (e.g. on window resize).
    pub fn resize(&mut self, size: Size) {
        self.size = size;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_viewport() -> Viewport {
        Viewport {
            offset: Point::new(-37.25, 112.5),
            scale: 3.7,
            size: Size::new(800.0, 600.0),
            ..Viewport::default()
        }
    }

    #[test]
    fn test_default_viewport() {
        let vp = Viewport::default();
        assert_eq!(vp.offset, Point::ZERO);
        assert!((vp.scale - DEFAULT_SCALE).abs() < f64::EPSILON);
    }

    #[test]
    fn test_world_from_screen() {
        let vp = Viewport {
            offset: Point::new(10.0, -5.0),
            scale: 2.0,
            ..Viewport::default()
        };
        let world = vp.world_from_screen(Point::new(100.0, 200.0));
        assert!((world.x - 60.0).abs() < f64::EPSILON);
        assert!((world.y - 95.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_roundtrip_conversion() {
        let vp = sample_viewport();
        for p in [
            Point::new(0.0, 0.0),
            Point::new(123.456, -789.01),
            Point::new(-1e5, 3e4),
        ] {
            let back = vp.world_from_screen(vp.screen_from_world(p));
            assert!((back.x - p.x).abs() < 1e-9);
            assert!((back.y - p.y).abs() < 1e-9);
        }
    }

    #[test]
    fn test_zoom_keeps_pivot_fixed() {
        let mut vp = sample_viewport();
        let pivot = Point::new(321.0, 77.0);
        let before = vp.world_from_screen(pivot);
        assert!(vp.zoom_at(pivot, 9.25));
        let after = vp.world_from_screen(pivot);
        assert!((before.x - after.x).abs() < 1e-9);
        assert!((before.y - after.y).abs() < 1e-9);
        assert!((vp.scale - 9.25).abs() < f64::EPSILON);
    }

    #[test]
    fn test_zoom_clamp() {
        let mut vp = Viewport::default();
        vp.zoom_at(Point::ZERO, 0.001);
        assert!((vp.scale - MIN_SCALE).abs() < f64::EPSILON);

        vp.zoom_at(Point::ZERO, 1000.0);
        assert!((vp.scale - MAX_SCALE).abs() < f64::EPSILON);
    }

    #[test]
    fn test_zoom_noop_at_limit() {
        let mut vp = Viewport {
            offset: Point::new(5.0, 5.0),
            scale: MAX_SCALE,
            ..Viewport::default()
        };
        let before = vp;
        assert!(!vp.zoom_at(Point::new(400.0, 300.0), MAX_SCALE * 2.0));
        assert_eq!(vp, before);
    }

    #[test]
    fn test_wheel_zoom_direction() {
        let mut vp = Viewport::default();
        assert!(vp.wheel_zoom(Point::new(10.0, 10.0), -100.0));
        assert!((vp.scale - (DEFAULT_SCALE + 1.0)).abs() < 1e-12);
        assert!(vp.wheel_zoom(Point::new(10.0, 10.0), 200.0));
        assert!((vp.scale - (DEFAULT_SCALE - 1.0)).abs() < 1e-12);
    }

    #[test]
    fn test_pan() {
        let mut vp = Viewport {
            scale: 4.0,
            ..Viewport::default()
        };
        vp.pan(Vec2::new(40.0, -20.0));
        assert!((vp.offset.x + 10.0).abs() < f64::EPSILON);
        assert!((vp.offset.y - 5.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_cell_at_floors() {
        let vp = Viewport {
            offset: Point::new(-0.5, 0.0),
            scale: 4.0,
            ..Viewport::default()
        };
        assert_eq!(vp.cell_at(Point::new(1.0, 1.0)), WorldPosition::new(-1, 0));
        assert_eq!(vp.cell_at(Point::new(2.0, 1.0)), WorldPosition::new(0, 0));
    }
}
