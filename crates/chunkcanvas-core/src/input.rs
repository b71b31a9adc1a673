//! Pointer and keyboard events, plus the press/drag/pinch tracker that turns
//! them into map gestures.

use kurbo::{Point, Vec2};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Manhattan distance (screen pixels) under which a press/release pair is a
/// click rather than a drag.
pub const DEFAULT_CLICK_THRESHOLD: f64 = 10.0;

/// Pointer event for unified mouse/touch handling. `id` distinguishes
/// simultaneous touches; mice use a single id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PointerEvent {
    Down { id: i32, position: Point },
    Up { id: i32, position: Point },
    Move { id: i32, position: Point },
    Scroll { position: Point, delta: Vec2 },
}

/// Keyboard event type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyEvent {
    Pressed(String),
    Released(String),
}

/// What a pointer event amounts to once tracked.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PointerGesture {
    /// A single pointer moved while pressed by `delta` screen pixels.
    Drag { position: Point, delta: Vec2 },
    /// Two or more pointers changed their average spread around `center`.
    Pinch { center: Point, spread_delta: f64 },
    /// The last pointer was released close to where it was pressed.
    Click { position: Point },
    /// The last pointer was released after a drag.
    DragEnd { position: Point },
    /// Hover or an event with no map effect.
    Hover { position: Point },
}

/// Tracks pressed pointers between events.
#[derive(Debug, Clone)]
pub struct PointerTracker {
    pointers: BTreeMap<i32, Point>,
    press_origin: Option<Point>,
    last_spread: Option<f64>,
    dragged: bool,
    click_threshold: f64,
}

impl Default for PointerTracker {
    fn default() -> Self {
        Self::new(DEFAULT_CLICK_THRESHOLD)
    }
}

impl PointerTracker {
    pub fn new(click_threshold: f64) -> Self {
        Self {
            pointers: BTreeMap::new(),
            press_origin: None,
            last_spread: None,
            dragged: false,
            click_threshold,
        }
    }

    /// Number of pointers currently pressed.
    pub fn pressed(&self) -> usize {
        self.pointers.len()
    }

    pub fn is_pressed(&self) -> bool {
        !self.pointers.is_empty()
    }

    /// Feed one pointer event. Scroll events are not tracked and report a
    /// hover at their position.
    pub fn handle(&mut self, event: &PointerEvent) -> PointerGesture {
        match *event {
            PointerEvent::Down { id, position } => {
                self.pointers.insert(id, position);
                if self.pointers.len() == 1 {
                    self.press_origin = Some(position);
                    self.dragged = false;
                } else {
                    // A second finger turns the interaction into a pinch.
                    self.dragged = true;
                }
                self.last_spread = self.spread();
                PointerGesture::Hover { position }
            }
            PointerEvent::Move { id, position } => {
                let Some(previous) = self.pointers.insert(id, position) else {
                    self.pointers.remove(&id);
                    return PointerGesture::Hover { position };
                };
                if self.pointers.len() >= 2 {
                    let spread = self.spread();
                    let delta = match (spread, self.last_spread) {
                        (Some(now), Some(before)) => now - before,
                        _ => 0.0,
                    };
                    self.last_spread = spread;
                    return PointerGesture::Pinch {
                        center: self.centroid(),
                        spread_delta: delta,
                    };
                }
                if let Some(origin) = self.press_origin {
                    if manhattan(origin, position) >= self.click_threshold {
                        self.dragged = true;
                    }
                }
                PointerGesture::Drag {
                    position,
                    delta: position - previous,
                }
            }
            PointerEvent::Up { id, position } => {
                if self.pointers.remove(&id).is_none() {
                    return PointerGesture::Hover { position };
                }
                self.last_spread = self.spread();
                if !self.pointers.is_empty() {
                    return PointerGesture::Hover { position };
                }
                let origin = self.press_origin.take();
                let is_click = !self.dragged
                    && origin.is_some_and(|o| manhattan(o, position) < self.click_threshold);
                if is_click {
                    PointerGesture::Click { position }
                } else {
                    PointerGesture::DragEnd { position }
                }
            }
            PointerEvent::Scroll { position, .. } => PointerGesture::Hover { position },
        }
    }

    /// Forget all pressed pointers (e.g. on focus loss).
    pub fn reset(&mut self) {
        self.pointers.clear();
        self.press_origin = None;
        self.last_spread = None;
        self.dragged = false;
    }

    fn centroid(&self) -> Point {
        let n = self.pointers.len().max(1) as f64;
        let sum = self
            .pointers
            .values()
            .fold(Vec2::ZERO, |acc, p| acc + p.to_vec2());
        (sum / n).to_point()
    }

    /// Average distance of the pressed pointers to their centroid.
    fn spread(&self) -> Option<f64> {
        if self.pointers.len() < 2 {
            return None;
        }
        let center = self.centroid();
        let total: f64 = self.pointers.values().map(|p| p.distance(center)).sum();
        Some(total / self.pointers.len() as f64)
    }
}

fn manhattan(a: Point, b: Point) -> f64 {
    (a.x - b.x).abs() + (a.y - b.y).abs()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn down(id: i32, x: f64, y: f64) -> PointerEvent {
        PointerEvent::Down { id, position: Point::new(x, y) }
    }

    fn mv(id: i32, x: f64, y: f64) -> PointerEvent {
        PointerEvent::Move { id, position: Point::new(x, y) }
    }

    fn up(id: i32, x: f64, y: f64) -> PointerEvent {
        PointerEvent::Up { id, position: Point::new(x, y) }
    }

    #[test]
    fn test_click_within_threshold() {
        let mut t = PointerTracker::default();
        t.handle(&down(0, 100.0, 100.0));
        t.handle(&mv(0, 103.0, 104.0));
        assert_eq!(
            t.handle(&up(0, 103.0, 104.0)),
            PointerGesture::Click { position: Point::new(103.0, 104.0) }
        );
        assert!(!t.is_pressed());
    }

    #[test]
    fn test_drag_past_threshold() {
        let mut t = PointerTracker::default();
        t.handle(&down(0, 0.0, 0.0));
        let g = t.handle(&mv(0, 6.0, 5.0));
        assert_eq!(
            g,
            PointerGesture::Drag { position: Point::new(6.0, 5.0), delta: Vec2::new(6.0, 5.0) }
        );
        // Returning close to the origin is still a drag.
        t.handle(&mv(0, 1.0, 1.0));
        assert!(matches!(t.handle(&up(0, 1.0, 1.0)), PointerGesture::DragEnd { .. }));
    }

    #[test]
    fn test_hover_without_press() {
        let mut t = PointerTracker::default();
        assert!(matches!(t.handle(&mv(0, 5.0, 5.0)), PointerGesture::Hover { .. }));
        assert!(matches!(t.handle(&up(0, 5.0, 5.0)), PointerGesture::Hover { .. }));
        assert_eq!(t.pressed(), 0);
    }

    #[test]
    fn test_pinch_spread() {
        let mut t = PointerTracker::default();
        t.handle(&down(1, 100.0, 100.0));
        t.handle(&down(2, 200.0, 100.0));
        match t.handle(&mv(2, 300.0, 100.0)) {
            PointerGesture::Pinch { center, spread_delta } => {
                assert!((center.x - 200.0).abs() < 1e-9);
                // Spread goes from 50 to 100.
                assert!((spread_delta - 50.0).abs() < 1e-9);
            }
            other => panic!("expected pinch, got {:?}", other),
        }
        assert!(matches!(t.handle(&up(2, 300.0, 100.0)), PointerGesture::Hover { .. }));
        assert!(matches!(t.handle(&up(1, 100.0, 100.0)), PointerGesture::DragEnd { .. }));
    }
}
