//! Selection overlay: translucent preview cells on their own layer.

use crate::renderer::{RenderContext, Surface};
use chunkcanvas_core::camera::Viewport;
use chunkcanvas_core::coords::WorldPosition;
use chunkcanvas_core::raster::SelectionPath;
use chunkcanvas_core::tools::ToolKind;
use kurbo::{Point, Rect, Size};
use peniko::Color;

/// Alpha of per-cell and border quads.
pub const OVERLAY_CELL_ALPHA: f32 = 0.6;
/// Alpha of a filled-rectangle quad.
pub const OVERLAY_FILL_ALPHA: f32 = 0.3;
/// Alpha of the black cursor indicator.
pub const CURSOR_ALPHA: f32 = 0.5;

/// Everything the overlay image depends on. The overlay is redrawn only when
/// this changes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverlayKey {
    pub revision: u64,
    pub tool: ToolKind,
    pub cursor: Option<WorldPosition>,
    pub offset: Point,
    pub scale: f64,
    pub size: Size,
}

impl OverlayKey {
    pub fn new(revision: u64, tool: ToolKind, cursor: Option<WorldPosition>, viewport: &Viewport) -> Self {
        Self {
            revision,
            tool,
            cursor,
            offset: viewport.offset,
            scale: viewport.scale,
            size: viewport.size,
        }
    }
}

/// One screen-space quad of the overlay.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverlayQuad {
    pub rect: Rect,
    pub alpha: f32,
}

/// Draws the selection preview. Never touches the tile layer.
#[derive(Debug, Default)]
pub struct OverlayRenderer {
    last_key: Option<OverlayKey>,
    quads: Vec<OverlayQuad>,
}

impl OverlayRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget the last drawn state so the next `render` redraws.
    pub fn invalidate(&mut self) {
        self.last_key = None;
    }

    /// Quads drawn in the last redraw.
    pub fn quads(&self) -> &[OverlayQuad] {
        &self.quads
    }

    /// Clear and redraw `surface` if the selection, tool or viewport changed.
    /// Returns whether anything was drawn.
    pub fn render(&mut self, ctx: &RenderContext, surface: &mut dyn Surface) -> bool {
        let key = ctx.overlay_key();
        if self.last_key == Some(key) {
            return false;
        }
        self.last_key = Some(key);

        self.quads = build_quads(ctx.selection, ctx.tool, ctx.viewport);
        surface.clear(Color::TRANSPARENT);
        for quad in &self.quads {
            surface.fill_rect(quad.rect, ctx.overlay_color.with_alpha(quad.alpha));
        }
        if let Some(cell) = ctx.cursor {
            surface.fill_rect(ctx.viewport.cell_rect(cell), Color::BLACK.with_alpha(CURSOR_ALPHA));
        }
        true
    }
}

/// Screen-space quads for a selection, culled to the viewport.
///
/// Rectangle tools draw one contiguous shape (four border strips, or a single
/// quad when filled) so adjacent cells never show seams; every other tool
/// draws one quad per cell.
pub fn build_quads(selection: &SelectionPath, tool: ToolKind, viewport: &Viewport) -> Vec<OverlayQuad> {
    let screen = Rect::from_origin_size(Point::ZERO, viewport.size);
    let visible = |r: &Rect| r.x1 > screen.x0 && r.x0 < screen.x1 && r.y1 > screen.y0 && r.y0 < screen.y1;

    let quads = match (tool, selection.bounds()) {
        (_, None) => Vec::new(),
        (ToolKind::FilledRectangle, Some(bounds)) => {
            let origin = viewport.screen_from_world(bounds.min.to_point());
            let rect = Rect::from_origin_size(
                Point::new(origin.x.floor(), origin.y.floor()),
                Size::new(
                    (f64::from(bounds.width()) * viewport.scale).round(),
                    (f64::from(bounds.height()) * viewport.scale).round(),
                ),
            );
            vec![OverlayQuad {
                rect,
                alpha: OVERLAY_FILL_ALPHA,
            }]
        }
        (ToolKind::Rectangle, Some(bounds)) => {
            let s = viewport.scale;
            let a = viewport.screen_from_world(bounds.min.to_point());
            let outer = Rect::new(
                a.x,
                a.y,
                a.x + f64::from(bounds.width()) * s,
                a.y + f64::from(bounds.height()) * s,
            );
            border_strips(outer, s)
                .into_iter()
                .map(|rect| OverlayQuad {
                    rect,
                    alpha: OVERLAY_CELL_ALPHA,
                })
                .collect()
        }
        (_, Some(_)) => selection
            .cells()
            .iter()
            .map(|&cell| OverlayQuad {
                rect: viewport.cell_rect(cell),
                alpha: OVERLAY_CELL_ALPHA,
            })
            .collect(),
    };

    quads.into_iter().filter(|q| visible(&q.rect)).collect()
}

/// Non-overlapping strips of thickness `t` along the inside of `outer`.
fn border_strips(outer: Rect, t: f64) -> Vec<Rect> {
    let mut strips = vec![Rect::new(outer.x0, outer.y0, outer.x1, outer.y0 + t)];
    if outer.height() > t {
        strips.push(Rect::new(outer.x0, outer.y1 - t, outer.x1, outer.y1));
    }
    if outer.height() > 2.0 * t {
        let (top, bottom) = (outer.y0 + t, outer.y1 - t);
        strips.push(Rect::new(outer.x0, top, outer.x0 + t, bottom));
        if outer.width() > t {
            strips.push(Rect::new(outer.x1 - t, top, outer.x1, bottom));
        }
    }
    strips
}
