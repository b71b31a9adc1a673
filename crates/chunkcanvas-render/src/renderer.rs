//! Renderer trait abstraction.

use crate::compositor::{CompositeStats, TileCompositor};
use crate::overlay::{OverlayKey, OverlayRenderer};
use chunkcanvas_core::cache::ChunkCache;
use chunkcanvas_core::camera::Viewport;
use chunkcanvas_core::coords::{ChunkKey, WorldPosition};
use chunkcanvas_core::raster::SelectionPath;
use chunkcanvas_core::tile::{Rgb, Tile};
use chunkcanvas_core::tools::ToolKind;
use kurbo::{Rect, Size};
use peniko::Color;
use thiserror::Error;

/// Renderer errors.
#[derive(Debug, Error)]
pub enum RendererError {
    #[error("Initialization failed: {0}")]
    InitFailed(String),
    #[error("Render failed: {0}")]
    RenderFailed(String),
    #[error("Surface error: {0}")]
    Surface(String),
}

/// Result type for renderer operations.
pub type RenderResult<T> = Result<T, RendererError>;

/// A 2D drawing target in screen pixels.
pub trait Surface {
    /// Size in pixels.
    fn size(&self) -> Size;

    /// Replace every pixel with `color` (no blending).
    fn clear(&mut self, color: Color);

    /// Blend a solid rectangle over the surface.
    fn fill_rect(&mut self, rect: Rect, color: Color);

    /// Draw a tile bitmap scaled into `dest`, nearest-neighbour.
    fn draw_tile(&mut self, key: ChunkKey, tile: &Tile, dest: Rect) -> RenderResult<()>;

    /// Called after a composite pass with the chunks it drew. Surfaces that
    /// cache uploaded tiles drop every other entry here.
    fn retain_tiles(&mut self, _drawn: &[ChunkKey]) {}
}

/// Convert a tile color to a paint color.
pub fn rgb_color(c: Rgb) -> Color {
    Color::from_rgba8(c.r, c.g, c.b, 255)
}

/// Context for a single render frame.
pub struct RenderContext<'a> {
    pub viewport: &'a Viewport,
    pub cache: &'a ChunkCache,
    /// Chunks to composite, usually the cache's visible set.
    pub visible: &'a [ChunkKey],
    /// Current selection preview.
    pub selection: &'a SelectionPath,
    /// Bumped by the owner whenever `selection` changes.
    pub selection_revision: u64,
    pub tool: ToolKind,
    /// Hovered or locked cell, outlined with the cursor indicator.
    pub cursor: Option<WorldPosition>,
    pub background_color: Color,
    pub overlay_color: Color,
}

impl<'a> RenderContext<'a> {
    /// Create a render context with an empty selection.
    pub fn new(viewport: &'a Viewport, cache: &'a ChunkCache, visible: &'a [ChunkKey]) -> Self {
        static EMPTY: SelectionPath = SelectionPath::EMPTY;
        Self {
            viewport,
            cache,
            visible,
            selection: &EMPTY,
            selection_revision: 0,
            tool: ToolKind::None,
            cursor: None,
            background_color: Color::from_rgba8(0x1f, 0x1f, 0x1f, 255),
            overlay_color: Color::WHITE,
        }
    }

    /// Set the background color.
    pub fn with_background(mut self, color: Color) -> Self {
        self.background_color = color;
        self
    }

    /// Set the selection preview and its revision.
    pub fn with_selection(mut self, selection: &'a SelectionPath, revision: u64) -> Self {
        self.selection = selection;
        self.selection_revision = revision;
        self
    }

    /// Set the tool the selection was made with.
    pub fn with_tool(mut self, tool: ToolKind) -> Self {
        self.tool = tool;
        self
    }

    /// Set the cell under the cursor indicator.
    pub fn with_cursor(mut self, cell: Option<WorldPosition>) -> Self {
        self.cursor = cell;
        self
    }

    /// Set the overlay base color (alpha is applied per shape).
    pub fn with_overlay_color(mut self, color: Color) -> Self {
        self.overlay_color = color;
        self
    }

    /// Everything the overlay depends on.
    pub fn overlay_key(&self) -> OverlayKey {
        OverlayKey::new(self.selection_revision, self.tool, self.cursor, self.viewport)
    }
}

/// Per-frame statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub composite: CompositeStats,
    /// Whether the overlay layer was redrawn this frame.
    pub overlay_redrawn: bool,
}

/// Trait for rendering backends.
pub trait Renderer {
    /// Draw one frame: tiles onto `base`, the selection onto `overlay`.
    fn render(
        &mut self,
        ctx: &RenderContext,
        base: &mut dyn Surface,
        overlay: &mut dyn Surface,
    ) -> RenderResult<FrameStats>;
}

/// The map renderer: tile composite plus selection overlay.
#[derive(Debug, Default)]
pub struct MapRenderer {
    compositor: TileCompositor,
    overlay: OverlayRenderer,
}

impl MapRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Force the overlay to redraw on the next frame.
    pub fn invalidate_overlay(&mut self) {
        self.overlay.invalidate();
    }
}

impl Renderer for MapRenderer {
    fn render(
        &mut self,
        ctx: &RenderContext,
        base: &mut dyn Surface,
        overlay: &mut dyn Surface,
    ) -> RenderResult<FrameStats> {
        let composite = self.compositor.composite(ctx, base)?;
        let overlay_redrawn = self.overlay.render(ctx, overlay);
        Ok(FrameStats {
            composite,
            overlay_redrawn,
        })
    }
}
