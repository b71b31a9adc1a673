//! Tile composite: the base layer of the map.

use crate::renderer::{RenderContext, RenderResult, Surface};
use chunkcanvas_core::cache::ChunkState;
use kurbo::{Rect, Size};

/// What one composite pass drew.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompositeStats {
    /// Loaded tiles drawn.
    pub drawn: usize,
    /// Visible chunks left as background (pending, failed or unrequested).
    pub holes: usize,
}

/// Draws every Loaded tile of the visible set over the background.
#[derive(Debug, Default)]
pub struct TileCompositor;

impl TileCompositor {
    pub fn new() -> Self {
        Self
    }

    /// Full redraw of `surface`. Chunks without a tile are simply not drawn.
    pub fn composite(&self, ctx: &RenderContext, surface: &mut dyn Surface) -> RenderResult<CompositeStats> {
        surface.clear(ctx.background_color);

        let viewport = ctx.viewport;
        let extent = viewport.chunk_extent();
        let mut stats = CompositeStats::default();
        let mut drawn = Vec::with_capacity(ctx.visible.len());
        for &key in ctx.visible {
            let ChunkState::Loaded(tile) = ctx.cache.state(key) else {
                stats.holes += 1;
                continue;
            };
            let origin = viewport.screen_from_world(key.origin().to_point());
            let dest = Rect::from_origin_size(origin, Size::new(extent, extent));
            surface.draw_tile(key, tile, dest)?;
            drawn.push(key);
        }
        stats.drawn = drawn.len();
        surface.retain_tiles(&drawn);
        log::trace!("Composited {} tiles, {} holes", stats.drawn, stats.holes);
        Ok(stats)
    }
}
