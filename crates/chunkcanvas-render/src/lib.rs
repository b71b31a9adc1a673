//! ChunkCanvas Render Library
//!
//! The render seam for the map: a [`Surface`] trait for drawing backends, a
//! CPU framebuffer implementation, the tile compositor and the selection
//! overlay.

mod compositor;
mod framebuffer;
mod overlay;
mod renderer;

pub use compositor::{CompositeStats, TileCompositor};
pub use framebuffer::Framebuffer;
pub use overlay::{CURSOR_ALPHA, OVERLAY_CELL_ALPHA, OVERLAY_FILL_ALPHA, OverlayKey, OverlayQuad, OverlayRenderer};
pub use renderer::{FrameStats, MapRenderer, RenderContext, RenderResult, Renderer, RendererError, Surface, rgb_color};
