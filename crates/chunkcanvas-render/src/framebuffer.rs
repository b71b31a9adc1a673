//! CPU framebuffer surface.

use crate::renderer::{RenderResult, Surface};
use chunkcanvas_core::coords::ChunkKey;
use chunkcanvas_core::export::RasterImage;
use chunkcanvas_core::tile::{TILE_SIDE, Tile};
use kurbo::{Rect, Size};
use peniko::Color;

/// An RGBA8 pixel buffer implementing [`Surface`] with source-over blending.
///
/// Pixel `(x, y)` is covered by a rectangle when its center lies inside it,
/// so adjacent rectangles sharing an edge never overlap or leave a gap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Framebuffer {
    width: u32,
    height: u32,
    rgba: Vec<u8>,
}

impl Framebuffer {
    /// A transparent framebuffer.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            rgba: vec![0; width as usize * height as usize * 4],
        }
    }

    /// Wrap existing RGBA pixels. `None` if the length does not match.
    pub fn from_rgba(width: u32, height: u32, rgba: Vec<u8>) -> Option<Self> {
        (rgba.len() == width as usize * height as usize * 4).then_some(Self { width, height, rgba })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Resize, clearing to transparent.
    pub fn resize(&mut self, width: u32, height: u32) {
        *self = Self::new(width, height);
    }

    pub fn as_rgba(&self) -> &[u8] {
        &self.rgba
    }

    /// RGBA at `(x, y)`.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = self.index(x, y);
        Some([self.rgba[i], self.rgba[i + 1], self.rgba[i + 2], self.rgba[i + 3]])
    }

    /// Copy into an RGB raster for export, dropping alpha.
    pub fn to_raster(&self) -> RasterImage {
        RasterImage::from_rgba(self.width, self.height, &self.rgba)
            .unwrap_or_else(|| RasterImage::filled(0, 0, Default::default()))
    }

    fn index(&self, x: u32, y: u32) -> usize {
        (y as usize * self.width as usize + x as usize) * 4
    }

    /// Pixel index range covered by `[lo, hi)` along an axis of `len` pixels.
    fn span(lo: f64, hi: f64, len: u32) -> (u32, u32) {
        let start = (lo - 0.5).ceil().clamp(0.0, f64::from(len));
        let end = (hi - 0.5).ceil().clamp(0.0, f64::from(len));
        (start as u32, end as u32)
    }

    fn blend(&mut self, i: usize, src: [u8; 4]) {
        let a = u32::from(src[3]);
        if a == 255 {
            self.rgba[i..i + 4].copy_from_slice(&src);
            return;
        }
        if a == 0 {
            return;
        }
        let inv = 255 - a;
        for c in 0..3 {
            let d = u32::from(self.rgba[i + c]);
            self.rgba[i + c] = ((u32::from(src[c]) * a + d * inv + 127) / 255) as u8;
        }
        let da = u32::from(self.rgba[i + 3]);
        self.rgba[i + 3] = (a + (da * inv + 127) / 255).min(255) as u8;
    }
}

impl Surface for Framebuffer {
    fn size(&self) -> Size {
        Size::new(f64::from(self.width), f64::from(self.height))
    }

    fn clear(&mut self, color: Color) {
        let c = color.to_rgba8();
        for px in self.rgba.chunks_exact_mut(4) {
            px.copy_from_slice(&[c.r, c.g, c.b, c.a]);
        }
    }

    fn fill_rect(&mut self, rect: Rect, color: Color) {
        let c = color.to_rgba8();
        let src = [c.r, c.g, c.b, c.a];
        let (x0, x1) = Self::span(rect.x0, rect.x1, self.width);
        let (y0, y1) = Self::span(rect.y0, rect.y1, self.height);
        for y in y0..y1 {
            for x in x0..x1 {
                let i = self.index(x, y);
                self.blend(i, src);
            }
        }
    }

    fn draw_tile(&mut self, _key: ChunkKey, tile: &Tile, dest: Rect) -> RenderResult<()> {
        if dest.width() <= 0.0 || dest.height() <= 0.0 {
            return Ok(());
        }
        let (x0, x1) = Self::span(dest.x0, dest.x1, self.width);
        let (y0, y1) = Self::span(dest.y0, dest.y1, self.height);
        let sx = TILE_SIDE as f64 / dest.width();
        let sy = TILE_SIDE as f64 / dest.height();
        for y in y0..y1 {
            let ty = (((f64::from(y) + 0.5 - dest.y0) * sy).floor() as usize).min(TILE_SIDE - 1);
            for x in x0..x1 {
                let tx = (((f64::from(x) + 0.5 - dest.x0) * sx).floor() as usize).min(TILE_SIDE - 1);
                let c = tile.pixel(tx, ty);
                let i = self.index(x, y);
                self.rgba[i..i + 4].copy_from_slice(&[c.r, c.g, c.b, 255]);
            }
        }
        Ok(())
    }
}
