//! Export engine: crop a region, merge blocks by majority color and encode.

use crate::cache::ChunkCache;
use crate::camera::Viewport;
use crate::coords::{CellBounds, WorldPosition};
use crate::raster::SelectionPath;
use crate::tile::Rgb;
use crate::tools::ToolKind;
use thiserror::Error;

/// Export errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExportError {
    #[error("Cannot export an empty region ({width}x{height})")]
    EmptyRegion { width: u32, height: u32 },
    #[error("Merge factor must be at least 1")]
    InvalidMix,
    #[error("Crop {width}x{height} at ({x}, {y}) exceeds the {source_width}x{source_height} source")]
    OutOfBounds {
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        source_width: u32,
        source_height: u32,
    },
    #[error("Nothing is selected")]
    NoSelection,
    #[error("PNG encoding failed: {0}")]
    Encode(String),
}

/// A tightly packed RGB raster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RasterImage {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl RasterImage {
    /// A raster of a single color.
    pub fn filled(width: u32, height: u32, color: Rgb) -> Self {
        let pixels = std::iter::repeat([color.r, color.g, color.b])
            .take(width as usize * height as usize)
            .flatten()
            .collect();
        Self { width, height, pixels }
    }

    /// Wrap an RGB buffer. Returns `None` if the length does not match.
    pub fn from_rgb(width: u32, height: u32, pixels: Vec<u8>) -> Option<Self> {
        (pixels.len() == width as usize * height as usize * 3).then_some(Self {
            width,
            height,
            pixels,
        })
    }

    /// Build from an RGBA buffer, dropping alpha.
    pub fn from_rgba(width: u32, height: u32, rgba: &[u8]) -> Option<Self> {
        if rgba.len() != width as usize * height as usize * 4 {
            return None;
        }
        let pixels = rgba.chunks_exact(4).flat_map(|px| [px[0], px[1], px[2]]).collect();
        Some(Self { width, height, pixels })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.pixels
    }

    fn index(&self, x: u32, y: u32) -> usize {
        (y as usize * self.width as usize + x as usize) * 3
    }

    /// Color at `(x, y)`, `None` outside the raster.
    pub fn pixel(&self, x: u32, y: u32) -> Option<Rgb> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = self.index(x, y);
        Some(Rgb::new(self.pixels[i], self.pixels[i + 1], self.pixels[i + 2]))
    }

    /// Set the color at `(x, y)`; out-of-range writes are ignored.
    pub fn set_pixel(&mut self, x: u32, y: u32, color: Rgb) {
        if x >= self.width || y >= self.height {
            return;
        }
        let i = self.index(x, y);
        self.pixels[i..i + 3].copy_from_slice(&[color.r, color.g, color.b]);
    }

    /// Copy out a sub-rectangle.
    pub fn crop(&self, x: u32, y: u32, width: u32, height: u32) -> Result<Self, ExportError> {
        let fits = x.checked_add(width).is_some_and(|r| r <= self.width)
            && y.checked_add(height).is_some_and(|b| b <= self.height);
        if !fits {
            return Err(ExportError::OutOfBounds {
                x,
                y,
                width,
                height,
                source_width: self.width,
                source_height: self.height,
            });
        }
        let mut pixels = Vec::with_capacity(width as usize * height as usize * 3);
        for row in y..y + height {
            let start = self.index(x, row);
            pixels.extend_from_slice(&self.pixels[start..start + width as usize * 3]);
        }
        Ok(Self { width, height, pixels })
    }
}

/// Merge `mix`×`mix` blocks into one pixel of their most frequent color.
///
/// Output is `floor(width / mix)` × `floor(height / mix)`; trailing source
/// rows and columns that do not fill a block are dropped. Ties go to the
/// color met first in row-major scan order. A block with no covered source
/// pixel is black.
pub fn downsample(source: &RasterImage, mix: u32) -> Result<RasterImage, ExportError> {
    if mix == 0 {
        return Err(ExportError::InvalidMix);
    }
    if source.width == 0 || source.height == 0 {
        return Err(ExportError::EmptyRegion {
            width: source.width,
            height: source.height,
        });
    }
    if mix == 1 {
        return Ok(source.clone());
    }

    let out_w = source.width / mix;
    let out_h = source.height / mix;
    if out_w == 0 || out_h == 0 {
        return Err(ExportError::EmptyRegion {
            width: out_w,
            height: out_h,
        });
    }

    let mut out = RasterImage::filled(out_w, out_h, Rgb::BLACK);
    // Kept in first-seen order so ties resolve to the earliest colour.
    let mut counts: Vec<(Rgb, u32)> = Vec::new();
    for oy in 0..out_h {
        for ox in 0..out_w {
            counts.clear();
            for dy in 0..mix {
                for dx in 0..mix {
                    let Some(color) = source.pixel(ox * mix + dx, oy * mix + dy) else {
                        continue;
                    };
                    match counts.iter_mut().find(|(seen, _)| *seen == color) {
                        Some((_, n)) => *n += 1,
                        None => counts.push((color, 1)),
                    }
                }
            }
            let mut best: Option<(Rgb, u32)> = None;
            for &(color, n) in &counts {
                if best.is_none_or(|(_, top)| n > top) {
                    best = Some((color, n));
                }
            }
            out.set_pixel(ox, oy, best.map_or(Rgb::BLACK, |(color, _)| color));
        }
    }
    Ok(out)
}

/// Encode as an 8-bit RGB PNG.
pub fn encode_png(image: &RasterImage) -> Result<Vec<u8>, ExportError> {
    if image.width == 0 || image.height == 0 {
        return Err(ExportError::EmptyRegion {
            width: image.width,
            height: image.height,
        });
    }
    let mut png_data = Vec::new();
    {
        let mut encoder = png::Encoder::new(&mut png_data, image.width, image.height);
        encoder.set_color(png::ColorType::Rgb);
        encoder.set_depth(png::BitDepth::Eight);
        let mut writer = encoder
            .write_header()
            .map_err(|e| ExportError::Encode(e.to_string()))?;
        writer
            .write_image_data(&image.pixels)
            .map_err(|e| ExportError::Encode(e.to_string()))?;
    }
    Ok(png_data)
}

/// PNG as a `data:` URL, for download links.
pub fn png_data_url(png_data: &[u8]) -> String {
    use base64::{Engine, engine::general_purpose::STANDARD};
    format!("data:image/png;base64,{}", STANDARD.encode(png_data))
}

/// Read a world region from the cache at one pixel per cell. Cells whose
/// chunk is not loaded read as `background`.
pub fn read_region(cache: &ChunkCache, bounds: CellBounds, background: Rgb) -> RasterImage {
    let (width, height) = (bounds.width(), bounds.height());
    let mut image = RasterImage::filled(width, height, background);
    for (row, y) in (bounds.min.y..=bounds.max.y).enumerate() {
        for (col, x) in (bounds.min.x..=bounds.max.x).enumerate() {
            if let Some(color) = cache.cell(WorldPosition::new(x, y)) {
                image.set_pixel(col as u32, row as u32, color);
            }
        }
    }
    image
}

/// The world rectangle an export covers: the selection's bounding box.
pub fn selection_region(selection: &SelectionPath) -> Result<CellBounds, ExportError> {
    selection.bounds().ok_or(ExportError::NoSelection)
}

/// Query string for the structured (NBT) export of the current view or
/// selection.
pub fn nbt_query(viewport: &Viewport, tool: ToolKind, selection: &SelectionPath) -> Result<String, ExportError> {
    let (x, y, w, h) = if tool == ToolKind::None {
        (
            viewport.offset.x.floor() as i64,
            viewport.offset.y.floor() as i64,
            (viewport.size.width / viewport.scale).floor() as i64,
            (viewport.size.height / viewport.scale).floor() as i64,
        )
    } else {
        let b = selection_region(selection)?;
        (
            i64::from(b.min.x),
            i64::from(b.min.y),
            i64::from(b.width()),
            i64::from(b.height()),
        )
    };
    Ok(format!("x={}&y={}&w={}&h={}", x, y, w, h))
}

/// Full URL of the structured export endpoint.
pub fn nbt_url(api_base: &str, viewport: &Viewport, tool: ToolKind, selection: &SelectionPath) -> Result<String, ExportError> {
    Ok(format!(
        "{}/api/nbt?{}",
        api_base.trim_end_matches('/'),
        nbt_query(viewport, tool, selection)?
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coords::ChunkKey;
    use crate::fetch::MemoryFetcher;
    use crate::tile::Tile;
    use kurbo::{Point, Size};

    const RED: Rgb = Rgb::new(255, 0, 0);
    const BLUE: Rgb = Rgb::new(0, 0, 255);

    #[test]
    fn test_downsample_majority() {
        let mut src = RasterImage::filled(4, 4, RED);
        src.set_pixel(0, 0, BLUE);
        src.set_pixel(3, 3, BLUE);
        src.set_pixel(2, 3, BLUE);
        src.set_pixel(3, 2, BLUE);
        src.set_pixel(2, 2, BLUE);

        let out = downsample(&src, 2).unwrap();
        assert_eq!((out.width(), out.height()), (2, 2));
        assert_eq!(out.pixel(0, 0), Some(RED));
        assert_eq!(out.pixel(1, 0), Some(RED));
        assert_eq!(out.pixel(0, 1), Some(RED));
        assert_eq!(out.pixel(1, 1), Some(BLUE));
    }

    #[test]
    fn test_downsample_mix_one_is_identity() {
        let mut src = RasterImage::filled(3, 2, RED);
        src.set_pixel(1, 1, BLUE);
        assert_eq!(downsample(&src, 1).unwrap(), src);
    }

    #[test]
    fn test_downsample_red_corner_block() {
        let mut src = RasterImage::filled(4, 4, BLUE);
        for (x, y) in [(0, 0), (1, 0), (0, 1), (1, 1)] {
            src.set_pixel(x, y, RED);
        }
        let out = downsample(&src, 2).unwrap();
        assert_eq!(out.pixel(0, 0), Some(RED));
        assert_eq!(out.pixel(1, 0), Some(BLUE));
        assert_eq!(out.pixel(0, 1), Some(BLUE));
        assert_eq!(out.pixel(1, 1), Some(BLUE));
    }

    #[test]
    fn test_downsample_tie_first_encountered() {
        // Scan order R, B, B, R: blue reaches two first, red was seen first.
        let mut src = RasterImage::filled(2, 2, RED);
        src.set_pixel(1, 0, BLUE);
        src.set_pixel(0, 1, BLUE);
        assert_eq!(downsample(&src, 2).unwrap().pixel(0, 0), Some(RED));

        let mut src = RasterImage::filled(2, 2, RED);
        src.set_pixel(0, 0, BLUE);
        src.set_pixel(1, 1, BLUE);
        assert_eq!(downsample(&src, 2).unwrap().pixel(0, 0), Some(BLUE));
    }

    #[test]
    fn test_downsample_drops_partial_blocks() {
        let mut src = RasterImage::filled(5, 3, RED);
        src.set_pixel(4, 0, BLUE);
        let out = downsample(&src, 2).unwrap();
        assert_eq!((out.width(), out.height()), (2, 1));
        assert_eq!(out.pixel(1, 0), Some(RED));
    }

    #[test]
    fn test_downsample_errors() {
        let src = RasterImage::filled(3, 3, RED);
        assert_eq!(downsample(&src, 0), Err(ExportError::InvalidMix));
        assert_eq!(
            downsample(&src, 4),
            Err(ExportError::EmptyRegion { width: 0, height: 0 })
        );
        assert_eq!(
            downsample(&RasterImage::filled(0, 7, RED), 1),
            Err(ExportError::EmptyRegion { width: 0, height: 7 })
        );
    }

    #[test]
    fn test_crop() {
        let mut src = RasterImage::filled(4, 4, RED);
        src.set_pixel(2, 1, BLUE);
        let c = src.crop(1, 1, 2, 2).unwrap();
        assert_eq!(c.pixel(1, 0), Some(BLUE));
        assert_eq!(c.pixel(0, 0), Some(RED));
        assert!(matches!(src.crop(3, 3, 2, 1), Err(ExportError::OutOfBounds { .. })));
    }

    #[test]
    fn test_from_rgba_drops_alpha() {
        let img = RasterImage::from_rgba(1, 2, &[1, 2, 3, 255, 4, 5, 6, 0]).unwrap();
        assert_eq!(img.as_bytes(), &[1, 2, 3, 4, 5, 6]);
        assert!(RasterImage::from_rgba(2, 2, &[0; 3]).is_none());
    }

    #[test]
    fn test_encode_png_decodes_back() {
        let mut src = RasterImage::filled(3, 2, RED);
        src.set_pixel(2, 1, BLUE);
        let data = encode_png(&src).unwrap();
        let decoded = image::load_from_memory(&data).unwrap().to_rgb8();
        assert_eq!(decoded.dimensions(), (3, 2));
        assert_eq!(decoded.get_pixel(2, 1).0, [0, 0, 255]);
        assert!(png_data_url(&data).starts_with("data:image/png;base64,iVBORw0KGgo"));
    }

    #[test]
    fn test_read_region_fills_holes_with_background() {
        let mut cache = ChunkCache::default();
        let mut fetcher = MemoryFetcher::new();
        fetcher.insert(ChunkKey::new(0, 0), Tile::filled(RED));
        cache.ensure_loaded(&[ChunkKey::new(0, 0), ChunkKey::new(-1, 0)], &mut fetcher);
        cache.drain(&mut fetcher);

        let bg = Rgb::from_u32(0x1f1f1f);
        let bounds = CellBounds::from_corners(WorldPosition::new(-2, 0), WorldPosition::new(1, 1));
        let img = read_region(&cache, bounds, bg);
        assert_eq!((img.width(), img.height()), (4, 2));
        assert_eq!(img.pixel(0, 0), Some(bg));
        assert_eq!(img.pixel(1, 1), Some(bg));
        assert_eq!(img.pixel(2, 0), Some(RED));
        assert_eq!(img.pixel(3, 1), Some(RED));
    }

    #[test]
    fn test_nbt_url() {
        let viewport = Viewport {
            offset: Point::new(10.5, -3.2),
            scale: 4.0,
            size: Size::new(802.0, 400.0),
            ..Viewport::default()
        };
        let empty = SelectionPath::default();
        assert_eq!(
            nbt_url("http://host/", &viewport, ToolKind::None, &empty).unwrap(),
            "http://host/api/nbt?x=10&y=-4&w=200&h=100"
        );

        let selection = SelectionPath::from_cells([WorldPosition::new(-3, 5), WorldPosition::new(4, 7)]);
        assert_eq!(
            nbt_query(&viewport, ToolKind::Line, &selection).unwrap(),
            "x=-3&y=5&w=8&h=3"
        );
        assert_eq!(
            nbt_query(&viewport, ToolKind::Pen, &empty),
            Err(ExportError::NoSelection)
        );
    }
}
