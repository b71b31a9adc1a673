//! Tile bitmaps: one RGB raster per chunk.

use crate::coords::CHUNK_SIZE;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Side length of a tile bitmap in pixels.
pub const TILE_SIDE: usize = CHUNK_SIZE as usize;

/// Byte length of a tile bitmap (tightly packed RGB).
pub const TILE_BYTES: usize = TILE_SIDE * TILE_SIDE * 3;

/// A 24-bit RGB color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const BLACK: Rgb = Rgb::new(0, 0, 0);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// From a packed `0xRRGGBB` number; higher bits are ignored.
    pub const fn from_u32(n: u32) -> Self {
        Self {
            r: (n >> 16) as u8,
            g: (n >> 8) as u8,
            b: n as u8,
        }
    }

    /// Packed `0xRRGGBB` number.
    pub const fn to_u32(self) -> u32 {
        ((self.r as u32) << 16) | ((self.g as u32) << 8) | self.b as u32
    }

    /// Parse `RRGGBB` or `#RRGGBB`.
    pub fn from_hex(s: &str) -> Option<Self> {
        let s = s.trim_start_matches('#');
        if s.len() != 6 {
            return None;
        }
        u32::from_str_radix(s, 16).ok().map(Self::from_u32)
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

/// Tile construction errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TileError {
    #[error("Invalid tile buffer: expected {expected} bytes, got {actual}")]
    BufferSize { expected: usize, actual: usize },
    #[error("Invalid tile dimensions: expected {TILE_SIDE}x{TILE_SIDE}, got {width}x{height}")]
    Dimensions { width: u32, height: u32 },
    #[error("Tile decode failed: {0}")]
    Decode(String),
}

/// A `CHUNK_SIZE` x `CHUNK_SIZE` RGB bitmap.
///
/// The pixel buffer is shared and immutable: clones are cheap and a patched
/// tile is always a fresh buffer, so a reader holding a clone never observes
/// a write.
#[derive(Clone, PartialEq, Eq)]
pub struct Tile {
    pixels: Arc<[u8]>,
}

impl fmt::Debug for Tile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tile").field("bytes", &self.pixels.len()).finish()
    }
}

impl Tile {
    /// A tile of a single color.
    pub fn filled(color: Rgb) -> Self {
        let pixels: Vec<u8> = std::iter::repeat([color.r, color.g, color.b])
            .take(TILE_SIDE * TILE_SIDE)
            .flatten()
            .collect();
        Self { pixels: pixels.into() }
    }

    /// Wrap a raw RGB buffer.
    pub fn from_rgb(pixels: Vec<u8>) -> Result<Self, TileError> {
        if pixels.len() != TILE_BYTES {
            return Err(TileError::BufferSize {
                expected: TILE_BYTES,
                actual: pixels.len(),
            });
        }
        Ok(Self { pixels: pixels.into() })
    }

    /// Decode an encoded image (PNG) as served by the map endpoint.
    pub fn decode(encoded: &[u8]) -> Result<Self, TileError> {
        let image = image::load_from_memory(encoded)
            .map_err(|e| TileError::Decode(e.to_string()))?
            .to_rgb8();
        let (width, height) = image.dimensions();
        if width as usize != TILE_SIDE || height as usize != TILE_SIDE {
            return Err(TileError::Dimensions { width, height });
        }
        Self::from_rgb(image.into_raw())
    }

    /// Color at a local offset. Panics if out of range.
    pub fn pixel(&self, x: usize, y: usize) -> Rgb {
        let i = (y * TILE_SIDE + x) * 3;
        Rgb::new(self.pixels[i], self.pixels[i + 1], self.pixels[i + 2])
    }

    /// Raw RGB bytes, row-major.
    pub fn as_bytes(&self) -> &[u8] {
        &self.pixels
    }

    /// Copy this bitmap into a scratch buffer, apply the writes in order and
    /// return the new tile. Later writes to the same offset win.
    pub fn patched<I>(&self, writes: I) -> Self
    where
        I: IntoIterator<Item = ((usize, usize), Rgb)>,
    {
        let mut scratch = self.pixels.to_vec();
        for ((x, y), color) in writes {
            if x >= TILE_SIDE || y >= TILE_SIDE {
                continue;
            }
            let i = (y * TILE_SIDE + x) * 3;
            scratch[i] = color.r;
            scratch[i + 1] = color.g;
            scratch[i + 2] = color.b;
        }
        Self { pixels: scratch.into() }
    }

    /// Whether two tiles share one pixel buffer.
    pub fn shares_buffer(&self, other: &Tile) -> bool {
        Arc::ptr_eq(&self.pixels, &other.pixels)
    }
}
