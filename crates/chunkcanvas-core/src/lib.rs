//! ChunkCanvas Core Library
//!
//! Platform-agnostic logic for an infinite, tile-backed pixel map: the
//! screen/world transform, the chunk cache and its fetchers, the tool
//! rasterizers, realtime pixel patching and region export.

pub mod cache;
pub mod camera;
pub mod config;
pub mod coords;
pub mod export;
pub mod fetch;
pub mod input;
pub mod patch;
pub mod protocol;
pub mod raster;
pub mod socket;
pub mod storage;
pub mod tile;
pub mod tools;

pub use cache::{CachePolicy, ChunkCache, ChunkState};
pub use camera::Viewport;
pub use config::{CanvasConfig, ConfigError};
pub use coords::{CHUNK_SIZE, CellBounds, ChunkKey, WorldPosition};
pub use export::{ExportError, RasterImage};
pub use fetch::{FetchCompletion, FetchError, MemoryFetcher, TileFetcher};
pub use input::{KeyEvent, PointerEvent, PointerGesture, PointerTracker};
pub use patch::{PixelDelta, PixelPatchEngine};
pub use protocol::{BlockDetail, BlockInfo, ClientMessage, ServerMessage};
pub use raster::{SelectionPath, rasterize};
pub use socket::{ConnectionState, FeedEvent, PlatformWebSocket};
pub use tile::{Rgb, Tile};
pub use tools::{ToolKind, ToolManager};
