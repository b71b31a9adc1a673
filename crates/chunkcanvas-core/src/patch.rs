//! Pixel patch engine: applies realtime pixel deltas to cached tiles.

use crate::cache::ChunkCache;
use crate::coords::{ChunkKey, WorldPosition};
use crate::tile::Rgb;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

#[cfg(not(target_arch = "wasm32"))]
use std::time::Instant;
#[cfg(target_arch = "wasm32")]
use web_time::Instant;

/// Default window inbound bursts are buffered for.
pub const DEFAULT_BATCH_WINDOW: Duration = Duration::from_millis(1000);

/// A single-cell color change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PixelDelta {
    pub position: WorldPosition,
    pub color: Rgb,
}

impl PixelDelta {
    pub fn new(position: WorldPosition, color: Rgb) -> Self {
        Self { position, color }
    }
}

/// Outcome of one `apply_deltas` call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatchReport {
    /// Chunks whose tile was replaced.
    pub patched_chunks: Vec<ChunkKey>,
    /// Deltas written into a tile.
    pub applied: usize,
    /// Deltas dropped because their chunk is not loaded.
    pub dropped: usize,
}

impl PatchReport {
    pub fn is_empty(&self) -> bool {
        self.patched_chunks.is_empty()
    }
}

/// Apply deltas to the cache, one copy-on-write patch per touched chunk.
///
/// Deltas for chunks that are not Loaded are dropped. Within a chunk the
/// deltas are written in order, so later writes to the same cell win.
pub fn apply_deltas(cache: &mut ChunkCache, deltas: &[PixelDelta]) -> PatchReport {
    let mut by_chunk: BTreeMap<ChunkKey, Vec<((usize, usize), Rgb)>> = BTreeMap::new();
    for delta in deltas {
        by_chunk
            .entry(delta.position.chunk())
            .or_default()
            .push((delta.position.local(), delta.color));
    }

    let mut report = PatchReport::default();
    for (key, writes) in by_chunk {
        let Some(tile) = cache.tile(key) else {
            log::debug!("Dropping {} deltas for unloaded chunk {}", writes.len(), key);
            report.dropped += writes.len();
            continue;
        };
        let count = writes.len();
        let patched = tile.patched(writes);
        if cache.replace_tile(key, patched) {
            report.applied += count;
            report.patched_chunks.push(key);
        } else {
            report.dropped += count;
        }
    }
    report
}

/// Buffers bursts of deltas and releases them as one batch once the window
/// measured from the first buffered delta has elapsed.
#[derive(Debug, Clone)]
pub struct DeltaBatcher {
    window: Duration,
    pending: Vec<PixelDelta>,
    first_at: Option<Instant>,
}

impl Default for DeltaBatcher {
    fn default() -> Self {
        Self::new(DEFAULT_BATCH_WINDOW)
    }
}

impl DeltaBatcher {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            pending: Vec::new(),
            first_at: None,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Buffer deltas received at `now`.
    pub fn push(&mut self, deltas: impl IntoIterator<Item = PixelDelta>, now: Instant) {
        let before = self.pending.len();
        self.pending.extend(deltas);
        if self.pending.len() > before && self.first_at.is_none() {
            self.first_at = Some(now);
        }
    }

    /// Number of buffered deltas.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Whether the buffered batch is due at `now`.
    pub fn is_due(&self, now: Instant) -> bool {
        self.first_at
            .is_some_and(|first| now.saturating_duration_since(first) >= self.window)
    }

    /// Take the buffered batch if it is due.
    pub fn take_due(&mut self, now: Instant) -> Option<Vec<PixelDelta>> {
        if self.is_due(now) { Some(self.take()) } else { None }
    }

    /// Take the buffered batch unconditionally.
    pub fn take(&mut self) -> Vec<PixelDelta> {
        self.first_at = None;
        std::mem::take(&mut self.pending)
    }
}

/// Applies single deltas immediately and bursts through a [`DeltaBatcher`].
#[derive(Debug, Clone, Default)]
pub struct PixelPatchEngine {
    batcher: DeltaBatcher,
}

impl PixelPatchEngine {
    pub fn new(window: Duration) -> Self {
        Self {
            batcher: DeltaBatcher::new(window),
        }
    }

    /// Apply deltas now.
    pub fn apply(&self, cache: &mut ChunkCache, deltas: &[PixelDelta]) -> PatchReport {
        apply_deltas(cache, deltas)
    }

    /// Buffer a burst of deltas.
    pub fn enqueue(&mut self, deltas: impl IntoIterator<Item = PixelDelta>, now: Instant) {
        self.batcher.push(deltas, now);
    }

    /// Apply the buffered batch if its window has elapsed.
    pub fn tick(&mut self, cache: &mut ChunkCache, now: Instant) -> Option<PatchReport> {
        let batch = self.batcher.take_due(now)?;
        let report = apply_deltas(cache, &batch);
        log::debug!(
            "Applied delta batch: {} written, {} dropped, {} chunks",
            report.applied,
            report.dropped,
            report.patched_chunks.len()
        );
        Some(report)
    }

    /// Apply whatever is buffered, due or not.
    pub fn flush(&mut self, cache: &mut ChunkCache) -> PatchReport {
        let batch = self.batcher.take();
        apply_deltas(cache, &batch)
    }

    /// Number of buffered deltas.
    pub fn buffered(&self) -> usize {
        self.batcher.len()
    }
}
