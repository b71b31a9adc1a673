//! Chunk cache: tile lifecycle, request coalescing and the visible-chunk set.

use crate::camera::Viewport;
use crate::coords::{CHUNK_SIZE, ChunkKey, WorldPosition};
use crate::fetch::{FetchCompletion, FetchError, TileFetcher};
use crate::tile::{Rgb, Tile};
use std::collections::{HashMap, HashSet};

/// Lifecycle of one chunk's tile.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ChunkState {
    /// Never requested (or reset after eviction/cancellation).
    #[default]
    Unrequested,
    /// A fetch is in flight; no second fetch may be issued.
    Pending,
    /// Bitmap available for compositing and patching.
    Loaded(Tile),
    /// The fetch failed; stays failed until explicitly retried.
    Failed(FetchError),
}

static UNREQUESTED: ChunkState = ChunkState::Unrequested;

/// Cache behavior knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachePolicy {
    /// Chunks of prefetch added on every side of the viewport.
    pub prefetch_margin: i32,
    /// Upper bound on Loaded/Failed chunks kept outside the visible set.
    /// `None` keeps everything.
    pub max_cached: Option<usize>,
    /// Cancel in-flight fetches that leave the visible set.
    pub cancel_offscreen: bool,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            prefetch_margin: 1,
            max_cached: None,
            cancel_offscreen: false,
        }
    }
}

/// Owns every tile bitmap, keyed by chunk.
///
/// All mutation goes through `&mut self`, so fetch completions and pixel
/// patches are serialized by whoever owns the cache (the event loop).
#[derive(Debug, Default)]
pub struct ChunkCache {
    chunks: HashMap<ChunkKey, ChunkState>,
    policy: CachePolicy,
}

impl ChunkCache {
    /// Create an empty cache.
    pub fn new(policy: CachePolicy) -> Self {
        Self {
            chunks: HashMap::new(),
            policy,
        }
    }

    pub fn policy(&self) -> &CachePolicy {
        &self.policy
    }

    /// State of a chunk; unknown chunks are `Unrequested`.
    pub fn state(&self, key: ChunkKey) -> &ChunkState {
        self.chunks.get(&key).unwrap_or(&UNREQUESTED)
    }

    /// The loaded tile for a chunk, if any.
    pub fn tile(&self, key: ChunkKey) -> Option<&Tile> {
        match self.chunks.get(&key) {
            Some(ChunkState::Loaded(tile)) => Some(tile),
            _ => None,
        }
    }

    /// Color of a single cell, if its chunk is loaded.
    pub fn cell(&self, pos: WorldPosition) -> Option<Rgb> {
        let (lx, ly) = pos.local();
        self.tile(pos.chunk()).map(|tile| tile.pixel(lx, ly))
    }

    /// Number of tracked chunks in any state other than `Unrequested`.
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn pending_count(&self) -> usize {
        self.count(|s| matches!(s, ChunkState::Pending))
    }

    pub fn loaded_count(&self) -> usize {
        self.count(|s| matches!(s, ChunkState::Loaded(_)))
    }

    fn count(&self, pred: impl Fn(&ChunkState) -> bool) -> usize {
        self.chunks.values().filter(|s| pred(s)).count()
    }

    /// Chunks covering the viewport plus the prefetch margin on every side,
    /// row-major and without duplicates.
    ///
    /// Per axis this is `ceil(extent / (CHUNK_SIZE * scale)) + 2 * margin`
    /// chunks starting at `floor(offset / CHUNK_SIZE) - margin`.
    pub fn visible_chunks(&self, viewport: &Viewport) -> Vec<ChunkKey> {
        let chunk = f64::from(CHUNK_SIZE);
        let extent = viewport.chunk_extent();
        let margin = self.policy.prefetch_margin.max(0);
        let count_x = (viewport.size.width / extent).ceil().max(0.0) as i32 + 2 * margin;
        let count_y = (viewport.size.height / extent).ceil().max(0.0) as i32 + 2 * margin;
        let start_x = (viewport.offset.x / chunk).floor() as i32 - margin;
        let start_y = (viewport.offset.y / chunk).floor() as i32 - margin;

        (0..count_y)
            .flat_map(|dy| (0..count_x).map(move |dx| ChunkKey::new(start_x + dx, start_y + dy)))
            .collect()
    }

    /// Issue exactly one fetch for every `Unrequested` key. Keys already
    /// Pending, Loaded or Failed are left alone. Returns the number of fetches
    /// issued.
    pub fn ensure_loaded(&mut self, keys: &[ChunkKey], fetcher: &mut dyn TileFetcher) -> usize {
        let mut issued = 0;
        for &key in keys {
            let state = self.chunks.entry(key).or_default();
            if *state == ChunkState::Unrequested {
                *state = ChunkState::Pending;
                fetcher.request(key);
                issued += 1;
            }
        }
        if issued > 0 {
            log::debug!("Requested {} tiles ({} pending)", issued, self.pending_count());
        }
        issued
    }

    /// Record a fetch outcome. Completions for keys that are no longer
    /// Pending (cancelled or evicted) are discarded. Returns whether the
    /// completion was accepted.
    pub fn complete(&mut self, completion: FetchCompletion) -> bool {
        let FetchCompletion { key, result } = completion;
        let Some(state) = self.chunks.get_mut(&key) else {
            log::debug!("Discarding completion for untracked chunk {}", key);
            return false;
        };
        if *state != ChunkState::Pending {
            log::debug!("Discarding stale completion for chunk {}", key);
            return false;
        }
        *state = match result {
            Ok(tile) => ChunkState::Loaded(tile),
            Err(e) => {
                log::warn!("Failed to load chunk {}: {}", key, e);
                ChunkState::Failed(e)
            }
        };
        true
    }

    /// Drain the fetcher's completions into the cache. Returns how many were
    /// accepted.
    pub fn drain(&mut self, fetcher: &mut dyn TileFetcher) -> usize {
        fetcher
            .poll()
            .into_iter()
            .map(|c| self.complete(c))
            .filter(|accepted| *accepted)
            .count()
    }

    /// Swap the bitmap of a Loaded chunk. Returns `false` (and does nothing)
    /// when the chunk is not Loaded.
    pub fn replace_tile(&mut self, key: ChunkKey, tile: Tile) -> bool {
        match self.chunks.get_mut(&key) {
            Some(ChunkState::Loaded(current)) => {
                *current = tile;
                true
            }
            _ => false,
        }
    }

    /// Loaded tiles among `keys`, in the order given.
    pub fn loaded<'a>(&'a self, keys: &'a [ChunkKey]) -> impl Iterator<Item = (ChunkKey, &'a Tile)> + 'a {
        keys.iter().filter_map(move |&key| self.tile(key).map(|tile| (key, tile)))
    }

    /// Recompute the visible set for `viewport`, apply the cancellation and
    /// eviction policies and fetch whatever is missing. Returns the visible set.
    pub fn update_visible(&mut self, viewport: &Viewport, fetcher: &mut dyn TileFetcher) -> Vec<ChunkKey> {
        let visible = self.visible_chunks(viewport);
        if self.policy.cancel_offscreen {
            self.cancel_outside(&visible, fetcher);
        }
        self.ensure_loaded(&visible, fetcher);
        if let Some(budget) = self.policy.max_cached {
            self.evict(&visible, budget);
        }
        visible
    }

    /// Return Pending chunks outside `visible` to Unrequested and cancel
    /// their fetches. Returns how many were cancelled.
    pub fn cancel_outside(&mut self, visible: &[ChunkKey], fetcher: &mut dyn TileFetcher) -> usize {
        let keep: HashSet<ChunkKey> = visible.iter().copied().collect();
        let stale: Vec<ChunkKey> = self
            .chunks
            .iter()
            .filter(|(key, state)| **state == ChunkState::Pending && !keep.contains(key))
            .map(|(key, _)| *key)
            .collect();
        for key in &stale {
            self.chunks.remove(key);
            fetcher.cancel(*key);
        }
        if !stale.is_empty() {
            log::debug!("Cancelled {} off-screen tile fetches", stale.len());
        }
        stale.len()
    }

    /// Drop Loaded/Failed chunks outside `visible` until at most `budget`
    /// of them remain, farthest from the visible centre first. Returns how
    /// many were evicted.
    pub fn evict(&mut self, visible: &[ChunkKey], budget: usize) -> usize {
        let keep: HashSet<ChunkKey> = visible.iter().copied().collect();
        let mut candidates: Vec<ChunkKey> = self
            .chunks
            .iter()
            .filter(|(key, state)| {
                !keep.contains(key) && matches!(state, ChunkState::Loaded(_) | ChunkState::Failed(_))
            })
            .map(|(key, _)| *key)
            .collect();
        if candidates.len() <= budget {
            return 0;
        }

        let center = visible
            .get(visible.len() / 2)
            .copied()
            .unwrap_or_default();
        candidates.sort_by_key(|key| std::cmp::Reverse((key.distance(center), *key)));
        let excess = candidates.len() - budget;
        for key in &candidates[..excess] {
            self.chunks.remove(key);
        }
        log::debug!("Evicted {} cached chunks", excess);
        excess
    }

    /// Reset every Failed chunk to Unrequested so the next `ensure_loaded`
    /// fetches it again. Returns how many were reset.
    pub fn retry_failed(&mut self) -> usize {
        let before = self.chunks.len();
        self.chunks.retain(|_, state| !matches!(state, ChunkState::Failed(_)));
        before - self.chunks.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::MemoryFetcher;
    use kurbo::{Point, Size};

    fn viewport(offset: Point, scale: f64, size: Size) -> Viewport {
        Viewport {
            offset,
            scale,
            size,
            ..Viewport::default()
        }
    }

    #[test]
    fn test_visible_chunks_count_and_origin() {
        let cache = ChunkCache::default();
        let chunk = f64::from(CHUNK_SIZE);
        // 2.5 chunks wide, 1 chunk high at scale 1.
        let vp = viewport(Point::new(10.0, -1.0), 1.0, Size::new(chunk * 2.5, chunk));
        let keys = cache.visible_chunks(&vp);

        // ceil(2.5) + 2 = 5 columns, ceil(1) + 2 = 3 rows.
        assert_eq!(keys.len(), 15);
        assert_eq!(keys[0], ChunkKey::new(-1, -2));
        assert_eq!(keys[14], ChunkKey::new(3, 0));
        let unique: HashSet<_> = keys.iter().collect();
        assert_eq!(unique.len(), keys.len());
    }

    #[test]
    fn test_visible_chunks_scale() {
        let cache = ChunkCache::default();
        let chunk = f64::from(CHUNK_SIZE);
        let vp = viewport(Point::ZERO, 2.0, Size::new(chunk * 4.0, chunk * 2.0));
        // 4 / 2 = 2 chunks + 2 margin; 2 / 2 = 1 chunk + 2 margin.
        assert_eq!(cache.visible_chunks(&vp).len(), 4 * 3);
    }

    #[test]
    fn test_ensure_loaded_coalesces_requests() {
        let mut cache = ChunkCache::default();
        let mut fetcher = MemoryFetcher::new();
        let keys = [ChunkKey::new(0, 0), ChunkKey::new(1, 0)];

        assert_eq!(cache.ensure_loaded(&keys, &mut fetcher), 2);
        assert_eq!(cache.state(keys[0]), &ChunkState::Pending);
        assert_eq!(cache.ensure_loaded(&keys, &mut fetcher), 0);
        assert_eq!(fetcher.requested().len(), 2);
    }

    #[test]
    fn test_completion_transitions() {
        let mut cache = ChunkCache::default();
        let mut fetcher = MemoryFetcher::new();
        let ok = ChunkKey::new(0, 0);
        let bad = ChunkKey::new(1, 0);
        fetcher.insert(ok, Tile::filled(Rgb::new(1, 2, 3)));
        fetcher.fail(bad);

        cache.ensure_loaded(&[ok, bad], &mut fetcher);
        assert_eq!(cache.drain(&mut fetcher), 2);

        assert!(matches!(cache.state(ok), ChunkState::Loaded(_)));
        assert!(matches!(cache.state(bad), ChunkState::Failed(FetchError::Http(_))));
        assert_eq!(cache.cell(WorldPosition::new(5, 5)), Some(Rgb::new(1, 2, 3)));

        // Failed chunks are not retried automatically.
        assert_eq!(cache.ensure_loaded(&[ok, bad], &mut fetcher), 0);
        assert_eq!(cache.retry_failed(), 1);
        assert_eq!(cache.ensure_loaded(&[ok, bad], &mut fetcher), 1);
    }

    #[test]
    fn test_completion_for_non_pending_is_discarded() {
        let mut cache = ChunkCache::default();
        let key = ChunkKey::new(0, 0);
        let accepted = cache.complete(FetchCompletion {
            key,
            result: Ok(Tile::filled(Rgb::BLACK)),
        });
        assert!(!accepted);
        assert_eq!(cache.state(key), &ChunkState::Unrequested);
    }

    #[test]
    fn test_replace_tile_only_when_loaded() {
        let mut cache = ChunkCache::default();
        let mut fetcher = MemoryFetcher::new();
        let key = ChunkKey::new(0, 0);
        assert!(!cache.replace_tile(key, Tile::filled(Rgb::BLACK)));

        fetcher.insert(key, Tile::filled(Rgb::BLACK));
        cache.ensure_loaded(&[key], &mut fetcher);
        assert!(!cache.replace_tile(key, Tile::filled(Rgb::BLACK)));
        cache.drain(&mut fetcher);
        assert!(cache.replace_tile(key, Tile::filled(Rgb::new(7, 7, 7))));
        assert_eq!(cache.cell(WorldPosition::new(0, 0)), Some(Rgb::new(7, 7, 7)));
    }

    #[test]
    fn test_no_eviction_by_default() {
        let mut cache = ChunkCache::default();
        let mut fetcher = MemoryFetcher::new();
        let chunk = f64::from(CHUNK_SIZE);
        let mut vp = viewport(Point::ZERO, 1.0, Size::new(chunk, chunk));

        let first = cache.update_visible(&vp, &mut fetcher);
        cache.drain(&mut fetcher);
        vp.offset = Point::new(chunk * 100.0, 0.0);
        cache.update_visible(&vp, &mut fetcher);
        cache.drain(&mut fetcher);

        for key in first {
            assert!(matches!(cache.state(key), ChunkState::Failed(_)));
        }
    }

    #[test]
    fn test_eviction_budget() {
        let mut cache = ChunkCache::new(CachePolicy {
            max_cached: Some(2),
            ..CachePolicy::default()
        });
        let mut fetcher = MemoryFetcher::new();
        let chunk = f64::from(CHUNK_SIZE);
        let mut vp = viewport(Point::ZERO, 1.0, Size::new(chunk, chunk));

        let first = cache.update_visible(&vp, &mut fetcher);
        cache.drain(&mut fetcher);
        assert_eq!(first.len(), 9);

        vp.offset = Point::new(chunk * 100.0, 0.0);
        let second = cache.update_visible(&vp, &mut fetcher);
        let off_screen = first.iter().filter(|k| *cache.state(**k) != ChunkState::Unrequested).count();
        assert_eq!(off_screen, 2);
        assert!(second.iter().all(|k| *cache.state(*k) == ChunkState::Pending));
    }

    #[test]
    fn test_cancel_offscreen() {
        let mut cache = ChunkCache::new(CachePolicy {
            cancel_offscreen: true,
            ..CachePolicy::default()
        });
        let mut fetcher = MemoryFetcher::new();
        let chunk = f64::from(CHUNK_SIZE);
        let mut vp = viewport(Point::ZERO, 1.0, Size::new(chunk, chunk));

        let first = cache.update_visible(&vp, &mut fetcher);
        vp.offset = Point::new(chunk * 100.0, 0.0);
        cache.update_visible(&vp, &mut fetcher);

        assert_eq!(fetcher.cancelled().len(), first.len());
        assert!(first.iter().all(|k| *cache.state(*k) == ChunkState::Unrequested));
        // Only the new visible set is still in flight.
        assert_eq!(fetcher.in_flight(), 9);
    }
}
