//! Tile transport: the fetcher seam and its platform implementations.
//!
//! Fetchers never block the caller. `request` starts a fetch and `poll`
//! returns the completions that arrived since the last poll, so completions
//! are delivered through the same event loop as every other input.

use crate::coords::ChunkKey;
use crate::tile::{Tile, TileError};
use std::collections::{HashMap, HashSet, VecDeque};
use thiserror::Error;

/// Tile fetch errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("HTTP error: {0}")]
    Http(String),
    #[error("Unexpected status {0}")]
    Status(u16),
    #[error(transparent)]
    Tile(#[from] TileError),
    #[error("Tile not found")]
    NotFound,
    #[error("Fetch worker stopped")]
    Disconnected,
}

/// Outcome of one tile fetch.
#[derive(Debug, Clone)]
pub struct FetchCompletion {
    pub key: ChunkKey,
    pub result: Result<Tile, FetchError>,
}

/// URL of the tile for a chunk, e.g. `http://host/api/map?x=1&y=-2`.
pub fn tile_url(api_base: &str, key: ChunkKey) -> String {
    format!("{}/api/map?x={}&y={}", api_base.trim_end_matches('/'), key.x, key.y)
}

/// Source of tile bitmaps.
pub trait TileFetcher {
    /// Start fetching one tile.
    fn request(&mut self, key: ChunkKey);

    /// Drain completions that arrived since the last poll (non-blocking).
    fn poll(&mut self) -> Vec<FetchCompletion>;

    /// Best-effort cancellation of an in-flight request.
    fn cancel(&mut self, _key: ChunkKey) {}
}

/// In-memory fetcher for tests and offline use.
///
/// Requests complete on the next `poll`, never synchronously.
#[derive(Debug, Default)]
pub struct MemoryFetcher {
    tiles: HashMap<ChunkKey, Tile>,
    failing: HashSet<ChunkKey>,
    queued: VecDeque<ChunkKey>,
    requested: Vec<ChunkKey>,
    cancelled: Vec<ChunkKey>,
}

impl MemoryFetcher {
    /// Create a new empty fetcher; unknown keys fail with `NotFound`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `tile` for `key`.
    pub fn insert(&mut self, key: ChunkKey, tile: Tile) {
        self.tiles.insert(key, tile);
    }

    /// Make requests for `key` fail with an HTTP error.
    pub fn fail(&mut self, key: ChunkKey) {
        self.failing.insert(key);
    }

    /// Every key ever requested, in order.
    pub fn requested(&self) -> &[ChunkKey] {
        &self.requested
    }

    /// Every key ever cancelled, in order.
    pub fn cancelled(&self) -> &[ChunkKey] {
        &self.cancelled
    }

    /// Number of requests not yet delivered by `poll`.
    pub fn in_flight(&self) -> usize {
        self.queued.len()
    }
}

impl TileFetcher for MemoryFetcher {
    fn request(&mut self, key: ChunkKey) {
        self.requested.push(key);
        self.queued.push_back(key);
    }

    fn poll(&mut self) -> Vec<FetchCompletion> {
        self.queued
            .drain(..)
            .map(|key| {
                let result = if self.failing.contains(&key) {
                    Err(FetchError::Http("connection refused".to_string()))
                } else {
                    self.tiles.get(&key).cloned().ok_or(FetchError::NotFound)
                };
                FetchCompletion { key, result }
            })
            .collect()
    }

    fn cancel(&mut self, key: ChunkKey) {
        self.cancelled.push(key);
        self.queued.retain(|k| *k != key);
    }
}

// ============================================================================
// Native HTTP fetcher
// ============================================================================

#[cfg(not(target_arch = "wasm32"))]
mod native_fetcher {
    use super::*;
    use std::sync::mpsc::{Receiver, Sender, channel};
    use std::sync::{Arc, Mutex};
    use std::thread::{self, JoinHandle};
    use std::time::Duration;

    /// Default number of worker threads.
    const DEFAULT_WORKERS: usize = 4;
    const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

    /// Blocking HTTP fetcher running requests on a small pool of worker threads.
    pub struct HttpTileFetcher {
        job_tx: Option<Sender<ChunkKey>>,
        done_rx: Receiver<FetchCompletion>,
        /// Requests the pool could not take; reported as failures on the next poll.
        refused: Vec<FetchCompletion>,
        cancelled: Arc<Mutex<HashSet<ChunkKey>>>,
        _workers: Vec<JoinHandle<()>>,
    }

    impl HttpTileFetcher {
        /// Create a fetcher for the map endpoint under `api_base`.
        pub fn new(api_base: &str) -> Result<Self, FetchError> {
            Self::with_workers(api_base, DEFAULT_WORKERS)
        }

        /// Create a fetcher with an explicit worker count (at least one).
        pub fn with_workers(api_base: &str, workers: usize) -> Result<Self, FetchError> {
            let client = reqwest::blocking::Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .map_err(|e| FetchError::Http(e.to_string()))?;

            let (job_tx, job_rx) = channel::<ChunkKey>();
            let (done_tx, done_rx) = channel::<FetchCompletion>();
            let job_rx = Arc::new(Mutex::new(job_rx));
            let cancelled = Arc::new(Mutex::new(HashSet::new()));

            let handles = (0..workers.max(1))
                .map(|i| {
                    let client = client.clone();
                    let job_rx = Arc::clone(&job_rx);
                    let done_tx = done_tx.clone();
                    let cancelled = Arc::clone(&cancelled);
                    let api_base = api_base.to_string();
                    thread::spawn(move || {
                        log::debug!("Tile worker {} started", i);
                        loop {
                            let key = {
                                let Ok(rx) = job_rx.lock() else { break };
                                match rx.recv() {
                                    Ok(key) => key,
                                    Err(_) => break,
                                }
                            };
                            let skip = cancelled
                                .lock()
                                .map(|mut set| set.remove(&key))
                                .unwrap_or(false);
                            if skip {
                                log::debug!("Skipping cancelled tile {}", key);
                                continue;
                            }
                            let result = fetch_tile(&client, &tile_url(&api_base, key));
                            if done_tx.send(FetchCompletion { key, result }).is_err() {
                                break;
                            }
                        }
                        log::debug!("Tile worker {} exiting", i);
                    })
                })
                .collect();

            Ok(Self {
                job_tx: Some(job_tx),
                done_rx,
                refused: Vec::new(),
                cancelled,
                _workers: handles,
            })
        }
    }

    fn fetch_tile(client: &reqwest::blocking::Client, url: &str) -> Result<Tile, FetchError> {
        let response = client.get(url).send().map_err(|e| FetchError::Http(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }
        let bytes = response.bytes().map_err(|e| FetchError::Http(e.to_string()))?;
        Ok(Tile::decode(&bytes)?)
    }

    impl TileFetcher for HttpTileFetcher {
        fn request(&mut self, key: ChunkKey) {
            if let Ok(mut set) = self.cancelled.lock() {
                set.remove(&key);
            }
            let sent = self.job_tx.as_ref().map(|tx| tx.send(key).is_ok()).unwrap_or(false);
            if !sent {
                log::error!("Tile workers unavailable, cannot fetch {}", key);
                self.refused.push(FetchCompletion {
                    key,
                    result: Err(FetchError::Disconnected),
                });
            }
        }

        fn poll(&mut self) -> Vec<FetchCompletion> {
            let mut done = std::mem::take(&mut self.refused);
            done.extend(self.done_rx.try_iter());
            done
        }

        fn cancel(&mut self, key: ChunkKey) {
            if let Ok(mut set) = self.cancelled.lock() {
                set.insert(key);
            }
        }
    }

    impl Drop for HttpTileFetcher {
        fn drop(&mut self) {
            // Closing the job channel stops the workers after their current request.
            self.job_tx = None;
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_refused_request_fails_on_poll() {
            let mut fetcher = HttpTileFetcher::with_workers("http://127.0.0.1:9", 1).unwrap();
            fetcher.job_tx = None;

            let key = ChunkKey::new(3, -1);
            fetcher.request(key);
            let done = fetcher.poll();
            assert_eq!(done.len(), 1);
            assert_eq!(done[0].key, key);
            assert_eq!(done[0].result.as_ref().unwrap_err(), &FetchError::Disconnected);
            assert!(fetcher.poll().is_empty());
        }
    }
}

#[cfg(not(target_arch = "wasm32"))]
pub use native_fetcher::HttpTileFetcher;

// ============================================================================
// WASM fetch() fetcher
// ============================================================================

#[cfg(target_arch = "wasm32")]
mod wasm_fetcher {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;
    use wasm_bindgen::JsCast;
    use wasm_bindgen_futures::JsFuture;

    /// Fetcher using the browser `fetch()` API.
    pub struct WebTileFetcher {
        api_base: String,
        done: Rc<RefCell<Vec<FetchCompletion>>>,
        cancelled: Rc<RefCell<HashSet<ChunkKey>>>,
    }

    impl WebTileFetcher {
        /// Create a fetcher for the map endpoint under `api_base` (may be empty
        /// for same-origin requests).
        pub fn new(api_base: &str) -> Self {
            Self {
                api_base: api_base.to_string(),
                done: Rc::new(RefCell::new(Vec::new())),
                cancelled: Rc::new(RefCell::new(HashSet::new())),
            }
        }
    }

    async fn fetch_tile(url: String) -> Result<Tile, FetchError> {
        let window = web_sys::window().ok_or_else(|| FetchError::Http("no window".to_string()))?;
        let response = JsFuture::from(window.fetch_with_str(&url))
            .await
            .map_err(|e| FetchError::Http(format!("{:?}", e)))?;
        let response: web_sys::Response = response
            .dyn_into()
            .map_err(|_| FetchError::Http("not a Response".to_string()))?;
        if !response.ok() {
            return Err(FetchError::Status(response.status()));
        }
        let buffer = response
            .array_buffer()
            .map_err(|e| FetchError::Http(format!("{:?}", e)))?;
        let buffer = JsFuture::from(buffer)
            .await
            .map_err(|e| FetchError::Http(format!("{:?}", e)))?;
        let bytes = js_sys::Uint8Array::new(&buffer).to_vec();
        Ok(Tile::decode(&bytes)?)
    }

    impl TileFetcher for WebTileFetcher {
        fn request(&mut self, key: ChunkKey) {
            self.cancelled.borrow_mut().remove(&key);
            let url = tile_url(&self.api_base, key);
            let done = Rc::clone(&self.done);
            let cancelled = Rc::clone(&self.cancelled);
            wasm_bindgen_futures::spawn_local(async move {
                let result = fetch_tile(url).await;
                if cancelled.borrow_mut().remove(&key) {
                    return;
                }
                done.borrow_mut().push(FetchCompletion { key, result });
            });
        }

        fn poll(&mut self) -> Vec<FetchCompletion> {
            std::mem::take(&mut *self.done.borrow_mut())
        }

        fn cancel(&mut self, key: ChunkKey) {
            self.cancelled.borrow_mut().insert(key);
        }
    }
}

#[cfg(target_arch = "wasm32")]
pub use wasm_fetcher::WebTileFetcher;
