//! Headless commands: region export and feed watching.
//!
//! Usage examples:
//!   chunkcanvas export --x -64 --y 0 --width 256 --height 128 --mix 2 -o region.png
//!   chunkcanvas --api https://map.example watch --x 0 --y 0 --seconds 60

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::{Duration, Instant};

use chunkcanvas_app::{MapSession, SessionError};
use chunkcanvas_core::cache::{ChunkCache, ChunkState};
use chunkcanvas_core::config::{CanvasConfig, ConfigError};
use chunkcanvas_core::coords::{CellBounds, WorldPosition};
use chunkcanvas_core::export::{self, ExportError};
use chunkcanvas_core::fetch::{FetchError, HttpTileFetcher};
use chunkcanvas_core::socket::{FeedEvent, NativeWebSocket, SocketError};
use chunkcanvas_core::storage::{MemoryStorage, ViewState};
use chunkcanvas_render::Framebuffer;
use clap::{Parser, Subcommand};
use kurbo::Size;
use thiserror::Error;

const POLL_INTERVAL: Duration = Duration::from_millis(20);
const RECONNECT_DELAY: Duration = Duration::from_secs(1);
/// Canvas size simulated by `watch`.
const WATCH_SIZE: f64 = 1024.0;

/// CLI errors.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("Failed to read {path}: {message}")]
    Read { path: PathBuf, message: String },
    #[error("Failed to write {path}: {message}")]
    Write { path: PathBuf, message: String },
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Export(#[from] ExportError),
    #[error(transparent)]
    Socket(#[from] SocketError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("Timed out with {0} tiles still loading")]
    Timeout(usize),
}

/// ChunkCanvas headless map tools.
#[derive(Parser, Debug)]
#[command(name = "chunkcanvas", about = "ChunkCanvas headless map tools")]
pub struct CliArgs {
    /// JSON config file. Every key is optional.
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// API origin, overriding the config file.
    #[arg(long, global = true, value_name = "URL")]
    pub api: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Export a rectangle of cells as PNG.
    Export {
        /// Left edge in cells.
        #[arg(long, allow_negative_numbers = true)]
        x: i32,
        /// Top edge in cells.
        #[arg(long, allow_negative_numbers = true)]
        y: i32,
        #[arg(long)]
        width: u32,
        #[arg(long)]
        height: u32,
        /// Merge factor: each output pixel is the most common color of a
        /// mix x mix block.
        #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..=8))]
        mix: u32,
        #[arg(short, long, value_name = "FILE.png")]
        output: PathBuf,
        /// Seconds to wait for tiles.
        #[arg(long, default_value_t = 30)]
        timeout: u64,
    },
    /// Follow the realtime feed around a cell and log what changes.
    Watch {
        #[arg(long, allow_negative_numbers = true)]
        x: i32,
        #[arg(long, allow_negative_numbers = true)]
        y: i32,
        /// Stop after this many seconds instead of running until killed.
        #[arg(long)]
        seconds: Option<u64>,
    },
}

/// Run the selected command and return an OS exit code.
pub fn run(args: CliArgs) -> ExitCode {
    match execute(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn execute(args: CliArgs) -> Result<(), CliError> {
    let config = load_config(&args)?;
    match args.command {
        Command::Export {
            x,
            y,
            width,
            height,
            mix,
            output,
            timeout,
        } => export_region(&config, x, y, width, height, mix, &output, Duration::from_secs(timeout)),
        Command::Watch { x, y, seconds } => watch(&config, WorldPosition::new(x, y), seconds.map(Duration::from_secs)),
    }
}

fn load_config(args: &CliArgs) -> Result<CanvasConfig, CliError> {
    let mut config = match &args.config {
        Some(path) => {
            let json = std::fs::read_to_string(path).map_err(|e| CliError::Read {
                path: path.clone(),
                message: e.to_string(),
            })?;
            CanvasConfig::from_json(&json)?
        }
        None => CanvasConfig::default(),
    };
    if let Some(api) = &args.api {
        config.api_base = api.clone();
    }
    config.validate()?;
    Ok(config)
}

#[allow(clippy::too_many_arguments)]
fn export_region(
    config: &CanvasConfig,
    x: i32,
    y: i32,
    width: u32,
    height: u32,
    mix: u32,
    output: &Path,
    timeout: Duration,
) -> Result<(), CliError> {
    if width == 0 || height == 0 {
        return Err(ExportError::EmptyRegion { width, height }.into());
    }
    let far = |start: i32, len: u32| start.saturating_add(i32::try_from(len - 1).unwrap_or(i32::MAX));
    let bounds = CellBounds::from_corners(WorldPosition::new(x, y), WorldPosition::new(far(x, width), far(y, height)));
    let keys = bounds.chunks();
    log::info!("Exporting {}x{} cells at ({}, {}) from {} chunks", width, height, x, y, keys.len());

    let mut fetcher = HttpTileFetcher::new(&config.api_base)?;
    let mut cache = ChunkCache::new(config.cache_policy());
    cache.ensure_loaded(&keys, &mut fetcher);

    let deadline = Instant::now() + timeout;
    while cache.pending_count() > 0 {
        if Instant::now() >= deadline {
            return Err(CliError::Timeout(cache.pending_count()));
        }
        cache.drain(&mut fetcher);
        std::thread::sleep(POLL_INTERVAL);
    }
    for &key in &keys {
        if let ChunkState::Failed(e) = cache.state(key) {
            log::warn!("Chunk {} failed ({}); exporting it as background", key, e);
        }
    }

    let raster = export::read_region(&cache, bounds, config.background_color()?);
    let image = export::downsample(&raster, mix)?;
    let png = export::encode_png(&image)?;
    std::fs::write(output, &png).map_err(|e| CliError::Write {
        path: output.to_path_buf(),
        message: e.to_string(),
    })?;
    log::info!("Wrote {}x{} PNG to {}", image.width(), image.height(), output.display());
    Ok(())
}

fn watch(config: &CanvasConfig, center: WorldPosition, limit: Option<Duration>) -> Result<(), CliError> {
    let view = ViewState {
        offset_x: f64::from(center.x) - WATCH_SIZE / 2.0 / config.initial_scale,
        offset_y: f64::from(center.y) - WATCH_SIZE / 2.0 / config.initial_scale,
        scale: config.initial_scale,
    };
    let mut session = MapSession::new(
        config.clone(),
        Size::new(WATCH_SIZE, WATCH_SIZE),
        Box::new(HttpTileFetcher::new(&config.api_base)?),
        Box::new(MemoryStorage::with_state(view)),
    )?;
    let mut base = Framebuffer::new(WATCH_SIZE as u32, WATCH_SIZE as u32);
    let mut overlay = Framebuffer::new(WATCH_SIZE as u32, WATCH_SIZE as u32);

    let url = config.feed_url();
    let mut socket = NativeWebSocket::new();
    log::info!("Connecting to {}", url);
    socket.connect(&url)?;

    let started = Instant::now();
    let mut reconnect_at: Option<Instant> = None;
    loop {
        let now = Instant::now();
        if limit.is_some_and(|limit| now.duration_since(started) >= limit) {
            break;
        }

        for event in socket.poll_events() {
            match &event {
                FeedEvent::Disconnected | FeedEvent::Error { .. } => reconnect_at = Some(now + RECONNECT_DELAY),
                FeedEvent::Message(text) => log::debug!("<- {}", text),
                FeedEvent::Connected => {}
            }
            session.handle_feed_event(event, now);
        }
        if reconnect_at.is_some_and(|at| now >= at) {
            reconnect_at = None;
            log::info!("Reconnecting to {}", url);
            if let Err(e) = socket.connect(&url) {
                log::warn!("Reconnect failed: {}", e);
                reconnect_at = Some(now + RECONNECT_DELAY);
            }
        }

        if session.tick(now) {
            match session.render(&mut base, &mut overlay) {
                Ok(stats) => log::info!(
                    "Frame: {} tiles drawn, {} still missing",
                    stats.composite.drawn,
                    stats.composite.holes
                ),
                Err(e) => log::warn!("Render failed: {}", e),
            }
        }
        if let Some(message) = session.error_message().map(str::to_string) {
            log::warn!("Server says: {}", message);
            session.dismiss_error();
        }

        for message in session.take_outgoing() {
            if !socket.is_connected() {
                continue;
            }
            match message.to_json() {
                Ok(json) => {
                    if let Err(e) = socket.send(&json) {
                        log::warn!("Send failed: {}", e);
                    }
                }
                Err(e) => log::warn!("Failed to encode message: {}", e),
            }
        }
        std::thread::sleep(POLL_INTERVAL);
    }

    socket.disconnect();
    Ok(())
}
