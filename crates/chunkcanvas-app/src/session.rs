//! One map client session, independent of the windowing platform.
//!
//! The session owns every piece of map state. Platform code feeds it pointer,
//! key and feed events, ticks it once per frame, renders it into two surfaces
//! and ships whatever it queued for the server.

use chunkcanvas_core::cache::ChunkCache;
use chunkcanvas_core::camera::Viewport;
use chunkcanvas_core::config::{CanvasConfig, ConfigError};
use chunkcanvas_core::coords::{ChunkKey, WorldPosition};
use chunkcanvas_core::export::{self, ExportError};
use chunkcanvas_core::fetch::TileFetcher;
use chunkcanvas_core::input::{KeyEvent, PointerEvent, PointerGesture, PointerTracker};
use chunkcanvas_core::patch::PixelPatchEngine;
use chunkcanvas_core::protocol::{BlockDetail, BlockInfo, ClientMessage, InboundFrame, ServerMessage};
use chunkcanvas_core::raster::SelectionPath;
use chunkcanvas_core::socket::{ConnectionState, FeedEvent};
use chunkcanvas_core::storage::{ViewState, ViewStore};
use chunkcanvas_core::tile::Rgb;
use chunkcanvas_core::tools::{ToolKind, ToolManager};
use chunkcanvas_render::{Framebuffer, FrameStats, MapRenderer, RenderContext, RenderResult, Renderer, Surface, rgb_color};
use kurbo::Size;
use thiserror::Error;

#[cfg(not(target_arch = "wasm32"))]
use std::time::Instant;
#[cfg(target_arch = "wasm32")]
use web_time::Instant;

/// Session errors.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("Nothing selected to paint")]
    NothingSelected,
}

fn is_space(key: &str) -> bool {
    key == " " || key == "Space"
}

/// The map client state machine.
pub struct MapSession {
    config: CanvasConfig,
    background: Rgb,
    viewport: Viewport,
    cache: ChunkCache,
    fetcher: Box<dyn TileFetcher>,
    patches: PixelPatchEngine,
    tools: ToolManager,
    pointer: PointerTracker,
    renderer: MapRenderer,
    store: Box<dyn ViewStore>,

    selection: SelectionPath,
    selection_revision: u64,
    /// Cell locked by a click while the tool is None.
    selected_cell: Option<WorldPosition>,
    hover_cell: Option<WorldPosition>,
    space_held: bool,

    visible: Vec<ChunkKey>,
    /// Visible set last announced with `update_chunk`, sorted.
    reported: Vec<ChunkKey>,
    outgoing: Vec<ClientMessage>,

    block_detail: Option<BlockDetail>,
    error_message: Option<String>,
    block_budget: u32,
    connection: ConnectionState,
    needs_redraw: bool,
}

impl MapSession {
    /// Create a session for a canvas of `size` pixels, restoring the saved view
    /// if the store has one.
    pub fn new(
        config: CanvasConfig,
        size: Size,
        fetcher: Box<dyn TileFetcher>,
        store: Box<dyn ViewStore>,
    ) -> Result<Self, SessionError> {
        config.validate()?;
        let background = config.background_color()?;
        let mut viewport = config.viewport(size);
        match store.load() {
            Ok(Some(state)) => state.apply(&mut viewport),
            Ok(None) => {}
            Err(e) => log::warn!("Failed to restore view: {}", e),
        }

        let mut session = Self {
            background,
            viewport,
            cache: ChunkCache::new(config.cache_policy()),
            fetcher,
            patches: PixelPatchEngine::new(config.batch_window()),
            tools: ToolManager::new(),
            pointer: PointerTracker::new(config.click_threshold),
            renderer: MapRenderer::new(),
            store,
            selection: SelectionPath::default(),
            selection_revision: 0,
            selected_cell: None,
            hover_cell: None,
            space_held: false,
            visible: Vec::new(),
            reported: Vec::new(),
            outgoing: Vec::new(),
            block_detail: None,
            error_message: None,
            block_budget: 0,
            connection: ConnectionState::Disconnected,
            needs_redraw: true,
            config,
        };
        session.refresh_visible();
        log::info!(
            "Session started at ({:.1}, {:.1}) scale {}",
            session.viewport.offset.x,
            session.viewport.offset.y,
            session.viewport.scale
        );
        Ok(session)
    }

    pub fn config(&self) -> &CanvasConfig {
        &self.config
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    pub fn cache(&self) -> &ChunkCache {
        &self.cache
    }

    /// Chunks covering the viewport plus its prefetch margin.
    pub fn visible(&self) -> &[ChunkKey] {
        &self.visible
    }

    pub fn tool(&self) -> ToolKind {
        self.tools.current_tool
    }

    pub fn selection(&self) -> &SelectionPath {
        &self.selection
    }

    pub fn selected_cell(&self) -> Option<WorldPosition> {
        self.selected_cell
    }

    pub fn hover_cell(&self) -> Option<WorldPosition> {
        self.hover_cell
    }

    /// Placement details of the locked cell, once the server answered.
    pub fn block_detail(&self) -> Option<&BlockDetail> {
        self.block_detail.as_ref()
    }

    /// Last server error, until dismissed.
    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    pub fn dismiss_error(&mut self) {
        self.error_message = None;
    }

    pub fn block_budget(&self) -> u32 {
        self.block_budget
    }

    pub fn set_block_budget(&mut self, blocks: u32) {
        self.block_budget = blocks;
    }

    pub fn connection(&self) -> ConnectionState {
        self.connection
    }

    /// Whether anything changed since the last `render`.
    pub fn needs_redraw(&self) -> bool {
        self.needs_redraw
    }

    /// Switch tools. Drops the selection and any gesture in progress.
    pub fn select_tool(&mut self, tool: ToolKind) {
        if tool == self.tools.current_tool {
            return;
        }
        log::debug!("Tool: {}", tool.name());
        self.tools.set_tool(tool);
        if self.space_held {
            self.tools.begin_gesture();
        }
        self.set_selection(SelectionPath::default());
        self.needs_redraw = true;
    }

    /// Unlock the clicked cell (e.g. when its popup closes).
    pub fn clear_selected_cell(&mut self) {
        if self.selected_cell.take().is_some() {
            self.block_detail = None;
            self.needs_redraw = true;
        }
    }

    /// Redraw the overlay on the next frame even if nothing it shows changed.
    pub fn invalidate_overlay(&mut self) {
        self.renderer.invalidate_overlay();
        self.needs_redraw = true;
    }

    pub fn resize(&mut self, size: Size) {
        self.viewport.resize(size);
        self.view_changed();
    }

    pub fn handle_pointer(&mut self, event: &PointerEvent) {
        if let PointerEvent::Scroll { position, delta } = *event {
            if self.viewport.wheel_zoom(position, delta.y) {
                self.view_changed();
                self.save_view();
            }
            return;
        }
        if let PointerEvent::Down { position, .. } = *event {
            if self.space_held && self.tools.is_recording() {
                self.tools.record(self.viewport.world_from_screen(position));
            }
        }

        match self.pointer.handle(event) {
            PointerGesture::Drag { position, delta } => {
                self.update_hover(position);
                if self.space_held && self.tools.is_recording() {
                    self.tools.record(self.viewport.world_from_screen(position));
                } else {
                    self.viewport.pan(delta);
                    self.view_changed();
                }
            }
            PointerGesture::Pinch { center, spread_delta } => {
                if self.viewport.pinch_zoom(center, spread_delta) {
                    self.view_changed();
                }
            }
            PointerGesture::Click { position } => {
                if self.tools.is_recording() {
                    self.tools.record(self.viewport.world_from_screen(position));
                } else {
                    self.select_cell(self.viewport.cell_at(position));
                }
            }
            PointerGesture::DragEnd { position } => {
                if self.tools.is_recording() {
                    self.tools.record(self.viewport.world_from_screen(position));
                }
                self.save_view();
            }
            PointerGesture::Hover { position } => self.update_hover(position),
        }
    }

    /// Space starts a gesture, releasing it rasterizes the samples into the
    /// selection. Any key press clears the current selection.
    pub fn handle_key(&mut self, event: &KeyEvent) {
        match event {
            KeyEvent::Pressed(key) => {
                self.set_selection(SelectionPath::default());
                if is_space(key) && !self.space_held {
                    self.space_held = true;
                    self.tools.begin_gesture();
                }
            }
            KeyEvent::Released(key) if is_space(key) => {
                self.space_held = false;
                if self.tools.samples().len() < 2 {
                    self.tools.cancel();
                } else if let Some(path) = self.tools.end_gesture() {
                    log::debug!("{} selected {} cells", self.tools.current_tool.name(), path.len());
                    self.set_selection(path);
                }
            }
            KeyEvent::Released(_) => {}
        }
    }

    /// Feed one socket event. Frames are acknowledged before they are
    /// interpreted.
    pub fn handle_feed_event(&mut self, event: FeedEvent, now: Instant) {
        self.connection = self.connection.after(&event);
        match event {
            FeedEvent::Connected => {
                log::info!("Feed connected");
                self.reported.clear();
                self.report_visible();
            }
            FeedEvent::Message(text) => self.handle_feed_text(&text, now),
            FeedEvent::Disconnected => log::info!("Feed disconnected"),
            FeedEvent::Error { message } => log::warn!("Feed error: {}", message),
        }
    }

    /// Handle one text frame from the feed. Malformed frames are logged and
    /// dropped.
    pub fn handle_feed_text(&mut self, text: &str, now: Instant) {
        let frame = match InboundFrame::parse(text) {
            Ok(frame) => frame,
            Err(e) => {
                log::warn!("Dropping malformed frame: {}", e);
                return;
            }
        };
        if let Some(ack) = frame.ack() {
            self.outgoing.push(ack);
        }
        let message = match frame.decode() {
            Ok(message) => message,
            Err(e) => {
                log::warn!("Dropping frame: {}", e);
                return;
            }
        };

        match message {
            ServerMessage::GetChunk => self.outgoing.push(ClientMessage::update_chunk(&self.visible)),
            ServerMessage::UpdatePixel(delta) => {
                if !self.patches.apply(&mut self.cache, &[delta]).is_empty() {
                    self.needs_redraw = true;
                }
            }
            ServerMessage::UpdatePixels(deltas) => self.patches.enqueue(deltas, now),
            ServerMessage::Error { message } => {
                log::warn!("Server error: {}", message);
                self.error_message = Some(message);
            }
            ServerMessage::BlockInfo(detail) => self.block_detail = detail,
            ServerMessage::RemoveBlocks(count) => {
                self.block_budget = self.block_budget.saturating_sub(count);
            }
        }
    }

    /// Per-frame housekeeping: take in finished tile fetches and flush due
    /// pixel batches. Returns whether a redraw is needed.
    pub fn tick(&mut self, now: Instant) -> bool {
        if self.cache.drain(self.fetcher.as_mut()) > 0 {
            self.needs_redraw = true;
        }
        if let Some(report) = self.patches.tick(&mut self.cache, now) {
            log::debug!("Patched {} chunks ({} dropped)", report.patched_chunks.len(), report.dropped);
            if !report.is_empty() {
                self.needs_redraw = true;
            }
        }
        self.needs_redraw
    }

    /// Draw tiles onto `base` and the selection onto `overlay`.
    pub fn render(&mut self, base: &mut dyn Surface, overlay: &mut dyn Surface) -> RenderResult<FrameStats> {
        let cursor = self.selected_cell.or(self.hover_cell);
        let ctx = RenderContext::new(&self.viewport, &self.cache, &self.visible)
            .with_background(rgb_color(self.background))
            .with_selection(&self.selection, self.selection_revision)
            .with_tool(self.tools.current_tool)
            .with_cursor(cursor);
        let stats = self.renderer.render(&ctx, base, overlay)?;
        self.needs_redraw = false;
        Ok(stats)
    }

    /// Messages queued for the server since the last call.
    pub fn take_outgoing(&mut self) -> Vec<ClientMessage> {
        std::mem::take(&mut self.outgoing)
    }

    /// Paint the locked cell (tool None) or the current selection with
    /// `block`. Spends one block of the local budget.
    pub fn paint(&mut self, block: BlockInfo) -> Result<(), SessionError> {
        let message = match self.tools.current_tool {
            ToolKind::None => ClientMessage::Paint {
                position: self.selected_cell.ok_or(SessionError::NothingSelected)?,
                block,
            },
            tool => {
                if self.selection.is_empty() {
                    return Err(SessionError::NothingSelected);
                }
                ClientMessage::PaintByTool {
                    pixels: self.selection.cells().to_vec(),
                    block,
                    tool,
                }
            }
        };
        if self.block_budget == 0 {
            log::warn!("Painting with an empty block budget");
        }
        self.block_budget = self.block_budget.saturating_sub(1);
        self.outgoing.push(message);
        Ok(())
    }

    /// PNG of the visible canvas (tool None) or of the selection's bounding
    /// box, downsampled by `mix`.
    pub fn export_png(&self, mix: u32, base: &Framebuffer) -> Result<Vec<u8>, ExportError> {
        let source = match self.tools.current_tool {
            ToolKind::None => base.to_raster(),
            _ => {
                let bounds = export::selection_region(&self.selection)?;
                export::read_region(&self.cache, bounds, self.background)
            }
        };
        export::encode_png(&export::downsample(&source, mix)?)
    }

    /// Structured export link for the view or the selection.
    pub fn nbt_url(&self) -> Result<String, ExportError> {
        export::nbt_url(&self.config.api_base, &self.viewport, self.tools.current_tool, &self.selection)
    }

    fn select_cell(&mut self, cell: WorldPosition) {
        self.selected_cell = Some(cell);
        self.block_detail = None;
        self.outgoing.push(ClientMessage::GetBlockInfo { position: cell });
        self.needs_redraw = true;
    }

    fn update_hover(&mut self, position: kurbo::Point) {
        let cell = self.viewport.cell_at(position);
        if self.hover_cell != Some(cell) {
            self.hover_cell = Some(cell);
            if self.selected_cell.is_none() {
                self.needs_redraw = true;
            }
        }
    }

    fn set_selection(&mut self, selection: SelectionPath) {
        if selection == self.selection {
            return;
        }
        self.selection = selection;
        self.selection_revision += 1;
        self.needs_redraw = true;
    }

    fn view_changed(&mut self) {
        self.refresh_visible();
        self.needs_redraw = true;
    }

    fn refresh_visible(&mut self) {
        self.visible = self.cache.update_visible(&self.viewport, self.fetcher.as_mut());
        self.report_visible();
    }

    /// Queue `update_chunk` when the visible set differs from the last one
    /// announced.
    fn report_visible(&mut self) {
        let mut sorted = self.visible.clone();
        sorted.sort();
        if sorted != self.reported {
            self.outgoing.push(ClientMessage::update_chunk(&sorted));
            self.reported = sorted;
        }
    }

    fn save_view(&mut self) {
        if let Err(e) = self.store.save(&ViewState::of(&self.viewport)) {
            log::warn!("Failed to save view: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chunkcanvas_core::cache::ChunkState;
    use chunkcanvas_core::fetch::MemoryFetcher;
    use chunkcanvas_core::storage::MemoryStorage;
    use chunkcanvas_core::tile::Tile;
    use kurbo::{Point, Vec2};
    use std::time::Duration;

    fn session_with(fetcher: MemoryFetcher, store: MemoryStorage) -> MapSession {
        let config = CanvasConfig {
            initial_scale: 4.0,
            prefetch_margin: 0,
            ..CanvasConfig::default()
        };
        MapSession::new(config, Size::new(256.0, 256.0), Box::new(fetcher), Box::new(store)).unwrap()
    }

    fn session() -> MapSession {
        let mut fetcher = MemoryFetcher::new();
        fetcher.insert(ChunkKey::new(0, 0), Tile::filled(Rgb::new(10, 20, 30)));
        session_with(fetcher, MemoryStorage::new())
    }

    fn press(session: &mut MapSession, key: &str) {
        session.handle_key(&KeyEvent::Pressed(key.to_string()));
    }

    fn release(session: &mut MapSession, key: &str) {
        session.handle_key(&KeyEvent::Released(key.to_string()));
    }

    fn drag(session: &mut MapSession, from: Point, to: Point) {
        session.handle_pointer(&PointerEvent::Down { id: 0, position: from });
        session.handle_pointer(&PointerEvent::Move { id: 0, position: to });
        session.handle_pointer(&PointerEvent::Up { id: 0, position: to });
    }

    #[test]
    fn test_new_requests_visible_and_reports_them() {
        let mut s = session();
        // 256 px at scale 4 is one chunk.
        assert_eq!(s.visible(), &[ChunkKey::new(0, 0)]);
        assert!(matches!(s.cache().state(ChunkKey::new(0, 0)), ChunkState::Pending));
        assert_eq!(
            s.take_outgoing(),
            vec![ClientMessage::UpdateChunk {
                chunks: vec!["0:0".to_string()]
            }]
        );

        assert!(s.tick(Instant::now()));
        assert!(s.cache().tile(ChunkKey::new(0, 0)).is_some());
    }

    #[test]
    fn test_restores_saved_view() {
        let store = MemoryStorage::with_state(ViewState {
            offset_x: 100.0,
            offset_y: -40.0,
            scale: 2.0,
        });
        let s = session_with(MemoryFetcher::new(), store);
        assert_eq!(s.viewport().offset, Point::new(100.0, -40.0));
        assert!((s.viewport().scale - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_pan_reports_new_chunk_set() {
        let mut s = session();
        s.take_outgoing();
        drag(&mut s, Point::new(250.0, 100.0), Point::new(-6.0, 100.0));
        // Moved one chunk right.
        assert!((s.viewport().offset.x - 64.0).abs() < 1e-9);
        let sent = s.take_outgoing();
        assert_eq!(
            sent,
            vec![ClientMessage::UpdateChunk {
                chunks: vec!["1:0".to_string()]
            }]
        );
        assert!(matches!(s.cache().state(ChunkKey::new(1, 0)), ChunkState::Pending));

        // Small moves inside the same chunk set send nothing.
        drag(&mut s, Point::new(100.0, 100.0), Point::new(96.0, 100.0));
        assert!(s.take_outgoing().is_empty());
    }

    #[test]
    fn test_wheel_zoom_keeps_pivot() {
        let mut s = session();
        let pivot = Point::new(128.0, 64.0);
        let before = s.viewport().world_from_screen(pivot);
        s.handle_pointer(&PointerEvent::Scroll {
            position: pivot,
            delta: Vec2::new(0.0, -100.0),
        });
        assert!((s.viewport().scale - 5.0).abs() < 1e-9);
        let after = s.viewport().world_from_screen(pivot);
        assert!((before - after).hypot() < 1e-9);
    }

    #[test]
    fn test_click_locks_cell_and_asks_block_info() {
        let mut s = session();
        s.take_outgoing();
        s.handle_pointer(&PointerEvent::Down {
            id: 0,
            position: Point::new(9.0, 13.0),
        });
        s.handle_pointer(&PointerEvent::Up {
            id: 0,
            position: Point::new(10.0, 14.0),
        });
        let cell = WorldPosition::new(2, 3);
        assert_eq!(s.selected_cell(), Some(cell));
        assert_eq!(s.take_outgoing(), vec![ClientMessage::GetBlockInfo { position: cell }]);

        s.clear_selected_cell();
        assert_eq!(s.selected_cell(), None);
    }

    #[test]
    fn test_space_gesture_selects_line() {
        let mut s = session();
        s.select_tool(ToolKind::Line);
        press(&mut s, " ");
        drag(&mut s, Point::new(0.0, 0.0), Point::new(16.0, 0.0));
        release(&mut s, " ");

        // Recording never pans.
        assert_eq!(s.viewport().offset, Point::ZERO);
        let cells: Vec<_> = (0..=4).map(|x| WorldPosition::new(x, 0)).collect();
        assert_eq!(s.selection().cells(), cells.as_slice());

        // Any later key press clears it.
        press(&mut s, "a");
        assert!(s.selection().is_empty());
    }

    #[test]
    fn test_single_sample_gesture_selects_nothing() {
        let mut s = session();
        s.select_tool(ToolKind::Pen);
        press(&mut s, "Space");
        s.handle_pointer(&PointerEvent::Down {
            id: 0,
            position: Point::new(4.0, 4.0),
        });
        s.handle_pointer(&PointerEvent::Up {
            id: 0,
            position: Point::new(4.0, 4.0),
        });
        release(&mut s, "Space");
        assert!(s.selection().is_empty());
        // The release was a sample, not a click.
        assert_eq!(s.selected_cell(), None);
    }

    #[test]
    fn test_feed_frames_are_acked_and_applied() {
        let mut s = session();
        let now = Instant::now();
        s.tick(now);
        s.handle_feed_event(FeedEvent::Connected, now);
        assert_eq!(s.connection(), ConnectionState::Connected);
        s.take_outgoing();

        s.handle_feed_text(
            r#"{"type":"update_pixel","payload":{"colorNumber":16711680,"position":{"x":1,"y":2}},"messageId":"m1"}"#,
            now,
        );
        assert_eq!(s.cache().cell(WorldPosition::new(1, 2)), Some(Rgb::new(255, 0, 0)));
        assert_eq!(
            s.take_outgoing(),
            vec![ClientMessage::MessageReceiveCheck {
                message_id: serde_json::json!("m1")
            }]
        );

        s.handle_feed_text(r#"{"type":"get_chunk","payload":null}"#, now);
        assert_eq!(
            s.take_outgoing(),
            vec![ClientMessage::UpdateChunk {
                chunks: vec!["0:0".to_string()]
            }]
        );

        s.handle_feed_text("not json", now);
        s.handle_feed_text(r#"{"type":"mystery","payload":1}"#, now);
        assert!(s.take_outgoing().is_empty());
    }

    #[test]
    fn test_burst_applied_after_window() {
        let mut s = session();
        let start = Instant::now();
        s.tick(start);
        s.render(&mut Framebuffer::new(256, 256), &mut Framebuffer::new(256, 256))
            .unwrap();

        s.handle_feed_text(
            r#"{"type":"update_pixels","payload":[{"colorNumber":255,"position":{"x":0,"y":0}},{"colorNumber":255,"position":{"x":5,"y":5}}]}"#,
            start,
        );
        assert!(!s.tick(start + Duration::from_millis(10)));
        assert_eq!(s.cache().cell(WorldPosition::new(5, 5)), Some(Rgb::new(10, 20, 30)));

        assert!(s.tick(start + Duration::from_millis(1000)));
        assert_eq!(s.cache().cell(WorldPosition::new(5, 5)), Some(Rgb::new(0, 0, 255)));
    }

    #[test]
    fn test_server_state_messages() {
        let mut s = session();
        let now = Instant::now();
        s.set_block_budget(5);
        s.handle_feed_text(r#"{"type":"remove_blocks","payload":3}"#, now);
        assert_eq!(s.block_budget(), 2);
        s.handle_feed_text(r#"{"type":"error","payload":{"message":"slow down"}}"#, now);
        assert_eq!(s.error_message(), Some("slow down"));
        s.dismiss_error();
        assert_eq!(s.error_message(), None);
    }

    #[test]
    fn test_paint_requires_target() {
        let mut s = session();
        s.set_block_budget(2);
        s.take_outgoing();
        assert!(matches!(s.paint(BlockInfo::new("stone")), Err(SessionError::NothingSelected)));

        s.handle_pointer(&PointerEvent::Down {
            id: 0,
            position: Point::new(1.0, 1.0),
        });
        s.handle_pointer(&PointerEvent::Up {
            id: 0,
            position: Point::new(1.0, 1.0),
        });
        s.take_outgoing();
        s.paint(BlockInfo::new("stone")).unwrap();
        assert_eq!(s.block_budget(), 1);
        assert_eq!(
            s.take_outgoing(),
            vec![ClientMessage::Paint {
                position: WorldPosition::new(0, 0),
                block: BlockInfo::new("stone"),
            }]
        );
    }

    #[test]
    fn test_paint_by_tool_sends_selection() {
        let mut s = session();
        s.select_tool(ToolKind::FilledRectangle);
        press(&mut s, " ");
        drag(&mut s, Point::new(0.0, 0.0), Point::new(4.0, 4.0));
        release(&mut s, " ");
        s.take_outgoing();

        s.paint(BlockInfo::new("dirt")).unwrap();
        let [ClientMessage::PaintByTool { pixels, tool, .. }]: [ClientMessage; 1] = s.take_outgoing().try_into().unwrap() else {
            panic!("expected paint_by_tool");
        };
        assert_eq!(tool, ToolKind::FilledRectangle);
        assert_eq!(pixels.len(), 4);
    }

    #[test]
    fn test_render_and_export() {
        let mut s = session();
        s.tick(Instant::now());
        let mut base = Framebuffer::new(256, 256);
        let mut overlay = Framebuffer::new(256, 256);
        let stats = s.render(&mut base, &mut overlay).unwrap();
        assert_eq!(stats.composite.drawn, 1);
        assert!(!s.needs_redraw());
        assert_eq!(base.pixel(100, 100), Some([10, 20, 30, 255]));

        let png = s.export_png(8, &base).unwrap();
        assert_eq!(&png[1..4], b"PNG");

        // With a drawing tool the export needs a selection.
        s.select_tool(ToolKind::Rectangle);
        assert!(matches!(s.export_png(1, &base), Err(ExportError::NoSelection)));
        assert!(matches!(s.nbt_url(), Err(ExportError::NoSelection)));
    }

    #[test]
    fn test_nbt_url_for_view() {
        let s = session();
        assert_eq!(
            s.nbt_url().unwrap(),
            "http://localhost:3000/api/nbt?x=0&y=0&w=64&h=64"
        );
    }
}
