//! WebAssembly entry point and platform-specific code.

use crate::MapSession;
use chunkcanvas_core::config::CanvasConfig;
use chunkcanvas_core::coords::ChunkKey;
use chunkcanvas_core::export::png_data_url;
use chunkcanvas_core::fetch::WebTileFetcher;
use chunkcanvas_core::input::{KeyEvent, PointerEvent};
use chunkcanvas_core::protocol::BlockInfo;
use chunkcanvas_core::socket::{FeedEvent, WasmWebSocket};
use chunkcanvas_core::storage::{MemoryStorage, ViewStore, create_default_store};
use chunkcanvas_core::tile::{TILE_SIDE, Tile};
use chunkcanvas_core::tools::ToolKind;
use chunkcanvas_render::{Framebuffer, RenderResult, RendererError, Surface};
use kurbo::{Point, Rect, Size, Vec2};
use peniko::Color;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::time::Duration;
use wasm_bindgen::prelude::*;
use wasm_bindgen::{Clamped, JsCast};
use wasm_bindgen_futures::JsFuture;
use web_sys::{CanvasRenderingContext2d, Document, HtmlCanvasElement, ImageData};
use web_time::Instant;

const BASE_CANVAS_ID: &str = "chunkcanvas-map";
const OVERLAY_CANVAS_ID: &str = "chunkcanvas-overlay";
const RECONNECT_DELAY: Duration = Duration::from_secs(1);

fn js_error(message: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&message.to_string())
}

fn css_color(color: Color) -> String {
    let c = color.to_rgba8();
    format!("rgba({}, {}, {}, {})", c.r, c.g, c.b, f64::from(c.a) / 255.0)
}

fn context_2d(canvas: &HtmlCanvasElement) -> Result<CanvasRenderingContext2d, JsValue> {
    canvas
        .get_context("2d")?
        .ok_or_else(|| js_error("2d context unavailable"))?
        .dyn_into::<CanvasRenderingContext2d>()
        .map_err(|_| js_error("not a 2d context"))
}

/// A `<canvas>` drawn through the 2D context API.
struct CanvasSurface {
    canvas: HtmlCanvasElement,
    ctx: CanvasRenderingContext2d,
    document: Document,
    /// Offscreen bitmaps of uploaded tiles, re-uploaded when the tile's
    /// buffer is replaced by a patch.
    tiles: HashMap<ChunkKey, (Tile, HtmlCanvasElement)>,
}

impl CanvasSurface {
    fn new(document: &Document, canvas: HtmlCanvasElement) -> Result<Self, JsValue> {
        let ctx = context_2d(&canvas)?;
        Ok(Self {
            canvas,
            ctx,
            document: document.clone(),
            tiles: HashMap::new(),
        })
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.canvas.set_width(width);
        self.canvas.set_height(height);
    }

    /// The current pixels, for export.
    fn snapshot(&self) -> Result<Framebuffer, JsValue> {
        let (w, h) = (self.canvas.width(), self.canvas.height());
        let data = self.ctx.get_image_data(0.0, 0.0, f64::from(w), f64::from(h))?;
        Framebuffer::from_rgba(w, h, data.data().0).ok_or_else(|| js_error("image data size mismatch"))
    }

    fn upload(&self, tile: &Tile) -> Result<HtmlCanvasElement, JsValue> {
        let bitmap = self
            .document
            .create_element("canvas")?
            .dyn_into::<HtmlCanvasElement>()
            .map_err(|_| js_error("not a canvas"))?;
        bitmap.set_width(TILE_SIDE as u32);
        bitmap.set_height(TILE_SIDE as u32);
        let rgba: Vec<u8> = tile
            .as_bytes()
            .chunks_exact(3)
            .flat_map(|px| [px[0], px[1], px[2], 255])
            .collect();
        let image = ImageData::new_with_u8_clamped_array_and_sh(Clamped(rgba.as_slice()), TILE_SIDE as u32, TILE_SIDE as u32)?;
        context_2d(&bitmap)?.put_image_data(&image, 0.0, 0.0)?;
        Ok(bitmap)
    }
}

impl Surface for CanvasSurface {
    fn size(&self) -> Size {
        Size::new(f64::from(self.canvas.width()), f64::from(self.canvas.height()))
    }

    fn clear(&mut self, color: Color) {
        let size = self.size();
        self.ctx.clear_rect(0.0, 0.0, size.width, size.height);
        if color.to_rgba8().a > 0 {
            self.ctx.set_fill_style_str(&css_color(color));
            self.ctx.fill_rect(0.0, 0.0, size.width, size.height);
        }
    }

    fn fill_rect(&mut self, rect: Rect, color: Color) {
        self.ctx.set_fill_style_str(&css_color(color));
        self.ctx.fill_rect(rect.x0, rect.y0, rect.width(), rect.height());
    }

    fn draw_tile(&mut self, key: ChunkKey, tile: &Tile, dest: Rect) -> RenderResult<()> {
        let stale = !matches!(self.tiles.get(&key), Some((uploaded, _)) if uploaded.shares_buffer(tile));
        if stale {
            let bitmap = self
                .upload(tile)
                .map_err(|e| RendererError::Surface(format!("{:?}", e)))?;
            self.tiles.insert(key, (tile.clone(), bitmap));
        }
        let Some((_, bitmap)) = self.tiles.get(&key) else {
            return Ok(());
        };
        self.ctx.set_image_smoothing_enabled(false);
        // One extra pixel hides seams between fractional tile edges.
        self.ctx
            .draw_image_with_html_canvas_element_and_dw_and_dh(
                bitmap,
                dest.x0,
                dest.y0,
                dest.width() + 1.0,
                dest.height() + 1.0,
            )
            .map_err(|e| RendererError::RenderFailed(format!("{:?}", e)))
    }

    fn retain_tiles(&mut self, drawn: &[ChunkKey]) {
        self.tiles.retain(|key, _| drawn.contains(key));
    }
}

/// Everything the page keeps alive between frames.
struct WebApp {
    session: MapSession,
    base: CanvasSurface,
    overlay: CanvasSurface,
    socket: WasmWebSocket,
    feed_url: String,
    reconnect_at: Option<Instant>,
}

thread_local! {
    static APP: RefCell<Option<WebApp>> = const { RefCell::new(None) };
}

fn with_app<R>(f: impl FnOnce(&mut WebApp) -> R) -> Option<R> {
    APP.with(|app| app.borrow_mut().as_mut().map(f))
}

impl WebApp {
    fn frame(&mut self) {
        let now = Instant::now();
        for event in self.socket.poll_events() {
            if matches!(event, FeedEvent::Disconnected | FeedEvent::Error { .. }) {
                self.reconnect_at = Some(now + RECONNECT_DELAY);
            }
            self.session.handle_feed_event(event, now);
        }
        if self.reconnect_at.is_some_and(|at| now >= at) {
            self.reconnect_at = None;
            log::info!("Reconnecting to {}", self.feed_url);
            if let Err(e) = self.socket.connect(&self.feed_url) {
                log::warn!("Reconnect failed: {}", e);
                self.reconnect_at = Some(now + RECONNECT_DELAY);
            }
        }

        if self.session.tick(now) {
            if let Err(e) = self.session.render(&mut self.base, &mut self.overlay) {
                log::warn!("Render failed: {}", e);
            }
        }

        for message in self.session.take_outgoing() {
            if !self.socket.is_connected() {
                continue;
            }
            match message.to_json() {
                Ok(json) => {
                    if let Err(e) = self.socket.send(&json) {
                        log::warn!("Send failed: {}", e);
                    }
                }
                Err(e) => log::warn!("Failed to encode message: {}", e),
            }
        }
    }

    fn fit_to_window(&mut self) {
        let Some(window) = web_sys::window() else {
            return;
        };
        let width = window.inner_width().ok().and_then(|v| v.as_f64()).unwrap_or(0.0).max(0.0);
        let height = window.inner_height().ok().and_then(|v| v.as_f64()).unwrap_or(0.0).max(0.0);
        self.base.resize(width as u32, height as u32);
        self.overlay.resize(width as u32, height as u32);
        self.session.resize(Size::new(width, height));
        // Resizing a canvas wipes it.
        self.session.invalidate_overlay();
    }
}

fn canvas_by_id(document: &Document, id: &str, z_index: u32) -> Result<HtmlCanvasElement, JsValue> {
    if let Some(element) = document.get_element_by_id(id) {
        return element.dyn_into::<HtmlCanvasElement>().map_err(|_| js_error(format!("#{} is not a canvas", id)));
    }
    let canvas = document
        .create_element("canvas")?
        .dyn_into::<HtmlCanvasElement>()
        .map_err(|_| js_error("not a canvas"))?;
    canvas.set_id(id);
    canvas.set_attribute(
        "style",
        &format!("position:fixed;left:0;top:0;z-index:{};touch-action:none", z_index),
    )?;
    document
        .body()
        .ok_or_else(|| js_error("document has no body"))?
        .append_child(&canvas)?;
    Ok(canvas)
}

fn listen<E: JsCast + 'static>(
    target: &web_sys::EventTarget,
    name: &str,
    mut handler: impl FnMut(E) + 'static,
) -> Result<(), JsValue> {
    let closure = Closure::<dyn FnMut(web_sys::Event)>::new(move |event: web_sys::Event| {
        if let Ok(event) = event.dyn_into::<E>() {
            handler(event);
        }
    });
    target.add_event_listener_with_callback(name, closure.as_ref().unchecked_ref())?;
    closure.forget();
    Ok(())
}

fn pointer_position(event: &web_sys::MouseEvent) -> Point {
    Point::new(f64::from(event.offset_x()), f64::from(event.offset_y()))
}

fn install_listeners(window: &web_sys::Window, overlay: &HtmlCanvasElement) -> Result<(), JsValue> {
    let target: &web_sys::EventTarget = overlay.as_ref();

    listen(target, "pointerdown", |e: web_sys::PointerEvent| {
        let event = PointerEvent::Down {
            id: e.pointer_id(),
            position: pointer_position(&e),
        };
        with_app(|app| app.session.handle_pointer(&event));
    })?;
    listen(target, "pointermove", |e: web_sys::PointerEvent| {
        let event = PointerEvent::Move {
            id: e.pointer_id(),
            position: pointer_position(&e),
        };
        with_app(|app| app.session.handle_pointer(&event));
    })?;
    for name in ["pointerup", "pointercancel"] {
        listen(target, name, |e: web_sys::PointerEvent| {
            let event = PointerEvent::Up {
                id: e.pointer_id(),
                position: pointer_position(&e),
            };
            with_app(|app| app.session.handle_pointer(&event));
        })?;
    }
    listen(target, "wheel", |e: web_sys::WheelEvent| {
        e.prevent_default();
        let event = PointerEvent::Scroll {
            position: pointer_position(&e),
            delta: Vec2::new(e.delta_x(), e.delta_y()),
        };
        with_app(|app| app.session.handle_pointer(&event));
    })?;

    let window_target: &web_sys::EventTarget = window.as_ref();
    listen(window_target, "keydown", |e: web_sys::KeyboardEvent| {
        if e.key() == " " {
            e.prevent_default();
        }
        let event = KeyEvent::Pressed(e.key());
        with_app(|app| app.session.handle_key(&event));
    })?;
    listen(window_target, "keyup", |e: web_sys::KeyboardEvent| {
        let event = KeyEvent::Released(e.key());
        with_app(|app| app.session.handle_key(&event));
    })?;
    listen(window_target, "resize", |_: web_sys::Event| {
        with_app(WebApp::fit_to_window);
    })?;
    Ok(())
}

fn request_animation_frame(callback: &Closure<dyn FnMut()>) {
    let Some(window) = web_sys::window() else {
        return;
    };
    if let Err(e) = window.request_animation_frame(callback.as_ref().unchecked_ref()) {
        log::error!("requestAnimationFrame failed: {:?}", e);
    }
}

fn start_frame_loop() {
    let slot: Rc<RefCell<Option<Closure<dyn FnMut()>>>> = Rc::new(RefCell::new(None));
    let next = slot.clone();
    *slot.borrow_mut() = Some(Closure::new(move || {
        with_app(WebApp::frame);
        if let Some(callback) = next.borrow().as_ref() {
            request_animation_frame(callback);
        }
    }));
    if let Some(callback) = slot.borrow().as_ref() {
        request_animation_frame(callback);
    }
}

/// Fetch the user's block budget from `/api/block_count`.
async fn fetch_block_count(api_base: &str) -> Result<u32, JsValue> {
    let window = web_sys::window().ok_or_else(|| js_error("no window"))?;
    let url = format!("{}/api/block_count", api_base.trim_end_matches('/'));
    let response: web_sys::Response = JsFuture::from(window.fetch_with_str(&url)).await?.dyn_into()?;
    if !response.ok() {
        return Err(js_error(format!("block_count returned {}", response.status())));
    }
    let body = JsFuture::from(response.json()?).await?;
    let count = js_sys::Reflect::get(&body, &JsValue::from_str("blockCount"))?
        .as_f64()
        .unwrap_or(0.0);
    Ok(count.max(0.0) as u32)
}

fn start() -> Result<String, JsValue> {
    let window = web_sys::window().ok_or_else(|| js_error("no window"))?;
    let document = window.document().ok_or_else(|| js_error("no document"))?;
    let config = CanvasConfig {
        api_base: window.location().origin()?,
        ..CanvasConfig::default()
    };

    let base = CanvasSurface::new(&document, canvas_by_id(&document, BASE_CANVAS_ID, 0)?)?;
    let overlay_canvas = canvas_by_id(&document, OVERLAY_CANVAS_ID, 1)?;
    install_listeners(&window, &overlay_canvas)?;
    let overlay = CanvasSurface::new(&document, overlay_canvas)?;

    let store: Box<dyn ViewStore> = match create_default_store() {
        Ok(store) => store,
        Err(e) => {
            log::warn!("View will not persist: {}", e);
            Box::new(MemoryStorage::new())
        }
    };
    let api_base = config.api_base.clone();
    let feed_url = config.feed_url();
    let session = MapSession::new(config, Size::ZERO, Box::new(WebTileFetcher::new(&api_base)), store)
        .map_err(js_error)?;

    let mut socket = WasmWebSocket::new();
    if let Err(e) = socket.connect(&feed_url) {
        log::warn!("Feed connection failed: {}", e);
    }

    let app = WebApp {
        session,
        base,
        overlay,
        socket,
        feed_url,
        reconnect_at: None,
    };
    APP.with(|slot| *slot.borrow_mut() = Some(app));
    with_app(WebApp::fit_to_window);
    start_frame_loop();
    Ok(api_base)
}

/// Initialize and run the WASM application.
#[wasm_bindgen(start)]
pub async fn run_wasm() {
    console_error_panic_hook::set_once();
    if let Err(e) = console_log::init_with_level(log::Level::Info) {
        web_sys::console::warn_1(&js_error(e));
    }

    log::info!("Starting ChunkCanvas (WASM)");

    let api_base = match start() {
        Ok(api_base) => api_base,
        Err(e) => {
            log::error!("Startup failed: {:?}", e);
            return;
        }
    };
    match fetch_block_count(&api_base).await {
        Ok(count) => {
            with_app(|app| app.session.set_block_budget(count));
        }
        Err(e) => log::warn!("Could not load block count: {:?}", e),
    }
}

/// Switch the drawing tool by name (`none`, `pen`, `line`, ...).
#[wasm_bindgen]
pub fn select_tool(name: &str) -> Result<(), JsValue> {
    let tool = ToolKind::from_name(name).ok_or_else(|| js_error(format!("unknown tool {}", name)))?;
    with_app(|app| app.session.select_tool(tool));
    Ok(())
}

/// Paint the locked cell or the current selection with a block.
#[wasm_bindgen]
pub fn paint(block_id: &str) -> Result<(), JsValue> {
    with_app(|app| app.session.paint(BlockInfo::new(block_id)))
        .ok_or_else(|| js_error("not started"))?
        .map_err(js_error)
}

#[wasm_bindgen]
pub fn block_budget() -> u32 {
    with_app(|app| app.session.block_budget()).unwrap_or(0)
}

/// Last server error, if any.
#[wasm_bindgen]
pub fn error_message() -> Option<String> {
    with_app(|app| app.session.error_message().map(str::to_string)).flatten()
}

#[wasm_bindgen]
pub fn dismiss_error() {
    with_app(|app| app.session.dismiss_error());
}

/// Close the block popup and unlock the clicked cell.
#[wasm_bindgen]
pub fn close_block_info() {
    with_app(|app| app.session.clear_selected_cell());
}

/// JSON of the placement details of the locked cell.
#[wasm_bindgen]
pub fn block_info() -> Option<String> {
    with_app(|app| {
        app.session
            .block_detail()
            .and_then(|detail| serde_json::to_string(detail).ok())
    })
    .flatten()
}

/// Export the view or the selection as a PNG data URL and download it.
#[wasm_bindgen]
pub fn export_png(mix: u32) -> Result<String, JsValue> {
    let url = with_app(|app| -> Result<String, JsValue> {
        let snapshot = app.base.snapshot()?;
        let png = app.session.export_png(mix, &snapshot).map_err(js_error)?;
        Ok(png_data_url(&png))
    })
    .ok_or_else(|| js_error("not started"))??;

    let document = web_sys::window()
        .and_then(|w| w.document())
        .ok_or_else(|| js_error("no document"))?;
    let anchor = document
        .create_element("a")?
        .dyn_into::<web_sys::HtmlAnchorElement>()
        .map_err(|_| js_error("not an anchor"))?;
    anchor.set_href(&url);
    anchor.set_download("chunkcanvas.png");
    anchor.click();
    Ok(url)
}

/// Link to the structured export of the view or the selection.
#[wasm_bindgen]
pub fn nbt_url() -> Result<String, JsValue> {
    with_app(|app| app.session.nbt_url().map_err(js_error)).ok_or_else(|| js_error("not started"))?
}
