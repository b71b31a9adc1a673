//! WebSocket client for the realtime pixel feed.
//!
//! Text frames are handed over verbatim; decoding happens in
//! [`crate::protocol`] so both platforms share it.

use thiserror::Error;

/// Socket errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SocketError {
    #[error("Already connected")]
    AlreadyConnected,
    #[error("Not connected")]
    NotConnected,
    #[error("Invalid WebSocket URL: {0}")]
    InvalidUrl(String),
    #[error("Failed to create WebSocket: {0}")]
    Create(String),
    #[error("Send failed: {0}")]
    Send(String),
}

/// Feed connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Error,
}

/// What the feed client observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedEvent {
    Connected,
    Disconnected,
    /// A text frame.
    Message(String),
    Error { message: String },
}

impl ConnectionState {
    /// State after observing `event`.
    pub fn after(self, event: &FeedEvent) -> Self {
        match event {
            FeedEvent::Connected => ConnectionState::Connected,
            FeedEvent::Disconnected => ConnectionState::Disconnected,
            FeedEvent::Error { .. } => ConnectionState::Error,
            FeedEvent::Message(_) => self,
        }
    }
}

/// Derive the feed URL from a page origin (`http://host` → `ws://host/ws`).
pub fn feed_url_for_origin(origin: &str) -> String {
    let origin = origin.trim_end_matches('/');
    let ws = if let Some(rest) = origin.strip_prefix("https://") {
        format!("wss://{}", rest)
    } else if let Some(rest) = origin.strip_prefix("http://") {
        format!("ws://{}", rest)
    } else {
        origin.to_string()
    };
    format!("{}/ws", ws)
}

/// Fold polled events into `state`. Returns `true` when the connection is gone
/// and a new `connect` may be issued.
fn settle(state: &mut ConnectionState, events: &[FeedEvent]) -> bool {
    for event in events {
        *state = state.after(event);
    }
    matches!(state, ConnectionState::Disconnected | ConnectionState::Error)
}

#[cfg(target_arch = "wasm32")]
mod wasm_client {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;
    use wasm_bindgen::JsCast;
    use wasm_bindgen::prelude::*;
    use web_sys::{CloseEvent, ErrorEvent, MessageEvent, WebSocket};

    type Inbox = Rc<RefCell<Vec<FeedEvent>>>;

    /// Browser callbacks; dropping them detaches the socket.
    struct Handlers {
        _open: Closure<dyn FnMut()>,
        _message: Closure<dyn FnMut(MessageEvent)>,
        _close: Closure<dyn FnMut(CloseEvent)>,
        _error: Closure<dyn FnMut(ErrorEvent)>,
    }

    impl Handlers {
        fn attach(ws: &WebSocket, inbox: &Inbox) -> Self {
            let sink = inbox.clone();
            let open = Closure::<dyn FnMut()>::new(move || sink.borrow_mut().push(FeedEvent::Connected));
            ws.set_onopen(Some(open.as_ref().unchecked_ref()));

            let sink = inbox.clone();
            let message = Closure::<dyn FnMut(MessageEvent)>::new(move |e: MessageEvent| {
                if let Some(text) = e.data().as_string() {
                    sink.borrow_mut().push(FeedEvent::Message(text));
                }
            });
            ws.set_onmessage(Some(message.as_ref().unchecked_ref()));

            let sink = inbox.clone();
            let close = Closure::<dyn FnMut(CloseEvent)>::new(move |e: CloseEvent| {
                log::info!("Feed closed ({})", e.code());
                sink.borrow_mut().push(FeedEvent::Disconnected);
            });
            ws.set_onclose(Some(close.as_ref().unchecked_ref()));

            let sink = inbox.clone();
            let error = Closure::<dyn FnMut(ErrorEvent)>::new(move |e: ErrorEvent| {
                sink.borrow_mut().push(FeedEvent::Error { message: e.message() });
            });
            ws.set_onerror(Some(error.as_ref().unchecked_ref()));

            Self {
                _open: open,
                _message: message,
                _close: close,
                _error: error,
            }
        }
    }

    /// Feed client on the browser `WebSocket`. Callbacks queue events until
    /// `poll_events` hands them out.
    pub struct WasmWebSocket {
        link: Option<(WebSocket, Handlers)>,
        state: ConnectionState,
        inbox: Inbox,
    }

    impl WasmWebSocket {
        pub fn new() -> Self {
            Self {
                link: None,
                state: ConnectionState::Disconnected,
                inbox: Rc::new(RefCell::new(Vec::new())),
            }
        }

        pub fn connect(&mut self, url: &str) -> Result<(), SocketError> {
            if self.link.is_some() {
                return Err(SocketError::AlreadyConnected);
            }
            let ws = WebSocket::new(url).map_err(|e| SocketError::Create(format!("{:?}", e)))?;
            let handlers = Handlers::attach(&ws, &self.inbox);
            self.link = Some((ws, handlers));
            self.state = ConnectionState::Connecting;
            Ok(())
        }

        pub fn disconnect(&mut self) {
            if let Some((ws, _handlers)) = self.link.take() {
                if let Err(e) = ws.close() {
                    log::debug!("Close failed: {:?}", e);
                }
            }
            self.state = ConnectionState::Disconnected;
        }

        pub fn send(&self, text: &str) -> Result<(), SocketError> {
            match &self.link {
                Some((ws, _)) if self.is_connected() => {
                    ws.send_with_str(text).map_err(|e| SocketError::Send(format!("{:?}", e)))
                }
                _ => Err(SocketError::NotConnected),
            }
        }

        /// Events received since the last poll.
        pub fn poll_events(&mut self) -> Vec<FeedEvent> {
            let events = std::mem::take(&mut *self.inbox.borrow_mut());
            if settle(&mut self.state, &events) {
                self.link = None;
            }
            events
        }

        pub fn state(&self) -> ConnectionState {
            self.state
        }

        pub fn is_connected(&self) -> bool {
            self.state == ConnectionState::Connected
        }
    }

    impl Default for WasmWebSocket {
        fn default() -> Self {
            Self::new()
        }
    }
}

#[cfg(target_arch = "wasm32")]
pub use wasm_client::WasmWebSocket;

#[cfg(not(target_arch = "wasm32"))]
mod native_client {
    use super::*;
    use std::io::ErrorKind;
    use std::net::TcpStream;
    use std::sync::mpsc::{Receiver, Sender, TryRecvError, channel};
    use std::thread::{self, JoinHandle};
    use std::time::Duration;
    use tungstenite::stream::MaybeTlsStream;
    use tungstenite::{Message, WebSocket};
    use url::Url;

    /// Read timeout of the worker; bounds how long an outbound frame waits.
    const POLL_TIMEOUT: Duration = Duration::from_millis(50);

    type Socket = WebSocket<MaybeTlsStream<TcpStream>>;

    enum Command {
        Text(String),
        Close,
    }

    /// Channels to a running feed worker.
    struct Link {
        commands: Sender<Command>,
        events: Receiver<FeedEvent>,
        _worker: JoinHandle<()>,
    }

    /// Feed client for native targets. A worker thread owns the tungstenite
    /// socket; commands and events cross over channels.
    pub struct NativeWebSocket {
        link: Option<Link>,
        state: ConnectionState,
    }

    fn check_url(url: &str) -> Result<(), SocketError> {
        let parsed = Url::parse(url).map_err(|e| SocketError::InvalidUrl(e.to_string()))?;
        match parsed.scheme() {
            "ws" | "wss" => Ok(()),
            other => Err(SocketError::InvalidUrl(format!("unsupported scheme {}", other))),
        }
    }

    /// Forward queued commands. Returns why the worker must stop, if it must.
    fn forward_commands(socket: &mut Socket, commands: &Receiver<Command>) -> Option<String> {
        loop {
            match commands.try_recv() {
                Ok(Command::Text(text)) => {
                    if let Err(e) = socket.send(Message::Text(text.into())) {
                        return Some(format!("send failed: {}", e));
                    }
                }
                Ok(Command::Close) => {
                    if let Err(e) = socket.close(None) {
                        log::debug!("Close handshake failed: {}", e);
                    }
                    return Some("closed by client".to_string());
                }
                Err(TryRecvError::Empty) => return None,
                Err(TryRecvError::Disconnected) => return Some("client dropped".to_string()),
            }
        }
    }

    fn run_worker(url: String, commands: Receiver<Command>, events: Sender<FeedEvent>) {
        let mut socket = match tungstenite::connect(url.as_str()) {
            Ok((socket, response)) => {
                log::info!("Feed connected to {} ({})", url, response.status());
                socket
            }
            Err(e) => {
                log::error!("Feed connection to {} failed: {}", url, e);
                let _ = events.send(FeedEvent::Error {
                    message: e.to_string(),
                });
                return;
            }
        };
        if let MaybeTlsStream::Plain(tcp) = socket.get_mut() {
            if let Err(e) = tcp.set_read_timeout(Some(POLL_TIMEOUT)) {
                log::warn!("Could not set feed read timeout: {}", e);
            }
        }
        let _ = events.send(FeedEvent::Connected);

        let reason = loop {
            if let Some(reason) = forward_commands(&mut socket, &commands) {
                break reason;
            }
            match socket.read() {
                Ok(Message::Text(text)) => {
                    if events.send(FeedEvent::Message(text.to_string())).is_err() {
                        break "client dropped".to_string();
                    }
                }
                Ok(Message::Close(frame)) => break format!("server closed ({:?})", frame),
                // Pings are answered by tungstenite on the next read or write.
                Ok(_) => {}
                Err(tungstenite::Error::Io(e)) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {}
                Err(e) => break format!("read failed: {}", e),
            }
        };
        log::info!("Feed worker stopping: {}", reason);
        let _ = events.send(FeedEvent::Disconnected);
    }

    impl NativeWebSocket {
        pub fn new() -> Self {
            Self {
                link: None,
                state: ConnectionState::Disconnected,
            }
        }

        pub fn connect(&mut self, url: &str) -> Result<(), SocketError> {
            if self.link.is_some() {
                return Err(SocketError::AlreadyConnected);
            }
            check_url(url)?;

            let (commands, command_rx) = channel();
            let (event_tx, events) = channel();
            let url = url.to_string();
            let worker = thread::Builder::new()
                .name("chunkcanvas-feed".to_string())
                .spawn(move || run_worker(url, command_rx, event_tx))
                .map_err(|e| SocketError::Create(e.to_string()))?;

            self.link = Some(Link {
                commands,
                events,
                _worker: worker,
            });
            self.state = ConnectionState::Connecting;
            Ok(())
        }

        pub fn disconnect(&mut self) {
            if let Some(link) = self.link.take() {
                let _ = link.commands.send(Command::Close);
            }
            self.state = ConnectionState::Disconnected;
        }

        pub fn send(&self, text: &str) -> Result<(), SocketError> {
            match &self.link {
                Some(link) if self.is_connected() => link
                    .commands
                    .send(Command::Text(text.to_string()))
                    .map_err(|e| SocketError::Send(e.to_string())),
                _ => Err(SocketError::NotConnected),
            }
        }

        /// Events received since the last poll (non-blocking).
        pub fn poll_events(&mut self) -> Vec<FeedEvent> {
            let Some(link) = &self.link else {
                return Vec::new();
            };
            let events: Vec<FeedEvent> = link.events.try_iter().collect();
            if settle(&mut self.state, &events) {
                self.link = None;
            }
            events
        }

        pub fn state(&self) -> ConnectionState {
            self.state
        }

        pub fn is_connected(&self) -> bool {
            self.state == ConnectionState::Connected
        }
    }

    impl Default for NativeWebSocket {
        fn default() -> Self {
            Self::new()
        }
    }

    impl Drop for NativeWebSocket {
        fn drop(&mut self) {
            self.disconnect();
        }
    }
}

#[cfg(not(target_arch = "wasm32"))]
pub use native_client::NativeWebSocket;

/// The feed client for the current target.
#[cfg(target_arch = "wasm32")]
pub type PlatformWebSocket = WasmWebSocket;

#[cfg(not(target_arch = "wasm32"))]
pub type PlatformWebSocket = NativeWebSocket;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feed_url_for_origin() {
        assert_eq!(feed_url_for_origin("https://pixels.example/"), "wss://pixels.example/ws");
        assert_eq!(feed_url_for_origin("http://localhost:3000"), "ws://localhost:3000/ws");
    }

    #[test]
    fn test_state_transitions() {
        let s = ConnectionState::Connecting.after(&FeedEvent::Connected);
        assert_eq!(s, ConnectionState::Connected);
        assert_eq!(s.after(&FeedEvent::Message("{}".into())), ConnectionState::Connected);
        assert_eq!(s.after(&FeedEvent::Disconnected), ConnectionState::Disconnected);
    }

    #[test]
    fn test_settle_reports_lost_link() {
        let mut state = ConnectionState::Connecting;
        assert!(!settle(&mut state, &[FeedEvent::Connected, FeedEvent::Message("{}".into())]));
        assert_eq!(state, ConnectionState::Connected);
        assert!(settle(&mut state, &[FeedEvent::Error { message: "reset".into() }]));
    }

    #[cfg(not(target_arch = "wasm32"))]
    #[test]
    fn test_native_rejects_bad_url() {
        let mut ws = NativeWebSocket::new();
        assert!(matches!(ws.connect("http://example.com"), Err(SocketError::InvalidUrl(_))));
        assert!(matches!(ws.connect("not a url"), Err(SocketError::InvalidUrl(_))));
        assert_eq!(ws.send("x"), Err(SocketError::NotConnected));
        assert_eq!(ws.state(), ConnectionState::Disconnected);
    }
}
