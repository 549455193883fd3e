//! WebSocket transport for one completion cycle.
//!
//! A [`Transport`] holds at most one live connection. `send` opens it lazily,
//! a single connection task then owns the socket: it writes outbound frames
//! queued by `send` and dispatches inbound frames to the registered handlers
//! in arrival order. Handlers are not tied to a connection and survive
//! `disconnect`.

use crate::{CanvasError, Result};
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, trace, warn};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// How long to wait for the peer to acknowledge a close before dropping the socket.
const CLOSE_GRACE: Duration = Duration::from_secs(2);

pub type MessageHandler = Arc<dyn Fn(&str, &Transport) + Send + Sync>;
pub type ErrorHandler = Arc<dyn Fn(&CanvasError, &Transport) + Send + Sync>;
pub type CloseHandler = Arc<dyn Fn(&CloseInfo, &Transport) + Send + Sync>;

/// Details of a finished connection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CloseInfo {
    /// Close code sent by the peer, if any
    pub code: Option<u16>,
    pub reason: String,
    /// Whether the connection finished with a close handshake
    pub clean: bool,
}

#[derive(Default)]
struct Handlers {
    message: Vec<MessageHandler>,
    error: Vec<ErrorHandler>,
    close: Vec<CloseHandler>,
}

/// Connection slot. `Opening` gates concurrent opens and carries the attempt number.
enum Link {
    Idle,
    Opening(u64),
    Open(Connection),
}

struct Connection {
    outgoing: mpsc::UnboundedSender<String>,
}

impl Connection {
    fn is_open(&self) -> bool {
        !self.outgoing.is_closed()
    }
}

struct Inner {
    link: Mutex<Link>,
    next_attempt: AtomicU64,
    handlers: RwLock<Handlers>,
}

/// Streaming WebSocket request wrapper. Cheap to clone; clones share the connection.
#[derive(Clone)]
pub struct Transport {
    inner: Arc<Inner>,
}

impl Default for Transport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                link: Mutex::new(Link::Idle),
                next_attempt: AtomicU64::new(0),
                handlers: RwLock::new(Handlers::default()),
            }),
        }
    }

    /// Register a handler for inbound text frames.
    pub fn on_message<F>(&self, handler: F) -> &Self
    where
        F: Fn(&str, &Transport) + Send + Sync + 'static,
    {
        self.handlers_mut(|h| h.message.push(Arc::new(handler)));
        self
    }

    /// Register a handler for connection errors.
    pub fn on_error<F>(&self, handler: F) -> &Self
    where
        F: Fn(&CanvasError, &Transport) + Send + Sync + 'static,
    {
        self.handlers_mut(|h| h.error.push(Arc::new(handler)));
        self
    }

    /// Register a handler for connection close.
    pub fn on_close<F>(&self, handler: F) -> &Self
    where
        F: Fn(&CloseInfo, &Transport) + Send + Sync + 'static,
    {
        self.handlers_mut(|h| h.close.push(Arc::new(handler)));
        self
    }

    /// Whether an open connection is currently held.
    pub fn is_connected(&self) -> bool {
        matches!(&*self.link(), Link::Open(conn) if conn.is_open())
    }

    /// Serialize `request`, opening a connection to `endpoint` if needed, and send it.
    pub async fn send<T: Serialize>(&self, request: &T, endpoint: &str) -> Result<()> {
        let payload = serde_json::to_string(request)?;
        self.ensure_open(endpoint).await?;

        let link = self.link();
        match &*link {
            Link::Open(conn) if conn.is_open() => {
                trace!(target: "canvas::transport", "Sending {} bytes", payload.len());
                conn.outgoing
                    .send(payload)
                    .map_err(|_| CanvasError::NotConnected)
            }
            _ => Err(CanvasError::NotConnected),
        }
    }

    /// Request close of the current connection, if any. Safe to call repeatedly.
    pub fn disconnect(&self) {
        let previous = std::mem::replace(&mut *self.link(), Link::Idle);
        match previous {
            // Dropping the sender tells the connection task to close the socket.
            Link::Open(conn) => {
                debug!(target: "canvas::transport", "Disconnect requested");
                drop(conn);
            }
            Link::Opening(_) => {
                debug!(target: "canvas::transport", "Disconnect requested while opening");
            }
            Link::Idle => {}
        }
    }

    async fn ensure_open(&self, endpoint: &str) -> Result<()> {
        let attempt = {
            let mut link = self.link();
            match &*link {
                Link::Open(conn) if conn.is_open() => return Ok(()),
                Link::Open(_) => return Err(CanvasError::NotConnected),
                Link::Opening(_) => {
                    warn!(
                        target: "canvas::transport",
                        "Connection to {} is already opening",
                        endpoint
                    );
                    return Err(CanvasError::NotConnected);
                }
                Link::Idle => {
                    let attempt = self.inner.next_attempt.fetch_add(1, Ordering::SeqCst);
                    *link = Link::Opening(attempt);
                    attempt
                }
            }
        };

        let connected = connect_async(endpoint).await;

        let mut link = self.link();
        if !matches!(&*link, Link::Opening(current) if *current == attempt) {
            // Disconnected while the handshake was in flight, possibly followed by
            // another attempt; the socket is dropped here.
            debug!(target: "canvas::transport", "Open attempt {} superseded", attempt);
            return Err(CanvasError::NotConnected);
        }

        match connected {
            Ok((socket, _response)) => {
                info!(target: "canvas::transport", "WebSocket open: {}", endpoint);
                let (tx, rx) = mpsc::unbounded_channel();
                *link = Link::Open(Connection { outgoing: tx });
                tokio::spawn(run_connection(socket, rx, self.clone()));
                Ok(())
            }
            Err(e) => {
                *link = Link::Idle;
                warn!(target: "canvas::transport", "Failed to connect to {}: {}", endpoint, e);
                Err(e.into())
            }
        }
    }

    fn link(&self) -> std::sync::MutexGuard<'_, Link> {
        self.inner.link.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn handlers_mut(&self, f: impl FnOnce(&mut Handlers)) {
        let mut handlers = self.inner.handlers.write().unwrap_or_else(|e| e.into_inner());
        f(&mut handlers);
    }

    fn dispatch_message(&self, text: &str) {
        let handlers = self.snapshot(|h| h.message.clone());
        for handler in handlers {
            handler(text, self);
        }
    }

    fn dispatch_error(&self, error: &CanvasError) {
        let handlers = self.snapshot(|h| h.error.clone());
        for handler in handlers {
            handler(error, self);
        }
    }

    fn dispatch_close(&self, info: &CloseInfo) {
        let handlers = self.snapshot(|h| h.close.clone());
        for handler in handlers {
            handler(info, self);
        }
    }

    /// Clone a handler list so handlers run without holding the lock.
    fn snapshot<T>(&self, f: impl FnOnce(&Handlers) -> Vec<T>) -> Vec<T> {
        let handlers = self.inner.handlers.read().unwrap_or_else(|e| e.into_inner());
        f(&handlers)
    }
}

/// Drive one connection until either side closes it.
async fn run_connection(
    mut socket: Socket,
    mut outgoing: mpsc::UnboundedReceiver<String>,
    transport: Transport,
) {
    let mut info = CloseInfo::default();

    loop {
        tokio::select! {
            cmd = outgoing.recv() => match cmd {
                Some(text) => {
                    if let Err(e) = socket.send(Message::Text(text.into())).await {
                        warn!(target: "canvas::transport", "WebSocket send failed: {}", e);
                        transport.dispatch_error(&e.into());
                        break;
                    }
                }
                None => {
                    info.clean = close_gracefully(&mut socket).await;
                    break;
                }
            },
            frame = socket.next() => match frame {
                Some(Ok(Message::Text(text))) => transport.dispatch_message(text.as_str()),
                Some(Ok(Message::Close(frame))) => {
                    if let Some(frame) = frame {
                        info.code = Some(frame.code.into());
                        info.reason = frame.reason.as_str().to_string();
                    }
                    info.clean = true;
                    break;
                }
                // Ping/pong are answered by tungstenite.
                // Binary frames are not part of the protocol.
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(target: "canvas::transport", "WebSocket error: {}", e);
                    transport.dispatch_error(&e.into());
                    break;
                }
                None => break,
            },
        }
    }

    // The receiver is gone from here on, so the link no longer reports open.
    drop(outgoing);
    info!(target: "canvas::transport", "WebSocket connection closed");
    transport.dispatch_close(&info);
}

/// Send a close frame and wait briefly for the peer's acknowledgement.
/// Frames still arriving meanwhile are discarded.
async fn close_gracefully(socket: &mut Socket) -> bool {
    if let Err(e) = socket.close(None).await {
        debug!(target: "canvas::transport", "Close frame not sent: {}", e);
        return false;
    }

    let drain = async {
        while let Some(frame) = socket.next().await {
            match frame {
                Ok(Message::Close(_)) => return true,
                Ok(_) => continue,
                Err(_) => return false,
            }
        }
        true
    };

    tokio::time::timeout(CLOSE_GRACE, drain).await.unwrap_or(false)
}
