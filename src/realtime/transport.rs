//! Transport seam between a channel and the wire
//!
//! A [`Connector`] starts a connection attempt and returns immediately with a
//! [`Link`]; everything that happens afterwards (open, frames, errors,
//! closure) is reported asynchronously as [`LinkEvent`]s tagged with the
//! generation of the attempt that produced them.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{Message, Utf8Bytes};
use tracing::{debug, warn};
use url::Url;

use super::{CLOSE_ABNORMAL, CLOSE_NO_STATUS};
use crate::error::{Result, SyncError};

/// Something that happened on a link
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    Opened,
    Frame(String),
    /// Transport-level failure; always followed by `Closed`
    Failed(String),
    Closed { code: u16 },
}

/// Events consumed by a channel's pump, in arrival order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    Link { generation: u64, event: LinkEvent },
    ReconnectDue { ticket: u64 },
}

/// Sender handed to a link so it can report events for its generation
#[derive(Debug, Clone)]
pub struct LinkEvents {
    generation: u64,
    tx: mpsc::UnboundedSender<ChannelEvent>,
}

impl LinkEvents {
    pub fn new(generation: u64, tx: mpsc::UnboundedSender<ChannelEvent>) -> Self {
        Self { generation, tx }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Report an event; silently ignored once the channel is gone
    pub fn emit(&self, event: LinkEvent) {
        let _ = self.tx.send(ChannelEvent::Link {
            generation: self.generation,
            event,
        });
    }
}

/// Live connection owned exclusively by one channel
pub trait Link: Send {
    /// Queue a text frame for transmission
    fn send(&mut self, text: String) -> Result<()>;

    /// Start a close handshake with the given code
    fn close(&mut self, code: u16);
}

/// Opens links to a URL
pub trait Connector: Send + Sync {
    fn connect(&self, url: Url, events: LinkEvents) -> Box<dyn Link>;
}

enum Outgoing {
    Text(String),
    Close(u16),
}

/// WebSocket connector backed by tokio-tungstenite
#[derive(Debug, Clone, Default)]
pub struct WsConnector {
    open_timeout: Option<Duration>,
}

impl WsConnector {
    pub fn new(open_timeout: Option<Duration>) -> Self {
        Self { open_timeout }
    }
}

impl Connector for WsConnector {
    fn connect(&self, url: Url, events: LinkEvents) -> Box<dyn Link> {
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(drive_socket(url, events, rx, self.open_timeout));
        Box::new(WsLink { tx, task })
    }
}

struct WsLink {
    tx: mpsc::UnboundedSender<Outgoing>,
    task: JoinHandle<()>,
}

impl Link for WsLink {
    fn send(&mut self, text: String) -> Result<()> {
        self.tx
            .send(Outgoing::Text(text))
            .map_err(|_| SyncError::Transport("socket task has exited".to_string()))
    }

    fn close(&mut self, code: u16) {
        // Queued behind any pending handshake; the task exits after sending it.
        if self.tx.send(Outgoing::Close(code)).is_err() {
            self.task.abort();
        }
    }
}

async fn drive_socket(
    url: Url,
    events: LinkEvents,
    mut outgoing: mpsc::UnboundedReceiver<Outgoing>,
    open_timeout: Option<Duration>,
) {
    let handshake = connect_async(url.as_str());
    let connected = match open_timeout {
        Some(limit) => match timeout(limit, handshake).await {
            Ok(result) => result.map_err(SyncError::from),
            Err(_) => Err(SyncError::OpenTimeout { limit }),
        },
        None => handshake.await.map_err(SyncError::from),
    };

    let stream = match connected {
        Ok((stream, _response)) => stream,
        Err(e) => {
            events.emit(LinkEvent::Failed(e.to_string()));
            events.emit(LinkEvent::Closed {
                code: CLOSE_ABNORMAL,
            });
            return;
        }
    };

    events.emit(LinkEvent::Opened);
    let (mut sink, mut source) = stream.split();

    loop {
        tokio::select! {
            msg = source.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    events.emit(LinkEvent::Frame(text.as_str().to_owned()));
                }
                Some(Ok(Message::Close(frame))) => {
                    let code = frame
                        .map(|f| u16::from(f.code))
                        .unwrap_or(CLOSE_NO_STATUS);
                    debug!(generation = events.generation(), code, "Server closed socket");
                    events.emit(LinkEvent::Closed { code });
                    break;
                }
                Some(Ok(_)) => {
                    // Ping/pong handled by tungstenite; binary frames are not used.
                }
                Some(Err(e)) => {
                    warn!(generation = events.generation(), "WebSocket read error: {}", e);
                    events.emit(LinkEvent::Failed(e.to_string()));
                    events.emit(LinkEvent::Closed { code: CLOSE_ABNORMAL });
                    break;
                }
                None => {
                    events.emit(LinkEvent::Closed { code: CLOSE_ABNORMAL });
                    break;
                }
            },
            out = outgoing.recv() => match out {
                Some(Outgoing::Text(text)) => {
                    if let Err(e) = sink.send(Message::Text(text.into())).await {
                        warn!(generation = events.generation(), "WebSocket write error: {}", e);
                        events.emit(LinkEvent::Failed(e.to_string()));
                        events.emit(LinkEvent::Closed { code: CLOSE_ABNORMAL });
                        break;
                    }
                }
                Some(Outgoing::Close(code)) => {
                    let frame = CloseFrame {
                        code: CloseCode::from(code),
                        reason: Utf8Bytes::from_static(""),
                    };
                    if let Err(e) = sink.send(Message::Close(Some(frame))).await {
                        debug!(generation = events.generation(), "Close handshake failed: {}", e);
                    }
                    events.emit(LinkEvent::Closed { code });
                    break;
                }
                None => {
                    // Link dropped without an explicit close.
                    let _ = sink.close().await;
                    break;
                }
            },
        }
    }
}
