//! Realtime channels
//!
//! A channel owns one persistent WebSocket connection to a server stream and
//! keeps channel-local state (notification list, stats snapshot) current.
//! [`ConnectionManager`] holds the lifecycle and reconnect policy; the
//! per-stream behaviour lives in a [`ChannelProtocol`].

pub mod dashboard;
pub mod manager;
pub mod notifications;
pub mod transport;

pub use dashboard::{DashboardChannel, DashboardProtocol};
pub use manager::ConnectionManager;
pub use notifications::{NotificationChannel, NotificationProtocol};
pub use transport::{ChannelEvent, Connector, Link, LinkEvent, LinkEvents, WsConnector};

use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};
use url::Url;

use crate::error::Result;
use crate::models::{Identity, InboundFrame};

/// Close code for an intentional, client-requested closure
pub const CLOSE_NORMAL: u16 = 1000;

/// Close code used when the client closes but still wants the stream back
pub const CLOSE_GOING_AWAY: u16 = 1001;

/// Reported when the peer closed without a status code
pub const CLOSE_NO_STATUS: u16 = 1005;

/// Reported when the connection dropped without a close frame
pub const CLOSE_ABNORMAL: u16 = 1006;

/// Delay before a lost connection is retried
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Maximum number of updates buffered per subscriber
pub const UPDATE_BUFFER_SIZE: usize = 256;

/// Lifecycle phase of a channel connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    Closed,
}

impl ConnectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionStatus::Disconnected => "disconnected",
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::Reconnecting => "reconnecting",
            ConnectionStatus::Closed => "closed",
        }
    }
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Observable connection state of one channel
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct ConnectionState {
    pub status: ConnectionStatus,
    pub last_error: Option<String>,
    pub reconnect_scheduled: bool,
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        self.status == ConnectionStatus::Connected
    }
}

/// Where a channel connects and how it recovers
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Endpoint base, e.g. `wss://auto-eden-backend.onrender.com`
    pub base_url: Url,
    /// Channel path under the base, e.g. `ws/notifications`
    pub path: String,
    pub reconnect_delay: Duration,
}

impl ChannelConfig {
    pub fn new(base_url: Url, path: impl Into<String>) -> Self {
        Self {
            base_url,
            path: path.into(),
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
        }
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Connection target: `<base>/<path>/?token=<token>`
    pub fn url_for(&self, token: &str) -> Result<Url> {
        let base = self.base_url.as_str().trim_end_matches('/');
        let path = self.path.trim_matches('/');
        let mut url = Url::parse(&format!("{}/{}/", base, path))?;
        url.query_pairs_mut().append_pair("token", token);
        Ok(url)
    }
}

/// Stream-specific half of a channel
pub trait ChannelProtocol: Send + 'static {
    /// Published to subscribers whenever channel-local state changes
    type Update: Clone + Send + 'static;

    /// Channel name used in logs
    const NAME: &'static str;

    /// Whether this identity may open (and reopen) the channel
    fn permits(&self, identity: &Identity) -> bool {
        identity.access_token().is_some()
    }

    /// Apply a recognized inbound frame
    fn on_frame(&mut self, frame: InboundFrame) -> Option<Self::Update>;
}

/// A connection manager driven by its own event pump
///
/// Socket events, reconnect timers and identity changes are applied one at
/// a time in arrival order. Dropping the channel tears it down.
pub struct Channel<P: ChannelProtocol> {
    manager: Arc<Mutex<ConnectionManager<P>>>,
    pump: JoinHandle<()>,
}

impl<P: ChannelProtocol> Channel<P> {
    /// Start the event pump; the channel stays disconnected until opened
    pub fn spawn(config: ChannelConfig, protocol: P, connector: Arc<dyn Connector>) -> Self {
        Self::start(config, protocol, connector, None)
    }

    /// Start the event pump and follow an identity source
    ///
    /// The channel opens with the current identity and is closed and
    /// reopened every time the identity changes.
    pub fn spawn_following(
        config: ChannelConfig,
        protocol: P,
        connector: Arc<dyn Connector>,
        mut identity: watch::Receiver<Identity>,
    ) -> Self {
        // Mark the starting value seen so it does not count as a change.
        let current = identity.borrow_and_update().clone();
        let channel = Self::start(config, protocol, connector, Some(identity));
        channel.open(current);
        channel
    }

    fn start(
        config: ChannelConfig,
        protocol: P,
        connector: Arc<dyn Connector>,
        identity: Option<watch::Receiver<Identity>>,
    ) -> Self {
        let (manager, events) = ConnectionManager::new(config, protocol, connector);
        let manager = Arc::new(Mutex::new(manager));
        let pump = tokio::spawn(run_pump(Arc::downgrade(&manager), events, identity));
        Self { manager, pump }
    }

    /// Run a closure against the manager
    pub fn with_manager<R>(&self, f: impl FnOnce(&mut ConnectionManager<P>) -> R) -> R {
        f(&mut self.manager.lock())
    }

    pub fn open(&self, identity: Identity) {
        self.manager.lock().open(identity);
    }

    pub fn identity_changed(&self, identity: Identity) {
        self.manager.lock().identity_changed(identity);
    }

    pub fn close(&self, intentional: bool) {
        self.manager.lock().close(intentional);
    }

    pub fn state(&self) -> ConnectionState {
        self.manager.lock().state().clone()
    }

    pub fn is_connected(&self) -> bool {
        self.manager.lock().state().is_connected()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.manager.lock().watch_state()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<P::Update> {
        self.manager.lock().subscribe()
    }

    /// Tear down: stop the pump, cancel any pending reconnect, close the link
    pub fn shutdown(self) {
        info!(channel = P::NAME, "Shutting down channel");
        // Drop does the work.
    }
}

impl<P: ChannelProtocol> Drop for Channel<P> {
    fn drop(&mut self) {
        self.pump.abort();
        self.manager.lock().shutdown();
    }
}

async fn run_pump<P: ChannelProtocol>(
    manager: Weak<Mutex<ConnectionManager<P>>>,
    mut events: mpsc::UnboundedReceiver<ChannelEvent>,
    mut identity: Option<watch::Receiver<Identity>>,
) {
    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                let Some(manager) = manager.upgrade() else { break };
                manager.lock().handle_event(event);
            }
            changed = identity_changed(&mut identity) => {
                let Some(next) = changed else {
                    debug!(channel = P::NAME, "Identity source closed; no longer following");
                    identity = None;
                    continue;
                };
                let Some(manager) = manager.upgrade() else { break };
                manager.lock().identity_changed(next);
            }
        }
    }
    debug!(channel = P::NAME, "Event pump stopped");
}

/// Next identity from the source, or `None` once it is gone
async fn identity_changed(source: &mut Option<watch::Receiver<Identity>>) -> Option<Identity> {
    match source {
        Some(rx) => match rx.changed().await {
            Ok(()) => Some(rx.borrow_and_update().clone()),
            Err(_) => None,
        },
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_for_appends_path_and_token() {
        let config = ChannelConfig::new(
            Url::parse("wss://auto-eden-backend.onrender.com").unwrap(),
            "ws/notifications",
        );
        assert_eq!(
            config.url_for("abc123").unwrap().as_str(),
            "wss://auto-eden-backend.onrender.com/ws/notifications/?token=abc123"
        );
    }

    #[test]
    fn test_url_for_normalizes_slashes_and_escapes_token() {
        let config = ChannelConfig::new(Url::parse("ws://localhost:8000/").unwrap(), "/ws/dashboard/");
        assert_eq!(
            config.url_for("a b+c").unwrap().as_str(),
            "ws://localhost:8000/ws/dashboard/?token=a+b%2Bc"
        );
    }

    #[test]
    fn test_default_reconnect_delay() {
        let config = ChannelConfig::new(Url::parse("ws://localhost").unwrap(), "ws/dashboard");
        assert_eq!(config.reconnect_delay, Duration::from_secs(5));
        let config = config.with_reconnect_delay(Duration::from_secs(1));
        assert_eq!(config.reconnect_delay, Duration::from_secs(1));
    }

    #[test]
    fn test_connection_status_display() {
        assert_eq!(ConnectionStatus::Reconnecting.to_string(), "reconnecting");
        assert!(!ConnectionState::default().is_connected());
        assert_eq!(ConnectionState::default().status, ConnectionStatus::Disconnected);
    }
}
