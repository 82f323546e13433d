//! Connection lifecycle and reconnect policy shared by every channel

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

use super::transport::{ChannelEvent, Connector, Link, LinkEvent, LinkEvents};
use super::{
    ChannelConfig, ChannelProtocol, ConnectionState, ConnectionStatus, CLOSE_GOING_AWAY,
    CLOSE_NORMAL, UPDATE_BUFFER_SIZE,
};
use crate::error::SyncError;
use crate::models::{Identity, InboundFrame, OutboundFrame};

struct PendingReconnect {
    ticket: u64,
    timer: JoinHandle<()>,
}

/// The link and the reconnect timer, released together
#[derive(Default)]
struct Lease {
    link: Option<(u64, Box<dyn Link>)>,
    reconnect: Option<PendingReconnect>,
}

impl Lease {
    fn generation(&self) -> Option<u64> {
        self.link.as_ref().map(|(generation, _)| *generation)
    }

    fn link_mut(&mut self) -> Option<&mut Box<dyn Link>> {
        self.link.as_mut().map(|(_, link)| link)
    }

    fn cancel_reconnect(&mut self) -> bool {
        match self.reconnect.take() {
            Some(pending) => {
                pending.timer.abort();
                true
            }
            None => false,
        }
    }

    /// Cancel the pending reconnect and close the link with `code`
    fn release(&mut self, code: u16) {
        self.cancel_reconnect();
        if let Some((_, mut link)) = self.link.take() {
            link.close(code);
        }
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        self.release(CLOSE_NORMAL);
    }
}

/// Owns one persistent connection for a channel protocol
pub struct ConnectionManager<P: ChannelProtocol> {
    config: ChannelConfig,
    protocol: P,
    connector: Arc<dyn Connector>,
    identity: Identity,
    state: ConnectionState,
    state_tx: watch::Sender<ConnectionState>,
    updates: broadcast::Sender<P::Update>,
    events_tx: mpsc::UnboundedSender<ChannelEvent>,
    lease: Lease,
    intentionally_closed: bool,
    generation: u64,
    ticket: u64,
}

impl<P: ChannelProtocol> ConnectionManager<P> {
    /// Create a disconnected manager and the event queue that drives it
    pub fn new(
        config: ChannelConfig,
        protocol: P,
        connector: Arc<dyn Connector>,
    ) -> (Self, mpsc::UnboundedReceiver<ChannelEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (state_tx, _) = watch::channel(ConnectionState::default());
        let (updates, _) = broadcast::channel(UPDATE_BUFFER_SIZE);

        let manager = Self {
            config,
            protocol,
            connector,
            identity: Identity::anonymous(),
            state: ConnectionState::default(),
            state_tx,
            updates,
            events_tx,
            lease: Lease::default(),
            intentionally_closed: false,
            generation: 0,
            ticket: 0,
        };
        (manager, events_rx)
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn protocol(&self) -> &P {
        &self.protocol
    }

    pub fn protocol_mut(&mut self) -> &mut P {
        &mut self.protocol
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<P::Update> {
        self.updates.subscribe()
    }

    /// Open a connection for `identity`
    ///
    /// Skipped when the identity may not use this channel. Any existing
    /// connection and pending reconnect are released first.
    pub fn open(&mut self, identity: Identity) {
        // A rejected identity leaves the current connection untouched.
        if !self.protocol.permits(&identity) {
            debug!("{}", SyncError::AuthGate { channel: P::NAME });
            return;
        }
        self.identity = identity;
        self.connect(ConnectionStatus::Connecting);
    }

    /// Close intentionally, then reopen for the new identity
    ///
    /// The new identity is adopted even when it may not use the channel,
    /// which is how a logout closes it.
    pub fn identity_changed(&mut self, identity: Identity) {
        if self.lease.link.is_some() || self.lease.reconnect.is_some() {
            self.close(true);
        }
        self.identity = identity;
        self.connect(ConnectionStatus::Connecting);
    }

    /// Parse and route one inbound text frame; malformed frames are dropped
    pub fn dispatch(&mut self, raw: &str) {
        let frame = match InboundFrame::parse(raw) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(channel = P::NAME, "Dropping malformed frame: {}", e);
                return;
            }
        };

        if frame == InboundFrame::Unknown {
            debug!(channel = P::NAME, "Ignoring frame of unknown type");
            return;
        }

        if let Some(update) = self.protocol.on_frame(frame) {
            // Nobody listening is fine.
            let _ = self.updates.send(update);
        }
    }

    /// Transmit a command if connected; returns whether it was handed to the link
    ///
    /// Commands issued while not connected are dropped, never queued.
    pub fn send(&mut self, command: OutboundFrame) -> bool {
        if !self.state.is_connected() {
            debug!(
                "{}",
                SyncError::DroppedCommand {
                    channel: P::NAME,
                    command: command.kind(),
                }
            );
            return false;
        }

        let text = match command.to_json() {
            Ok(text) => text,
            Err(e) => {
                warn!(channel = P::NAME, "Failed to encode {}: {}", command.kind(), e);
                return false;
            }
        };

        let Some(link) = self.lease.link_mut() else {
            return false;
        };
        match link.send(text) {
            Ok(()) => true,
            Err(e) => {
                warn!(channel = P::NAME, "Failed to send {}: {}", command.kind(), e);
                false
            }
        }
    }

    /// Keepalive probe; the server answers with `pong`
    pub fn ping(&mut self) -> bool {
        self.send(OutboundFrame::Ping)
    }

    /// Close the connection
    ///
    /// An intentional close uses code 1000 and never reconnects. Otherwise
    /// the reconnect policy runs as for any other unexpected closure.
    pub fn close(&mut self, intentional: bool) {
        let code = if intentional {
            CLOSE_NORMAL
        } else {
            CLOSE_GOING_AWAY
        };
        self.intentionally_closed = intentional;
        self.lease.release(code);
        info!(channel = P::NAME, code, "Channel closed");

        let scheduled = !intentional && self.schedule_reconnect();
        self.set_state(ConnectionStatus::Closed, self.state.last_error.clone(), scheduled);
    }

    /// Teardown: cancel the pending reconnect and close with code 1000
    pub fn shutdown(&mut self) {
        self.intentionally_closed = true;
        self.lease.release(CLOSE_NORMAL);
        self.set_state(ConnectionStatus::Closed, self.state.last_error.clone(), false);
    }

    /// Apply one event from the pump
    pub fn handle_event(&mut self, event: ChannelEvent) {
        match event {
            ChannelEvent::Link { generation, event } => {
                if self.lease.generation() != Some(generation) {
                    debug!(channel = P::NAME, generation, "Ignoring event from stale link");
                    return;
                }
                self.handle_link_event(event);
            }
            ChannelEvent::ReconnectDue { ticket } => {
                let due = self
                    .lease
                    .reconnect
                    .as_ref()
                    .is_some_and(|pending| pending.ticket == ticket);
                if !due {
                    debug!(channel = P::NAME, ticket, "Ignoring cancelled reconnect");
                    return;
                }
                self.lease.reconnect = None;
                self.fire_reconnect();
            }
        }
    }

    fn handle_link_event(&mut self, event: LinkEvent) {
        match event {
            LinkEvent::Opened => {
                info!(channel = P::NAME, generation = self.generation, "Channel connected");
                self.set_state(ConnectionStatus::Connected, None, false);
            }
            LinkEvent::Frame(raw) => self.dispatch(&raw),
            LinkEvent::Failed(reason) => {
                // Reconnection is driven by the closure that follows.
                warn!(channel = P::NAME, "Transport error: {}", reason);
                self.set_state(ConnectionStatus::Disconnected, Some(reason), false);
            }
            LinkEvent::Closed { code } => {
                self.lease.link = None;
                info!(channel = P::NAME, code, "Channel connection closed");
                let scheduled = code != CLOSE_NORMAL && self.schedule_reconnect();
                let status = if scheduled {
                    ConnectionStatus::Reconnecting
                } else {
                    ConnectionStatus::Disconnected
                };
                self.set_state(status, self.state.last_error.clone(), scheduled);
            }
        }
    }

    fn permitted(&self) -> bool {
        self.protocol.permits(&self.identity)
    }

    fn connect(&mut self, status: ConnectionStatus) -> bool {
        if !self.permitted() {
            debug!("{}", SyncError::AuthGate { channel: P::NAME });
            return false;
        }
        let Some(token) = self.identity.access_token() else {
            return false;
        };

        let url = match self.config.url_for(token) {
            Ok(url) => url,
            Err(e) => {
                warn!(channel = P::NAME, "Cannot build channel URL: {}", e);
                self.set_state(ConnectionStatus::Disconnected, Some(e.to_string()), false);
                return false;
            }
        };

        // One live connection per channel.
        self.lease.release(CLOSE_NORMAL);
        self.intentionally_closed = false;
        self.generation += 1;

        info!(
            channel = P::NAME,
            path = %self.config.path,
            generation = self.generation,
            "Opening channel"
        );
        let events = LinkEvents::new(self.generation, self.events_tx.clone());
        let link = self.connector.connect(url, events);
        self.lease.link = Some((self.generation, link));
        self.set_state(status, self.state.last_error.clone(), false);
        true
    }

    /// Schedule one reconnect attempt if the policy allows it
    fn schedule_reconnect(&mut self) -> bool {
        if self.intentionally_closed {
            return false;
        }
        if !self.permitted() {
            debug!(channel = P::NAME, "Not reconnecting: identity no longer permitted");
            return false;
        }
        if self.lease.reconnect.is_some() {
            return true;
        }

        self.ticket += 1;
        let ticket = self.ticket;
        let delay = self.config.reconnect_delay;
        let deadline = Instant::now() + delay;
        let events = self.events_tx.clone();
        let timer = tokio::spawn(async move {
            sleep_until(deadline).await;
            let _ = events.send(ChannelEvent::ReconnectDue { ticket });
        });
        self.lease.reconnect = Some(PendingReconnect { ticket, timer });

        info!(
            channel = P::NAME,
            delay_secs = delay.as_secs(),
            "Reconnect scheduled"
        );
        true
    }

    fn fire_reconnect(&mut self) {
        // The delay may have spanned a logout or token revocation.
        if self.intentionally_closed || !self.permitted() {
            debug!(channel = P::NAME, "Reconnect skipped at fire time");
            self.set_state(ConnectionStatus::Disconnected, self.state.last_error.clone(), false);
            return;
        }
        info!(channel = P::NAME, "Reconnecting");
        self.connect(ConnectionStatus::Connecting);
    }

    fn set_state(
        &mut self,
        status: ConnectionStatus,
        last_error: Option<String>,
        reconnect_scheduled: bool,
    ) {
        self.state = ConnectionState {
            status,
            last_error,
            reconnect_scheduled,
        };
        self.state_tx.send_replace(self.state.clone());
    }
}
