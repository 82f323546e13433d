//! Notification stream
//!
//! Pushes `notification` frames into a most-recent-first list and carries
//! read receipts back to the server.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info};

use super::{Channel, ChannelConfig, ChannelProtocol, ConnectionState, Connector};
use crate::models::{Identity, InboundFrame, Notification, NotificationId, OutboundFrame};

/// Notification channel state
#[derive(Debug, Default)]
pub struct NotificationProtocol {
    notifications: VecDeque<Notification>,
}

impl NotificationProtocol {
    /// Most recent first
    pub fn notifications(&self) -> impl Iterator<Item = &Notification> {
        self.notifications.iter()
    }

    pub fn len(&self) -> usize {
        self.notifications.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notifications.is_empty()
    }

    pub fn unread_count(&self) -> usize {
        self.notifications.iter().filter(|n| !n.is_read()).count()
    }

    /// Remove every record with this id; a missing id is not an error
    pub fn remove(&mut self, id: NotificationId) -> usize {
        let before = self.notifications.len();
        self.notifications.retain(|n| n.id != id);
        before - self.notifications.len()
    }

    pub fn clear(&mut self) {
        self.notifications.clear();
    }
}

impl ChannelProtocol for NotificationProtocol {
    type Update = Notification;
    const NAME: &'static str = "notifications";

    fn on_frame(&mut self, frame: InboundFrame) -> Option<Notification> {
        match frame {
            InboundFrame::Notification { notification } => {
                let notification = Notification::received(notification, Utc::now());
                debug!(
                    id = notification.id,
                    kind = notification.kind.as_deref().unwrap_or("-"),
                    "Notification received"
                );
                self.notifications.push_front(notification.clone());
                Some(notification)
            }
            InboundFrame::ConnectionEstablished { message } => {
                info!(
                    channel = Self::NAME,
                    "Notification service ready: {}",
                    message.as_deref().unwrap_or("connected")
                );
                None
            }
            other => {
                debug!(channel = Self::NAME, kind = other.kind(), "Ignoring frame");
                None
            }
        }
    }
}

/// Live notification feed for one identity
pub struct NotificationChannel {
    channel: Channel<NotificationProtocol>,
}

impl NotificationChannel {
    pub fn spawn(config: ChannelConfig, connector: Arc<dyn Connector>) -> Self {
        Self {
            channel: Channel::spawn(config, NotificationProtocol::default(), connector),
        }
    }

    /// Open now and reopen whenever the identity changes
    pub fn spawn_following(
        config: ChannelConfig,
        connector: Arc<dyn Connector>,
        identity: watch::Receiver<Identity>,
    ) -> Self {
        Self {
            channel: Channel::spawn_following(
                config,
                NotificationProtocol::default(),
                connector,
                identity,
            ),
        }
    }

    pub fn open(&self, identity: Identity) {
        self.channel.open(identity);
    }

    pub fn identity_changed(&self, identity: Identity) {
        self.channel.identity_changed(identity);
    }

    pub fn close(&self, intentional: bool) {
        self.channel.close(intentional);
    }

    pub fn state(&self) -> ConnectionState {
        self.channel.state()
    }

    pub fn is_connected(&self) -> bool {
        self.channel.is_connected()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.channel.watch_state()
    }

    /// Newly received notifications
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.channel.subscribe()
    }

    /// Snapshot of the local list, most recent first
    pub fn notifications(&self) -> Vec<Notification> {
        self.channel
            .with_manager(|m| m.protocol().notifications().cloned().collect())
    }

    pub fn unread_count(&self) -> usize {
        self.channel.with_manager(|m| m.protocol().unread_count())
    }

    /// Ask the server to mark a notification read
    ///
    /// Returns whether the receipt was sent. The local list is left alone;
    /// callers decide whether to hide the item until the server confirms.
    pub fn mark_as_read(&self, id: NotificationId) -> bool {
        self.channel
            .with_manager(|m| m.send(OutboundFrame::MarkRead { notification_id: id }))
    }

    /// Drop a notification from the local list, connected or not
    pub fn clear_notification(&self, id: NotificationId) {
        self.channel.with_manager(|m| {
            m.protocol_mut().remove(id);
        });
    }

    pub fn clear_all(&self) {
        self.channel.with_manager(|m| m.protocol_mut().clear());
    }

    pub fn shutdown(self) {
        self.channel.shutdown();
    }
}
