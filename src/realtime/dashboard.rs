//! Admin dashboard stats stream
//!
//! Every `initial_stats` / `stats_update` frame replaces the snapshot in
//! full. Snapshots are never merged, so whatever arrives after a reconnect
//! simply supersedes what came before.

use std::sync::Arc;

use arc_swap::ArcSwapOption;
use tokio::sync::{broadcast, watch};
use tracing::debug;

use super::{Channel, ChannelConfig, ChannelProtocol, ConnectionState, Connector};
use crate::models::{DashboardStats, Identity, InboundFrame, OutboundFrame};

/// Dashboard channel state
#[derive(Debug, Default)]
pub struct DashboardProtocol {
    snapshot: Arc<ArcSwapOption<DashboardStats>>,
}

impl DashboardProtocol {
    pub fn new(snapshot: Arc<ArcSwapOption<DashboardStats>>) -> Self {
        Self { snapshot }
    }

    pub fn stats(&self) -> Option<Arc<DashboardStats>> {
        self.snapshot.load_full()
    }
}

impl ChannelProtocol for DashboardProtocol {
    type Update = Arc<DashboardStats>;
    const NAME: &'static str = "dashboard";

    /// Staff only; a missing role is treated like a missing login
    fn permits(&self, identity: &Identity) -> bool {
        identity.access_token().is_some() && identity.is_staff()
    }

    fn on_frame(&mut self, frame: InboundFrame) -> Option<Arc<DashboardStats>> {
        match frame {
            InboundFrame::InitialStats { stats } | InboundFrame::StatsUpdate { stats } => {
                let stats = Arc::new(stats);
                self.snapshot.store(Some(stats.clone()));
                Some(stats)
            }
            other => {
                debug!(channel = Self::NAME, kind = other.kind(), "Ignoring frame");
                None
            }
        }
    }
}

/// Live admin stats for a staff identity
pub struct DashboardChannel {
    channel: Channel<DashboardProtocol>,
    snapshot: Arc<ArcSwapOption<DashboardStats>>,
}

impl DashboardChannel {
    pub fn spawn(config: ChannelConfig, connector: Arc<dyn Connector>) -> Self {
        let snapshot = Arc::new(ArcSwapOption::empty());
        let protocol = DashboardProtocol::new(snapshot.clone());
        Self {
            channel: Channel::spawn(config, protocol, connector),
            snapshot,
        }
    }

    /// Open now and reopen whenever the identity changes
    pub fn spawn_following(
        config: ChannelConfig,
        connector: Arc<dyn Connector>,
        identity: watch::Receiver<Identity>,
    ) -> Self {
        let snapshot = Arc::new(ArcSwapOption::empty());
        let protocol = DashboardProtocol::new(snapshot.clone());
        Self {
            channel: Channel::spawn_following(config, protocol, connector, identity),
            snapshot,
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

    /// Replacement snapshots as they arrive
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<DashboardStats>> {
        self.channel.subscribe()
    }

    /// Latest snapshot; read without touching the connection
    pub fn stats(&self) -> Option<Arc<DashboardStats>> {
        self.snapshot.load_full()
    }

    /// Ask the server for a fresh snapshot; returns whether the request was sent
    pub fn refresh_stats(&self) -> bool {
        self.channel
            .with_manager(|m| m.send(OutboundFrame::RefreshStats))
    }

    pub fn shutdown(self) {
        self.channel.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::time::sleep;
    use url::Url;

    use super::*;
    use crate::realtime::transport::testing::RecordingConnector;
    use crate::realtime::{ConnectionStatus, LinkEvent, CLOSE_ABNORMAL};

    fn config() -> ChannelConfig {
        ChannelConfig::new(
            Url::parse("wss://auto-eden-backend.onrender.com").unwrap(),
            "ws/dashboard",
        )
    }

    async fn settle() {
        sleep(Duration::from_millis(1)).await;
    }

    fn staff() -> Identity {
        Identity::authenticated("staff-token").with_staff(true)
    }

    #[test]
    fn test_permits_requires_staff_role() {
        let protocol = DashboardProtocol::default();
        assert!(!protocol.permits(&Identity::anonymous()));
        assert!(!protocol.permits(&Identity::authenticated("tok")));
        assert!(protocol.permits(&staff()));
        assert!(!protocol.permits(&Identity::anonymous().with_staff(true)));
    }

    #[test]
    fn test_snapshots_replace_instead_of_merge() {
        let mut protocol = DashboardProtocol::default();

        let initial = InboundFrame::parse(
            r#"{"type":"initial_stats","stats":{"total_vehicles":10,"pending_vehicles":2}}"#,
        )
        .unwrap();
        protocol.on_frame(initial);
        assert_eq!(protocol.stats().unwrap().pending_vehicles(), Some(2));

        let update =
            InboundFrame::parse(r#"{"type":"stats_update","stats":{"total_vehicles":11}}"#)
                .unwrap();
        let published = protocol.on_frame(update).unwrap();

        let stats = protocol.stats().unwrap();
        assert_eq!(stats.total_vehicles(), Some(11));
        // The key missing from the update is gone, not carried over.
        assert_eq!(stats.pending_vehicles(), None);
        assert_eq!(*published, *stats);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_staff_identity_never_connects() {
        let connector = RecordingConnector::new();
        let channel = DashboardChannel::spawn(config(), Arc::new(connector.clone()));

        channel.open(Identity::authenticated("tok"));
        assert_eq!(connector.connects(), 0);
        assert_eq!(channel.state().status, ConnectionStatus::Disconnected);
        assert!(!channel.refresh_stats());
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_stats_and_snapshot_flow() {
        let connector = RecordingConnector::new();
        let channel = DashboardChannel::spawn(config(), Arc::new(connector.clone()));
        let mut feed = channel.subscribe();

        assert!(!channel.refresh_stats());
        channel.open(staff());
        assert_eq!(
            connector.last_url().unwrap().as_str(),
            "wss://auto-eden-backend.onrender.com/ws/dashboard/?token=staff-token"
        );

        let events = connector.last_events();
        events.emit(LinkEvent::Opened);
        events.emit(LinkEvent::Frame(
            r#"{"type":"initial_stats","stats":{"total_vehicles":4}}"#.to_string(),
        ));
        settle().await;

        assert_eq!(channel.stats().unwrap().total_vehicles(), Some(4));
        assert_eq!(feed.recv().await.unwrap().total_vehicles(), Some(4));

        assert!(channel.refresh_stats());
        assert_eq!(connector.sent(), vec![r#"{"type":"refresh_stats"}"#.to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_snapshot_after_reconnect_supersedes_old_one() {
        let connector = RecordingConnector::new();
        let channel = DashboardChannel::spawn(config(), Arc::new(connector.clone()));
        channel.open(staff());

        let first = connector.last_events();
        first.emit(LinkEvent::Opened);
        first.emit(LinkEvent::Frame(
            r#"{"type":"stats_update","stats":{"total_vehicles":7,"total_bids":3}}"#.to_string(),
        ));
        first.emit(LinkEvent::Closed {
            code: CLOSE_ABNORMAL,
        });
        settle().await;
        // Last snapshot survives the outage.
        assert_eq!(channel.stats().unwrap().total_vehicles(), Some(7));

        sleep(Duration::from_secs(5)).await;
        settle().await;
        assert_eq!(connector.connects(), 2);

        let second = connector.last_events();
        second.emit(LinkEvent::Opened);
        second.emit(LinkEvent::Frame(
            r#"{"type":"initial_stats","stats":{"total_vehicles":8}}"#.to_string(),
        ));
        settle().await;

        let stats = channel.stats().unwrap();
        assert_eq!(stats.total_vehicles(), Some(8));
        assert_eq!(stats.total_bids(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_role_loss_during_delay_cancels_reconnect() {
        let connector = RecordingConnector::new();
        let channel = DashboardChannel::spawn(config(), Arc::new(connector.clone()));
        channel.open(staff());
        connector.last_events().emit(LinkEvent::Opened);
        connector.last_events().emit(LinkEvent::Closed {
            code: CLOSE_ABNORMAL,
        });
        settle().await;
        assert!(channel.state().reconnect_scheduled);

        channel.identity_changed(Identity::authenticated("staff-token"));
        sleep(Duration::from_secs(10)).await;

        assert_eq!(connector.connects(), 1);
        assert!(!channel.state().reconnect_scheduled);
    }
}
