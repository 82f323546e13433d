//! Eden Sync monitor - Entry Point
//!
//! Opens the realtime channels for the configured identity and logs what
//! arrives until interrupted.

use std::sync::Arc;
use std::time::Duration;

use tokio::signal;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use eden_sync::config::{Config, LogConfig};
use eden_sync::realtime::{Connector, DashboardChannel, NotificationChannel, WsConnector};

/// How often the dashboard asks for a fresh snapshot
const STATS_REFRESH_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration first; logging depends on it
    let config = Config::from_env()?;
    init_tracing(&config.log);

    info!("Starting Eden Sync monitor");
    info!(
        base_url = %config.sync.base_url,
        reconnect_delay_secs = config.sync.reconnect_delay.as_secs(),
        staff = config.auth.is_staff,
        "Configuration loaded"
    );

    let identity = config.identity();
    if identity.access_token().is_none() {
        warn!("EDEN_ACCESS_TOKEN is not set; channels will stay closed");
    }

    let connector: Arc<dyn Connector> = Arc::new(WsConnector::new(config.sync.open_timeout));

    let notifications = NotificationChannel::spawn(config.notifications_channel(), connector.clone());
    let notification_task = spawn_feed("notifications", notifications.subscribe(), |n| {
        info!(
            id = n.id,
            kind = n.kind.as_deref().unwrap_or("-"),
            "Notification: {}",
            n.message().unwrap_or("")
        );
    });
    notifications.open(identity.clone());

    let dashboard = identity
        .is_staff()
        .then(|| DashboardChannel::spawn(config.dashboard_channel(), connector.clone()));
    let mut dashboard_tasks: Vec<JoinHandle<()>> = Vec::new();
    if let Some(dashboard) = &dashboard {
        dashboard_tasks.push(spawn_feed("dashboard", dashboard.subscribe(), |stats| {
            info!(
                total_vehicles = stats.total_vehicles(),
                pending_vehicles = stats.pending_vehicles(),
                total_bids = stats.total_bids(),
                "Dashboard snapshot"
            );
        }));
        dashboard.open(identity.clone());
    }

    let mut refresh = tokio::time::interval(STATS_REFRESH_INTERVAL);
    refresh.tick().await;

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = refresh.tick() => {
                if let Some(dashboard) = &dashboard {
                    if !dashboard.refresh_stats() {
                        info!(state = %dashboard.state().status, "Skipped stats refresh");
                    }
                }
                info!(unread = notifications.unread_count(), "Notification summary");
            }
        }
    }
    info!("Shutdown signal received");

    notifications.shutdown();
    if let Some(dashboard) = dashboard {
        dashboard.shutdown();
    }

    // Feeds end once their channel is gone
    let _ = notification_task.await;
    for task in dashboard_tasks {
        let _ = task.await;
    }

    info!("Eden Sync monitor stopped");
    Ok(())
}

fn init_tracing(log: &LogConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("eden_sync={}", log.level)));

    let registry = tracing_subscriber::registry().with(filter);
    if log.format == "json" {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Log every update from a channel until it closes
fn spawn_feed<T, F>(name: &'static str, mut feed: broadcast::Receiver<T>, log: F) -> JoinHandle<()>
where
    T: Clone + Send + 'static,
    F: Fn(T) + Send + 'static,
{
    tokio::spawn(async move {
        loop {
            match feed.recv().await {
                Ok(update) => log(update),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(channel = name, skipped, "Feed lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
