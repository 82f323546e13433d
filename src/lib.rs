//! Eden Sync - realtime client layer for the Auto Eden marketplace
//!
//! Keeps a client's view of the marketplace current over persistent
//! WebSocket streams.
//!
//! ## Features
//!
//! - Notification stream with read receipts and a local most-recent-first list
//! - Staff-only dashboard stats stream with full-snapshot replacement
//! - Fixed-delay reconnect that never fights an intentional close
//! - Memoized projections over vehicle and bid collections

pub mod config;
pub mod error;
pub mod models;
pub mod projection;
pub mod realtime;

pub use config::Config;
pub use error::{Result, SyncError};
pub use projection::{Collection, StateProjector};
pub use realtime::{ConnectionState, ConnectionStatus, DashboardChannel, NotificationChannel};
