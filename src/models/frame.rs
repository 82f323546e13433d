//! Wire frames exchanged over the realtime channels
//!
//! Every frame is a JSON object discriminated by its `type` field.

use serde::{Deserialize, Serialize};

use super::{DashboardStats, NotificationId, NotificationPayload};
use crate::error::Result;

/// Frames pushed by the server
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundFrame {
    Notification { notification: NotificationPayload },
    ConnectionEstablished {
        #[serde(default)]
        message: Option<String>,
    },
    InitialStats { stats: DashboardStats },
    StatsUpdate { stats: DashboardStats },
    Pong,
    /// Any frame type this client does not know about yet
    #[serde(other)]
    Unknown,
}

impl InboundFrame {
    /// Parse a text frame
    pub fn parse(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            InboundFrame::Notification { .. } => "notification",
            InboundFrame::ConnectionEstablished { .. } => "connection_established",
            InboundFrame::InitialStats { .. } => "initial_stats",
            InboundFrame::StatsUpdate { .. } => "stats_update",
            InboundFrame::Pong => "pong",
            InboundFrame::Unknown => "unknown",
        }
    }
}

/// Commands sent to the server
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundFrame {
    MarkRead { notification_id: NotificationId },
    RefreshStats,
    Ping,
}

impl OutboundFrame {
    pub fn kind(&self) -> &'static str {
        match self {
            OutboundFrame::MarkRead { .. } => "mark_read",
            OutboundFrame::RefreshStats => "refresh_stats",
            OutboundFrame::Ping => "ping",
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}
