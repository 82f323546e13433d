use std::time::Duration;

use thiserror::Error;
use tokio_tungstenite::tungstenite;

/// Unified error type for the sync layer
#[derive(Error, Debug)]
pub enum SyncError {
    // Transport errors
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    #[error("Connection attempt timed out after {limit:?}")]
    OpenTimeout { limit: Duration },

    // Frame errors
    #[error("Malformed frame: {0}")]
    Parse(#[from] serde_json::Error),

    // Gating errors
    #[error("Identity may not open the {channel} channel")]
    AuthGate { channel: &'static str },

    #[error("Dropped {command} on {channel}: not connected")]
    DroppedCommand {
        channel: &'static str,
        command: &'static str,
    },

    // Configuration errors
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

/// Result type alias for sync operations
pub type Result<T> = std::result::Result<T, SyncError>;

impl SyncError {
    /// Whether the reconnect policy may retry after this error
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            SyncError::Transport(_) | SyncError::WebSocket(_) | SyncError::OpenTimeout { .. }
        )
    }

    /// Errors that are expected during normal operation and only logged
    pub fn is_silent(&self) -> bool {
        matches!(
            self,
            SyncError::AuthGate { .. } | SyncError::DroppedCommand { .. }
        )
    }
}
