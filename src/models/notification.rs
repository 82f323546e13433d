use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Server-assigned notification identifier
pub type NotificationId = i64;

/// Notification record as carried inside a `notification` frame
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NotificationPayload {
    pub id: NotificationId,
    /// approval, rejection, registration, instant_sale, bid, admin_alert
    #[serde(rename = "notification_type", alias = "type", default)]
    pub kind: Option<String>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

/// Notification held by the notification channel
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub id: NotificationId,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    /// Remaining server fields (message, related_object_id, is_read, created_at, ...)
    pub payload: Map<String, Value>,
    pub received_at: DateTime<Utc>,
}

impl Notification {
    /// Stamp a received payload with its arrival time
    pub fn received(payload: NotificationPayload, received_at: DateTime<Utc>) -> Self {
        Self {
            id: payload.id,
            kind: payload.kind,
            payload: payload.fields,
            received_at,
        }
    }

    pub fn message(&self) -> Option<&str> {
        self.payload.get("message").and_then(Value::as_str)
    }

    /// Server-side read flag; absent counts as unread
    pub fn is_read(&self) -> bool {
        self.payload
            .get("is_read")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }
}
