use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Aggregate dashboard snapshot pushed by the server
///
/// The schema belongs to the server, so the snapshot is kept as an opaque
/// JSON object and replaced wholesale on every update.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DashboardStats(pub Map<String, Value>);

impl DashboardStats {
    /// Look up an integer counter by name
    pub fn counter(&self, name: &str) -> Option<i64> {
        self.0.get(name).and_then(Value::as_i64)
    }

    pub fn total_vehicles(&self) -> Option<i64> {
        self.counter("total_vehicles")
    }

    pub fn pending_vehicles(&self) -> Option<i64> {
        self.counter("pending_vehicles")
    }

    pub fn verified_vehicles(&self) -> Option<i64> {
        self.counter("verified_vehicles")
    }

    pub fn rejected_vehicles(&self) -> Option<i64> {
        self.counter("rejected_vehicles")
    }

    pub fn total_bids(&self) -> Option<i64> {
        self.counter("total_bids")
    }

    pub fn pending_bids(&self) -> Option<i64> {
        self.counter("pending_bids")
    }

    pub fn total_users(&self) -> Option<i64> {
        self.counter("total_users")
    }

    pub fn active_users(&self) -> Option<i64> {
        self.counter("active_users")
    }

    /// Marketplace visits over the last 30 days
    pub fn marketplace_visits(&self) -> Option<i64> {
        self.counter("marketplace_visits")
    }

    /// Vehicle detail views over the last 30 days
    pub fn vehicle_views(&self) -> Option<i64> {
        self.counter("vehicle_views")
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }
}
