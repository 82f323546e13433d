use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

pub type VehicleId = i64;
pub type BidId = i64;
pub type UserId = i64;

/// Verification state of a listing
///
/// Moves forward only: pending -> digitally_verified -> physically_verified,
/// or pending -> rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    #[default]
    Pending,
    DigitallyVerified,
    PhysicallyVerified,
    Rejected,
}

impl VerificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerificationStatus::Pending => "pending",
            VerificationStatus::DigitallyVerified => "digitally_verified",
            VerificationStatus::PhysicallyVerified => "physically_verified",
            VerificationStatus::Rejected => "rejected",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(VerificationStatus::Pending),
            "digitally_verified" => Some(VerificationStatus::DigitallyVerified),
            "physically_verified" => Some(VerificationStatus::PhysicallyVerified),
            "rejected" => Some(VerificationStatus::Rejected),
            _ => None,
        }
    }

    /// Digitally or physically verified
    pub fn is_verified(&self) -> bool {
        matches!(
            self,
            VerificationStatus::DigitallyVerified | VerificationStatus::PhysicallyVerified
        )
    }
}

impl std::fmt::Display for VerificationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Where a listing is offered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListingType {
    Marketplace,
    InstantSale,
}

impl ListingType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ListingType::Marketplace => "marketplace",
            ListingType::InstantSale => "instant_sale",
        }
    }
}

impl std::fmt::Display for ListingType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Vehicle listing, owned by the entity store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vehicle {
    pub id: VehicleId,
    #[serde(alias = "verification_state")]
    pub status: VerificationStatus,
    pub listing_type: ListingType,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub digital_verification_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub physical_verification_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub rejection_reason: Option<String>,
    /// Sent either as a bare id or as the nested user record
    #[serde(default, deserialize_with = "deserialize_optional_id_ref")]
    pub owner: Option<UserId>,
}

impl Vehicle {
    /// Freshly submitted listing with no verification dates
    pub fn new(id: VehicleId, status: VerificationStatus, listing_type: ListingType) -> Self {
        Self {
            id,
            status,
            listing_type,
            created_at: None,
            updated_at: None,
            digital_verification_date: None,
            physical_verification_date: None,
            rejection_reason: None,
            owner: None,
        }
    }
}

/// Bid lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BidStatus {
    #[default]
    Pending,
    Accepted,
    Rejected,
}

impl BidStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BidStatus::Pending => "pending",
            BidStatus::Accepted => "accepted",
            BidStatus::Rejected => "rejected",
        }
    }

    /// Display label with a leading capital ("Pending")
    pub fn label(&self) -> String {
        let raw = self.as_str();
        let mut chars = raw.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect(),
            None => String::new(),
        }
    }
}

/// Bid placed on a vehicle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bid {
    pub id: BidId,
    /// Sent either as a bare id or as the nested vehicle record
    #[serde(
        rename = "vehicle",
        alias = "vehicle_id",
        deserialize_with = "deserialize_id_ref"
    )]
    pub vehicle_id: VehicleId,
    #[serde(deserialize_with = "deserialize_amount")]
    pub amount: f64,
    #[serde(default)]
    pub status: BidStatus,
}

impl Bid {
    pub fn new(id: BidId, vehicle_id: VehicleId, amount: f64) -> Self {
        Self {
            id,
            vehicle_id,
            amount,
            status: BidStatus::Pending,
        }
    }
}

/// Related record, referenced by id or embedded by the serializer
#[derive(Deserialize)]
#[serde(untagged)]
enum IdRef {
    Id(i64),
    Nested { id: i64 },
}

impl IdRef {
    fn id(self) -> i64 {
        match self {
            IdRef::Id(id) | IdRef::Nested { id } => id,
        }
    }
}

fn deserialize_id_ref<'de, D>(deserializer: D) -> std::result::Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    IdRef::deserialize(deserializer).map(IdRef::id)
}

fn deserialize_optional_id_ref<'de, D>(deserializer: D) -> std::result::Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<IdRef>::deserialize(deserializer).map(|r| r.map(IdRef::id))
}

/// Decimal amounts arrive either as JSON numbers or as strings ("1500.00")
fn deserialize_amount<'de, D>(deserializer: D) -> std::result::Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    match Value::deserialize(deserializer)? {
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| D::Error::custom("bid amount out of range")),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| D::Error::custom(format!("invalid bid amount: {}", s))),
        other => Err(D::Error::custom(format!(
            "bid amount must be a number or decimal string, got {}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_verification_status_from_str() {
        assert_eq!(
            VerificationStatus::from_str("digitally_verified"),
            Some(VerificationStatus::DigitallyVerified)
        );
        assert_eq!(
            VerificationStatus::from_str("PENDING"),
            Some(VerificationStatus::Pending)
        );
        assert_eq!(VerificationStatus::from_str("archived"), None);
    }

    #[test]
    fn test_verified_membership() {
        assert!(!VerificationStatus::Pending.is_verified());
        assert!(VerificationStatus::DigitallyVerified.is_verified());
        assert!(VerificationStatus::PhysicallyVerified.is_verified());
        assert!(!VerificationStatus::Rejected.is_verified());
    }

    #[test]
    fn test_vehicle_deserialize_with_nulls() {
        let vehicle: Vehicle = serde_json::from_value(json!({
            "id": 3,
            "status": "physically_verified",
            "listing_type": "instant_sale",
            "created_at": "2024-03-01T10:00:00Z",
            "digital_verification_date": null,
            "physical_verification_date": "2024-03-09T12:30:00Z",
            "owner": 11,
            "make": "Toyota"
        }))
        .unwrap();

        assert_eq!(vehicle.status, VerificationStatus::PhysicallyVerified);
        assert_eq!(vehicle.listing_type, ListingType::InstantSale);
        assert!(vehicle.digital_verification_date.is_none());
        assert!(vehicle.physical_verification_date.is_some());
        assert_eq!(vehicle.owner, Some(11));
    }

    #[test]
    fn test_bid_amount_accepts_decimal_string() {
        let bid: Bid = serde_json::from_value(json!({
            "id": 1,
            "vehicle": 3,
            "amount": "1500.50",
            "status": "accepted"
        }))
        .unwrap();
        assert_eq!(bid.vehicle_id, 3);
        assert_eq!(bid.amount, 1500.5);
        assert_eq!(bid.status, BidStatus::Accepted);

        let bid: Bid =
            serde_json::from_value(json!({"id": 2, "vehicle_id": 3, "amount": 99})).unwrap();
        assert_eq!(bid.amount, 99.0);
        assert_eq!(bid.status, BidStatus::Pending);

        assert!(serde_json::from_value::<Bid>(json!({"id": 2, "vehicle": 3, "amount": "abc"})).is_err());
    }

    #[test]
    fn test_nested_owner_and_vehicle_records() {
        let vehicle_json = json!({
            "id": 3,
            "verification_state": "pending",
            "listing_type": "marketplace",
            "owner": {
                "id": 11,
                "username": "tino",
                "email": "tino@example.com",
                "is_staff": false
            },
            "images": [],
            "vin": "1HGCM82633A004352"
        });
        let vehicle: Vehicle = serde_json::from_value(vehicle_json.clone()).unwrap();
        assert_eq!(vehicle.owner, Some(11));

        let unowned: Vehicle = serde_json::from_value(json!({
            "id": 4,
            "status": "pending",
            "listing_type": "marketplace",
            "owner": null
        }))
        .unwrap();
        assert_eq!(unowned.owner, None);

        let bid: Bid = serde_json::from_value(json!({
            "id": 8,
            "vehicle": vehicle_json,
            "bidder": {"id": 12, "username": "rudo"},
            "amount": "2500.00",
            "status": "pending"
        }))
        .unwrap();
        assert_eq!(bid.vehicle_id, 3);
        assert_eq!(bid.amount, 2500.0);

        assert!(serde_json::from_value::<Bid>(json!({
            "id": 9,
            "vehicle": {"make": "Toyota"},
            "amount": 10
        }))
        .is_err());
    }

    #[test]
    fn test_bid_status_label() {
        assert_eq!(BidStatus::Pending.label(), "Pending");
        assert_eq!(BidStatus::Accepted.label(), "Accepted");
        assert_eq!(BidStatus::Rejected.label(), "Rejected");
    }
}
