use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::timeline::{verification_timeline, TimelineStep};
use super::{Collection, Memo, Version};
use crate::models::{
    Bid, BidStatus, ListingType, Vehicle, VehicleId, VerificationStatus,
};

/// Status breakdown of a user's own listings
///
/// The counters are computed independently and are not forced to add up
/// to `total`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct UserVehicleStats {
    pub total: usize,
    pub pending: usize,
    pub verified: usize,
    pub rejected: usize,
}

/// Headline numbers for the admin dashboard
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct AdminDashboardStats {
    /// Size of the admin verification queue
    pub pending_count: usize,
    /// Physically verified listings only
    pub verified_count: usize,
    pub total_listings: usize,
    pub instant_sale_requests: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VehicleStatusHistory {
    pub verification_status: VerificationStatus,
    pub last_updated: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
}

/// Bid with a display label for its status
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BidView {
    #[serde(flatten)]
    pub bid: Bid,
    pub status_label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VehicleWithBidInfo {
    #[serde(flatten)]
    pub vehicle: Vehicle,
    pub bid_count: usize,
    pub highest_bid: f64,
    pub has_bids: bool,
}

type ById = (Version, VehicleId);

/// Memoized projections over externally owned collections
///
/// Holds no entity data of its own, only the last result of each
/// projection and the input tokens it was computed from.
#[derive(Debug, Default)]
pub struct StateProjector {
    verified: Memo<Version, Vec<Vehicle>>,
    marketplace: Memo<Version, Vec<Vehicle>>,
    instant_sale: Memo<Version, Vec<Vehicle>>,
    user_stats: Memo<Version, UserVehicleStats>,
    vehicle_by_id: Memo<ById, Option<Vehicle>>,
    bids_for_vehicle: Memo<ById, Vec<Bid>>,
    highest_bid: Memo<ById, f64>,
    timeline: Memo<ById, Option<Vec<TimelineStep>>>,
    status_history: Memo<ById, Option<VehicleStatusHistory>>,
    pending_verification: Memo<Version, Vec<Vehicle>>,
    rejected: Memo<Version, Vec<Vehicle>>,
    with_bids: Memo<(Version, Version), Vec<Vehicle>>,
    admin_stats: Memo<(Version, Version), AdminDashboardStats>,
    user_bids: Memo<Version, Vec<BidView>>,
    active_bids: Memo<Version, Vec<BidView>>,
    bid_info: Memo<(Version, Version, VehicleId), Option<VehicleWithBidInfo>>,
}

impl StateProjector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Digitally or physically verified listings
    pub fn verified_vehicles(&self, vehicles: &Collection<Vehicle>) -> Arc<Vec<Vehicle>> {
        self.verified.get_or_compute(vehicles.version(), || {
            vehicles
                .iter()
                .filter(|v| v.status.is_verified())
                .cloned()
                .collect()
        })
    }

    pub fn marketplace_vehicles(&self, vehicles: &Collection<Vehicle>) -> Arc<Vec<Vehicle>> {
        self.marketplace.get_or_compute(vehicles.version(), || {
            self.verified_of_type(vehicles, ListingType::Marketplace)
        })
    }

    pub fn instant_sale_vehicles(&self, vehicles: &Collection<Vehicle>) -> Arc<Vec<Vehicle>> {
        self.instant_sale.get_or_compute(vehicles.version(), || {
            self.verified_of_type(vehicles, ListingType::InstantSale)
        })
    }

    fn verified_of_type(&self, vehicles: &Collection<Vehicle>, kind: ListingType) -> Vec<Vehicle> {
        self.verified_vehicles(vehicles)
            .iter()
            .filter(|v| v.listing_type == kind)
            .cloned()
            .collect()
    }

    pub fn user_vehicle_stats(&self, user_vehicles: &Collection<Vehicle>) -> UserVehicleStats {
        *self.user_stats.get_or_compute(user_vehicles.version(), || {
            let with = |status| user_vehicles.iter().filter(|v| v.status == status).count();
            UserVehicleStats {
                total: user_vehicles.len(),
                pending: with(VerificationStatus::Pending),
                verified: user_vehicles.iter().filter(|v| v.status.is_verified()).count(),
                rejected: with(VerificationStatus::Rejected),
            }
        })
    }

    /// First listing with this id, if any
    pub fn vehicle_by_id(&self, vehicles: &Collection<Vehicle>, id: VehicleId) -> Option<Vehicle> {
        Arc::unwrap_or_clone(self.vehicle_by_id.get_or_compute((vehicles.version(), id), || {
            vehicles.iter().find(|v| v.id == id).cloned()
        }))
    }

    pub fn bids_for_vehicle(&self, bids: &Collection<Bid>, id: VehicleId) -> Arc<Vec<Bid>> {
        self.bids_for_vehicle.get_or_compute((bids.version(), id), || {
            bids.iter().filter(|b| b.vehicle_id == id).cloned().collect()
        })
    }

    /// Largest bid on a listing, or 0 when it has none
    pub fn highest_bid(&self, bids: &Collection<Bid>, id: VehicleId) -> f64 {
        *self.highest_bid.get_or_compute((bids.version(), id), || {
            self.bids_for_vehicle(bids, id)
                .iter()
                .fold(0.0, |max, bid| if bid.amount > max { bid.amount } else { max })
        })
    }

    /// Verification timeline of a listing; `None` for an unknown id
    pub fn verification_timeline(
        &self,
        vehicles: &Collection<Vehicle>,
        id: VehicleId,
    ) -> Option<Vec<TimelineStep>> {
        Arc::unwrap_or_clone(self.timeline.get_or_compute((vehicles.version(), id), || {
            self.vehicle_by_id(vehicles, id)
                .map(|vehicle| verification_timeline(&vehicle))
        }))
    }

    pub fn vehicle_status_history(
        &self,
        vehicles: &Collection<Vehicle>,
        id: VehicleId,
    ) -> Option<VehicleStatusHistory> {
        Arc::unwrap_or_clone(self.status_history.get_or_compute((vehicles.version(), id), || {
            self.vehicle_by_id(vehicles, id)
                .map(|vehicle| VehicleStatusHistory {
                    verification_status: vehicle.status,
                    last_updated: vehicle.updated_at,
                    rejection_reason: vehicle.rejection_reason,
                })
        }))
    }

    /// Queue entries still awaiting verification
    pub fn pending_verification(&self, admin_queue: &Collection<Vehicle>) -> Arc<Vec<Vehicle>> {
        self.pending_verification
            .get_or_compute(admin_queue.version(), || {
                with_status(admin_queue, VerificationStatus::Pending)
            })
    }

    pub fn rejected_vehicles(&self, user_vehicles: &Collection<Vehicle>) -> Arc<Vec<Vehicle>> {
        self.rejected.get_or_compute(user_vehicles.version(), || {
            with_status(user_vehicles, VerificationStatus::Rejected)
        })
    }

    /// Listings that have received at least one bid
    pub fn vehicles_with_bids(
        &self,
        vehicles: &Collection<Vehicle>,
        bids: &Collection<Bid>,
    ) -> Arc<Vec<Vehicle>> {
        self.with_bids
            .get_or_compute((vehicles.version(), bids.version()), || {
                vehicles
                    .iter()
                    .filter(|v| bids.iter().any(|b| b.vehicle_id == v.id))
                    .cloned()
                    .collect()
            })
    }

    pub fn admin_dashboard_stats(
        &self,
        admin_queue: &Collection<Vehicle>,
        vehicles: &Collection<Vehicle>,
    ) -> AdminDashboardStats {
        *self
            .admin_stats
            .get_or_compute((admin_queue.version(), vehicles.version()), || {
                AdminDashboardStats {
                    pending_count: admin_queue.len(),
                    verified_count: vehicles
                        .iter()
                        .filter(|v| v.status == VerificationStatus::PhysicallyVerified)
                        .count(),
                    total_listings: vehicles.len(),
                    instant_sale_requests: vehicles
                        .iter()
                        .filter(|v| v.listing_type == ListingType::InstantSale)
                        .count(),
                }
            })
    }

    /// Bids with display labels ("Pending", "Accepted", "Rejected")
    pub fn user_bids(&self, bids: &Collection<Bid>) -> Arc<Vec<BidView>> {
        self.user_bids.get_or_compute(bids.version(), || {
            bids.iter()
                .map(|bid| BidView {
                    bid: bid.clone(),
                    status_label: bid.status.label(),
                })
                .collect()
        })
    }

    pub fn active_bids(&self, bids: &Collection<Bid>) -> Arc<Vec<BidView>> {
        self.active_bids.get_or_compute(bids.version(), || {
            let pending = BidStatus::Pending.label();
            self.user_bids(bids)
                .iter()
                .filter(|view| view.status_label == pending)
                .cloned()
                .collect()
        })
    }

    pub fn vehicle_with_bid_info(
        &self,
        vehicles: &Collection<Vehicle>,
        bids: &Collection<Bid>,
        id: VehicleId,
    ) -> Option<VehicleWithBidInfo> {
        let key = (vehicles.version(), bids.version(), id);
        Arc::unwrap_or_clone(self.bid_info.get_or_compute(key, || {
            let vehicle = self.vehicle_by_id(vehicles, id)?;
            let bid_count = self.bids_for_vehicle(bids, id).len();
            Some(VehicleWithBidInfo {
                vehicle,
                bid_count,
                highest_bid: self.highest_bid(bids, id),
                has_bids: bid_count > 0,
            })
        }))
    }

    /// Drop every cached result
    pub fn invalidate(&self) {
        self.verified.invalidate();
        self.marketplace.invalidate();
        self.instant_sale.invalidate();
        self.user_stats.invalidate();
        self.vehicle_by_id.invalidate();
        self.bids_for_vehicle.invalidate();
        self.highest_bid.invalidate();
        self.timeline.invalidate();
        self.status_history.invalidate();
        self.pending_verification.invalidate();
        self.rejected.invalidate();
        self.with_bids.invalidate();
        self.admin_stats.invalidate();
        self.user_bids.invalidate();
        self.active_bids.invalidate();
        self.bid_info.invalidate();
    }

    #[cfg(test)]
    fn verified_computations(&self) -> usize {
        self.verified.computations()
    }
}

fn with_status(vehicles: &Collection<Vehicle>, status: VerificationStatus) -> Vec<Vehicle> {
    vehicles
        .iter()
        .filter(|v| v.status == status)
        .cloned()
        .collect()
}
