use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::{Vehicle, VerificationStatus};

/// One step of a listing's verification timeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimelineStep {
    pub status: &'static str,
    pub date: Option<DateTime<Utc>>,
    pub completed: bool,
}

pub const STEP_SUBMITTED: &str = "Submitted";
pub const STEP_DIGITAL: &str = "Digital Verification";
pub const STEP_PHYSICAL: &str = "Physical Verification";

/// Submitted, digital and physical verification steps for a listing
///
/// Completion is read off the current status only: a step is complete when
/// the listing currently sits in that stage, never inferred from history.
/// Steps with neither a date nor completion are left out, so a physically
/// verified listing with no digital date skips the digital step.
pub fn verification_timeline(vehicle: &Vehicle) -> Vec<TimelineStep> {
    let steps = [
        TimelineStep {
            status: STEP_SUBMITTED,
            date: vehicle.created_at,
            completed: true,
        },
        TimelineStep {
            status: STEP_DIGITAL,
            date: vehicle.digital_verification_date,
            completed: vehicle.status == VerificationStatus::DigitallyVerified,
        },
        TimelineStep {
            status: STEP_PHYSICAL,
            date: vehicle.physical_verification_date,
            completed: vehicle.status == VerificationStatus::PhysicallyVerified,
        },
    ];

    steps
        .into_iter()
        .filter(|step| step.date.is_some() || step.completed)
        .collect()
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::models::ListingType;

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, day, 9, 0, 0).unwrap()
    }

    fn labels(steps: &[TimelineStep]) -> Vec<&'static str> {
        steps.iter().map(|s| s.status).collect()
    }

    #[test]
    fn test_pending_listing_shows_only_submission() {
        let mut vehicle = Vehicle::new(1, VerificationStatus::Pending, ListingType::Marketplace);
        vehicle.created_at = Some(at(1));

        let steps = verification_timeline(&vehicle);
        assert_eq!(labels(&steps), vec![STEP_SUBMITTED]);
        assert_eq!(steps[0].date, Some(at(1)));
        assert!(steps[0].completed);
    }

    #[test]
    fn test_fully_dated_listing_keeps_every_step() {
        let mut vehicle = Vehicle::new(
            1,
            VerificationStatus::PhysicallyVerified,
            ListingType::Marketplace,
        );
        vehicle.created_at = Some(at(1));
        vehicle.digital_verification_date = Some(at(3));
        vehicle.physical_verification_date = Some(at(8));

        let steps = verification_timeline(&vehicle);
        assert_eq!(labels(&steps), vec![STEP_SUBMITTED, STEP_DIGITAL, STEP_PHYSICAL]);
        assert_eq!(steps[1].date, Some(at(3)));
        assert!(steps[2].completed);
    }

    #[test]
    fn test_physically_verified_without_digital_date_skips_digital_step() {
        let mut vehicle = Vehicle::new(
            1,
            VerificationStatus::PhysicallyVerified,
            ListingType::Marketplace,
        );
        vehicle.created_at = Some(at(1));
        vehicle.physical_verification_date = Some(at(8));

        let steps = verification_timeline(&vehicle);
        assert_eq!(labels(&steps), vec![STEP_SUBMITTED, STEP_PHYSICAL]);
        assert_eq!(steps[1].date, Some(at(8)));
        assert!(steps[1].completed);
    }

    #[test]
    fn test_completed_step_without_date_is_kept() {
        let vehicle = Vehicle::new(
            1,
            VerificationStatus::DigitallyVerified,
            ListingType::InstantSale,
        );

        let steps = verification_timeline(&vehicle);
        assert_eq!(labels(&steps), vec![STEP_SUBMITTED, STEP_DIGITAL]);
        assert_eq!(steps[1].date, None);
        assert!(steps[1].completed);
    }

    #[test]
    fn test_dated_but_incomplete_step_is_kept() {
        let mut vehicle = Vehicle::new(1, VerificationStatus::Rejected, ListingType::Marketplace);
        vehicle.digital_verification_date = Some(at(2));

        let steps = verification_timeline(&vehicle);
        assert_eq!(labels(&steps), vec![STEP_SUBMITTED, STEP_DIGITAL]);
        assert!(!steps[1].completed);
    }
}
