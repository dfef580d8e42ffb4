use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Location {
    pub city: String,
    pub area: String,
    pub address: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum RideType {
    Standard,
    Premium,
    Shared,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RideStatus {
    Requested,
    Matched,
    Accepted,
    Pickup,
    InProgress,
    Completed,
    Cancelled,
    Unmatched,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum CancelledBy {
    Rider,
    Driver,
}

impl RideStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RideStatus::Completed | RideStatus::Cancelled | RideStatus::Unmatched
        )
    }

    /// Statuses during which a driver must be bound to the ride.
    pub fn requires_driver(&self) -> bool {
        matches!(
            self,
            RideStatus::Matched | RideStatus::Accepted | RideStatus::Pickup | RideStatus::InProgress
        )
    }

    pub fn can_transition_to(&self, next: RideStatus) -> bool {
        use RideStatus::*;

        match self {
            Requested => matches!(next, Matched | Unmatched | Cancelled),
            Matched => matches!(next, Accepted | Cancelled),
            Accepted => matches!(next, Pickup | Cancelled),
            Pickup => matches!(next, InProgress | Cancelled),
            InProgress => matches!(next, Completed | Cancelled),
            Completed | Cancelled | Unmatched => false,
        }
    }
}

impl fmt::Display for RideStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RideStatus::Requested => "requested",
            RideStatus::Matched => "matched",
            RideStatus::Accepted => "accepted",
            RideStatus::Pickup => "pickup",
            RideStatus::InProgress => "in_progress",
            RideStatus::Completed => "completed",
            RideStatus::Cancelled => "cancelled",
            RideStatus::Unmatched => "unmatched",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ride {
    pub id: Uuid,
    pub rider_id: Uuid,
    pub pickup: Location,
    pub destination: Location,
    pub ride_type: RideType,
    pub special_requests: Option<String>,
    pub estimated_fare: f64,
    pub driver_id: Option<Uuid>,
    pub status: RideStatus,
    pub cancellation_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub pickup_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::RideStatus::*;

    #[test]
    fn requested_can_reach_matched_unmatched_cancelled() {
        assert!(Requested.can_transition_to(Matched));
        assert!(Requested.can_transition_to(Unmatched));
        assert!(Requested.can_transition_to(Cancelled));
        assert!(!Requested.can_transition_to(Accepted));
        assert!(!Requested.can_transition_to(Completed));
    }

    #[test]
    fn progression_follows_pickup_flow() {
        assert!(Matched.can_transition_to(Accepted));
        assert!(Accepted.can_transition_to(Pickup));
        assert!(Pickup.can_transition_to(InProgress));
        assert!(InProgress.can_transition_to(Completed));

        assert!(!Matched.can_transition_to(Pickup));
        assert!(!Accepted.can_transition_to(InProgress));
        assert!(!Pickup.can_transition_to(Completed));
    }

    #[test]
    fn cancellation_allowed_until_completion() {
        for status in [Requested, Matched, Accepted, Pickup, InProgress] {
            assert!(status.can_transition_to(Cancelled), "{status} should cancel");
        }
    }

    #[test]
    fn terminal_states_reject_everything() {
        for terminal in [Completed, Cancelled, Unmatched] {
            assert!(terminal.is_terminal());
            for next in [
                Requested, Matched, Accepted, Pickup, InProgress, Completed, Cancelled, Unmatched,
            ] {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[test]
    fn driver_bound_statuses() {
        for status in [Matched, Accepted, Pickup, InProgress] {
            assert!(status.requires_driver());
        }
        for status in [Requested, Completed, Cancelled, Unmatched] {
            assert!(!status.requires_driver());
        }
    }
}
