use chrono::Utc;
use serde_json::json;
use tracing::{error, info};
use uuid::Uuid;

use crate::error::DispatchError;
use crate::events::Channel;
use crate::models::ride::{Ride, RideStatus};
use crate::state::DispatchState;

/// Applies a validated status change, stamping `updated_at` and the
/// milestone timestamp for the new state. A rejected change leaves the ride
/// untouched.
pub fn apply_transition(ride: &mut Ride, to: RideStatus) -> Result<(), DispatchError> {
    if !ride.status.can_transition_to(to) {
        return Err(DispatchError::InvalidTransition {
            from: ride.status,
            to,
        });
    }

    let now = Utc::now();
    ride.status = to;
    ride.updated_at = now;

    match to {
        RideStatus::Accepted => ride.accepted_at = Some(now),
        RideStatus::Pickup => ride.pickup_at = Some(now),
        RideStatus::InProgress => ride.started_at = Some(now),
        RideStatus::Completed => ride.completed_at = Some(now),
        _ => {}
    }

    Ok(())
}

/// Hands a terminal ride to the archive collaborator. Failures are logged;
/// state authority lives in the ride record, not in successful persistence.
pub(crate) fn persist_terminal(state: &DispatchState, ride: &Ride) {
    if let Err(err) = state.archive.persist_ride(ride) {
        error!(ride_id = %ride.id, error = %err, "failed to archive terminal ride");
    }
}

/// Driver-side ride progression: confirm, arrive, start, finish.
///
/// Only the assigned driver may progress a ride, and only along the
/// matched → accepted → pickup → in_progress → completed edge. Matching and
/// cancellation have their own entry points in the coordinator.
pub async fn progress_ride(
    state: &DispatchState,
    ride_id: Uuid,
    driver_id: Uuid,
    to: RideStatus,
) -> Result<Ride, DispatchError> {
    let entry = state
        .ride_entry(ride_id)
        .ok_or(DispatchError::RideNotFound(ride_id))?;
    let mut entry = entry.lock().await;

    if entry.ride.driver_id != Some(driver_id) {
        return Err(DispatchError::NotAssignedDriver { ride_id, driver_id });
    }

    if !matches!(
        to,
        RideStatus::Accepted | RideStatus::Pickup | RideStatus::InProgress | RideStatus::Completed
    ) {
        return Err(DispatchError::InvalidTransition {
            from: entry.ride.status,
            to,
        });
    }

    apply_transition(&mut entry.ride, to)?;

    let rider_id = entry.ride.rider_id;
    match to {
        RideStatus::Accepted => {
            state.events.publish(
                Channel::RideEvents,
                "ride_accepted",
                json!({ "ride_id": ride_id, "driver_id": driver_id }),
            );
            state.events.publish(
                Channel::UserNotifications,
                "ride_accepted",
                json!({ "ride_id": ride_id, "rider_id": rider_id }),
            );
        }
        RideStatus::Pickup | RideStatus::InProgress => {
            state.events.publish(
                Channel::RideEvents,
                "ride_status_updated",
                json!({
                    "ride_id": ride_id,
                    "driver_id": driver_id,
                    "rider_id": rider_id,
                    "new_status": to,
                }),
            );
        }
        RideStatus::Completed => {
            state.registry.release(driver_id);
            state.events.publish(
                Channel::RideEvents,
                "ride_completed",
                json!({ "ride_id": ride_id }),
            );
            entry.ride.driver_id = None;
            persist_terminal(state, &entry.ride);
        }
        _ => {}
    }

    info!(ride_id = %ride_id, driver_id = %driver_id, status = %to, "ride status updated");
    Ok(entry.ride.clone())
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use uuid::Uuid;

    use super::apply_transition;
    use crate::error::DispatchError;
    use crate::models::ride::{Location, Ride, RideStatus, RideType};

    fn ride(status: RideStatus) -> Ride {
        let now = Utc::now();
        Ride {
            id: Uuid::from_u128(1),
            rider_id: Uuid::from_u128(2),
            pickup: Location {
                city: "Lagos".to_string(),
                area: "Ikeja".to_string(),
                address: "Ikeja, Lagos".to_string(),
            },
            destination: Location {
                city: "Lagos".to_string(),
                area: "Lekki".to_string(),
                address: "Lekki, Lagos".to_string(),
            },
            ride_type: RideType::Standard,
            special_requests: None,
            estimated_fare: 4.90,
            driver_id: None,
            status,
            cancellation_reason: None,
            created_at: now,
            updated_at: now,
            accepted_at: None,
            pickup_at: None,
            started_at: None,
            completed_at: None,
        }
    }

    #[test]
    fn transition_stamps_milestone_timestamps() {
        let mut r = ride(RideStatus::Matched);
        apply_transition(&mut r, RideStatus::Accepted).unwrap();
        assert!(r.accepted_at.is_some());

        apply_transition(&mut r, RideStatus::Pickup).unwrap();
        assert!(r.pickup_at.is_some());

        apply_transition(&mut r, RideStatus::InProgress).unwrap();
        assert!(r.started_at.is_some());

        apply_transition(&mut r, RideStatus::Completed).unwrap();
        assert!(r.completed_at.is_some());
    }

    #[test]
    fn rejected_transition_leaves_ride_unchanged() {
        let mut r = ride(RideStatus::Completed);
        let before_updated_at = r.updated_at;

        let err = apply_transition(&mut r, RideStatus::Cancelled).unwrap_err();
        assert!(matches!(
            err,
            DispatchError::InvalidTransition {
                from: RideStatus::Completed,
                to: RideStatus::Cancelled,
            }
        ));
        assert_eq!(r.status, RideStatus::Completed);
        assert_eq!(r.updated_at, before_updated_at);
    }

    #[test]
    fn skipping_a_milestone_is_rejected() {
        let mut r = ride(RideStatus::Matched);
        assert!(apply_transition(&mut r, RideStatus::InProgress).is_err());
        assert_eq!(r.status, RideStatus::Matched);
    }
}
