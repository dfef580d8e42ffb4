use std::collections::HashSet;
use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use serde_json::json;
use tokio::sync::{Mutex, mpsc};
use tokio::time::{Duration, sleep};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::engine::lifecycle::{apply_transition, persist_terminal};
use crate::engine::queue::enqueue_dispatch;
use crate::engine::selection::select_candidates;
use crate::error::DispatchError;
use crate::events::Channel;
use crate::models::attempt::{AttemptState, DispatchAttempt};
use crate::models::ride::{CancelledBy, Ride, RideStatus, RideType};
use crate::state::{DispatchJob, DispatchState, RideEntry};

#[derive(Debug, Clone)]
pub struct RideRequest {
    pub rider_id: Uuid,
    pub pickup_address: String,
    pub destination_address: String,
    pub ride_type: RideType,
    pub special_requests: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverResponse {
    Accept,
    Decline,
}

/// Creates a ride in `requested`, announces it, and queues it for dispatch.
pub async fn request_ride(
    state: &DispatchState,
    request: RideRequest,
) -> Result<Ride, DispatchError> {
    let pickup = state.geocoder.geocode(&request.pickup_address);
    let destination = state.geocoder.geocode(&request.destination_address);
    let estimated_fare = state.fares.estimate(&pickup, &destination);

    let now = Utc::now();
    let ride = Ride {
        id: Uuid::new_v4(),
        rider_id: request.rider_id,
        pickup,
        destination,
        ride_type: request.ride_type,
        special_requests: request.special_requests,
        estimated_fare,
        driver_id: None,
        status: RideStatus::Requested,
        cancellation_reason: None,
        created_at: now,
        updated_at: now,
        accepted_at: None,
        pickup_at: None,
        started_at: None,
        completed_at: None,
    };

    state.rides.insert(
        ride.id,
        Arc::new(Mutex::new(RideEntry {
            ride: ride.clone(),
            attempt: None,
        })),
    );

    state.events.publish(
        Channel::RideEvents,
        "ride_requested",
        json!({
            "ride_id": ride.id,
            "rider_id": ride.rider_id,
            "pickup": ride.pickup.clone(),
            "destination_address": ride.destination.address.clone(),
            "estimated_fare": ride.estimated_fare,
            "ride_type": ride.ride_type,
        }),
    );

    enqueue_dispatch(state, ride.id).await?;
    info!(ride_id = %ride.id, rider_id = %ride.rider_id, "ride requested");
    Ok(ride)
}

/// Engine task: drains the dispatch queue, one spawned task per ride so
/// unrelated rides proceed in parallel.
pub async fn run_dispatch_engine(
    state: Arc<DispatchState>,
    mut dispatch_rx: mpsc::Receiver<DispatchJob>,
) {
    info!("dispatch engine started");

    while let Some(job) = dispatch_rx.recv().await {
        state.metrics.rides_in_queue.dec();
        tokio::spawn(dispatch_ride(state.clone(), job.ride_id));
    }

    warn!("dispatch engine stopped: queue channel closed");
}

/// Opens the dispatch attempt for a requested ride and drives the first
/// select → reserve → notify round.
pub async fn dispatch_ride(state: Arc<DispatchState>, ride_id: Uuid) {
    let Some(entry) = state.ride_entry(ride_id) else {
        warn!(ride_id = %ride_id, "dispatch job for unknown ride");
        return;
    };
    let mut entry = entry.lock().await;

    if entry.ride.status != RideStatus::Requested {
        warn!(ride_id = %ride_id, status = %entry.ride.status, "ride not eligible for dispatch");
        return;
    }
    if entry.attempt.is_some() {
        warn!(ride_id = %ride_id, "dispatch attempt already in flight");
        return;
    }

    entry.attempt = Some(DispatchAttempt::new(ride_id, 1, HashSet::new(), 0));
    state.metrics.attempts_in_flight.inc();
    advance_attempt(&state, &mut entry);
}

/// Reserves and notifies the next candidate, re-selecting when the current
/// list runs dry. Reservation happens before notification, so two rides can
/// never be waiting on the same driver. Leaves the attempt in
/// `AwaitingResponse` with a deadline timer armed, or drives the ride to
/// `unmatched` when no new candidate exists.
fn advance_attempt(state: &Arc<DispatchState>, entry: &mut RideEntry) {
    let ride_id = entry.ride.id;
    let city = entry.ride.pickup.city.clone();
    let area = entry.ride.pickup.area.clone();
    let pickup = entry.ride.pickup.clone();
    let destination = entry.ride.destination.clone();
    let estimated_fare = entry.ride.estimated_fare;
    let special_requests = entry.ride.special_requests.clone();
    let limit = state.config.max_drivers_to_notify;
    let timeout_ms = state.config.driver_response_timeout_ms;

    loop {
        let Some(attempt) = entry.attempt.as_mut() else {
            return;
        };

        attempt.state = AttemptState::Notifying;
        while attempt.cursor < attempt.candidates.len() {
            let candidate = attempt.candidates[attempt.cursor];
            attempt.cursor += 1;
            attempt.tried.insert(candidate);

            match state.registry.set_busy(candidate, ride_id) {
                Ok(()) => {
                    attempt.held = Some(candidate);
                    attempt.generation += 1;
                    attempt.state = AttemptState::AwaitingResponse;
                    attempt.deadline =
                        Some(Utc::now() + ChronoDuration::milliseconds(timeout_ms as i64));
                    let generation = attempt.generation;
                    let sequence = attempt.sequence;

                    state.events.publish(
                        Channel::DriverNotifications,
                        "ride_request",
                        json!({
                            "ride_id": ride_id,
                            "driver_id": candidate,
                            "pickup": pickup.clone(),
                            "destination": destination.clone(),
                            "estimated_fare": estimated_fare,
                            "special_requests": special_requests.clone(),
                            "timeout_ms": timeout_ms,
                        }),
                    );
                    info!(
                        ride_id = %ride_id,
                        driver_id = %candidate,
                        sequence,
                        "driver reserved and notified"
                    );

                    let timer_state = state.clone();
                    tokio::spawn(async move {
                        sleep(Duration::from_millis(timeout_ms)).await;
                        handle_response_timeout(timer_state, ride_id, candidate, generation).await;
                    });
                    return;
                }
                Err(err) => {
                    debug!(
                        ride_id = %ride_id,
                        driver_id = %candidate,
                        error = %err,
                        "candidate could not be reserved; skipping"
                    );
                }
            }
        }

        attempt.state = AttemptState::Selecting;
        let candidates = select_candidates(&state.registry, &city, &area, &attempt.tried, limit);
        if candidates.is_empty() {
            break;
        }

        if !attempt.candidates.is_empty() {
            attempt.sequence += 1;
        }
        attempt.candidates = candidates;
        attempt.cursor = 0;
    }

    mark_unmatched(state, entry);
}

fn mark_unmatched(state: &DispatchState, entry: &mut RideEntry) {
    if let Some(attempt) = entry.attempt.as_mut() {
        attempt.state = AttemptState::Exhausted;
        attempt.held = None;
        attempt.generation += 1;
    }

    if let Err(err) = apply_transition(&mut entry.ride, RideStatus::Unmatched) {
        error!(ride_id = %entry.ride.id, error = %err, "failed to mark ride unmatched");
        return;
    }

    state.events.publish(
        Channel::RideEvents,
        "ride_no_drivers_found",
        json!({
            "ride_id": entry.ride.id,
            "rider_id": entry.ride.rider_id,
            "pickup_address": entry.ride.pickup.address.clone(),
        }),
    );

    finish_attempt(state, entry, "unmatched");
    persist_terminal(state, &entry.ride);
    warn!(ride_id = %entry.ride.id, "no drivers available; ride unmatched");
}

/// Records the dispatch outcome and destroys the attempt.
fn finish_attempt(state: &DispatchState, entry: &mut RideEntry, outcome: &str) {
    if let Some(attempt) = entry.attempt.take() {
        let elapsed = attempt.started.elapsed().as_secs_f64();
        state
            .metrics
            .dispatch_latency_seconds
            .with_label_values(&[outcome])
            .observe(elapsed);
        state
            .metrics
            .dispatches_total
            .with_label_values(&[outcome])
            .inc();
        state.metrics.attempts_in_flight.dec();
    }
}

/// External input: the held driver accepts or declines the notification.
///
/// Anything not matching the live attempt — wrong driver, superseded
/// attempt, already-settled ride — is rejected as `StaleResponse` and has
/// no effect.
pub async fn handle_driver_response(
    state: &Arc<DispatchState>,
    ride_id: Uuid,
    driver_id: Uuid,
    response: DriverResponse,
) -> Result<Ride, DispatchError> {
    let entry = state
        .ride_entry(ride_id)
        .ok_or(DispatchError::RideNotFound(ride_id))?;
    let mut entry = entry.lock().await;

    let awaiting = entry
        .attempt
        .as_ref()
        .is_some_and(|attempt| attempt.is_awaiting(driver_id));
    if !awaiting {
        debug!(ride_id = %ride_id, driver_id = %driver_id, "stale driver response discarded");
        return Err(DispatchError::StaleResponse { ride_id, driver_id });
    }

    match response {
        DriverResponse::Accept => {
            apply_transition(&mut entry.ride, RideStatus::Matched)?;
            entry.ride.driver_id = Some(driver_id);
            if let Some(attempt) = entry.attempt.as_mut() {
                attempt.state = AttemptState::Accepted;
                attempt.generation += 1;
            }

            let rider_id = entry.ride.rider_id;
            state.events.publish(
                Channel::RideEvents,
                "ride_matched",
                json!({ "ride_id": ride_id, "driver_id": driver_id }),
            );
            state.events.publish(
                Channel::UserNotifications,
                "ride_matched",
                json!({ "ride_id": ride_id, "rider_id": rider_id }),
            );
            finish_attempt(state, &mut entry, "matched");
            info!(ride_id = %ride_id, driver_id = %driver_id, "ride matched");
            Ok(entry.ride.clone())
        }
        DriverResponse::Decline => {
            info!(ride_id = %ride_id, driver_id = %driver_id, "driver declined; escalating");
            escalate(state, &mut entry, driver_id);
            Ok(entry.ride.clone())
        }
    }
}

/// Decline and timeout share this edge: release the held driver and move on.
fn escalate(state: &Arc<DispatchState>, entry: &mut RideEntry, driver_id: Uuid) {
    state.registry.release(driver_id);
    if let Some(attempt) = entry.attempt.as_mut() {
        attempt.held = None;
        attempt.generation += 1;
    }
    advance_attempt(state, entry);
}

async fn handle_response_timeout(
    state: Arc<DispatchState>,
    ride_id: Uuid,
    driver_id: Uuid,
    generation: u64,
) {
    let Some(entry) = state.ride_entry(ride_id) else {
        return;
    };
    let mut entry = entry.lock().await;

    let live = entry
        .attempt
        .as_ref()
        .is_some_and(|attempt| attempt.is_awaiting(driver_id) && attempt.generation == generation);
    if !live {
        debug!(ride_id = %ride_id, driver_id = %driver_id, "deadline fired for settled attempt; ignoring");
        return;
    }

    warn!(ride_id = %ride_id, driver_id = %driver_id, "driver response timed out; escalating");
    escalate(&state, &mut entry, driver_id);
}

/// Rider or driver cancellation. Supersedes any in-flight attempt first so
/// a racing accept lands as stale, then releases the held or assigned
/// driver and settles the ride.
pub async fn cancel_ride(
    state: &DispatchState,
    ride_id: Uuid,
    reason: &str,
    cancelled_by: CancelledBy,
) -> Result<Ride, DispatchError> {
    let entry = state
        .ride_entry(ride_id)
        .ok_or(DispatchError::RideNotFound(ride_id))?;
    let mut entry = entry.lock().await;

    let status = entry.ride.status;
    if !status.can_transition_to(RideStatus::Cancelled) {
        return Err(DispatchError::CannotCancel { ride_id, status });
    }

    let mut notified_driver = entry.ride.driver_id;
    if let Some(attempt) = entry.attempt.as_mut() {
        attempt.state = AttemptState::Superseded;
        attempt.generation += 1;
        if let Some(held) = attempt.held.take() {
            state.registry.release(held);
            notified_driver = notified_driver.or(Some(held));
        }
    }
    if let Some(driver_id) = entry.ride.driver_id {
        state.registry.release(driver_id);
    }

    apply_transition(&mut entry.ride, RideStatus::Cancelled)?;
    entry.ride.cancellation_reason = Some(reason.to_string());

    let rider_id = entry.ride.rider_id;
    state.events.publish(
        Channel::RideEvents,
        "ride_cancelled",
        json!({ "ride_id": ride_id, "reason": reason, "cancelled_by": cancelled_by }),
    );
    state.events.publish(
        Channel::UserNotifications,
        "ride_cancelled",
        json!({ "ride_id": ride_id, "rider_id": rider_id }),
    );
    if let Some(driver_id) = notified_driver {
        state.events.publish(
            Channel::DriverNotifications,
            "ride_cancelled",
            json!({ "ride_id": ride_id, "driver_id": driver_id }),
        );
    }

    finish_attempt(state, &mut entry, "cancelled");
    entry.ride.driver_id = None;
    persist_terminal(state, &entry.ride);

    info!(ride_id = %ride_id, reason, cancelled_by = ?cancelled_by, "ride cancelled");
    Ok(entry.ride.clone())
}
