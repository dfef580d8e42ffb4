use std::collections::HashSet;
use std::time::Instant;

use chrono::{DateTime, Utc};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptState {
    Selecting,
    Notifying,
    AwaitingResponse,
    Accepted,
    Exhausted,
    Superseded,
}

/// One round of candidate selection and sequential notification for a ride.
///
/// At most one attempt per ride is in flight. `tried` carries over between
/// sequences so a driver is never notified twice for the same ride.
/// `generation` is bumped whenever the held driver changes or the attempt is
/// superseded; deadline timers and driver responses are validated against it
/// so late arrivals land as stale no-ops.
#[derive(Debug, Clone)]
pub struct DispatchAttempt {
    pub ride_id: Uuid,
    pub sequence: u32,
    pub candidates: Vec<Uuid>,
    pub cursor: usize,
    pub held: Option<Uuid>,
    pub deadline: Option<DateTime<Utc>>,
    pub state: AttemptState,
    pub tried: HashSet<Uuid>,
    pub generation: u64,
    pub started: Instant,
}

impl DispatchAttempt {
    pub fn new(ride_id: Uuid, sequence: u32, tried: HashSet<Uuid>, generation: u64) -> Self {
        Self {
            ride_id,
            sequence,
            candidates: Vec::new(),
            cursor: 0,
            held: None,
            deadline: None,
            state: AttemptState::Selecting,
            tried,
            generation,
            started: Instant::now(),
        }
    }

    pub fn is_awaiting(&self, driver_id: Uuid) -> bool {
        self.state == AttemptState::AwaitingResponse && self.held == Some(driver_id)
    }
}
