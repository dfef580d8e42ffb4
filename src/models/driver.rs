use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Availability record for a single driver, keyed by driver id.
///
/// `available` is the driver's declared flag; `busy_ride` is the binding the
/// coordinator holds while a ride is assigned. A driver is only offered work
/// when both say so.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverRecord {
    pub driver_id: Uuid,
    pub city: String,
    pub area: String,
    pub available: bool,
    pub busy_ride: Option<Uuid>,
    pub last_update: DateTime<Utc>,
}

impl DriverRecord {
    pub fn is_free(&self) -> bool {
        self.available && self.busy_ride.is_none()
    }
}
