use thiserror::Error;
use uuid::Uuid;

use crate::models::ride::RideStatus;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("ride {0} not found")]
    RideNotFound(Uuid),

    #[error("driver {0} not found")]
    DriverNotFound(Uuid),

    #[error("driver {0} is already busy or unavailable")]
    AlreadyBusy(Uuid),

    #[error("no drivers available")]
    NoDriversAvailable,

    #[error("stale response for ride {ride_id} from driver {driver_id}")]
    StaleResponse { ride_id: Uuid, driver_id: Uuid },

    #[error("invalid transition from {from} to {to}")]
    InvalidTransition { from: RideStatus, to: RideStatus },

    #[error("driver {driver_id} is not assigned to ride {ride_id}")]
    NotAssignedDriver { ride_id: Uuid, driver_id: Uuid },

    #[error("ride {ride_id} cannot be cancelled in status {status}")]
    CannotCancel { ride_id: Uuid, status: RideStatus },

    #[error("dispatch queue closed")]
    QueueClosed,

    #[error("internal error: {0}")]
    Internal(String),
}
