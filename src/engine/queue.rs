use uuid::Uuid;

use crate::error::DispatchError;
use crate::state::{DispatchJob, DispatchState};

pub async fn enqueue_dispatch(state: &DispatchState, ride_id: Uuid) -> Result<(), DispatchError> {
    state
        .dispatch_tx
        .send(DispatchJob { ride_id })
        .await
        .map_err(|_| DispatchError::QueueClosed)?;

    state.metrics.rides_in_queue.inc();
    Ok(())
}
