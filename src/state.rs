use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, mpsc};
use uuid::Uuid;

use crate::config::Config;
use crate::events::EventBus;
use crate::external::{
    AddressParts, FareEstimator, Geocoder, NullArchive, PerKilometerEstimator, RideArchive,
};
use crate::models::attempt::DispatchAttempt;
use crate::models::ride::Ride;
use crate::observability::metrics::Metrics;
use crate::registry::DriverRegistry;

/// A ride together with its in-flight dispatch attempt, if any.
///
/// Everything that touches a single ride goes through this entry's mutex:
/// that is the per-ride critical section. Unrelated rides lock nothing in
/// common and proceed in parallel.
pub struct RideEntry {
    pub ride: Ride,
    pub attempt: Option<DispatchAttempt>,
}

#[derive(Debug, Clone, Copy)]
pub struct DispatchJob {
    pub ride_id: Uuid,
}

pub struct DispatchState {
    pub config: Config,
    pub registry: DriverRegistry,
    pub rides: DashMap<Uuid, Arc<Mutex<RideEntry>>>,
    pub dispatch_tx: mpsc::Sender<DispatchJob>,
    pub events: EventBus,
    pub archive: Arc<dyn RideArchive>,
    pub geocoder: Arc<dyn Geocoder>,
    pub fares: Arc<dyn FareEstimator>,
    pub metrics: Metrics,
}

impl DispatchState {
    pub fn new(config: Config) -> (Self, mpsc::Receiver<DispatchJob>) {
        let archive = Arc::new(NullArchive);
        let geocoder = Arc::new(AddressParts);
        Self::with_collaborators(config, archive, geocoder)
    }

    pub fn with_collaborators(
        config: Config,
        archive: Arc<dyn RideArchive>,
        geocoder: Arc<dyn Geocoder>,
    ) -> (Self, mpsc::Receiver<DispatchJob>) {
        let (dispatch_tx, dispatch_rx) = mpsc::channel(config.dispatch_queue_size);
        let events = EventBus::new(config.event_buffer_size);
        let fares = Arc::new(PerKilometerEstimator {
            base_fare: config.base_fare,
            per_km_rate: config.per_km_rate,
        });

        (
            Self {
                config,
                registry: DriverRegistry::new(),
                rides: DashMap::new(),
                dispatch_tx,
                events,
                archive,
                geocoder,
                fares,
                metrics: Metrics::new(),
            },
            dispatch_rx,
        )
    }

    pub fn ride_entry(&self, ride_id: Uuid) -> Option<Arc<Mutex<RideEntry>>> {
        self.rides.get(&ride_id).map(|entry| entry.value().clone())
    }

    /// Point-in-time copy of the ride, taken under its entry lock.
    pub async fn ride_snapshot(&self, ride_id: Uuid) -> Option<Ride> {
        let entry = self.ride_entry(ride_id)?;
        let guard = entry.lock().await;
        Some(guard.ride.clone())
    }
}
