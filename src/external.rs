//! Collaborator seams consumed by the engine. Persistence, geocoding, and
//! fare arithmetic live outside the core; these traits are the narrow
//! interfaces it calls through.

use dashmap::DashMap;
use uuid::Uuid;

use crate::error::DispatchError;
use crate::models::ride::{Location, Ride};

/// Durable storage for ride records. The engine persists terminal rides and
/// logs failures without rolling back the transition that triggered them.
pub trait RideArchive: Send + Sync {
    fn persist_ride(&self, ride: &Ride) -> Result<(), DispatchError>;
    fn load_ride(&self, ride_id: Uuid) -> Result<Option<Ride>, DispatchError>;
}

/// Archive that drops everything. Default when no persistence is wired up.
pub struct NullArchive;

impl RideArchive for NullArchive {
    fn persist_ride(&self, _ride: &Ride) -> Result<(), DispatchError> {
        Ok(())
    }

    fn load_ride(&self, _ride_id: Uuid) -> Result<Option<Ride>, DispatchError> {
        Ok(None)
    }
}

/// Map-backed archive, mainly for tests and local runs.
pub struct InMemoryArchive {
    rides: DashMap<Uuid, Ride>,
}

impl InMemoryArchive {
    pub fn new() -> Self {
        Self {
            rides: DashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.rides.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rides.is_empty()
    }
}

impl Default for InMemoryArchive {
    fn default() -> Self {
        Self::new()
    }
}

impl RideArchive for InMemoryArchive {
    fn persist_ride(&self, ride: &Ride) -> Result<(), DispatchError> {
        self.rides.insert(ride.id, ride.clone());
        Ok(())
    }

    fn load_ride(&self, ride_id: Uuid) -> Result<Option<Ride>, DispatchError> {
        Ok(self.rides.get(&ride_id).map(|entry| entry.clone()))
    }
}

/// Resolves a free-text address to a (city, area) pair.
pub trait Geocoder: Send + Sync {
    fn geocode(&self, address: &str) -> Location;
}

/// Comma-delimited resolver: "Victoria Island, Lagos" reads the area from
/// the first segment and the city from the last. Anything unparseable falls
/// back to Downtown, Lagos.
pub struct AddressParts;

impl Geocoder for AddressParts {
    fn geocode(&self, address: &str) -> Location {
        let parts: Vec<&str> = address
            .split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .collect();

        let (area, city) = if parts.len() >= 2 {
            (parts[0].to_string(), parts[parts.len() - 1].to_string())
        } else {
            ("Downtown".to_string(), "Lagos".to_string())
        };

        Location {
            city,
            area,
            address: address.to_string(),
        }
    }
}

/// Quotes a fare for a pickup/destination pair. Pure; out of engine scope.
pub trait FareEstimator: Send + Sync {
    fn estimate(&self, pickup: &Location, destination: &Location) -> f64;
}

/// Base fare plus a flat per-kilometer rate over a rough distance guess.
pub struct PerKilometerEstimator {
    pub base_fare: f64,
    pub per_km_rate: f64,
}

impl FareEstimator for PerKilometerEstimator {
    fn estimate(&self, _pickup: &Location, destination: &Location) -> f64 {
        let estimated_km = (destination.address.len() / 20).max(2) as f64;
        let total = self.base_fare + estimated_km * self.per_km_rate;
        (total * 100.0).round() / 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::{AddressParts, FareEstimator, Geocoder, PerKilometerEstimator};

    #[test]
    fn geocode_splits_area_and_city() {
        let location = AddressParts.geocode("Victoria Island, Lagos");
        assert_eq!(location.area, "Victoria Island");
        assert_eq!(location.city, "Lagos");
        assert_eq!(location.address, "Victoria Island, Lagos");
    }

    #[test]
    fn geocode_takes_last_segment_as_city() {
        let location = AddressParts.geocode("12 Adeola Odeku St, Victoria Island, Lagos");
        assert_eq!(location.area, "12 Adeola Odeku St");
        assert_eq!(location.city, "Lagos");
    }

    #[test]
    fn geocode_falls_back_on_unparseable_address() {
        let location = AddressParts.geocode("nowhere");
        assert_eq!(location.area, "Downtown");
        assert_eq!(location.city, "Lagos");
    }

    #[test]
    fn fare_has_a_two_kilometer_floor() {
        let estimator = PerKilometerEstimator {
            base_fare: 2.50,
            per_km_rate: 1.20,
        };
        let pickup = AddressParts.geocode("A, Lagos");
        let destination = AddressParts.geocode("B, Lagos");

        assert_eq!(estimator.estimate(&pickup, &destination), 4.90);
    }

    #[test]
    fn fare_grows_with_distance_guess() {
        let estimator = PerKilometerEstimator {
            base_fare: 2.50,
            per_km_rate: 1.20,
        };
        let pickup = AddressParts.geocode("A, Lagos");
        let near = AddressParts.geocode("B, Lagos");
        let far = AddressParts.geocode("Somewhere far across town on the mainland, Lagos");

        assert!(estimator.estimate(&pickup, &far) > estimator.estimate(&pickup, &near));
    }
}
