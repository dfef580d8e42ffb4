use chrono::Utc;
use dashmap::DashMap;
use tracing::debug;
use uuid::Uuid;

use crate::error::DispatchError;
use crate::models::driver::DriverRecord;

/// Tracks each driver's declared location and availability, plus the busy
/// binding the coordinator holds during an assignment.
///
/// All mutation goes through the map's per-entry locking, so `set_busy` is
/// atomic per driver. This is the single serialization point that prevents
/// two rides from booking the same driver.
pub struct DriverRegistry {
    drivers: DashMap<Uuid, DriverRecord>,
}

impl DriverRegistry {
    pub fn new() -> Self {
        Self {
            drivers: DashMap::new(),
        }
    }

    /// Upserts the driver's location and declared availability. The busy
    /// binding is left untouched: a location ping while on a ride must not
    /// free the driver.
    pub fn update_location(
        &self,
        driver_id: Uuid,
        city: &str,
        area: &str,
        available: bool,
    ) -> DriverRecord {
        let mut record = self.drivers.entry(driver_id).or_insert_with(|| DriverRecord {
            driver_id,
            city: city.to_string(),
            area: area.to_string(),
            available,
            busy_ride: None,
            last_update: Utc::now(),
        });

        record.city = city.to_string();
        record.area = area.to_string();
        record.available = available;
        record.last_update = Utc::now();

        record.clone()
    }

    /// Atomically binds a free driver to a ride. Fails with `AlreadyBusy`
    /// if the driver is unavailable or already bound.
    pub fn set_busy(&self, driver_id: Uuid, ride_id: Uuid) -> Result<(), DispatchError> {
        let mut record = self
            .drivers
            .get_mut(&driver_id)
            .ok_or(DispatchError::DriverNotFound(driver_id))?;

        if !record.is_free() {
            return Err(DispatchError::AlreadyBusy(driver_id));
        }

        record.busy_ride = Some(ride_id);
        record.last_update = Utc::now();
        Ok(())
    }

    /// Clears the busy binding. The declared availability flag survives: a
    /// driver who went offline mid-ride stays offline after release.
    pub fn release(&self, driver_id: Uuid) {
        match self.drivers.get_mut(&driver_id) {
            Some(mut record) => {
                record.busy_ride = None;
                record.last_update = Utc::now();
            }
            None => debug!(driver_id = %driver_id, "release for unknown driver"),
        }
    }

    pub fn get(&self, driver_id: Uuid) -> Option<DriverRecord> {
        self.drivers.get(&driver_id).map(|entry| entry.clone())
    }

    /// Free drivers in the exact area, oldest update first.
    pub fn find_available_in_area(&self, city: &str, area: &str) -> Vec<Uuid> {
        self.find_available(|record| record.city == city && record.area == area)
    }

    /// Free drivers anywhere in the city, oldest update first.
    pub fn find_available_in_city(&self, city: &str) -> Vec<Uuid> {
        self.find_available(|record| record.city == city)
    }

    fn find_available<F>(&self, matches: F) -> Vec<Uuid>
    where
        F: Fn(&DriverRecord) -> bool,
    {
        let mut free: Vec<(chrono::DateTime<Utc>, Uuid)> = self
            .drivers
            .iter()
            .filter_map(|entry| {
                let record = entry.value();
                if record.is_free() && matches(record) {
                    Some((record.last_update, record.driver_id))
                } else {
                    None
                }
            })
            .collect();

        // Oldest update first: approximates "has been waiting longest".
        free.sort_by_key(|(last_update, _)| *last_update);
        free.into_iter().map(|(_, driver_id)| driver_id).collect()
    }
}

impl Default for DriverRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::thread::sleep;
    use std::time::Duration;

    use uuid::Uuid;

    use super::DriverRegistry;
    use crate::error::DispatchError;

    fn driver(seed: u128) -> Uuid {
        Uuid::from_u128(seed)
    }

    #[test]
    fn set_busy_succeeds_once_per_driver() {
        let registry = DriverRegistry::new();
        let d1 = driver(1);
        registry.update_location(d1, "Lagos", "Ikeja", true);

        let ride_a = Uuid::from_u128(100);
        let ride_b = Uuid::from_u128(101);

        assert!(registry.set_busy(d1, ride_a).is_ok());
        assert!(matches!(
            registry.set_busy(d1, ride_b),
            Err(DispatchError::AlreadyBusy(_))
        ));

        let record = registry.get(d1).unwrap();
        assert_eq!(record.busy_ride, Some(ride_a));
    }

    #[test]
    fn set_busy_rejects_unavailable_driver() {
        let registry = DriverRegistry::new();
        let d1 = driver(1);
        registry.update_location(d1, "Lagos", "Ikeja", false);

        assert!(matches!(
            registry.set_busy(d1, Uuid::from_u128(100)),
            Err(DispatchError::AlreadyBusy(_))
        ));
    }

    #[test]
    fn set_busy_rejects_unknown_driver() {
        let registry = DriverRegistry::new();
        assert!(matches!(
            registry.set_busy(driver(9), Uuid::from_u128(100)),
            Err(DispatchError::DriverNotFound(_))
        ));
    }

    #[test]
    fn release_restores_only_the_busy_binding() {
        let registry = DriverRegistry::new();
        let d1 = driver(1);
        registry.update_location(d1, "Lagos", "Ikeja", true);
        registry.set_busy(d1, Uuid::from_u128(100)).unwrap();

        registry.release(d1);

        let record = registry.get(d1).unwrap();
        assert!(record.busy_ride.is_none());
        assert!(record.is_free());
    }

    #[test]
    fn driver_offline_while_busy_stays_offline_after_release() {
        let registry = DriverRegistry::new();
        let d1 = driver(1);
        registry.update_location(d1, "Lagos", "Ikeja", true);
        registry.set_busy(d1, Uuid::from_u128(100)).unwrap();

        // Driver goes offline mid-ride; binding must survive.
        registry.update_location(d1, "Lagos", "Ikeja", false);
        assert_eq!(registry.get(d1).unwrap().busy_ride, Some(Uuid::from_u128(100)));

        registry.release(d1);

        let record = registry.get(d1).unwrap();
        assert!(record.busy_ride.is_none());
        assert!(!record.available);
        assert!(!record.is_free());
    }

    #[test]
    fn find_available_orders_by_oldest_update() {
        let registry = DriverRegistry::new();
        let d1 = driver(1);
        let d2 = driver(2);
        let d3 = driver(3);

        registry.update_location(d1, "Lagos", "Victoria Island", true);
        sleep(Duration::from_millis(2));
        registry.update_location(d2, "Lagos", "Victoria Island", true);
        sleep(Duration::from_millis(2));
        registry.update_location(d3, "Lagos", "Victoria Island", true);

        assert_eq!(
            registry.find_available_in_area("Lagos", "Victoria Island"),
            vec![d1, d2, d3]
        );

        // A fresh ping moves the driver to the back of the line.
        sleep(Duration::from_millis(2));
        registry.update_location(d1, "Lagos", "Victoria Island", true);
        assert_eq!(
            registry.find_available_in_area("Lagos", "Victoria Island"),
            vec![d2, d3, d1]
        );
    }

    #[test]
    fn find_available_filters_busy_offline_and_elsewhere() {
        let registry = DriverRegistry::new();
        let free = driver(1);
        let busy = driver(2);
        let offline = driver(3);
        let elsewhere = driver(4);

        registry.update_location(free, "Lagos", "Ikeja", true);
        registry.update_location(busy, "Lagos", "Ikeja", true);
        registry.set_busy(busy, Uuid::from_u128(100)).unwrap();
        registry.update_location(offline, "Lagos", "Ikeja", false);
        registry.update_location(elsewhere, "Abuja", "Garki", true);

        assert_eq!(registry.find_available_in_area("Lagos", "Ikeja"), vec![free]);
        assert_eq!(registry.find_available_in_city("Lagos"), vec![free]);
    }
}
