use std::collections::HashSet;

use uuid::Uuid;

use crate::registry::DriverRegistry;

/// Builds the ordered candidate list for one notification round.
///
/// Area-local drivers come first; if they fall short of `limit` the search
/// widens to the whole city, appending distinct drivers behind the locals.
/// The result is capped at `limit` to bound notification fan-out. An empty
/// result is a normal value, not an error.
pub fn select_candidates(
    registry: &DriverRegistry,
    city: &str,
    area: &str,
    exclude: &HashSet<Uuid>,
    limit: usize,
) -> Vec<Uuid> {
    let mut candidates: Vec<Uuid> = registry
        .find_available_in_area(city, area)
        .into_iter()
        .filter(|driver_id| !exclude.contains(driver_id))
        .collect();

    if candidates.len() < limit {
        for driver_id in registry.find_available_in_city(city) {
            if candidates.len() >= limit {
                break;
            }
            if exclude.contains(&driver_id) || candidates.contains(&driver_id) {
                continue;
            }
            candidates.push(driver_id);
        }
    }

    candidates.truncate(limit);
    candidates
}
