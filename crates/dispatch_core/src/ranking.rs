//! Candidate ordering.
//!
//! Incompatible drivers are dropped outright; they must never receive the
//! offer, not merely rank last. The survivors sort by tier (drivers already
//! heading the same way first), then rating descending, then distance to
//! pickup ascending, then total trips ascending so quieter drivers absorb
//! load on full ties.

use crate::compat::CompatibilityEvaluator;
use crate::directory::DriverSnapshot;
use crate::geo::GeoPoint;

/// Apply the compatibility filter and rank what survives.
pub fn filter_and_rank(
    mut snapshots: Vec<DriverSnapshot>,
    evaluator: &CompatibilityEvaluator<'_>,
    pickup: GeoPoint,
    destination: GeoPoint,
) -> Vec<DriverSnapshot> {
    snapshots.retain_mut(|snapshot| {
        if snapshot.active_destinations.is_empty() {
            snapshot.has_compatible_active = false;
            return true;
        }
        if evaluator.is_compatible(pickup, destination, &snapshot.active_destinations) {
            snapshot.has_compatible_active = true;
            true
        } else {
            false
        }
    });

    snapshots.sort_by(|a, b| {
        b.has_compatible_active
            .cmp(&a.has_compatible_active)
            .then_with(|| b.rating.total_cmp(&a.rating))
            .then_with(|| a.distance_to_pickup_m.total_cmp(&b.distance_to_pickup_m))
            .then_with(|| a.total_trips.cmp(&b.total_trips))
    });
    snapshots
}
