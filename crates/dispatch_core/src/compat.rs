//! Directional compatibility between a driver's active work and a new request.
//!
//! A driver already serving a passenger is only offered further work heading
//! the same way. The test is purely directional: from the candidate's pickup
//! point, the bearing toward each existing active destination and the bearing
//! toward the candidate's own destination must agree within a threshold. An
//! optional zone table short-circuits pairs an operator has marked
//! incompatible before any bearing math runs. O(1) per destination pair; no
//! road topology.

use crate::config::ZoneCompatibility;
use crate::geo::{bearing_delta_deg, initial_bearing_deg, GeoPoint};

pub struct CompatibilityEvaluator<'a> {
    threshold_deg: f64,
    zones: Option<&'a ZoneCompatibility>,
}

/// Inputs and intermediate values of one evaluation. Computed fresh each
/// time, never stored.
#[derive(Debug, Clone, PartialEq)]
pub struct CompatibilityContext {
    pub existing_bearing_deg: f64,
    pub candidate_bearing_deg: f64,
    pub bearing_delta_deg: f64,
    pub existing_zone: Option<String>,
    pub candidate_zone: Option<String>,
    pub zone_verdict: Option<bool>,
}

impl<'a> CompatibilityEvaluator<'a> {
    pub fn new(threshold_deg: f64, zones: Option<&'a ZoneCompatibility>) -> Self {
        Self {
            threshold_deg,
            zones,
        }
    }

    /// Evaluate one existing destination against the candidate request.
    ///
    /// Both bearings are taken from the candidate's pickup point; the
    /// reference point is never swapped between the two legs.
    pub fn evaluate(
        &self,
        candidate_pickup: GeoPoint,
        candidate_destination: GeoPoint,
        existing_destination: GeoPoint,
    ) -> (bool, CompatibilityContext) {
        let existing_zone;
        let candidate_zone;
        let zone_verdict;
        match self.zones {
            Some(zones) => {
                existing_zone = zones.zone_of(existing_destination).map(str::to_string);
                candidate_zone = zones.zone_of(candidate_destination).map(str::to_string);
                zone_verdict = match (existing_zone.as_deref(), candidate_zone.as_deref()) {
                    (Some(a), Some(b)) => zones.compatible(a, b),
                    _ => None,
                };
            }
            None => {
                existing_zone = None;
                candidate_zone = None;
                zone_verdict = None;
            }
        }

        let existing_bearing = initial_bearing_deg(candidate_pickup, existing_destination);
        let candidate_bearing = initial_bearing_deg(candidate_pickup, candidate_destination);
        let delta = bearing_delta_deg(existing_bearing, candidate_bearing);

        // A zone pair marked incompatible overrides the bearing test; a pair
        // marked compatible (same zone included) still requires it.
        let compatible = zone_verdict != Some(false) && delta <= self.threshold_deg;

        (
            compatible,
            CompatibilityContext {
                existing_bearing_deg: existing_bearing,
                candidate_bearing_deg: candidate_bearing,
                bearing_delta_deg: delta,
                existing_zone,
                candidate_zone,
                zone_verdict,
            },
        )
    }

    /// Whether a driver with the given active destinations may receive the
    /// candidate request. Zero active destinations is always compatible;
    /// otherwise every destination must pass.
    pub fn is_compatible(
        &self,
        candidate_pickup: GeoPoint,
        candidate_destination: GeoPoint,
        active_destinations: &[GeoPoint],
    ) -> bool {
        active_destinations.iter().all(|&existing| {
            self.evaluate(candidate_pickup, candidate_destination, existing)
                .0
        })
    }
}
