//! Engine configuration and read-only geography lookups.
//!
//! [`DispatchConfig`] carries the tunable policy parameters. The bearing
//! threshold and the hard radius cutoff are heuristics, not business
//! constants; both are plain fields with defaults matching production.
//! [`ServiceBoundary`] and [`ZoneCompatibility`] are consumed as read-only
//! lookup data maintained elsewhere.

use std::collections::HashMap;

use bevy_ecs::prelude::Resource;
use serde::{Deserialize, Serialize};

use crate::clock::{ONE_MIN_MS, ONE_SEC_MS};
use crate::geo::{point_in_polygon, GeoPoint};

#[derive(Debug, Clone, Resource, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Online flag and position reports older than this are ignored.
    pub staleness_window_ms: u64,
    /// Max concurrently accepted bookings per driver.
    pub driver_capacity: usize,
    /// Radius of the first candidate search, meters.
    pub initial_search_radius_m: f64,
    /// Hard outer cutoff from the pickup, meters; enforced regardless of any
    /// wider radius a caller or expansion round asks for.
    pub hard_radius_cutoff_m: f64,
    /// Multiplier applied to the radius on each escalation attempt.
    pub radius_expansion_factor: f64,
    /// Maximum number of search attempts before the booking expires.
    pub max_attempts: u32,
    /// First response window for an offered driver.
    pub phase1_window_ms: u64,
    /// Grace window after phase 1 during which the driver may still accept.
    pub phase2_window_ms: u64,
    /// Max bearing difference for directional compatibility, degrees.
    pub bearing_compat_threshold_deg: f64,
    /// How long an unmatched booking waits in the queue.
    pub queue_expiry_ms: u64,
    /// Offers older than this are dropped from the driver feed.
    pub offer_feed_max_age_ms: u64,
    /// Delay before the single retry of an inbound booking that was not yet
    /// visible in the ledger.
    pub inbound_retry_delay_ms: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            staleness_window_ms: 5 * ONE_MIN_MS,
            driver_capacity: 5,
            initial_search_radius_m: 200.0,
            hard_radius_cutoff_m: 500.0,
            radius_expansion_factor: 2.0,
            max_attempts: 3,
            phase1_window_ms: 30 * ONE_SEC_MS,
            phase2_window_ms: 180 * ONE_SEC_MS,
            bearing_compat_threshold_deg: 45.0,
            queue_expiry_ms: 5 * ONE_MIN_MS,
            offer_feed_max_age_ms: 60 * ONE_MIN_MS,
            inbound_retry_delay_ms: ONE_SEC_MS,
        }
    }
}

impl DispatchConfig {
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.driver_capacity = capacity;
        self
    }

    pub fn with_search_radius(mut self, initial_m: f64, cutoff_m: f64) -> Self {
        self.initial_search_radius_m = initial_m;
        self.hard_radius_cutoff_m = cutoff_m;
        self
    }

    pub fn with_phase_windows(mut self, phase1_ms: u64, phase2_ms: u64) -> Self {
        self.phase1_window_ms = phase1_ms;
        self.phase2_window_ms = phase2_ms;
        self
    }

    pub fn with_bearing_threshold(mut self, degrees: f64) -> Self {
        self.bearing_compat_threshold_deg = degrees;
        self
    }

    pub fn with_queue_expiry(mut self, expiry_ms: u64) -> Self {
        self.queue_expiry_ms = expiry_ms;
        self
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Effective search radius for an attempt number (1-based), clamped by
    /// the hard cutoff.
    pub fn radius_for_attempt(&self, attempt: u32) -> f64 {
        let factor = self
            .radius_expansion_factor
            .powi(attempt.saturating_sub(1) as i32);
        (self.initial_search_radius_m * factor).min(self.hard_radius_cutoff_m)
    }
}

/// Operational boundary of the service area: zero or more polygons. With no
/// polygon configured every position passes.
#[derive(Debug, Clone, Default, Resource, Serialize, Deserialize)]
pub struct ServiceBoundary {
    pub polygons: Vec<Vec<GeoPoint>>,
}

impl ServiceBoundary {
    pub fn is_configured(&self) -> bool {
        !self.polygons.is_empty()
    }

    pub fn contains(&self, point: GeoPoint) -> bool {
        if self.polygons.is_empty() {
            return true;
        }
        self.polygons.iter().any(|p| point_in_polygon(point, p))
    }
}

/// A named zone polygon used by the compatibility pre-check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Zone {
    pub name: String,
    pub polygon: Vec<GeoPoint>,
}

/// Zone membership plus a pairwise compatibility table. Pairs without a rule
/// yield `None`, which the evaluator treats as "no zone opinion".
#[derive(Debug, Clone, Default, Resource, Serialize, Deserialize)]
pub struct ZoneCompatibility {
    zones: Vec<Zone>,
    rules: HashMap<(String, String), bool>,
}

impl ZoneCompatibility {
    pub fn new(zones: Vec<Zone>) -> Self {
        Self {
            zones,
            rules: HashMap::new(),
        }
    }

    /// Record whether destinations in `a` and `b` may share a driver chain.
    /// The rule is symmetric.
    pub fn set_rule(&mut self, a: &str, b: &str, compatible: bool) {
        self.rules
            .insert((a.to_string(), b.to_string()), compatible);
        self.rules
            .insert((b.to_string(), a.to_string()), compatible);
    }

    /// Name of the first zone containing `point`, if any.
    pub fn zone_of(&self, point: GeoPoint) -> Option<&str> {
        self.zones
            .iter()
            .find(|z| point_in_polygon(point, &z.polygon))
            .map(|z| z.name.as_str())
    }

    /// Pairwise verdict, `None` when no rule is configured for the pair.
    pub fn compatible(&self, a: &str, b: &str) -> Option<bool> {
        self.rules.get(&(a.to_string(), b.to_string())).copied()
    }
}
