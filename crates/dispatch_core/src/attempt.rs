//! Per-booking matching attempt state.
//!
//! One attempt entity is spawned when a booking enters dispatch and lives
//! until the booking resolves. The attempt owns the escalation state: which
//! drivers were already offered, the current search radius, and the offer
//! currently waiting for its first response. At most one offer per booking is
//! in its pending phase at any time, which this component enforces by
//! construction.

use std::collections::HashSet;

use bevy_ecs::prelude::{Component, Entity};

use crate::ids::{BookingId, DriverId};

#[derive(Debug, Component)]
pub struct DispatchAttempt {
    pub booking: BookingId,
    /// 1-based search attempt; increments on each radius expansion.
    pub attempt: u32,
    pub radius_m: f64,
    /// Drivers that already received (or were skipped after) an offer;
    /// excluded from all later rounds.
    pub offered: HashSet<DriverId>,
    /// The offer entity currently in its pending phase, if any.
    pub current_offer: Option<Entity>,
    /// Set once the booking reaches a terminal outcome; a resolved attempt
    /// ignores every further event.
    pub resolved: bool,
}

impl DispatchAttempt {
    pub fn new(booking: BookingId, initial_radius_m: f64) -> Self {
        Self {
            booking,
            attempt: 1,
            radius_m: initial_radius_m,
            offered: HashSet::new(),
            current_offer: None,
            resolved: false,
        }
    }

    pub fn resolve(&mut self) {
        self.resolved = true;
        self.current_offer = None;
    }
}
