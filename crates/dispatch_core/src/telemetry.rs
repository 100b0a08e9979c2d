//! Dispatch counters for dashboards and test assertions.

use bevy_ecs::prelude::Resource;

#[derive(Debug, Default, Resource)]
pub struct DispatchTelemetry {
    pub offers_sent: u64,
    pub offers_declined: u64,
    pub offers_second_chance: u64,
    pub offers_expired: u64,
    pub offers_cancelled: u64,
    pub offers_closed_accepted_by_other: u64,
    pub delivery_failures: u64,
    pub bookings_assigned: u64,
    pub bookings_expired: u64,
    pub bookings_cancelled_by_passenger: u64,
    pub bookings_cancelled_by_driver: u64,
    pub bookings_completed: u64,
    pub assign_race_rejections: u64,
    pub queue_enqueued: u64,
    pub queue_matched: u64,
    pub queue_expired: u64,
    pub inbound_dropped: u64,
}

impl DispatchTelemetry {
    pub fn bump(field: &mut u64) {
        *field = field.saturating_add(1);
    }
}
