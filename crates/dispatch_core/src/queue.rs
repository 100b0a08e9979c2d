//! Fallback queue for bookings with no eligible candidate at creation time.
//!
//! Entries carry a frozen copy of the fields matching needs, so later edits
//! to the booking never change what a queued re-evaluation sees. Each entry
//! owns its expiry timer; removing the entry cancels the timer.

use std::collections::HashMap;

use bevy_ecs::prelude::Resource;

use crate::booking::{Booking, FareEstimate, VehicleClass};
use crate::clock::TimerHandle;
use crate::geo::GeoPoint;
use crate::ids::{BookingId, PassengerId};

#[derive(Debug, Clone)]
pub struct QueuedBooking {
    pub booking: BookingId,
    pub passenger: PassengerId,
    pub pickup: GeoPoint,
    pub destination: GeoPoint,
    pub vehicle_class: VehicleClass,
    pub fare: FareEstimate,
    pub queued_at: u64,
    pub expires_at: u64,
    pub expiry_timer: TimerHandle,
}

impl QueuedBooking {
    pub fn freeze(booking: &Booking, now: u64, expires_at: u64, expiry_timer: TimerHandle) -> Self {
        Self {
            booking: booking.id,
            passenger: booking.passenger,
            pickup: booking.pickup,
            destination: booking.destination,
            vehicle_class: booking.vehicle_class,
            fare: booking.fare,
            queued_at: now,
            expires_at,
            expiry_timer,
        }
    }

    pub fn is_expired(&self, now: u64) -> bool {
        now >= self.expires_at
    }
}

#[derive(Debug, Default, Resource)]
pub struct MatchingQueue {
    entries: HashMap<BookingId, QueuedBooking>,
}

impl MatchingQueue {
    pub fn insert(&mut self, entry: QueuedBooking) {
        self.entries.insert(entry.booking, entry);
    }

    pub fn remove(&mut self, id: BookingId) -> Option<QueuedBooking> {
        self.entries.remove(&id)
    }

    pub fn get(&self, id: BookingId) -> Option<&QueuedBooking> {
        self.entries.get(&id)
    }

    pub fn contains(&self, id: BookingId) -> bool {
        self.entries.contains_key(&id)
    }

    /// Non-expired entries, in no particular order.
    pub fn live_entries(&self, now: u64) -> Vec<QueuedBooking> {
        self.entries
            .values()
            .filter(|e| !e.is_expired(now))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
