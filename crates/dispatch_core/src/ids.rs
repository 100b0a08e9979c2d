//! Identifier newtypes shared across the engine.
//!
//! Bookings, passengers and drivers are identified by caller-supplied ids;
//! offer ids are derived from the (booking, driver) pair plus a random
//! uniqueness token so a re-offer to the same driver never collides with an
//! earlier, already-terminal record.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BookingId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DriverId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PassengerId(pub u64);

impl fmt::Display for BookingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "booking-{}", self.0)
    }
}

impl fmt::Display for DriverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "driver-{}", self.0)
    }
}

impl fmt::Display for PassengerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "passenger-{}", self.0)
    }
}

/// Identity of one offer of a booking to a driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OfferId {
    pub booking: BookingId,
    pub driver: DriverId,
    pub token: u32,
}

impl OfferId {
    /// Derive a fresh offer id for the pair with a random uniqueness token.
    pub fn derive(booking: BookingId, driver: DriverId) -> Self {
        Self {
            booking,
            driver,
            token: rand::random(),
        }
    }
}

impl fmt::Display for OfferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "B{}-D{}-{:08x}",
            self.booking.0, self.driver.0, self.token
        )
    }
}
