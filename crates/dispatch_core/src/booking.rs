//! Booking rows and their status machine.
//!
//! A booking's status moves along a closed DAG; legality is enforced by
//! [`BookingStatus::can_transition`] and nothing ever re-enters `Pending`.
//! Rows are owned by the [`crate::ledger::BookingLedger`] and mutated only
//! through its transactions.

use serde::{Deserialize, Serialize};

use crate::geo::GeoPoint;
use crate::ids::{BookingId, DriverId, PassengerId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VehicleClass {
    Standard,
    Premium,
    Van,
}

/// Opaque fare figure attached at creation time. Never computed here.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FareEstimate(pub f64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BookingStatus {
    Pending,
    Accepted,
    DriverArriving,
    DriverArrived,
    InProgress,
    Completed,
    Cancelled,
    Expired,
}

impl BookingStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Expired)
    }

    /// States in which `assigned_driver` must be set.
    pub fn holds_driver(self) -> bool {
        matches!(
            self,
            Self::Accepted | Self::DriverArriving | Self::DriverArrived | Self::InProgress
        )
    }

    /// Transition legality table. Terminal states admit no transition.
    pub fn can_transition(self, to: Self) -> bool {
        use BookingStatus::*;
        matches!(
            (self, to),
            (Pending, Accepted)
                | (Pending, Cancelled)
                | (Pending, Expired)
                | (Accepted, DriverArriving)
                | (Accepted, InProgress)
                | (Accepted, Cancelled)
                | (DriverArriving, DriverArrived)
                | (DriverArriving, Cancelled)
                | (DriverArrived, InProgress)
                | (DriverArrived, Cancelled)
                | (InProgress, Completed)
        )
    }
}

/// Which party asked for a cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CancelInitiator {
    Passenger,
    Driver,
}

/// One ride request. `updated_at` is bookkeeping and may move even on
/// terminal rows; everything else is frozen once a terminal state is reached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Booking {
    pub id: BookingId,
    pub passenger: PassengerId,
    pub pickup: GeoPoint,
    pub destination: GeoPoint,
    pub vehicle_class: VehicleClass,
    pub fare: FareEstimate,
    pub requested_at: u64,
    pub scheduled_at: Option<u64>,
    pub assigned_driver: Option<DriverId>,
    pub status: BookingStatus,
    pub updated_at: u64,
    pub accepted_at: Option<u64>,
    pub cancelled_by: Option<CancelInitiator>,
    pub cancel_reason: Option<String>,
}

/// Caller-facing description of a booking to create.
#[derive(Debug, Clone)]
pub struct NewBooking {
    pub id: BookingId,
    pub passenger: PassengerId,
    pub pickup: GeoPoint,
    pub destination: GeoPoint,
    pub vehicle_class: VehicleClass,
    pub fare: FareEstimate,
    pub scheduled_at: Option<u64>,
}

impl Booking {
    pub fn create(new: NewBooking, now: u64) -> Self {
        Self {
            id: new.id,
            passenger: new.passenger,
            pickup: new.pickup,
            destination: new.destination,
            vehicle_class: new.vehicle_class,
            fare: new.fare,
            requested_at: now,
            scheduled_at: new.scheduled_at,
            assigned_driver: None,
            status: BookingStatus::Pending,
            updated_at: now,
            accepted_at: None,
            cancelled_by: None,
            cancel_reason: None,
        }
    }
}
