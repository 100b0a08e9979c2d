//! Typed failure taxonomy.
//!
//! Ledger transactions return their rejection reasons synchronously; nothing
//! is thrown across the event loop. Engine-level failures surface as
//! [`DispatchError`]. "No eligible drivers" is deliberately *not* an error —
//! it is a [`NoDriversDiagnosis`] that feeds the queueing fallback and the
//! passenger-facing message.

use thiserror::Error;

use crate::booking::BookingStatus;
use crate::ids::{BookingId, DriverId};

/// Why `try_assign` refused to commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AssignRejection {
    #[error("{0} is already cancelled")]
    AlreadyCancelled(BookingId),
    #[error("{0} is already assigned to {1}")]
    AlreadyAssigned(BookingId, DriverId),
    #[error("{0} is in terminal state {1:?}")]
    TerminalState(BookingId, BookingStatus),
    #[error("{0} not found")]
    NotFound(BookingId),
}

impl AssignRejection {
    /// Whether the rejection stems from a concurrent mutation rather than a
    /// caller mistake.
    pub fn is_race(&self) -> bool {
        matches!(
            self,
            Self::AlreadyCancelled(_) | Self::AlreadyAssigned(..) | Self::TerminalState(..)
        )
    }
}

/// Why `try_cancel` refused to commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CancelRejection {
    #[error("{0} cannot be cancelled from state {1:?}")]
    NotCancellable(BookingId, BookingStatus),
    #[error("driver-initiated cancellation of {0} after acceptance is not permitted on this path")]
    DriverCancelRestricted(BookingId),
    #[error("{0} not found")]
    NotFound(BookingId),
}

/// Why a lifecycle progress transition was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ProgressRejection {
    #[error("{0} not found")]
    NotFound(BookingId),
    #[error("illegal transition for {0}: {1:?} -> {2:?}")]
    IllegalTransition(BookingId, BookingStatus, BookingStatus),
}

/// Engine-level failures reported to callers of [`crate::api`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DispatchError {
    #[error("{0} was mutated concurrently")]
    RaceCondition(BookingId),
    #[error("{0} not found")]
    BookingNotFound(BookingId),
    #[error("{0} not found")]
    DriverNotFound(DriverId),
    #[error("no outstanding offer of {0} to {1}")]
    OfferNotFound(BookingId, DriverId),
    #[error("{0} already exists")]
    DuplicateBooking(BookingId),
    #[error("destination of {0} lies outside the service area")]
    OutsideServiceArea(BookingId),
    #[error("invalid coordinates lat={0} lng={1}")]
    InvalidCoordinates(f64, f64),
    #[error("{0} is at capacity")]
    CapacityExceeded(DriverId),
}

/// Why a candidate query came back empty, distinguished from one pass over
/// the directory so the passenger sees the right message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoDriversDiagnosis {
    /// No online driver with a fresh status near the pickup at all.
    NoneOnline,
    /// Online drivers nearby, but none with the requested vehicle class.
    NoMatchingVehicleClass,
    /// Nearby drivers exist but all sit outside the operational boundary.
    OutsideGeography,
    /// Eligible drivers exist but are at capacity or heading the wrong way.
    AllBusy,
}

impl NoDriversDiagnosis {
    pub fn passenger_message(&self) -> &'static str {
        match self {
            Self::NoneOnline => "No drivers are online near you right now.",
            Self::NoMatchingVehicleClass => {
                "No drivers with the requested vehicle type are nearby."
            }
            Self::OutsideGeography => "Pickup is outside the current service area.",
            Self::AllBusy => "All nearby drivers are currently busy.",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn race_classification() {
        assert!(AssignRejection::AlreadyCancelled(BookingId(1)).is_race());
        assert!(AssignRejection::AlreadyAssigned(BookingId(1), DriverId(2)).is_race());
        assert!(
            AssignRejection::TerminalState(BookingId(1), BookingStatus::Expired).is_race()
        );
        assert!(!AssignRejection::NotFound(BookingId(1)).is_race());
    }

    #[test]
    fn messages_are_distinct() {
        let msgs = [
            NoDriversDiagnosis::NoneOnline.passenger_message(),
            NoDriversDiagnosis::NoMatchingVehicleClass.passenger_message(),
            NoDriversDiagnosis::OutsideGeography.passenger_message(),
            NoDriversDiagnosis::AllBusy.passenger_message(),
        ];
        for (i, a) in msgs.iter().enumerate() {
            for (j, b) in msgs.iter().enumerate() {
                if i != j {
                    assert_ne!(a, b);
                }
            }
        }
    }
}
