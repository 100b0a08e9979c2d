//! Offer records: one outstanding offer of a booking to a driver.
//!
//! Records are spawned as entities when the engine offers a candidate and
//! stay in the world after resolution as driver-visible history. Pickup,
//! destination and fare are snapshotted at offer time so later booking edits
//! never retroactively change an outstanding offer.

use bevy_ecs::prelude::Component;
use serde::{Deserialize, Serialize};

use crate::booking::FareEstimate;
use crate::clock::TimerHandle;
use crate::geo::GeoPoint;
use crate::ids::{BookingId, DriverId, OfferId, PassengerId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OfferStatus {
    /// Waiting for the driver's first response.
    Pending,
    /// Phase 1 elapsed; the driver may still accept while escalation moves on.
    SecondChance,
    Accepted,
    Declined,
    Expired,
    /// Withdrawn by the engine (booking cancelled or delivery failed).
    Cancelled,
    /// Another driver's acceptance committed first.
    AcceptedByOther,
}

impl OfferStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending | Self::SecondChance)
    }

    pub fn can_transition(self, to: Self) -> bool {
        use OfferStatus::*;
        match self {
            Pending => matches!(
                to,
                SecondChance | Accepted | Declined | Expired | Cancelled | AcceptedByOther
            ),
            SecondChance => {
                matches!(to, Accepted | Declined | Expired | Cancelled | AcceptedByOther)
            }
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Component)]
pub struct OfferRecord {
    pub id: OfferId,
    pub booking: BookingId,
    pub driver: DriverId,
    pub passenger: PassengerId,
    pub pickup: GeoPoint,
    pub destination: GeoPoint,
    pub fare: FareEstimate,
    pub eta_minutes: f64,
    pub created_at: u64,
    pub phase1_deadline: u64,
    pub phase2_deadline: u64,
    pub status: OfferStatus,
    pub resolved_at: Option<u64>,
    /// Live timers for this record; cancelled on any early resolution.
    pub phase1_timer: Option<TimerHandle>,
    pub phase2_timer: Option<TimerHandle>,
}

impl OfferRecord {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Apply a legality-checked status transition. Returns false (and leaves
    /// the record untouched) for illegal moves, which makes duplicate
    /// decline/timeout signals no-ops.
    pub fn transition(&mut self, to: OfferStatus, now: u64) -> bool {
        if !self.status.can_transition(to) {
            return false;
        }
        self.status = to;
        if to.is_terminal() {
            self.resolved_at = Some(now);
        }
        true
    }

    /// Timer handles to cancel when the record resolves early, clearing them
    /// from the record as a side effect.
    pub fn take_timers(&mut self) -> impl Iterator<Item = TimerHandle> {
        self.phase1_timer.take().into_iter().chain(self.phase2_timer.take())
    }

    pub fn summary(&self) -> OfferSummary {
        OfferSummary {
            offer: self.id,
            booking: self.booking,
            pickup: self.pickup,
            destination: self.destination,
            fare: self.fare,
            eta_minutes: self.eta_minutes,
            respond_by: self.phase1_deadline,
        }
    }
}

/// What the notification layer gets asked to deliver. Formatting and
/// transport live outside this engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OfferSummary {
    pub offer: OfferId,
    pub booking: BookingId,
    pub pickup: GeoPoint,
    pub destination: GeoPoint,
    pub fare: FareEstimate,
    pub eta_minutes: f64,
    pub respond_by: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> OfferRecord {
        OfferRecord {
            id: OfferId {
                booking: BookingId(1),
                driver: DriverId(2),
                token: 7,
            },
            booking: BookingId(1),
            driver: DriverId(2),
            passenger: PassengerId(3),
            pickup: GeoPoint::new(37.7749, -122.4194),
            destination: GeoPoint::new(37.7599, -122.4148),
            fare: FareEstimate(12.0),
            eta_minutes: 4.0,
            created_at: 1_000,
            phase1_deadline: 31_000,
            phase2_deadline: 211_000,
            status: OfferStatus::Pending,
            resolved_at: None,
            phase1_timer: None,
            phase2_timer: None,
        }
    }

    #[test]
    fn pending_walks_through_second_chance_to_expiry() {
        let mut offer = record();
        assert!(offer.transition(OfferStatus::SecondChance, 31_000));
        assert!(!offer.is_terminal());
        assert!(offer.transition(OfferStatus::Expired, 211_000));
        assert!(offer.is_terminal());
        assert_eq!(offer.resolved_at, Some(211_000));
    }

    #[test]
    fn duplicate_signals_are_no_ops() {
        let mut offer = record();
        assert!(offer.transition(OfferStatus::Declined, 5_000));
        assert!(!offer.transition(OfferStatus::Declined, 6_000));
        assert!(!offer.transition(OfferStatus::Expired, 7_000));
        assert_eq!(offer.resolved_at, Some(5_000));
        assert_eq!(offer.status, OfferStatus::Declined);
    }

    #[test]
    fn second_chance_may_still_accept() {
        let mut offer = record();
        assert!(offer.transition(OfferStatus::SecondChance, 31_000));
        assert!(offer.transition(OfferStatus::Accepted, 90_000));
        assert_eq!(offer.status, OfferStatus::Accepted);
    }

    #[test]
    fn terminal_cannot_reopen() {
        let mut offer = record();
        assert!(offer.transition(OfferStatus::Cancelled, 2_000));
        assert!(!offer.transition(OfferStatus::SecondChance, 3_000));
        assert!(!offer.transition(OfferStatus::Accepted, 3_000));
    }

    #[test]
    fn take_timers_drains_handles() {
        let mut offer = record();
        offer.phase1_timer = None;
        offer.phase2_timer = None;
        assert_eq!(offer.take_timers().count(), 0);
    }
}
