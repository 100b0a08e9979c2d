//! Read-side views consumed by UI and notification layers.
//!
//! The driver feed lists a driver's offers filtered the way their app shows
//! them: cancelled entries disappear immediately, and anything older than the
//! configured age drops out. Transport of these views is out of scope.

use serde::Serialize;

use crate::booking::{BookingStatus, FareEstimate};
use crate::geo::GeoPoint;
use crate::ids::{BookingId, DriverId, OfferId};
use crate::ledger::BookingLedger;
use crate::offer::{OfferRecord, OfferStatus};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OfferView {
    pub id: OfferId,
    pub booking: BookingId,
    pub status: OfferStatus,
    pub pickup: GeoPoint,
    pub destination: GeoPoint,
    pub fare: FareEstimate,
    pub eta_minutes: f64,
    pub created_at: u64,
    pub phase1_deadline: u64,
    pub phase2_deadline: u64,
}

/// A driver's visible offers, newest first.
pub fn driver_offer_feed<'a, I>(records: I, driver: DriverId, now: u64, max_age_ms: u64) -> Vec<OfferView>
where
    I: IntoIterator<Item = &'a OfferRecord>,
{
    let mut views: Vec<OfferView> = records
        .into_iter()
        .filter(|r| r.driver == driver)
        .filter(|r| r.status != OfferStatus::Cancelled)
        .filter(|r| now.saturating_sub(r.created_at) < max_age_ms)
        .map(|r| OfferView {
            id: r.id,
            booking: r.booking,
            status: r.status,
            pickup: r.pickup,
            destination: r.destination,
            fare: r.fare,
            eta_minutes: r.eta_minutes,
            created_at: r.created_at,
            phase1_deadline: r.phase1_deadline,
            phase2_deadline: r.phase2_deadline,
        })
        .collect();
    views.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    views
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BookingView {
    pub id: BookingId,
    pub status: BookingStatus,
    pub assigned_driver: Option<DriverId>,
    pub updated_at: u64,
}

/// Current state of one booking, if it exists.
pub fn booking_view(ledger: &BookingLedger, id: BookingId) -> Option<BookingView> {
    ledger.get(id).map(|b| BookingView {
        id: b.id,
        status: b.status,
        assigned_driver: b.assigned_driver,
        updated_at: b.updated_at,
    })
}
