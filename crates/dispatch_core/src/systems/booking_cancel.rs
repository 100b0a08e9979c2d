//! Teardown after a cancellation committed in the ledger.
//!
//! A dangling offer visible to a driver after the passenger cancelled is a
//! correctness bug, so every non-terminal record closes here, its timers are
//! cancelled, the queue entry goes, and the attempt resolves. This runs on
//! the idempotent re-cancel path too.

use bevy_ecs::prelude::{Query, Res, ResMut};

use crate::attempt::DispatchAttempt;
use crate::booking::CancelInitiator;
use crate::clock::{CurrentEvent, DispatchClock, EventKind, EventSubject};
use crate::directory::Driver;
use crate::ledger::BookingLedger;
use crate::offer::{OfferRecord, OfferStatus};
use crate::queue::MatchingQueue;
use crate::telemetry::DispatchTelemetry;

pub fn cancellation_committed_system(
    mut clock: ResMut<DispatchClock>,
    event: Res<CurrentEvent>,
    ledger: Res<BookingLedger>,
    mut telemetry: ResMut<DispatchTelemetry>,
    mut queue: ResMut<MatchingQueue>,
    mut attempts: Query<&mut DispatchAttempt>,
    mut offers: Query<&mut OfferRecord>,
    mut drivers: Query<&mut Driver>,
) {
    if event.0.kind != EventKind::CancellationCommitted {
        return;
    }
    let Some(EventSubject::Booking(booking)) = event.0.subject else {
        return;
    };
    let now = clock.now();

    for mut record in offers.iter_mut() {
        if record.booking != booking || record.is_terminal() {
            continue;
        }
        record.transition(OfferStatus::Cancelled, now);
        let timers: Vec<_> = record.take_timers().collect();
        for timer in timers {
            clock.cancel(timer);
        }
        DispatchTelemetry::bump(&mut telemetry.offers_cancelled);
    }

    if let Some(mut attempt) = attempts.iter_mut().find(|a| a.booking == booking) {
        attempt.resolve();
    }
    if let Some(entry) = queue.remove(booking) {
        clock.cancel(entry.expiry_timer);
    }

    // An assigned driver loses the booking from their active chain. The
    // cancelled row holds no driver anymore, so the backlink is the source.
    if let Some(mut driver) = drivers
        .iter_mut()
        .find(|d| d.active_bookings.contains(&booking))
    {
        driver.active_bookings.retain(|&b| b != booking);
        let initiated_by_passenger = ledger
            .get(booking)
            .and_then(|row| row.cancelled_by)
            == Some(CancelInitiator::Passenger);
        if initiated_by_passenger {
            // The party that did not initiate is the one to tell.
            tracing::info!(
                booking = %booking,
                driver = %driver.id,
                "passenger cancelled an assigned booking"
            );
        }
    }
}
