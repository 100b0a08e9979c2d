//! Expiry of queued bookings that never found a match.

use bevy_ecs::prelude::{Query, Res, ResMut};

use crate::attempt::DispatchAttempt;
use crate::clock::{CurrentEvent, DispatchClock, EventKind, EventSubject};
use crate::ledger::BookingLedger;
use crate::queue::MatchingQueue;
use crate::telemetry::DispatchTelemetry;

pub fn queue_expiry_system(
    clock: Res<DispatchClock>,
    event: Res<CurrentEvent>,
    ledger: Res<BookingLedger>,
    mut telemetry: ResMut<DispatchTelemetry>,
    mut queue: ResMut<MatchingQueue>,
    mut attempts: Query<&mut DispatchAttempt>,
) {
    if event.0.kind != EventKind::QueueExpiry {
        return;
    }
    let Some(EventSubject::Booking(booking)) = event.0.subject else {
        return;
    };
    let now = clock.now();
    match queue.get(booking) {
        Some(entry) if entry.is_expired(now) => {}
        // Matched entries cancel their timer; a signal that slipped through
        // anyway finds nothing to do.
        _ => return,
    }
    queue.remove(booking);

    if ledger.mark_expired(booking, now) {
        DispatchTelemetry::bump(&mut telemetry.queue_expired);
        DispatchTelemetry::bump(&mut telemetry.bookings_expired);
        tracing::info!(booking = %booking, "queued booking expired unmatched");
    }
    if let Some(mut attempt) = attempts.iter_mut().find(|a| a.booking == booking) {
        attempt.resolve();
    }
}
