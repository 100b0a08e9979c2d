//! Driver decline handling and post-commit assignment cleanup.
//!
//! Declines close the record immediately and move escalation along instead
//! of waiting out the timeout. Once an acceptance commits in the ledger,
//! every other outstanding record of the booking closes as lost-to-another
//! so the losing drivers' views update, and the attempt is torn down.

use bevy_ecs::prelude::{Entity, Query, Res, ResMut};

use crate::attempt::DispatchAttempt;
use crate::clock::{CurrentEvent, DispatchClock, EventKind, EventSubject};
use crate::offer::{OfferRecord, OfferStatus};
use crate::queue::MatchingQueue;
use crate::telemetry::DispatchTelemetry;

pub fn driver_declined_system(
    mut clock: ResMut<DispatchClock>,
    event: Res<CurrentEvent>,
    mut telemetry: ResMut<DispatchTelemetry>,
    mut attempts: Query<&mut DispatchAttempt>,
    mut offers: Query<&mut OfferRecord>,
) {
    if event.0.kind != EventKind::DriverDeclined {
        return;
    }
    let Some(EventSubject::Offer(entity)) = event.0.subject else {
        return;
    };
    let Ok(mut record) = offers.get_mut(entity) else {
        return;
    };
    let now = clock.now();
    // Duplicate decline signals for an already-terminal record are no-ops.
    if !record.transition(OfferStatus::Declined, now) {
        return;
    }
    let timers: Vec<_> = record.take_timers().collect();
    for timer in timers {
        clock.cancel(timer);
    }
    DispatchTelemetry::bump(&mut telemetry.offers_declined);
    tracing::debug!(offer = %record.id, "driver declined");

    let booking = record.booking;
    if let Some(mut attempt) = attempts.iter_mut().find(|a| a.booking == booking) {
        if attempt.current_offer == Some(entity) {
            attempt.current_offer = None;
        }
        if !attempt.resolved {
            clock.schedule_in(0, EventKind::TryMatch, Some(EventSubject::Booking(booking)));
        }
    }
}

pub fn assignment_committed_system(
    mut clock: ResMut<DispatchClock>,
    event: Res<CurrentEvent>,
    mut telemetry: ResMut<DispatchTelemetry>,
    mut queue: ResMut<MatchingQueue>,
    mut attempts: Query<&mut DispatchAttempt>,
    mut offers: Query<(Entity, &mut OfferRecord)>,
) {
    if event.0.kind != EventKind::AssignmentCommitted {
        return;
    }
    let Some(EventSubject::Offer(winner)) = event.0.subject else {
        return;
    };
    let Some(booking) = offers.get(winner).ok().map(|(_, r)| r.booking) else {
        return;
    };
    let now = clock.now();

    for (entity, mut record) in offers.iter_mut() {
        if entity == winner || record.booking != booking || record.is_terminal() {
            continue;
        }
        record.transition(OfferStatus::AcceptedByOther, now);
        let timers: Vec<_> = record.take_timers().collect();
        for timer in timers {
            clock.cancel(timer);
        }
        DispatchTelemetry::bump(&mut telemetry.offers_closed_accepted_by_other);
        tracing::debug!(offer = %record.id, "closed, booking went to another driver");
    }

    if let Some(mut attempt) = attempts.iter_mut().find(|a| a.booking == booking) {
        attempt.resolve();
    }
    if let Some(entry) = queue.remove(booking) {
        clock.cancel(entry.expiry_timer);
    }
}
