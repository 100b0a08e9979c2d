//! The two-phase timeout windows of an outstanding offer.
//!
//! Phase 1 elapsing moves the record to its second chance and lets
//! escalation proceed to the next candidate; the driver can still accept
//! until the final deadline, after which the record expires terminally.
//! Both handlers are no-ops for records that already resolved, so a timer
//! that slipped past cancellation does no harm.

use bevy_ecs::prelude::{Query, Res, ResMut};

use crate::attempt::DispatchAttempt;
use crate::clock::{CurrentEvent, DispatchClock, EventKind, EventSubject};
use crate::offer::{OfferRecord, OfferStatus};
use crate::telemetry::DispatchTelemetry;

pub fn offer_timeout_system(
    mut clock: ResMut<DispatchClock>,
    event: Res<CurrentEvent>,
    mut telemetry: ResMut<DispatchTelemetry>,
    mut attempts: Query<&mut DispatchAttempt>,
    mut offers: Query<&mut OfferRecord>,
) {
    let kind = event.0.kind;
    if kind != EventKind::OfferPhase1Elapsed && kind != EventKind::OfferFinalElapsed {
        return;
    }
    let Some(EventSubject::Offer(entity)) = event.0.subject else {
        return;
    };
    let Ok(mut record) = offers.get_mut(entity) else {
        return;
    };
    let now = clock.now();

    match kind {
        EventKind::OfferPhase1Elapsed => {
            record.phase1_timer = None;
            if !record.transition(OfferStatus::SecondChance, now) {
                return;
            }
            DispatchTelemetry::bump(&mut telemetry.offers_second_chance);
            tracing::debug!(offer = %record.id, "phase 1 elapsed, second chance open");
        }
        EventKind::OfferFinalElapsed => {
            record.phase2_timer = None;
            if !record.transition(OfferStatus::Expired, now) {
                return;
            }
            DispatchTelemetry::bump(&mut telemetry.offers_expired);
            tracing::debug!(offer = %record.id, "second chance elapsed, offer expired");
        }
        _ => return,
    }

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
