//! Candidate selection and the escalation loop.
//!
//! Runs whenever a booking needs (another) offer out: on entry, after a
//! decline, after a phase-1 timeout, after an offer expired, and when a
//! driver coming online re-opens a queued booking. At most one offer per
//! booking is in its pending phase at any time; the guard at the top makes
//! re-entrant triggers harmless.

use bevy_ecs::prelude::{Commands, Entity, Query, Res, ResMut};

use crate::attempt::DispatchAttempt;
use crate::booking::BookingStatus;
use crate::clock::{CurrentEvent, DispatchClock, EventKind, EventSubject};
use crate::compat::CompatibilityEvaluator;
use crate::config::{DispatchConfig, ServiceBoundary, ZoneCompatibility};
use crate::directory::{
    active_destinations, check_driver, find_candidates, CandidateQuery, Driver, Position,
};
use crate::eta::{EtaProviderResource, FALLBACK_ETA_MINUTES};
use crate::ids::OfferId;
use crate::ledger::BookingLedger;
use crate::notify::NotificationSinkResource;
use crate::offer::{OfferRecord, OfferStatus};
use crate::queue::QueuedBooking;
use crate::ranking::filter_and_rank;
use crate::spatial::{prune_disk, GeoIndex, SpatialIndex};
use crate::telemetry::DispatchTelemetry;

#[allow(clippy::too_many_arguments)]
pub fn try_match_system(
    mut commands: Commands,
    mut clock: ResMut<DispatchClock>,
    event: Res<CurrentEvent>,
    config: Res<DispatchConfig>,
    boundary: Option<Res<ServiceBoundary>>,
    zones: Option<Res<ZoneCompatibility>>,
    ledger: Res<BookingLedger>,
    index: Res<SpatialIndex>,
    eta: Res<EtaProviderResource>,
    sink: Res<NotificationSinkResource>,
    mut telemetry: ResMut<DispatchTelemetry>,
    mut queue: ResMut<crate::queue::MatchingQueue>,
    mut attempts: Query<&mut DispatchAttempt>,
    drivers: Query<(Entity, &Driver, &Position)>,
    offers: Query<&OfferRecord>,
) {
    if event.0.kind != EventKind::TryMatch {
        return;
    }
    let Some(EventSubject::Booking(booking_id)) = event.0.subject else {
        return;
    };
    let Some(mut attempt) = attempts.iter_mut().find(|a| a.booking == booking_id) else {
        return;
    };
    if attempt.resolved {
        return;
    }

    let Some(booking) = ledger.get(booking_id) else {
        attempt.resolve();
        return;
    };
    if booking.status != BookingStatus::Pending || booking.assigned_driver.is_some() {
        attempt.resolve();
        return;
    }

    // An offer still waiting for its first response keeps the slot.
    if let Some(current) = attempt.current_offer {
        match offers.get(current) {
            Ok(record) if record.status == OfferStatus::Pending => return,
            _ => attempt.current_offer = None,
        }
    }

    let geo = GeoIndex::default();
    let evaluator =
        CompatibilityEvaluator::new(config.bearing_compat_threshold_deg, zones.as_deref());

    loop {
        let query = CandidateQuery {
            pickup: booking.pickup,
            vehicle_class: booking.vehicle_class,
            radius_m: attempt.radius_m,
            now: clock.now(),
        };

        // Coarse grid-disk pass over the spatial index, then precise filters.
        let rows: Vec<(Entity, &Driver, &Position)> = match geo.cell_for(booking.pickup) {
            Some(cell) => {
                let reach = query.radius_m.min(config.hard_radius_cutoff_m);
                let disk = geo.grid_disk(cell, geo.rings_for_radius(reach));
                let disk = prune_disk(cell, disk, reach);
                index
                    .drivers_in_cells(&disk)
                    .into_iter()
                    .filter_map(|entity| drivers.get(entity).ok())
                    .collect()
            }
            None => drivers.iter().collect(),
        };
        let rows = rows
            .into_iter()
            .filter(|(_, driver, _)| !attempt.offered.contains(&driver.id));

        let set = find_candidates(rows, &query, &ledger, boundary.as_deref(), &config);
        let diagnosis = set.diagnose();
        let ranked = filter_and_rank(
            set.snapshots,
            &evaluator,
            booking.pickup,
            booking.destination,
        );

        for candidate in &ranked {
            // State moves between filtering and the send; re-check the
            // candidate immediately before offering.
            let Ok((_, driver, position)) = drivers.get(candidate.entity) else {
                continue;
            };
            if check_driver(driver, position, &query, boundary.as_deref(), &config).is_err() {
                continue;
            }
            if !evaluator.is_compatible(
                booking.pickup,
                booking.destination,
                &active_destinations(driver, &ledger),
            ) {
                continue;
            }

            let now = clock.now();
            let phase1_deadline = now + config.phase1_window_ms;
            let phase2_deadline = phase1_deadline + config.phase2_window_ms;
            let eta_minutes = eta
                .estimate_minutes(position.point, booking.pickup)
                .unwrap_or(FALLBACK_ETA_MINUTES);

            let mut record = OfferRecord {
                id: OfferId::derive(booking_id, driver.id),
                booking: booking_id,
                driver: driver.id,
                passenger: booking.passenger,
                pickup: booking.pickup,
                destination: booking.destination,
                fare: booking.fare,
                eta_minutes,
                created_at: now,
                phase1_deadline,
                phase2_deadline,
                status: OfferStatus::Pending,
                resolved_at: None,
                phase1_timer: None,
                phase2_timer: None,
            };

            attempt.offered.insert(driver.id);

            if sink.deliver(driver.id, &record.summary()).is_err() {
                DispatchTelemetry::bump(&mut telemetry.delivery_failures);
                tracing::warn!(
                    booking = %booking_id,
                    driver = %driver.id,
                    "offer delivery failed, escalating immediately"
                );
                continue;
            }

            let offer_entity = commands.spawn_empty().id();
            record.phase1_timer = Some(clock.schedule_at(
                phase1_deadline,
                EventKind::OfferPhase1Elapsed,
                Some(EventSubject::Offer(offer_entity)),
            ));
            record.phase2_timer = Some(clock.schedule_at(
                phase2_deadline,
                EventKind::OfferFinalElapsed,
                Some(EventSubject::Offer(offer_entity)),
            ));
            tracing::info!(
                offer = %record.id,
                driver = %driver.id,
                distance_m = candidate.distance_to_pickup_m,
                eta_minutes,
                "offer sent"
            );
            commands.entity(offer_entity).insert(record);
            attempt.current_offer = Some(offer_entity);
            DispatchTelemetry::bump(&mut telemetry.offers_sent);

            // Matched: the booking no longer waits in the queue.
            if let Some(entry) = queue.remove(booking_id) {
                clock.cancel(entry.expiry_timer);
                DispatchTelemetry::bump(&mut telemetry.queue_matched);
            }
            return;
        }

        // Nothing offerable this round.
        if attempt.offered.is_empty() && attempt.attempt == 1 {
            if !queue.contains(booking_id) {
                let now = clock.now();
                let expires_at = now + config.queue_expiry_ms;
                let timer = clock.schedule_at(
                    expires_at,
                    EventKind::QueueExpiry,
                    Some(EventSubject::Booking(booking_id)),
                );
                queue.insert(QueuedBooking::freeze(&booking, now, expires_at, timer));
                DispatchTelemetry::bump(&mut telemetry.queue_enqueued);
                tracing::info!(
                    booking = %booking_id,
                    reason = diagnosis.passenger_message(),
                    "no eligible candidates, queued"
                );
            }
            return;
        }

        if attempt.attempt < config.max_attempts {
            attempt.attempt += 1;
            attempt.radius_m = config.radius_for_attempt(attempt.attempt);
            tracing::debug!(
                booking = %booking_id,
                attempt = attempt.attempt,
                radius_m = attempt.radius_m,
                "expanding search radius"
            );
            continue;
        }

        // Out of attempts. A driver in the second-chance window may still
        // accept; the expiry of that record re-triggers this system.
        let grace_open = offers
            .iter()
            .any(|r| r.booking == booking_id && !r.is_terminal());
        if grace_open {
            return;
        }
        if ledger.mark_expired(booking_id, clock.now()) {
            DispatchTelemetry::bump(&mut telemetry.bookings_expired);
            tracing::info!(booking = %booking_id, "candidates exhausted, booking expired");
        }
        if let Some(entry) = queue.remove(booking_id) {
            clock.cancel(entry.expiry_timer);
        }
        attempt.resolve();
        return;
    }
}
