//! Re-sweep when a driver comes online.
//!
//! One fresh driver can unblock many waiting bookings: every non-expired
//! queue entry and every pending booking without a live offer is re-checked
//! against that single driver, with the same capacity and compatibility
//! rules as the normal candidate query. Eligible bookings get a new
//! selection round rather than a direct offer, so ranking still applies.

use bevy_ecs::prelude::{Entity, Query, Res, ResMut};

use crate::attempt::DispatchAttempt;
use crate::booking::BookingStatus;
use crate::clock::{CurrentEvent, DispatchClock, EventKind, EventSubject};
use crate::compat::CompatibilityEvaluator;
use crate::config::{DispatchConfig, ServiceBoundary, ZoneCompatibility};
use crate::directory::{active_destinations, check_driver, CandidateQuery, Driver, Position};
use crate::ledger::BookingLedger;
use crate::offer::{OfferRecord, OfferStatus};
use crate::queue::MatchingQueue;

#[allow(clippy::too_many_arguments)]
pub fn driver_online_sweep_system(
    mut clock: ResMut<DispatchClock>,
    event: Res<CurrentEvent>,
    config: Res<DispatchConfig>,
    boundary: Option<Res<ServiceBoundary>>,
    zones: Option<Res<ZoneCompatibility>>,
    ledger: Res<BookingLedger>,
    queue: Res<MatchingQueue>,
    drivers: Query<(Entity, &Driver, &Position)>,
    attempts: Query<&DispatchAttempt>,
    offers: Query<&OfferRecord>,
) {
    if event.0.kind != EventKind::DriverOnline {
        return;
    }
    let Some(EventSubject::Driver(driver_id)) = event.0.subject else {
        return;
    };
    let Some((_, driver, position)) = drivers.iter().find(|(_, d, _)| d.id == driver_id) else {
        return;
    };
    if !driver.online {
        return;
    }

    let now = clock.now();
    let evaluator =
        CompatibilityEvaluator::new(config.bearing_compat_threshold_deg, zones.as_deref());
    let active = active_destinations(driver, &ledger);

    for entry in queue.live_entries(now) {
        let query = CandidateQuery {
            pickup: entry.pickup,
            vehicle_class: entry.vehicle_class,
            radius_m: config.hard_radius_cutoff_m,
            now,
        };
        if check_driver(driver, position, &query, boundary.as_deref(), &config).is_err() {
            continue;
        }
        if !evaluator.is_compatible(entry.pickup, entry.destination, &active) {
            continue;
        }
        tracing::debug!(
            booking = %entry.booking,
            driver = %driver_id,
            "queued booking re-opened by driver coming online"
        );
        clock.schedule_in(
            0,
            EventKind::TryMatch,
            Some(EventSubject::Booking(entry.booking)),
        );
    }

    for attempt in attempts.iter() {
        if attempt.resolved || queue.contains(attempt.booking) {
            continue;
        }
        if attempt.offered.contains(&driver_id) {
            continue;
        }
        let pending_offer_out = attempt
            .current_offer
            .and_then(|entity| offers.get(entity).ok())
            .is_some_and(|record| record.status == OfferStatus::Pending);
        if pending_offer_out {
            continue;
        }
        let Some(booking) = ledger.get(attempt.booking) else {
            continue;
        };
        if booking.status != BookingStatus::Pending {
            continue;
        }
        let query = CandidateQuery {
            pickup: booking.pickup,
            vehicle_class: booking.vehicle_class,
            radius_m: attempt.radius_m,
            now,
        };
        if check_driver(driver, position, &query, boundary.as_deref(), &config).is_err() {
            continue;
        }
        if !evaluator.is_compatible(booking.pickup, booking.destination, &active) {
            continue;
        }
        clock.schedule_in(
            0,
            EventKind::TryMatch,
            Some(EventSubject::Booking(attempt.booking)),
        );
    }
}
