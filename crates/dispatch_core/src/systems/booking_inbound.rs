//! Entry of a new booking into dispatch.
//!
//! Validates the destination against the service boundary, spawns the
//! per-booking attempt entity, and kicks off candidate selection. A booking
//! that is not yet visible in the ledger gets exactly one retry after a short
//! delay to absorb creation-ordering races.

use bevy_ecs::prelude::{Commands, Query, Res, ResMut, Resource};
use std::collections::HashSet;

use crate::attempt::DispatchAttempt;
use crate::booking::BookingStatus;
use crate::clock::{CurrentEvent, DispatchClock, EventKind, EventSubject};
use crate::config::{DispatchConfig, ServiceBoundary};
use crate::ids::BookingId;
use crate::ledger::BookingLedger;
use crate::telemetry::DispatchTelemetry;

/// Bookings that already used their single not-found retry.
#[derive(Debug, Default, Resource)]
pub struct InboundRetries(pub HashSet<BookingId>);

pub fn booking_inbound_system(
    mut commands: Commands,
    mut clock: ResMut<DispatchClock>,
    event: Res<CurrentEvent>,
    config: Res<DispatchConfig>,
    boundary: Option<Res<ServiceBoundary>>,
    ledger: Res<BookingLedger>,
    mut retries: ResMut<InboundRetries>,
    mut telemetry: ResMut<DispatchTelemetry>,
    attempts: Query<&DispatchAttempt>,
) {
    if event.0.kind != EventKind::BookingInbound {
        return;
    }
    let Some(EventSubject::Booking(booking_id)) = event.0.subject else {
        return;
    };

    let Some(booking) = ledger.get(booking_id) else {
        if retries.0.insert(booking_id) {
            clock.schedule_in(
                config.inbound_retry_delay_ms,
                EventKind::BookingInbound,
                Some(EventSubject::Booking(booking_id)),
            );
            tracing::debug!(booking = %booking_id, "not visible in the ledger yet, retrying once");
        } else {
            DispatchTelemetry::bump(&mut telemetry.inbound_dropped);
            tracing::warn!(booking = %booking_id, "never appeared in the ledger, dropping");
        }
        return;
    };
    retries.0.remove(&booking_id);

    if booking.status != BookingStatus::Pending || booking.assigned_driver.is_some() {
        return;
    }
    if attempts.iter().any(|a| a.booking == booking_id) {
        return;
    }

    if let Some(boundary) = boundary.as_deref() {
        if boundary.is_configured() && !boundary.contains(booking.destination) {
            ledger.mark_expired(booking_id, clock.now());
            DispatchTelemetry::bump(&mut telemetry.inbound_dropped);
            tracing::warn!(booking = %booking_id, "destination outside the service boundary");
            return;
        }
    }

    commands.spawn(DispatchAttempt::new(
        booking_id,
        config.radius_for_attempt(1),
    ));
    clock.schedule_in(0, EventKind::TryMatch, Some(EventSubject::Booking(booking_id)));
}
