//! External entry points.
//!
//! Everything the outside world does to the engine comes through here:
//! submitting and cancelling bookings, driver presence and position reports,
//! accept/decline responses, and trip progress. Ledger transactions run
//! synchronously so the caller gets the committed/rejected outcome in hand;
//! the follow-up bookkeeping (offer closure, timer cancellation, escalation)
//! happens through scheduled events, the same way everything else in the
//! engine moves.

use bevy_ecs::prelude::{Entity, World};

use crate::booking::{Booking, BookingStatus, CancelInitiator, NewBooking, VehicleClass};
use crate::clock::{DispatchClock, EventKind, EventSubject};
use crate::config::{DispatchConfig, ServiceBoundary};
use crate::directory::{Driver, Position};
use crate::error::{CancelRejection, DispatchError, ProgressRejection};
use crate::feed::{booking_view, driver_offer_feed, BookingView, OfferView};
use crate::geo::GeoPoint;
use crate::ids::{BookingId, DriverId};
use crate::ledger::{BookingLedger, CancelCommit};
use crate::offer::{OfferRecord, OfferStatus};
use crate::spatial::{GeoIndex, SpatialIndex};
use crate::telemetry::DispatchTelemetry;

#[derive(Debug, Clone)]
pub struct DriverProfile {
    pub id: DriverId,
    pub position: GeoPoint,
    pub vehicle_class: VehicleClass,
    pub rating: f64,
    pub total_trips: u32,
    pub online: bool,
    pub heading_deg: Option<f64>,
    pub speed_kmh: Option<f64>,
}

/// Register a driver. An online driver immediately joins the spatial index
/// and triggers a re-sweep of waiting bookings.
pub fn register_driver(world: &mut World, profile: DriverProfile) -> Result<Entity, DispatchError> {
    let Some(cell) = GeoIndex::default().cell_for(profile.position) else {
        return Err(DispatchError::InvalidCoordinates(
            profile.position.lat,
            profile.position.lng,
        ));
    };
    let now = world.resource::<DispatchClock>().now();
    let driver_id = profile.id;
    let online = profile.online;
    let entity = world
        .spawn((
            Driver {
                id: profile.id,
                online: profile.online,
                online_updated_at: now,
                position_updated_at: now,
                vehicle_class: profile.vehicle_class,
                rating: profile.rating,
                total_trips: profile.total_trips,
                heading_deg: profile.heading_deg,
                speed_kmh: profile.speed_kmh,
                active_bookings: Vec::new(),
            },
            Position {
                point: profile.position,
                cell,
            },
        ))
        .id();

    if online {
        world
            .resource_mut::<SpatialIndex>()
            .insert_driver(entity, cell);
        world.resource_mut::<DispatchClock>().schedule_in(
            0,
            EventKind::DriverOnline,
            Some(EventSubject::Driver(driver_id)),
        );
    }
    tracing::debug!(driver = %driver_id, online, "driver registered");
    Ok(entity)
}

fn find_driver_entity(world: &mut World, driver: DriverId) -> Option<Entity> {
    let mut query = world.query::<(Entity, &Driver)>();
    query
        .iter(world)
        .find(|(_, d)| d.id == driver)
        .map(|(entity, _)| entity)
}

/// Fresh position report from a driver's device.
pub fn update_driver_position(
    world: &mut World,
    driver: DriverId,
    point: GeoPoint,
    heading_deg: Option<f64>,
    speed_kmh: Option<f64>,
) -> Result<(), DispatchError> {
    let Some(cell) = GeoIndex::default().cell_for(point) else {
        return Err(DispatchError::InvalidCoordinates(point.lat, point.lng));
    };
    let entity =
        find_driver_entity(world, driver).ok_or(DispatchError::DriverNotFound(driver))?;
    let now = world.resource::<DispatchClock>().now();

    let mut online = false;
    if let Some(mut row) = world.get_mut::<Driver>(entity) {
        row.position_updated_at = now;
        row.heading_deg = heading_deg;
        row.speed_kmh = speed_kmh;
        online = row.online;
    }
    if let Some(mut position) = world.get_mut::<Position>(entity) {
        position.point = point;
        position.cell = cell;
    }
    if online {
        world
            .resource_mut::<SpatialIndex>()
            .insert_driver(entity, cell);
    }
    Ok(())
}

/// Driver comes online. The heartbeat carries a location fix, so both the
/// online flag and the position count as fresh from here.
pub fn driver_online(world: &mut World, driver: DriverId) -> Result<(), DispatchError> {
    let entity =
        find_driver_entity(world, driver).ok_or(DispatchError::DriverNotFound(driver))?;
    let now = world.resource::<DispatchClock>().now();

    {
        let mut row = world
            .get_mut::<Driver>(entity)
            .ok_or(DispatchError::DriverNotFound(driver))?;
        row.online = true;
        row.online_updated_at = now;
        row.position_updated_at = now;
    }
    let cell = world
        .get::<Position>(entity)
        .map(|p| p.cell)
        .ok_or(DispatchError::DriverNotFound(driver))?;

    world
        .resource_mut::<SpatialIndex>()
        .insert_driver(entity, cell);
    world.resource_mut::<DispatchClock>().schedule_in(
        0,
        EventKind::DriverOnline,
        Some(EventSubject::Driver(driver)),
    );
    tracing::info!(driver = %driver, "driver online");
    Ok(())
}

/// Driver goes offline. Outstanding offers to them are treated as declines
/// so their bookings escalate immediately instead of waiting out timeouts.
pub fn driver_offline(world: &mut World, driver: DriverId) -> Result<(), DispatchError> {
    let entity =
        find_driver_entity(world, driver).ok_or(DispatchError::DriverNotFound(driver))?;
    let now = world.resource::<DispatchClock>().now();

    if let Some(mut row) = world.get_mut::<Driver>(entity) {
        row.online = false;
        row.online_updated_at = now;
    }
    world.resource_mut::<SpatialIndex>().remove_driver(entity);

    let outstanding: Vec<Entity> = {
        let mut query = world.query::<(Entity, &OfferRecord)>();
        query
            .iter(world)
            .filter(|(_, r)| r.driver == driver && !r.is_terminal())
            .map(|(e, _)| e)
            .collect()
    };
    let mut clock = world.resource_mut::<DispatchClock>();
    for offer_entity in outstanding {
        clock.schedule_in(
            0,
            EventKind::DriverDeclined,
            Some(EventSubject::Offer(offer_entity)),
        );
    }
    tracing::info!(driver = %driver, "driver offline");
    Ok(())
}

/// Create a booking and enter it into dispatch. Fails fast when the
/// destination lies outside the configured service boundary. A scheduled
/// booking enters dispatch at its scheduled time.
pub fn submit_booking(world: &mut World, new: NewBooking) -> Result<BookingId, DispatchError> {
    for point in [new.pickup, new.destination] {
        if !point.is_valid() {
            return Err(DispatchError::InvalidCoordinates(point.lat, point.lng));
        }
    }
    if let Some(boundary) = world.get_resource::<ServiceBoundary>() {
        if boundary.is_configured() && !boundary.contains(new.destination) {
            return Err(DispatchError::OutsideServiceArea(new.id));
        }
    }

    let now = world.resource::<DispatchClock>().now();
    let id = new.id;
    let dispatch_at = new.scheduled_at.unwrap_or(now).max(now);
    world
        .resource::<BookingLedger>()
        .insert(Booking::create(new, now))
        .map_err(DispatchError::DuplicateBooking)?;
    world.resource_mut::<DispatchClock>().schedule_at(
        dispatch_at,
        EventKind::BookingInbound,
        Some(EventSubject::Booking(id)),
    );
    tracing::info!(booking = %id, dispatch_at, "booking submitted");
    Ok(id)
}

/// Cancel a booking. The transaction commits (or reports the idempotent
/// re-cancel) synchronously; offer teardown follows as an event, on the
/// idempotent path too.
pub fn cancel_booking(
    world: &mut World,
    booking: BookingId,
    initiator: CancelInitiator,
    reason: &str,
) -> Result<CancelCommit, CancelRejection> {
    let now = world.resource::<DispatchClock>().now();
    let commit = world
        .resource::<BookingLedger>()
        .try_cancel(booking, initiator, reason, now)?;

    if !commit.already_cancelled {
        let mut telemetry = world.resource_mut::<DispatchTelemetry>();
        match initiator {
            CancelInitiator::Passenger => {
                DispatchTelemetry::bump(&mut telemetry.bookings_cancelled_by_passenger)
            }
            CancelInitiator::Driver => {
                DispatchTelemetry::bump(&mut telemetry.bookings_cancelled_by_driver)
            }
        }
    }
    world.resource_mut::<DispatchClock>().schedule_in(
        0,
        EventKind::CancellationCommitted,
        Some(EventSubject::Booking(booking)),
    );
    tracing::info!(booking = %booking, ?initiator, "cancellation committed");
    Ok(commit)
}

/// A driver accepts an offer. Runs the atomic assign; a lost race comes back
/// as [`DispatchError::RaceCondition`] and the driver does not get the job.
pub fn driver_accept(
    world: &mut World,
    driver: DriverId,
    booking: BookingId,
) -> Result<Booking, DispatchError> {
    let found = {
        let mut query = world.query::<(Entity, &OfferRecord)>();
        query
            .iter(world)
            .find(|(_, r)| r.booking == booking && r.driver == driver)
            .map(|(entity, r)| (entity, r.status))
    };
    let Some((offer_entity, status)) = found else {
        return Err(DispatchError::OfferNotFound(booking, driver));
    };
    match status {
        // Duplicate accept of an already-won offer.
        OfferStatus::Accepted => {
            return world
                .resource::<BookingLedger>()
                .get(booking)
                .ok_or(DispatchError::BookingNotFound(booking));
        }
        OfferStatus::AcceptedByOther => return Err(DispatchError::RaceCondition(booking)),
        OfferStatus::Declined | OfferStatus::Expired | OfferStatus::Cancelled => {
            return Err(DispatchError::OfferNotFound(booking, driver));
        }
        OfferStatus::Pending | OfferStatus::SecondChance => {}
    }

    // A driver can fill up between offer and accept (second-chance windows
    // overlap other work); the capacity ceiling binds at accept time too.
    if let Some(entity) = find_driver_entity(world, driver) {
        let capacity = world.resource::<DispatchConfig>().driver_capacity;
        let full = world
            .get::<Driver>(entity)
            .is_some_and(|d| d.active_count() >= capacity);
        if full {
            return Err(DispatchError::CapacityExceeded(driver));
        }
    }

    let now = world.resource::<DispatchClock>().now();
    let result = world
        .resource::<BookingLedger>()
        .try_assign(booking, driver, now);

    match result {
        Ok(row) => {
            let timers: Vec<_> = match world.get_mut::<OfferRecord>(offer_entity) {
                Some(mut record) => {
                    record.transition(OfferStatus::Accepted, now);
                    record.take_timers().collect()
                }
                None => Vec::new(),
            };
            {
                let mut clock = world.resource_mut::<DispatchClock>();
                for timer in timers {
                    clock.cancel(timer);
                }
                clock.schedule_in(
                    0,
                    EventKind::AssignmentCommitted,
                    Some(EventSubject::Offer(offer_entity)),
                );
            }
            if let Some(entity) = find_driver_entity(world, driver) {
                if let Some(mut d) = world.get_mut::<Driver>(entity) {
                    d.active_bookings.push(booking);
                }
            }
            DispatchTelemetry::bump(
                &mut world.resource_mut::<DispatchTelemetry>().bookings_assigned,
            );
            tracing::info!(booking = %booking, driver = %driver, "assignment committed");
            Ok(row)
        }
        Err(rejection) => {
            if rejection.is_race() {
                DispatchTelemetry::bump(
                    &mut world
                        .resource_mut::<DispatchTelemetry>()
                        .assign_race_rejections,
                );
            }
            use crate::error::AssignRejection::*;
            let close_as = match rejection {
                AlreadyAssigned(_, winner) if winner == driver => {
                    // Assigned outside this offer's path; nothing to undo.
                    return world
                        .resource::<BookingLedger>()
                        .get(booking)
                        .ok_or(DispatchError::BookingNotFound(booking));
                }
                AlreadyAssigned(..) => Some(OfferStatus::AcceptedByOther),
                AlreadyCancelled(_) | TerminalState(..) => Some(OfferStatus::Cancelled),
                NotFound(_) => None,
            };
            if let Some(close_as) = close_as {
                let timers: Vec<_> = match world.get_mut::<OfferRecord>(offer_entity) {
                    Some(mut record) => {
                        record.transition(close_as, now);
                        record.take_timers().collect()
                    }
                    None => Vec::new(),
                };
                let mut clock = world.resource_mut::<DispatchClock>();
                for timer in timers {
                    clock.cancel(timer);
                }
            }
            tracing::warn!(booking = %booking, driver = %driver, %rejection, "accept rejected");
            match rejection {
                NotFound(id) => Err(DispatchError::BookingNotFound(id)),
                _ => Err(DispatchError::RaceCondition(booking)),
            }
        }
    }
}

/// A driver declines an offer. Duplicate declines of an already-resolved
/// record are accepted as no-ops.
pub fn driver_decline(
    world: &mut World,
    driver: DriverId,
    booking: BookingId,
) -> Result<(), DispatchError> {
    let found = {
        let mut query = world.query::<(Entity, &OfferRecord)>();
        query
            .iter(world)
            .find(|(_, r)| r.booking == booking && r.driver == driver)
            .map(|(entity, r)| (entity, r.status))
    };
    let Some((offer_entity, status)) = found else {
        return Err(DispatchError::OfferNotFound(booking, driver));
    };
    if status.is_terminal() {
        return Ok(());
    }
    world.resource_mut::<DispatchClock>().schedule_in(
        0,
        EventKind::DriverDeclined,
        Some(EventSubject::Offer(offer_entity)),
    );
    Ok(())
}

/// Move an assigned booking along its lifecycle. Completion releases the
/// driver's capacity and counts the trip.
pub fn record_driver_progress(
    world: &mut World,
    booking: BookingId,
    to: BookingStatus,
) -> Result<Booking, ProgressRejection> {
    let now = world.resource::<DispatchClock>().now();
    // Completion clears the row's driver; read it before the transition.
    let assigned = world
        .resource::<BookingLedger>()
        .get(booking)
        .and_then(|b| b.assigned_driver);
    let row = world
        .resource::<BookingLedger>()
        .record_progress(booking, to, now)?;

    if to == BookingStatus::Completed {
        if let Some(driver_id) = assigned {
            if let Some(entity) = find_driver_entity(world, driver_id) {
                if let Some(mut driver) = world.get_mut::<Driver>(entity) {
                    driver.active_bookings.retain(|&b| b != booking);
                    driver.total_trips = driver.total_trips.saturating_add(1);
                }
            }
        }
        DispatchTelemetry::bump(
            &mut world
                .resource_mut::<DispatchTelemetry>()
                .bookings_completed,
        );
    }
    Ok(row)
}

/// The offers a driver's app shows right now.
pub fn driver_feed(world: &mut World, driver: DriverId) -> Vec<OfferView> {
    let now = world.resource::<DispatchClock>().now();
    let max_age_ms = world.resource::<DispatchConfig>().offer_feed_max_age_ms;
    let mut query = world.query::<&OfferRecord>();
    let records: Vec<&OfferRecord> = query.iter(world).collect();
    driver_offer_feed(records, driver, now, max_age_ms)
}

/// Current state of one booking.
pub fn booking_status(world: &World, booking: BookingId) -> Option<BookingView> {
    booking_view(world.resource::<BookingLedger>(), booking)
}
