//! Event loop: advances the clock and routes events into the ECS.
//!
//! Clock progression and event routing happen here, outside systems. Each
//! step pops the next live event from [`DispatchClock`], inserts it as
//! [`CurrentEvent`], then runs the schedule. Systems are gated on their
//! event kind so only the relevant one does work per step.

use bevy_ecs::prelude::{Res, Schedule, World};
use bevy_ecs::schedule::{apply_deferred, IntoSystemConfigs};

use crate::clock::{CurrentEvent, DispatchClock, EventKind};
use crate::config::DispatchConfig;
use crate::eta::{EtaProviderResource, StaticEtaProvider};
use crate::ledger::BookingLedger;
use crate::notify::{NotificationSinkResource, NullSink};
use crate::queue::MatchingQueue;
use crate::spatial::SpatialIndex;
use crate::systems::{
    booking_cancel::cancellation_committed_system,
    booking_inbound::{booking_inbound_system, InboundRetries},
    driver_presence::driver_online_sweep_system,
    driver_response::{assignment_committed_system, driver_declined_system},
    offer_timeout::offer_timeout_system,
    queue_expiry::queue_expiry_system,
    try_match::try_match_system,
};
use crate::telemetry::DispatchTelemetry;

fn is_booking_inbound(event: Option<Res<CurrentEvent>>) -> bool {
    event
        .map(|e| e.0.kind == EventKind::BookingInbound)
        .unwrap_or(false)
}

fn is_try_match(event: Option<Res<CurrentEvent>>) -> bool {
    event
        .map(|e| e.0.kind == EventKind::TryMatch)
        .unwrap_or(false)
}

fn is_offer_timeout(event: Option<Res<CurrentEvent>>) -> bool {
    event
        .map(|e| {
            matches!(
                e.0.kind,
                EventKind::OfferPhase1Elapsed | EventKind::OfferFinalElapsed
            )
        })
        .unwrap_or(false)
}

fn is_driver_declined(event: Option<Res<CurrentEvent>>) -> bool {
    event
        .map(|e| e.0.kind == EventKind::DriverDeclined)
        .unwrap_or(false)
}

fn is_assignment_committed(event: Option<Res<CurrentEvent>>) -> bool {
    event
        .map(|e| e.0.kind == EventKind::AssignmentCommitted)
        .unwrap_or(false)
}

fn is_cancellation_committed(event: Option<Res<CurrentEvent>>) -> bool {
    event
        .map(|e| e.0.kind == EventKind::CancellationCommitted)
        .unwrap_or(false)
}

fn is_driver_online(event: Option<Res<CurrentEvent>>) -> bool {
    event
        .map(|e| e.0.kind == EventKind::DriverOnline)
        .unwrap_or(false)
}

fn is_queue_expiry(event: Option<Res<CurrentEvent>>) -> bool {
    event
        .map(|e| e.0.kind == EventKind::QueueExpiry)
        .unwrap_or(false)
}

/// Builds the dispatch schedule: one event-gated system per event kind, plus
/// [`apply_deferred`] so entities spawned by a step exist before the next.
pub fn dispatch_schedule() -> Schedule {
    let mut schedule = Schedule::default();
    schedule.add_systems((
        booking_inbound_system.run_if(is_booking_inbound),
        try_match_system.run_if(is_try_match),
        offer_timeout_system.run_if(is_offer_timeout),
        driver_declined_system.run_if(is_driver_declined),
        assignment_committed_system.run_if(is_assignment_committed),
        cancellation_committed_system.run_if(is_cancellation_committed),
        driver_online_sweep_system.run_if(is_driver_online),
        queue_expiry_system.run_if(is_queue_expiry),
        apply_deferred,
    ));
    schedule
}

/// A world with every engine resource in place, ready for
/// [`crate::api`] calls and the runner.
pub fn build_dispatch_world(config: DispatchConfig) -> World {
    let mut world = World::new();
    world.insert_resource(DispatchClock::default());
    world.insert_resource(config);
    world.insert_resource(BookingLedger::new());
    world.insert_resource(SpatialIndex::new());
    world.insert_resource(MatchingQueue::default());
    world.insert_resource(DispatchTelemetry::default());
    world.insert_resource(InboundRetries::default());
    world.insert_resource(NotificationSinkResource::new(Box::new(NullSink)));
    world.insert_resource(EtaProviderResource::new(Box::<StaticEtaProvider>::default()));
    world
}

/// Runs one step: pops the next event, inserts it as [`CurrentEvent`], runs
/// the schedule. Returns false when the clock is drained.
pub fn run_next_event(world: &mut World, schedule: &mut Schedule) -> bool {
    let event = match world.resource_mut::<DispatchClock>().pop_next() {
        Some(event) => event,
        None => return false,
    };
    world.insert_resource(CurrentEvent(event));
    schedule.run(world);
    true
}

/// Runs steps until the event queue is empty or `max_steps` is reached.
/// Returns the number of steps executed.
pub fn run_until_empty(world: &mut World, schedule: &mut Schedule, max_steps: usize) -> usize {
    let mut steps = 0;
    while steps < max_steps && run_next_event(world, schedule) {
        steps += 1;
    }
    steps
}

/// Processes every event up to and including `timestamp`, then moves the
/// clock there. Later events stay queued.
pub fn advance_until(world: &mut World, schedule: &mut Schedule, timestamp: u64) -> usize {
    let mut steps = 0;
    loop {
        let next = world.resource_mut::<DispatchClock>().next_event_time();
        match next {
            Some(t) if t <= timestamp => {
                if !run_next_event(world, schedule) {
                    break;
                }
                steps += 1;
            }
            _ => break,
        }
    }
    world.resource_mut::<DispatchClock>().advance_to(timestamp);
    steps
}
