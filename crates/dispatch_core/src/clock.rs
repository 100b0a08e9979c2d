//! Event clock: a min-heap of timestamped events with cancellable timers.
//!
//! Every wait in the engine is a scheduled event on this clock; there are no
//! ambient background timers. [`DispatchClock::schedule_in`] returns a
//! [`TimerHandle`] the owning attempt keeps; cancelling the handle guarantees
//! the event is skipped on pop, so no orphaned timer ever reaches a system
//! after its booking resolved.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};

use bevy_ecs::prelude::{Entity, Resource};

use crate::ids::{BookingId, DriverId};

pub const ONE_SEC_MS: u64 = 1_000;
pub const ONE_MIN_MS: u64 = 60 * ONE_SEC_MS;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// A freshly created booking enters dispatch.
    BookingInbound,
    /// Run (or resume) candidate selection for a booking.
    TryMatch,
    /// Phase-1 window of an offer elapsed without a response.
    OfferPhase1Elapsed,
    /// Second-chance window of an offer elapsed; the record expires.
    OfferFinalElapsed,
    /// A driver declined an offer (or went offline while holding one).
    DriverDeclined,
    /// An assignment committed in the ledger; clean up the losing offers.
    AssignmentCommitted,
    /// A cancellation committed in the ledger; tear the attempt down.
    CancellationCommitted,
    /// A driver came online; re-sweep queued and idle pending bookings.
    DriverOnline,
    /// A queued booking's wait window ran out.
    QueueExpiry,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventSubject {
    Booking(BookingId),
    Driver(DriverId),
    Offer(Entity),
}

/// Identity of one scheduled event, usable for cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerHandle(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Event {
    pub timestamp: u64,
    pub handle: TimerHandle,
    pub kind: EventKind,
    pub subject: Option<EventSubject>,
}

impl Ord for Event {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse ordering to make BinaryHeap a min-heap by timestamp;
        // handles are allocated monotonically, so ties resolve FIFO.
        other
            .timestamp
            .cmp(&self.timestamp)
            .then_with(|| other.handle.cmp(&self.handle))
    }
}

impl PartialOrd for Event {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// The event being processed by the current schedule run.
#[derive(Debug, Clone, Copy, Resource)]
pub struct CurrentEvent(pub Event);

#[derive(Debug, Default, Resource)]
pub struct DispatchClock {
    now: u64,
    next_handle: u64,
    events: BinaryHeap<Event>,
    cancelled: HashSet<TimerHandle>,
}

impl DispatchClock {
    pub fn now(&self) -> u64 {
        self.now
    }

    pub fn schedule_at(
        &mut self,
        timestamp: u64,
        kind: EventKind,
        subject: Option<EventSubject>,
    ) -> TimerHandle {
        debug_assert!(
            timestamp >= self.now,
            "event timestamp must be >= current time"
        );
        let handle = TimerHandle(self.next_handle);
        self.next_handle += 1;
        self.events.push(Event {
            timestamp,
            handle,
            kind,
            subject,
        });
        handle
    }

    pub fn schedule_in(
        &mut self,
        delay_ms: u64,
        kind: EventKind,
        subject: Option<EventSubject>,
    ) -> TimerHandle {
        self.schedule_at(self.now + delay_ms, kind, subject)
    }

    pub fn schedule_in_secs(
        &mut self,
        delay_secs: u64,
        kind: EventKind,
        subject: Option<EventSubject>,
    ) -> TimerHandle {
        self.schedule_in(delay_secs * ONE_SEC_MS, kind, subject)
    }

    /// Cancel a scheduled event. Cancelling an already-fired or unknown
    /// handle is a no-op.
    pub fn cancel(&mut self, handle: TimerHandle) {
        self.cancelled.insert(handle);
    }

    /// Pop the next live event, advancing `now` to its timestamp. Cancelled
    /// events are discarded on the way.
    pub fn pop_next(&mut self) -> Option<Event> {
        loop {
            let event = self.events.pop()?;
            if self.cancelled.remove(&event.handle) {
                continue;
            }
            self.now = event.timestamp;
            return Some(event);
        }
    }

    /// Timestamp of the next live event without popping it.
    pub fn next_event_time(&mut self) -> Option<u64> {
        while let Some(event) = self.events.peek() {
            if self.cancelled.contains(&event.handle) {
                let handle = event.handle;
                self.events.pop();
                self.cancelled.remove(&handle);
                continue;
            }
            return Some(event.timestamp);
        }
        None
    }

    /// Move `now` forward to `timestamp` without processing anything.
    /// Callers must have drained events up to that point first.
    pub fn advance_to(&mut self, timestamp: u64) {
        debug_assert!(
            self.next_event_time().map_or(true, |t| t >= timestamp),
            "cannot advance past pending events"
        );
        self.now = self.now.max(timestamp);
    }

    pub fn pending_event_count(&self) -> usize {
        self.events.len() - self
            .events
            .iter()
            .filter(|e| self.cancelled.contains(&e.handle))
            .count()
    }

    pub fn is_empty(&mut self) -> bool {
        self.next_event_time().is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pops_events_in_time_order() {
        let mut clock = DispatchClock::default();
        clock.schedule_at(10, EventKind::TryMatch, None);
        clock.schedule_at(5, EventKind::TryMatch, None);
        clock.schedule_at(20, EventKind::TryMatch, None);

        assert_eq!(clock.pop_next().map(|e| e.timestamp), Some(5));
        assert_eq!(clock.now(), 5);
        assert_eq!(clock.pop_next().map(|e| e.timestamp), Some(10));
        assert_eq!(clock.pop_next().map(|e| e.timestamp), Some(20));
        assert!(clock.pop_next().is_none());
    }

    #[test]
    fn ties_resolve_in_scheduling_order() {
        let mut clock = DispatchClock::default();
        clock.schedule_at(7, EventKind::BookingInbound, Some(EventSubject::Booking(BookingId(1))));
        clock.schedule_at(7, EventKind::TryMatch, Some(EventSubject::Booking(BookingId(1))));

        assert_eq!(clock.pop_next().map(|e| e.kind), Some(EventKind::BookingInbound));
        assert_eq!(clock.pop_next().map(|e| e.kind), Some(EventKind::TryMatch));
    }

    #[test]
    fn cancelled_events_never_fire() {
        let mut clock = DispatchClock::default();
        let keep = clock.schedule_at(5, EventKind::TryMatch, None);
        let drop = clock.schedule_at(10, EventKind::OfferPhase1Elapsed, None);
        clock.cancel(drop);

        assert_eq!(clock.pop_next().map(|e| e.handle), Some(keep));
        assert!(clock.pop_next().is_none());
        assert_eq!(clock.now(), 5, "cancelled event must not advance the clock");
    }

    #[test]
    fn next_event_time_skips_cancelled() {
        let mut clock = DispatchClock::default();
        let first = clock.schedule_at(5, EventKind::TryMatch, None);
        clock.schedule_at(12, EventKind::TryMatch, None);
        clock.cancel(first);

        assert_eq!(clock.next_event_time(), Some(12));
        assert_eq!(clock.pending_event_count(), 1);
    }

    #[test]
    fn advance_to_moves_now_forward_only() {
        let mut clock = DispatchClock::default();
        clock.advance_to(50);
        assert_eq!(clock.now(), 50);
        clock.advance_to(10);
        assert_eq!(clock.now(), 50);
    }
}
