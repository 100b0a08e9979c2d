//! The booking ledger: the single point of mutual exclusion.
//!
//! Every mutation that affects matching eligibility goes through one of the
//! transactions here. Each transaction takes the row lock, re-reads the
//! current status and assignment inside the critical section, and either
//! commits or returns a typed rejection. The ledger is `Send + Sync`; two
//! `try_assign` calls for the same booking are linearized by the lock and at
//! most one ever commits.

use std::collections::HashMap;
use std::sync::Mutex;

use bevy_ecs::prelude::Resource;

use crate::booking::{Booking, BookingStatus, CancelInitiator};
use crate::error::{AssignRejection, CancelRejection, ProgressRejection};
use crate::ids::{BookingId, DriverId};

/// Result of a committed (or idempotently re-committed) cancellation.
#[derive(Debug, Clone, PartialEq)]
pub struct CancelCommit {
    pub booking: Booking,
    /// True when the booking was already cancelled and this call changed
    /// nothing; callers still run their offer cleanup on this path.
    pub already_cancelled: bool,
}

#[derive(Debug, Default, Resource)]
pub struct BookingLedger {
    rows: Mutex<HashMap<BookingId, Booking>>,
}

impl BookingLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a freshly created booking. Fails when the id already exists.
    pub fn insert(&self, booking: Booking) -> Result<(), BookingId> {
        let mut rows = self.lock();
        if rows.contains_key(&booking.id) {
            return Err(booking.id);
        }
        rows.insert(booking.id, booking);
        Ok(())
    }

    /// Point-in-time copy of a row.
    pub fn get(&self, id: BookingId) -> Option<Booking> {
        self.lock().get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Atomically assign `driver` if the booking is still assignable.
    ///
    /// Status and current assignment are re-read under the lock, never from a
    /// caller-held snapshot. Exactly one of N concurrent calls commits.
    pub fn try_assign(
        &self,
        id: BookingId,
        driver: DriverId,
        now: u64,
    ) -> Result<Booking, AssignRejection> {
        let mut rows = self.lock();
        let row = rows.get_mut(&id).ok_or(AssignRejection::NotFound(id))?;

        if row.status == BookingStatus::Cancelled {
            return Err(AssignRejection::AlreadyCancelled(id));
        }
        if let Some(current) = row.assigned_driver {
            return Err(AssignRejection::AlreadyAssigned(id, current));
        }
        if row.status.is_terminal() {
            return Err(AssignRejection::TerminalState(id, row.status));
        }
        debug_assert_eq!(row.status, BookingStatus::Pending);

        row.status = BookingStatus::Accepted;
        row.assigned_driver = Some(driver);
        row.accepted_at = Some(now);
        row.updated_at = now;
        Ok(row.clone())
    }

    /// Atomically cancel if still cancellable. Idempotent: cancelling an
    /// already-cancelled booking reports success with `already_cancelled`.
    ///
    /// After acceptance only the passenger may cancel on this path; a
    /// driver-initiated request is rejected with a reason the engine can
    /// surface.
    pub fn try_cancel(
        &self,
        id: BookingId,
        initiator: CancelInitiator,
        reason: &str,
        now: u64,
    ) -> Result<CancelCommit, CancelRejection> {
        let mut rows = self.lock();
        let row = rows.get_mut(&id).ok_or(CancelRejection::NotFound(id))?;

        if row.status == BookingStatus::Cancelled {
            return Ok(CancelCommit {
                booking: row.clone(),
                already_cancelled: true,
            });
        }
        if !row.status.can_transition(BookingStatus::Cancelled) {
            return Err(CancelRejection::NotCancellable(id, row.status));
        }
        if row.status.holds_driver() && initiator == CancelInitiator::Driver {
            return Err(CancelRejection::DriverCancelRestricted(id));
        }

        row.status = BookingStatus::Cancelled;
        // Terminal rows hold no driver.
        row.assigned_driver = None;
        row.cancelled_by = Some(initiator);
        row.cancel_reason = Some(reason.to_string());
        row.updated_at = now;
        Ok(CancelCommit {
            booking: row.clone(),
            already_cancelled: false,
        })
    }

    /// Move an assigned booking along its lifecycle (arriving, arrived,
    /// in-progress, completed), validated by the transition table.
    pub fn record_progress(
        &self,
        id: BookingId,
        to: BookingStatus,
        now: u64,
    ) -> Result<Booking, ProgressRejection> {
        let mut rows = self.lock();
        let row = rows.get_mut(&id).ok_or(ProgressRejection::NotFound(id))?;

        if !row.status.can_transition(to) {
            return Err(ProgressRejection::IllegalTransition(id, row.status, to));
        }
        row.status = to;
        if to == BookingStatus::Completed {
            row.assigned_driver = None;
        }
        row.updated_at = now;
        Ok(row.clone())
    }

    /// Expire a still-pending booking. Returns false when the row has moved
    /// on (assigned, cancelled, or already expired).
    pub fn mark_expired(&self, id: BookingId, now: u64) -> bool {
        let mut rows = self.lock();
        let Some(row) = rows.get_mut(&id) else {
            return false;
        };
        if row.status != BookingStatus::Pending {
            return false;
        }
        row.status = BookingStatus::Expired;
        row.updated_at = now;
        true
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<BookingId, Booking>> {
        match self.rows.lock() {
            Ok(guard) => guard,
            // A poisoned lock still holds consistent data: every transaction
            // upholds its invariants before releasing.
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
