mod support;

use std::sync::{Arc, Barrier};
use std::thread;

use dispatch_core::booking::{
    Booking, BookingStatus, CancelInitiator, FareEstimate, NewBooking, VehicleClass,
};
use dispatch_core::error::{AssignRejection, DispatchError};
use dispatch_core::geo::GeoPoint;
use dispatch_core::ids::{BookingId, DriverId, PassengerId};
use dispatch_core::ledger::BookingLedger;
use dispatch_core::offer::OfferStatus;

use support::world::{destination_north, near_base, TestWorld, BASE};

fn seed_booking(ledger: &BookingLedger, id: u64) {
    ledger
        .insert(Booking::create(
            NewBooking {
                id: BookingId(id),
                passenger: PassengerId(1),
                pickup: GeoPoint::new(37.7749, -122.4194),
                destination: GeoPoint::new(37.7849, -122.4194),
                vehicle_class: VehicleClass::Standard,
                fare: FareEstimate(15.0),
                scheduled_at: None,
            },
            0,
        ))
        .expect("insert booking");
}

#[test]
fn concurrent_assigns_commit_exactly_once() {
    const DRIVERS: u64 = 8;

    let ledger = Arc::new(BookingLedger::new());
    seed_booking(&ledger, 1);
    let barrier = Arc::new(Barrier::new(DRIVERS as usize));

    let handles: Vec<_> = (0..DRIVERS)
        .map(|driver| {
            let ledger = Arc::clone(&ledger);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                ledger.try_assign(BookingId(1), DriverId(driver), 1_000)
            })
        })
        .collect();

    let results: Vec<_> = handles
        .into_iter()
        .map(|h| h.join().expect("thread"))
        .collect();

    let committed: Vec<_> = results.iter().filter(|r| r.is_ok()).collect();
    assert_eq!(committed.len(), 1, "exactly one commit");
    let winner = committed[0].as_ref().expect("winner").assigned_driver;

    for result in &results {
        if let Err(rejection) = result {
            assert!(rejection.is_race(), "losers see a race rejection");
            assert!(matches!(
                rejection,
                AssignRejection::AlreadyAssigned(_, d) if Some(*d) == winner
            ));
        }
    }

    let row = ledger.get(BookingId(1)).expect("row");
    assert_eq!(row.status, BookingStatus::Accepted);
    assert_eq!(row.assigned_driver, winner);
}

#[test]
fn cancel_twice_reports_committed_then_already_cancelled() {
    let ledger = BookingLedger::new();
    seed_booking(&ledger, 1);

    let first = ledger
        .try_cancel(BookingId(1), CancelInitiator::Passenger, "changed plans", 500)
        .expect("first cancel");
    assert!(!first.already_cancelled);
    assert_eq!(first.booking.status, BookingStatus::Cancelled);

    let second = ledger
        .try_cancel(BookingId(1), CancelInitiator::Passenger, "retry", 600)
        .expect("second cancel");
    assert!(second.already_cancelled);
    assert_eq!(second.booking.status, BookingStatus::Cancelled);
}

#[test]
fn concurrent_cancel_and_assign_agree_on_one_outcome() {
    for round in 0..16 {
        let ledger = Arc::new(BookingLedger::new());
        seed_booking(&ledger, round);
        let barrier = Arc::new(Barrier::new(2));

        let assign = {
            let ledger = Arc::clone(&ledger);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                ledger.try_assign(BookingId(round), DriverId(1), 1_000)
            })
        };
        let cancel = {
            let ledger = Arc::clone(&ledger);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                ledger.try_cancel(BookingId(round), CancelInitiator::Passenger, "race", 1_000)
            })
        };

        let assign = assign.join().expect("assign thread");
        let cancel = cancel.join().expect("cancel thread");
        let row = ledger.get(BookingId(round)).expect("row");

        match (&assign, &cancel) {
            // Assign linearized first; the passenger cancel then landed on
            // the Accepted row, which is still passenger-cancellable.
            (Ok(_), Ok(commit)) => {
                assert!(!commit.already_cancelled);
                assert_eq!(row.status, BookingStatus::Cancelled);
            }
            (Ok(_), Err(_)) => {
                assert_eq!(row.status, BookingStatus::Accepted);
            }
            (Err(rejection), Ok(_)) => {
                assert_eq!(*rejection, AssignRejection::AlreadyCancelled(BookingId(round)));
                assert_eq!(row.status, BookingStatus::Cancelled);
            }
            (Err(_), Err(_)) => panic!("one of the two must commit"),
        }
    }
}

#[test]
fn accept_after_cancel_is_rejected_and_booking_stays_cancelled() {
    let mut tw = TestWorld::new();
    tw.add_driver(1, near_base(0.0, 50.0), 4.8, 100);
    tw.submit(1, BASE, destination_north());
    let now = tw.now();
    tw.advance_to(now);
    assert_eq!(tw.offer_status(1, 1), Some(OfferStatus::Pending));

    // Passenger cancels; the driver's accept lands just after the commit.
    let commit = tw.cancel(1, CancelInitiator::Passenger);
    assert!(!commit.already_cancelled);
    let result = tw.accept(1, 1);
    assert_eq!(
        result,
        Err(DispatchError::RaceCondition(BookingId(1))),
        "the acceptance must lose the race"
    );

    tw.run_all();
    assert_eq!(tw.booking_status(1), Some(BookingStatus::Cancelled));
    assert_eq!(tw.offer_status(1, 1), Some(OfferStatus::Cancelled));
    assert_eq!(tw.telemetry().assign_race_rejections, 1);
}
