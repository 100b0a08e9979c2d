mod support;

use dispatch_core::booking::BookingStatus;
use dispatch_core::clock::ONE_SEC_MS;
use dispatch_core::ids::DriverId;
use dispatch_core::offer::OfferStatus;

use support::world::{destination_north, near_base, TestWorld, BASE};

#[test]
fn phase_progression_hits_exact_deadlines() {
    let mut tw = TestWorld::new();
    tw.add_driver(1, near_base(0.0, 50.0), 4.8, 100);
    tw.submit(1, BASE, destination_north());
    let now = tw.now();
    tw.advance_to(now);
    assert_eq!(tw.offer_status(1, 1), Some(OfferStatus::Pending));

    // One tick before phase 1 elapses: still pending.
    tw.advance_to(30 * ONE_SEC_MS - 1);
    assert_eq!(tw.offer_status(1, 1), Some(OfferStatus::Pending));

    tw.advance_to(30 * ONE_SEC_MS);
    assert_eq!(tw.offer_status(1, 1), Some(OfferStatus::SecondChance));

    // One tick before the final deadline: the grace window is still open.
    tw.advance_to(210 * ONE_SEC_MS - 1);
    assert_eq!(tw.offer_status(1, 1), Some(OfferStatus::SecondChance));
    assert_eq!(tw.booking_status(1), Some(BookingStatus::Pending));

    tw.advance_to(210 * ONE_SEC_MS);
    assert_eq!(tw.offer_status(1, 1), Some(OfferStatus::Expired));
    assert_eq!(tw.booking_status(1), Some(BookingStatus::Expired));
}

#[test]
fn second_chance_accept_still_commits() {
    let mut tw = TestWorld::new();
    tw.add_driver(1, near_base(0.0, 50.0), 5.0, 100);
    tw.add_driver(2, near_base(0.0, 100.0), 4.0, 100);

    tw.submit(1, BASE, destination_north());
    let now = tw.now();
    tw.advance_to(now);
    assert_eq!(tw.notified_for(1), vec![DriverId(1)]);

    // Phase 1 elapses: driver 1 keeps a grace window while escalation moves
    // to driver 2 in parallel.
    tw.advance_to(30 * ONE_SEC_MS);
    assert_eq!(tw.offer_status(1, 1), Some(OfferStatus::SecondChance));
    assert_eq!(tw.offer_status(1, 2), Some(OfferStatus::Pending));

    // The first driver accepts during the grace window and wins.
    tw.accept(1, 1).expect("second-chance accept");
    let now = tw.now();
    tw.advance_to(now);

    assert_eq!(tw.booking_status(1), Some(BookingStatus::Accepted));
    assert_eq!(tw.offer_status(1, 1), Some(OfferStatus::Accepted));
    assert_eq!(
        tw.offer_status(1, 2),
        Some(OfferStatus::AcceptedByOther),
        "the losing driver's record closes for their visibility"
    );

    // All timers died with the resolution: nothing later expires anything.
    tw.run_all();
    assert_eq!(tw.telemetry().offers_expired, 0);
    assert_eq!(tw.booking_status(1), Some(BookingStatus::Accepted));
}

#[test]
fn losing_second_chance_driver_is_rejected_after_the_other_commits() {
    let mut tw = TestWorld::new();
    tw.add_driver(1, near_base(0.0, 50.0), 5.0, 100);
    tw.add_driver(2, near_base(0.0, 100.0), 4.0, 100);

    tw.submit(1, BASE, destination_north());
    let now = tw.now();
    tw.advance_to(now);
    tw.advance_to(30 * ONE_SEC_MS);
    assert_eq!(tw.offer_status(1, 2), Some(OfferStatus::Pending));

    // Driver 2 accepts first; driver 1's grace-window accept loses the race.
    tw.accept(2, 1).expect("accept");
    let now = tw.now();
    tw.advance_to(now);
    let lost = tw.accept(1, 1);
    assert!(lost.is_err(), "stale accept must not commit");
    assert_eq!(tw.booking_status(1), Some(BookingStatus::Accepted));

    let view = dispatch_core::api::booking_status(&tw.world, dispatch_core::ids::BookingId(1))
        .expect("view");
    assert_eq!(view.assigned_driver, Some(DriverId(2)));
}

#[test]
fn decline_escalates_without_waiting_for_the_timeout() {
    let mut tw = TestWorld::new();
    tw.add_driver(1, near_base(0.0, 50.0), 5.0, 100);
    tw.add_driver(2, near_base(0.0, 100.0), 4.0, 100);

    tw.submit(1, BASE, destination_north());
    let now = tw.now();
    tw.advance_to(now);
    tw.decline(1, 1);
    let now = tw.now();
    tw.advance_to(now);

    assert_eq!(tw.now(), 0, "no timeout window was waited out");
    assert_eq!(tw.notified(), vec![DriverId(1), DriverId(2)]);
    assert_eq!(tw.offer_status(1, 1), Some(OfferStatus::Declined));
    assert_eq!(tw.offer_status(1, 2), Some(OfferStatus::Pending));
    assert_eq!(tw.telemetry().offers_declined, 1);

    // A duplicate decline of the closed record is a no-op.
    tw.decline(1, 1);
    let now = tw.now();
    tw.advance_to(now);
    assert_eq!(tw.telemetry().offers_declined, 1);
}
