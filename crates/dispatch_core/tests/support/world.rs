#![allow(dead_code)]

use bevy_ecs::prelude::{Schedule, World};

use dispatch_core::api::{self, DriverProfile};
use dispatch_core::booking::{
    BookingStatus, CancelInitiator, FareEstimate, NewBooking, VehicleClass,
};
use dispatch_core::clock::DispatchClock;
use dispatch_core::config::{DispatchConfig, ServiceBoundary, ZoneCompatibility};
use dispatch_core::error::DispatchError;
use dispatch_core::geo::GeoPoint;
use dispatch_core::ids::{BookingId, DriverId, PassengerId};
use dispatch_core::ledger::CancelCommit;
use dispatch_core::notify::{NotificationSink, NotificationSinkResource, RecordingSink};
use dispatch_core::offer::{OfferRecord, OfferStatus};
use dispatch_core::queue::MatchingQueue;
use dispatch_core::runner::{advance_until, build_dispatch_world, dispatch_schedule, run_until_empty};
use dispatch_core::telemetry::DispatchTelemetry;

/// Downtown San Francisco; everything in these tests happens nearby.
pub const BASE: GeoPoint = GeoPoint {
    lat: 37.7749,
    lng: -122.4194,
};

/// A point offset from [`BASE`] by meters, using the small-area approximation
/// (1° latitude ~ 111.1 km).
pub fn near_base(north_m: f64, east_m: f64) -> GeoPoint {
    let lat = BASE.lat + north_m / 111_100.0;
    let lng = BASE.lng + east_m / (111_100.0 * BASE.lat.to_radians().cos());
    GeoPoint::new(lat, lng)
}

/// Destination ~1.1 km due north of the base; well inside any test boundary.
pub fn destination_north() -> GeoPoint {
    near_base(1_100.0, 0.0)
}

/// Destination ~1.1 km due east of the base; >45° off the northbound one.
pub fn destination_east() -> GeoPoint {
    near_base(0.0, 1_100.0)
}

fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A dispatch world wired with a recording sink and its schedule, plus the
/// helpers the integration suites lean on.
pub struct TestWorld {
    pub world: World,
    pub schedule: Schedule,
    pub sink: RecordingSink,
}

impl TestWorld {
    pub fn new() -> Self {
        Self::with_config(DispatchConfig::default())
    }

    pub fn with_config(config: DispatchConfig) -> Self {
        init_tracing();
        let mut world = build_dispatch_world(config);
        let sink = RecordingSink::new();
        world.insert_resource(NotificationSinkResource::new(Box::new(sink.clone())));
        Self {
            world,
            schedule: dispatch_schedule(),
            sink,
        }
    }

    pub fn with_boundary(mut self, boundary: ServiceBoundary) -> Self {
        self.world.insert_resource(boundary);
        self
    }

    pub fn with_zones(mut self, zones: ZoneCompatibility) -> Self {
        self.world.insert_resource(zones);
        self
    }

    pub fn with_sink<S: NotificationSink + 'static>(mut self, sink: S) -> Self {
        self.world
            .insert_resource(NotificationSinkResource::new(Box::new(sink)));
        self
    }

    pub fn add_driver(&mut self, id: u64, position: GeoPoint, rating: f64, total_trips: u32) {
        api::register_driver(
            &mut self.world,
            DriverProfile {
                id: DriverId(id),
                position,
                vehicle_class: VehicleClass::Standard,
                rating,
                total_trips,
                online: true,
                heading_deg: None,
                speed_kmh: None,
            },
        )
        .expect("register driver");
    }

    pub fn add_driver_with_class(
        &mut self,
        id: u64,
        position: GeoPoint,
        vehicle_class: VehicleClass,
    ) {
        api::register_driver(
            &mut self.world,
            DriverProfile {
                id: DriverId(id),
                position,
                vehicle_class,
                rating: 4.5,
                total_trips: 50,
                online: true,
                heading_deg: None,
                speed_kmh: None,
            },
        )
        .expect("register driver");
    }

    pub fn submit(&mut self, id: u64, pickup: GeoPoint, destination: GeoPoint) {
        self.try_submit(id, pickup, destination).expect("submit booking");
    }

    pub fn try_submit(
        &mut self,
        id: u64,
        pickup: GeoPoint,
        destination: GeoPoint,
    ) -> Result<BookingId, DispatchError> {
        api::submit_booking(
            &mut self.world,
            NewBooking {
                id: BookingId(id),
                passenger: PassengerId(100 + id),
                pickup,
                destination,
                vehicle_class: VehicleClass::Standard,
                fare: FareEstimate(12.0),
                scheduled_at: None,
            },
        )
    }

    pub fn run_all(&mut self) -> usize {
        let steps = run_until_empty(&mut self.world, &mut self.schedule, 10_000);
        assert!(steps < 10_000, "runner did not converge");
        steps
    }

    /// Process events up to `timestamp` (ms) and park the clock there.
    pub fn advance_to(&mut self, timestamp: u64) -> usize {
        advance_until(&mut self.world, &mut self.schedule, timestamp)
    }

    pub fn now(&self) -> u64 {
        self.world.resource::<DispatchClock>().now()
    }

    pub fn accept(&mut self, driver: u64, booking: u64) -> Result<(), DispatchError> {
        api::driver_accept(&mut self.world, DriverId(driver), BookingId(booking)).map(|_| ())
    }

    pub fn decline(&mut self, driver: u64, booking: u64) {
        api::driver_decline(&mut self.world, DriverId(driver), BookingId(booking))
            .expect("decline");
    }

    pub fn cancel(&mut self, booking: u64, initiator: CancelInitiator) -> CancelCommit {
        api::cancel_booking(&mut self.world, BookingId(booking), initiator, "test cancel")
            .expect("cancel")
    }

    pub fn booking_status(&self, booking: u64) -> Option<BookingStatus> {
        api::booking_status(&self.world, BookingId(booking)).map(|v| v.status)
    }

    pub fn offer_status(&mut self, booking: u64, driver: u64) -> Option<OfferStatus> {
        let mut query = self.world.query::<&OfferRecord>();
        query
            .iter(&self.world)
            .find(|r| r.booking == BookingId(booking) && r.driver == DriverId(driver))
            .map(|r| r.status)
    }

    /// Drivers notified so far, in offer order.
    pub fn notified(&self) -> Vec<DriverId> {
        self.sink.delivered_to()
    }

    /// Drivers notified about one booking, in offer order.
    pub fn notified_for(&self, booking: u64) -> Vec<DriverId> {
        self.sink
            .deliveries()
            .into_iter()
            .filter(|(_, summary)| summary.booking == BookingId(booking))
            .map(|(driver, _)| driver)
            .collect()
    }

    pub fn telemetry(&self) -> &DispatchTelemetry {
        self.world.resource::<DispatchTelemetry>()
    }

    pub fn queue_len(&self) -> usize {
        self.world.resource::<MatchingQueue>().len()
    }
}
