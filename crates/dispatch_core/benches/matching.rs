use bevy_ecs::prelude::Entity;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use dispatch_core::booking::VehicleClass;
use dispatch_core::compat::CompatibilityEvaluator;
use dispatch_core::config::DispatchConfig;
use dispatch_core::directory::{find_candidates, CandidateQuery, Driver, Position};
use dispatch_core::geo::GeoPoint;
use dispatch_core::ids::DriverId;
use dispatch_core::ledger::BookingLedger;
use dispatch_core::ranking::filter_and_rank;
use dispatch_core::spatial::GeoIndex;

const PICKUP: GeoPoint = GeoPoint {
    lat: 37.7749,
    lng: -122.4194,
};

fn build_drivers(count: usize, seed: u64) -> Vec<(Entity, Driver, Position)> {
    let mut rng = StdRng::seed_from_u64(seed);
    let geo = GeoIndex::default();
    (0..count)
        .map(|i| {
            let point = GeoPoint::new(
                PICKUP.lat + rng.gen_range(-0.01..0.01),
                PICKUP.lng + rng.gen_range(-0.01..0.01),
            );
            let driver = Driver {
                id: DriverId(i as u64),
                online: true,
                online_updated_at: 0,
                position_updated_at: 0,
                vehicle_class: VehicleClass::Standard,
                rating: rng.gen_range(3.5..5.0),
                total_trips: rng.gen_range(0..2_000),
                heading_deg: None,
                speed_kmh: None,
                active_bookings: Vec::new(),
            };
            let position = Position {
                point,
                cell: geo.cell_for(point).expect("valid point"),
            };
            (Entity::from_raw(i as u32), driver, position)
        })
        .collect()
}

fn bench_candidate_selection(c: &mut Criterion) {
    let config = DispatchConfig::default();
    let ledger = BookingLedger::new();
    let destination = GeoPoint::new(PICKUP.lat + 0.01, PICKUP.lng);
    let evaluator = CompatibilityEvaluator::new(config.bearing_compat_threshold_deg, None);

    let mut group = c.benchmark_group("candidate_selection");
    for count in [100usize, 1_000, 5_000] {
        let drivers = build_drivers(count, 42);
        group.bench_with_input(BenchmarkId::from_parameter(count), &drivers, |b, drivers| {
            b.iter(|| {
                let query = CandidateQuery {
                    pickup: PICKUP,
                    vehicle_class: VehicleClass::Standard,
                    radius_m: 500.0,
                    now: 0,
                };
                let set = find_candidates(
                    drivers.iter().map(|(e, d, p)| (*e, d, p)),
                    &query,
                    &ledger,
                    None,
                    &config,
                );
                let ranked = filter_and_rank(set.snapshots, &evaluator, PICKUP, destination);
                black_box(ranked.len())
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_candidate_selection);
criterion_main!(benches);
