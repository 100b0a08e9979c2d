//! Driver directory: live driver state and the candidate query.
//!
//! Drivers are entities carrying [`Driver`] + [`Position`]. The candidate
//! query applies, independently: online flag freshness, position freshness,
//! operational-boundary containment, vehicle class, capacity, and the radius
//! filter with its hard outer cutoff. The same pass counts what it dropped so
//! an empty result can be diagnosed for the passenger.

use bevy_ecs::prelude::{Component, Entity};
use h3o::CellIndex;

use crate::booking::VehicleClass;
use crate::config::{DispatchConfig, ServiceBoundary};
use crate::error::NoDriversDiagnosis;
use crate::geo::{haversine_distance_m, GeoPoint};
use crate::ids::{BookingId, DriverId};
use crate::ledger::BookingLedger;

#[derive(Debug, Clone, Component)]
pub struct Driver {
    pub id: DriverId,
    pub online: bool,
    /// When the online flag was last written. Checked independently of the
    /// position timestamp; the two are updated by different paths.
    pub online_updated_at: u64,
    pub position_updated_at: u64,
    pub vehicle_class: VehicleClass,
    pub rating: f64,
    pub total_trips: u32,
    pub heading_deg: Option<f64>,
    pub speed_kmh: Option<f64>,
    /// Accepted-but-not-completed bookings; capacity derives from its length.
    pub active_bookings: Vec<BookingId>,
}

impl Driver {
    pub fn active_count(&self) -> usize {
        self.active_bookings.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Component)]
pub struct Position {
    pub point: GeoPoint,
    pub cell: CellIndex,
}

/// Point-in-time view of one eligible driver, assembled per query.
#[derive(Debug, Clone)]
pub struct DriverSnapshot {
    pub entity: Entity,
    pub id: DriverId,
    pub point: GeoPoint,
    pub distance_to_pickup_m: f64,
    pub vehicle_class: VehicleClass,
    pub rating: f64,
    pub total_trips: u32,
    pub heading_deg: Option<f64>,
    pub speed_kmh: Option<f64>,
    pub updated_at: u64,
    pub active_count: usize,
    /// Destinations of the driver's active bookings, for the compatibility
    /// filter and the ranking tier.
    pub active_destinations: Vec<GeoPoint>,
    /// Set by the ranking pass: at least one active destination is
    /// compatible with the candidate request.
    pub has_compatible_active: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct CandidateQuery {
    pub pickup: GeoPoint,
    pub vehicle_class: VehicleClass,
    pub radius_m: f64,
    pub now: u64,
}

/// Why a single driver failed the eligibility check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ineligibility {
    Offline,
    StaleStatus,
    StalePosition,
    OutsideBoundary,
    WrongVehicleClass,
    AtCapacity,
    TooFar,
}

/// Check one driver against a query. Returns the distance to pickup on
/// success. Run immediately before every individual offer as well, since
/// state moves between the initial filter and the actual send.
pub fn check_driver(
    driver: &Driver,
    position: &Position,
    query: &CandidateQuery,
    boundary: Option<&ServiceBoundary>,
    config: &DispatchConfig,
) -> Result<f64, Ineligibility> {
    if !driver.online {
        return Err(Ineligibility::Offline);
    }
    if query.now.saturating_sub(driver.online_updated_at) > config.staleness_window_ms {
        return Err(Ineligibility::StaleStatus);
    }
    if query.now.saturating_sub(driver.position_updated_at) > config.staleness_window_ms {
        return Err(Ineligibility::StalePosition);
    }
    if let Some(boundary) = boundary {
        if boundary.is_configured() && !boundary.contains(position.point) {
            return Err(Ineligibility::OutsideBoundary);
        }
    }
    let distance = haversine_distance_m(query.pickup, position.point);
    if distance > query.radius_m.min(config.hard_radius_cutoff_m) {
        return Err(Ineligibility::TooFar);
    }
    if driver.vehicle_class != query.vehicle_class {
        return Err(Ineligibility::WrongVehicleClass);
    }
    if driver.active_count() >= config.driver_capacity {
        return Err(Ineligibility::AtCapacity);
    }
    Ok(distance)
}

/// Result of one candidate query, with the drop counters needed to explain
/// an empty outcome.
#[derive(Debug, Default)]
pub struct CandidateSet {
    pub snapshots: Vec<DriverSnapshot>,
    /// Online-and-fresh drivers within reach, before class/boundary/capacity.
    pub reachable: usize,
    pub inside_boundary: usize,
    pub class_matches: usize,
}

impl CandidateSet {
    /// Explain an empty result. Only meaningful when no candidate survived
    /// the full filter chain (including the compatibility pass downstream).
    pub fn diagnose(&self) -> NoDriversDiagnosis {
        if self.reachable == 0 {
            NoDriversDiagnosis::NoneOnline
        } else if self.inside_boundary == 0 {
            NoDriversDiagnosis::OutsideGeography
        } else if self.class_matches == 0 {
            NoDriversDiagnosis::NoMatchingVehicleClass
        } else {
            NoDriversDiagnosis::AllBusy
        }
    }
}

/// Filter pre-fetched driver rows down to eligible snapshots.
///
/// Active destinations are read from the ledger; a booking that vanished or
/// already completed simply contributes nothing.
pub fn find_candidates<'a, I>(
    rows: I,
    query: &CandidateQuery,
    ledger: &BookingLedger,
    boundary: Option<&ServiceBoundary>,
    config: &DispatchConfig,
) -> CandidateSet
where
    I: IntoIterator<Item = (Entity, &'a Driver, &'a Position)>,
{
    let mut set = CandidateSet::default();
    for (entity, driver, position) in rows {
        match check_driver(driver, position, query, boundary, config) {
            Ok(distance) => {
                set.reachable += 1;
                set.inside_boundary += 1;
                set.class_matches += 1;
                set.snapshots.push(DriverSnapshot {
                    entity,
                    id: driver.id,
                    point: position.point,
                    distance_to_pickup_m: distance,
                    vehicle_class: driver.vehicle_class,
                    rating: driver.rating,
                    total_trips: driver.total_trips,
                    heading_deg: driver.heading_deg,
                    speed_kmh: driver.speed_kmh,
                    updated_at: driver.position_updated_at,
                    active_count: driver.active_count(),
                    active_destinations: active_destinations(driver, ledger),
                    has_compatible_active: false,
                });
            }
            Err(Ineligibility::Offline)
            | Err(Ineligibility::StaleStatus)
            | Err(Ineligibility::StalePosition)
            | Err(Ineligibility::TooFar) => {}
            Err(Ineligibility::OutsideBoundary) => {
                set.reachable += 1;
            }
            Err(Ineligibility::WrongVehicleClass) => {
                set.reachable += 1;
                set.inside_boundary += 1;
            }
            Err(Ineligibility::AtCapacity) => {
                set.reachable += 1;
                set.inside_boundary += 1;
                set.class_matches += 1;
            }
        }
    }
    set
}

/// Destinations of the driver's still-active bookings.
pub fn active_destinations(driver: &Driver, ledger: &BookingLedger) -> Vec<GeoPoint> {
    driver
        .active_bookings
        .iter()
        .filter_map(|&id| ledger.get(id))
        .filter(|b| b.status.holds_driver())
        .map(|b| b.destination)
        .collect()
}
