//! Spatial operations: H3-based driver indexing and distance caching.
//!
//! Drivers are indexed by H3 cell (resolution 9, ~240 m cells) so candidate
//! queries touch only the grid disk around a pickup instead of scanning every
//! driver. The precise haversine filter runs on top of this coarse pass.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::{Mutex, OnceLock};

use bevy_ecs::prelude::{Entity, Resource};
use h3o::{CellIndex, LatLng, Resolution};
use lru::LruCache;

use crate::geo::{haversine_distance_m, GeoPoint};

/// Approximate center-to-center spacing of resolution-9 cells, meters.
const CELL_SPACING_M: f64 = 240.0;

#[derive(Debug, Clone, Copy)]
pub struct GeoIndex {
    resolution: Resolution,
}

impl Default for GeoIndex {
    fn default() -> Self {
        Self {
            resolution: Resolution::Nine,
        }
    }
}

impl GeoIndex {
    pub fn new(resolution: Resolution) -> Self {
        Self { resolution }
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    /// H3 cell containing `point`, or `None` for out-of-range coordinates.
    pub fn cell_for(&self, point: GeoPoint) -> Option<CellIndex> {
        if !point.is_valid() {
            return None;
        }
        let coord = LatLng::new(point.lat, point.lng).ok()?;
        Some(coord.to_cell(self.resolution))
    }

    pub fn grid_disk(&self, origin: CellIndex, k: u32) -> Vec<CellIndex> {
        debug_assert_eq!(
            origin.resolution(),
            self.resolution,
            "origin resolution must match GeoIndex resolution"
        );
        origin.grid_disk::<Vec<_>>(k)
    }

    /// Grid-disk ring count that covers a radius in meters, with one ring of
    /// slack for cells straddling the circle.
    pub fn rings_for_radius(&self, radius_m: f64) -> u32 {
        (radius_m / CELL_SPACING_M).ceil() as u32 + 1
    }
}

fn distance_m_between_cells_uncached(a: CellIndex, b: CellIndex) -> f64 {
    let a: LatLng = a.into();
    let b: LatLng = b.into();
    haversine_distance_m(
        GeoPoint::new(a.lat(), a.lng()),
        GeoPoint::new(b.lat(), b.lng()),
    )
}

/// Global cell-pair distance cache (50,000 entries).
fn get_distance_cache() -> &'static Mutex<LruCache<(CellIndex, CellIndex), f64>> {
    static CACHE: OnceLock<Mutex<LruCache<(CellIndex, CellIndex), f64>>> = OnceLock::new();
    CACHE.get_or_init(|| {
        Mutex::new(LruCache::new(
            NonZeroUsize::new(50_000).expect("cache size must be non-zero"),
        ))
    })
}

/// Distance in meters between two H3 cell centers, with LRU caching.
pub fn distance_m_between_cells(a: CellIndex, b: CellIndex) -> f64 {
    // Symmetric key (smaller cell first) to maximize cache hits.
    let key = if a < b { (a, b) } else { (b, a) };

    let mut cache = match get_distance_cache().lock() {
        Ok(guard) => guard,
        Err(_) => return distance_m_between_cells_uncached(key.0, key.1),
    };
    *cache.get_or_insert(key, || distance_m_between_cells_uncached(key.0, key.1))
}

/// Drop disk cells whose centers sit clearly past the radius. One cell of
/// slack keeps cells that straddle the circle; the per-driver haversine
/// filter downstream stays exact.
pub fn prune_disk(origin: CellIndex, disk: Vec<CellIndex>, radius_m: f64) -> Vec<CellIndex> {
    disk.into_iter()
        .filter(|cell| distance_m_between_cells(origin, *cell) <= radius_m + CELL_SPACING_M)
        .collect()
}

/// Cell → driver-entity index for radius queries.
///
/// Updated incrementally as drivers register, move, or go offline; offline
/// drivers are removed entirely so queries never see them.
#[derive(Debug, Resource, Default)]
pub struct SpatialIndex {
    drivers_by_cell: HashMap<CellIndex, Vec<Entity>>,
    entity_to_cell: HashMap<Entity, CellIndex>,
}

impl SpatialIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_driver(&mut self, entity: Entity, cell: CellIndex) {
        if let Some(old) = self.entity_to_cell.get(&entity).copied() {
            if old == cell {
                return;
            }
            self.detach(entity, old);
        }
        self.drivers_by_cell.entry(cell).or_default().push(entity);
        self.entity_to_cell.insert(entity, cell);
    }

    pub fn remove_driver(&mut self, entity: Entity) {
        if let Some(cell) = self.entity_to_cell.remove(&entity) {
            self.detach_from_cell_only(entity, cell);
        }
    }

    fn detach(&mut self, entity: Entity, cell: CellIndex) {
        self.detach_from_cell_only(entity, cell);
        self.entity_to_cell.remove(&entity);
    }

    fn detach_from_cell_only(&mut self, entity: Entity, cell: CellIndex) {
        if let Some(entities) = self.drivers_by_cell.get_mut(&cell) {
            entities.retain(|&e| e != entity);
            if entities.is_empty() {
                self.drivers_by_cell.remove(&cell);
            }
        }
    }

    pub fn drivers_in_cells(&self, cells: &[CellIndex]) -> Vec<Entity> {
        let mut result = Vec::new();
        for cell in cells {
            if let Some(entities) = self.drivers_by_cell.get(cell) {
                result.extend(entities.iter().copied());
            }
        }
        result
    }

    pub fn driver_cell(&self, entity: Entity) -> Option<CellIndex> {
        self.entity_to_cell.get(&entity).copied()
    }

    pub fn len(&self) -> usize {
        self.entity_to_cell.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entity_to_cell.is_empty()
    }
}
