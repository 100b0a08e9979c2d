//! Pluggable arrival-time estimation.
//!
//! Dispatch only needs a rough pickup ETA for the offer it sends a driver; a
//! real provider (road routing, historical speeds) can be plugged in behind
//! [`EtaProvider`]. The default derives a placeholder from straight-line
//! distance at an assumed city speed.

use bevy_ecs::prelude::Resource;

use crate::geo::{haversine_distance_m, GeoPoint};

/// Placeholder shown when no provider has an answer.
pub const FALLBACK_ETA_MINUTES: f64 = 5.0;

pub trait EtaProvider: Send + Sync {
    /// Estimated driving time in minutes, `None` when the provider cannot
    /// answer for this pair.
    fn estimate_minutes(&self, from: GeoPoint, to: GeoPoint) -> Option<f64>;
}

/// Boxed provider stored as a shared resource.
#[derive(Resource)]
pub struct EtaProviderResource(pub Box<dyn EtaProvider>);

impl EtaProviderResource {
    pub fn new(provider: Box<dyn EtaProvider>) -> Self {
        Self(provider)
    }
}

impl std::ops::Deref for EtaProviderResource {
    type Target = dyn EtaProvider;

    fn deref(&self) -> &Self::Target {
        self.0.as_ref()
    }
}

/// Straight-line distance at an assumed average city speed.
#[derive(Debug, Clone, Copy)]
pub struct StaticEtaProvider {
    pub speed_kmh: f64,
}

impl Default for StaticEtaProvider {
    fn default() -> Self {
        Self { speed_kmh: 40.0 }
    }
}

impl EtaProvider for StaticEtaProvider {
    fn estimate_minutes(&self, from: GeoPoint, to: GeoPoint) -> Option<f64> {
        if self.speed_kmh <= 0.0 {
            return None;
        }
        let km = haversine_distance_m(from, to) / 1_000.0;
        Some(km / self.speed_kmh * 60.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_provider_scales_with_distance() {
        let provider = StaticEtaProvider::default();
        let from = GeoPoint::new(37.7749, -122.4194);
        let to = GeoPoint::new(37.7599, -122.4148);
        let eta = provider.estimate_minutes(from, to).expect("eta");
        // ~1.7 km at 40 km/h is about 2.5 minutes.
        assert!(eta > 1.5 && eta < 3.5, "got {eta}");
        assert_eq!(provider.estimate_minutes(from, from), Some(0.0));
    }

    #[test]
    fn nonpositive_speed_yields_no_estimate() {
        let provider = StaticEtaProvider { speed_kmh: 0.0 };
        let p = GeoPoint::new(37.7749, -122.4194);
        assert_eq!(provider.estimate_minutes(p, p), None);
    }
}
