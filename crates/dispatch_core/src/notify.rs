//! Notification delivery seam.
//!
//! The engine only ever asks "notify driver X about this offer"; formatting
//! and transport belong to the delivery layer behind [`NotificationSink`].
//! Delivery is best-effort: a failure never aborts dispatch, it moves the
//! offer to the next candidate immediately instead of waiting out the
//! timeout window.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use bevy_ecs::prelude::Resource;
use thiserror::Error;

use crate::ids::DriverId;
use crate::offer::OfferSummary;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("notification to {0} could not be delivered")]
pub struct DeliveryFailure(pub DriverId);

pub trait NotificationSink: Send + Sync {
    fn deliver(&self, driver: DriverId, offer: &OfferSummary) -> Result<(), DeliveryFailure>;
}

/// Boxed sink stored as a shared resource.
#[derive(Resource)]
pub struct NotificationSinkResource(pub Box<dyn NotificationSink>);

impl NotificationSinkResource {
    pub fn new(sink: Box<dyn NotificationSink>) -> Self {
        Self(sink)
    }
}

impl std::ops::Deref for NotificationSinkResource {
    type Target = dyn NotificationSink;

    fn deref(&self) -> &Self::Target {
        self.0.as_ref()
    }
}

/// Accepts everything and tells no one. The default sink.
#[derive(Debug, Default)]
pub struct NullSink;

impl NotificationSink for NullSink {
    fn deliver(&self, _driver: DriverId, _offer: &OfferSummary) -> Result<(), DeliveryFailure> {
        Ok(())
    }
}

/// Records every delivery for assertions. Clones share the same log.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    deliveries: Arc<Mutex<Vec<(DriverId, OfferSummary)>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deliveries(&self) -> Vec<(DriverId, OfferSummary)> {
        match self.deliveries.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn delivered_to(&self) -> Vec<DriverId> {
        self.deliveries().into_iter().map(|(d, _)| d).collect()
    }
}

impl NotificationSink for RecordingSink {
    fn deliver(&self, driver: DriverId, offer: &OfferSummary) -> Result<(), DeliveryFailure> {
        match self.deliveries.lock() {
            Ok(mut guard) => guard.push((driver, offer.clone())),
            Err(poisoned) => poisoned.into_inner().push((driver, offer.clone())),
        }
        Ok(())
    }
}

/// Fails for a chosen set of drivers, records the rest. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct FailingSink {
    fail_for: Arc<Mutex<HashSet<DriverId>>>,
    inner: RecordingSink,
}

impl FailingSink {
    pub fn failing_for<I: IntoIterator<Item = DriverId>>(drivers: I) -> Self {
        Self {
            fail_for: Arc::new(Mutex::new(drivers.into_iter().collect())),
            inner: RecordingSink::new(),
        }
    }

    pub fn deliveries(&self) -> Vec<(DriverId, OfferSummary)> {
        self.inner.deliveries()
    }
}

impl NotificationSink for FailingSink {
    fn deliver(&self, driver: DriverId, offer: &OfferSummary) -> Result<(), DeliveryFailure> {
        let unreachable = match self.fail_for.lock() {
            Ok(guard) => guard.contains(&driver),
            Err(poisoned) => poisoned.into_inner().contains(&driver),
        };
        if unreachable {
            return Err(DeliveryFailure(driver));
        }
        self.inner.deliver(driver, offer)
    }
}
