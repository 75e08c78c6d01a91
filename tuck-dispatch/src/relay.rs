use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::debug;
use tuck_core::{EngineError, EngineResult};
use tuck_shared::LocationReading;

use crate::broker::{Event, EventBroker};
use crate::metrics::EngineMetrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocationOutcome {
    Accepted,
    /// Older than the latest reading already held; dropped
    Stale,
}

/// Latest-value cache of driver positions, last-writer-wins by `recorded_at`.
///
/// A reading with the same timestamp as the current one replaces it. The relay never writes
/// the record store and does not check that the driver exists.
pub struct LocationRelay {
    latest: DashMap<String, LocationReading>,
    broker: Arc<EventBroker>,
    metrics: Arc<EngineMetrics>,
}

impl LocationRelay {
    pub fn new(broker: Arc<EventBroker>, metrics: Arc<EngineMetrics>) -> Self {
        Self {
            latest: DashMap::new(),
            broker,
            metrics,
        }
    }

    pub fn push(&self, driver_id: &str, reading: LocationReading) -> EngineResult<LocationOutcome> {
        if driver_id.trim().is_empty() {
            return Err(EngineError::Validation("location needs a driver id".to_string()));
        }
        if !reading.is_valid() {
            return Err(EngineError::Validation(format!(
                "coordinates out of range: {}, {}",
                reading.lat, reading.lng
            )));
        }

        // Publishing while the entry is held keeps one driver's fan-out in timestamp order.
        match self.latest.entry(driver_id.to_string()) {
            Entry::Occupied(mut current) => {
                if reading.recorded_at < current.get().recorded_at {
                    self.metrics.record_stale_location();
                    debug!("Dropped stale location for driver {}", driver_id);
                    return Ok(LocationOutcome::Stale);
                }
                current.insert(reading);
                self.broker.publish(Event::Location { driver_id: driver_id.to_string(), reading });
            }
            Entry::Vacant(slot) => {
                slot.insert(reading);
                self.broker.publish(Event::Location { driver_id: driver_id.to_string(), reading });
            }
        }
        Ok(LocationOutcome::Accepted)
    }

    pub fn latest(&self, driver_id: &str) -> Option<LocationReading> {
        self.latest.get(driver_id).map(|r| *r)
    }
}
