use std::sync::Arc;
use tracing::info;
use tuck_core::{EngineError, EngineResult, RecordStore};
use tuck_shared::{Availability, DriverPresence, LocationReading, PresenceStatus};

use crate::locks::KeyedLocks;

/// A presence write and whether it changed the driver's status
#[derive(Debug, Clone)]
pub struct PresenceChange {
    pub presence: DriverPresence,
    pub changed: bool,
}

/// Driver-initiated presence updates. Shares the per-driver locks with the coordinator so a
/// toggle can never interleave with an assignment or a release.
pub struct PresenceKeeper {
    store: Arc<dyn RecordStore>,
    drivers: Arc<KeyedLocks>,
}

impl PresenceKeeper {
    pub fn new(store: Arc<dyn RecordStore>, drivers: Arc<KeyedLocks>) -> Self {
        Self { store, drivers }
    }

    /// A driver's client registered: create the record if needed and bring it online.
    /// A busy driver reconnecting mid-trip stays busy.
    pub async fn connect(&self, driver_id: &str) -> EngineResult<PresenceChange> {
        let _guard = self.drivers.lock(driver_id).await;
        let mut presence = self
            .store
            .load_driver_presence(driver_id)
            .await?
            .unwrap_or_else(|| DriverPresence::new(driver_id.to_string()));

        if presence.status != PresenceStatus::Offline {
            if !presence.connected {
                presence.connected = true;
                self.store.save_driver_presence(&presence).await?;
            }
            return Ok(PresenceChange { presence, changed: false });
        }

        presence.connected = true;
        presence.set_availability(Availability::Online);
        self.store.save_driver_presence(&presence).await?;
        info!("Driver {} is online", driver_id);
        Ok(PresenceChange { presence, changed: true })
    }

    /// Explicit online/offline toggle
    pub async fn set_availability(
        &self,
        driver_id: &str,
        availability: Availability,
    ) -> EngineResult<PresenceChange> {
        let _guard = self.drivers.lock(driver_id).await;
        let mut presence = self
            .store
            .load_driver_presence(driver_id)
            .await?
            .ok_or_else(|| EngineError::UnknownDriver(driver_id.to_string()))?;

        if let Some(booking_id) = presence.current_booking_id.clone() {
            return match availability {
                Availability::Online => Ok(PresenceChange { presence, changed: false }),
                Availability::Offline => Err(EngineError::DriverBusy {
                    driver_id: driver_id.to_string(),
                    booking_id,
                }),
            };
        }

        let before = presence.status;
        presence.set_availability(availability);
        if presence.status == before {
            return Ok(PresenceChange { presence, changed: false });
        }

        self.store.save_driver_presence(&presence).await?;
        info!("Driver {} is now {:?}", driver_id, presence.status);
        Ok(PresenceChange { presence, changed: true })
    }

    /// A driver connection closed. `still_connected` is asked under the driver lock, so a
    /// reconnect racing this call is either seen here or comes after it.
    ///
    /// Once the last connection is gone, online reverts to offline; a busy driver keeps its
    /// booking so the trip survives a dropped tab. `None` when the driver is still connected
    /// or has no record.
    pub async fn disconnect(
        &self,
        driver_id: &str,
        still_connected: impl FnOnce() -> bool,
    ) -> EngineResult<Option<PresenceChange>> {
        let _guard = self.drivers.lock(driver_id).await;
        if still_connected() {
            return Ok(None);
        }
        let Some(mut presence) = self.store.load_driver_presence(driver_id).await? else {
            return Ok(None);
        };

        let changed = presence.status == PresenceStatus::Online;
        if !changed && !presence.connected {
            return Ok(Some(PresenceChange { presence, changed }));
        }

        presence.connected = false;
        if changed {
            presence.set_availability(Availability::Offline);
        }
        self.store.save_driver_presence(&presence).await?;
        if changed {
            info!("Driver {} went offline on disconnect", driver_id);
        }
        Ok(Some(PresenceChange { presence, changed }))
    }

    /// Write an accepted location fix through to the driver's record. Unknown drivers are
    /// skipped; the relay never requires a record.
    pub async fn record_location(&self, driver_id: &str, reading: LocationReading) -> EngineResult<()> {
        let _guard = self.drivers.lock(driver_id).await;
        let Some(mut presence) = self.store.load_driver_presence(driver_id).await? else {
            return Ok(());
        };
        if presence.record_location(reading) {
            self.store.save_driver_presence(&presence).await?;
        }
        Ok(())
    }
}
