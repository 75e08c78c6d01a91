use chrono::Utc;
use std::sync::Arc;
use tuck_core::{EngineError, EngineResult, RecordStore};
use tuck_shared::{Booking, BookingFilter, BookingSnapshot, BookingStatus, DriverPresenceSnapshot};

use crate::relay::LocationRelay;

/// Pure reads of authoritative state, taken outside any lock.
///
/// Clients call these on reconnect and on a slow heartbeat to repair whatever pushes they
/// missed.
pub struct Reconciler {
    store: Arc<dyn RecordStore>,
    relay: Arc<LocationRelay>,
}

impl Reconciler {
    pub fn new(store: Arc<dyn RecordStore>, relay: Arc<LocationRelay>) -> Self {
        Self { store, relay }
    }

    pub async fn current_state(&self, booking_id: &str) -> EngineResult<BookingSnapshot> {
        let booking = self
            .store
            .load_booking(booking_id)
            .await?
            .ok_or_else(|| EngineError::UnknownBooking(booking_id.to_string()))?;
        Ok(BookingSnapshot { booking, as_of: Utc::now() })
    }

    /// Stored presence, with the relay's position when it is newer than the stored one
    pub async fn current_presence(&self, driver_id: &str) -> EngineResult<DriverPresenceSnapshot> {
        let presence = self
            .store
            .load_driver_presence(driver_id)
            .await?
            .ok_or_else(|| EngineError::UnknownDriver(driver_id.to_string()))?;

        let location = match (presence.last_location, self.relay.latest(driver_id)) {
            (Some(stored), Some(live)) if stored.recorded_at > live.recorded_at => Some(stored),
            (stored, live) => live.or(stored),
        };

        Ok(DriverPresenceSnapshot {
            driver_id: presence.driver_id,
            status: presence.status,
            current_booking_id: presence.current_booking_id,
            location,
            as_of: Utc::now(),
        })
    }

    /// A customer's history, newest first
    pub async fn bookings_for_customer(&self, customer_id: &str) -> EngineResult<Vec<Booking>> {
        self.newest_first(BookingFilter {
            customer_id: Some(customer_id.to_string()),
            ..Default::default()
        })
        .await
    }

    /// A driver's history, newest first
    pub async fn bookings_for_driver(&self, driver_id: &str) -> EngineResult<Vec<Booking>> {
        self.newest_first(BookingFilter {
            driver_id: Some(driver_id.to_string()),
            ..Default::default()
        })
        .await
    }

    /// Open bookings waiting for a driver, oldest first
    pub async fn pending_bookings(&self) -> EngineResult<Vec<Booking>> {
        let filter = BookingFilter { status: Some(BookingStatus::Pending), ..Default::default() };
        let mut bookings = self.store.list_bookings(&filter).await?;
        bookings.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(bookings)
    }

    pub async fn all_bookings(&self) -> EngineResult<Vec<Booking>> {
        self.newest_first(BookingFilter::default()).await
    }

    /// The booking a driver is currently committed to, if any
    pub async fn active_booking_for_driver(&self, driver_id: &str) -> EngineResult<Option<Booking>> {
        let presence = self
            .store
            .load_driver_presence(driver_id)
            .await?
            .ok_or_else(|| EngineError::UnknownDriver(driver_id.to_string()))?;

        match presence.current_booking_id {
            Some(booking_id) => Ok(self.store.load_booking(&booking_id).await?),
            None => Ok(None),
        }
    }

    async fn newest_first(&self, filter: BookingFilter) -> EngineResult<Vec<Booking>> {
        let mut bookings = self.store.list_bookings(&filter).await?;
        bookings.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(bookings)
    }
}
