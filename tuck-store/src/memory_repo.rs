use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;
use tuck_core::{RecordStore, StoreError, StoreResult};
use tuck_shared::{Booking, BookingFilter, DriverPresence};

/// Process-local record store for tests and single-node development.
///
/// `fail_writes(true)` makes every write return `StoreError::Unavailable` without touching
/// state, which is how callers exercise the store-failure paths.
#[derive(Default)]
pub struct InMemoryRecordStore {
    bookings: RwLock<HashMap<String, Booking>>,
    drivers: RwLock<HashMap<String, DriverPresence>>,
    fail_writes: AtomicBool,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check_writable(&self) -> StoreResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("write rejected by failure injection".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn load_booking(&self, booking_id: &str) -> StoreResult<Option<Booking>> {
        Ok(self.bookings.read().await.get(booking_id).cloned())
    }

    async fn save_booking(&self, booking: &Booking) -> StoreResult<()> {
        self.check_writable()?;
        self.bookings.write().await.insert(booking.id.clone(), booking.clone());
        Ok(())
    }

    async fn load_driver_presence(&self, driver_id: &str) -> StoreResult<Option<DriverPresence>> {
        Ok(self.drivers.read().await.get(driver_id).cloned())
    }

    async fn save_driver_presence(&self, presence: &DriverPresence) -> StoreResult<()> {
        self.check_writable()?;
        self.drivers.write().await.insert(presence.driver_id.clone(), presence.clone());
        Ok(())
    }

    async fn commit_transition(
        &self,
        booking: &Booking,
        presence: Option<&DriverPresence>,
    ) -> StoreResult<()> {
        self.check_writable()?;
        // Bookings before drivers, same as the engine's lock order.
        let mut bookings = self.bookings.write().await;
        let mut drivers = self.drivers.write().await;
        bookings.insert(booking.id.clone(), booking.clone());
        if let Some(presence) = presence {
            drivers.insert(presence.driver_id.clone(), presence.clone());
        }
        Ok(())
    }

    async fn list_bookings(&self, filter: &BookingFilter) -> StoreResult<Vec<Booking>> {
        let mut matched: Vec<Booking> = self
            .bookings
            .read()
            .await
            .values()
            .filter(|b| filter.matches(b))
            .cloned()
            .collect();
        matched.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(matched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tuck_shared::{BookingStatus, NewBooking, PresenceStatus};

    fn booking(customer: &str) -> Booking {
        Booking::new(
            customer.to_string(),
            NewBooking {
                pickup: "Kurla".to_string(),
                dropoff: "Bandra".to_string(),
                vehicle_type: "mini_truck".to_string(),
                amount_minor: 450,
                customer_notes: None,
                customer_phone: None,
            },
        )
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let store = InMemoryRecordStore::new();
        let b = booking("cust-1");
        store.save_booking(&b).await.unwrap();

        let loaded = store.load_booking(&b.id).await.unwrap().unwrap();
        assert_eq!(loaded.customer_id, "cust-1");
        assert!(store.load_booking("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_commit_writes_both_records() {
        let store = InMemoryRecordStore::new();
        let mut b = booking("cust-1");
        b.status = BookingStatus::Assigned;
        b.driver_id = Some("drv-1".to_string());
        let mut presence = DriverPresence::new("drv-1".to_string());
        presence.occupy(&b.id);

        store.commit_transition(&b, Some(&presence)).await.unwrap();

        assert_eq!(store.load_booking(&b.id).await.unwrap().unwrap().status, BookingStatus::Assigned);
        let p = store.load_driver_presence("drv-1").await.unwrap().unwrap();
        assert_eq!(p.status, PresenceStatus::Busy);
        assert_eq!(p.current_booking_id.as_deref(), Some(b.id.as_str()));
    }

    #[tokio::test]
    async fn test_failure_injection_leaves_state_untouched() {
        let store = InMemoryRecordStore::new();
        let b = booking("cust-1");
        store.fail_writes(true);

        let err = store.commit_transition(&b, None).await.unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)));
        assert!(store.load_booking(&b.id).await.unwrap().is_none());

        store.fail_writes(false);
        store.save_booking(&b).await.unwrap();
        assert!(store.load_booking(&b.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_list_filters() {
        let store = InMemoryRecordStore::new();
        store.save_booking(&booking("cust-1")).await.unwrap();
        store.save_booking(&booking("cust-1")).await.unwrap();
        store.save_booking(&booking("cust-2")).await.unwrap();

        let filter = BookingFilter { customer_id: Some("cust-1".into()), ..Default::default() };
        assert_eq!(store.list_bookings(&filter).await.unwrap().len(), 2);
        assert_eq!(store.list_bookings(&BookingFilter::default()).await.unwrap().len(), 3);
    }
}
