use async_trait::async_trait;
use tuck_shared::{Booking, BookingFilter, DriverPresence};

use crate::StoreError;

pub type StoreResult<T> = Result<T, StoreError>;

/// The external record store: the single source of durable truth for bookings and presence.
///
/// Implementations must be safe to call from many connection tasks at once. The engine never
/// holds a registry lock across these calls.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn load_booking(&self, booking_id: &str) -> StoreResult<Option<Booking>>;

    async fn save_booking(&self, booking: &Booking) -> StoreResult<()>;

    async fn load_driver_presence(&self, driver_id: &str) -> StoreResult<Option<DriverPresence>>;

    async fn save_driver_presence(&self, presence: &DriverPresence) -> StoreResult<()>;

    /// Persist a booking and the driver presence its transition changed as one unit.
    ///
    /// Either both records are written or neither is.
    async fn commit_transition(
        &self,
        booking: &Booking,
        presence: Option<&DriverPresence>,
    ) -> StoreResult<()>;

    async fn list_bookings(&self, filter: &BookingFilter) -> StoreResult<Vec<Booking>>;
}
