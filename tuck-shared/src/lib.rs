pub mod models;
pub mod pii;

pub use models::actor::{Actor, Role};
pub use models::booking::{Booking, BookingFilter, BookingStatus, LifecycleRequest, NewBooking, Rejection};
pub use models::events::LifecycleEvent;
pub use models::frames::{BookingSnapshot, DriverPresenceSnapshot, Inbound, Outbound};
pub use models::presence::{Availability, DriverPresence, LocationReading, PresenceStatus};
pub use pii::Masked;
