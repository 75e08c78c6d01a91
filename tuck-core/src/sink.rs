use tuck_shared::{Booking, DriverPresence, LifecycleEvent};

/// Receives every accepted, persisted transition.
///
/// Called while the booking's lock is still held, so calls for one booking arrive in commit
/// order. Implementations must not block or await.
pub trait LifecycleSink: Send + Sync {
    fn lifecycle_committed(
        &self,
        booking: &Booking,
        event: &LifecycleEvent,
        presence: Option<&DriverPresence>,
    );
}

/// Sink that drops everything, for callers that only need the coordinator
pub struct NoopSink;

impl LifecycleSink for NoopSink {
    fn lifecycle_committed(&self, _: &Booking, _: &LifecycleEvent, _: Option<&DriverPresence>) {}
}
