use std::sync::Arc;
use tracing::{info, warn};
use tuck_core::{EngineError, EngineResult, LifecycleSink, RecordStore};
use tuck_shared::{Actor, Booking, BookingStatus, DriverPresence, LifecycleEvent, LifecycleRequest, Rejection};

use crate::locks::KeyedLocks;
use crate::machine::{transition, Transition};
use crate::policy;

/// Result of a `try_assign` race
#[derive(Debug, Clone)]
pub enum AssignOutcome {
    /// This driver holds the booking. `replayed` is set when it already did before the call.
    Assigned { booking: Booking, replayed: bool },
    /// Another driver won the booking first
    AlreadyAssigned { booking_id: String },
    /// The booking has moved past `pending` (or was cancelled)
    BookingNotPending(Rejection),
}

/// An accepted lifecycle move. `event` is `None` for an idempotent replay.
#[derive(Debug, Clone)]
pub struct Applied {
    pub booking: Booking,
    pub event: Option<LifecycleEvent>,
    pub presence: Option<DriverPresence>,
}

impl Applied {
    pub fn is_noop(&self) -> bool {
        self.event.is_none()
    }
}

/// Serializes every lifecycle move per booking so that check, persist and publish happen as
/// one unit. This is where the single-winner assignment race is decided.
///
/// Locks are always taken booking first, then driver.
pub struct AssignmentCoordinator {
    store: Arc<dyn RecordStore>,
    sink: Arc<dyn LifecycleSink>,
    bookings: KeyedLocks,
    drivers: Arc<KeyedLocks>,
}

impl AssignmentCoordinator {
    pub fn new(store: Arc<dyn RecordStore>, sink: Arc<dyn LifecycleSink>) -> Self {
        Self::with_driver_locks(store, sink, Arc::new(KeyedLocks::new()))
    }

    /// Share the per-driver locks with the presence keeper
    pub fn with_driver_locks(
        store: Arc<dyn RecordStore>,
        sink: Arc<dyn LifecycleSink>,
        drivers: Arc<KeyedLocks>,
    ) -> Self {
        Self {
            store,
            sink,
            bookings: KeyedLocks::new(),
            drivers,
        }
    }

    /// Atomic check-and-set of `driver_id` onto a pending booking
    pub async fn try_assign(
        &self,
        booking_id: &str,
        driver_id: &str,
        actor: &Actor,
    ) -> EngineResult<AssignOutcome> {
        policy::permits_assignment(actor, driver_id)?;

        let _booking_guard = self.bookings.lock(booking_id).await;
        let mut booking = self.load_booking(booking_id).await?;

        if let Some(current) = booking.driver_id.as_deref() {
            if current != driver_id && !booking.status.is_terminal() {
                info!("Driver {} lost booking {} to {}", driver_id, booking_id, current);
                return Ok(AssignOutcome::AlreadyAssigned { booking_id: booking_id.to_string() });
            }
        }

        let step = match transition(booking.status, LifecycleRequest::Advance(BookingStatus::Assigned)) {
            Transition::Rejected(rejection) => return Ok(AssignOutcome::BookingNotPending(rejection)),
            Transition::Accepted(step) if step.is_noop() => {
                return Ok(AssignOutcome::Assigned { booking, replayed: true });
            }
            Transition::Accepted(step) => step,
        };

        let _driver_guard = self.drivers.lock(driver_id).await;
        let mut presence = self
            .store
            .load_driver_presence(driver_id)
            .await?
            .ok_or_else(|| EngineError::UnknownDriver(driver_id.to_string()))?;

        if let Some(other) = presence.current_booking_id.as_deref() {
            if other != booking_id {
                return Err(EngineError::DriverBusy {
                    driver_id: driver_id.to_string(),
                    booking_id: other.to_string(),
                });
            }
        }

        let event = LifecycleEvent::new(booking_id, step.from, step.to, actor);
        booking.driver_id = Some(driver_id.to_string());
        booking.apply(&event);
        presence.occupy(booking_id);

        self.commit(&booking, &event, Some(&presence)).await?;
        info!("Booking {} assigned to driver {}", booking_id, driver_id);

        Ok(AssignOutcome::Assigned { booking, replayed: false })
    }

    /// Every move other than assignment: forward steps and cancellation.
    ///
    /// A terminal move frees the assigned driver inside the same commit.
    pub async fn advance(
        &self,
        booking_id: &str,
        request: LifecycleRequest,
        actor: &Actor,
    ) -> EngineResult<Applied> {
        let _booking_guard = self.bookings.lock(booking_id).await;
        let mut booking = self.load_booking(booking_id).await?;

        policy::permits(actor, &booking, request)?;

        let step = match transition(booking.status, request) {
            Transition::Rejected(rejection) => {
                warn!("Rejected {} on booking {}: {}", request, booking_id, rejection);
                return Err(EngineError::InvalidTransition(rejection));
            }
            Transition::Accepted(step) if step.is_noop() => {
                return Ok(Applied { booking, event: None, presence: None });
            }
            Transition::Accepted(step) => step,
        };

        if step.to == BookingStatus::Assigned {
            return Err(EngineError::Validation(
                "assignment must name a driver".to_string(),
            ));
        }

        let event = LifecycleEvent::new(booking_id, step.from, step.to, actor);
        booking.apply(&event);

        let mut _driver_guard = None;
        let mut presence = None;
        if step.to.is_terminal() {
            if let Some(driver_id) = booking.driver_id.clone() {
                _driver_guard = Some(self.drivers.lock(&driver_id).await);
                presence = self.release_driver(&driver_id, booking_id).await?;
            }
        }

        self.commit(&booking, &event, presence.as_ref()).await?;
        info!("Booking {} moved {} -> {}", booking_id, step.from, step.to);

        Ok(Applied { booking, event: Some(event), presence })
    }

    async fn load_booking(&self, booking_id: &str) -> EngineResult<Booking> {
        self.store
            .load_booking(booking_id)
            .await?
            .ok_or_else(|| EngineError::UnknownBooking(booking_id.to_string()))
    }

    /// Presence to persist alongside a terminal move, if the driver is still held by this booking
    async fn release_driver(
        &self,
        driver_id: &str,
        booking_id: &str,
    ) -> EngineResult<Option<DriverPresence>> {
        let presence = self.store.load_driver_presence(driver_id).await?;
        Ok(presence.and_then(|mut presence| {
            if presence.current_booking_id.as_deref() == Some(booking_id) {
                presence.release();
                Some(presence)
            } else {
                warn!("Driver {} was not holding booking {} at release", driver_id, booking_id);
                None
            }
        }))
    }

    async fn commit(
        &self,
        booking: &Booking,
        event: &LifecycleEvent,
        presence: Option<&DriverPresence>,
    ) -> EngineResult<()> {
        if let Err(e) = self.store.commit_transition(booking, presence).await {
            warn!("Store failed during {} -> {} on booking {}: {}", event.from_status, event.to_status, booking.id, e);
            return Err(e.into());
        }
        self.sink.lifecycle_committed(booking, event, presence);
        Ok(())
    }
}
