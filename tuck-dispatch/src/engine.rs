use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tuck_core::{EngineError, EngineResult, RecordStore};
use tuck_lifecycle::{AssignOutcome, AssignmentCoordinator, KeyedLocks, PresenceKeeper};
use tuck_shared::{
    Actor, Availability, Booking, BookingSnapshot, BookingStatus, DriverPresence,
    DriverPresenceSnapshot, LifecycleRequest, LocationReading, NewBooking, Outbound, Role,
};

use crate::broker::{Event, EventBroker};
use crate::metrics::{EngineMetrics, TransitionOutcome};
use crate::reconcile::Reconciler;
use crate::registry::{Registry, Subscription, SubscriptionId};
use crate::relay::{LocationOutcome, LocationRelay};

#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Outbound frames queued per subscriber before deliveries to it start failing
    pub subscriber_buffer: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self { subscriber_buffer: 64 }
    }
}

/// A registered connection: its identity and the queue the broker fills for it
#[derive(Debug)]
pub struct Connection {
    pub subscription: Subscription,
    pub outbox: mpsc::Receiver<Outbound>,
}

/// Reply to an accepted transition request
#[derive(Debug, Clone)]
pub struct TransitionReply {
    pub booking: Booking,
    /// The booking was already in the requested status; nothing was written or published
    pub noop: bool,
}

/// The coordination engine: one instance per process, shared by every connection task
pub struct Engine {
    store: Arc<dyn RecordStore>,
    registry: Arc<Registry>,
    broker: Arc<EventBroker>,
    coordinator: AssignmentCoordinator,
    presence: PresenceKeeper,
    relay: Arc<LocationRelay>,
    reconciler: Reconciler,
    metrics: Arc<EngineMetrics>,
}

impl Engine {
    pub fn new(store: Arc<dyn RecordStore>, settings: EngineSettings) -> prometheus::Result<Self> {
        let metrics = Arc::new(EngineMetrics::new()?);
        let registry = Arc::new(Registry::new(settings.subscriber_buffer));
        let broker = Arc::new(EventBroker::new(registry.clone(), metrics.clone()));
        let drivers = Arc::new(KeyedLocks::new());
        let coordinator =
            AssignmentCoordinator::with_driver_locks(store.clone(), broker.clone(), drivers.clone());
        let presence = PresenceKeeper::new(store.clone(), drivers);
        let relay = Arc::new(LocationRelay::new(broker.clone(), metrics.clone()));
        let reconciler = Reconciler::new(store.clone(), relay.clone());

        Ok(Self {
            store,
            registry,
            broker,
            coordinator,
            presence,
            relay,
            reconciler,
            metrics,
        })
    }

    // ========================================================================
    // Connections
    // ========================================================================

    /// Subscribe a connection. A driver's registration also brings them online.
    pub async fn register(&self, role: Role, owner_id: Option<String>) -> EngineResult<Connection> {
        let (subscription, outbox) = self.registry.register(role, owner_id)?;

        if let (Role::Driver, Some(driver_id)) = (role, subscription.owner_id.as_deref()) {
            if let Err(e) = self.driver_connected(driver_id).await {
                self.registry.unregister(subscription.id);
                return Err(e);
            }
        }

        self.metrics.subscriber_joined(role);
        info!("Subscription {} registered as {}", subscription.id, role);
        Ok(Connection { subscription, outbox })
    }

    /// Drop a connection. Safe to call more than once for the same handle.
    pub async fn unregister(&self, id: SubscriptionId) -> EngineResult<()> {
        let Some(subscription) = self.registry.unregister(id) else {
            return Ok(());
        };
        self.metrics.subscriber_left(subscription.role);
        info!("Subscription {} closed", id);

        if let (Role::Driver, Some(driver_id)) = (subscription.role, subscription.owner_id.as_deref()) {
            let still_connected = || self.registry.connections_of(Role::Driver, driver_id) > 0;
            if let Some(change) = self.presence.disconnect(driver_id, still_connected).await? {
                if change.changed {
                    self.publish_presence(&change.presence);
                }
            }
        }
        Ok(())
    }

    async fn driver_connected(&self, driver_id: &str) -> EngineResult<()> {
        let change = self.presence.connect(driver_id).await?;
        if change.changed {
            self.publish_presence(&change.presence);
        } else {
            self.registry.set_driver_status(driver_id, change.presence.status);
        }

        // Restore location routing for a driver resuming a trip after a restart.
        if let Some(booking_id) = change.presence.current_booking_id.as_deref() {
            match self.store.load_booking(booking_id).await {
                Ok(Some(booking)) => self.broker.track_route(&booking),
                Ok(None) => warn!("Driver {} holds missing booking {}", driver_id, booking_id),
                Err(e) => warn!("Could not restore route for driver {}: {}", driver_id, e),
            }
        }
        Ok(())
    }

    // ========================================================================
    // Bookings
    // ========================================================================

    /// Persist a new `pending` booking, then announce it to online drivers and admins
    pub async fn create_booking(&self, actor: &Actor, request: NewBooking) -> EngineResult<Booking> {
        let customer_id = match (actor.role, actor.id.as_deref()) {
            (Role::Customer, Some(id)) => id.to_string(),
            (role, _) => {
                return Err(EngineError::NotPermitted {
                    role,
                    request: LifecycleRequest::Advance(BookingStatus::Pending),
                })
            }
        };
        if request.pickup.trim().is_empty() || request.dropoff.trim().is_empty() {
            return Err(EngineError::Validation("pickup and dropoff are required".to_string()));
        }

        let booking = Booking::new(customer_id, request);
        self.store.save_booking(&booking).await?;
        info!("Booking {} created by customer {}", booking.id, booking.customer_id);

        self.broker.publish(Event::NewBooking { booking: booking.clone() });
        Ok(booking)
    }

    /// Route a lifecycle request. `assigned` goes through the assignment race; everything
    /// else is a plain step. A driver asking for `assigned` assigns themself.
    pub async fn request_transition(
        &self,
        actor: &Actor,
        booking_id: &str,
        request: LifecycleRequest,
        driver_id: Option<&str>,
    ) -> EngineResult<TransitionReply> {
        let result = self.apply_transition(actor, booking_id, request, driver_id).await;

        self.metrics.record_transition(match &result {
            Ok(reply) if reply.noop => TransitionOutcome::Noop,
            Ok(_) => TransitionOutcome::Accepted,
            Err(EngineError::Store(_)) => TransitionOutcome::Failed,
            Err(_) => TransitionOutcome::Rejected,
        });
        result
    }

    async fn apply_transition(
        &self,
        actor: &Actor,
        booking_id: &str,
        request: LifecycleRequest,
        driver_id: Option<&str>,
    ) -> EngineResult<TransitionReply> {
        if request != LifecycleRequest::Advance(BookingStatus::Assigned) {
            let applied = self.coordinator.advance(booking_id, request, actor).await?;
            return Ok(TransitionReply { noop: applied.is_noop(), booking: applied.booking });
        }

        let driver_id = match (driver_id, actor.role) {
            (Some(driver_id), _) => driver_id,
            (None, Role::Driver) => actor
                .id
                .as_deref()
                .ok_or_else(|| EngineError::Validation("driver id missing".to_string()))?,
            (None, _) => {
                return Err(EngineError::Validation("assignment must name a driver".to_string()))
            }
        };

        match self.coordinator.try_assign(booking_id, driver_id, actor).await? {
            AssignOutcome::Assigned { booking, replayed } => {
                Ok(TransitionReply { booking, noop: replayed })
            }
            AssignOutcome::AlreadyAssigned { booking_id } => {
                Err(EngineError::AlreadyAssigned { booking_id })
            }
            AssignOutcome::BookingNotPending(rejection) => {
                Err(EngineError::InvalidTransition(rejection))
            }
        }
    }

    // ========================================================================
    // Drivers
    // ========================================================================

    /// Relay a fix to its audience, then write it through to the driver's record
    pub async fn push_location(
        &self,
        driver_id: &str,
        reading: LocationReading,
    ) -> EngineResult<LocationOutcome> {
        let outcome = self.relay.push(driver_id, reading)?;
        if outcome == LocationOutcome::Accepted {
            self.presence.record_location(driver_id, reading).await?;
        }
        Ok(outcome)
    }

    pub async fn set_presence(
        &self,
        driver_id: &str,
        availability: Availability,
    ) -> EngineResult<DriverPresence> {
        let change = self.presence.set_availability(driver_id, availability).await?;
        if change.changed {
            self.publish_presence(&change.presence);
        }
        Ok(change.presence)
    }

    fn publish_presence(&self, presence: &DriverPresence) {
        self.broker.publish(Event::Presence {
            driver_id: presence.driver_id.clone(),
            status: presence.status,
        });
    }

    // ========================================================================
    // Reads
    // ========================================================================

    pub async fn current_state(&self, booking_id: &str) -> EngineResult<BookingSnapshot> {
        self.reconciler.current_state(booking_id).await
    }

    pub async fn current_presence(&self, driver_id: &str) -> EngineResult<DriverPresenceSnapshot> {
        self.reconciler.current_presence(driver_id).await
    }

    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn metrics(&self) -> &EngineMetrics {
        &self.metrics
    }
}
