use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};
use tuck_core::LifecycleSink;
use tuck_shared::{Booking, DriverPresence, LifecycleEvent, LocationReading, Outbound, PresenceStatus};

use crate::metrics::EngineMetrics;
use crate::registry::{Registry, Selector, Target};

/// Something worth telling subscribers about
#[derive(Debug, Clone)]
pub enum Event {
    Lifecycle { booking: Booking, event: LifecycleEvent },
    NewBooking { booking: Booking },
    Location { driver_id: String, reading: LocationReading },
    Presence { driver_id: String, status: PresenceStatus },
}

impl Event {
    pub fn kind(&self) -> &'static str {
        match self {
            Event::Lifecycle { .. } => "lifecycle",
            Event::NewBooking { .. } => "newBookingBroadcast",
            Event::Location { .. } => "locationUpdate",
            Event::Presence { .. } => "presenceChanged",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub delivered: usize,
    pub failed: usize,
}

/// The active booking a busy driver's location belongs to
#[derive(Debug, Clone, PartialEq, Eq)]
struct Route {
    booking_id: String,
    customer_id: String,
}

/// Fans events out to the subscribers they concern.
///
/// Delivery is a non-blocking `try_send` into each subscriber's bounded queue. A full or
/// closed queue is a delivery failure: counted, logged, never surfaced to the publisher.
pub struct EventBroker {
    registry: Arc<Registry>,
    metrics: Arc<EngineMetrics>,
    routes: DashMap<String, Route>,
}

impl EventBroker {
    pub fn new(registry: Arc<Registry>, metrics: Arc<EngineMetrics>) -> Self {
        Self {
            registry,
            metrics,
            routes: DashMap::new(),
        }
    }

    pub fn publish(&self, event: Event) -> DeliveryReport {
        let kind = event.kind();
        match event {
            Event::Lifecycle { booking, event } => {
                let targets = {
                    let mut selectors = vec![Selector::AllAdmins, Selector::Customer(&booking.customer_id)];
                    if let Some(driver_id) = booking.driver_id.as_deref() {
                        selectors.push(Selector::Driver(driver_id));
                    }
                    self.targets(&selectors)
                };
                let frame = Outbound::LifecycleChanged {
                    booking_id: event.booking_id,
                    status: event.to_status,
                    booking,
                };
                self.deliver(kind, targets, frame)
            }
            Event::NewBooking { booking } => {
                let targets = self.targets(&[Selector::AllAdmins, Selector::OnlineDrivers]);
                let frame = Outbound::NewBookingAvailable { booking_id: booking.id.clone(), booking };
                self.deliver(kind, targets, frame)
            }
            Event::Location { driver_id, reading } => {
                let route = self.routes.get(&driver_id).map(|r| r.clone());
                let targets = match route.as_ref() {
                    Some(route) => self.targets(&[Selector::AllAdmins, Selector::Customer(&route.customer_id)]),
                    None => self.targets(&[Selector::AllAdmins]),
                };
                let frame = Outbound::LocationChanged {
                    driver_id,
                    booking_id: route.map(|r| r.booking_id),
                    location: reading,
                };
                self.deliver(kind, targets, frame)
            }
            Event::Presence { driver_id, status } => {
                self.registry.set_driver_status(&driver_id, status);
                let targets = self.targets(&[Selector::AllAdmins]);
                self.deliver(kind, targets, Outbound::PresenceChanged { driver_id, status })
            }
        }
    }

    /// Keep the driver -> active booking routing current for location fan-out
    pub fn track_route(&self, booking: &Booking) {
        let Some(driver_id) = booking.driver_id.as_deref() else { return };
        if booking.is_active() {
            self.routes.insert(
                driver_id.to_string(),
                Route {
                    booking_id: booking.id.clone(),
                    customer_id: booking.customer_id.clone(),
                },
            );
        } else {
            self.routes.remove_if(driver_id, |_, route| route.booking_id == booking.id);
        }
    }

    /// Booking whose customer currently receives this driver's location
    pub fn routed_booking(&self, driver_id: &str) -> Option<String> {
        self.routes.get(driver_id).map(|r| r.booking_id.clone())
    }

    /// Union of the selectors' subscribers, each at most once
    fn targets(&self, selectors: &[Selector<'_>]) -> Vec<Target> {
        let mut seen = HashSet::new();
        selectors
            .iter()
            .flat_map(|selector| self.registry.subscribers_for(*selector))
            .filter(|target| seen.insert(target.id))
            .collect()
    }

    fn deliver(&self, kind: &str, targets: Vec<Target>, frame: Outbound) -> DeliveryReport {
        let mut report = DeliveryReport::default();
        for target in targets {
            match target.outbox.try_send(frame.clone()) {
                Ok(()) => report.delivered += 1,
                Err(TrySendError::Full(_)) => {
                    warn!("Subscriber {} is not keeping up, dropped {}", target.id, kind);
                    report.failed += 1;
                }
                Err(TrySendError::Closed(_)) => {
                    debug!("Subscriber {} went away before {} was delivered", target.id, kind);
                    report.failed += 1;
                }
            }
        }
        self.metrics.record_deliveries(report.delivered, report.failed);
        debug!("Published {}: {} delivered, {} failed", kind, report.delivered, report.failed);
        report
    }
}

impl LifecycleSink for EventBroker {
    fn lifecycle_committed(
        &self,
        booking: &Booking,
        event: &LifecycleEvent,
        presence: Option<&DriverPresence>,
    ) {
        self.track_route(booking);
        self.publish(Event::Lifecycle { booking: booking.clone(), event: event.clone() });
        if let Some(presence) = presence {
            self.publish(Event::Presence {
                driver_id: presence.driver_id.clone(),
                status: presence.status,
            });
        }
    }
}
