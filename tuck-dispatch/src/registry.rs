use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tracing::debug;
use tuck_core::{EngineError, EngineResult};
use tuck_shared::{Outbound, PresenceStatus, Role};

pub type SubscriptionId = u64;

/// Which subscribers an event is addressed to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selector<'a> {
    AllAdmins,
    /// The customer who owns a booking
    Customer(&'a str),
    /// The driver assigned to a booking
    Driver(&'a str),
    /// Drivers currently `online` (not busy, not offline); new-booking broadcast only
    OnlineDrivers,
}

/// One live connection's identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub role: Role,
    pub owner_id: Option<String>,
}

/// A subscriber to deliver to: its handle plus a clone of its outbound queue
#[derive(Debug, Clone)]
pub struct Target {
    pub id: SubscriptionId,
    pub outbox: mpsc::Sender<Outbound>,
}

struct Entry {
    subscription: Subscription,
    outbox: mpsc::Sender<Outbound>,
}

/// The set of live connections, safe under concurrent register, unregister and lookup.
///
/// Also mirrors each driver's presence status so the new-booking broadcast can find online
/// drivers without a store read.
pub struct Registry {
    next_id: AtomicU64,
    entries: DashMap<SubscriptionId, Entry>,
    driver_status: DashMap<String, PresenceStatus>,
    buffer: usize,
}

impl Registry {
    /// `buffer` is each subscription's outbound queue depth
    pub fn new(buffer: usize) -> Self {
        Self {
            next_id: AtomicU64::new(1),
            entries: DashMap::new(),
            driver_status: DashMap::new(),
            buffer: buffer.max(1),
        }
    }

    /// Add a connection. Customers and drivers must name who they are; admins need not.
    pub fn register(
        &self,
        role: Role,
        owner_id: Option<String>,
    ) -> EngineResult<(Subscription, mpsc::Receiver<Outbound>)> {
        let owner_id = owner_id.filter(|id| !id.trim().is_empty());
        if role != Role::Admin && owner_id.is_none() {
            return Err(EngineError::Validation(format!("a {} must register with an owner id", role)));
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (outbox, inbox) = mpsc::channel(self.buffer);
        let subscription = Subscription { id, role, owner_id };
        self.entries.insert(id, Entry { subscription: subscription.clone(), outbox });
        debug!("Registered subscription {} as {}", id, role);
        Ok((subscription, inbox))
    }

    /// Remove a connection. Unknown handles are ignored, so teardown may run twice.
    pub fn unregister(&self, id: SubscriptionId) -> Option<Subscription> {
        self.entries.remove(&id).map(|(_, entry)| entry.subscription)
    }

    pub fn subscribers_for(&self, selector: Selector<'_>) -> Vec<Target> {
        self.entries
            .iter()
            .filter(|entry| self.selects(selector, &entry.subscription))
            .map(|entry| Target { id: entry.subscription.id, outbox: entry.outbox.clone() })
            .collect()
    }

    /// Live connections held by one customer or driver
    pub fn connections_of(&self, role: Role, owner_id: &str) -> usize {
        self.entries
            .iter()
            .filter(|entry| {
                entry.subscription.role == role
                    && entry.subscription.owner_id.as_deref() == Some(owner_id)
            })
            .count()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn set_driver_status(&self, driver_id: &str, status: PresenceStatus) {
        self.driver_status.insert(driver_id.to_string(), status);
    }

    pub fn driver_status(&self, driver_id: &str) -> Option<PresenceStatus> {
        self.driver_status.get(driver_id).map(|s| *s)
    }

    fn selects(&self, selector: Selector<'_>, sub: &Subscription) -> bool {
        match selector {
            Selector::AllAdmins => sub.role == Role::Admin,
            Selector::Customer(id) => {
                sub.role == Role::Customer && sub.owner_id.as_deref() == Some(id)
            }
            Selector::Driver(id) => sub.role == Role::Driver && sub.owner_id.as_deref() == Some(id),
            Selector::OnlineDrivers => {
                sub.role == Role::Driver
                    && sub
                        .owner_id
                        .as_deref()
                        .and_then(|id| self.driver_status(id))
                        == Some(PresenceStatus::Online)
            }
        }
    }
}
