use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};
use uuid::Uuid;
use std::fmt;
use std::str::FromStr;

use crate::models::events::LifecycleEvent;
use crate::pii::Masked;

/// Booking status in the delivery lifecycle
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Pending,
    Assigned,
    Accepted,
    EnRoutePickup,
    ArrivedPickup,
    PickedUp,
    EnRouteDropoff,
    ArrivedDropoff,
    Delivered,
    Completed,
    Cancelled,
}

impl BookingStatus {
    /// The forward sequence, in order. `Cancelled` sits outside it.
    pub const FORWARD: [BookingStatus; 10] = [
        BookingStatus::Pending,
        BookingStatus::Assigned,
        BookingStatus::Accepted,
        BookingStatus::EnRoutePickup,
        BookingStatus::ArrivedPickup,
        BookingStatus::PickedUp,
        BookingStatus::EnRouteDropoff,
        BookingStatus::ArrivedDropoff,
        BookingStatus::Delivered,
        BookingStatus::Completed,
    ];

    pub const ALL: [BookingStatus; 11] = [
        BookingStatus::Pending,
        BookingStatus::Assigned,
        BookingStatus::Accepted,
        BookingStatus::EnRoutePickup,
        BookingStatus::ArrivedPickup,
        BookingStatus::PickedUp,
        BookingStatus::EnRouteDropoff,
        BookingStatus::ArrivedDropoff,
        BookingStatus::Delivered,
        BookingStatus::Completed,
        BookingStatus::Cancelled,
    ];

    /// Index in the forward sequence; `None` for `Cancelled`
    pub fn position(self) -> Option<usize> {
        Self::FORWARD.iter().position(|s| *s == self)
    }

    /// The unique next forward status, if any
    pub fn successor(self) -> Option<BookingStatus> {
        self.position().and_then(|i| Self::FORWARD.get(i + 1).copied())
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, BookingStatus::Completed | BookingStatus::Cancelled)
    }

    pub fn is_cancellable(self) -> bool {
        matches!(self, BookingStatus::Pending | BookingStatus::Assigned)
    }

    /// Forward statuses at or after `Assigned` must carry a driver
    pub fn requires_driver(self) -> bool {
        matches!(self.position(), Some(i) if i >= 1)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Assigned => "assigned",
            BookingStatus::Accepted => "accepted",
            BookingStatus::EnRoutePickup => "en_route_pickup",
            BookingStatus::ArrivedPickup => "arrived_pickup",
            BookingStatus::PickedUp => "picked_up",
            BookingStatus::EnRouteDropoff => "en_route_dropoff",
            BookingStatus::ArrivedDropoff => "arrived_dropoff",
            BookingStatus::Delivered => "delivered",
            BookingStatus::Completed => "completed",
            BookingStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BookingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("unknown booking status: {}", s))
    }
}

/// What an actor asks the state machine to do: move to a named status, or cancel.
///
/// On the wire this is a bare string: `"cancel"` or a status name such as `"picked_up"`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(try_from = "String", into = "String")]
pub enum LifecycleRequest {
    Advance(BookingStatus),
    Cancel,
}

impl LifecycleRequest {
    /// The status this request would land on
    pub fn target(self) -> BookingStatus {
        match self {
            LifecycleRequest::Advance(status) => status,
            LifecycleRequest::Cancel => BookingStatus::Cancelled,
        }
    }
}

impl FromStr for LifecycleRequest {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cancel" | "cancelled" => Ok(LifecycleRequest::Cancel),
            other => other.parse().map(LifecycleRequest::Advance),
        }
    }
}

impl TryFrom<String> for LifecycleRequest {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<LifecycleRequest> for String {
    fn from(req: LifecycleRequest) -> Self {
        req.to_string()
    }
}

impl fmt::Display for LifecycleRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecycleRequest::Advance(status) => f.write_str(status.as_str()),
            LifecycleRequest::Cancel => f.write_str("cancel"),
        }
    }
}

/// Why the state machine refused a request
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Rejection {
    SkippedStep { from: BookingStatus, requested: LifecycleRequest },
    Backward { from: BookingStatus, requested: LifecycleRequest },
    CancelNotAllowed { from: BookingStatus },
    Terminal { from: BookingStatus, requested: LifecycleRequest },
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::SkippedStep { from, requested } => {
                write!(f, "cannot move from {} to {}: steps may not be skipped", from, requested)
            }
            Rejection::Backward { from, requested } => {
                write!(f, "cannot move from {} back to {}", from, requested)
            }
            Rejection::CancelNotAllowed { from } => {
                write!(f, "booking can no longer be cancelled once {}", from)
            }
            Rejection::Terminal { from, requested } => {
                write!(f, "booking is {} and cannot move to {}", from, requested)
            }
        }
    }
}

/// A customer transport request tracked through the delivery lifecycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    pub id: String,
    pub customer_id: String,
    pub driver_id: Option<String>,
    pub pickup: String,
    pub dropoff: String,
    pub vehicle_type: String,
    /// Minor currency units
    pub amount_minor: u64,
    pub customer_notes: Option<String>,
    pub customer_phone: Option<Masked<String>>,
    pub status: BookingStatus,
    pub created_at: DateTime<Utc>,
    pub last_transition_at: DateTime<Utc>,
    pub assigned_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub last_event: Option<LifecycleEvent>,
}

impl Booking {
    pub fn new(customer_id: String, request: NewBooking) -> Self {
        Self::with_id(Uuid::new_v4().to_string(), customer_id, request)
    }

    pub fn with_id(id: String, customer_id: String, request: NewBooking) -> Self {
        let now = Utc::now();
        Self {
            id,
            customer_id,
            driver_id: None,
            pickup: request.pickup,
            dropoff: request.dropoff,
            vehicle_type: request.vehicle_type,
            amount_minor: request.amount_minor,
            customer_notes: request.customer_notes,
            customer_phone: request.customer_phone,
            status: BookingStatus::Pending,
            created_at: now,
            last_transition_at: now,
            assigned_at: None,
            completed_at: None,
            last_event: None,
        }
    }

    /// Apply an accepted event to the record
    pub fn apply(&mut self, event: &LifecycleEvent) {
        self.status = event.to_status;
        self.last_transition_at = event.occurred_at;
        match event.to_status {
            BookingStatus::Assigned => self.assigned_at = Some(event.occurred_at),
            BookingStatus::Completed => self.completed_at = Some(event.occurred_at),
            _ => {}
        }
        self.last_event = Some(event.clone());
    }

    /// True while a driver is committed to this booking
    pub fn is_active(&self) -> bool {
        self.driver_id.is_some() && self.status.requires_driver() && !self.status.is_terminal()
    }
}

/// Creation payload sent by the customer-facing collaborator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewBooking {
    pub pickup: String,
    pub dropoff: String,
    #[serde(default = "default_vehicle_type")]
    pub vehicle_type: String,
    pub amount_minor: u64,
    #[serde(default)]
    pub customer_notes: Option<String>,
    #[serde(default)]
    pub customer_phone: Option<Masked<String>>,
}

fn default_vehicle_type() -> String {
    "mini_truck".to_string()
}

/// Listing filter for dashboard and history reads
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BookingFilter {
    pub customer_id: Option<String>,
    pub driver_id: Option<String>,
    pub status: Option<BookingStatus>,
}

impl BookingFilter {
    pub fn matches(&self, booking: &Booking) -> bool {
        self.customer_id.as_deref().map_or(true, |c| booking.customer_id == c)
            && self.driver_id.as_deref().map_or(true, |d| booking.driver_id.as_deref() == Some(d))
            && self.status.map_or(true, |s| booking.status == s)
    }
}
