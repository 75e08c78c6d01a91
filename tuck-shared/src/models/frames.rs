use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};

use crate::models::actor::Role;
use crate::models::booking::{Booking, BookingStatus, LifecycleRequest, NewBooking};
use crate::models::presence::{Availability, LocationReading, PresenceStatus};

// ============================================================================
// Reconciliation Snapshots
// ============================================================================

/// Authoritative view of one booking at `as_of`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingSnapshot {
    #[serde(flatten)]
    pub booking: Booking,
    pub as_of: DateTime<Utc>,
}

/// Authoritative view of one driver at `as_of`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DriverPresenceSnapshot {
    pub driver_id: String,
    pub status: PresenceStatus,
    pub current_booking_id: Option<String>,
    pub location: Option<LocationReading>,
    pub as_of: DateTime<Utc>,
}

// ============================================================================
// Connection Frames
// ============================================================================

/// Frames a client sends over its real-time connection
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Inbound {
    Register {
        role: Role,
        #[serde(default)]
        owner_id: Option<String>,
    },
    CreateBooking {
        booking: NewBooking,
    },
    RequestTransition {
        booking_id: String,
        event: LifecycleRequest,
        /// Only admins name a driver; a driver requesting `assigned` assigns themself
        #[serde(default)]
        driver_id: Option<String>,
    },
    PushLocation {
        location: LocationReading,
    },
    SetPresence {
        status: Availability,
    },
    ReconcileBooking {
        booking_id: String,
    },
    ReconcilePresence {
        driver_id: String,
    },
}

/// Frames the engine pushes to a client: fan-out events and direct replies
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Outbound {
    LifecycleChanged {
        booking_id: String,
        status: BookingStatus,
        booking: Booking,
    },
    NewBookingAvailable {
        booking_id: String,
        booking: Booking,
    },
    LocationChanged {
        driver_id: String,
        booking_id: Option<String>,
        location: LocationReading,
    },
    PresenceChanged {
        driver_id: String,
        status: PresenceStatus,
    },
    Registered {
        subscription_id: u64,
        role: Role,
    },
    BookingCreated {
        booking: Booking,
    },
    TransitionAccepted {
        booking: Booking,
        noop: bool,
    },
    TransitionRejected {
        booking_id: String,
        code: String,
        message: String,
        retryable: bool,
    },
    LocationAccepted {
        driver_id: String,
        stale: bool,
    },
    PresenceUpdated {
        driver_id: String,
        status: PresenceStatus,
    },
    BookingSnapshot {
        snapshot: BookingSnapshot,
    },
    PresenceSnapshot {
        snapshot: DriverPresenceSnapshot,
    },
    Error {
        code: String,
        message: String,
        retryable: bool,
    },
}

impl Outbound {
    /// Wire name of the frame, used for SSE event names and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            Outbound::LifecycleChanged { .. } => "lifecycleChanged",
            Outbound::NewBookingAvailable { .. } => "newBookingAvailable",
            Outbound::LocationChanged { .. } => "locationChanged",
            Outbound::PresenceChanged { .. } => "presenceChanged",
            Outbound::Registered { .. } => "registered",
            Outbound::BookingCreated { .. } => "bookingCreated",
            Outbound::TransitionAccepted { .. } => "transitionAccepted",
            Outbound::TransitionRejected { .. } => "transitionRejected",
            Outbound::LocationAccepted { .. } => "locationAccepted",
            Outbound::PresenceUpdated { .. } => "presenceUpdated",
            Outbound::BookingSnapshot { .. } => "bookingSnapshot",
            Outbound::PresenceSnapshot { .. } => "presenceSnapshot",
            Outbound::Error { .. } => "error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inbound_transition_frame() {
        let frame: Inbound = serde_json::from_str(
            r#"{"type":"requestTransition","booking_id":"bk-1","event":"accepted"}"#,
        )
        .unwrap();

        match frame {
            Inbound::RequestTransition { booking_id, event, driver_id } => {
                assert_eq!(booking_id, "bk-1");
                assert_eq!(event, LifecycleRequest::Advance(BookingStatus::Accepted));
                assert!(driver_id.is_none());
            }
            other => panic!("unexpected frame: {:?}", other),
        }
    }

    #[test]
    fn test_outbound_tag_matches_kind() {
        let frame = Outbound::PresenceChanged {
            driver_id: "drv-1".to_string(),
            status: PresenceStatus::Busy,
        };
        let value = serde_json::to_value(&frame).unwrap();
        assert_eq!(value["type"], frame.kind());
        assert_eq!(value["status"], "busy");
    }
}
