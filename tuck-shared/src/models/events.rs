use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};

use crate::models::actor::{Actor, Role};
use crate::models::booking::BookingStatus;

/// An accepted state transition of a booking, the unit of fan-out
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LifecycleEvent {
    pub booking_id: String,
    pub from_status: BookingStatus,
    pub to_status: BookingStatus,
    pub actor_role: Role,
    pub actor_id: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

impl LifecycleEvent {
    pub fn new(booking_id: &str, from_status: BookingStatus, to_status: BookingStatus, actor: &Actor) -> Self {
        Self {
            booking_id: booking_id.to_string(),
            from_status,
            to_status,
            actor_role: actor.role,
            actor_id: actor.id.clone(),
            occurred_at: Utc::now(),
        }
    }
}
