use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};

/// Driver connectivity
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PresenceStatus {
    Online,
    Offline,
    Busy,
}

/// The statuses a driver may request directly; `Busy` is only ever set by assignment
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Availability {
    Online,
    Offline,
}

/// A single position fix from a driver's device
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct LocationReading {
    pub lat: f64,
    pub lng: f64,
    /// Milliseconds since the epoch on the wire
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub recorded_at: DateTime<Utc>,
}

impl LocationReading {
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
    }
}

/// Durable presence record for one driver
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DriverPresence {
    pub driver_id: String,
    pub status: PresenceStatus,
    pub current_booking_id: Option<String>,
    /// At least one of the driver's connections is live
    #[serde(default)]
    pub connected: bool,
    pub last_location: Option<LocationReading>,
    pub updated_at: DateTime<Utc>,
}

impl DriverPresence {
    pub fn new(driver_id: String) -> Self {
        Self {
            driver_id,
            status: PresenceStatus::Offline,
            current_booking_id: None,
            connected: false,
            last_location: None,
            updated_at: Utc::now(),
        }
    }

    pub fn is_busy(&self) -> bool {
        self.current_booking_id.is_some()
    }

    /// Commit the driver to a booking
    pub fn occupy(&mut self, booking_id: &str) {
        self.status = PresenceStatus::Busy;
        self.current_booking_id = Some(booking_id.to_string());
        self.updated_at = Utc::now();
    }

    /// Free the driver once their booking reaches a terminal status. A driver whose
    /// connections all dropped mid-trip lands offline.
    pub fn release(&mut self) {
        self.status = if self.connected {
            PresenceStatus::Online
        } else {
            PresenceStatus::Offline
        };
        self.current_booking_id = None;
        self.updated_at = Utc::now();
    }

    pub fn set_availability(&mut self, availability: Availability) {
        self.status = match availability {
            Availability::Online => PresenceStatus::Online,
            Availability::Offline => PresenceStatus::Offline,
        };
        self.updated_at = Utc::now();
    }

    /// Keep the newer of the stored fix and `reading`. Returns whether it was taken.
    pub fn record_location(&mut self, reading: LocationReading) -> bool {
        if self
            .last_location
            .is_some_and(|stored| stored.recorded_at > reading.recorded_at)
        {
            return false;
        }
        self.last_location = Some(reading);
        self.updated_at = Utc::now();
        true
    }
}
