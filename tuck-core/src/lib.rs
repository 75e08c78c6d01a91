pub mod repository;
pub mod sink;

pub use repository::{RecordStore, StoreResult};
pub use sink::{LifecycleSink, NoopSink};

use tuck_shared::{LifecycleRequest, Outbound, Rejection, Role};

/// Failure talking to the external record store
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Record store unavailable: {0}")]
    Unavailable(String),
    #[error("Corrupt record {key}: {source}")]
    Corrupt {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Invalid transition: {0}")]
    InvalidTransition(Rejection),
    #[error("Booking {booking_id} is already assigned to another driver")]
    AlreadyAssigned { booking_id: String },
    #[error("Booking not found: {0}")]
    UnknownBooking(String),
    #[error("Driver not found: {0}")]
    UnknownDriver(String),
    #[error("Driver {driver_id} is busy with booking {booking_id}")]
    DriverBusy { driver_id: String, booking_id: String },
    #[error("A {role} may not request {request}")]
    NotPermitted { role: Role, request: LifecycleRequest },
    #[error("Connection has not registered")]
    NotRegistered,
    #[error("Validation failed: {0}")]
    Validation(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl EngineError {
    /// Stable machine-readable code sent back to the requesting actor
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::InvalidTransition(_) => "invalid_transition",
            EngineError::AlreadyAssigned { .. } => "already_assigned",
            EngineError::UnknownBooking(_) => "unknown_booking",
            EngineError::UnknownDriver(_) => "unknown_driver",
            EngineError::DriverBusy { .. } => "driver_busy",
            EngineError::NotPermitted { .. } => "not_permitted",
            EngineError::NotRegistered => "not_registered",
            EngineError::Validation(_) => "validation_failed",
            EngineError::Store(StoreError::Unavailable(_)) => "store_unavailable",
            EngineError::Store(StoreError::Corrupt { .. }) => "store_corrupt",
        }
    }

    /// Only an unreachable store is worth retrying unchanged; a corrupt record stays corrupt
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::Store(StoreError::Unavailable(_)))
    }

    /// Reply frame for the actor whose request failed. Never broadcast.
    pub fn to_reply(&self, booking_id: Option<&str>) -> Outbound {
        match booking_id {
            Some(booking_id) => Outbound::TransitionRejected {
                booking_id: booking_id.to_string(),
                code: self.code().to_string(),
                message: self.to_string(),
                retryable: self.is_retryable(),
            },
            None => Outbound::Error {
                code: self.code().to_string(),
                message: self.to_string(),
                retryable: self.is_retryable(),
            },
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
