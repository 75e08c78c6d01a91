use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tuck_core::{EngineError, StoreError};

#[derive(Debug)]
pub enum AppError {
    Engine(EngineError),
    Validation(String),
    Forbidden(String),
    Anyhow(anyhow::Error),
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            AppError::Engine(e) => match e {
                EngineError::Validation(_) | EngineError::NotRegistered => StatusCode::BAD_REQUEST,
                EngineError::NotPermitted { .. } => StatusCode::FORBIDDEN,
                EngineError::UnknownBooking(_) | EngineError::UnknownDriver(_) => StatusCode::NOT_FOUND,
                EngineError::InvalidTransition(_)
                | EngineError::AlreadyAssigned { .. }
                | EngineError::DriverBusy { .. } => StatusCode::CONFLICT,
                EngineError::Store(StoreError::Unavailable(_)) => StatusCode::SERVICE_UNAVAILABLE,
                EngineError::Store(StoreError::Corrupt { .. }) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::Anyhow(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match self {
            AppError::Engine(e) => {
                if e.is_retryable() {
                    tracing::warn!("Request failed, retryable: {}", e);
                } else if matches!(e, EngineError::Store(_)) {
                    tracing::error!("Request failed on a corrupt record: {}", e);
                }
                json!({ "error": e.to_string(), "code": e.code(), "retryable": e.is_retryable() })
            }
            AppError::Validation(msg) => {
                json!({ "error": msg, "code": "validation_failed", "retryable": false })
            }
            AppError::Forbidden(msg) => {
                json!({ "error": msg, "code": "not_permitted", "retryable": false })
            }
            AppError::Anyhow(err) => {
                tracing::error!("Internal Server Error: {}", err);
                json!({ "error": "Internal Server Error", "code": "internal", "retryable": true })
            }
        };

        (status, Json(body)).into_response()
    }
}

impl From<EngineError> for AppError {
    fn from(err: EngineError) -> Self {
        Self::Engine(err)
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::Anyhow(err)
    }
}
