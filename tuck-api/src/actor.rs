use axum::{extract::FromRequestParts, http::request::Parts};
use tuck_shared::{Actor, Role};

use crate::error::AppError;

pub const ROLE_HEADER: &str = "x-actor-role";
pub const ID_HEADER: &str = "x-actor-id";

/// The caller's claimed identity, from `x-actor-role` and `x-actor-id`. Claims are trusted.
#[derive(Debug, Clone)]
pub struct RequestActor(pub Actor);

impl<S> FromRequestParts<S> for RequestActor
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = |name: &str| {
            parts
                .headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
        };

        let role = match header(ROLE_HEADER) {
            Some("customer") => Role::Customer,
            Some("driver") => Role::Driver,
            Some("admin") => Role::Admin,
            Some(other) => return Err(AppError::Validation(format!("unknown role: {}", other))),
            None => return Err(AppError::Validation(format!("missing {} header", ROLE_HEADER))),
        };

        let actor = match (role, header(ID_HEADER)) {
            (Role::Admin, _) => Actor::admin(),
            (Role::Customer, Some(id)) => Actor::customer(id),
            (Role::Driver, Some(id)) => Actor::driver(id),
            (role, None) => {
                return Err(AppError::Validation(format!("a {} must send {}", role, ID_HEADER)))
            }
        };
        Ok(RequestActor(actor))
    }
}

impl RequestActor {
    /// Drivers may act only on themselves; admins on anyone
    pub fn require_driver_or_admin(&self, driver_id: &str) -> Result<(), AppError> {
        if self.0.role == Role::Admin || self.0.is(Role::Driver, driver_id) {
            Ok(())
        } else {
            Err(AppError::Forbidden(format!("a {} may not act for driver {}", self.0.role, driver_id)))
        }
    }
}
