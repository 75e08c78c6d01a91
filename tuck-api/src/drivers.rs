use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tuck_dispatch::LocationOutcome;
use tuck_shared::{Availability, Booking, DriverPresence, DriverPresenceSnapshot, LocationReading};

use crate::actor::RequestActor;
use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct PresenceRequest {
    pub status: Availability,
}

#[derive(Debug, Serialize)]
pub struct LocationResponse {
    pub driver_id: String,
    pub stale: bool,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/drivers/{id}/presence", get(get_presence).put(set_presence))
        .route("/v1/drivers/{id}/location", post(push_location))
        .route("/v1/drivers/{id}/active-booking", get(active_booking))
}

/// Reconciliation read for one driver
pub async fn get_presence(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DriverPresenceSnapshot>, AppError> {
    Ok(Json(state.engine.current_presence(&id).await?))
}

pub async fn set_presence(
    State(state): State<AppState>,
    actor: RequestActor,
    Path(id): Path<String>,
    Json(req): Json<PresenceRequest>,
) -> Result<Json<DriverPresence>, AppError> {
    actor.require_driver_or_admin(&id)?;
    Ok(Json(state.engine.set_presence(&id, req.status).await?))
}

pub async fn push_location(
    State(state): State<AppState>,
    actor: RequestActor,
    Path(id): Path<String>,
    Json(reading): Json<LocationReading>,
) -> Result<Json<LocationResponse>, AppError> {
    actor.require_driver_or_admin(&id)?;
    let outcome = state.engine.push_location(&id, reading).await?;
    Ok(Json(LocationResponse { driver_id: id, stale: outcome == LocationOutcome::Stale }))
}

pub async fn active_booking(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Option<Booking>>, AppError> {
    Ok(Json(state.engine.reconciler().active_booking_for_driver(&id).await?))
}
