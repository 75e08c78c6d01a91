use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tuck_shared::{Booking, BookingSnapshot, BookingStatus, LifecycleRequest, NewBooking};

use crate::actor::RequestActor;
use crate::error::AppError;
use crate::state::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub customer_id: Option<String>,
    pub driver_id: Option<String>,
    pub status: Option<BookingStatus>,
}

#[derive(Debug, Deserialize)]
pub struct TransitionRequest {
    pub event: LifecycleRequest,
    #[serde(default)]
    pub driver_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TransitionResponse {
    pub booking: Booking,
    pub noop: bool,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/bookings", post(create_booking).get(list_bookings))
        .route("/v1/bookings/{id}", get(get_booking))
        .route("/v1/bookings/{id}/transitions", post(request_transition))
}

// ============================================================================
// Handlers
// ============================================================================

pub async fn create_booking(
    State(state): State<AppState>,
    RequestActor(actor): RequestActor,
    Json(req): Json<NewBooking>,
) -> Result<(StatusCode, Json<Booking>), AppError> {
    let booking = state.engine.create_booking(&actor, req).await?;
    Ok((StatusCode::CREATED, Json(booking)))
}

/// Customer history, driver history, the pending queue, or everything
pub async fn list_bookings(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<Booking>>, AppError> {
    let reconciler = state.engine.reconciler();

    // 1. Pick the narrowest listing
    let mut bookings = match (&query.customer_id, &query.driver_id, query.status) {
        (Some(customer_id), _, _) => reconciler.bookings_for_customer(customer_id).await?,
        (None, Some(driver_id), _) => reconciler.bookings_for_driver(driver_id).await?,
        (None, None, Some(BookingStatus::Pending)) => reconciler.pending_bookings().await?,
        (None, None, _) => reconciler.all_bookings().await?,
    };

    // 2. Apply the remaining filters
    if let (Some(_), Some(driver_id)) = (&query.customer_id, &query.driver_id) {
        bookings.retain(|b| b.driver_id.as_deref() == Some(driver_id.as_str()));
    }
    if let Some(status) = query.status {
        bookings.retain(|b| b.status == status);
    }

    Ok(Json(bookings))
}

/// Reconciliation read for one booking
pub async fn get_booking(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<BookingSnapshot>, AppError> {
    Ok(Json(state.engine.current_state(&id).await?))
}

pub async fn request_transition(
    State(state): State<AppState>,
    RequestActor(actor): RequestActor,
    Path(id): Path<String>,
    Json(req): Json<TransitionRequest>,
) -> Result<Json<TransitionResponse>, AppError> {
    let reply = state
        .engine
        .request_transition(&actor, &id, req.event, req.driver_id.as_deref())
        .await?;
    Ok(Json(TransitionResponse { booking: reply.booking, noop: reply.noop }))
}
