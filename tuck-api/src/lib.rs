use axum::{
    http::{header, HeaderName, Method},
    routing::get,
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod actor;
pub mod bookings;
pub mod drivers;
pub mod error;
pub mod events;
pub mod ops;
pub mod socket;
pub mod state;

pub use state::AppState;

pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            HeaderName::from_static(actor::ROLE_HEADER),
            HeaderName::from_static(actor::ID_HEADER),
        ]);

    Router::new()
        .merge(bookings::routes())
        .merge(drivers::routes())
        .merge(ops::routes())
        .route("/v1/ws", get(socket::ws_handler))
        .route("/v1/events", get(events::stream_events))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
