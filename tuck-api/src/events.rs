use axum::{
    extract::{Query, State},
    response::sse::{Event, KeepAlive, Sse},
};
use futures_util::{Stream, StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::warn;
use tuck_dispatch::{Engine, SubscriptionId};
use tuck_shared::Role;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    pub role: Role,
    pub owner_id: Option<String>,
}

/// Unregisters the subscription when the SSE stream is dropped
struct Unregister {
    engine: Arc<Engine>,
    id: SubscriptionId,
}

impl Drop for Unregister {
    fn drop(&mut self) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else { return };
        let engine = self.engine.clone();
        let id = self.id;
        runtime.spawn(async move {
            if let Err(e) = engine.unregister(id).await {
                warn!("Unregister of SSE subscription {} failed: {}", id, e);
            }
        });
    }
}

/// Read-only event feed for dashboards: every frame the broker routes to this subscription
pub async fn stream_events(
    State(state): State<AppState>,
    Query(query): Query<EventsQuery>,
) -> Result<Sse<impl Stream<Item = Result<Event, axum::Error>>>, AppError> {
    let connection = state.engine.register(query.role, query.owner_id).await?;
    let guard = Unregister {
        engine: state.engine.clone(),
        id: connection.subscription.id,
    };

    let stream = ReceiverStream::new(connection.outbox).map(move |frame| {
        let _ = &guard;
        Event::default().event(frame.kind()).json_data(&frame)
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}
