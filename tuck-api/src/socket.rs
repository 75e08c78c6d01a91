use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures_util::{stream::SplitSink, SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use tuck_core::{EngineError, EngineResult};
use tuck_dispatch::{Engine, LocationOutcome, Subscription};
use tuck_shared::{Actor, Inbound, Outbound, Role};

use crate::state::AppState;

/// Direct replies queued per connection, separate from the broker's event queue
const REPLY_BUFFER: usize = 32;

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| serve_socket(socket, state.engine))
}

/// One task reads frames and runs them in order; a writer task drains the reply queue and,
/// once registered, the subscription's event queue into the socket.
async fn serve_socket(socket: WebSocket, engine: Arc<Engine>) {
    let (sink, mut stream) = socket.split();
    let (reply_tx, reply_rx) = mpsc::channel(REPLY_BUFFER);
    let (attach_tx, attach_rx) = mpsc::channel(1);
    let writer = tokio::spawn(write_frames(sink, reply_rx, attach_rx));

    let mut session = Session::new(engine);

    while let Some(message) = stream.next().await {
        let text = match message {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                debug!("Socket read failed: {}", e);
                break;
            }
        };

        let reply = session.handle_text(text.as_str()).await;
        if let Some(outbox) = session.take_outbox() {
            let _ = attach_tx.send(outbox).await;
        }
        if reply_tx.send(reply).await.is_err() {
            break;
        }
    }

    session.close().await;
    writer.abort();
}

async fn write_frames(
    mut sink: SplitSink<WebSocket, Message>,
    mut replies: mpsc::Receiver<Outbound>,
    mut attach: mpsc::Receiver<mpsc::Receiver<Outbound>>,
) {
    let mut events: Option<mpsc::Receiver<Outbound>> = None;

    loop {
        let frame = tokio::select! {
            Some(frame) = replies.recv() => frame,
            Some(outbox) = attach.recv() => {
                events = Some(outbox);
                continue;
            }
            Some(frame) = next_event(&mut events) => frame,
            else => break,
        };

        let text = match serde_json::to_string(&frame) {
            Ok(text) => text,
            Err(e) => {
                warn!("Could not encode {} frame: {}", frame.kind(), e);
                continue;
            }
        };
        if sink.send(Message::Text(text.into())).await.is_err() {
            break;
        }
    }
}

async fn next_event(events: &mut Option<mpsc::Receiver<Outbound>>) -> Option<Outbound> {
    match events {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

// ============================================================================
// Session
// ============================================================================

/// Per-connection protocol state: who registered, and the operations they may send
pub struct Session {
    engine: Arc<Engine>,
    subscription: Option<Subscription>,
    outbox: Option<mpsc::Receiver<Outbound>>,
}

impl Session {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self {
            engine,
            subscription: None,
            outbox: None,
        }
    }

    pub fn subscription(&self) -> Option<&Subscription> {
        self.subscription.as_ref()
    }

    /// The event queue handed out by a successful `register`, once
    pub fn take_outbox(&mut self) -> Option<mpsc::Receiver<Outbound>> {
        self.outbox.take()
    }

    pub async fn handle_text(&mut self, text: &str) -> Outbound {
        match serde_json::from_str::<Inbound>(text) {
            Ok(frame) => self.handle(frame).await,
            Err(e) => EngineError::Validation(format!("malformed frame: {}", e)).to_reply(None),
        }
    }

    /// Run one inbound frame. Failures become a reply to this connection only.
    pub async fn handle(&mut self, frame: Inbound) -> Outbound {
        let booking_id = match &frame {
            Inbound::RequestTransition { booking_id, .. } => Some(booking_id.clone()),
            _ => None,
        };
        match self.dispatch(frame).await {
            Ok(reply) => reply,
            Err(e) => {
                debug!("Frame failed with {}: {}", e.code(), e);
                e.to_reply(booking_id.as_deref())
            }
        }
    }

    async fn dispatch(&mut self, frame: Inbound) -> EngineResult<Outbound> {
        match frame {
            Inbound::Register { role, owner_id } => {
                if self.subscription.is_some() {
                    return Err(EngineError::Validation("connection is already registered".to_string()));
                }
                let connection = self.engine.register(role, owner_id).await?;
                let reply = Outbound::Registered {
                    subscription_id: connection.subscription.id,
                    role,
                };
                self.subscription = Some(connection.subscription);
                self.outbox = Some(connection.outbox);
                Ok(reply)
            }
            Inbound::CreateBooking { booking } => {
                let actor = self.actor()?;
                let booking = self.engine.create_booking(&actor, booking).await?;
                Ok(Outbound::BookingCreated { booking })
            }
            Inbound::RequestTransition { booking_id, event, driver_id } => {
                let actor = self.actor()?;
                let reply = self
                    .engine
                    .request_transition(&actor, &booking_id, event, driver_id.as_deref())
                    .await?;
                Ok(Outbound::TransitionAccepted { booking: reply.booking, noop: reply.noop })
            }
            Inbound::PushLocation { location } => {
                let driver_id = self.driver_id()?;
                let outcome = self.engine.push_location(&driver_id, location).await?;
                Ok(Outbound::LocationAccepted { driver_id, stale: outcome == LocationOutcome::Stale })
            }
            Inbound::SetPresence { status } => {
                let driver_id = self.driver_id()?;
                let presence = self.engine.set_presence(&driver_id, status).await?;
                Ok(Outbound::PresenceUpdated { driver_id, status: presence.status })
            }
            Inbound::ReconcileBooking { booking_id } => {
                self.actor()?;
                let snapshot = self.engine.current_state(&booking_id).await?;
                Ok(Outbound::BookingSnapshot { snapshot })
            }
            Inbound::ReconcilePresence { driver_id } => {
                self.actor()?;
                let snapshot = self.engine.current_presence(&driver_id).await?;
                Ok(Outbound::PresenceSnapshot { snapshot })
            }
        }
    }

    fn actor(&self) -> EngineResult<Actor> {
        let subscription = self.subscription.as_ref().ok_or(EngineError::NotRegistered)?;
        Ok(Actor { role: subscription.role, id: subscription.owner_id.clone() })
    }

    fn driver_id(&self) -> EngineResult<String> {
        let actor = self.actor()?;
        match (actor.role, actor.id) {
            (Role::Driver, Some(id)) => Ok(id),
            (role, _) => Err(EngineError::Validation(format!("a {} has no driver presence", role))),
        }
    }

    /// Unregister, if this connection ever registered
    pub async fn close(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            if let Err(e) = self.engine.unregister(subscription.id).await {
                warn!("Unregister of subscription {} failed: {}", subscription.id, e);
            }
            info!("Socket for subscription {} closed", subscription.id);
        }
    }
}
