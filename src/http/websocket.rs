//! Real-time WebSocket endpoint.
//!
//! # Protocol
//! ```text
//! GET /api/v1/ws?token=<session token>
//!
//! client → server  {"type":"subscribe","lead_id":"…"}
//!                  {"type":"unsubscribe","lead_id":"…"}
//!                  {"type":"ping"}
//! server → client  event envelopes {"type":"lead.updated",…}
//!                  {"type":"subscribed"|"unsubscribed","room":…}
//!                  {"type":"pong"} {"type":"error","message":…}
//!                  {"type":"resync","room":…,"missed":n}
//! ```
//!
//! Every socket joins its tenant room on connect. Each joined room gets a
//! forwarder task feeding one outbound queue; an event reaching the socket
//! through both the tenant and a lead room is sent once.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::Response;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use crate::auth::AuthContext;
use crate::error::CrmError;
use crate::http::middleware::auth::bearer_token;
use crate::http::request::ApiQuery;
use crate::http::response::{ApiError, ApiResult};
use crate::http::server::AppState;
use crate::model::LeadId;
use crate::realtime::{CrmEvent, Hub, Room};
use crate::security::ConnectionGuard;

const OUTBOUND_BUFFER: usize = 64;
/// Recently sent events remembered for de-duplication.
const RECENT_EVENTS: usize = 64;
const SESSION_RECHECK: Duration = Duration::from_secs(30);

#[derive(Debug, Default, Deserialize)]
pub struct WsQuery {
    pub token: Option<String>,
}

#[derive(Debug, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClientFrame {
    Subscribe { lead_id: LeadId },
    Unsubscribe { lead_id: LeadId },
    Ping,
}

enum Outbound {
    Event(Arc<CrmEvent>),
    Control(Value),
}

fn room_json(room: Room) -> Value {
    match room {
        Room::Tenant(id) => json!({ "kind": "tenant", "id": id }),
        Room::Lead(id) => json!({ "kind": "lead", "id": id }),
    }
}

fn error_frame(message: impl Into<String>) -> Value {
    json!({ "type": "error", "message": message.into() })
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<WsQuery>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let token = query
        .token
        .as_deref()
        .or_else(|| bearer_token(&headers))
        .ok_or_else(|| CrmError::Unauthorized("missing session token".to_string()))?
        .to_string();
    let ctx = state.crm.users.resolve_session(&token)?;

    let limit = state.config.load().realtime.max_connections_per_user;
    let guard = state
        .connections
        .try_acquire(ctx.user_id, limit)
        .ok_or_else(|| {
            ApiError::new(
                StatusCode::TOO_MANY_REQUESTS,
                "too_many_connections",
                format!("at most {limit} concurrent connections per user"),
            )
        })?;

    tracing::info!(user = %ctx.user_id, tenant = %ctx.tenant_id, "WebSocket connected");
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, ctx, token, guard)))
}

/// Rooms joined by one socket.
struct Subscriptions {
    hub: Hub,
    tx: mpsc::Sender<Outbound>,
    rooms: HashMap<Room, JoinHandle<()>>,
}

impl Subscriptions {
    fn join(&mut self, room: Room) -> bool {
        if self.rooms.contains_key(&room) {
            return false;
        }
        let rx = self.hub.subscribe(room);
        self.rooms
            .insert(room, spawn_forwarder(rx, room, self.tx.clone()));
        true
    }

    fn leave(&mut self, room: Room) -> bool {
        match self.rooms.remove(&room) {
            Some(task) => {
                task.abort();
                true
            }
            None => false,
        }
    }
}

impl Drop for Subscriptions {
    fn drop(&mut self) {
        for (_, task) in self.rooms.drain() {
            task.abort();
        }
    }
}

fn spawn_forwarder(
    mut rx: broadcast::Receiver<Arc<CrmEvent>>,
    room: Room,
    tx: mpsc::Sender<Outbound>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let outbound = match rx.recv().await {
                Ok(event) => Outbound::Event(event),
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::warn!(?room, missed, "Subscriber lagged, asking client to resync");
                    Outbound::Control(json!({
                        "type": "resync",
                        "room": room_json(room),
                        "missed": missed,
                    }))
                }
                Err(broadcast::error::RecvError::Closed) => break,
            };
            if tx.send(outbound).await.is_err() {
                break;
            }
        }
    })
}

/// Apply one client frame and return the reply.
fn handle_frame(state: &AppState, ctx: &AuthContext, subs: &mut Subscriptions, text: &str) -> Value {
    let frame: ClientFrame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(e) => return error_frame(format!("invalid frame: {e}")),
    };

    match frame {
        ClientFrame::Ping => json!({ "type": "pong" }),
        ClientFrame::Subscribe { lead_id } => {
            if let Err(e) = state.crm.leads.get_lead(ctx, lead_id) {
                return error_frame(e.to_string());
            }
            let room = Room::Lead(lead_id);
            subs.join(room);
            json!({ "type": "subscribed", "room": room_json(room) })
        }
        ClientFrame::Unsubscribe { lead_id } => {
            let room = Room::Lead(lead_id);
            subs.leave(room);
            json!({ "type": "unsubscribed", "room": room_json(room) })
        }
    }
}

async fn handle_socket(
    socket: WebSocket,
    state: AppState,
    ctx: AuthContext,
    token: String,
    _guard: ConnectionGuard,
) {
    let (mut sink, mut stream) = socket.split();
    let (tx, mut outbound) = mpsc::channel(OUTBOUND_BUFFER);
    let mut subs = Subscriptions {
        hub: state.crm.hub.clone(),
        tx,
        rooms: HashMap::new(),
    };
    let tenant_room = Room::Tenant(ctx.tenant_id);
    subs.join(tenant_room);

    let welcome = json!({ "type": "subscribed", "room": room_json(tenant_room) });
    if sink.send(Message::Text(welcome.to_string().into())).await.is_err() {
        return;
    }

    let mut shutdown = state.shutdown.subscribe();
    let mut recheck = tokio::time::interval(SESSION_RECHECK);
    recheck.tick().await;
    let mut recent: VecDeque<Arc<CrmEvent>> = VecDeque::with_capacity(RECENT_EVENTS);

    loop {
        let reply = tokio::select! {
            Some(out) = outbound.recv() => match out {
                Outbound::Event(event) => {
                    if recent.iter().any(|seen| Arc::ptr_eq(seen, &event)) {
                        continue;
                    }
                    if recent.len() == RECENT_EVENTS {
                        recent.pop_front();
                    }
                    recent.push_back(event.clone());
                    match serde_json::to_string(event.as_ref()) {
                        Ok(text) => text,
                        Err(e) => {
                            tracing::error!(error = %e, "Failed to encode event");
                            continue;
                        }
                    }
                }
                Outbound::Control(value) => value.to_string(),
            },
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    handle_frame(&state, &ctx, &mut subs, text.as_str()).to_string()
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    tracing::debug!(error = %e, "WebSocket read failed");
                    break;
                }
            },
            _ = recheck.tick() => {
                if state.crm.users.resolve_session(&token).is_err() {
                    tracing::info!(user = %ctx.user_id, "Session ended, closing WebSocket");
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                }
                continue;
            }
            _ = shutdown.recv() => {
                let _ = sink.send(Message::Close(None)).await;
                break;
            }
        };

        if sink.send(Message::Text(reply.into())).await.is_err() {
            break;
        }
    }

    tracing::info!(user = %ctx.user_id, rooms = subs.rooms.len(), "WebSocket disconnected");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_frames_parse() {
        let lead = LeadId::new();
        let frame: ClientFrame =
            serde_json::from_str(&format!(r#"{{"type":"subscribe","lead_id":"{lead}"}}"#)).unwrap();
        assert_eq!(frame, ClientFrame::Subscribe { lead_id: lead });

        let frame: ClientFrame = serde_json::from_str(r#"{"type":"ping"}"#).unwrap();
        assert_eq!(frame, ClientFrame::Ping);

        assert!(serde_json::from_str::<ClientFrame>(r#"{"type":"shout"}"#).is_err());
    }

    #[tokio::test]
    async fn test_lagging_forwarder_sends_resync() {
        use crate::model::TenantId;
        use crate::realtime::EventType;

        let tenant = TenantId::new();
        let (events, rx) = broadcast::channel(2);
        for i in 0..5 {
            let event = CrmEvent::new(EventType::LeadUpdated, tenant, None, json!({ "n": i }));
            events.send(Arc::new(event)).unwrap();
        }

        let (tx, mut outbound) = mpsc::channel(OUTBOUND_BUFFER);
        let forwarder = spawn_forwarder(rx, Room::Tenant(tenant), tx);

        match outbound.recv().await.unwrap() {
            Outbound::Control(frame) => {
                assert_eq!(frame["type"], "resync");
                assert_eq!(frame["room"]["kind"], "tenant");
                assert_eq!(frame["missed"], 3);
            }
            Outbound::Event(_) => panic!("expected a resync frame first"),
        }
        for expected in 3..5 {
            match outbound.recv().await.unwrap() {
                Outbound::Event(event) => assert_eq!(event.data["n"], expected),
                Outbound::Control(frame) => panic!("unexpected control frame {frame}"),
            }
        }

        drop(events);
        forwarder.await.unwrap();
        assert!(outbound.recv().await.is_none());
    }

    #[test]
    fn test_room_json() {
        let lead = LeadId::new();
        let value = room_json(Room::Lead(lead));
        assert_eq!(value["kind"], "lead");
        assert_eq!(value["id"], lead.to_string());
    }
}
