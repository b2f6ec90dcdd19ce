//! WebSocket fan-out over a running server.

mod common;

use common::{start_server, start_server_with};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn connect(ws_url: &str, token: &str) -> Socket {
    let (mut socket, _) = connect_async(format!("{ws_url}?token={token}")).await.unwrap();
    let welcome = next_frame(&mut socket).await.expect("welcome frame");
    assert_eq!(welcome["type"], "subscribed");
    assert_eq!(welcome["room"]["kind"], "tenant");
    socket
}

/// Next JSON frame, or `None` when nothing arrives for a while.
async fn next_frame(socket: &mut Socket) -> Option<Value> {
    loop {
        let msg = tokio::time::timeout(Duration::from_millis(500), socket.next())
            .await
            .ok()??
            .ok()?;
        if let Message::Text(text) = msg {
            return Some(serde_json::from_str(text.as_str()).unwrap());
        }
    }
}

async fn drain(socket: &mut Socket) -> Vec<Value> {
    let mut frames = Vec::new();
    while let Some(frame) = next_frame(socket).await {
        frames.push(frame);
    }
    frames
}

#[tokio::test]
async fn test_tenant_room_receives_lead_events() {
    let server = start_server().await;
    let admin = server.tenant("acme").await;
    let (agent, _) = server.user(&admin, "acme", "alice", "agent").await;
    let mut socket = connect(&server.ws_url, admin.token().unwrap()).await;

    let lead = agent.create_lead(&json!({ "name": "Globex" })).await.unwrap();

    let frames = drain(&mut socket).await;
    let created = frames
        .iter()
        .find(|f| f["type"] == "lead.created")
        .expect("lead.created event");
    assert_eq!(created["lead_id"], lead["id"]);
    assert_eq!(created["data"]["name"], "Globex");
}

#[tokio::test]
async fn test_lead_room_events_are_not_duplicated() {
    let server = start_server().await;
    let admin = server.tenant("acme").await;
    let lead = admin.create_lead(&json!({ "name": "Initech" })).await.unwrap();
    let lead_id = lead["id"].as_str().unwrap();

    let mut socket = connect(&server.ws_url, admin.token().unwrap()).await;
    drain(&mut socket).await;

    socket
        .send(Message::Text(
            json!({ "type": "subscribe", "lead_id": lead_id }).to_string().into(),
        ))
        .await
        .unwrap();
    let reply = next_frame(&mut socket).await.unwrap();
    assert_eq!(reply["type"], "subscribed");
    assert_eq!(reply["room"]["kind"], "lead");

    admin
        .log_interaction(lead_id, "note", "Sent brochure")
        .await
        .unwrap();
    let frames = drain(&mut socket).await;
    let activity_events = frames
        .iter()
        .filter(|f| f["type"] == "activity.created")
        .count();
    assert_eq!(activity_events, 1);
}

#[tokio::test]
async fn test_other_tenants_hear_nothing() {
    let server = start_server().await;
    let acme = server.tenant("acme").await;
    let globex = server.tenant("globex").await;
    let mut socket = connect(&server.ws_url, globex.token().unwrap()).await;

    let lead = acme.create_lead(&json!({ "name": "Secret" })).await.unwrap();
    assert!(drain(&mut socket).await.is_empty());

    // Subscribing to a foreign lead is refused like a missing one.
    socket
        .send(Message::Text(
            json!({ "type": "subscribe", "lead_id": lead["id"] }).to_string().into(),
        ))
        .await
        .unwrap();
    let reply = next_frame(&mut socket).await.unwrap();
    assert_eq!(reply["type"], "error");
}

#[tokio::test]
async fn test_ping_and_bad_frames() {
    let server = start_server().await;
    let admin = server.tenant("acme").await;
    let mut socket = connect(&server.ws_url, admin.token().unwrap()).await;

    socket
        .send(Message::Text(r#"{"type":"ping"}"#.into()))
        .await
        .unwrap();
    assert_eq!(next_frame(&mut socket).await.unwrap()["type"], "pong");

    socket
        .send(Message::Text("not json".into()))
        .await
        .unwrap();
    assert_eq!(next_frame(&mut socket).await.unwrap()["type"], "error");
}

#[tokio::test]
async fn test_upgrade_requires_session_and_respects_limit() {
    let server = start_server_with(|config| {
        config.realtime.max_connections_per_user = 1;
    })
    .await;
    let admin = server.tenant("acme").await;

    assert!(connect_async(format!("{}?token=bogus", server.ws_url))
        .await
        .is_err());

    let _first = connect(&server.ws_url, admin.token().unwrap()).await;
    let second = connect_async(format!("{}?token={}", server.ws_url, admin.token().unwrap())).await;
    assert!(second.is_err());
}
