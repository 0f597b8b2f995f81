// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio_tungstenite::tungstenite::Message;
use yare::parameterized;

use super::*;
use crate::test_server::TestServer;

fn request(id: &str, method: &str, params: Option<Value>) -> String {
    ClientRequest::new(id, method, params).to_json().unwrap()
}

#[test]
fn ping_answers_pong() {
    let state = StubState::new();
    let mut conn = Connection::new(1);
    let response = conn
        .handle_request(&request("req_1", methods::PING, None), &state)
        .unwrap();
    assert_eq!(response, RpcResponse::success("req_1", json!({ "pong": true })));
}

#[test]
fn echo_returns_params() {
    let state = StubState::new();
    let mut conn = Connection::new(1);
    let response = conn
        .handle_request(&request("req_2", ECHO, Some(json!({ "x": 1 }))), &state)
        .unwrap();
    assert_eq!(response.result, Some(json!({ "x": 1 })));
}

#[test]
fn unknown_method_is_rejected() {
    let state = StubState::new();
    let mut conn = Connection::new(1);
    let response = conn
        .handle_request(&request("req_3", "session.delete", None), &state)
        .unwrap();
    assert!(!response.success);
    assert_eq!(response.error.unwrap().code, METHOD_NOT_FOUND);
}

#[test]
fn malformed_request_gets_no_response() {
    let state = StubState::new();
    let mut conn = Connection::new(1);
    assert!(conn.handle_request("{not json", &state).is_none());
    assert!(state.requests().is_empty());
}

#[parameterized(
    missing = { None },
    wrong_type = { Some(json!({ "sessionId": 7 })) },
    empty = { Some(json!({ "sessionId": "" })) },
)]
fn watch_requires_session_id(params: Option<Value>) {
    let state = StubState::new();
    let mut conn = Connection::new(state.register());
    let response = conn
        .handle_request(&request("req_1", methods::WATCH, params), &state)
        .unwrap();
    assert_eq!(response.error.unwrap().code, INVALID_PARAMS);
    assert!(conn.watched.is_none());
}

#[test]
fn watch_and_unwatch_update_shared_state() {
    let state = StubState::new();
    let mut conn = Connection::new(state.register());

    let watch = request("req_1", methods::WATCH, Some(json!({ "sessionId": "s1" })));
    assert!(conn.handle_request(&watch, &state).unwrap().success);
    assert_eq!(conn.watched.as_deref(), Some("s1"));
    assert_eq!(state.watchers("s1"), 1);

    let unwatch = request("req_2", methods::UNWATCH, Some(json!({ "sessionId": "s1" })));
    assert!(conn.handle_request(&unwatch, &state).unwrap().success);
    assert_eq!(state.watchers("s1"), 0);
    assert_eq!(state.requests_for(methods::WATCH).len(), 1);
}

#[parameterized(
    untargeted = { None, None, true },
    untargeted_while_watching = { Some("s1"), None, true },
    matching = { Some("s1"), Some("s1"), true },
    other_session = { Some("s1"), Some("s2"), false },
    not_watching = { None, Some("s1"), false },
)]
fn event_delivery(watched: Option<&str>, target: Option<&str>, expected: bool) {
    let mut conn = Connection::new(1);
    conn.watched = watched.map(str::to_string);
    let event = ServerEvent::new("agent.text_delta", target.map(str::to_string), None);
    assert_eq!(conn.delivers(&event), expected);
}

// Socket-level tests

type Client = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

async fn connect(server: &TestServer) -> Client {
    let (ws, _) = tokio_tungstenite::connect_async(server.ws_url()).await.unwrap();
    ws
}

async fn next_text(ws: &mut Client) -> String {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for frame")
            .expect("stream ended")
            .unwrap();
        match msg {
            Message::Text(text) => return text.as_str().to_string(),
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("unexpected message: {other:?}"),
        }
    }
}

#[tokio::test]
async fn batched_requests_get_one_batched_reply() {
    let server = TestServer::start().await.unwrap();
    let mut ws = connect(&server).await;

    let frame = format!(
        "{}\n{}\n",
        request("req_1", methods::PING, None),
        request("req_2", ECHO, Some(json!("hi")))
    );
    ws.send(Message::Text(frame.into())).await.unwrap();

    let reply = next_text(&mut ws).await;
    let ids: Vec<String> = jsonl::records(&reply)
        .map(|line| serde_json::from_str::<RpcResponse>(line).unwrap().id)
        .collect();
    assert_eq!(ids, vec!["req_1", "req_2"]);
}

#[tokio::test]
async fn session_events_reach_only_watchers() {
    let server = TestServer::start().await.unwrap();
    let mut watcher = connect(&server).await;
    let mut other = connect(&server).await;
    assert!(server.wait_for(Duration::from_secs(5), |s| s.connections() == 2).await);

    let watch = request("req_1", methods::WATCH, Some(json!({ "sessionId": "s1" })));
    watcher.send(Message::Text(watch.into())).await.unwrap();
    next_text(&mut watcher).await;
    assert!(server.wait_for(Duration::from_secs(5), |s| s.watchers("s1") == 1).await);

    server
        .state()
        .publish(ServerEvent::new("agent.text_delta", Some("s1".into()), None));
    server.state().publish(ServerEvent::new("system.notice", None, None));

    let first: ServerEvent = serde_json::from_str(&next_text(&mut watcher).await).unwrap();
    assert_eq!(first.session_id.as_deref(), Some("s1"));

    // The unwatched socket only sees the untargeted event.
    let seen: ServerEvent = serde_json::from_str(&next_text(&mut other).await).unwrap();
    assert_eq!(seen.event_type, "system.notice");
}

#[tokio::test]
async fn heartbeats_are_pushed() {
    let server = TestServer::start_with(ServeOptions {
        heartbeat: Some(Duration::from_millis(20)),
    })
    .await
    .unwrap();
    let mut ws = connect(&server).await;

    let event: ServerEvent = serde_json::from_str(&next_text(&mut ws).await).unwrap();
    assert!(event.is_heartbeat());
}

#[tokio::test]
async fn kick_drops_socket_without_close_frame() {
    let server = TestServer::start().await.unwrap();
    let mut ws = connect(&server).await;
    assert!(server.wait_for(Duration::from_secs(5), |s| s.connections() == 1).await);

    server.kick_all();

    let end = tokio::time::timeout(Duration::from_secs(5), ws.next())
        .await
        .expect("socket was not dropped");
    assert!(!matches!(end, Some(Ok(Message::Close(_)))));
    assert!(server.wait_for(Duration::from_secs(5), |s| s.connections() == 0).await);

    // The listener survives a kick.
    let _again = connect(&server).await;
    assert!(server.wait_for(Duration::from_secs(5), |s| s.accepted() == 2).await);
}

#[tokio::test]
async fn websocket_ping_is_answered() {
    let server = TestServer::start().await.unwrap();
    let mut ws = connect(&server).await;

    ws.send(Message::Ping(b"n1".to_vec().into())).await.unwrap();
    let pong = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let Some(Ok(Message::Pong(data))) = ws.next().await {
                return data;
            }
        }
    })
    .await
    .unwrap();
    assert_eq!(&pong[..], b"n1");
}
