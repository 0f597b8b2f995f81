// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]
#![allow(clippy::panic)]

use super::*;
use crate::test_helpers::{MockLink, MockTransport};
use crate::transport::Transport;
use serde_json::json;

async fn attached_router() -> (Arc<MessageRouter>, Arc<MockLink>, Arc<ActivityClock>) {
    let activity = Arc::new(ActivityClock::new());
    let router = Arc::new(MessageRouter::new(Arc::clone(&activity)));
    let transport = MockTransport::new();
    let opened = transport.open("ws://agent").await.unwrap();
    router.attach(opened.link);
    (router, transport.last_link(), activity)
}

#[tokio::test]
async fn send_without_link_is_not_connected() {
    let router = MessageRouter::new(Arc::new(ActivityClock::new()));
    assert!(matches!(
        router.send("x".into()).await,
        Err(Error::NotConnected)
    ));
    assert!(matches!(
        router.request("m", None, Duration::from_secs(1)).await,
        Err(Error::NotConnected)
    ));
    assert_eq!(router.pending_count(), 0);
}

#[tokio::test]
async fn handle_frame_resolves_pending_request() {
    let (router, link, _) = attached_router().await;

    let task = {
        let router = Arc::clone(&router);
        tokio::spawn(async move { router.request("echo", None, Duration::from_secs(5)).await })
    };
    crate::test_helpers::eventually("request sent", || link.sent().len() == 1).await;
    let id = link.sent_requests()[0].id.clone();

    router.handle_frame(&RpcResponse::success(&id, json!({"ok": true})).to_json().unwrap());

    assert_eq!(task.await.unwrap().unwrap(), json!({"ok": true}));
    assert_eq!(router.pending_count(), 0);
}

#[tokio::test]
async fn error_response_is_remote_error() {
    let (router, link, _) = attached_router().await;

    let task = {
        let router = Arc::clone(&router);
        tokio::spawn(async move { router.request("nope", None, Duration::from_secs(5)).await })
    };
    crate::test_helpers::eventually("request sent", || link.sent().len() == 1).await;
    let id = link.sent_requests()[0].id.clone();

    router.handle_frame(
        &RpcResponse::error(&id, "METHOD_NOT_FOUND", "unknown method")
            .to_json()
            .unwrap(),
    );

    match task.await.unwrap() {
        Err(Error::Remote { code, message }) => {
            assert_eq!(code, "METHOD_NOT_FOUND");
            assert_eq!(message, "unknown method");
        }
        other => panic!("expected remote error, got {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn timeout_removes_entry_and_late_response_is_dropped() {
    let (router, link, _) = attached_router().await;
    let mut events = router.events().subscribe();

    let err = router
        .request("slow", None, Duration::from_secs(2))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::RequestTimeout { ref method, .. } if method == "slow"));
    assert_eq!(router.pending_count(), 0);

    let id = link.sent_requests()[0].id.clone();
    router.handle_frame(&RpcResponse::success(&id, json!(1)).to_json().unwrap());
    assert_eq!(router.pending_count(), 0);
    assert!(events.try_recv().is_none());
}

#[tokio::test]
async fn dropped_request_future_removes_entry() {
    let (router, link, _) = attached_router().await;

    let task = {
        let router = Arc::clone(&router);
        tokio::spawn(async move { router.request("abandoned", None, Duration::from_secs(60)).await })
    };
    crate::test_helpers::eventually("request sent", || link.sent().len() == 1).await;
    assert_eq!(router.pending_count(), 1);

    task.abort();
    let _ = task.await;
    assert_eq!(router.pending_count(), 0);
}

#[tokio::test]
async fn request_ids_are_unique() {
    let (router, link, _) = attached_router().await;
    router.notify("a", None).await.unwrap();
    router.notify("b", None).await.unwrap();
    router.notify("c", None).await.unwrap();

    let ids: Vec<String> = link.sent_requests().into_iter().map(|r| r.id).collect();
    assert_eq!(ids, vec!["req_1", "req_2", "req_3"]);
}

#[tokio::test]
async fn heartbeats_touch_clock_but_are_not_forwarded() {
    let (router, _link, _activity) = attached_router().await;
    let mut events = router.events().subscribe();

    router.handle_frame(r#"{"type":"heartbeat"}"#);
    router.handle_frame(r#"{"type":"connection.heartbeat"}"#);
    assert!(events.try_recv().is_none());
}

#[tokio::test(start_paused = true)]
async fn every_frame_touches_activity_clock() {
    let (router, _link, activity) = attached_router().await;
    tokio::time::advance(Duration::from_secs(20)).await;
    assert!(activity.is_stale(Duration::from_secs(15)));

    router.handle_frame(r#"{"type":"system.heartbeat"}"#);
    assert!(!activity.is_stale(Duration::from_secs(15)));
}

#[tokio::test]
async fn batched_frame_with_malformed_record_dispatches_the_rest() {
    let (router, _link, _) = attached_router().await;
    let mut events = router.events().subscribe();

    let frame = concat!(
        r#"{"type":"agent.text_delta","sessionId":"s1","data":{"delta":"a"}}"#,
        "\n",
        "this is not json\n",
        r#"{"type":"heartbeat"}"#,
        "\n",
        r#"{"id":"req_99","success":true,"result":null}"#,
        "\n",
        r#"{"type":"agent.turn_end","sessionId":"s1"}"#,
    );
    router.handle_frame(frame);

    let first = events.try_recv().unwrap();
    let second = events.try_recv().unwrap();
    assert_eq!(first.event_type, "agent.text_delta");
    assert_eq!(second.event_type, "agent.turn_end");
    assert!(events.try_recv().is_none());
}

#[tokio::test]
async fn detach_stops_outbound_traffic() {
    let (router, _link, _) = attached_router().await;
    assert!(router.is_attached());
    assert!(router.detach().is_some());
    assert!(!router.is_attached());
    assert!(matches!(
        router.notify("x", None).await,
        Err(Error::NotConnected)
    ));
}
