//! Live-feed tests: connection bookkeeping, event forwarding, and a real
//! WebSocket client against a bound server.

mod common;

use std::sync::Arc;
use std::time::Duration;

use atelier_api::background::event_forwarder;
use atelier_api::ws::WsManager;
use atelier_core::job::JobStatus;
use atelier_events::{EventBus, JobEvent};
use axum::extract::ws::Message;
use common::{build_test_app, post, post_json, submit_body, OTHER_SCOPE, SCOPE};
use futures::StreamExt;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;

#[tokio::test]
async fn messages_reach_only_the_owning_scope() {
    let manager = WsManager::new();
    let mut mine = manager.add("a".into(), SCOPE).await;
    let mut theirs = manager.add("b".into(), OTHER_SCOPE).await;

    let delivered = manager
        .send_to_scope(SCOPE, Message::Text("hello".into()))
        .await;

    assert_eq!(delivered, 1);
    assert!(matches!(mine.try_recv(), Ok(Message::Text(t)) if t.as_str() == "hello"));
    assert!(theirs.try_recv().is_err());
}

#[tokio::test]
async fn shutdown_closes_and_forgets_connections() {
    let manager = WsManager::new();
    let mut rx = manager.add("a".into(), SCOPE).await;
    assert_eq!(manager.connection_count().await, 1);

    manager.shutdown_all().await;

    assert_eq!(manager.connection_count().await, 0);
    assert!(matches!(rx.recv().await, Some(Message::Close(None))));
}

#[tokio::test]
async fn forwarder_relays_bus_events_as_json() {
    let manager = Arc::new(WsManager::new());
    let bus = EventBus::default();
    let mut rx = manager.add("a".into(), SCOPE).await;
    let forwarder = tokio::spawn(event_forwarder::run(Arc::clone(&manager), bus.subscribe()));

    bus.publish(JobEvent::progress(42, SCOPE, 60));
    bus.publish(JobEvent::progress(43, OTHER_SCOPE, 10));

    let message = tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("event within a second")
        .expect("channel open");
    let Message::Text(text) = message else {
        panic!("expected a text frame, got {message:?}");
    };
    let event: JobEvent = serde_json::from_str(text.as_str()).unwrap();
    assert_eq!(event.job_id, 42);
    assert_eq!(event.status, JobStatus::Processing);
    assert_eq!(event.progress, Some(60));

    drop(bus);
    tokio::time::timeout(Duration::from_secs(1), forwarder)
        .await
        .expect("forwarder stops when the bus closes")
        .unwrap();
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn websocket_client_sees_job_through_to_done() {
    let app = build_test_app();
    let forwarder = tokio::spawn(event_forwarder::run(
        Arc::clone(&app.state.ws_manager),
        app.events.subscribe(),
    ));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server_router = app.router.clone();
    let server = tokio::spawn(async move {
        axum::serve(listener, server_router).await.unwrap();
    });

    let mut request = format!("ws://{addr}/ws/jobs").into_client_request().unwrap();
    request
        .headers_mut()
        .insert("x-owner-scope", SCOPE.to_string().parse().unwrap());
    let (mut socket, _) = tokio_tungstenite::connect_async(request).await.unwrap();

    for _ in 0..100 {
        if app.state.ws_manager.connection_count().await == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(app.state.ws_manager.connection_count().await, 1);

    post_json(&app.router, "/api/v1/jobs", submit_body(2)).await;
    post(&app.router, "/api/v1/jobs/dispatch").await;

    let mut statuses = Vec::new();
    let mut result = None;
    while let Ok(Some(frame)) = tokio::time::timeout(Duration::from_secs(2), socket.next()).await {
        let frame = frame.unwrap();
        if !frame.is_text() {
            continue;
        }
        let event: JobEvent = serde_json::from_str(&frame.into_text().unwrap()).unwrap();
        statuses.push(event.status);
        if event.is_terminal() {
            result = event.result;
            break;
        }
    }

    assert_eq!(statuses.first(), Some(&JobStatus::Queued));
    assert_eq!(statuses.last(), Some(&JobStatus::Done));
    assert_eq!(result.map(|ids| ids.len()), Some(2));

    server.abort();
    forwarder.abort();
}

#[tokio::test]
async fn websocket_upgrade_requires_scope() {
    let app = build_test_app();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = tokio::spawn(async move {
        axum::serve(listener, app.router).await.unwrap();
    });

    let err = tokio_tungstenite::connect_async(format!("ws://{addr}/ws/jobs"))
        .await
        .unwrap_err();
    assert!(
        matches!(
            err,
            tokio_tungstenite::tungstenite::Error::Http(ref response)
                if response.status() == 401
        ),
        "unexpected error: {err:?}"
    );

    server.abort();
}
