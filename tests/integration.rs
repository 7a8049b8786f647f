//! End-to-end tests against an in-process WebSocket server

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::{
    accept_async,
    tungstenite::protocol::{frame::coding::CloseCode, CloseFrame, Message},
    WebSocketStream,
};

use hopper::{JobHandler, Queue, QueueConfig};

struct Recorder(mpsc::UnboundedSender<Value>);

#[async_trait]
impl JobHandler for Recorder {
    async fn handle(&self, job: Value) -> hopper::Result<()> {
        let _ = self.0.send(job);
        Ok(())
    }
}

fn fast_config() -> QueueConfig {
    QueueConfig {
        channel: "jobs".to_string(),
        poll_interval: Duration::from_millis(50),
        reconnect_delay: Duration::from_millis(100),
        page_size: 10,
    }
}

fn text(value: Value) -> Message {
    Message::Text(value.to_string())
}

/// Read frames until the next text frame, parsed as JSON
async fn next_json(ws: &mut WebSocketStream<TcpStream>) -> Value {
    loop {
        let msg = timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for client message")
            .expect("connection ended unexpectedly")
            .expect("websocket error");
        if let Message::Text(text) = msg {
            return serde_json::from_str(&text).expect("client sent invalid JSON");
        }
    }
}

#[tokio::test]
async fn handshake_poll_and_drain() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();

        ws.send(text(json!({ "action": "welcome", "id": "abc" })))
            .await
            .unwrap();

        let sub = next_json(&mut ws).await;
        assert_eq!(sub["action"], "sub");
        assert_eq!(sub["channel"], "jobs");

        ws.send(text(json!({ "action": "sub_ok" }))).await.unwrap();
        ws.send(text(json!({ "action": "incoming" }))).await.unwrap();

        let info = next_json(&mut ws).await;
        assert_eq!(info["action"], "info");
        assert_eq!(info["channel"], "jobs");

        ws.send(text(json!({ "action": "info", "data": { "count": 3 } })))
            .await
            .unwrap();

        let get = next_json(&mut ws).await;
        assert_eq!(get["action"], "get");
        assert_eq!(get["channel"], "jobs");
        assert_eq!(get["data"]["count"], 10);

        ws.send(text(json!({
            "action": "payload",
            "data": { "count": 2, "list": ["A", "B"] }
        })))
        .await
        .unwrap();

        // Hold the connection until the client closes it
        while let Some(msg) = ws.next().await {
            if matches!(msg, Ok(Message::Close(_)) | Err(_)) {
                break;
            }
        }
    });

    let (jobs_tx, mut jobs_rx) = mpsc::unbounded_channel();
    let queue = Queue::new(fast_config(), Arc::new(Recorder(jobs_tx)));
    queue.start(&format!("ws://{}", addr)).await.unwrap();

    let first = timeout(Duration::from_secs(5), jobs_rx.recv())
        .await
        .expect("timed out waiting for first job")
        .unwrap();
    let second = timeout(Duration::from_secs(5), jobs_rx.recv())
        .await
        .expect("timed out waiting for second job")
        .unwrap();

    assert_eq!(first, json!("A"));
    assert_eq!(second, json!("B"));
    assert_eq!(queue.pending_jobs().await, 0);
    assert!(queue.is_subscribed().await);

    queue.shutdown().await;
    server.await.unwrap();
}

#[tokio::test]
async fn reconnects_once_after_abnormal_disconnect() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        // First connection: greet, take the sub, then drop the socket
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();
        ws.send(text(json!({ "action": "welcome", "id": "one" })))
            .await
            .unwrap();
        let sub = next_json(&mut ws).await;
        assert_eq!(sub["action"], "sub");
        drop(ws);
        let dropped_at = Instant::now();

        // The client must come back after the configured delay
        let (stream, _) = timeout(Duration::from_secs(5), listener.accept())
            .await
            .expect("client never reconnected")
            .unwrap();
        assert!(dropped_at.elapsed() >= Duration::from_millis(80));

        let mut ws = accept_async(stream).await.unwrap();
        ws.send(text(json!({ "action": "welcome", "id": "two" })))
            .await
            .unwrap();
        let sub = next_json(&mut ws).await;
        assert_eq!(sub["action"], "sub");
        assert_eq!(sub["channel"], "jobs");

        // No duplicate dispatch from the dead connection: exactly one sub,
        // then silence until sub_ok arrives
        let extra = timeout(Duration::from_millis(300), ws.next()).await;
        assert!(extra.is_err(), "unexpected extra frame after resubscribe");
    });

    let (jobs_tx, _jobs_rx) = mpsc::unbounded_channel();
    let queue = Queue::new(fast_config(), Arc::new(Recorder(jobs_tx)));
    queue.start(&format!("ws://{}", addr)).await.unwrap();

    server.await.unwrap();
    queue.shutdown().await;
}

#[tokio::test]
async fn normal_close_is_terminal() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let (jobs_tx, _jobs_rx) = mpsc::unbounded_channel();
    let queue = Queue::new(fast_config(), Arc::new(Recorder(jobs_tx)));
    queue.start(&format!("ws://{}", addr)).await.unwrap();

    let (stream, _) = timeout(Duration::from_secs(5), listener.accept())
        .await
        .expect("client never connected")
        .unwrap();
    let mut ws = accept_async(stream).await.unwrap();
    ws.send(Message::Close(Some(CloseFrame {
        code: CloseCode::Normal,
        reason: "done".into(),
    })))
    .await
    .unwrap();

    // With a 100ms reconnect delay, a retry would land well within 400ms
    let retry = timeout(Duration::from_millis(400), listener.accept()).await;
    assert!(retry.is_err(), "client reconnected after a normal close");

    assert!(!queue.is_connected().await);
    queue.shutdown().await;
}
