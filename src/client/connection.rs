//! Connection manager
//!
//! Maintains one WebSocket connection to the queue server at a time and
//! recovers transparently from abnormal disconnects. A normal closure
//! (code 1000, either side) is terminal for the manager; any other close
//! code, a stream error, or a refused connect schedules a fresh connection
//! after a fixed delay. The dead socket is dropped wholesale before the
//! next attempt, so no listener from an old connection can fire again.

use std::io::ErrorKind;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio::time::sleep;
use tokio_tungstenite::{
    connect_async,
    tungstenite::protocol::{frame::coding::CloseCode, CloseFrame, Message},
    MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, info, trace, warn};

use crate::protocol::{classify, Inbound, Outbound};
use crate::types::{HopperError, Result};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connection manager configuration
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// WebSocket URL of the queue server
    pub url: String,
    /// Fixed delay between reconnect attempts
    pub reconnect_delay: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            url: "ws://localhost:8080".to_string(),
            reconnect_delay: Duration::from_secs(5),
        }
    }
}

/// Callbacks fired by the connection manager.
///
/// Every method is a replaceable no-op; consumers override the subset they
/// care about. `on_message` fires after the specific dispatch for every
/// envelope that carried a usable action.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn on_open(&self) {}
    async fn on_welcome(&self, _id: Option<String>) {}
    async fn on_sub_ok(&self) {}
    async fn on_info(&self, _count: u64) {}
    async fn on_payload(&self, _count: u64, _list: Vec<Value>) {}
    async fn on_incoming(&self) {}
    async fn on_packet(&self, _msg: Value) {}
    async fn on_task_assign(&self, _msg: Value) {}
    async fn on_unknown(&self, _msg: Value) {}
    async fn on_message(&self, _msg: Value) {}
    async fn on_close(&self, _code: u16) {}
    async fn on_error(&self, _err: HopperError) {}
}

/// Commands accepted by the connection loop
#[derive(Debug)]
pub(crate) enum Command {
    Send(Outbound),
    Close,
}

/// Cloneable sender for outbound operations.
///
/// Each operation is fire-and-forget: it queues an envelope for the
/// connection loop and returns. A socket-level write failure is surfaced
/// through `EventHandler::on_error`, not to the caller; the only error
/// returned here is `Closed`, when the manager task is gone.
#[derive(Clone)]
pub struct ConnectionHandle {
    tx: mpsc::Sender<Command>,
}

impl ConnectionHandle {
    pub(crate) fn new(tx: mpsc::Sender<Command>) -> Self {
        Self { tx }
    }

    /// Subscribe to a channel
    pub async fn subscribe(&self, channel: &str) -> Result<()> {
        self.send(Outbound::Sub { channel: channel.to_string() }).await
    }

    /// Acknowledge an item by id
    pub async fn ack(&self, id: &str) -> Result<()> {
        self.send(Outbound::Ack { id: id.to_string() }).await
    }

    /// Request the backlog count for a channel
    pub async fn request_info(&self, channel: &str) -> Result<()> {
        self.send(Outbound::Info { channel: channel.to_string() }).await
    }

    /// Request up to `count` items from a channel
    pub async fn request_items(&self, channel: &str, count: u32) -> Result<()> {
        self.send(Outbound::Get { channel: channel.to_string(), count }).await
    }

    /// Forward a payload flagged as a routed packet
    pub async fn route_packet(&self, payload: Value) -> Result<()> {
        self.send(Outbound::Route { payload, packet: true }).await
    }

    /// Forward a payload
    pub async fn route(&self, payload: Value) -> Result<()> {
        self.send(Outbound::Route { payload, packet: false }).await
    }

    /// Submit a task
    pub async fn submit_task(&self, payload: Value) -> Result<()> {
        self.send(Outbound::Task { payload }).await
    }

    /// Initiate a normal closure (close code 1000, no reconnect)
    pub async fn close(&self) -> Result<()> {
        self.tx.send(Command::Close).await.map_err(|_| HopperError::Closed)
    }

    async fn send(&self, out: Outbound) -> Result<()> {
        self.tx.send(Command::Send(out)).await.map_err(|_| HopperError::Closed)
    }
}

/// Connection manager
///
/// Two-phase: `new` builds the command channel so a handle can be wired
/// into the event handler, `open` spawns the connection loop.
pub struct Connection {
    config: ConnectionConfig,
    handle: ConnectionHandle,
    rx: Mutex<Option<mpsc::Receiver<Command>>>,
}

impl Connection {
    pub fn new(config: ConnectionConfig) -> Self {
        let (tx, rx) = mpsc::channel(64);
        Self {
            config,
            handle: ConnectionHandle::new(tx),
            rx: Mutex::new(Some(rx)),
        }
    }

    /// Get a cloneable handle for outbound operations
    pub fn handle(&self) -> ConnectionHandle {
        self.handle.clone()
    }

    /// Spawn the connection loop. May be called once per manager.
    pub async fn open(&self, handler: Arc<dyn EventHandler>) -> Result<()> {
        let rx = self
            .rx
            .lock()
            .await
            .take()
            .ok_or_else(|| HopperError::Internal("connection already opened".to_string()))?;

        let config = self.config.clone();
        tokio::spawn(async move {
            connection_loop(config, rx, handler).await;
        });

        Ok(())
    }
}

/// How a single connection instance ended
enum SessionEnd {
    /// Explicit normal closure; the manager does not reconnect
    Normal(u16),
    /// Abnormal close code, stream error, or stream end; reconnect
    Abnormal(u16),
}

/// Main connection loop with reconnection logic
async fn connection_loop(
    config: ConnectionConfig,
    mut rx: mpsc::Receiver<Command>,
    handler: Arc<dyn EventHandler>,
) {
    let mut received = 0u64;

    loop {
        info!("Connecting to {}", config.url);

        match connect_async(&config.url).await {
            Ok((ws, _)) => {
                info!("Connected to {}", config.url);
                handler.on_open().await;

                match run_session(ws, &mut rx, &handler, &mut received).await {
                    SessionEnd::Normal(code) => {
                        info!("Connection closed (code {})", code);
                        handler.on_close(code).await;
                        return;
                    }
                    SessionEnd::Abnormal(code) => {
                        warn!("Connection lost (code {})", code);
                        handler.on_close(code).await;
                    }
                }
            }
            Err(e) if connection_refused(&e) => {
                debug!("Connection refused: {}", e);
            }
            Err(e) => {
                // Not retryable; surface and stop
                handler.on_error(e.into()).await;
                return;
            }
        }

        warn!("Reconnecting in {:?}...", config.reconnect_delay);

        let delay = sleep(config.reconnect_delay);
        tokio::pin!(delay);
        loop {
            tokio::select! {
                _ = &mut delay => break,
                cmd = rx.recv() => match cmd {
                    Some(Command::Close) | None => {
                        info!("Close requested during reconnect wait");
                        return;
                    }
                    Some(Command::Send(out)) => {
                        debug!("Dropping {} while disconnected", out.action());
                    }
                }
            }
        }
    }
}

fn connection_refused(err: &tokio_tungstenite::tungstenite::Error) -> bool {
    matches!(
        err,
        tokio_tungstenite::tungstenite::Error::Io(e) if e.kind() == ErrorKind::ConnectionRefused
    )
}

/// Drive one connection instance until it ends
async fn run_session(
    ws: WsStream,
    rx: &mut mpsc::Receiver<Command>,
    handler: &Arc<dyn EventHandler>,
    received: &mut u64,
) -> SessionEnd {
    let (mut sink, mut stream) = ws.split();

    loop {
        tokio::select! {
            cmd = rx.recv() => match cmd {
                Some(Command::Send(out)) => {
                    trace!("Sending {}", out.action());
                    match out.encode() {
                        Ok(text) => {
                            if let Err(e) = sink.send(Message::Text(text)).await {
                                // Surfaced as an error event, not to the caller;
                                // the read side drives the reconnect
                                handler.on_error(e.into()).await;
                            }
                        }
                        Err(e) => handler.on_error(e).await,
                    }
                }
                Some(Command::Close) | None => {
                    let _ = sink
                        .send(Message::Close(Some(CloseFrame {
                            code: CloseCode::Normal,
                            reason: "client requested".into(),
                        })))
                        .await;
                    return SessionEnd::Normal(1000);
                }
            },

            msg = stream.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    *received += 1;
                    dispatch(&text, handler, *received).await;
                }
                Some(Ok(Message::Ping(data))) => {
                    let _ = sink.send(Message::Pong(data)).await;
                }
                Some(Ok(Message::Close(frame))) => {
                    // 1005: closed without a status code
                    let code = frame.map(|f| u16::from(f.code)).unwrap_or(1005);
                    if code == 1000 {
                        return SessionEnd::Normal(code);
                    }
                    return SessionEnd::Abnormal(code);
                }
                Some(Err(e)) => {
                    handler.on_error(e.into()).await;
                    return SessionEnd::Abnormal(1006);
                }
                None => return SessionEnd::Abnormal(1006),
                _ => {}
            }
        }
    }
}

/// Parse one text frame and fire the matching callback
async fn dispatch(text: &str, handler: &Arc<dyn EventHandler>, number: u64) {
    let msg: Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(e) => {
            warn!("Discarding undecodable message: {}", e);
            return;
        }
    };

    let Some(inbound) = classify(&msg) else {
        warn!("Discarding message without action: {}", msg);
        return;
    };

    trace!(number, "Dispatching inbound message");

    match inbound {
        Inbound::Welcome { id } => handler.on_welcome(id).await,
        Inbound::SubOk => handler.on_sub_ok().await,
        Inbound::Info { count } => handler.on_info(count).await,
        Inbound::Payload { count, list } => handler.on_payload(count, list).await,
        Inbound::Incoming => handler.on_incoming().await,
        Inbound::Packet(value) => handler.on_packet(value).await,
        Inbound::TaskAssign(value) => handler.on_task_assign(value).await,
        Inbound::Unknown(value) => handler.on_unknown(value).await,
    }

    // The catch-all observer fires for every dispatched envelope
    handler.on_message(msg).await;
}
