//! Queue orchestrator
//!
//! Wires the connection manager's callbacks to state transitions and runs
//! the timer-driven drain loop. At most one drain cycle runs at a time per
//! queue instance; the handshake gate keeps item requests from going out
//! before `welcome -> sub -> sub_ok` has completed.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{broadcast, Mutex};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::client::{Connection, ConnectionConfig, ConnectionHandle, EventHandler};
use crate::types::{HopperError, Result};

use super::state::SharedState;

/// Handler invoked once per drained job item.
///
/// Invocations are strictly sequential; the next item is not popped until
/// the current one returns.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, job: Value) -> Result<()>;
}

/// Observability hook for message kinds the orchestrator itself ignores
type Hook = Arc<dyn Fn(Value) + Send + Sync>;

#[derive(Clone, Default)]
struct Hooks {
    message: Option<Hook>,
    packet: Option<Hook>,
    unknown: Option<Hook>,
}

/// Orchestrator configuration
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Channel to subscribe to
    pub channel: String,
    /// Drain-loop tick period
    pub poll_interval: Duration,
    /// Fixed delay between reconnect attempts
    pub reconnect_delay: Duration,
    /// Items requested per `get`
    pub page_size: u32,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            channel: "jobs".to_string(),
            poll_interval: Duration::from_millis(1000),
            reconnect_delay: Duration::from_secs(5),
            page_size: 10,
        }
    }
}

/// Queue orchestrator
///
/// Owns the shared state and the batch; the connection manager only sees
/// the callback implementation this type installs.
pub struct Queue {
    config: QueueConfig,
    state: Arc<Mutex<SharedState>>,
    job_handler: Arc<dyn JobHandler>,
    draining: Arc<AtomicBool>,
    shutdown_tx: broadcast::Sender<()>,
    connection: OnceLock<ConnectionHandle>,
    hooks: Hooks,
}

impl Queue {
    pub fn new(config: QueueConfig, job_handler: Arc<dyn JobHandler>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        let poll_interval_ms = config.poll_interval.as_millis() as u64;

        Self {
            config,
            state: Arc::new(Mutex::new(SharedState::new(poll_interval_ms))),
            job_handler,
            draining: Arc::new(AtomicBool::new(false)),
            shutdown_tx,
            connection: OnceLock::new(),
            hooks: Hooks::default(),
        }
    }

    /// Observe every dispatched envelope. Install before `start`.
    pub fn set_message_hook(&mut self, hook: impl Fn(Value) + Send + Sync + 'static) {
        self.hooks.message = Some(Arc::new(hook));
    }

    /// Observe routed packet deliveries. Install before `start`.
    pub fn set_packet_hook(&mut self, hook: impl Fn(Value) + Send + Sync + 'static) {
        self.hooks.packet = Some(Arc::new(hook));
    }

    /// Observe envelopes with unrecognized actions. Install before `start`.
    pub fn set_unknown_hook(&mut self, hook: impl Fn(Value) + Send + Sync + 'static) {
        self.hooks.unknown = Some(Arc::new(hook));
    }

    /// Open the connection and start the drain loop
    pub async fn start(&self, url: &str) -> Result<()> {
        {
            let mut state = self.state.lock().await;
            state.channel = Some(self.config.channel.clone());
        }

        let connection = Connection::new(ConnectionConfig {
            url: url.to_string(),
            reconnect_delay: self.config.reconnect_delay,
        });
        let handle = connection.handle();

        self.connection
            .set(handle.clone())
            .map_err(|_| HopperError::Internal("queue already started".to_string()))?;

        let events = Arc::new(QueueEvents {
            state: Arc::clone(&self.state),
            handle: handle.clone(),
            hooks: self.hooks.clone(),
        });
        connection.open(events).await?;

        // Drain loop, stopped by the shutdown broadcast
        let state = Arc::clone(&self.state);
        let draining = Arc::clone(&self.draining);
        let job_handler = Arc::clone(&self.job_handler);
        let page_size = self.config.page_size;
        let poll_interval = self.config.poll_interval;
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(poll_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        debug!("Drain loop stopped");
                        break;
                    }
                    _ = interval.tick() => {
                        drain_tick(&state, &handle, &draining, &job_handler, page_size).await;
                    }
                }
            }
        });

        info!("Queue started on channel '{}'", self.config.channel);
        Ok(())
    }

    /// Pause draining, cancel the poll timer, and request a normal close.
    ///
    /// An in-flight job finishes its current item; nothing new starts.
    /// Process exit is the caller's responsibility.
    pub async fn shutdown(&self) {
        {
            let mut state = self.state.lock().await;
            state.is_paused = true;
        }
        let _ = self.shutdown_tx.send(());

        if let Some(handle) = self.connection.get() {
            if let Err(e) = handle.close().await {
                debug!("Close request after connection ended: {}", e);
            }
        }

        info!("Queue shut down");
    }

    pub async fn is_connected(&self) -> bool {
        self.state.lock().await.is_connected
    }

    pub async fn is_subscribed(&self) -> bool {
        self.state.lock().await.is_subscribed
    }

    /// Number of locally buffered items not yet handled
    pub async fn pending_jobs(&self) -> usize {
        self.state.lock().await.batch.len()
    }

    /// Log the full shared state at debug level
    pub async fn dump_state(&self) {
        self.state.lock().await.dump();
    }
}

/// One drain tick: decide whether to fetch more work or process buffered
/// work. Single-flight; a tick that finds a drain in progress does nothing.
async fn drain_tick(
    state: &Arc<Mutex<SharedState>>,
    handle: &ConnectionHandle,
    draining: &AtomicBool,
    job_handler: &Arc<dyn JobHandler>,
    page_size: u32,
) {
    if draining.load(Ordering::SeqCst) {
        return;
    }

    let (paused, subscribed, connected, server_has_items, server_count, local_count, channel) = {
        let state = state.lock().await;
        (
            state.is_paused,
            state.is_subscribed,
            state.is_connected,
            state.server_has_items,
            state.server_item_count,
            state.batch.len(),
            state.channel.clone(),
        )
    };

    if paused {
        return;
    }

    // Handshake gate: wait for welcome -> sub -> sub_ok
    if !subscribed || !connected {
        return;
    }

    // Idle: nothing local, nothing reported remote, no network chatter
    if !server_has_items && server_count == 0 && local_count == 0 {
        return;
    }

    if local_count == 0 {
        let channel = channel.unwrap_or_default();
        if let Err(e) = handle.request_items(&channel, page_size).await {
            debug!("Item request dropped: {}", e);
        }
        return;
    }

    if draining
        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
        .is_err()
    {
        return;
    }

    loop {
        let job = {
            let mut state = state.lock().await;
            state.batch.next()
        };
        let Some(job) = job else { break };

        if let Err(e) = job_handler.handle(job).await {
            warn!("Job handler failed: {}", e);
        }
    }

    draining.store(false, Ordering::SeqCst);
}

/// Callback implementation installed on the connection manager
struct QueueEvents {
    state: Arc<Mutex<SharedState>>,
    handle: ConnectionHandle,
    hooks: Hooks,
}

#[async_trait]
impl EventHandler for QueueEvents {
    async fn on_welcome(&self, id: Option<String>) {
        let channel = {
            let mut state = self.state.lock().await;
            state.connection_id = id;
            state.is_connected = true;
            state.channel.clone()
        };

        if let Some(channel) = channel {
            if let Err(e) = self.handle.subscribe(&channel).await {
                debug!("Subscribe request dropped: {}", e);
            }
        }
    }

    async fn on_sub_ok(&self) {
        let mut state = self.state.lock().await;
        state.is_subscribed = true;
        debug!("Subscription confirmed");
    }

    async fn on_info(&self, count: u64) {
        let mut state = self.state.lock().await;
        state.server_item_count = count;
        state.server_has_items = count > 0;
    }

    async fn on_incoming(&self) {
        // The push never carries the count; follow up with an explicit pull
        let channel = self.state.lock().await.channel.clone();
        if let Some(channel) = channel {
            if let Err(e) = self.handle.request_info(&channel).await {
                debug!("Info request dropped: {}", e);
            }
        }
    }

    async fn on_payload(&self, count: u64, list: Vec<Value>) {
        if count == 0 {
            return;
        }
        let mut state = self.state.lock().await;
        state.batch.assign(list);
        debug!(buffered = state.batch.len(), "Items appended to batch");
    }

    async fn on_close(&self, code: u16) {
        let mut state = self.state.lock().await;
        state.connection_dropped();
        debug!(code, "Connection closed");
    }

    async fn on_packet(&self, msg: Value) {
        if let Some(hook) = &self.hooks.packet {
            hook(msg);
        }
    }

    async fn on_unknown(&self, msg: Value) {
        if let Some(hook) = &self.hooks.unknown {
            hook(msg);
        }
    }

    async fn on_message(&self, msg: Value) {
        if let Some(hook) = &self.hooks.message {
            hook(msg);
        }
    }

    async fn on_error(&self, err: HopperError) {
        warn!("Connection error: {}", err);
    }
}
