//! Shared coordination state
//!
//! One record visible to both the connection callbacks and the drain-tick
//! timer. The orchestrator owns it behind a mutex held only for the
//! duration of each access; no other component touches it directly.

use tracing::debug;

use super::batch::Batch;

#[derive(Debug)]
pub struct SharedState {
    /// Channel this client subscribes to
    pub channel: Option<String>,
    /// Subscription handshake complete
    pub is_subscribed: bool,
    /// Transport currently open
    pub is_connected: bool,
    /// Server-assigned session identifier
    pub connection_id: Option<String>,
    /// Server last reported backlog > 0
    pub server_has_items: bool,
    /// Last reported backlog size
    pub server_item_count: u64,
    /// Local pending-item buffer
    pub batch: Batch,
    /// Drain loop suppressed (set on shutdown)
    pub is_paused: bool,
    /// Drain-loop tick period
    pub poll_interval_ms: u64,
}

impl SharedState {
    pub fn new(poll_interval_ms: u64) -> Self {
        Self {
            channel: None,
            is_subscribed: false,
            is_connected: false,
            connection_id: None,
            server_has_items: false,
            server_item_count: 0,
            batch: Batch::new(),
            is_paused: false,
            poll_interval_ms,
        }
    }

    /// Log the full record at debug level
    pub fn dump(&self) {
        debug!(state = ?self, "shared state");
    }

    /// Mark the connection dropped. The subscription is tied to the
    /// connection, so it resets too; a fresh sub_ok must arrive after
    /// reconnect before the drain gate reopens.
    pub fn connection_dropped(&mut self) {
        self.is_connected = false;
        self.is_subscribed = false;
    }
}
