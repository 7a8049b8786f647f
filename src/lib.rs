//! hopper - WebSocket job-queue client
//!
//! Connects to a server-pushed job queue over a persistent WebSocket,
//! maintains one channel subscription, and drains delivered work items one
//! at a time through a caller-supplied handler, reconnecting automatically
//! on abnormal disconnects.
//!
//! ## Components
//!
//! - **Connection manager**: owns the socket, reconnects on failure,
//!   dispatches inbound envelopes by action
//! - **Queue orchestrator**: sequences the subscribe handshake, pulls
//!   batches on demand, and guarantees at-most-one drain cycle at a time

pub mod client;
pub mod config;
pub mod protocol;
pub mod queue;
pub mod types;

pub use client::{Connection, ConnectionConfig, ConnectionHandle, EventHandler};
pub use config::Args;
pub use queue::{Batch, JobHandler, Queue, QueueConfig};
pub use types::{HopperError, Result};
