//! WebSocket client layer
//!
//! Owns the persistent connection to the queue server, reconnects on
//! abnormal termination, and dispatches inbound envelopes to a pluggable
//! event handler.

pub mod connection;

pub use connection::{Connection, ConnectionConfig, ConnectionHandle, EventHandler};
