//! Queue orchestration
//!
//! Sequences the subscribe handshake, decides when to pull more work, and
//! drains the local batch through the caller's job handler one item at a
//! time.

pub mod batch;
pub mod orchestrator;
pub mod state;

pub use batch::Batch;
pub use orchestrator::{JobHandler, Queue, QueueConfig};
pub use state::SharedState;
