//! Wire protocol for the job-queue server
//!
//! Every message in either direction is a JSON envelope tagged by its
//! required `action` field. Inbound envelopes are classified into a closed
//! enum; outbound operations are built from small typed variants.

pub mod envelope;

pub use envelope::{classify, Inbound, Outbound};
