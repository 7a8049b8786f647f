//! Shared types for hopper

pub mod error;

pub use error::{HopperError, Result};
