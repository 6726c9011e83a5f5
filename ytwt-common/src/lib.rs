//! # ytwt common library
//!
//! Shared code for the watch-time calculator:
//! - Error type used by configuration and snapshot I/O
//! - TOML configuration file loading and default locations
//! - Pipeline progress events and the broadcast event bus
//! - Timestamp parsing for history records and date bounds
//! - Duration unit conversion and human-readable formatting

pub mod config;
pub mod error;
pub mod events;
pub mod human_time;
pub mod time;

pub use error::{Error, Result};
