//! # Feed Core Library
//!
//! Shared foundation for the KRX derivatives market-data processes.
//!
//! ## Modules
//! - `model`: Categories, feed kinds and the packet types that travel over the bus.
//! - `classifier`: Header inspection that assigns each packet to one of six categories.
//! - `comms`: Topic based publish/subscribe bus (ZMQ, Memory).
//! - `receiver`: Multicast ingestion, inline classification and publishing.
//! - `session`: Trading-session window and wall clock.
//! - `fs`: Daily log file layout and the rotating raw packet writer.
//! - `saver`: Per-category subscriber loops that persist the bus stream.
//! - `config`: Typed JSON configuration, validated eagerly.
//! - `args`: Standardized argument parsing.
//! - `stats`: Counters and status summaries for operators.
//! - `backoff`: Exponential retry delays with jitter.
//! - `signal`: Ctrl+C / SIGTERM handling for the binaries.

pub mod args;
pub mod backoff;
pub mod classifier;
pub mod comms;
pub mod config;
pub mod fs;
pub mod model;
pub mod receiver;
pub mod saver;
pub mod session;
pub mod signal;
pub mod stats;
