//! Netprobe - network latency and jitter measurement tool
//!
//! This library provides both halves of a probe/echo pair: a client that sends
//! timestamped measurement packets over TCP or UDP and reduces the echoes to
//! latency, jitter, loss and throughput statistics, and a server that stamps and
//! echoes those packets back. An optional clock synchronization exchange lets the
//! client estimate true one-way latency instead of half the round trip.

pub mod client;
pub mod config;
pub mod error;
pub mod logging;
pub mod protocol;
pub mod server;
pub mod shutdown;
pub mod time;
pub mod transport;

pub use error::{Error, Result};
