use crate::client::constants::DEFAULT_SYNC_ROUNDS;
use crate::config::{AddressFamily, Transport};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Client run settings, fixed for the whole run.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub target: SocketAddr,
    pub transport: Transport,
    /// Encoded size of every measurement packet, already clamped
    pub packet_size: usize,
    pub packet_count: usize,
    pub delay_ms: u64,
    /// Target rate; takes precedence over `delay_ms` when > 0
    pub rate_pps: u32,
    pub clock_sync: bool,
    pub sync_rounds: usize,
    pub warmup: usize,
    /// Receive timeout per exchange
    pub timeout: Duration,
    pub output: Option<PathBuf>,
    pub quiet: bool,
}

impl ClientConfig {
    /// Settings matching the CLI defaults, aimed at `target`.
    pub fn new(target: SocketAddr, transport: Transport) -> Self {
        Self {
            target,
            transport,
            packet_size: 1024,
            packet_count: 100,
            delay_ms: 100,
            rate_pps: 10,
            clock_sync: false,
            sync_rounds: DEFAULT_SYNC_ROUNDS,
            warmup: 0,
            timeout: Duration::from_millis(1000),
            output: None,
            quiet: false,
        }
    }

    /// Pause between consecutive measurement packets.
    pub fn interval(&self) -> Duration {
        if self.rate_pps > 0 {
            Duration::from_micros(1_000_000 / self.rate_pps as u64)
        } else {
            Duration::from_millis(self.delay_ms)
        }
    }

    pub fn family(&self) -> AddressFamily {
        if self.target.is_ipv6() {
            AddressFamily::V6
        } else {
            AddressFamily::V4
        }
    }
}
