//! Server run settings, resolved from the command line by [`crate::config::Cli`].

use crate::config::{AddressFamily, Transport, DEFAULT_PORT};
use std::net::SocketAddr;

/// Default bound on concurrently served TCP connections
pub const DEFAULT_MAX_CONNECTIONS: usize = 64;

/// Default monitor refresh interval in milliseconds
pub const DEFAULT_UPDATE_INTERVAL_MS: u64 = 100;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub bind: SocketAddr,
    pub transport: Transport,
    /// Connections accepted beyond this are closed immediately (TCP only)
    pub max_connections: usize,
    pub update_interval_ms: u64,
    /// Disable the live status line
    pub quiet: bool,
}

impl ServerConfig {
    /// Wildcard bind on the default port for `family`.
    pub fn new(family: AddressFamily, transport: Transport) -> Self {
        Self {
            bind: SocketAddr::new(family.unspecified(), DEFAULT_PORT),
            transport,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            update_interval_ms: DEFAULT_UPDATE_INTERVAL_MS,
            quiet: false,
        }
    }

    pub fn family(&self) -> AddressFamily {
        if self.bind.is_ipv6() {
            AddressFamily::V6
        } else {
            AddressFamily::V4
        }
    }
}
