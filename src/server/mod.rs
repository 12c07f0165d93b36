//! Echo server side: stamps every probe with server timestamps and sends it back

pub mod config;
pub mod echo;
pub mod limiter;
pub mod monitor;
pub mod tcp;
pub mod udp;

pub use config::ServerConfig;
pub use limiter::{ConnectionLimiter, ConnectionPermit};
pub use monitor::{ServerCounters, ServerMonitor, ServerStats};
pub use tcp::TcpEchoServer;
pub use udp::UdpEchoServer;

use crate::config::Transport;
use crate::error::Result;
use crate::shutdown::ShutdownFlag;
use tracing::{error, info};

/// Sleep between accept attempts on the non-blocking listener (milliseconds)
pub const ACCEPT_POLL_INTERVAL_MS: u64 = 50;

/// Read timeout used to re-check the shutdown flag (milliseconds)
pub const READ_TIMEOUT_MS: u64 = 200;

/// Bind and serve until `shutdown` is requested.
///
/// Bind failures are returned before anything is served.
pub fn run(config: &ServerConfig, shutdown: &ShutdownFlag) -> Result<ServerStats> {
    let monitor = ServerMonitor::new(config.update_interval_ms);

    // Bind first so a failure never leaves a status line running.
    enum Bound {
        Tcp(TcpEchoServer),
        Udp(UdpEchoServer),
    }
    let bound = match config.transport {
        Transport::Tcp => Bound::Tcp(TcpEchoServer::bind(
            config.bind,
            config.max_connections,
            monitor.counters(),
        )?),
        Transport::Udp => Bound::Udp(UdpEchoServer::bind(config.bind, monitor.counters())?),
    };

    info!(
        transport = %config.transport,
        family = %config.family(),
        address = %config.bind,
        update_interval_ms = config.update_interval_ms,
        quiet_mode = config.quiet,
        "Netprobe echo server starting"
    );

    let display_stop = ShutdownFlag::new();
    let display = if config.quiet {
        info!("Running in quiet mode (terminal UI disabled)");
        None
    } else {
        Some(monitor.start_display(display_stop.clone()))
    };

    let result = match bound {
        Bound::Tcp(server) => server.run(shutdown),
        Bound::Udp(server) => server.run(shutdown),
    };

    display_stop.request();
    if let Some(handle) = display {
        if handle.join().is_err() {
            error!("Monitor display thread panicked");
        }
    }

    monitor.log_summary();
    result.map(|()| monitor.stats())
}
