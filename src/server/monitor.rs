//! Server monitoring and statistics display

use crate::shutdown::ShutdownFlag;
use colored::*;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::info;

/// Time without packets before the status line shows IDLE (milliseconds).
const IDLE_THRESHOLD_MS: u64 = 150;

/// Blink interval for the activity indicator (milliseconds).
const BLINK_INTERVAL_MS: u64 = 200;

/// Lock-free counters shared by every receive loop and worker.
///
/// `Relaxed` ordering is enough: each counter is independent and only read
/// for display.
#[derive(Debug, Default)]
pub struct ServerCounters {
    packets_received: AtomicU64,
    packets_echoed: AtomicU64,
    sync_probes: AtomicU64,
    errors: AtomicU64,
    active_connections: AtomicU64,
    rejected_connections: AtomicU64,
}

impl ServerCounters {
    #[inline]
    pub fn increment_received(&self) {
        self.packets_received.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn increment_echoed(&self) {
        self.packets_echoed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn increment_sync(&self) {
        self.sync_probes.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn increment_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn increment_rejected(&self) {
        self.rejected_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_opened(&self) {
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        // Saturates so an unbalanced close can't wrap the gauge.
        let _ = self
            .active_connections
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1));
    }

    pub fn snapshot(&self, elapsed: Duration) -> ServerStats {
        ServerStats {
            packets_received: self.packets_received.load(Ordering::Relaxed),
            packets_echoed: self.packets_echoed.load(Ordering::Relaxed),
            sync_probes: self.sync_probes.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            active_connections: self.active_connections.load(Ordering::Relaxed),
            rejected_connections: self.rejected_connections.load(Ordering::Relaxed),
            elapsed,
        }
    }
}

/// Point-in-time server statistics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerStats {
    pub packets_received: u64,
    pub packets_echoed: u64,
    pub sync_probes: u64,
    pub errors: u64,
    pub active_connections: u64,
    pub rejected_connections: u64,
    pub elapsed: Duration,
}

/// Owns the shared counters and the optional live status line.
///
/// The display runs on its own thread; receive loops only touch atomics.
pub struct ServerMonitor {
    counters: Arc<ServerCounters>,
    start_time: Instant,
    update_interval: Duration,
}

impl ServerMonitor {
    pub fn new(update_interval_ms: u64) -> Self {
        Self {
            counters: Arc::new(ServerCounters::default()),
            start_time: Instant::now(),
            update_interval: Duration::from_millis(update_interval_ms),
        }
    }

    /// Handle to the counters for receive loops and workers.
    pub fn counters(&self) -> Arc<ServerCounters> {
        Arc::clone(&self.counters)
    }

    /// Start the background display thread; it exits once `stop` is requested.
    pub fn start_display(&self, stop: ShutdownFlag) -> JoinHandle<()> {
        let counters = Arc::clone(&self.counters);
        let start_time = self.start_time;
        let update_interval = self.update_interval;

        thread::spawn(move || {
            let mut last_received = 0u64;
            let mut last_packet_time = Instant::now();
            let mut blink_state = false;
            let mut last_blink_time = Instant::now();

            while !stop.is_requested() {
                thread::sleep(update_interval);

                let stats = counters.snapshot(start_time.elapsed());
                let now = Instant::now();

                let recent_received = stats.packets_received.saturating_sub(last_received);
                let is_idle = recent_received == 0
                    && now.duration_since(last_packet_time)
                        >= Duration::from_millis(IDLE_THRESHOLD_MS);

                if recent_received > 0 {
                    last_packet_time = now;
                }

                if !is_idle {
                    if now.duration_since(last_blink_time)
                        >= Duration::from_millis(BLINK_INTERVAL_MS)
                    {
                        blink_state = !blink_state;
                        last_blink_time = now;
                    }
                } else {
                    blink_state = false;
                }

                let indicator = Self::render_indicator(is_idle, blink_state);
                Self::display_status_line(&indicator, is_idle, &stats);

                last_received = stats.packets_received;
            }
            println!();
        })
    }

    fn render_indicator(is_idle: bool, blink_state: bool) -> String {
        if is_idle {
            "░".normal().to_string()
        } else if blink_state {
            "█".red().bold().to_string()
        } else {
            "░".red().to_string()
        }
    }

    fn status_line(indicator: &str, is_idle: bool, stats: &ServerStats) -> String {
        let status = if is_idle { "IDLE" } else { "ACTIVE" };
        format!(
            "{} [{}] Conns: {} | Received: {} | Echoed: {} | Sync: {} | Errors: {}",
            indicator,
            status,
            stats.active_connections,
            stats.packets_received,
            stats.packets_echoed,
            stats.sync_probes,
            stats.errors
        )
    }

    fn display_status_line(indicator: &str, is_idle: bool, stats: &ServerStats) {
        print!("\r{}", Self::status_line(indicator, is_idle, stats));
        std::io::Write::flush(&mut std::io::stdout()).ok();
    }

    /// Get current statistics.
    pub fn stats(&self) -> ServerStats {
        self.counters.snapshot(self.start_time.elapsed())
    }

    /// Log the totals, typically once on shutdown.
    pub fn log_summary(&self) {
        let stats = self.stats();
        info!(
            packets_received = stats.packets_received,
            packets_echoed = stats.packets_echoed,
            sync_probes = stats.sync_probes,
            errors = stats.errors,
            rejected_connections = stats.rejected_connections,
            elapsed_secs = stats.elapsed.as_secs_f64(),
            "Server statistics"
        );
    }
}
