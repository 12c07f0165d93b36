//! Constants used throughout the client

/// Default number of clock synchronization rounds
pub const DEFAULT_SYNC_ROUNDS: usize = 10;

/// Pause between clock synchronization rounds in milliseconds
pub const SYNC_ROUND_DELAY_MS: u64 = 50;

/// Sync gives up after this many attempts per requested round
pub const SYNC_ATTEMPT_FACTOR: usize = 3;

/// Stale responses discarded while waiting for one echo before giving up
pub const MAX_STALE_DISCARDS: usize = 8;

/// TCP connect timeout in milliseconds
pub const CONNECT_TIMEOUT_MS: u64 = 5000;

/// Progress bar tick interval in milliseconds
pub const PROGRESS_TICK_INTERVAL_MS: u64 = 100;

/// Live statistics update interval in milliseconds
pub const LIVE_STATS_UPDATE_INTERVAL_MS: u64 = 500;

/// Live statistics update interval in packets
pub const LIVE_STATS_UPDATE_PACKETS: usize = 10;

/// Histogram lower bound in microseconds
pub const HISTOGRAM_LOW_BOUND_US: u64 = 1;

/// Histogram upper bound in microseconds (one minute)
pub const HISTOGRAM_HIGH_BOUND_US: u64 = 60_000_000;

/// Histogram significant digits for precision
pub const HISTOGRAM_SIGNIFICANT_DIGITS: u8 = 3;

/// Width of the first distribution bucket in microseconds
pub const HISTOGRAM_FIRST_BUCKET_US: u64 = 50;

/// Excellent latency threshold in milliseconds
pub const EXCELLENT_LATENCY_MS: f64 = 0.5;

/// Acceptable latency threshold in milliseconds
pub const ACCEPTABLE_LATENCY_MS: f64 = 1.0;
