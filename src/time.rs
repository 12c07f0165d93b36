use std::time::{SystemTime, UNIX_EPOCH};

/// Current wall-clock time in microseconds since the Unix epoch.
///
/// Wall-clock (not monotonic) time is required here: timestamps cross machines
/// and are compared against the peer's clock during synchronization.
pub fn timestamp_us() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or(0)
}

/// Signed difference `later - earlier` between two microsecond timestamps.
pub fn delta_us(later: u64, earlier: u64) -> i64 {
    later.wrapping_sub(earlier) as i64
}
