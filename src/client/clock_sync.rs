//! Client-side clock offset estimation.
//!
//! Each round is a four-timestamp exchange in the style of NTP:
//!
//! ```text
//!   client             server
//!   t1 ───probe──────▶ t2
//!   t4 ◀────echo────── t3
//! ```
//!
//! `rtt = (t4 - t1) - (t3 - t2)` and `offset = ((t2 - t1) + (t3 - t4)) / 2`.
//! The round with the smallest RTT is the one least disturbed by queuing, so its
//! offset is kept. The server never adjusts anything; it only reports its clock.

use crate::client::constants::SYNC_ATTEMPT_FACTOR;
use crate::client::measurement::await_echo;
use crate::protocol::{Packet, SYNC_SEQUENCE_SPAN};
use crate::time::{delta_us, timestamp_us};
use crate::transport::NetworkSocket;
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Server clock minus client clock, in microseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockOffset(pub i64);

/// Timestamps of one completed sync exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncRound {
    pub t1: u64,
    pub t2: u64,
    pub t3: u64,
    pub t4: u64,
}

impl SyncRound {
    pub fn rtt_us(&self) -> i64 {
        delta_us(self.t4, self.t1) - delta_us(self.t3, self.t2)
    }

    pub fn offset_us(&self) -> i64 {
        (delta_us(self.t2, self.t1) + delta_us(self.t3, self.t4)) / 2
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncOutcome {
    pub offset: ClockOffset,
    pub min_rtt_us: i64,
    pub successful_rounds: usize,
    pub attempts: usize,
}

/// Offset of the round with the smallest RTT; the earliest round wins ties.
pub fn best_offset(rounds: &[SyncRound]) -> Option<(ClockOffset, i64)> {
    rounds
        .iter()
        .min_by_key(|round| round.rtt_us())
        .map(|round| (ClockOffset(round.offset_us()), round.rtt_us()))
}

/// Run one sync exchange. `attempt` selects the reserved sequence number.
fn sync_round<S: NetworkSocket>(socket: &mut S, attempt: usize) -> crate::Result<SyncRound> {
    let t1 = timestamp_us();
    let probe = Packet::sync_probe(attempt, t1);
    socket.send_packet(&probe)?;
    let echo = await_echo(socket, probe.sequence)?;
    let t4 = timestamp_us();
    Ok(SyncRound {
        t1,
        t2: echo.server_recv_ts,
        t3: echo.server_send_ts,
        t4,
    })
}

/// Estimate the clock offset against the server.
///
/// Runs until `rounds` exchanges succeed, pausing `pacing` between attempts.
/// Failed rounds are skipped and do not count; after `rounds * 3` attempts (never
/// more than the reserved sequence range holds) the estimate uses whatever
/// succeeded. Returns `None` if nothing did.
pub fn synchronize_clocks<S: NetworkSocket>(
    socket: &mut S,
    rounds: usize,
    pacing: Duration,
) -> Option<SyncOutcome> {
    info!(rounds = rounds, "Attempting clock synchronization with server");

    // One reserved sequence number per attempt, so a late echo of a failed
    // attempt never matches a later one.
    let max_attempts = (rounds * SYNC_ATTEMPT_FACTOR).min(SYNC_SEQUENCE_SPAN as usize);
    let mut completed = Vec::with_capacity(rounds);
    let mut attempts = 0usize;

    while completed.len() < rounds && attempts < max_attempts {
        match sync_round(socket, attempts) {
            Ok(round) => {
                debug!(
                    attempt = attempts,
                    rtt_us = round.rtt_us(),
                    offset_us = round.offset_us(),
                    "Sync round completed"
                );
                completed.push(round);
            }
            Err(e) => warn!(attempt = attempts, error = %e, "Sync round failed"),
        }
        attempts += 1;

        if completed.len() < rounds && attempts < max_attempts {
            thread::sleep(pacing);
        }
    }

    let (offset, min_rtt_us) = best_offset(&completed)?;
    info!(
        offset_us = offset.0,
        offset_ms = offset.0 as f64 / 1000.0,
        min_rtt_us = min_rtt_us,
        rounds = completed.len(),
        "Clock synchronization complete"
    );
    Some(SyncOutcome {
        offset,
        min_rtt_us,
        successful_rounds: completed.len(),
        attempts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::transport::MockNetworkSocket;
    use std::sync::{Arc, Mutex};

    fn round(t1: u64, t2: u64, t3: u64, t4: u64) -> SyncRound {
        SyncRound { t1, t2, t3, t4 }
    }

    #[test]
    fn test_round_arithmetic() {
        // server 1000 µs ahead, 50 µs each way, 10 µs processing
        let r = round(10_000, 11_050, 11_060, 10_110);
        assert_eq!(r.rtt_us(), 100);
        assert_eq!(r.offset_us(), 1000);
    }

    #[test]
    fn test_offset_can_be_negative() {
        // server 500 µs behind
        let r = round(10_000, 9_550, 9_550, 10_100);
        assert_eq!(r.offset_us(), -500);
    }

    #[test]
    fn test_best_offset_uses_min_rtt_round() {
        let rounds = [
            round(0, 1_300, 1_300, 400),   // rtt 400, offset 1100
            round(0, 1_040, 1_040, 80),    // rtt 80, offset 1000
            round(0, 1_500, 1_510, 1_000), // rtt 990, offset 1005
        ];
        assert_eq!(best_offset(&rounds), Some((ClockOffset(1000), 80)));
    }

    #[test]
    fn test_best_offset_tie_keeps_first() {
        let rounds = [round(0, 50, 50, 100), round(0, 70, 70, 100)];
        assert_eq!(best_offset(&rounds), Some((ClockOffset(0), 100)));
    }

    #[test]
    fn test_best_offset_empty() {
        assert_eq!(best_offset(&[]), None);
    }

    /// Mock server whose clock is `skew` µs ahead of ours.
    fn skewed_server(skew: u64, fail_every_other: bool) -> MockNetworkSocket {
        let last = Arc::new(Mutex::new(None::<Packet>));
        let sent = Arc::clone(&last);
        let mut mock = MockNetworkSocket::new();
        mock.expect_send_packet().returning(move |p| {
            assert!(p.sequence.is_sync());
            let mut echo = p.clone();
            let now = timestamp_us() + skew;
            echo.server_recv_ts = now;
            echo.server_send_ts = now;
            *sent.lock().unwrap() = Some(echo);
            Ok(p.declared_size())
        });
        let mut calls = 0usize;
        mock.expect_recv_packet().returning(move || {
            calls += 1;
            if fail_every_other && calls % 2 == 0 {
                return Err(Error::Timeout);
            }
            Ok(last.lock().unwrap().clone().unwrap())
        });
        mock
    }

    #[test]
    fn test_synchronize_estimates_server_skew() {
        let skew = 5_000_000;
        let mut socket = skewed_server(skew, false);
        let outcome = synchronize_clocks(&mut socket, 5, Duration::ZERO).unwrap();
        assert_eq!(outcome.successful_rounds, 5);
        assert_eq!(outcome.attempts, 5);
        // local loop adds a few µs at most
        assert!((outcome.offset.0 - skew as i64).abs() < 50_000);
    }

    #[test]
    fn test_failed_rounds_do_not_count() {
        let mut socket = skewed_server(0, true);
        let outcome = synchronize_clocks(&mut socket, 4, Duration::ZERO).unwrap();
        assert_eq!(outcome.successful_rounds, 4);
        assert_eq!(outcome.attempts, 7);
    }

    #[test]
    fn test_all_rounds_failing_yields_none() {
        let mut socket = MockNetworkSocket::new();
        socket.expect_send_packet().returning(|p| Ok(p.declared_size()));
        socket.expect_recv_packet().returning(|| Err(Error::Timeout));
        assert_eq!(synchronize_clocks(&mut socket, 3, Duration::ZERO), None);
    }

    #[test]
    fn test_attempts_never_reuse_a_sequence_number() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&seen);
        let mut socket = MockNetworkSocket::new();
        socket.expect_send_packet().returning(move |p| {
            log.lock().unwrap().push(p.sequence);
            Ok(p.declared_size())
        });
        socket.expect_recv_packet().returning(|| Err(Error::Timeout));

        assert_eq!(synchronize_clocks(&mut socket, 10, Duration::ZERO), None);

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), SYNC_SEQUENCE_SPAN as usize);
        assert!(seen.iter().all(|s| s.is_sync()));
        let mut unique: Vec<u64> = seen.iter().map(|s| s.0).collect();
        unique.sort_unstable();
        unique.dedup();
        assert_eq!(unique.len(), seen.len());
    }
}
