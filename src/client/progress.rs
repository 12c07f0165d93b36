use crate::client::constants::*;
use crate::client::measurement::Sample;
use crate::client::statistics::percentile;
use crate::error::{Error, Result};
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::{Duration, Instant};

/// Progress bar with live round-trip statistics
pub struct ProgressTracker {
    pb: ProgressBar,
    last_update: Instant,
    update_interval: usize,
}

impl ProgressTracker {
    /// Create a new progress tracker
    pub fn new(packet_count: usize, update_interval: usize) -> Result<Self> {
        let pb = ProgressBar::new(packet_count as u64);
        pb.set_style(
            ProgressStyle::with_template(
                "{msg}\n{bar:40.cyan/blue} {pos:>7}/{len:7} [{elapsed_precise}]",
            )
            .map_err(|e| Error::Measurement(format!("Failed to create progress style: {}", e)))?
            .progress_chars("█░"),
        );
        pb.enable_steady_tick(Duration::from_millis(PROGRESS_TICK_INTERVAL_MS));

        Ok(Self {
            pb,
            last_update: Instant::now(),
            update_interval: update_interval.max(1),
        })
    }

    /// Update progress and live statistics
    pub fn update(&mut self, samples: &[Sample], start_time: Instant, packet_index: usize) -> Result<()> {
        self.pb.inc(1);

        if (packet_index + 1) % self.update_interval == 0
            || self.last_update.elapsed().as_millis() > LIVE_STATS_UPDATE_INTERVAL_MS as u128
        {
            if !samples.is_empty() {
                self.update_live_stats(samples, start_time)?;
            }
            self.last_update = Instant::now();
        }
        Ok(())
    }

    fn update_live_stats(&self, samples: &[Sample], start_time: Instant) -> Result<()> {
        let last = samples
            .last()
            .ok_or_else(|| Error::Measurement("No samples available".into()))?;
        let mean = samples.iter().map(|s| s.rtt_us).sum::<f64>() / samples.len() as f64;

        let mut sorted: Vec<f64> = samples.iter().map(|s| s.rtt_us).collect();
        sorted.sort_by(|a, b| a.total_cmp(b));
        let p99 = percentile(&sorted, 99.0);

        let elapsed = start_time.elapsed().as_secs_f64();
        let rate = if elapsed > 0.0 {
            samples.len() as f64 / elapsed
        } else {
            0.0
        };

        let last_ms = last.rtt_us / 1000.0;
        let mean_ms = mean / 1000.0;

        let last_str = format!("{:.3}", last_ms);
        let mean_str = format!("{:.3}", mean_ms);

        let last_color = if last_ms < EXCELLENT_LATENCY_MS {
            last_str.green()
        } else if last_ms < ACCEPTABLE_LATENCY_MS {
            last_str.yellow()
        } else {
            last_str.red()
        };

        let mean_color = if mean_ms < ACCEPTABLE_LATENCY_MS {
            mean_str.green()
        } else {
            mean_str.red()
        };

        let msg = format!(
            "→ RTT {}ms | Mean: {}ms | P99: {:.3}ms | One-way: {:.3}ms | Rate: {:.1} pkt/s",
            last_color,
            mean_color,
            p99 / 1000.0,
            last.one_way_latency_us / 1000.0,
            rate
        );
        self.pb.set_message(msg);
        Ok(())
    }

    /// Run `f` with the bar cleared so its output lands on clean lines
    pub fn suspend<F: FnOnce() -> R, R>(&self, f: F) -> R {
        self.pb.suspend(f)
    }

    /// Finish the progress bar
    pub fn finish(&mut self) {
        self.pb.finish();
    }

    /// Final update of statistics before finishing
    pub fn final_update(&mut self, samples: &[Sample], start_time: Instant) -> Result<()> {
        if !samples.is_empty() {
            self.update_live_stats(samples, start_time)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::SequenceNumber;

    fn sample(seq: u64, rtt_us: f64) -> Sample {
        Sample {
            sequence: SequenceNumber(seq),
            packet_size: 64,
            one_way_latency_us: rtt_us / 2.0,
            rtt_us,
            server_processing_us: 5.0,
            client_send_ts: seq * 1_000,
        }
    }

    #[test]
    fn test_suspend_returns_closure_value() -> Result<()> {
        let tracker = ProgressTracker::new(10, 5)?;
        let mut ran = false;
        let value = tracker.suspend(|| {
            ran = true;
            42
        });
        assert!(ran);
        assert_eq!(value, 42);
        Ok(())
    }

    #[test]
    fn test_update_advances_position() -> Result<()> {
        let mut tracker = ProgressTracker::new(4, 2)?;
        let samples = vec![sample(1, 300.0), sample(2, 500.0)];
        let start = Instant::now();
        for i in 0..samples.len() {
            tracker.update(&samples[..=i], start, i)?;
        }
        assert_eq!(tracker.pb.position(), 2);
        tracker.final_update(&samples, start)?;
        tracker.finish();
        assert!(tracker.pb.is_finished());
        Ok(())
    }
}
