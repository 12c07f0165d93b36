use crate::client::constants::{
    HISTOGRAM_FIRST_BUCKET_US, HISTOGRAM_HIGH_BOUND_US, HISTOGRAM_LOW_BOUND_US,
    HISTOGRAM_SIGNIFICANT_DIGITS,
};
use crate::client::clock_sync::SyncOutcome;
use crate::client::measurement::{LatencyEstimator, Sample};
use crate::client::session::ClientReport;
use crate::client::statistics::{SeriesStats, Statistics, Summary};
use crate::error::{Error, Result};
use colored::*;
use hdrhistogram::Histogram;
use tracing::{debug, info, warn};

/// Reporter for printing measurement results
pub struct Reporter;

// Constants for histogram visualization
const HISTOGRAM_BAR_WIDTH: usize = 30;
const EMPTY_BUCKET_SKIP_THRESHOLD: usize = 5;

// Percentage thresholds for color coding
const HIGH_PERCENTAGE_THRESHOLD: f64 = 50.0;
const MEDIUM_PERCENTAGE_THRESHOLD: f64 = 10.0;

// Percentage thresholds for formatting precision
const LOW_PERCENTAGE_THRESHOLD: f64 = 0.1;
const MEDIUM_PRECISION_THRESHOLD: f64 = 1.0;

// Width for histogram labels (must be consistent for alignment)
const LABEL_WIDTH: usize = 14;

/// One row of the RTT distribution
#[derive(Debug, Clone, PartialEq, Eq)]
struct Bucket {
    lower_us: u64,
    upper_us: u64,
    count: u64,
}

impl Reporter {
    /// Renders a bar scaled against the largest bucket.
    ///
    /// Bars that would round to zero width fall back to a partial block so
    /// that small but non-empty buckets stay visible.
    fn render_bar_from_percentage(
        percentage: f64,
        max_percentage: f64,
        bar_width: usize,
    ) -> String {
        if percentage <= 0.0 {
            return String::new();
        }

        let bar_length_fractional = if max_percentage > 0.0 {
            (percentage / max_percentage) * bar_width as f64
        } else {
            0.0
        };
        let bar_length = bar_length_fractional as usize;

        if bar_length >= bar_width {
            "█".repeat(bar_width)
        } else if bar_length >= 1 {
            "█".repeat(bar_length)
        } else {
            match bar_length_fractional.fract() {
                f if f >= 0.75 => "▊".to_string(),
                f if f >= 0.5 => "▌".to_string(),
                f if f >= 0.25 => "▎".to_string(),
                _ => "▏".to_string(),
            }
        }
    }

    /// Percentage with precision that grows as the value shrinks, 5 chars wide
    fn format_percentage(percentage: f64) -> String {
        if percentage < LOW_PERCENTAGE_THRESHOLD {
            format!("{:5.3}%", percentage)
        } else if percentage < MEDIUM_PRECISION_THRESHOLD {
            format!("{:5.2}%", percentage)
        } else {
            format!("{:5.1}%", percentage)
        }
    }

    /// Formats a count value for display, using "k" suffix for thousands.
    fn format_count(count: u64) -> String {
        if count >= 1000 {
            format!("{:>6}k", count / 1000)
        } else {
            format!("{:>7}", count)
        }
    }

    /// Pads first, then colors, so ANSI codes don't break alignment.
    fn colorize_label(label: &str, percentage: f64) -> String {
        let padded_label = format!("{:>width$}", label, width = LABEL_WIDTH);
        if percentage > HIGH_PERCENTAGE_THRESHOLD {
            padded_label.green().to_string()
        } else if percentage > MEDIUM_PERCENTAGE_THRESHOLD {
            padded_label.cyan().to_string()
        } else {
            padded_label.to_string()
        }
    }

    fn format_bound(us: u64) -> String {
        if us < 1000 {
            format!("{}µs", us)
        } else if us % 1000 == 0 {
            format!("{}ms", us / 1000)
        } else {
            format!("{:.1}ms", us as f64 / 1000.0)
        }
    }

    fn bucket_label(bucket: &Bucket) -> String {
        if bucket.lower_us == 0 {
            format!("<{}", Self::format_bound(bucket.upper_us))
        } else {
            format!(
                "{}-{}",
                Self::format_bound(bucket.lower_us),
                Self::format_bound(bucket.upper_us)
            )
        }
    }

    fn ms(us: f64) -> f64 {
        us / 1000.0
    }

    fn print_series(title: &str, series: &SeriesStats) {
        println!("{}", title.bold());
        println!("  Min:       {:>10.3} ms", Self::ms(series.min));
        println!("  Max:       {:>10.3} ms", Self::ms(series.max));
        println!("  Mean:      {:>10.3} ms", Self::ms(series.mean));
        println!("  Median:    {:>10.3} ms", Self::ms(series.median));
        println!("  P90:       {:>10.3} ms", Self::ms(series.p90));
        println!("  P95:       {:>10.3} ms", Self::ms(series.p95));
        println!("  P99:       {:>10.3} ms", Self::ms(series.p99));
        println!("  Std Dev:   {:>10.3} ms", Self::ms(series.std_dev));
        println!(
            "  Jitter:    {:>10.3} ms  ← mean change between consecutive packets",
            Self::ms(series.jitter)
        );
        println!();
    }

    fn format_throughput(bps: f64) -> String {
        if bps >= 1_000_000.0 {
            format!("{:.2} Mbps", bps / 1_000_000.0)
        } else {
            format!("{:.2} Kbps", bps / 1000.0)
        }
    }

    fn estimator_note(estimator: LatencyEstimator) -> String {
        match estimator {
            LatencyEstimator::Synchronized(offset) => format!(
                "clock-synchronized, server offset {:+.3} ms",
                offset.0 as f64 / 1000.0
            ),
            LatencyEstimator::HalfRoundTrip => "estimated as RTT/2".to_string(),
        }
    }

    fn sync_note(sync: &SyncOutcome) -> String {
        format!(
            "offset {:+.3} ms, best RTT {:.3} ms ({} rounds in {} attempts)",
            sync.offset.0 as f64 / 1000.0,
            sync.min_rtt_us as f64 / 1000.0,
            sync.successful_rounds,
            sync.attempts
        )
    }

    /// Print the complete results summary
    pub fn print_results(&self, report: &ClientReport) -> Result<()> {
        debug!(
            packets_received = report.measurement.samples.len(),
            packets_sent = report.measurement.sent,
            "Printing measurement results"
        );

        println!("\n{}", "┌─────────────────────────────┐".cyan());
        println!("{}", "│  Netprobe Results           │".cyan());
        println!("{}", "└─────────────────────────────┘".cyan());
        println!();

        println!(
            "Target:   {} ({} over {})",
            report.target, report.transport, report.family
        );
        println!("Packets:  {} bytes each", report.packet_size);
        if let Some(sync) = &report.sync {
            println!("Sync:     {}", Self::sync_note(sync));
        }
        println!(
            "Elapsed:  {:.2}s wall clock",
            report.measurement.elapsed.as_secs_f64()
        );

        if report.measurement.interrupted {
            println!("{}", "          └─ Interrupted before all packets were sent".yellow());
        }
        if report.measurement.disconnected {
            println!("{}", "          └─ Connection lost during measurement".yellow());
        }

        let stats = match &report.summary {
            Summary::NoData { sent } => {
                warn!(sent = sent, "No successful measurements recorded");
                println!("Sent:     {}", sent);
                println!();
                println!("{}", "No successful measurements recorded.".red());
                return Ok(());
            }
            Summary::Complete(stats) => stats,
        };

        self.print_statistics(stats, report.estimator)?;
        self.print_rtt_distribution(&report.measurement.samples)?;

        if let Some(path) = &report.csv_path {
            println!();
            println!("Samples written to {}", path.display());
        }

        info!(
            mean_rtt_ms = Self::ms(stats.rtt.mean),
            jitter_ms = Self::ms(stats.rtt.jitter),
            loss_pct = stats.packet_loss_pct,
            "Results reported"
        );
        Ok(())
    }

    fn print_statistics(&self, stats: &Statistics, estimator: LatencyEstimator) -> Result<()> {
        let loss = format!(
            "{} sent, {} received, {:.2}% loss",
            stats.sent, stats.received, stats.packet_loss_pct
        );
        if stats.packet_loss_pct > 0.0 {
            println!("Sent:     {}", loss.yellow());
        } else {
            println!("Sent:     {}", loss);
        }
        println!(
            "Duration: {:.2}s at {}",
            stats.duration_secs,
            Self::format_throughput(stats.throughput_bps)
        );
        println!();

        Self::print_series(
            &format!("One-way latency ({})", Self::estimator_note(estimator)),
            &stats.one_way,
        );
        Self::print_series("Round-trip time", &stats.rtt);

        println!(
            "Server processing: {:.3} ms mean",
            Self::ms(stats.server_processing_mean_us)
        );
        println!();
        Ok(())
    }

    /// Group RTTs into doubling buckets starting at the first bucket width
    fn rtt_buckets(samples: &[Sample]) -> Result<Vec<Bucket>> {
        let mut histogram = Histogram::<u64>::new_with_bounds(
            HISTOGRAM_LOW_BOUND_US,
            HISTOGRAM_HIGH_BOUND_US,
            HISTOGRAM_SIGNIFICANT_DIGITS,
        )
        .map_err(|e| Error::Measurement(format!("Failed to create histogram: {}", e)))?;

        for sample in samples {
            let rtt = sample.rtt_us.max(0.0).round() as u64;
            histogram.saturating_record(rtt.max(HISTOGRAM_LOW_BOUND_US));
        }

        // Bounds follow the iteration levels exactly so labels stay round.
        let mut buckets = Vec::new();
        let mut lower_us = 0;
        for (i, step) in histogram.iter_log(HISTOGRAM_FIRST_BUCKET_US, 2.0).enumerate() {
            let upper_us = HISTOGRAM_FIRST_BUCKET_US.saturating_mul(1 << i.min(40));
            buckets.push(Bucket {
                lower_us,
                upper_us,
                count: step.count_since_last_iteration(),
            });
            lower_us = upper_us;
        }
        Ok(buckets)
    }

    /// Print the RTT distribution as a bar chart
    pub fn print_rtt_distribution(&self, samples: &[Sample]) -> Result<()> {
        if samples.is_empty() {
            return Ok(());
        }
        println!("Round-trip distribution (packet count by range):");
        println!();

        let buckets = Self::rtt_buckets(samples)?;
        let total = samples.len() as f64;
        let percentages: Vec<f64> = buckets
            .iter()
            .map(|b| b.count as f64 / total * 100.0)
            .collect();
        let max_percentage = percentages.iter().fold(0.0f64, |a, &b| a.max(b));

        for (i, bucket) in buckets.iter().enumerate() {
            if bucket.count == 0 && i > EMPTY_BUCKET_SKIP_THRESHOLD {
                continue;
            }
            let percentage = percentages[i];
            let bar =
                Self::render_bar_from_percentage(percentage, max_percentage, HISTOGRAM_BAR_WIDTH);
            println!(
                "  {}:  {:30} {} ({} packets)",
                Self::colorize_label(&Self::bucket_label(bucket), percentage),
                bar,
                Self::format_percentage(percentage),
                Self::format_count(bucket.count)
            );
        }
        Ok(())
    }
}
