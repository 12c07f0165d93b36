use crate::client::measurement::Sample;
use std::time::Duration;
use tracing::debug;

/// Summary of one series of samples (one-way latency or RTT), in microseconds.
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesStats {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub median: f64,
    pub p90: f64,
    pub p95: f64,
    pub p99: f64,
    /// Population standard deviation
    pub std_dev: f64,
    /// Mean absolute difference between consecutive samples, in arrival order
    pub jitter: f64,
}

impl SeriesStats {
    /// Reduce `values` (in arrival order). `None` for an empty series.
    pub fn from_series(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }

        let mut min = values[0];
        let mut max = values[0];
        let mut sum = 0.0;
        for &value in values {
            min = min.min(value);
            max = max.max(value);
            sum += value;
        }
        let mean = sum / values.len() as f64;

        let mut sorted = values.to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));

        Some(Self {
            min,
            max,
            mean,
            median: percentile(&sorted, 50.0),
            p90: percentile(&sorted, 90.0),
            p95: percentile(&sorted, 95.0),
            p99: percentile(&sorted, 99.0),
            std_dev: std_dev(values, mean),
            jitter: jitter(values),
        })
    }
}

/// Index of percentile `p` in a sorted array of `n` elements:
/// `clamp(ceil(p/100 * n) - 1, 0, n - 1)`.
pub fn percentile_index(p: f64, n: usize) -> usize {
    if n == 0 {
        return 0;
    }
    // Hundredths of a percent keep the ceiling in integer arithmetic.
    let basis_points = (p.clamp(0.0, 100.0) * 100.0).round() as u64;
    let rank = (basis_points * n as u64).div_ceil(10_000);
    (rank.saturating_sub(1) as usize).min(n - 1)
}

/// Percentile `p` of an ascending-sorted slice; 0 for an empty slice.
pub fn percentile(sorted: &[f64], p: f64) -> f64 {
    sorted
        .get(percentile_index(p, sorted.len()))
        .copied()
        .unwrap_or(0.0)
}

pub fn std_dev(values: &[f64], mean: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let variance =
        values.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

pub fn jitter(values: &[f64]) -> f64 {
    if values.len() <= 1 {
        return 0.0;
    }
    let total: f64 = values.windows(2).map(|w| (w[1] - w[0]).abs()).sum();
    total / (values.len() - 1) as f64
}

pub fn packet_loss_pct(sent: usize, received: usize) -> f64 {
    if sent == 0 {
        return 0.0;
    }
    100.0 * sent.saturating_sub(received) as f64 / sent as f64
}

/// Statistics over a run with at least one sample
#[derive(Debug, Clone, PartialEq)]
pub struct Statistics {
    pub sent: usize,
    pub received: usize,
    pub packet_size: usize,
    pub one_way: SeriesStats,
    pub rtt: SeriesStats,
    pub server_processing_mean_us: f64,
    pub packet_loss_pct: f64,
    /// Span used for throughput: first to last send plus one interval
    pub duration_secs: f64,
    pub throughput_bps: f64,
}

impl Statistics {
    pub fn count(&self) -> usize {
        self.received
    }
}

/// Outcome of reducing a sample set
#[derive(Debug, Clone, PartialEq)]
pub enum Summary {
    /// Nothing completed; only the send count is meaningful
    NoData { sent: usize },
    Complete(Box<Statistics>),
}

impl Summary {
    /// Reduce a run's samples.
    ///
    /// `sent` is the number of packets attempted; `interval` the configured gap
    /// between packets, used to close the throughput window.
    pub fn from_samples(
        samples: &[Sample],
        sent: usize,
        packet_size: usize,
        interval: Duration,
    ) -> Self {
        debug!(
            sample_count = samples.len(),
            sent = sent,
            "Creating statistics from samples"
        );

        let one_way: Vec<f64> = samples.iter().map(|s| s.one_way_latency_us).collect();
        let rtt: Vec<f64> = samples.iter().map(|s| s.rtt_us).collect();
        let (Some(one_way), Some(rtt)) = (
            SeriesStats::from_series(&one_way),
            SeriesStats::from_series(&rtt),
        ) else {
            return Summary::NoData { sent };
        };

        let received = samples.len();
        let interval_secs = interval.as_secs_f64();
        let duration_secs = match (samples.first(), samples.last()) {
            (Some(first), Some(last)) if received > 1 => {
                last.client_send_ts.saturating_sub(first.client_send_ts) as f64 / 1_000_000.0
                    + interval_secs
            }
            _ => interval_secs,
        };
        let throughput_bps = if duration_secs > 0.0 {
            (received * packet_size * 8) as f64 / duration_secs
        } else {
            0.0
        };

        let server_processing_mean_us =
            samples.iter().map(|s| s.server_processing_us).sum::<f64>() / received as f64;

        let stats = Statistics {
            sent,
            received,
            packet_size,
            one_way,
            rtt,
            server_processing_mean_us,
            packet_loss_pct: packet_loss_pct(sent, received),
            duration_secs,
            throughput_bps,
        };

        debug!(
            min_us = stats.one_way.min,
            max_us = stats.one_way.max,
            mean_us = stats.one_way.mean,
            loss_pct = stats.packet_loss_pct,
            "Statistics calculated successfully"
        );

        Summary::Complete(Box::new(stats))
    }

    pub fn statistics(&self) -> Option<&Statistics> {
        match self {
            Summary::Complete(stats) => Some(stats),
            Summary::NoData { .. } => None,
        }
    }
}
