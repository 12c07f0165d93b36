use crate::client::clock_sync::ClockOffset;
use crate::client::constants::MAX_STALE_DISCARDS;
use crate::client::output::CsvWriter;
use crate::client::progress::ProgressTracker;
use crate::error::{Error, Result};
use crate::protocol::{Packet, ProtocolError, SequenceNumber};
use crate::shutdown::ShutdownFlag;
use crate::time::{delta_us, timestamp_us};
use crate::transport::NetworkSocket;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// How one-way latency is derived from an echoed packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LatencyEstimator {
    /// Server receive time corrected into the client's clock, minus client send time
    Synchronized(ClockOffset),
    /// Half of the round trip after removing server processing time
    HalfRoundTrip,
}

impl LatencyEstimator {
    pub fn one_way_us(&self, echo: &Packet) -> f64 {
        match self {
            LatencyEstimator::Synchronized(offset) => {
                (delta_us(echo.server_recv_ts, echo.client_send_ts) - offset.0) as f64
            }
            LatencyEstimator::HalfRoundTrip => {
                let rtt = delta_us(echo.client_recv_ts, echo.client_send_ts);
                (rtt - echo.server_processing_us()) as f64 / 2.0
            }
        }
    }
}

/// Represents a single completed exchange
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub sequence: SequenceNumber,
    pub packet_size: usize,
    pub one_way_latency_us: f64,
    pub rtt_us: f64,
    pub server_processing_us: f64,
    pub client_send_ts: u64,
}

impl Sample {
    /// Build a sample from a fully stamped echo.
    pub fn from_echo(echo: &Packet, estimator: LatencyEstimator) -> Self {
        Self {
            sequence: echo.sequence,
            packet_size: echo.declared_size(),
            one_way_latency_us: estimator.one_way_us(echo),
            rtt_us: delta_us(echo.client_recv_ts, echo.client_send_ts) as f64,
            server_processing_us: echo.server_processing_us() as f64,
            client_send_ts: echo.client_send_ts,
        }
    }
}

/// Parameters of one measurement phase
#[derive(Debug, Clone, Copy)]
pub struct PhasePlan {
    pub first_sequence: u64,
    pub count: usize,
    pub packet_size: usize,
    pub interval: Duration,
}

/// Results from a complete measurement phase
#[derive(Debug, Clone, Default)]
pub struct MeasurementResult {
    pub samples: Vec<Sample>,
    /// Packets actually attempted
    pub sent: usize,
    pub lost: usize,
    pub elapsed: Duration,
    /// Stopped early by a shutdown request
    pub interrupted: bool,
    /// Stopped early because the transport became unusable
    pub disconnected: bool,
}

/// Wait for the echo of `expected`, discarding stale responses.
///
/// Late echoes of earlier probes can arrive after their own timeout; those are
/// dropped until the awaited one shows up or the socket times out.
pub fn await_echo<S: NetworkSocket>(socket: &mut S, expected: SequenceNumber) -> Result<Packet> {
    let mut received = expected;
    for _ in 0..MAX_STALE_DISCARDS {
        let packet = socket.recv_packet()?;
        if packet.sequence == expected {
            return Ok(packet);
        }
        received = packet.sequence;
        debug!(
            expected = expected.0,
            received = received.0,
            "Discarding stale response"
        );
    }
    Err(Error::Protocol(ProtocolError::UnexpectedSequence {
        expected: expected.0,
        received: received.0,
    }))
}

/// Send one packet and turn its echo into a sample
pub fn measure_single_packet<S: NetworkSocket>(
    socket: &mut S,
    sequence: SequenceNumber,
    packet_size: usize,
    estimator: LatencyEstimator,
) -> Result<Sample> {
    let mut packet = Packet::new(sequence, packet_size);
    packet.client_send_ts = timestamp_us();

    socket.send_packet(&packet)?;
    let mut echo = await_echo(socket, sequence)?;
    echo.client_recv_ts = timestamp_us();

    let sample = Sample::from_echo(&echo, estimator);
    debug!(
        sequence = sequence.0,
        rtt_us = sample.rtt_us,
        one_way_us = sample.one_way_latency_us,
        "Packet received successfully"
    );
    Ok(sample)
}

/// Perform warmup exchanges to stabilize system conditions
///
/// Populates ARP tables and warms caches and connection state before measurement
/// begins. Results are discarded; failures only count toward the returned loss.
pub fn warmup_phase<S: NetworkSocket>(
    socket: &mut S,
    plan: &PhasePlan,
    shutdown: &ShutdownFlag,
) -> Result<usize> {
    let mut lost = 0usize;
    for i in 0..plan.count {
        if shutdown.is_requested() {
            break;
        }
        let sequence = SequenceNumber(plan.first_sequence + i as u64);
        match measure_single_packet(
            socket,
            sequence,
            plan.packet_size,
            LatencyEstimator::HalfRoundTrip,
        ) {
            Ok(_) => debug!(packet_num = i + 1, "Warmup packet completed"),
            Err(e) if e.is_recoverable() => {
                lost += 1;
                debug!(packet_num = i + 1, error = %e, "Warmup packet lost");
            }
            Err(e) => return Err(e),
        }
        thread::sleep(plan.interval);
    }
    info!(count = plan.count, lost = lost, "Warmup complete");
    Ok(lost)
}

/// Log while the progress bar, if any, is cleared from the terminal.
fn above_bar(progress: Option<&ProgressTracker>, log: impl FnOnce()) {
    match progress {
        Some(progress) => progress.suspend(log),
        None => log(),
    }
}

/// Run the measurement loop and collect samples
///
/// Per-packet send/receive/validation failures are logged and skipped. A broken
/// transport ends the loop early; samples gathered so far are kept.
pub fn measurement_phase<S: NetworkSocket>(
    socket: &mut S,
    plan: &PhasePlan,
    estimator: LatencyEstimator,
    shutdown: &ShutdownFlag,
    mut csv: Option<&mut CsvWriter>,
    mut progress: Option<&mut ProgressTracker>,
) -> Result<MeasurementResult> {
    let mut result = MeasurementResult {
        samples: Vec::with_capacity(plan.count),
        ..MeasurementResult::default()
    };
    let start_time = Instant::now();

    for i in 0..plan.count {
        if shutdown.is_requested() {
            above_bar(progress.as_deref(), || {
                info!(sent = result.sent, "Measurement interrupted")
            });
            result.interrupted = true;
            break;
        }

        let sequence = SequenceNumber(plan.first_sequence + i as u64);
        result.sent += 1;

        match measure_single_packet(socket, sequence, plan.packet_size, estimator) {
            Ok(sample) => {
                if let Some(csv) = csv.as_deref_mut() {
                    csv.write_sample(&sample)?;
                }
                result.samples.push(sample);
            }
            Err(Error::Timeout) => {
                result.lost += 1;
                above_bar(progress.as_deref(), || {
                    warn!(sequence = sequence.0, "No response (timeout)")
                });
            }
            Err(e) if e.is_recoverable() => {
                result.lost += 1;
                above_bar(progress.as_deref(), || {
                    warn!(sequence = sequence.0, error = %e, "Packet discarded")
                });
            }
            Err(e) => {
                result.lost += 1;
                result.disconnected = true;
                above_bar(progress.as_deref(), || {
                    warn!(sequence = sequence.0, error = %e, "Server disconnected")
                });
                break;
            }
        }

        if let Some(progress) = progress.as_deref_mut() {
            progress.update(&result.samples, start_time, i)?;
        }

        if i + 1 < plan.count {
            thread::sleep(plan.interval);
        }
    }

    if let Some(progress) = progress {
        progress.final_update(&result.samples, start_time)?;
        progress.finish();
    }

    result.elapsed = start_time.elapsed();
    debug!(
        packets_received = result.samples.len(),
        packets_lost = result.lost,
        "Measurement phase completed"
    );
    Ok(result)
}
