use crate::client::clock_sync::{synchronize_clocks, SyncOutcome};
use crate::client::config::ClientConfig;
use crate::client::constants::{CONNECT_TIMEOUT_MS, LIVE_STATS_UPDATE_PACKETS, SYNC_ROUND_DELAY_MS};
use crate::client::measurement::{
    measurement_phase, warmup_phase, LatencyEstimator, MeasurementResult, PhasePlan,
};
use crate::client::output::CsvWriter;
use crate::client::progress::ProgressTracker;
use crate::client::statistics::Summary;
use crate::config::{AddressFamily, Transport};
use crate::error::Result;
use crate::shutdown::ShutdownFlag;
use crate::transport::{NetworkSocket, TcpNetworkSocket, UdpNetworkSocket};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

/// Everything a finished client run produced
#[derive(Debug, Clone)]
pub struct ClientReport {
    pub target: SocketAddr,
    pub transport: Transport,
    pub family: AddressFamily,
    pub packet_size: usize,
    pub estimator: LatencyEstimator,
    pub sync: Option<SyncOutcome>,
    pub measurement: MeasurementResult,
    pub summary: Summary,
    pub csv_path: Option<PathBuf>,
}

/// Run a complete client session: connect, optional sync, warmup, measure, reduce.
///
/// Failing to open the CSV file or to set up the socket is fatal and happens
/// before any packet is sent.
pub fn run(config: &ClientConfig, shutdown: &ShutdownFlag) -> Result<ClientReport> {
    let csv = config
        .output
        .as_deref()
        .map(CsvWriter::create)
        .transpose()?;

    match config.transport {
        Transport::Tcp => {
            info!(
                family = %config.family(),
                target = %config.target,
                "Connecting to TCP server"
            );
            let mut socket = TcpNetworkSocket::connect(
                config.target,
                Duration::from_millis(CONNECT_TIMEOUT_MS),
            )?;
            run_session(&mut socket, config, shutdown, csv)
        }
        Transport::Udp => {
            let local = SocketAddr::new(config.family().unspecified(), 0);
            let mut socket = UdpNetworkSocket::bind(local)?;
            socket.connect(config.target)?;
            run_session(&mut socket, config, shutdown, csv)
        }
    }
}

/// Drive a session over an already connected socket.
pub fn run_session<S: NetworkSocket>(
    socket: &mut S,
    config: &ClientConfig,
    shutdown: &ShutdownFlag,
    mut csv: Option<CsvWriter>,
) -> Result<ClientReport> {
    socket.set_timeout(config.timeout)?;
    info!(
        transport = %config.transport,
        family = %config.family(),
        target = %config.target,
        "Connected"
    );

    let (estimator, sync) = if config.clock_sync {
        match synchronize_clocks(
            socket,
            config.sync_rounds,
            Duration::from_millis(SYNC_ROUND_DELAY_MS),
        ) {
            Some(outcome) => (LatencyEstimator::Synchronized(outcome.offset), Some(outcome)),
            None => {
                warn!("Clock synchronization failed; estimating one-way latency as RTT/2");
                (LatencyEstimator::HalfRoundTrip, None)
            }
        }
    } else {
        (LatencyEstimator::HalfRoundTrip, None)
    };

    let interval = config.interval();

    if config.warmup > 0 {
        let warmup = PhasePlan {
            first_sequence: 1,
            count: config.warmup,
            packet_size: config.packet_size,
            interval,
        };
        warmup_phase(socket, &warmup, shutdown)?;
    }

    let plan = PhasePlan {
        first_sequence: config.warmup as u64 + 1,
        count: config.packet_count,
        packet_size: config.packet_size,
        interval,
    };
    info!(
        count = plan.count,
        packet_size = plan.packet_size,
        interval_us = interval.as_micros() as u64,
        "Measuring latency and jitter"
    );

    let mut progress = if config.quiet {
        None
    } else {
        Some(ProgressTracker::new(
            config.packet_count,
            LIVE_STATS_UPDATE_PACKETS,
        )?)
    };

    let measurement = measurement_phase(
        socket,
        &plan,
        estimator,
        shutdown,
        csv.as_mut(),
        progress.as_mut(),
    )?;

    let summary = Summary::from_samples(
        &measurement.samples,
        measurement.sent,
        config.packet_size,
        interval,
    );
    let csv_path = csv.map(CsvWriter::finish).transpose()?;

    Ok(ClientReport {
        target: config.target,
        transport: config.transport,
        family: config.family(),
        packet_size: config.packet_size,
        estimator,
        sync,
        measurement,
        summary,
        csv_path,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::protocol::Packet;
    use crate::transport::MockNetworkSocket;
    use std::sync::{Arc, Mutex};

    fn quiet_config(count: usize) -> ClientConfig {
        let mut config = ClientConfig::new("127.0.0.1:8888".parse().unwrap(), Transport::Udp);
        config.packet_count = count;
        config.packet_size = 64;
        config.rate_pps = 0;
        config.delay_ms = 0;
        config.quiet = true;
        config
    }

    fn echoing_socket() -> MockNetworkSocket {
        let last = Arc::new(Mutex::new(None::<Packet>));
        let sent = Arc::clone(&last);
        let mut mock = MockNetworkSocket::new();
        mock.expect_set_timeout().returning(|_| Ok(()));
        mock.expect_send_packet().returning(move |p| {
            let mut echo = p.clone();
            echo.server_recv_ts = p.client_send_ts;
            echo.server_send_ts = p.client_send_ts;
            *sent.lock().unwrap() = Some(echo);
            Ok(p.declared_size())
        });
        mock.expect_recv_packet()
            .returning(move || Ok(last.lock().unwrap().clone().unwrap()));
        mock
    }

    #[test]
    fn test_session_without_sync() -> Result<()> {
        let mut socket = echoing_socket();
        let report = run_session(&mut socket, &quiet_config(10), &ShutdownFlag::new(), None)?;
        assert_eq!(report.estimator, LatencyEstimator::HalfRoundTrip);
        assert!(report.sync.is_none());
        let stats = report.summary.statistics().unwrap();
        assert_eq!(stats.count(), 10);
        assert_eq!(stats.packet_loss_pct, 0.0);
        Ok(())
    }

    #[test]
    fn test_warmup_shifts_sequence_numbers() -> Result<()> {
        let mut socket = echoing_socket();
        let mut config = quiet_config(3);
        config.warmup = 5;
        let report = run_session(&mut socket, &config, &ShutdownFlag::new(), None)?;
        let seqs: Vec<u64> = report
            .measurement
            .samples
            .iter()
            .map(|s| s.sequence.0)
            .collect();
        assert_eq!(seqs, vec![6, 7, 8]);
        assert_eq!(report.measurement.sent, 3);
        Ok(())
    }

    #[test]
    fn test_failed_sync_falls_back_to_half_rtt() -> Result<()> {
        let mut socket = MockNetworkSocket::new();
        socket.expect_set_timeout().returning(|_| Ok(()));
        socket.expect_send_packet().returning(|p| Ok(p.declared_size()));
        socket.expect_recv_packet().returning(|| Err(Error::Timeout));

        let mut config = quiet_config(2);
        config.clock_sync = true;
        config.sync_rounds = 1;
        let report = run_session(&mut socket, &config, &ShutdownFlag::new(), None)?;
        assert_eq!(report.estimator, LatencyEstimator::HalfRoundTrip);
        assert_eq!(report.summary, Summary::NoData { sent: 2 });
        Ok(())
    }

    #[test]
    fn test_connect_failure_is_fatal() {
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let mut config = quiet_config(5);
        config.transport = Transport::Tcp;
        config.target = format!("127.0.0.1:{}", port).parse().unwrap();
        assert!(matches!(
            run(&config, &ShutdownFlag::new()),
            Err(Error::Socket(_))
        ));
    }
}
