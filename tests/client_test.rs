use netprobe::client::{
    measurement_phase, warmup_phase, LatencyEstimator, PhasePlan, Summary,
};
use netprobe::shutdown::ShutdownFlag;
use netprobe::transport::{NetworkSocket, TcpNetworkSocket};
use netprobe::Result;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener};
use std::thread;
use std::time::Duration;

/// Test helper: byte-for-byte TCP echo that never stamps anything
fn start_raw_echo_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind test server");
    let addr = listener.local_addr().unwrap();
    thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(mut stream) = stream else { continue };
            let _ = stream.set_read_timeout(Some(Duration::from_secs(1)));
            let mut buf = [0u8; 64];
            loop {
                match stream.read(&mut buf) {
                    Ok(0) => break,
                    Ok(len) => {
                        let _ = stream.write_all(&buf[..len]);
                    }
                    Err(_) => break,
                }
            }
        }
    });
    addr
}

fn plan(first_sequence: u64, count: usize) -> PhasePlan {
    PhasePlan {
        first_sequence,
        count,
        packet_size: 256,
        interval: Duration::from_millis(1),
    }
}

#[test]
fn test_end_to_end_measurement_over_raw_echo() -> Result<()> {
    let addr = start_raw_echo_server();

    let mut socket = TcpNetworkSocket::connect(addr, Duration::from_secs(2))?;
    socket.set_timeout(Duration::from_millis(1000))?;
    let shutdown = ShutdownFlag::new();

    let lost = warmup_phase(&mut socket, &plan(1, 5), &shutdown)?;
    assert_eq!(lost, 0);

    let result = measurement_phase(
        &mut socket,
        &plan(6, 10),
        LatencyEstimator::HalfRoundTrip,
        &shutdown,
        None,
        None,
    )?;

    assert_eq!(result.sent, 10);
    assert_eq!(result.samples.len() + result.lost, 10);
    assert_eq!(result.samples.first().map(|s| s.sequence.0), Some(6));

    let summary = Summary::from_samples(&result.samples, result.sent, 256, Duration::from_millis(1));
    let stats = summary.statistics().expect("samples were recorded");
    assert_eq!(stats.count(), 10);
    assert!(stats.rtt.min <= stats.rtt.mean && stats.rtt.mean <= stats.rtt.max);
    // An unstamped echo reports zero processing time.
    assert_eq!(stats.server_processing_mean_us, 0.0);
    Ok(())
}

#[test]
fn test_interrupted_run_reports_attempted_packets() -> Result<()> {
    let addr = start_raw_echo_server();
    let mut socket = TcpNetworkSocket::connect(addr, Duration::from_secs(2))?;
    socket.set_timeout(Duration::from_millis(1000))?;

    let shutdown = ShutdownFlag::new();
    shutdown.request();
    let result = measurement_phase(
        &mut socket,
        &plan(1, 10),
        LatencyEstimator::HalfRoundTrip,
        &shutdown,
        None,
        None,
    )?;
    assert!(result.interrupted);
    assert_eq!(result.sent, 0);
    assert_eq!(
        Summary::from_samples(&result.samples, result.sent, 256, Duration::from_millis(1)),
        Summary::NoData { sent: 0 }
    );
    Ok(())
}
