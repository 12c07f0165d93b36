use crate::error::Result;
use crate::protocol::MAX_PACKET_SIZE;
use crate::server::echo::prepare_echo;
use crate::server::monitor::ServerCounters;
use crate::server::tcp::bind_error;
use crate::server::READ_TIMEOUT_MS;
use crate::shutdown::ShutdownFlag;
use crate::time::timestamp_us;
use crate::transport::is_timeout;
use std::io;
use std::net::{SocketAddr, UdpSocket};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Stateless echo server: one receive loop, one datagram at a time.
pub struct UdpEchoServer {
    socket: UdpSocket,
    counters: Arc<ServerCounters>,
}

impl UdpEchoServer {
    pub fn bind(addr: SocketAddr, counters: Arc<ServerCounters>) -> Result<Self> {
        let socket = UdpSocket::bind(addr).map_err(|e| bind_error(addr, e))?;
        socket.set_read_timeout(Some(Duration::from_millis(READ_TIMEOUT_MS)))?;
        Ok(Self { socket, counters })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Echo datagrams until `shutdown` is requested.
    ///
    /// Malformed datagrams are counted and dropped; they never stop the loop.
    pub fn run(self, shutdown: &ShutdownFlag) -> Result<()> {
        info!(address = %self.local_addr()?, "UDP echo server listening");

        // One spare byte so oversized datagrams show up as a size mismatch.
        let mut buf = vec![0u8; MAX_PACKET_SIZE + 1];

        while !shutdown.is_requested() {
            let (len, peer) = match self.socket.recv_from(&mut buf) {
                Ok(received) => received,
                Err(e) if is_timeout(&e) || e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    if shutdown.is_requested() {
                        break;
                    }
                    self.counters.increment_error();
                    warn!(error = %e, "Failed to receive datagram");
                    continue;
                }
            };

            let recv_ts = timestamp_us();
            let frame = &mut buf[..len];
            if let Err(e) = prepare_echo(frame, recv_ts, &self.counters) {
                self.counters.increment_error();
                debug!(error = %e, peer = %peer, len, "Dropping malformed datagram");
                continue;
            }

            match self.socket.send_to(frame, peer) {
                Ok(_) => self.counters.increment_echoed(),
                Err(e) => {
                    self.counters.increment_error();
                    error!(error = %e, peer = %peer, "Failed to send packet");
                }
            }
        }

        info!("Shutting down UDP server");
        Ok(())
    }
}
