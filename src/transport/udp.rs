use crate::error::{Error, Result};
use crate::protocol::{Packet, MAX_PACKET_SIZE};
use crate::transport::{is_timeout, NetworkSocket};
use std::io;
use std::net::{SocketAddr, UdpSocket};
use std::time::Duration;
use tracing::{debug, warn};

/// UDP-based implementation of NetworkSocket
#[derive(Debug)]
pub struct UdpNetworkSocket {
    socket: UdpSocket,
    send_buf: Vec<u8>,
    // One spare byte so an oversized datagram shows up as a size mismatch.
    recv_buf: Vec<u8>,
}

impl UdpNetworkSocket {
    /// Bind to a local address
    pub fn bind(addr: SocketAddr) -> Result<Self> {
        debug!(addr = %addr, "Binding UDP socket");
        let socket = UdpSocket::bind(addr).map_err(|e| {
            warn!(error = %e, "Failed to bind socket");
            Error::Socket(format!("Failed to bind to {}: {}", addr, e))
        })?;
        debug!("Socket bound successfully");
        Ok(Self {
            socket,
            send_buf: Vec::new(),
            recv_buf: vec![0u8; MAX_PACKET_SIZE + 1],
        })
    }

    /// Connect to a remote address
    pub fn connect(&self, addr: SocketAddr) -> Result<()> {
        debug!(addr = %addr, "Connecting UDP socket");
        self.socket.connect(addr).map_err(|e| {
            warn!(error = %e, "Failed to connect socket");
            Error::Socket(format!("Failed to connect to {}: {}", addr, e))
        })?;
        debug!("Socket connected successfully");
        Ok(())
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }
}

impl NetworkSocket for UdpNetworkSocket {
    fn send_packet(&mut self, packet: &Packet) -> Result<usize> {
        self.send_buf.clear();
        packet.encode_into(&mut self.send_buf);
        let bytes_sent = loop {
            match self.socket.send(&self.send_buf) {
                Ok(n) => break n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    warn!(error = %e, "Failed to send packet");
                    return Err(Error::Io(e));
                }
            }
        };
        debug!(
            bytes_sent = bytes_sent,
            sequence = packet.sequence.0,
            "Packet sent"
        );
        Ok(bytes_sent)
    }

    fn recv_packet(&mut self) -> Result<Packet> {
        // Signals interrupt a timed recv without restarting it; keep waiting
        // so the packet in flight is not counted as lost.
        let len = loop {
            match self.socket.recv(&mut self.recv_buf) {
                Ok(len) => break len,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) if is_timeout(&e) => return Err(Error::Timeout),
                Err(e) => {
                    debug!(error = %e, "Failed to receive packet");
                    return Err(Error::Io(e));
                }
            }
        };
        let packet = Packet::decode(&self.recv_buf[..len])?;
        debug!(
            sequence = packet.sequence.0,
            bytes_received = len,
            "Packet received"
        );
        Ok(packet)
    }

    fn set_timeout(&self, timeout: Duration) -> Result<()> {
        debug!(timeout_ms = timeout.as_millis(), "Setting socket timeout");
        self.socket.set_read_timeout(Some(timeout)).map_err(|e| {
            warn!(error = %e, "Failed to set timeout");
            Error::Socket(format!("Failed to set timeout: {}", e))
        })?;
        debug!("Timeout set successfully");
        Ok(())
    }
}
