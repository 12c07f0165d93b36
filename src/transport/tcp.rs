use crate::error::{Error, Result};
use crate::protocol::Packet;
use crate::transport::{FrameReader, NetworkSocket};
use std::io::Write;
use std::net::{SocketAddr, TcpStream};
use std::time::Duration;
use tracing::{debug, warn};

/// TCP-based implementation of NetworkSocket
#[derive(Debug)]
pub struct TcpNetworkSocket {
    stream: TcpStream,
    frames: FrameReader,
    send_buf: Vec<u8>,
}

impl TcpNetworkSocket {
    /// Connect to a remote address
    pub fn connect(addr: SocketAddr, timeout: Duration) -> Result<Self> {
        debug!(addr = %addr, "Connecting TCP socket");
        let stream = TcpStream::connect_timeout(&addr, timeout).map_err(|e| {
            warn!(error = %e, "Failed to connect socket");
            Error::Socket(format!("Failed to connect to {}: {}", addr, e))
        })?;
        Self::from_stream(stream)
    }

    /// Wrap an already connected stream
    pub fn from_stream(stream: TcpStream) -> Result<Self> {
        stream
            .set_nodelay(true)
            .map_err(|e| Error::Socket(format!("Failed to set TCP_NODELAY: {}", e)))?;
        debug!(peer = ?stream.peer_addr().ok(), "TCP socket connected");
        Ok(Self {
            stream,
            frames: FrameReader::new(),
            send_buf: Vec::new(),
        })
    }
}

impl NetworkSocket for TcpNetworkSocket {
    fn send_packet(&mut self, packet: &Packet) -> Result<usize> {
        self.send_buf.clear();
        packet.encode_into(&mut self.send_buf);
        self.stream.write_all(&self.send_buf).map_err(|e| {
            warn!(error = %e, "Failed to send packet");
            Error::Io(e)
        })?;
        debug!(
            bytes_sent = self.send_buf.len(),
            sequence = packet.sequence.0,
            "Packet sent"
        );
        Ok(self.send_buf.len())
    }

    fn recv_packet(&mut self) -> Result<Packet> {
        let frame = match self.frames.read_frame(&mut self.stream) {
            Ok(frame) => frame,
            // A bad header leaves no way to find the next packet boundary.
            Err(Error::Protocol(e)) => {
                return Err(Error::Socket(format!("TCP stream desynchronized: {}", e)))
            }
            Err(e) => return Err(e),
        };
        let len = frame.len();
        let packet = Packet::decode(frame)?;
        debug!(
            sequence = packet.sequence.0,
            bytes_received = len,
            "Packet received"
        );
        Ok(packet)
    }

    fn set_timeout(&self, timeout: Duration) -> Result<()> {
        debug!(timeout_ms = timeout.as_millis(), "Setting socket timeout");
        self.stream.set_read_timeout(Some(timeout)).map_err(|e| {
            warn!(error = %e, "Failed to set timeout");
            Error::Socket(format!("Failed to set timeout: {}", e))
        })
    }
}
