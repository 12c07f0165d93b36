//! Transport sessions: the read/write primitives under the packet codec.
//!
//! Both transports carry the same encoded [`Packet`](crate::protocol::Packet).
//! TCP needs a resumable [`FrameReader`] because one `read` may return part of a
//! packet; UDP hands over whole datagrams or nothing.

pub mod frame;
pub mod tcp;
pub mod udp;

use crate::error::Result;
use crate::protocol::Packet;
use std::io;
use std::time::Duration;

pub use frame::{FrameReader, ReadState};
pub use tcp::TcpNetworkSocket;
pub use udp::UdpNetworkSocket;

/// Trait for network socket operations with packet abstraction
pub trait NetworkSocket: Send {
    /// Send a packet over the network
    fn send_packet(&mut self, packet: &Packet) -> Result<usize>;

    /// Receive a packet from the network.
    ///
    /// Returns [`Error::Timeout`](crate::Error::Timeout) when nothing arrived
    /// within the configured timeout.
    fn recv_packet(&mut self) -> Result<Packet>;

    /// Set the read timeout for the socket
    fn set_timeout(&self, timeout: Duration) -> Result<()>;
}

/// Read timeouts surface as `WouldBlock` on Unix and `TimedOut` on Windows.
pub fn is_timeout(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
    )
}


#[cfg(test)]
pub use tests::MockNetworkSocket;
