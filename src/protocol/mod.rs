//! Wire format shared by every client and server role

pub mod error;
pub mod message;

pub use error::{ProtocolError, Result as ProtocolResult};
pub use message::{
    stamp_server_timestamps, Packet, PacketHeader, SequenceNumber, HEADER_SIZE, MAX_PACKET_SIZE,
    MIN_PACKET_SIZE, SYNC_SEQUENCE_SPAN, SYNC_SEQUENCE_START,
};
