use crate::protocol::error::{ProtocolError, Result};
use std::fmt;
use tracing::debug;

/// Size of the fixed packet header in bytes.
///
/// Layout (big-endian, no padding):
///
/// | offset | width | field            |
/// |--------|-------|------------------|
/// | 0      | 8     | sequence number  |
/// | 8      | 8     | client send ts   |
/// | 16     | 8     | server recv ts   |
/// | 24     | 8     | server send ts   |
/// | 32     | 8     | client recv ts   |
/// | 40     | 4     | declared size    |
pub const HEADER_SIZE: usize = 44;

/// Smallest measurement packet the client will send
pub const MIN_PACKET_SIZE: usize = 64;

/// Largest packet either side will accept
pub const MAX_PACKET_SIZE: usize = 8192;

/// Number of sequence numbers reserved for clock-sync probes at the top of the u64 range
pub const SYNC_SEQUENCE_SPAN: u64 = 21;

/// First sequence number of the reserved sync range
pub const SYNC_SEQUENCE_START: u64 = u64::MAX - (SYNC_SEQUENCE_SPAN - 1);

const SEQUENCE_OFFSET: usize = 0;
const CLIENT_SEND_OFFSET: usize = 8;
const SERVER_RECV_OFFSET: usize = 16;
const SERVER_SEND_OFFSET: usize = 24;
const CLIENT_RECV_OFFSET: usize = 32;
const DECLARED_SIZE_OFFSET: usize = 40;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SequenceNumber(pub u64);

impl SequenceNumber {
    /// Sequence number used by clock-sync round `round`.
    pub fn sync_probe(round: usize) -> Self {
        Self(u64::MAX - (round as u64 % SYNC_SEQUENCE_SPAN))
    }

    pub fn is_sync(self) -> bool {
        self.0 >= SYNC_SEQUENCE_START
    }
}

impl fmt::Display for SequenceNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The fixed header, decoded without touching the payload.
///
/// TCP receivers parse this first to learn how many more bytes belong to the packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    pub sequence: SequenceNumber,
    pub client_send_ts: u64,
    pub server_recv_ts: u64,
    pub server_send_ts: u64,
    pub client_recv_ts: u64,
    pub declared_size: u32,
}

impl PacketHeader {
    /// Parse and bounds-check the header at the start of `bytes`.
    ///
    /// Only the first `HEADER_SIZE` bytes are read; the caller is responsible for
    /// comparing `declared_len()` against what it actually has.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(ProtocolError::Truncated {
                expected: HEADER_SIZE,
                actual: bytes.len(),
            });
        }

        let header = Self {
            sequence: SequenceNumber(read_u64(bytes, SEQUENCE_OFFSET)),
            client_send_ts: read_u64(bytes, CLIENT_SEND_OFFSET),
            server_recv_ts: read_u64(bytes, SERVER_RECV_OFFSET),
            server_send_ts: read_u64(bytes, SERVER_SEND_OFFSET),
            client_recv_ts: read_u64(bytes, CLIENT_RECV_OFFSET),
            declared_size: read_u32(bytes, DECLARED_SIZE_OFFSET),
        };

        let declared = header.declared_len();
        // Sync probes never carry a payload.
        let max = if header.sequence.is_sync() {
            HEADER_SIZE
        } else {
            MAX_PACKET_SIZE
        };
        if !(HEADER_SIZE..=max).contains(&declared) {
            return Err(ProtocolError::InvalidDeclaredSize {
                declared,
                min: HEADER_SIZE,
                max,
            });
        }

        Ok(header)
    }

    pub fn declared_len(&self) -> usize {
        self.declared_size as usize
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub sequence: SequenceNumber,
    pub client_send_ts: u64,
    pub server_recv_ts: u64,
    pub server_send_ts: u64,
    pub client_recv_ts: u64,
    pub payload: Vec<u8>,
}

impl Packet {
    /// Create a measurement packet whose encoded length is `total_size` bytes.
    ///
    /// Sizes below the header are raised to a header-only packet.
    pub fn new(sequence: SequenceNumber, total_size: usize) -> Self {
        let mut payload = vec![0u8; total_size.saturating_sub(HEADER_SIZE)];
        fill_pattern(&mut payload);
        Self {
            sequence,
            client_send_ts: 0,
            server_recv_ts: 0,
            server_send_ts: 0,
            client_recv_ts: 0,
            payload,
        }
    }

    /// Create the header-only probe for clock-sync round `round`.
    pub fn sync_probe(round: usize, client_send_ts: u64) -> Self {
        Self {
            client_send_ts,
            ..Self::new(SequenceNumber::sync_probe(round), HEADER_SIZE)
        }
    }

    /// Total encoded length, header included.
    pub fn declared_size(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }

    /// Time the server spent between stamping receive and send, in microseconds.
    pub fn server_processing_us(&self) -> i64 {
        self.server_send_ts.wrapping_sub(self.server_recv_ts) as i64
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.declared_size());
        self.encode_into(&mut buf);
        buf
    }

    /// Append the encoded packet to `buf`.
    pub fn encode_into(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.sequence.0.to_be_bytes());
        buf.extend_from_slice(&self.client_send_ts.to_be_bytes());
        buf.extend_from_slice(&self.server_recv_ts.to_be_bytes());
        buf.extend_from_slice(&self.server_send_ts.to_be_bytes());
        buf.extend_from_slice(&self.client_recv_ts.to_be_bytes());
        buf.extend_from_slice(&(self.declared_size() as u32).to_be_bytes());
        buf.extend_from_slice(&self.payload);
    }

    /// Decode a complete packet and validate its payload pattern.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let header = PacketHeader::parse(bytes)?;
        let declared = header.declared_len();

        if bytes.len() != declared {
            debug!(
                declared = declared,
                actual = bytes.len(),
                "Packet size mismatch"
            );
            return Err(ProtocolError::SizeMismatch {
                declared,
                actual: bytes.len(),
            });
        }

        let payload = &bytes[HEADER_SIZE..declared];
        if let Some(offset) = find_pattern_mismatch(payload) {
            return Err(ProtocolError::CorruptPacket {
                sequence: header.sequence.0,
                offset,
            });
        }

        Ok(Packet {
            sequence: header.sequence,
            client_send_ts: header.client_send_ts,
            server_recv_ts: header.server_recv_ts,
            server_send_ts: header.server_send_ts,
            client_recv_ts: header.client_recv_ts,
            payload: payload.to_vec(),
        })
    }
}

/// Overwrite the server timestamps of an encoded packet in place.
pub fn stamp_server_timestamps(frame: &mut [u8], recv_ts: u64, send_ts: u64) -> Result<()> {
    if frame.len() < HEADER_SIZE {
        return Err(ProtocolError::Truncated {
            expected: HEADER_SIZE,
            actual: frame.len(),
        });
    }
    frame[SERVER_RECV_OFFSET..SERVER_RECV_OFFSET + 8].copy_from_slice(&recv_ts.to_be_bytes());
    frame[SERVER_SEND_OFFSET..SERVER_SEND_OFFSET + 8].copy_from_slice(&send_ts.to_be_bytes());
    Ok(())
}

/// Fill `payload` with the repeating `i mod 256` pattern.
pub fn fill_pattern(payload: &mut [u8]) {
    for (i, byte) in payload.iter_mut().enumerate() {
        *byte = (i % 256) as u8;
    }
}

/// Offset of the first byte that breaks the payload pattern, if any.
pub fn find_pattern_mismatch(payload: &[u8]) -> Option<usize> {
    payload
        .iter()
        .enumerate()
        .position(|(i, &byte)| byte != (i % 256) as u8)
}

fn read_u64(bytes: &[u8], offset: usize) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[offset..offset + 8]);
    u64::from_be_bytes(buf)
}

fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&bytes[offset..offset + 4]);
    u32::from_be_bytes(buf)
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn test_packet_encode_decode_roundtrip(
            seq in 0u64..SYNC_SEQUENCE_START,
            size in HEADER_SIZE..=MAX_PACKET_SIZE,
            ts in any::<[u64; 4]>(),
        ) {
            let mut original = Packet::new(SequenceNumber(seq), size);
            original.client_send_ts = ts[0];
            original.server_recv_ts = ts[1];
            original.server_send_ts = ts[2];
            original.client_recv_ts = ts[3];

            let encoded = original.encode();
            prop_assert_eq!(encoded.len(), size);
            let decoded = Packet::decode(&encoded).unwrap();
            prop_assert_eq!(original, decoded);
        }

        #[test]
        fn test_any_single_byte_flip_in_payload_is_caught(
            size in (HEADER_SIZE + 1)..=1024usize,
            pick in any::<prop::sample::Index>(),
        ) {
            let mut encoded = Packet::new(SequenceNumber(1), size).encode();
            let offset = pick.index(size - HEADER_SIZE);
            encoded[HEADER_SIZE + offset] = encoded[HEADER_SIZE + offset].wrapping_add(1);
            let is_corrupt = matches!(
                Packet::decode(&encoded),
                Err(ProtocolError::CorruptPacket { offset: o, .. }) if o == offset
            );
            prop_assert!(is_corrupt);
        }
    }
}
