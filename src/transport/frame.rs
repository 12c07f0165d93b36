use crate::error::{Error, Result};
use crate::protocol::{PacketHeader, HEADER_SIZE, MAX_PACKET_SIZE};
use crate::transport::is_timeout;
use std::io::{self, Read};
use tracing::trace;

/// Where a [`FrameReader`] is within the current packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadState {
    /// Collecting the fixed header.
    Header,
    /// Header parsed; collecting the rest of `declared` bytes.
    Payload { declared: usize },
}

/// Reassembles packets from a byte stream.
///
/// Progress survives read timeouts: a `Timeout` error leaves the partially
/// received bytes buffered and the next call resumes where it stopped. After a
/// protocol error in the header the stream is out of sync and must be dropped.
#[derive(Debug)]
pub struct FrameReader {
    buf: Vec<u8>,
    filled: usize,
    state: ReadState,
    complete: bool,
}

impl Default for FrameReader {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameReader {
    pub fn new() -> Self {
        Self {
            buf: vec![0u8; MAX_PACKET_SIZE],
            filled: 0,
            state: ReadState::Header,
            complete: false,
        }
    }

    pub fn state(&self) -> ReadState {
        self.state
    }

    /// Bytes buffered toward the current packet.
    pub fn buffered(&self) -> usize {
        self.filled
    }

    /// Read from `reader` until one whole packet is buffered and return it.
    ///
    /// Header-only packets (sync probes) complete as soon as the header is in.
    pub fn read_frame<R: Read>(&mut self, reader: &mut R) -> Result<&mut [u8]> {
        if self.complete {
            self.reset();
        }

        loop {
            let target = match self.state {
                ReadState::Header => HEADER_SIZE,
                ReadState::Payload { declared } => declared,
            };

            while self.filled < target {
                match reader.read(&mut self.buf[self.filled..target]) {
                    Ok(0) if self.filled == 0 => return Err(Error::ConnectionClosed),
                    Ok(0) => {
                        return Err(Error::Io(io::Error::new(
                            io::ErrorKind::UnexpectedEof,
                            format!("peer closed mid-packet after {} bytes", self.filled),
                        )))
                    }
                    Ok(n) => {
                        self.filled += n;
                        trace!(read = n, filled = self.filled, target, "Partial read");
                    }
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) if is_timeout(&e) => return Err(Error::Timeout),
                    Err(e) => return Err(Error::Io(e)),
                }
            }

            match self.state {
                ReadState::Header => {
                    let header = match PacketHeader::parse(&self.buf[..HEADER_SIZE]) {
                        Ok(header) => header,
                        Err(e) => {
                            self.reset();
                            return Err(Error::Protocol(e));
                        }
                    };
                    let declared = header.declared_len();
                    if declared == HEADER_SIZE {
                        break;
                    }
                    self.state = ReadState::Payload { declared };
                }
                ReadState::Payload { .. } => break,
            }
        }

        self.complete = true;
        Ok(&mut self.buf[..self.filled])
    }

    fn reset(&mut self) {
        self.filled = 0;
        self.state = ReadState::Header;
        self.complete = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{Packet, SequenceNumber};
    use std::collections::VecDeque;

    enum Step {
        Data(Vec<u8>),
        Timeout,
    }

    /// Reader that hands out scripted chunks, honoring short destination buffers.
    struct Scripted {
        steps: VecDeque<Step>,
    }

    impl Scripted {
        fn new(steps: Vec<Step>) -> Self {
            Self {
                steps: steps.into(),
            }
        }
    }

    impl Read for Scripted {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.steps.pop_front() {
                None => Ok(0),
                Some(Step::Timeout) => Err(io::Error::from(io::ErrorKind::WouldBlock)),
                Some(Step::Data(mut chunk)) => {
                    let n = chunk.len().min(buf.len());
                    buf[..n].copy_from_slice(&chunk[..n]);
                    if n < chunk.len() {
                        let rest = chunk.split_off(n);
                        self.steps.push_front(Step::Data(rest));
                    }
                    Ok(n)
                }
            }
        }
    }

    fn encoded(seq: u64, size: usize) -> Vec<u8> {
        Packet::new(SequenceNumber(seq), size).encode()
    }

    #[test]
    fn test_whole_frame_in_one_read() {
        let bytes = encoded(1, 128);
        let mut reader = Scripted::new(vec![Step::Data(bytes.clone())]);
        let mut frames = FrameReader::new();
        assert_eq!(frames.read_frame(&mut reader).unwrap(), &bytes[..]);
    }

    #[test]
    fn test_partial_reads_are_continued() {
        let bytes = encoded(2, 1024);
        let steps = bytes.chunks(7).map(|c| Step::Data(c.to_vec())).collect();
        let mut reader = Scripted::new(steps);
        let mut frames = FrameReader::new();
        let frame = frames.read_frame(&mut reader).unwrap();
        assert_eq!(frame.len(), 1024);
        assert!(Packet::decode(frame).is_ok());
    }

    #[test]
    fn test_timeout_preserves_progress() {
        let bytes = encoded(3, 256);
        let mut reader = Scripted::new(vec![
            Step::Data(bytes[..20].to_vec()),
            Step::Timeout,
            Step::Data(bytes[20..100].to_vec()),
            Step::Timeout,
            Step::Data(bytes[100..].to_vec()),
        ]);
        let mut frames = FrameReader::new();

        assert!(matches!(frames.read_frame(&mut reader), Err(Error::Timeout)));
        assert_eq!(frames.buffered(), 20);
        assert_eq!(frames.state(), ReadState::Header);

        assert!(matches!(frames.read_frame(&mut reader), Err(Error::Timeout)));
        assert_eq!(frames.buffered(), 100);
        assert_eq!(frames.state(), ReadState::Payload { declared: 256 });

        let frame = frames.read_frame(&mut reader).unwrap();
        assert_eq!(frame, &bytes[..]);
    }

    #[test]
    fn test_back_to_back_frames() {
        let mut stream = encoded(10, 64);
        stream.extend(Packet::sync_probe(0, 5).encode());
        stream.extend(encoded(11, 300));
        let mut reader = Scripted::new(vec![Step::Data(stream)]);
        let mut frames = FrameReader::new();

        let first = Packet::decode(frames.read_frame(&mut reader).unwrap()).unwrap();
        assert_eq!(first.sequence, SequenceNumber(10));
        let sync = Packet::decode(frames.read_frame(&mut reader).unwrap()).unwrap();
        assert!(sync.sequence.is_sync());
        let third = Packet::decode(frames.read_frame(&mut reader).unwrap()).unwrap();
        assert_eq!(third.declared_size(), 300);
    }

    #[test]
    fn test_eof_at_boundary_is_connection_closed() {
        let mut reader = Scripted::new(vec![]);
        let mut frames = FrameReader::new();
        assert!(matches!(
            frames.read_frame(&mut reader),
            Err(Error::ConnectionClosed)
        ));
    }

    #[test]
    fn test_eof_mid_frame_is_io_error() {
        let bytes = encoded(4, 512);
        let mut reader = Scripted::new(vec![Step::Data(bytes[..300].to_vec())]);
        let mut frames = FrameReader::new();
        match frames.read_frame(&mut reader) {
            Err(Error::Io(e)) => assert_eq!(e.kind(), io::ErrorKind::UnexpectedEof),
            other => panic!("unexpected result: {:?}", other.map(|f| f.len())),
        }
    }

    #[test]
    fn test_bad_header_is_protocol_error() {
        let mut bytes = encoded(5, 128);
        bytes[40..44].copy_from_slice(&9000u32.to_be_bytes());
        let mut reader = Scripted::new(vec![Step::Data(bytes)]);
        let mut frames = FrameReader::new();
        assert!(matches!(
            frames.read_frame(&mut reader),
            Err(Error::Protocol(_))
        ));
        assert_eq!(frames.buffered(), 0);
    }
}
