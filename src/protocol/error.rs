use thiserror::Error;

/// Protocol-level errors for packet encoding/decoding
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("Truncated packet: need at least {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },

    #[error("Invalid declared size {declared} (allowed {min}..={max})")]
    InvalidDeclaredSize {
        declared: usize,
        min: usize,
        max: usize,
    },

    #[error("Size mismatch: header declares {declared} bytes, received {actual}")]
    SizeMismatch { declared: usize, actual: usize },

    #[error("Unexpected sequence number: expected {expected}, received {received}")]
    UnexpectedSequence { expected: u64, received: u64 },

    #[error("Corrupt packet (seq={sequence}): payload mismatch at offset {offset}")]
    CorruptPacket { sequence: u64, offset: usize },
}

pub type Result<T> = std::result::Result<T, ProtocolError>;
