use crate::protocol::ProtocolError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Network I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Socket error: {0}")]
    Socket(String),

    #[error("Connection closed by peer")]
    ConnectionClosed,

    #[error("Timed out waiting for response")]
    Timeout,

    #[error("Measurement error: {0}")]
    Measurement(String),

    #[error("Output error: {0}")]
    Output(String),
}

impl Error {
    /// True for errors that only affect the packet in flight.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::Io(_) | Error::Protocol(_) | Error::Timeout)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
