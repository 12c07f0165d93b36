use crate::error::Result;
use crate::protocol::{stamp_server_timestamps, PacketHeader, ProtocolError, SequenceNumber};
use crate::server::monitor::ServerCounters;
use crate::time::timestamp_us;
use tracing::trace;

/// Validate one received frame and stamp it in place for the echo.
///
/// `frame` must be the whole packet as it arrived. Sync probes and
/// measurement probes get the same treatment; both timestamps are taken
/// from the local clock. The payload is echoed untouched.
pub fn prepare_echo(
    frame: &mut [u8],
    recv_ts: u64,
    counters: &ServerCounters,
) -> Result<SequenceNumber> {
    counters.increment_received();

    let header = PacketHeader::parse(frame)?;
    if header.declared_len() != frame.len() {
        return Err(ProtocolError::SizeMismatch {
            declared: header.declared_len(),
            actual: frame.len(),
        }
        .into());
    }
    if header.sequence.is_sync() {
        counters.increment_sync();
    }

    stamp_server_timestamps(frame, recv_ts, timestamp_us())?;
    trace!(sequence = %header.sequence, size = frame.len(), "Echo prepared");
    Ok(header.sequence)
}
