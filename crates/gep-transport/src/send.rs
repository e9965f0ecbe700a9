//! Timed full-buffer send.

use std::io::{ErrorKind, Write};
use std::os::fd::AsRawFd;
use std::time::{Duration, Instant};

use crate::error::SendError;
use crate::select::select_write;

/// Write `buf` in full to a non-blocking stream, or fail.
///
/// On `WouldBlock` the call select-waits for writability with whatever
/// remains of `timeout`; an elapsed budget is [`SendError::TimedOut`]. A
/// zero-byte write is an orderly shutdown by the peer
/// ([`SendError::Closed`]); any other error aborts the send. Headers and
/// values both go through here, so a frame is never half-written by a
/// single call.
pub fn full_send<S: Write + AsRawFd>(
    stream: &mut S,
    buf: &[u8],
    timeout: Duration,
) -> Result<(), SendError> {
    let started = Instant::now();
    let mut sent = 0;

    while sent < buf.len() {
        match stream.write(&buf[sent..]) {
            Ok(0) => return Err(SendError::Closed),
            Ok(n) => sent += n,
            Err(err) if err.kind() == ErrorKind::WouldBlock => {
                let Some(remaining) = timeout.checked_sub(started.elapsed()) else {
                    return Err(SendError::TimedOut);
                };
                if remaining.is_zero() {
                    return Err(SendError::TimedOut);
                }
                if !select_write(stream.as_raw_fd(), remaining)? {
                    return Err(SendError::TimedOut);
                }
            }
            Err(err) => return Err(SendError::Io(err)),
        }
    }
    Ok(())
}
