use gep_frame::FrameError;
use gep_transport::{SendError, TransportError};

use crate::codec::CodecError;

/// Errors surfaced by channel and endpoint operations.
///
/// Service loops treat any error from a receive as fatal for the
/// channel; senders get the error back and decide for themselves.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// The channel has no socket (closed, or reconnect in progress).
    #[error("channel is not connected")]
    NotConnected,

    /// The peer performed an orderly shutdown.
    #[error("peer closed the connection")]
    PeerClosed,

    /// The receive buffer filled up without yielding a complete frame.
    #[error("receive buffer full ({len} bytes)")]
    BufferFull { len: usize },

    /// Invalid magic or oversized length while scanning.
    #[error(transparent)]
    Frame(#[from] FrameError),

    /// The codec refused a payload, on either direction.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// The per-frame send budget elapsed.
    #[error("send timed out")]
    SendTimedOut,

    /// The server-side channel set is at capacity.
    #[error("too many clients (max {0})")]
    TooManyClients(usize),

    /// Unicast target does not exist or is closed.
    #[error("no such channel ({0})")]
    NoSuchChannel(u32),

    /// Socket setup failure (connect, bind, listen, accept).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Any other socket I/O failure.
    #[error("channel I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<SendError> for ChannelError {
    fn from(err: SendError) -> Self {
        match err {
            SendError::TimedOut => ChannelError::SendTimedOut,
            SendError::Closed => ChannelError::PeerClosed,
            SendError::Io(io) => ChannelError::Io(io),
        }
    }
}

pub type Result<T> = std::result::Result<T, ChannelError>;
