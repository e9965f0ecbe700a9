/// Errors that can occur while opening or configuring sockets.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to bind the loopback listening socket.
    #[error("failed to bind loopback port {port}: {source}")]
    Bind {
        port: u16,
        source: std::io::Error,
    },

    /// Failed to connect to the loopback server.
    #[error("failed to connect to loopback port {port}: {source}")]
    Connect {
        port: u16,
        source: std::io::Error,
    },

    /// Failed to accept an incoming connection.
    #[error("failed to accept connection: {0}")]
    Accept(std::io::Error),

    /// An I/O error on an already-open socket.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Outcome of a [`crate::full_send`] that did not complete.
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    /// The send budget elapsed before the buffer was fully written.
    #[error("send timed out")]
    TimedOut,

    /// The peer performed an orderly shutdown.
    #[error("peer closed the connection")]
    Closed,

    /// The socket reported an unrecoverable error.
    #[error("send I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, TransportError>;
