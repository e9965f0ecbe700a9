//! Loopback TCP socket layer for GEP endpoints.
//!
//! Thin wrappers over `std::net` sockets, dropping to `libc` where std
//! has no knob: `select(2)` readiness, `SO_REUSEADDR` before bind, and
//! `SO_PRIORITY`. Streams are non-blocking with `TCP_NODELAY`; the
//! server listens on the loopback interface only.

pub mod error;
pub mod select;
pub mod send;
pub mod socket;

pub use error::{Result, SendError, TransportError};
pub use select::{select_read, select_write, FdSet};
pub use send::full_send;
pub use socket::{
    accept, bind_listener, configure_stream, connect, local_port, peer_ip, LISTEN_BACKLOG,
    SOCKET_PRIORITY,
};
