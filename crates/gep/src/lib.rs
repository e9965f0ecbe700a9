//! Typed message exchange between two local peers over TCP.
//!
//! gep frames user-defined payloads with a tagged 12-byte header and
//! dispatches inbound frames to handlers keyed by tag. One endpoint is
//! a client (one outbound connection, auto-reconnect), the other a
//! server (many inbound connections, broadcast/unicast fan-out). Each
//! endpoint runs one service thread; any number of threads may send.
//!
//! # Crate Structure
//!
//! - [`frame`]: wire framing (header codec, tags, limits)
//! - [`transport`]: loopback TCP sockets, select, timed full-send
//! - [`peer`]: channel state machine, endpoints, dispatch, codec seam

/// Re-export frame types.
pub mod frame {
    pub use gep_frame::*;
}

/// Re-export transport types.
pub mod transport {
    pub use gep_transport::*;
}

/// Re-export peer types.
pub mod peer {
    pub use gep_peer::*;
}
