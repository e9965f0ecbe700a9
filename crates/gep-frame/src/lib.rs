//! Wire framing for the GEP protocol.
//!
//! Every message on the wire is a self-delimiting frame:
//! - A 4-byte magic word (default `"gepp"`) for coarse resynchronization
//! - A 4-byte tag selecting the payload schema
//! - A 4-byte big-endian value length
//! - The value bytes
//!
//! This crate is pure: header scanning and printing over byte buffers,
//! no I/O.

pub mod error;
pub mod header;
pub mod tag;

pub use error::{FrameError, Result};
pub use header::{
    scan_header, write_header, Header, DEFAULT_MAGIC, HEADER_LEN, MAX_MSG_LEN, MAX_VALUE_LEN,
};
pub use tag::{make_tag, tag_string};
