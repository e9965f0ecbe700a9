//! The payload codec seam.
//!
//! The engine never inspects payload contents; a concrete codec maps
//! messages to bytes and tags. Any schema-based encoder with a text and
//! a binary rendering fits behind this trait.

/// Serialization mode. Both peers must use the same mode; the protocol
/// does not negotiate it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// Human-readable rendering. May be unavailable in lightweight
    /// codec builds.
    Text,
    /// Compact rendering. Always supported.
    #[default]
    Binary,
}

/// A codec failure. Carries the underlying encoder's message; the
/// engine only logs it and drives the channel state machine.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("cannot encode message: {0}")]
    Encode(String),

    #[error("cannot decode message: {0}")]
    Decode(String),
}

/// Encodes and decodes payloads and maps them to tags.
pub trait Codec: Send + Sync + 'static {
    /// The payload type carried over this protocol, typically an enum
    /// with one variant per tag.
    type Msg: Send;

    /// Serialize a message. A failure is returned to the sender without
    /// touching the socket.
    fn serialize(&self, msg: &Self::Msg) -> std::result::Result<Vec<u8>, CodecError>;

    /// Decode `bytes` into `msg`. Empty input must reset `msg` to its
    /// cleared state and succeed.
    fn deserialize(&self, bytes: &[u8], msg: &mut Self::Msg)
        -> std::result::Result<(), CodecError>;

    /// The tag keying this message on the wire.
    fn tag_of(&self, msg: &Self::Msg) -> u32;

    /// Construct the cleared message for a tag, or `None` when the tag
    /// is not part of this protocol.
    fn new_message(&self, tag: u32) -> Option<Self::Msg>;

    /// The serialization mode in effect.
    fn mode(&self) -> Mode {
        Mode::default()
    }
}
