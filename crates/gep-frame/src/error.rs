/// Errors raised while scanning a receive buffer for frames.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The first header word does not match the endpoint magic.
    #[error("invalid frame magic (0x{word:08x})")]
    InvalidMagic { word: u32 },

    /// The header announces a value larger than the frame ceiling.
    #[error("value length too large ({len} >= {max})")]
    ValueTooLarge { len: usize, max: usize },
}

pub type Result<T> = std::result::Result<T, FrameError>;
