//! Transport errors.

use thiserror::Error;

/// Error encoding or decoding a single frame.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("Payload of {size} bytes exceeds the limit of {limit} bytes")]
    PayloadTooLarge { size: usize, limit: usize },
    #[error("Failed to encode message: {0}")]
    Encode(#[from] rmp_serde::encode::Error),
    #[error("Failed to decode message: {0}")]
    Decode(#[from] rmp_serde::decode::Error),
}

/// Error on a framed channel.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// The peer closed the stream, possibly mid-frame.
    #[error("Channel closed by peer")]
    Closed,
    #[error(transparent)]
    Frame(#[from] FrameError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ChannelError {
    /// Whether the channel can still be used after this error.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Frame(FrameError::PayloadTooLarge { .. } | FrameError::Encode(_))
        )
    }
}
