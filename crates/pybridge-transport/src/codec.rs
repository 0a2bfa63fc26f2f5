//! Length-prefixed framing.
//!
//! A frame is a 4-byte little-endian payload length followed by the payload,
//! a msgpack-encoded `Message` map.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::FrameError;
use crate::message::Message;

/// Size of the length prefix in bytes.
pub const HEADER_LEN: usize = 4;

/// Default payload limit: 64 MiB.
pub const DEFAULT_MAX_PAYLOAD: usize = 64 * 1024 * 1024;

/// Framing limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameConfig {
    /// Largest payload accepted in either direction.
    pub max_payload: usize,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_payload: DEFAULT_MAX_PAYLOAD,
        }
    }
}

impl FrameConfig {
    #[must_use]
    pub const fn with_max_payload(mut self, max_payload: usize) -> Self {
        self.max_payload = max_payload;
        self
    }

    /// Encode a message into a complete frame.
    ///
    /// # Errors
    ///
    /// Returns `FrameError::PayloadTooLarge` when the encoded payload exceeds
    /// the limit or does not fit the 32-bit prefix.
    pub fn encode(&self, message: &Message) -> Result<Bytes, FrameError> {
        let payload = rmp_serde::to_vec_named(message)?;
        let len = self.check_len(payload.len())?;

        let mut frame = BytesMut::with_capacity(HEADER_LEN + payload.len());
        frame.put_u32_le(len);
        frame.put_slice(&payload);
        Ok(frame.freeze())
    }

    /// Decode a payload (without its prefix).
    ///
    /// # Errors
    ///
    /// Returns `FrameError::Decode` when the payload is not a valid message.
    pub fn decode(&self, payload: &[u8]) -> Result<Message, FrameError> {
        self.check_len(payload.len())?;
        Ok(rmp_serde::from_slice(payload)?)
    }

    /// Validate a payload length read from a prefix.
    ///
    /// # Errors
    ///
    /// Returns `FrameError::PayloadTooLarge` when over the limit.
    pub fn check_prefix(&self, header: [u8; HEADER_LEN]) -> Result<usize, FrameError> {
        let size = usize::try_from(u32::from_le_bytes(header)).unwrap_or(usize::MAX);
        self.check_len(size)?;
        Ok(size)
    }

    fn check_len(&self, size: usize) -> Result<u32, FrameError> {
        let limit = self.max_payload;
        if size > limit {
            return Err(FrameError::PayloadTooLarge { size, limit });
        }
        u32::try_from(size).map_err(|_| FrameError::PayloadTooLarge {
            size,
            limit: u32::MAX as usize,
        })
    }
}
