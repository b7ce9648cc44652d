/// Errors that can occur while framing or unframing packets.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The trailing checksum byte does not match the frame contents.
    #[error("checksum mismatch: received 0x{received:02x}, expected 0x{expected:02x}")]
    ChecksumMismatch { received: u8, expected: u8 },

    /// The frame holds more bytes than a packet can carry.
    #[error("too much data in frame (max {max} bytes)")]
    TooMuchData { max: usize },

    /// The frame is shorter than a command byte plus a checksum byte.
    #[error("frame too small (need a command and a checksum)")]
    TooSmall,

    /// A packet payload exceeds the maximum size.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl FrameError {
    /// Returns true for errors raised by the decoder on a corrupted frame.
    ///
    /// The decoder has already resynchronized when it reports one of these.
    pub fn is_framing(&self) -> bool {
        matches!(
            self,
            FrameError::ChecksumMismatch { .. } | FrameError::TooMuchData { .. } | FrameError::TooSmall
        )
    }
}

/// Errors that can occur while unpacking fields from a payload.
#[derive(Debug, thiserror::Error)]
pub enum UnpackError {
    /// Fewer bytes remain than the field needs.
    #[error("payload underflow: need {needed} bytes, {remaining} remaining")]
    Underflow { needed: usize, remaining: usize },

    /// A string field is not valid UTF-8.
    #[error("string field is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),
}

pub type Result<T> = std::result::Result<T, FrameError>;
