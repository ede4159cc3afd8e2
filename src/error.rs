//! Error types for the wire codec.

use thiserror::Error;

/// Result alias for codec operations.
pub type Result<T> = std::result::Result<T, KafwireError>;

/// Errors that can occur while encoding or decoding wire frames.
#[derive(Error, Debug)]
pub enum KafwireError {
    /// Request or response data violates a framing invariant.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A decoded message's checksum does not match the computed value.
    #[error("message checksum mismatch: stored {stored:#010x}, computed {computed:#010x}")]
    Checksum { stored: u32, computed: u32 },

    /// The buffer could not yield even one complete message; the caller
    /// should retry the fetch with a larger size budget.
    #[error("buffer too small for a complete message; retry with a larger fetch size")]
    FetchSizeTooSmall,

    /// Message attributes name a compression codec this build cannot handle.
    #[error("unsupported compression codec: attribute bits {0:#04x}")]
    UnsupportedCodec(u8),

    /// A compression back-end failed to round the payload.
    #[error("compression error: {0}")]
    Compression(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
