//! Protocol error types.
//!
//! Every variant names the framing or serialization rule that was violated.
//! None of these are transient: a frame that fails to parse will fail the
//! same way on retry, so callers close the offending connection rather than
//! recover per-frame.

use thiserror::Error;

/// Errors raised while encoding or decoding frames and payloads.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Buffer too small to hold a complete header.
    #[error("frame too short: expected at least {expected} bytes, got {actual}")]
    FrameTooShort {
        /// Minimum bytes required.
        expected: usize,
        /// Bytes actually available.
        actual: usize,
    },

    /// Header magic did not match the protocol magic.
    #[error("invalid magic number")]
    InvalidMagic,

    /// Header carried a protocol version this build does not speak.
    #[error("unsupported protocol version: {0}")]
    UnsupportedVersion(u8),

    /// Header carried an opcode this version does not know.
    #[error("unknown opcode: {0:#06x}")]
    UnknownOpcode(u16),

    /// Declared or actual payload exceeds the protocol maximum.
    #[error("payload too large: {size} bytes exceeds maximum {max}")]
    PayloadTooLarge {
        /// Offending payload size in bytes.
        size: usize,
        /// Protocol maximum in bytes.
        max: usize,
    },

    /// Buffer ended before the payload length declared in the header.
    #[error("frame truncated: header declares {expected} payload bytes, got {actual}")]
    FrameTruncated {
        /// Payload bytes the header declared.
        expected: usize,
        /// Payload bytes actually available.
        actual: usize,
    },

    /// CBOR serialization of a payload body failed.
    #[error("payload encode failed: {0}")]
    CborEncode(String),

    /// CBOR deserialization of a payload body failed.
    #[error("payload decode failed: {0}")]
    CborDecode(String),
}

/// Convenience alias used throughout the protocol crate.
pub type Result<T> = std::result::Result<T, ProtocolError>;
