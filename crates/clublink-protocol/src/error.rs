//! Error types for the protocol layer.
//!
//! Every buffer access in this crate is bounds-checked; a malformed or
//! truncated record becomes one of these variants instead of a panic.

/// Errors that can occur while building, enciphering, or parsing records.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    /// A read reached past the end of the payload.
    #[error("read of {width} bytes at offset {offset} exceeds payload of {len} bytes")]
    OutOfBounds {
        offset: usize,
        width: usize,
        len: usize,
    },

    /// A write would grow the record past the largest encodable frame.
    #[error("record of {needed} bytes exceeds capacity of {capacity} bytes")]
    Overflow { needed: usize, capacity: usize },

    /// Fields already pushed do not fit the command's fixed layout.
    #[error("payload of {len} bytes exceeds declared layout of {declared} bytes")]
    PayloadExceedsLayout { len: usize, declared: usize },

    /// A fixed-width string field must be a non-zero, even byte count.
    #[error("invalid string width {0}: must be a non-zero multiple of 2")]
    InvalidWidth(usize),

    /// A field was pushed before `set_command`.
    #[error("no command set on builder")]
    MissingCommand,

    /// Fewer bytes were supplied than the header requires.
    #[error("record truncated: need {needed} bytes, have {len}")]
    Truncated { needed: usize, len: usize },

    /// The length field disagrees with the bytes supplied.
    #[error("length field says {declared} bytes, buffer holds {actual}")]
    LengthMismatch { declared: usize, actual: usize },

    /// The frame checksum did not verify.
    #[error("checksum mismatch: header {expected:#04x}, computed {actual:#04x}")]
    Checksum { expected: u8, actual: u8 },

    /// The frame's version byte is not one this cipher understands.
    #[error("unsupported frame version {0:#04x}")]
    UnsupportedVersion(u8),
}
