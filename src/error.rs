use thiserror::Error;

/// All errors produced by the framing and codec layer.
///
/// None of these ever reach an application: per the receiver's discard
/// policy, every variant here is caught at the `Receiver`/`Channel`
/// boundary and turned into a silent drop (with a `tracing::debug!`).
/// They exist as typed values so the codec itself stays testable.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("frame too short: expected at least {expected} bytes, got {actual}")]
    FrameTooShort { expected: usize, actual: usize },

    #[error("unknown frame kind: 0x{0:02x}")]
    UnknownFrameKind(u8),

    #[error("crc mismatch")]
    CrcMismatch,

    #[error("payload too large: {size} bytes exceeds maximum {max}")]
    PayloadTooLarge { size: usize, max: usize },
}

pub type Result<T> = std::result::Result<T, TransportError>;
