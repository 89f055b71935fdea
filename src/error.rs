//! FLAC decoder error types.

use thiserror::Error;

/// FLAC decoder error.
#[derive(Debug, Error)]
pub enum FlacError {
    /// The stream does not begin with the `fLaC` marker.
    #[error("Stream is not FLAC: missing fLaC marker")]
    NotFlac,

    /// A metadata block is structurally invalid or truncated.
    #[error("Malformed metadata: {0}")]
    MalformedMetadata(String),

    /// The byte source ended in the middle of a syntax element.
    #[error("Unexpected end of stream")]
    UnexpectedEof,

    /// The bitstream carries a reserved code point or fails an integrity
    /// check; the kind identifies the offending construct.
    #[error("Invalid bitstream: {0}")]
    InvalidBitstream(BitstreamErrorKind),

    /// Programmer error on the decoder API (not a stream defect).
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// I/O failure from the underlying byte source.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// The specific bitstream construct that was invalid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum BitstreamErrorKind {
    /// Frame sync pattern was not `11111111111110`.
    #[error("frame sync mismatch")]
    SyncMismatch,

    /// A reserved bit was set.
    #[error("reserved bit set")]
    ReservedBit,

    /// Block size code `0000` is reserved.
    #[error("reserved block size code")]
    ReservedBlockSize,

    /// Sample rate code `1111` is reserved.
    #[error("reserved sample rate code")]
    ReservedSampleRate,

    /// Sample size code `011` is reserved.
    #[error("reserved sample size code")]
    ReservedSampleSize,

    /// Channel assignment values 11..=15 are reserved.
    #[error("reserved channel assignment")]
    ReservedChannelAssignment,

    /// Subframe type code falls in a reserved range.
    #[error("reserved subframe type code")]
    ReservedSubframeType,

    /// QLP coefficient precision code 15 is reserved.
    #[error("reserved QLP precision")]
    ReservedQlpPrecision,

    /// Residual coding methods 2 and 3 are reserved.
    #[error("reserved residual coding method")]
    ReservedResidualMethod,

    /// Block size is not divisible by the Rice partition count, or the
    /// first partition cannot hold the warm-up samples.
    #[error("invalid residual partition order")]
    InvalidPartitionOrder,

    /// Wasted-bit count meets or exceeds the sample width.
    #[error("invalid wasted bits count")]
    InvalidWastedBits,

    /// The UTF-8-coded frame/sample number is malformed.
    #[error("malformed UTF-8 coded number")]
    MalformedUtf8,

    /// A checksum did not match the stored value.
    #[error("{kind} mismatch: expected {expected:#06x}, got {actual:#06x}")]
    CrcMismatch {
        /// Which checksum failed.
        kind: CrcKind,
        /// Value stored in the stream.
        expected: u16,
        /// Value computed over the consumed bytes.
        actual: u16,
    },

    /// Decoded audio does not match the STREAMINFO MD5 signature.
    #[error("MD5 signature mismatch")]
    Md5Mismatch,
}

/// Which checksum a [`BitstreamErrorKind::CrcMismatch`] refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrcKind {
    /// The frame header CRC-8.
    Crc8,
    /// The whole-frame CRC-16.
    Crc16,
}

impl std::fmt::Display for CrcKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CrcKind::Crc8 => write!(f, "CRC-8"),
            CrcKind::Crc16 => write!(f, "CRC-16"),
        }
    }
}

/// FLAC decoder result type.
pub type Result<T> = std::result::Result<T, FlacError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = FlacError::NotFlac;
        assert_eq!(err.to_string(), "Stream is not FLAC: missing fLaC marker");

        let err = FlacError::InvalidBitstream(BitstreamErrorKind::SyncMismatch);
        assert_eq!(err.to_string(), "Invalid bitstream: frame sync mismatch");
    }

    #[test]
    fn test_crc_mismatch_display() {
        let err = FlacError::InvalidBitstream(BitstreamErrorKind::CrcMismatch {
            kind: CrcKind::Crc8,
            expected: 0x12,
            actual: 0x34,
        });
        let text = err.to_string();
        assert!(text.contains("CRC-8"));
        assert!(text.contains("0x0012"));
        assert!(text.contains("0x0034"));
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "boom");
        let err: FlacError = io.into();
        assert!(matches!(err, FlacError::Io(_)));
    }
}
