//! Error types for OxiTar operations.
//!
//! Every failure in the codec is surfaced as a typed [`TarError`]. Nothing is
//! retried internally: header corruption stops the reader, validation failures
//! stop the writer before any byte of the offending header reaches the sink.

use std::io;
use thiserror::Error;

/// The main error type for OxiTar operations.
#[derive(Debug, Error)]
pub enum TarError {
    /// I/O error from underlying reader/writer.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Header checksum mismatch.
    #[error("Checksum mismatch at offset {offset}: stored {stored:?}, computed {computed}")]
    Checksum {
        /// Byte offset of the header block in the stream.
        offset: u64,
        /// Checksum stored in the header, if it could be parsed.
        stored: Option<u32>,
        /// Checksum computed over the block.
        computed: u32,
    },

    /// Entry violates the structural limits of its target format.
    #[error("Format error: {message}")]
    Format {
        /// Description of the violated limit.
        message: String,
    },

    /// A text field could not be represented in its header slot.
    #[error("Encoding error: {message}")]
    Encoding {
        /// Description of the encoding error.
        message: String,
    },

    /// A numeric value does not fit its header field.
    #[error("Value {value} out of range for {width}-byte field")]
    Range {
        /// The value that was rejected.
        value: i128,
        /// Width of the target field in bytes.
        width: usize,
    },

    /// A decoded numeric value does not fit the target integer type.
    #[error("Numeric field of {width} bytes overflows target integer")]
    Overflow {
        /// Width of the source field in bytes.
        width: usize,
    },

    /// Payload write exceeds the declared entry size.
    #[error("Entry size exceeded: declared {declared} bytes, attempted {attempted}")]
    Size {
        /// Size declared in the entry header.
        declared: u64,
        /// Total size the write would have produced.
        attempted: u64,
    },

    /// Stream ended in the middle of a header or payload.
    #[error("Unexpected end of file while reading {context}")]
    UnexpectedEof {
        /// What was being read.
        context: &'static str,
    },

    /// Malformed header content (bad octal digits, bad PAX record, ...).
    #[error("Invalid header at offset {offset}: {message}")]
    InvalidHeader {
        /// Byte offset of the header block in the stream.
        offset: u64,
        /// Description of the header error.
        message: String,
    },

    /// A single zero block followed by a non-zero block.
    #[error("Unexpected zero block at offset {offset}")]
    UnexpectedZeroBlock {
        /// Byte offset of the zero block.
        offset: u64,
    },

    /// Illegal argument passed to a constructor or setter.
    #[error("Invalid argument: {message}")]
    InvalidArgument {
        /// Description of the argument error.
        message: String,
    },

    /// Payload written while no entry is open.
    #[error("No entry is open")]
    NoEntry,

    /// Operation attempted on a finished archive writer.
    #[error("Archive is already closed")]
    Closed,
}

/// Result type alias for OxiTar operations.
pub type Result<T> = std::result::Result<T, TarError>;

impl TarError {
    /// Create a checksum mismatch error.
    pub fn checksum(offset: u64, stored: Option<u32>, computed: u32) -> Self {
        Self::Checksum {
            offset,
            stored,
            computed,
        }
    }

    /// Create a format error.
    pub fn format(message: impl Into<String>) -> Self {
        Self::Format {
            message: message.into(),
        }
    }

    /// Create an encoding error.
    pub fn encoding(message: impl Into<String>) -> Self {
        Self::Encoding {
            message: message.into(),
        }
    }

    /// Create a range error.
    pub fn range(value: impl Into<i128>, width: usize) -> Self {
        Self::Range {
            value: value.into(),
            width,
        }
    }

    /// Create an overflow error.
    pub fn overflow(width: usize) -> Self {
        Self::Overflow { width }
    }

    /// Create a size error.
    pub fn size(declared: u64, attempted: u64) -> Self {
        Self::Size {
            declared,
            attempted,
        }
    }

    /// Create an unexpected EOF error.
    pub fn unexpected_eof(context: &'static str) -> Self {
        Self::UnexpectedEof { context }
    }

    /// Create an invalid header error.
    pub fn invalid_header(offset: u64, message: impl Into<String>) -> Self {
        Self::InvalidHeader {
            offset,
            message: message.into(),
        }
    }

    /// Create an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Attach a stream offset to an error raised without one.
    ///
    /// Field decoders have no notion of where their block lives in the stream;
    /// the reader re-anchors their errors once it knows.
    pub fn at_offset(self, offset: u64) -> Self {
        match self {
            Self::InvalidHeader { message, .. } => Self::InvalidHeader { offset, message },
            Self::Checksum {
                stored, computed, ..
            } => Self::Checksum {
                offset,
                stored,
                computed,
            },
            other => other,
        }
    }
}

impl From<TarError> for io::Error {
    fn from(err: TarError) -> Self {
        match err {
            TarError::Io(e) => e,
            TarError::UnexpectedEof { .. } => io::Error::new(io::ErrorKind::UnexpectedEof, err),
            TarError::InvalidArgument { .. } | TarError::Size { .. } => {
                io::Error::new(io::ErrorKind::InvalidInput, err)
            }
            other => io::Error::new(io::ErrorKind::InvalidData, other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TarError::checksum(1024, Some(0o1234), 0o4321);
        assert!(err.to_string().contains("Checksum mismatch"));
        assert!(err.to_string().contains("1024"));

        let err = TarError::range(-1i64, 8);
        assert!(err.to_string().contains("-1"));

        let err = TarError::size(5, 6);
        assert!(err.to_string().contains("declared 5"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let err: TarError = io_err.into();
        assert!(matches!(err, TarError::Io(_)));

        let back: io::Error = err.into();
        assert_eq!(back.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn test_typed_error_into_io() {
        let err: io::Error = TarError::size(10, 11).into();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
        let inner = err.into_inner().unwrap();
        assert!(inner.downcast_ref::<TarError>().is_some());

        let err: io::Error = TarError::unexpected_eof("payload").into();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn test_at_offset() {
        let err = TarError::invalid_header(0, "bad octal").at_offset(2048);
        assert!(matches!(err, TarError::InvalidHeader { offset: 2048, .. }));

        let err = TarError::format("x").at_offset(2048);
        assert!(matches!(err, TarError::Format { .. }));
    }
}
