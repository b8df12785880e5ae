//! Error types for `acboptions`

use thiserror::Error;

/// The error type for `acboptions` operations.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum Error {
    /// IO error from file operations.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The data could not be parsed as the expected structure.
    #[error("malformed data at offset {offset:#x}: {message}")]
    Malformed {
        /// Byte offset at which parsing failed.
        offset: usize,
        /// Description of what was expected.
        message: String,
    },

    /// A section header's 16-byte magic pattern did not match.
    ///
    /// The container walk treats this as recoverable and retries at the
    /// next byte.
    #[error("section magic mismatch at offset {offset:#x}")]
    MagicMismatch {
        /// Byte offset of the candidate header.
        offset: usize,
    },

    /// A checksum did not validate.
    ///
    /// During platform detection this makes `detect_platform` fall through
    /// to the magic-based checks instead of aborting.
    #[error("checksum mismatch: expected {expected:#010x}, computed {actual:#010x}")]
    ChecksumMismatch {
        /// Checksum stored in the file.
        expected: u32,
        /// Checksum computed over the data.
        actual: u32,
    },

    /// The file is neither a recognizable PC nor PS3 options file.
    #[error("unrecognized platform: no section magic found")]
    UnknownPlatform,

    /// A section's payload extends past the end of the buffer.
    #[error("truncated section at offset {offset:#x}: need {needed} bytes, {available} available")]
    TruncatedSection {
        /// Byte offset of the section data.
        offset: usize,
        /// Bytes the header claims.
        needed: usize,
        /// Bytes actually remaining.
        available: usize,
    },
}

impl Error {
    /// Shorthand for a [`Error::Malformed`] with a formatted message.
    pub(crate) fn malformed(offset: usize, message: impl Into<String>) -> Self {
        Error::Malformed {
            offset,
            message: message.into(),
        }
    }
}

/// A specialized Result type for `acboptions` operations.
pub type Result<T> = std::result::Result<T, Error>;
