//! Error types for MPQ file streams.

use thiserror::Error;

/// Result type for stream operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the file-level stream.
///
/// Open-time layout violations deliberately do not appear here: they put
/// the stream into its unreadable state (probe with
/// [`MpqStream::is_readable`](crate::MpqStream::is_readable)), and later
/// operations on such a stream fail with [`Error::NotSupported`].
#[derive(Error, Debug)]
pub enum Error {
    /// IO error from the underlying archive reader.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A raw read returned fewer bytes than the layout requires.
    #[error("truncated data: expected {expected} bytes, got {actual}")]
    TruncatedData { expected: usize, actual: usize },

    /// The file is encrypted and no key is known or recoverable.
    #[error("file is encrypted and its key is unknown")]
    MissingEncryptionKey,

    /// The compression byte names a codec that is not implemented.
    #[error("unsupported compression: {0:#04x}")]
    UnsupportedCompression(u8),

    /// Decompression failed or embedded length data disagreed with the
    /// stored stream.
    #[error("corrupt data: {0}")]
    CorruptData(String),

    /// The operation is not available on this stream.
    #[error("operation not supported: {0}")]
    NotSupported(&'static str),

    /// Error from the crypto layer.
    #[error("crypto error: {0}")]
    Crypto(#[from] mpq_crypto::CryptoError),
}

impl From<Error> for std::io::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::Io(io) => io,
            Error::TruncatedData { .. } => {
                std::io::Error::new(std::io::ErrorKind::UnexpectedEof, err.to_string())
            }
            Error::NotSupported(_) => {
                std::io::Error::new(std::io::ErrorKind::Unsupported, err.to_string())
            }
            other => std::io::Error::new(std::io::ErrorKind::InvalidData, other.to_string()),
        }
    }
}
