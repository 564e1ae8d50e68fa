//! Error types for throttled I/O.

use std::io;

use thiserror::Error;

/// Main error type for configuring throttles.
#[derive(Error, Debug)]
pub enum ThrottleError {
    /// A rate that cannot be paced (zero count, zero window, or an interval
    /// that rounds down to nothing)
    #[error("Invalid rate: {0}")]
    InvalidRate(String),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Result type alias for throttle configuration.
pub type Result<T> = std::result::Result<T, ThrottleError>;

/// A relay operation that stopped on an inner stream error.
///
/// `transferred` bytes made it through before `source` was hit. For reads
/// those bytes are already in the caller's buffer.
#[derive(Error, Debug)]
#[error("I/O error after {transferred} bytes: {source}")]
pub struct TransferError {
    /// Bytes relayed before the failure
    pub transferred: usize,
    /// The error reported by the inner stream, unchanged
    #[source]
    pub source: io::Error,
}

impl TransferError {
    pub(crate) fn new(transferred: usize, source: io::Error) -> Self {
        Self {
            transferred,
            source,
        }
    }

    /// Discard the byte count and keep the inner error.
    pub fn into_inner(self) -> io::Error {
        self.source
    }
}

impl From<TransferError> for io::Error {
    fn from(err: TransferError) -> Self {
        io::Error::new(err.source.kind(), err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_transfer_error_exposes_source() {
        let err = TransferError::new(3, io::Error::new(io::ErrorKind::BrokenPipe, "gone"));

        assert_eq!(err.transferred, 3);
        assert_eq!(err.to_string(), "I/O error after 3 bytes: gone");
        assert!(err.source().is_some());
        assert_eq!(err.into_inner().kind(), io::ErrorKind::BrokenPipe);
    }

    #[test]
    fn test_transfer_error_into_io_error_keeps_kind() {
        let err = TransferError::new(0, io::Error::new(io::ErrorKind::ConnectionReset, "reset"));
        let io_err: io::Error = err.into();

        assert_eq!(io_err.kind(), io::ErrorKind::ConnectionReset);
    }

    #[test]
    fn test_io_error_conversion() {
        let err: ThrottleError = io::Error::new(io::ErrorKind::NotFound, "missing").into();
        assert!(matches!(err, ThrottleError::Io(_)));
    }
}
