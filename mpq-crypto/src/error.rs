//! Error types for mpq-crypto operations.

use thiserror::Error;

/// Errors that can occur during crypto operations.
#[derive(Error, Debug)]
pub enum CryptoError {
    /// No encryption key candidate survived brute-force recovery.
    #[error("encryption key recovery failed")]
    KeyRecoveryFailed,
}
