//! Error types for signature verification.

use thiserror::Error;

/// Verification-specific errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerifyError {
    /// The configured public key could not be decoded.
    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),

    /// The signed payload or the signature is empty.
    #[error("purchase verification failed: missing data")]
    MissingData,

    /// The signature is not base64, or not shaped like a signature for the key.
    #[error("invalid signature encoding: {0}")]
    InvalidSignatureEncoding(String),

    /// The signature does not match the payload.
    #[error("signature verification failed")]
    InvalidSignature,
}

/// Result type for verification operations.
pub type VerifyResult<T> = Result<T, VerifyError>;
