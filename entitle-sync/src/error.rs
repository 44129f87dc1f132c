//! Error types for the reconciliation layer.

use entitle_types::{BillingResult, ProductId, ResponseCode};
use thiserror::Error;

/// Result type for reconciliation operations.
pub type EntitleResult<T> = Result<T, EntitleError>;

/// Errors that can occur in reconciliation operations.
///
/// These stay inside the engine: the public engine surface reports outcomes
/// and booleans, never errors.
#[derive(Debug, Error)]
pub enum EntitleError {
    /// The billing service answered with a non-OK code.
    #[error("billing service error {code}: {message}")]
    Billing {
        code: ResponseCode,
        message: String,
    },

    /// The service returned no product details for the configured ids.
    #[error("billing service returned an empty catalog")]
    EmptyCatalog,

    /// The product is not in the synchronized catalog.
    #[error("unknown product: {0}")]
    UnknownProduct(ProductId),

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// Signature verification error.
    #[error(transparent)]
    Verification(#[from] entitle_verify::VerifyError),

    /// Malformed service record.
    #[error(transparent)]
    Record(#[from] entitle_types::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl EntitleError {
    /// Returns the billing response code carried by this error, if any.
    #[must_use]
    pub fn response_code(&self) -> Option<ResponseCode> {
        match self {
            Self::Billing { code, .. } => Some(*code),
            _ => None,
        }
    }
}

impl From<BillingResult> for EntitleError {
    fn from(result: BillingResult) -> Self {
        Self::Billing {
            code: result.code,
            message: result.debug_message,
        }
    }
}
