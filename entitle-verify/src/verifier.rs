//! Purchase signature verification.

use crate::error::{VerifyError, VerifyResult};
use crate::key::{decode_public_key, strip_whitespace, KeyAlgorithm, PublicKey};
use base64::{engine::general_purpose::STANDARD, Engine};
use entitle_types::RawPurchase;

/// Verifies purchase payloads against the developer account's public key.
#[derive(Debug, Clone)]
pub struct VerificationService {
    key: PublicKey,
}

impl VerificationService {
    /// Creates a service from a base64 public key (SPKI DER or raw bytes).
    ///
    /// # Errors
    ///
    /// Returns an error if the key cannot be decoded.
    pub fn from_encoded_key(encoded: &str) -> VerifyResult<Self> {
        Ok(Self {
            key: decode_public_key(encoded)?,
        })
    }

    /// Creates a service from raw Ed25519 public key bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes are not a valid Ed25519 point.
    pub fn from_bytes(bytes: &[u8; 32]) -> VerifyResult<Self> {
        let key = ed25519_dalek::VerifyingKey::from_bytes(bytes)
            .map_err(|_| VerifyError::InvalidPublicKey("not an Ed25519 point".to_string()))?;
        Ok(Self { key: key.into() })
    }

    /// Creates a service from an already decoded key.
    #[must_use]
    pub fn from_key(key: impl Into<PublicKey>) -> Self {
        Self { key: key.into() }
    }

    #[must_use]
    pub fn public_key(&self) -> &PublicKey {
        &self.key
    }

    /// The signature scheme this service checks.
    #[must_use]
    pub fn algorithm(&self) -> KeyAlgorithm {
        self.key.algorithm()
    }

    /// Verifies that `signature` (base64) signs exactly `signed_data`.
    ///
    /// # Errors
    ///
    /// Returns an error if either input is empty, the signature is
    /// malformed, or it does not match.
    pub fn verify(&self, signed_data: &str, signature: &str) -> VerifyResult<()> {
        let signature = strip_whitespace(signature);
        if signed_data.is_empty() || signature.is_empty() {
            return Err(VerifyError::MissingData);
        }

        let sig_bytes = STANDARD.decode(signature.as_bytes()).map_err(|e| {
            VerifyError::InvalidSignatureEncoding(format!("invalid signature base64: {e}"))
        })?;

        self.key.verify(signed_data.as_bytes(), &sig_bytes)
    }

    /// Boolean form of [`Self::verify`].
    #[must_use]
    pub fn is_valid(&self, signed_data: &str, signature: &str) -> bool {
        self.verify(signed_data, signature).is_ok()
    }

    /// Verifies a purchase record's signed payload.
    ///
    /// # Errors
    ///
    /// See [`Self::verify`].
    pub fn verify_purchase(&self, purchase: &RawPurchase) -> VerifyResult<()> {
        self.verify(purchase.original_json(), purchase.signature())
    }
}

/// Stateless check: decodes `encoded_key` and verifies `signature` over
/// `signed_data`. Any decoding problem counts as a failed verification.
#[must_use]
pub fn verify_signature(encoded_key: &str, signed_data: &str, signature: &str) -> bool {
    VerificationService::from_encoded_key(encoded_key)
        .map(|service| service.is_valid(signed_data, signature))
        .unwrap_or(false)
}
