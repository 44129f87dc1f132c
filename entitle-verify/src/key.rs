//! Public key decoding.

use crate::error::{VerifyError, VerifyResult};
use base64::{engine::general_purpose::STANDARD, Engine};
use ed25519_dalek::pkcs8::DecodePublicKey as _;
use ed25519_dalek::{Signature as Ed25519Signature, Verifier as _, PUBLIC_KEY_LENGTH};
use rsa::pkcs1v15;
use rsa::pkcs8::der::Decode;
use rsa::pkcs8::{ObjectIdentifier, SubjectPublicKeyInfoRef};
use rsa::RsaPublicKey;
use sha1::Sha1;
use std::fmt;

const RSA_ENCRYPTION_OID: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.1");
const ED25519_OID: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.101.112");

/// Signature scheme implied by a public key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyAlgorithm {
    /// RSASSA-PKCS1-v1_5 over SHA-1 (`SHA1withRSA`).
    RsaSha1,
    /// Ed25519.
    Ed25519,
}

impl fmt::Display for KeyAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RsaSha1 => f.write_str("SHA1withRSA"),
            Self::Ed25519 => f.write_str("Ed25519"),
        }
    }
}

/// A decoded developer-account public key.
#[derive(Debug, Clone)]
pub enum PublicKey {
    RsaSha1(pkcs1v15::VerifyingKey<Sha1>),
    Ed25519(ed25519_dalek::VerifyingKey),
}

impl PublicKey {
    #[must_use]
    pub fn algorithm(&self) -> KeyAlgorithm {
        match self {
            Self::RsaSha1(_) => KeyAlgorithm::RsaSha1,
            Self::Ed25519(_) => KeyAlgorithm::Ed25519,
        }
    }

    /// The Ed25519 key, if this is one.
    #[must_use]
    pub fn as_ed25519(&self) -> Option<&ed25519_dalek::VerifyingKey> {
        match self {
            Self::Ed25519(key) => Some(key),
            Self::RsaSha1(_) => None,
        }
    }

    /// Checks raw signature bytes over `message`.
    pub(crate) fn verify(&self, message: &[u8], signature: &[u8]) -> VerifyResult<()> {
        match self {
            Self::RsaSha1(key) => {
                let signature = pkcs1v15::Signature::try_from(signature).map_err(|_| {
                    VerifyError::InvalidSignatureEncoding("not an RSA signature".to_string())
                })?;
                key.verify(message, &signature)
                    .map_err(|_| VerifyError::InvalidSignature)
            }
            Self::Ed25519(key) => {
                let signature = Ed25519Signature::from_slice(signature).map_err(|_| {
                    VerifyError::InvalidSignatureEncoding("invalid signature length".to_string())
                })?;
                key.verify(message, &signature)
                    .map_err(|_| VerifyError::InvalidSignature)
            }
        }
    }
}

impl From<RsaPublicKey> for PublicKey {
    fn from(key: RsaPublicKey) -> Self {
        Self::RsaSha1(pkcs1v15::VerifyingKey::new(key))
    }
}

impl From<ed25519_dalek::VerifyingKey> for PublicKey {
    fn from(key: ed25519_dalek::VerifyingKey) -> Self {
        Self::Ed25519(key)
    }
}

/// Removes the line breaks and padding whitespace that console-exported keys
/// and signatures often carry.
pub(crate) fn strip_whitespace(s: &str) -> String {
    s.chars().filter(|c| !c.is_whitespace()).collect()
}

/// Decodes a base64 public key.
///
/// Accepts an X.509 `SubjectPublicKeyInfo` DER document holding an RSA or
/// an Ed25519 key (the algorithm is taken from the document's OID), or the
/// raw 32 bytes of an Ed25519 key.
///
/// # Errors
///
/// Returns [`VerifyError::InvalidPublicKey`] if the input is empty, not
/// base64, names an unsupported algorithm, or does not hold a valid key.
pub fn decode_public_key(encoded: &str) -> VerifyResult<PublicKey> {
    let encoded = strip_whitespace(encoded);
    if encoded.is_empty() {
        return Err(VerifyError::InvalidPublicKey("key is empty".to_string()));
    }

    let bytes = STANDARD
        .decode(encoded.as_bytes())
        .map_err(|e| VerifyError::InvalidPublicKey(format!("invalid base64: {e}")))?;

    if bytes.len() == PUBLIC_KEY_LENGTH {
        let mut raw = [0u8; PUBLIC_KEY_LENGTH];
        raw.copy_from_slice(&bytes);
        return ed25519_dalek::VerifyingKey::from_bytes(&raw)
            .map(PublicKey::Ed25519)
            .map_err(|_| VerifyError::InvalidPublicKey("not an Ed25519 point".to_string()));
    }

    let spki = SubjectPublicKeyInfoRef::from_der(&bytes)
        .map_err(|e| VerifyError::InvalidPublicKey(format!("not a valid SPKI document: {e}")))?;

    let oid = spki.algorithm.oid;
    if oid == RSA_ENCRYPTION_OID {
        RsaPublicKey::from_public_key_der(&bytes)
            .map(PublicKey::from)
            .map_err(|e| VerifyError::InvalidPublicKey(format!("invalid RSA key: {e}")))
    } else if oid == ED25519_OID {
        ed25519_dalek::VerifyingKey::from_public_key_der(&bytes)
            .map(PublicKey::Ed25519)
            .map_err(|e| VerifyError::InvalidPublicKey(format!("invalid Ed25519 key: {e}")))
    } else {
        Err(VerifyError::InvalidPublicKey(format!(
            "unsupported key algorithm: {oid}"
        )))
    }
}
