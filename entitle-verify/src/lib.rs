//! Signature verification for billing purchase records.
//!
//! The billing service signs every purchase payload with the developer
//! account's private key. This crate checks those signatures locally before
//! a purchase is allowed to grant entitlement.
//!
//! # Key format
//!
//! The public key is supplied as standard base64 of either:
//! - an X.509 `SubjectPublicKeyInfo` DER document, as exported by the
//!   billing console. An `rsaEncryption` key selects `SHA1withRSA`
//!   (RSASSA-PKCS1-v1_5 over SHA-1); an `id-Ed25519` key selects Ed25519.
//! - the raw 32-byte Ed25519 public key.
//!
//! # Signature format
//!
//! Signatures are standard base64 of the raw signature bytes over the
//! exact UTF-8 bytes of the signed JSON payload: the modulus-sized
//! PKCS#1 v1.5 block for RSA, 64 bytes for Ed25519.
//!
//! Verification is a pure function of the key, the payload and the
//! signature: nothing is cached and nothing is logged here. Callers decide
//! what a failure means.

mod error;
mod key;
mod verifier;

pub use error::{VerifyError, VerifyResult};
pub use key::{decode_public_key, KeyAlgorithm, PublicKey};
pub use verifier::{verify_signature, VerificationService};
