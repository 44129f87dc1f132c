//! Shared test helpers for verification tests.

#![allow(dead_code)]

use base64::{engine::general_purpose::STANDARD, Engine};
use ed25519_dalek::pkcs8::EncodePublicKey;
use ed25519_dalek::{Signer, SigningKey};
use rsa::pkcs1v15::SigningKey as RsaSigningKey;
use rsa::pkcs8::DecodePrivateKey as _;
use rsa::pkcs8::EncodePublicKey as _;
use rsa::signature::{SignatureEncoding as _, Signer as _};
use rsa::RsaPrivateKey;
use serde_json::json;
use sha1::Sha1;

/// Base64 SPKI of [`rsa_keypair`]'s public half, as exported by OpenSSL.
pub const RSA_PUBLIC_KEY: &str = include_str!("../fixtures/rsa_public_key.spki.b64");

/// A purchase payload signed by OpenSSL (`dgst -sha1 -sign`) with
/// [`rsa_keypair`].
pub const RSA_SIGNED_PURCHASE: &str = include_str!("../fixtures/rsa_signed_purchase.json");
pub const RSA_SIGNED_PURCHASE_SIGNATURE: &str =
    include_str!("../fixtures/rsa_signed_purchase.sig.b64");

fn rsa_fixture(pkcs8_b64: &str) -> RsaPrivateKey {
    let der = STANDARD.decode(pkcs8_b64.trim()).unwrap();
    RsaPrivateKey::from_pkcs8_der(&der).unwrap()
}

/// The 2048-bit RSA key behind the OpenSSL fixtures.
pub fn rsa_keypair() -> RsaPrivateKey {
    rsa_fixture(include_str!("../fixtures/rsa_signing_key.pk8.b64"))
}

/// A second, unrelated RSA key.
pub fn rsa_other_keypair() -> RsaPrivateKey {
    rsa_fixture(include_str!("../fixtures/rsa_other_key.pk8.b64"))
}

/// Base64 of the SPKI DER document for the RSA key's public half.
pub fn encoded_rsa_key(key: &RsaPrivateKey) -> String {
    let der = key.to_public_key().to_public_key_der().unwrap();
    STANDARD.encode(der.as_bytes())
}

/// Signs `data` with `SHA1withRSA` and returns the base64 signature.
pub fn rsa_sign(key: &RsaPrivateKey, data: &str) -> String {
    let signer = RsaSigningKey::<Sha1>::new(key.clone());
    STANDARD.encode(signer.sign(data.as_bytes()).to_bytes())
}

/// Returns a deterministic Ed25519 key pair from a fixed seed.
pub fn test_keypair() -> (SigningKey, [u8; 32]) {
    let seed: [u8; 32] = [
        1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20, 21, 22, 23, 24,
        25, 26, 27, 28, 29, 30, 31, 32,
    ];
    let signing_key = SigningKey::from_bytes(&seed);
    let verifying_key = signing_key.verifying_key();
    (signing_key, verifying_key.to_bytes())
}

/// A second, unrelated key pair.
pub fn other_keypair() -> SigningKey {
    SigningKey::from_bytes(&[7u8; 32])
}

/// Base64 of the SPKI DER document for the signing key's public half.
pub fn encoded_der_key(signing_key: &SigningKey) -> String {
    let der = signing_key.verifying_key().to_public_key_der().unwrap();
    STANDARD.encode(der.as_bytes())
}

/// Base64 of the raw 32-byte public key.
pub fn encoded_raw_key(signing_key: &SigningKey) -> String {
    STANDARD.encode(signing_key.verifying_key().to_bytes())
}

/// Signs `data` and returns the base64 signature.
pub fn sign(signing_key: &SigningKey, data: &str) -> String {
    STANDARD.encode(signing_key.sign(data.as_bytes()).to_bytes())
}

/// A purchase payload for `product` in the purchased state.
pub fn purchase_json(product: &str, token: &str) -> String {
    json!({
        "orderId": format!("GPA.{token}"),
        "productIds": [product],
        "purchaseTime": 1_700_000_000_000_i64,
        "purchaseState": 1,
        "purchaseToken": token,
        "quantity": 1,
        "acknowledged": false,
    })
    .to_string()
}
