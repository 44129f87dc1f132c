//! Shared fixtures for reconciliation tests.

#![allow(dead_code)]

use base64::{engine::general_purpose::STANDARD, Engine};
use ed25519_dalek::pkcs8::EncodePublicKey;
use ed25519_dalek::{Signer, SigningKey};
use entitle_sync::analytics::{Analytics, AnalyticsEvent};
use entitle_sync::client::mock::MockBillingClient;
use entitle_sync::{
    BillingClient, BillingListener, EngineConfig, EngineState, ProductId, ProductType,
    PurchaseReconciler, RawProduct, RawPurchase, ReconciliationEngine,
};
use entitle_verify::VerificationService;
use rsa::pkcs1v15::SigningKey as RsaSigningKey;
use rsa::pkcs8::DecodePrivateKey as _;
use rsa::pkcs8::EncodePublicKey as _;
use rsa::signature::{SignatureEncoding as _, Signer as _};
use rsa::RsaPrivateKey;
use serde_json::json;
use sha1::Sha1;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

pub const PREMIUM: &str = "premium";
pub const REMOVE_ADS: &str = "remove_ads";

/// Installs a test subscriber once. Honors `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Deterministic signing key for the service's account.
pub fn signing_key() -> SigningKey {
    let seed: [u8; 32] = [
        1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20, 21, 22, 23, 24,
        25, 26, 27, 28, 29, 30, 31, 32,
    ];
    SigningKey::from_bytes(&seed)
}

/// An unrelated key, for forged signatures.
pub fn forger_key() -> SigningKey {
    SigningKey::from_bytes(&[9u8; 32])
}

/// Base64 SPKI public key matching [`signing_key`].
pub fn public_key() -> String {
    let der = signing_key().verifying_key().to_public_key_der().unwrap();
    STANDARD.encode(der.as_bytes())
}

/// The service account's 2048-bit RSA key, for `SHA1withRSA` records.
pub fn rsa_signing_key() -> RsaPrivateKey {
    let der = STANDARD
        .decode(include_str!("../fixtures/rsa_signing_key.pk8.b64").trim())
        .unwrap();
    RsaPrivateKey::from_pkcs8_der(&der).unwrap()
}

/// Base64 SPKI public key matching [`rsa_signing_key`].
pub fn rsa_public_key() -> String {
    let der = rsa_signing_key().to_public_key().to_public_key_der().unwrap();
    STANDARD.encode(der.as_bytes())
}

pub fn rsa_config() -> EngineConfig {
    EngineConfig::new(rsa_public_key(), [PREMIUM, REMOVE_ADS])
}

/// A genuine, unacknowledged, completed purchase signed with `SHA1withRSA`.
pub fn rsa_purchased(product: &str, token: &str) -> RawPurchase {
    let json = payload(product, token, 1, false);
    let signer = RsaSigningKey::<Sha1>::new(rsa_signing_key());
    let signature = STANDARD.encode(signer.sign(json.as_bytes()).to_bytes());
    RawPurchase::new(json, signature).unwrap()
}

pub fn pid(id: &str) -> ProductId {
    ProductId::new(id)
}

/// Payload for a purchase of `product`.
pub fn payload(product: &str, token: &str, state: i32, acknowledged: bool) -> String {
    json!({
        "orderId": format!("GPA.{token}"),
        "productIds": [product],
        "purchaseTime": 1_700_000_000_000_i64,
        "purchaseState": state,
        "purchaseToken": token,
        "quantity": 1,
        "acknowledged": acknowledged,
    })
    .to_string()
}

fn signed(json: String, key: &SigningKey) -> RawPurchase {
    let signature = STANDARD.encode(key.sign(json.as_bytes()).to_bytes());
    RawPurchase::new(json, signature).unwrap()
}

/// A genuine, unacknowledged, completed purchase.
pub fn purchased(product: &str, token: &str) -> RawPurchase {
    signed(payload(product, token, 1, false), &signing_key())
}

/// A genuine completed purchase the service already reports acknowledged.
pub fn acknowledged(product: &str, token: &str) -> RawPurchase {
    signed(payload(product, token, 1, true), &signing_key())
}

/// A genuine purchase still awaiting payment.
pub fn pending(product: &str, token: &str) -> RawPurchase {
    signed(payload(product, token, 2, false), &signing_key())
}

/// A completed purchase signed by the wrong key.
pub fn forged(product: &str, token: &str) -> RawPurchase {
    signed(payload(product, token, 1, false), &forger_key())
}

/// A purchase whose payload was altered after signing.
pub fn tampered(product: &str, token: &str) -> RawPurchase {
    let genuine = purchased(product, token);
    let altered = genuine.original_json().replace("\"quantity\":1", "\"quantity\":5");
    assert_ne!(altered, genuine.original_json());
    RawPurchase::new(altered, genuine.signature()).unwrap()
}

pub fn catalog() -> Vec<RawProduct> {
    vec![
        RawProduct::new(PREMIUM, "Premium").with_price("$4.99", 4_990_000, "USD"),
        RawProduct::new(REMOVE_ADS, "Remove ads").with_price("$1.99", 1_990_000, "USD"),
    ]
}

pub fn config() -> EngineConfig {
    EngineConfig::new(public_key(), [PREMIUM, REMOVE_ADS])
}

/// Config with millisecond backoff, for tests that wait on real reconnects.
pub fn fast_config() -> EngineConfig {
    let mut config = config();
    config.reconnect.initial_delay_ms = 10;
    config.reconnect.max_delay_ms = 40;
    config
}

/// A mock client that has completed its connection handshake.
pub async fn connected_client() -> Arc<MockBillingClient> {
    init_tracing();
    let client = Arc::new(MockBillingClient::new().with_products(catalog()));
    let result = client.start_connection(BillingListener::channel().0).await;
    assert!(result.is_ok());
    client
}

pub fn verifier() -> VerificationService {
    VerificationService::from_encoded_key(&public_key()).unwrap()
}

/// A reconciler over `client` reporting to `analytics`.
pub fn reconciler(
    client: &Arc<MockBillingClient>,
    analytics: Arc<dyn Analytics>,
) -> PurchaseReconciler {
    PurchaseReconciler::new(client.clone(), verifier(), ProductType::InApp, analytics)
}

/// Starts an engine over `client` and waits until it is ready.
pub async fn ready_engine(client: &Arc<MockBillingClient>, config: EngineConfig) -> ReconciliationEngine {
    init_tracing();
    let engine = ReconciliationEngine::start(client.clone(), config).unwrap();
    wait_for_state(&engine, EngineState::Ready).await;
    engine
}

/// Waits until the engine reaches `target`, failing after sixty seconds.
pub async fn wait_for_state(engine: &ReconciliationEngine, target: EngineState) {
    let mut states = engine.subscribe_state();
    tokio::time::timeout(Duration::from_secs(60), states.wait_for(|s| *s == target))
        .await
        .expect("timed out waiting for engine state")
        .expect("engine state channel closed");
}

/// Analytics sink that keeps every event.
#[derive(Default)]
pub struct RecordingAnalytics {
    events: Mutex<Vec<AnalyticsEvent>>,
}

impl RecordingAnalytics {
    pub fn events(&self) -> Vec<AnalyticsEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl Analytics for RecordingAnalytics {
    fn record(&self, event: &AnalyticsEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}
