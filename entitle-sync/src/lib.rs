//! Entitlement reconciliation against an external billing service.
//!
//! Keeps an application's view of what the user owns consistent with the
//! billing service, across reconnects and app restarts.
//!
//! # Architecture
//!
//! ## Components
//!
//! - **Client**: the billing service contract ([`BillingClient`]) and a
//!   scripted mock for tests
//! - **Connection**: connection state machine with exponential-backoff
//!   reconnect
//! - **Catalog**: fetches product details for the configured ids
//! - **Reconcile**: verifies signatures and acknowledges purchases
//! - **Store**: publishes products and purchases as one snapshot
//! - **Flow**: launches the service's purchase UI
//! - **Engine**: owns all of the above behind a single worker task
//!
//! ## Lifecycle
//!
//! 1. **Connect**: the engine connects as soon as it starts
//! 2. **Bootstrap**: reconcile the user's purchases, then load the catalog
//! 3. **Ready**: serve lookups; reconcile pushed purchase updates as they
//!    arrive; re-sync on request or on resume
//! 4. **Reconnect**: when the service drops, retry with backoff (1 s
//!    doubling to 15 min) and bootstrap again on success
//! 5. **Release**: cancel the pending reconnect and end the connection
//!
//! # Example
//!
//! ```no_run
//! use entitle_sync::{client::mock::MockBillingClient, EngineConfig, ReconciliationEngine};
//! use std::sync::Arc;
//!
//! # async fn run() -> entitle_sync::EntitleResult<()> {
//! let client = Arc::new(MockBillingClient::new());
//! let config = EngineConfig::new("MCowBQYDK2VwAyEA...", ["premium"]);
//! let engine = ReconciliationEngine::start(client, config)?;
//!
//! let premium = "premium".into();
//! if let Some((product, purchase)) = engine.get(&premium) {
//!     println!("{}: owned = {}", product.title, purchase.is_some_and(|p| p.is_entitling()));
//! }
//! engine.release().await;
//! # Ok(())
//! # }
//! ```

pub mod analytics;
pub mod catalog;
pub mod client;
mod config;
pub mod connection;
mod engine;
mod error;
pub mod flow;
pub mod reconcile;
pub mod store;

pub use analytics::{Analytics, AnalyticsEvent, LogAnalytics, NoopAnalytics};
pub use catalog::CatalogSynchronizer;
pub use client::{BillingClient, BillingEvent, BillingListener, PurchaseFlowParams, UiHost};
pub use config::{EngineConfig, ReconnectConfig};
pub use connection::{Backoff, ConnectOutcome, ConnectionManager, ConnectionState, ReconnectRequest};
pub use engine::{EngineState, ReconciliationEngine, SyncOutcome};
pub use error::{EntitleError, EntitleResult};
pub use flow::PurchaseFlowInitiator;
pub use reconcile::{PurchaseReconciler, ReconcileOutcome, ReconcileScope};
pub use store::EntitlementStore;

pub use entitle_types::{
    BillingResult, EntitlementSnapshot, Product, ProductId, ProductType, Purchase, PurchaseState,
    RawProduct, RawPurchase, ResponseCode, ResponsePolicy,
};
