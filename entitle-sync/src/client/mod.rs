//! Billing service abstraction.
//!
//! Defines the contract the engine consumes from the external billing
//! service. The service's callbacks (unsolicited disconnects and purchase
//! updates) are delivered through a [`BillingListener`], which feeds the
//! engine's single-consumer queue.

pub mod mock;

use async_trait::async_trait;
use entitle_types::{BillingResult, ProductId, ProductType, RawProduct, RawPurchase};
use std::any::Any;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

/// Asynchronous notifications pushed by the billing service.
#[derive(Debug, Clone)]
pub enum BillingEvent {
    /// The service dropped the connection.
    ServiceDisconnected,
    /// A purchase flow completed (or failed) and the service reports the
    /// resulting records.
    PurchasesUpdated {
        result: BillingResult,
        purchases: Option<Vec<RawPurchase>>,
    },
}

/// Handle the billing service uses to report asynchronous events.
///
/// Cheap to clone. Events must never block the caller.
#[derive(Clone)]
pub struct BillingListener {
    sink: Arc<dyn Fn(BillingEvent) + Send + Sync>,
}

impl fmt::Debug for BillingListener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("BillingListener(..)")
    }
}

impl BillingListener {
    /// Creates a listener that hands every event to `sink`.
    pub fn new(sink: impl Fn(BillingEvent) + Send + Sync + 'static) -> Self {
        Self {
            sink: Arc::new(sink),
        }
    }

    /// Creates a listener backed by an unbounded queue and returns the
    /// receiving end.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<BillingEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let listener = Self::new(move |event| {
            if tx.send(event).is_err() {
                debug!("billing event dropped: receiver gone");
            }
        });
        (listener, rx)
    }

    /// Reports that the service dropped the connection.
    pub fn on_service_disconnected(&self) {
        (self.sink)(BillingEvent::ServiceDisconnected);
    }

    /// Reports the outcome of a purchase flow.
    pub fn on_purchases_updated(&self, result: BillingResult, purchases: Option<Vec<RawPurchase>>) {
        (self.sink)(BillingEvent::PurchasesUpdated { result, purchases });
    }
}

/// Opaque handle to the UI surface that hosts the purchase flow.
///
/// The engine never inspects it; the billing client downcasts it to its own
/// host type.
#[derive(Clone)]
pub struct UiHost(Arc<dyn Any + Send + Sync>);

impl UiHost {
    /// Wraps a client-specific host.
    pub fn new<T: Any + Send + Sync>(inner: T) -> Self {
        Self(Arc::new(inner))
    }

    /// Returns the wrapped host if it is a `T`.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }
}

impl fmt::Debug for UiHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("UiHost(..)")
    }
}

/// Parameters for launching the service's purchase UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurchaseFlowParams {
    /// Service details of the product being bought.
    pub product: RawProduct,
}

/// The external billing service.
///
/// Implementations wrap a platform billing SDK. All methods report the
/// service's response code; none of them panic on service failure.
#[async_trait]
pub trait BillingClient: Send + Sync {
    /// Connects to the service and resolves with the setup outcome.
    /// `listener` receives later disconnects and purchase updates.
    async fn start_connection(&self, listener: BillingListener) -> BillingResult;

    /// Closes the connection. Safe to call when not connected.
    fn end_connection(&self);

    /// Returns whether the connection is usable.
    fn is_ready(&self) -> bool;

    /// Queries product details for the given ids.
    async fn query_product_details(
        &self,
        product_ids: &[ProductId],
        product_type: ProductType,
    ) -> (BillingResult, Vec<RawProduct>);

    /// Queries the user's current purchases of the given type.
    async fn query_purchases(&self, product_type: ProductType) -> (BillingResult, Vec<RawPurchase>);

    /// Acknowledges a purchase by token.
    async fn acknowledge_purchase(&self, purchase_token: &str) -> BillingResult;

    /// Launches the purchase UI. Resolves once the launch request itself is
    /// accepted or rejected; the purchase outcome arrives via the listener.
    async fn launch_purchase_flow(&self, host: &UiHost, params: PurchaseFlowParams)
        -> BillingResult;
}
