//! A scripted in-memory billing client for testing.

use super::{BillingClient, BillingListener, PurchaseFlowParams, UiHost};
use async_trait::async_trait;
use entitle_types::{BillingResult, ProductId, ProductType, RawProduct, RawPurchase, ResponseCode};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug)]
struct MockState {
    ready: bool,
    listener: Option<BillingListener>,
    connect_results: VecDeque<BillingResult>,
    connect_attempts: usize,
    end_calls: usize,
    products: (BillingResult, Vec<RawProduct>),
    purchases: (BillingResult, Vec<RawPurchase>),
    product_queries: Vec<(Vec<ProductId>, ProductType)>,
    purchase_queries: usize,
    query_delay: Duration,
    ack_results: VecDeque<BillingResult>,
    ack_calls: Vec<String>,
    launch_result: BillingResult,
    launches: Vec<PurchaseFlowParams>,
}

/// A billing client whose responses are set by the test.
///
/// Connects successfully unless told otherwise, answers queries from the
/// configured lists, and records every acknowledge and launch call.
#[derive(Debug)]
pub struct MockBillingClient {
    state: Mutex<MockState>,
}

impl Default for MockBillingClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBillingClient {
    /// Creates a client with an empty catalog and no purchases.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState {
                ready: false,
                listener: None,
                connect_results: VecDeque::new(),
                connect_attempts: 0,
                end_calls: 0,
                products: (BillingResult::ok(), Vec::new()),
                purchases: (BillingResult::ok(), Vec::new()),
                product_queries: Vec::new(),
                purchase_queries: 0,
                query_delay: Duration::ZERO,
                ack_results: VecDeque::new(),
                ack_calls: Vec::new(),
                launch_result: BillingResult::ok(),
                launches: Vec::new(),
            }),
        }
    }

    /// Sets the catalog returned by product queries.
    pub fn with_products(self, products: Vec<RawProduct>) -> Self {
        self.set_products(products);
        self
    }

    /// Sets the purchases returned by purchase queries.
    pub fn with_purchases(self, purchases: Vec<RawPurchase>) -> Self {
        self.set_purchases(purchases);
        self
    }

    /// Replaces the catalog returned by product queries.
    pub fn set_products(&self, products: Vec<RawProduct>) {
        self.state.lock().unwrap().products = (BillingResult::ok(), products);
    }

    /// Makes product queries answer with `result` and `products`.
    pub fn set_products_response(&self, result: BillingResult, products: Vec<RawProduct>) {
        self.state.lock().unwrap().products = (result, products);
    }

    /// Replaces the purchases returned by purchase queries.
    pub fn set_purchases(&self, purchases: Vec<RawPurchase>) {
        self.state.lock().unwrap().purchases = (BillingResult::ok(), purchases);
    }

    /// Makes purchase queries answer with `result` and `purchases`.
    pub fn set_purchases_response(&self, result: BillingResult, purchases: Vec<RawPurchase>) {
        self.state.lock().unwrap().purchases = (result, purchases);
    }

    /// Delays every purchase query by `delay`.
    pub fn set_query_delay(&self, delay: Duration) {
        self.state.lock().unwrap().query_delay = delay;
    }

    /// Queues the outcome of the next connection attempt. Attempts with
    /// nothing queued succeed.
    pub fn queue_connect_result(&self, result: BillingResult) {
        self.state.lock().unwrap().connect_results.push_back(result);
    }

    /// Makes the next `n` connection attempts fail with `code`.
    pub fn fail_next_connects(&self, n: usize, code: ResponseCode) {
        let mut state = self.state.lock().unwrap();
        for _ in 0..n {
            state
                .connect_results
                .push_back(BillingResult::new(code, "scripted failure"));
        }
    }

    /// Queues the outcome of the next acknowledge call. Calls with nothing
    /// queued succeed.
    pub fn queue_ack_result(&self, result: BillingResult) {
        self.state.lock().unwrap().ack_results.push_back(result);
    }

    /// Sets the outcome of purchase-flow launches.
    pub fn set_launch_result(&self, result: BillingResult) {
        self.state.lock().unwrap().launch_result = result;
    }

    /// Simulates the service dropping the connection.
    pub fn disconnect(&self) {
        let listener = {
            let mut state = self.state.lock().unwrap();
            state.ready = false;
            state.listener.clone()
        };
        if let Some(listener) = listener {
            listener.on_service_disconnected();
        }
    }

    /// Simulates the service pushing a purchase update. Returns false if no
    /// listener is registered.
    pub fn push_purchases_update(
        &self,
        result: BillingResult,
        purchases: Option<Vec<RawPurchase>>,
    ) -> bool {
        let listener = self.state.lock().unwrap().listener.clone();
        match listener {
            Some(listener) => {
                listener.on_purchases_updated(result, purchases);
                true
            }
            None => false,
        }
    }

    /// Number of connection attempts so far.
    pub fn connect_attempts(&self) -> usize {
        self.state.lock().unwrap().connect_attempts
    }

    /// Number of `end_connection` calls.
    pub fn end_calls(&self) -> usize {
        self.state.lock().unwrap().end_calls
    }

    /// Every product query so far.
    pub fn product_queries(&self) -> Vec<(Vec<ProductId>, ProductType)> {
        self.state.lock().unwrap().product_queries.clone()
    }

    /// Number of purchase queries so far.
    pub fn purchase_queries(&self) -> usize {
        self.state.lock().unwrap().purchase_queries
    }

    /// Tokens passed to `acknowledge_purchase`, in call order.
    pub fn ack_calls(&self) -> Vec<String> {
        self.state.lock().unwrap().ack_calls.clone()
    }

    /// Number of acknowledge calls for `token`.
    pub fn ack_count(&self, token: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .ack_calls
            .iter()
            .filter(|t| t.as_str() == token)
            .count()
    }

    /// Every purchase-flow launch so far.
    pub fn launches(&self) -> Vec<PurchaseFlowParams> {
        self.state.lock().unwrap().launches.clone()
    }
}

#[async_trait]
impl BillingClient for MockBillingClient {
    async fn start_connection(&self, listener: BillingListener) -> BillingResult {
        let mut state = self.state.lock().unwrap();
        state.connect_attempts += 1;
        let result = state
            .connect_results
            .pop_front()
            .unwrap_or_else(BillingResult::ok);
        if result.is_ok() {
            state.ready = true;
            state.listener = Some(listener);
        }
        result
    }

    fn end_connection(&self) {
        let mut state = self.state.lock().unwrap();
        state.end_calls += 1;
        state.ready = false;
        state.listener = None;
    }

    fn is_ready(&self) -> bool {
        self.state.lock().unwrap().ready
    }

    async fn query_product_details(
        &self,
        product_ids: &[ProductId],
        product_type: ProductType,
    ) -> (BillingResult, Vec<RawProduct>) {
        let mut state = self.state.lock().unwrap();
        state.product_queries.push((product_ids.to_vec(), product_type));
        if !state.ready {
            return (ResponseCode::ServiceDisconnected.into(), Vec::new());
        }
        let (result, products) = &state.products;
        let products = products
            .iter()
            .filter(|p| product_ids.contains(&p.product_id))
            .cloned()
            .collect();
        (result.clone(), products)
    }

    async fn query_purchases(&self, _product_type: ProductType) -> (BillingResult, Vec<RawPurchase>) {
        let delay = {
            let mut state = self.state.lock().unwrap();
            state.purchase_queries += 1;
            state.query_delay
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let state = self.state.lock().unwrap();
        if !state.ready {
            return (ResponseCode::ServiceDisconnected.into(), Vec::new());
        }
        state.purchases.clone()
    }

    async fn acknowledge_purchase(&self, purchase_token: &str) -> BillingResult {
        let mut state = self.state.lock().unwrap();
        state.ack_calls.push(purchase_token.to_string());
        if !state.ready {
            return ResponseCode::ServiceDisconnected.into();
        }
        state.ack_results.pop_front().unwrap_or_else(BillingResult::ok)
    }

    async fn launch_purchase_flow(
        &self,
        _host: &UiHost,
        params: PurchaseFlowParams,
    ) -> BillingResult {
        let mut state = self.state.lock().unwrap();
        state.launches.push(params);
        if !state.ready {
            return ResponseCode::ServiceDisconnected.into();
        }
        state.launch_result.clone()
    }
}
