//! The reconciliation engine.
//!
//! [`ReconciliationEngine`] is the handle the application owns. Behind it a
//! single worker task drains one queue carrying public commands, billing
//! events and reconnect requests, in arrival order. Connecting,
//! bootstrapping, manual syncs, resume refreshes and push-triggered
//! reconciliation therefore never overlap.
//!
//! ```text
//! caller ──sync/resume/release──┐
//! billing listener ──events─────┼──▶ task queue ──▶ worker ──▶ store ──▶ subscribers
//! reconnect timer ──requests────┘
//! ```

use crate::analytics::{Analytics, AnalyticsEvent, LogAnalytics};
use crate::catalog::CatalogSynchronizer;
use crate::client::{BillingClient, BillingEvent, BillingListener, UiHost};
use crate::config::EngineConfig;
use crate::connection::{ConnectOutcome, ConnectionManager, ConnectionState, ReconnectRequest};
use crate::error::{EntitleError, EntitleResult};
use crate::flow::PurchaseFlowInitiator;
use crate::reconcile::{PurchaseReconciler, ReconcileOutcome};
use crate::store::EntitlementStore;
use entitle_types::{
    BillingResult, EntitlementSnapshot, Product, ProductId, Purchase, RawPurchase, ResponseCode,
    ResponsePolicy,
};
use entitle_verify::VerificationService;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, error, info, warn};

/// Lifecycle of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineState {
    /// Created; the worker has not started connecting yet.
    Uninitialized,
    /// Connecting, bootstrapping, or waiting to reconnect.
    Connecting,
    /// Connected and bootstrapped.
    Ready,
    /// Released. Terminal.
    Closed,
}

/// Result of [`ReconciliationEngine::sync`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The pass changed the published purchases.
    Published,
    /// The pass completed; nothing changed.
    Unchanged,
    /// The service is not connected; a reconnect is on its way.
    Unavailable,
    /// The service rejected the purchase query.
    Failed(ResponseCode),
    /// The engine is released.
    Closed,
}

enum Task {
    Sync(oneshot::Sender<SyncOutcome>),
    Refresh,
    ConnectionLost,
    Billing(BillingEvent),
    Reconnect(ReconnectRequest),
    Release(oneshot::Sender<()>),
}

/// Keeps the application's entitlements in step with the billing service.
///
/// Must be created inside a tokio runtime. Dropping the handle closes the
/// engine and ends the connection at once, without waiting for the worker.
pub struct ReconciliationEngine {
    tasks: mpsc::UnboundedSender<Task>,
    store: Arc<EntitlementStore>,
    connection: Arc<ConnectionManager>,
    flow: PurchaseFlowInitiator,
    state: Arc<watch::Sender<EngineState>>,
    closed: Arc<AtomicBool>,
}

impl ReconciliationEngine {
    /// Starts an engine that reports analytics to the log.
    ///
    /// # Errors
    ///
    /// Returns [`EntitleError::Config`] if the configuration is invalid,
    /// the public key cannot be decoded, or no tokio runtime is running.
    pub fn start(client: Arc<dyn BillingClient>, config: EngineConfig) -> EntitleResult<Self> {
        Self::start_with_analytics(client, config, Arc::new(LogAnalytics))
    }

    /// Starts an engine with the given analytics sink.
    ///
    /// Connecting begins immediately in the background.
    ///
    /// # Errors
    ///
    /// Returns [`EntitleError::Config`] if the configuration is invalid,
    /// the public key cannot be decoded, or no tokio runtime is running.
    pub fn start_with_analytics(
        client: Arc<dyn BillingClient>,
        config: EngineConfig,
        analytics: Arc<dyn Analytics>,
    ) -> EntitleResult<Self> {
        let runtime = Handle::try_current()
            .map_err(|e| EntitleError::Config(format!("no tokio runtime: {e}")))?;
        config.validate()?;
        let verifier = VerificationService::from_encoded_key(&config.public_key)
            .map_err(|e| EntitleError::Config(format!("public key: {e}")))?;
        debug!(algorithm = %verifier.algorithm(), "purchase signature key loaded");

        let (tasks, queue) = mpsc::unbounded_channel();

        let weak = tasks.downgrade();
        let listener = BillingListener::new(move |event| {
            if let Some(tasks) = weak.upgrade() {
                let _ = tasks.send(Task::Billing(event));
            }
        });

        let weak = tasks.downgrade();
        let connection = Arc::new(ConnectionManager::new(
            Arc::clone(&client),
            &config.reconnect,
            move |request| {
                if let Some(tasks) = weak.upgrade() {
                    let _ = tasks.send(Task::Reconnect(request));
                }
            },
        ));

        let store = Arc::new(EntitlementStore::new());
        let (state, _) = watch::channel(EngineState::Uninitialized);
        let state = Arc::new(state);
        let closed = Arc::new(AtomicBool::new(false));

        let worker = Worker {
            catalog: CatalogSynchronizer::new(
                Arc::clone(&client),
                config.product_type,
                Arc::clone(&analytics),
            ),
            reconciler: PurchaseReconciler::new(
                Arc::clone(&client),
                verifier,
                config.product_type,
                Arc::clone(&analytics),
            ),
            product_ids: config.product_ids,
            connection: Arc::clone(&connection),
            store: Arc::clone(&store),
            listener,
            state: Arc::clone(&state),
            closed: Arc::clone(&closed),
            analytics: Arc::clone(&analytics),
        };
        runtime.spawn(worker.run(queue));

        let flow = PurchaseFlowInitiator::new(client, Arc::clone(&store), analytics);

        Ok(Self {
            tasks,
            store,
            connection,
            flow,
            state,
            closed,
        })
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Runs a full reconciliation pass and publishes the result.
    ///
    /// Queued behind any work already pending. When the service is not
    /// connected the store is left alone and [`SyncOutcome::Unavailable`]
    /// is returned.
    pub async fn sync(&self) -> SyncOutcome {
        if self.is_closed() {
            return SyncOutcome::Closed;
        }
        let (reply, outcome) = oneshot::channel();
        if self.tasks.send(Task::Sync(reply)).is_err() {
            return SyncOutcome::Closed;
        }
        outcome.await.unwrap_or(SyncOutcome::Closed)
    }

    /// Queues a full refresh if the engine is ready, as when the
    /// application returns to the foreground. Returns whether one was
    /// queued.
    pub fn resume(&self) -> bool {
        if self.is_closed() || self.state() != EngineState::Ready {
            debug!(state = ?self.state(), "resume ignored");
            return false;
        }
        self.tasks.send(Task::Refresh).is_ok()
    }

    /// Launches the purchase UI for `product_id`. Returns true if the
    /// service accepted the launch; the purchase itself is reported later.
    pub async fn initiate_purchase_flow(&self, host: &UiHost, product_id: &ProductId) -> bool {
        if self.is_closed() {
            warn!(%product_id, "purchase flow requested after release");
            return false;
        }
        match self.flow.launch(host, product_id).await {
            Ok(()) => true,
            Err(e) => {
                if e.response_code() == Some(ResponseCode::ServiceDisconnected) {
                    let _ = self.tasks.send(Task::ConnectionLost);
                }
                false
            }
        }
    }

    /// The catalog product paired with its purchase, or `None` if the
    /// product is not in the catalog.
    pub fn get(&self, product_id: &ProductId) -> Option<(Product, Option<Purchase>)> {
        self.store.get(product_id)
    }

    pub fn snapshot(&self) -> Arc<EntitlementSnapshot> {
        self.store.snapshot()
    }

    /// Watches the published snapshot.
    pub fn subscribe(&self) -> watch::Receiver<Arc<EntitlementSnapshot>> {
        self.store.subscribe()
    }

    pub fn products(&self) -> Vec<Product> {
        self.store.products()
    }

    pub fn purchases(&self) -> Vec<Purchase> {
        self.store.purchases()
    }

    pub fn state(&self) -> EngineState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<EngineState> {
        self.state.subscribe()
    }

    /// State of the underlying service connection.
    pub fn connection_state(&self) -> ConnectionState {
        self.connection.state()
    }

    /// Shuts the engine down.
    ///
    /// The state moves to `Closed` and the pending reconnect is cancelled
    /// at once. A service call already running on the worker is allowed to
    /// complete, its result discarded; the connection is ended after it,
    /// before this returns. Idempotent.
    pub async fn release(&self) {
        if !self.close() {
            return;
        }
        let (reply, done) = oneshot::channel();
        let stopped = match self.tasks.send(Task::Release(reply)) {
            Ok(()) => done.await.is_ok(),
            Err(_) => false,
        };
        if !stopped {
            warn!("reconciliation worker gone; ending the connection here");
            self.connection.release();
        }
    }

    /// Marks the engine closed. Returns false if it already was.
    fn close(&self) -> bool {
        if self.closed.swap(true, Ordering::SeqCst) {
            return false;
        }
        info!("releasing reconciliation engine");
        self.connection.halt();
        self.state.send_replace(EngineState::Closed);
        true
    }
}

impl Drop for ReconciliationEngine {
    fn drop(&mut self) {
        self.close();
        self.connection.release();
    }
}

struct Worker {
    catalog: CatalogSynchronizer,
    reconciler: PurchaseReconciler,
    product_ids: Vec<ProductId>,
    connection: Arc<ConnectionManager>,
    store: Arc<EntitlementStore>,
    listener: BillingListener,
    state: Arc<watch::Sender<EngineState>>,
    closed: Arc<AtomicBool>,
    analytics: Arc<dyn Analytics>,
}

impl Worker {
    async fn run(self, mut queue: mpsc::UnboundedReceiver<Task>) {
        self.connect().await;

        let mut released = None;
        while let Some(task) = queue.recv().await {
            match task {
                Task::Release(done) => {
                    released = Some(done);
                    break;
                }
                Task::Sync(reply) => {
                    let outcome = self.sync().await;
                    let _ = reply.send(outcome);
                }
                Task::Refresh => {
                    if self.current_state() == EngineState::Ready {
                        let outcome = self.sync().await;
                        debug!(?outcome, "resume refresh finished");
                    }
                }
                Task::ConnectionLost => self.connection_lost(),
                Task::Billing(event) => self.handle_event(event).await,
                Task::Reconnect(request) => {
                    if self.is_closed() {
                        continue;
                    }
                    debug!(attempt = request.attempt, "reconnecting to billing service");
                    self.connect().await;
                }
            }
        }

        self.shutdown();
        if let Some(done) = released {
            let _ = done.send(());
        }
        debug!("reconciliation worker stopped");
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn current_state(&self) -> EngineState {
        *self.state.borrow()
    }

    /// Moves to `next` unless the engine is closed.
    fn set_state(&self, next: EngineState) {
        self.state.send_if_modified(|state| {
            if *state == EngineState::Closed || *state == next {
                false
            } else {
                *state = next;
                true
            }
        });
    }

    fn shutdown(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.connection.release();
        self.state.send_replace(EngineState::Closed);
    }

    async fn connect(&self) {
        if self.is_closed() {
            return;
        }
        self.set_state(EngineState::Connecting);
        match self.connection.start(self.listener.clone()).await {
            ConnectOutcome::Connected => {
                self.analytics.record(&AnalyticsEvent::ConnectionEstablished);
                self.bootstrap().await;
            }
            ConnectOutcome::Failed(result) => {
                self.analytics
                    .record(&AnalyticsEvent::ConnectionFailed { code: result.code });
            }
            ConnectOutcome::AlreadyActive | ConnectOutcome::Closed => {}
        }
    }

    /// Purchases first, then the catalog.
    async fn bootstrap(&self) {
        let outcome = self.reconciler.reconcile(None).await;
        if self.is_closed() {
            debug!("engine released during bootstrap; discarding results");
            return;
        }
        self.publish(outcome);

        match self.catalog.fetch(&self.product_ids).await {
            Ok(products) if !self.is_closed() => {
                self.store.replace_catalog(products);
            }
            Ok(_) => return,
            Err(e) if e.response_code() == Some(ResponseCode::ServiceDisconnected) => {
                self.connection_lost();
            }
            Err(e) => debug!(error = %e, "keeping the previous catalog"),
        }

        self.connection.ensure_reconnect();
        if self.connection.state() == ConnectionState::Connected {
            self.set_state(EngineState::Ready);
            info!("reconciliation engine ready");
        } else {
            self.set_state(EngineState::Connecting);
        }
    }

    async fn sync(&self) -> SyncOutcome {
        if self.is_closed() {
            return SyncOutcome::Closed;
        }
        if self.connection.state() != ConnectionState::Connected {
            info!("sync requested while disconnected");
            self.connection.ensure_reconnect();
            return SyncOutcome::Unavailable;
        }

        let outcome = self.reconciler.reconcile(None).await;
        if self.is_closed() {
            return SyncOutcome::Closed;
        }
        let synced = self.publish(outcome);
        self.follow_connection();
        synced
    }

    /// Applies a reconciliation outcome to the store.
    fn publish(&self, outcome: ReconcileOutcome) -> SyncOutcome {
        match outcome {
            ReconcileOutcome::Unavailable => {
                self.connection.ensure_reconnect();
                SyncOutcome::Unavailable
            }
            ReconcileOutcome::Failed(result) => {
                if result.code.policy() == ResponsePolicy::Reconnect {
                    self.connection_lost();
                }
                SyncOutcome::Failed(result.code)
            }
            ReconcileOutcome::Reconciled { scope, purchases } => {
                if self.store.apply_purchases(scope, purchases) {
                    SyncOutcome::Published
                } else {
                    SyncOutcome::Unchanged
                }
            }
        }
    }

    async fn handle_event(&self, event: BillingEvent) {
        if self.is_closed() {
            return;
        }
        match event {
            BillingEvent::ServiceDisconnected => {
                if self.connection.on_disconnected() {
                    self.set_state(EngineState::Connecting);
                }
            }
            BillingEvent::PurchasesUpdated { result, purchases } => {
                self.handle_purchases_updated(result, purchases).await;
            }
        }
    }

    async fn handle_purchases_updated(
        &self,
        result: BillingResult,
        purchases: Option<Vec<RawPurchase>>,
    ) {
        match result.code.policy() {
            ResponsePolicy::Proceed => match purchases {
                Some(records) if !records.is_empty() => {
                    let outcome = self.reconciler.reconcile(Some(records)).await;
                    if self.is_closed() {
                        return;
                    }
                    self.publish(outcome);
                    self.follow_connection();
                }
                _ => debug!("purchase update carried no purchases"),
            },
            ResponsePolicy::Informational => match result.code {
                ResponseCode::UserCancelled => info!("user cancelled the purchase flow"),
                _ => info!(%result, "user already owns this item"),
            },
            ResponsePolicy::Fatal => {
                error!(%result, "purchase update rejected; check the integration")
            }
            ResponsePolicy::Reconnect => self.connection_lost(),
            ResponsePolicy::Failed => debug!(%result, "purchase update failed"),
        }
    }

    /// The service reported it is unreachable.
    fn connection_lost(&self) {
        if self.is_closed() {
            return;
        }
        self.connection.on_disconnected();
        self.connection.ensure_reconnect();
        self.set_state(EngineState::Connecting);
    }

    /// Drops back to `Connecting` if a call left the client unusable.
    fn follow_connection(&self) {
        self.connection.ensure_reconnect();
        if self.connection.state() != ConnectionState::Connected {
            self.set_state(EngineState::Connecting);
        }
    }
}
