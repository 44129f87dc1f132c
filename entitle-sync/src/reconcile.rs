//! Purchase reconciliation.
//!
//! One pass turns the service's raw purchase records into the verified
//! [`Purchase`] list the store publishes:
//!
//! 1. records not in the `Purchased` state are skipped (pending purchases
//!    grant nothing until the service settles them);
//! 2. every remaining record must carry a valid signature, otherwise it is
//!    dropped and reported;
//! 3. unacknowledged records are acknowledged, at most once per token per
//!    session; a failed acknowledgment keeps the record unacknowledged so
//!    the next pass retries it;
//! 4. the result holds at most one purchase per product id (last wins).

use crate::analytics::{Analytics, AnalyticsEvent};
use crate::client::BillingClient;
use entitle_types::{BillingResult, ProductType, Purchase, PurchaseState, RawPurchase};
use entitle_verify::VerificationService;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Where the records of a pass came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReconcileScope {
    /// A full query of the user's purchases. Authoritative.
    Full,
    /// Records pushed by the service after a purchase flow.
    Partial,
}

/// Result of one reconciliation pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The service was not connected; nothing was queried.
    Unavailable,
    /// The purchase query failed.
    Failed(BillingResult),
    /// The pass completed.
    Reconciled {
        scope: ReconcileScope,
        purchases: Vec<Purchase>,
    },
}

impl ReconcileOutcome {
    /// Purchases produced by the pass; empty unless reconciled.
    #[must_use]
    pub fn purchases(&self) -> &[Purchase] {
        match self {
            Self::Reconciled { purchases, .. } => purchases,
            _ => &[],
        }
    }

    #[must_use]
    pub fn is_reconciled(&self) -> bool {
        matches!(self, Self::Reconciled { .. })
    }
}

/// Verifies and acknowledges purchases.
///
/// Passes must not overlap; the engine runs them one at a time.
pub struct PurchaseReconciler {
    client: Arc<dyn BillingClient>,
    verifier: VerificationService,
    product_type: ProductType,
    analytics: Arc<dyn Analytics>,
    acknowledged: Mutex<HashSet<String>>,
}

impl PurchaseReconciler {
    pub fn new(
        client: Arc<dyn BillingClient>,
        verifier: VerificationService,
        product_type: ProductType,
        analytics: Arc<dyn Analytics>,
    ) -> Self {
        Self {
            client,
            verifier,
            product_type,
            analytics,
            acknowledged: Mutex::new(HashSet::new()),
        }
    }

    /// Runs one pass.
    ///
    /// With `None`, queries the service for every current purchase
    /// ([`ReconcileScope::Full`]). With `Some`, processes the given pushed
    /// records ([`ReconcileScope::Partial`]).
    pub async fn reconcile(&self, records: Option<Vec<RawPurchase>>) -> ReconcileOutcome {
        let scope = if records.is_some() {
            ReconcileScope::Partial
        } else {
            ReconcileScope::Full
        };
        let span = info_span!("reconcile", pass_id = %Uuid::now_v7(), ?scope);
        self.run_pass(scope, records).instrument(span).await
    }

    async fn run_pass(
        &self,
        scope: ReconcileScope,
        records: Option<Vec<RawPurchase>>,
    ) -> ReconcileOutcome {
        if !self.client.is_ready() {
            error!("billing service not ready; reconciliation skipped");
            return ReconcileOutcome::Unavailable;
        }

        let records = match records {
            Some(records) => records,
            None => {
                let (result, records) = self.client.query_purchases(self.product_type).await;
                if !result.is_ok() {
                    warn!(%result, "purchase query failed");
                    return ReconcileOutcome::Failed(result);
                }
                records
            }
        };

        let mut purchases: Vec<Purchase> = Vec::with_capacity(records.len());
        for record in &records {
            let Some(purchase) = self.process(record).await else {
                continue;
            };
            match purchases.iter_mut().find(|p| p.id == purchase.id) {
                Some(slot) => *slot = purchase,
                None => purchases.push(purchase),
            }
        }

        debug!(
            received = records.len(),
            kept = purchases.len(),
            "reconciliation pass complete"
        );
        ReconcileOutcome::Reconciled { scope, purchases }
    }

    async fn process(&self, record: &RawPurchase) -> Option<Purchase> {
        let product_id = record.primary_product();

        if record.state() != PurchaseState::Purchased {
            debug!(%product_id, state = ?record.state(), "skipping purchase not yet settled");
            return None;
        }

        if let Err(e) = self.verifier.verify_purchase(record) {
            error!(%product_id, error = %e, "purchase failed signature verification; dropped");
            self.analytics.record(&AnalyticsEvent::VerificationFailed {
                product_id: product_id.clone(),
            });
            return None;
        }

        if record.is_acknowledged() {
            return Some(Purchase::from_raw(record, true));
        }

        if self.was_acknowledged(record.token()) {
            debug!(%product_id, "purchase already acknowledged this session");
            return Some(Purchase::from_raw(record, true));
        }

        let result = self.client.acknowledge_purchase(record.token()).await;
        if result.is_ok() {
            self.remember(record.token());
            info!(%product_id, "purchase acknowledged");
            self.analytics.record(&AnalyticsEvent::PurchaseAcknowledged {
                product_id: product_id.clone(),
            });
            Some(Purchase::from_raw(record, true))
        } else {
            error!(%product_id, %result, "acknowledge failed; retrying on the next pass");
            self.analytics.record(&AnalyticsEvent::AcknowledgeFailed {
                product_id: product_id.clone(),
                code: result.code,
            });
            Some(Purchase::from_raw(record, false))
        }
    }

    fn was_acknowledged(&self, token: &str) -> bool {
        self.acknowledged
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(token)
    }

    fn remember(&self, token: &str) {
        self.acknowledged
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(token.to_string());
    }
}
