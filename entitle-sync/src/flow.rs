//! Launching the purchase UI.

use crate::analytics::{Analytics, AnalyticsEvent};
use crate::client::{BillingClient, PurchaseFlowParams, UiHost};
use crate::error::{EntitleError, EntitleResult};
use crate::store::EntitlementStore;
use entitle_types::ProductId;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Starts purchase flows for catalog products.
///
/// The purchase result is not returned here; it arrives later as a purchase
/// update from the service.
pub struct PurchaseFlowInitiator {
    client: Arc<dyn BillingClient>,
    store: Arc<EntitlementStore>,
    analytics: Arc<dyn Analytics>,
}

impl PurchaseFlowInitiator {
    pub fn new(
        client: Arc<dyn BillingClient>,
        store: Arc<EntitlementStore>,
        analytics: Arc<dyn Analytics>,
    ) -> Self {
        Self {
            client,
            store,
            analytics,
        }
    }

    /// Launches the purchase UI for `product_id` on `host`.
    ///
    /// # Errors
    ///
    /// - [`EntitleError::UnknownProduct`] if the product is not in the
    ///   synchronized catalog.
    /// - [`EntitleError::Billing`] if the service refuses the launch.
    pub async fn launch(&self, host: &UiHost, product_id: &ProductId) -> EntitleResult<()> {
        let snapshot = self.store.snapshot();
        let Some(product) = snapshot.product(product_id) else {
            warn!(%product_id, "cannot launch purchase flow: product not in catalog");
            return Err(EntitleError::UnknownProduct(product_id.clone()));
        };
        let params = PurchaseFlowParams {
            product: product.details().clone(),
        };

        let result = self.client.launch_purchase_flow(host, params).await;
        if !result.is_ok() {
            error!(%product_id, %result, "purchase flow launch failed");
            return Err(result.into());
        }

        info!(%product_id, "purchase flow launched");
        self.analytics.record(&AnalyticsEvent::PurchaseFlowLaunched {
            product_id: product_id.clone(),
        });
        Ok(())
    }
}
