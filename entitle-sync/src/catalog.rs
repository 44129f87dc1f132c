//! Product catalog synchronization.

use crate::analytics::{Analytics, AnalyticsEvent};
use crate::client::BillingClient;
use crate::error::{EntitleError, EntitleResult};
use entitle_types::{Product, ProductId, ProductType, ResponsePolicy};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Fetches product details from the billing service.
///
/// Never touches the store itself; an `Err` means the caller keeps the
/// catalog it already has.
pub struct CatalogSynchronizer {
    client: Arc<dyn BillingClient>,
    product_type: ProductType,
    analytics: Arc<dyn Analytics>,
}

impl CatalogSynchronizer {
    pub fn new(
        client: Arc<dyn BillingClient>,
        product_type: ProductType,
        analytics: Arc<dyn Analytics>,
    ) -> Self {
        Self {
            client,
            product_type,
            analytics,
        }
    }

    /// Queries details for `product_ids`.
    ///
    /// # Errors
    ///
    /// - [`EntitleError::Config`] if `product_ids` is empty.
    /// - [`EntitleError::Billing`] if the service rejects the query.
    /// - [`EntitleError::EmptyCatalog`] if the service returns no products.
    pub async fn fetch(&self, product_ids: &[ProductId]) -> EntitleResult<Vec<Product>> {
        if product_ids.is_empty() {
            return Err(EntitleError::Config("no product ids to query".to_string()));
        }

        let (result, details) = self
            .client
            .query_product_details(product_ids, self.product_type)
            .await;

        if !result.is_ok() {
            match result.code.policy() {
                ResponsePolicy::Fatal => {
                    error!(%result, "product query rejected; check the catalog configuration")
                }
                _ => warn!(%result, "product query failed"),
            }
            return Err(result.into());
        }

        if details.is_empty() {
            error!(
                requested = product_ids.len(),
                "found empty product details; check the catalog configuration"
            );
            return Err(EntitleError::EmptyCatalog);
        }

        let products: Vec<Product> = details.into_iter().map(Product::from).collect();

        let missing: Vec<&ProductId> = product_ids
            .iter()
            .filter(|id| !products.iter().any(|p| &p.id == *id))
            .collect();
        if !missing.is_empty() {
            debug!(?missing, "service returned no details for some products");
        }

        info!(count = products.len(), "product catalog loaded");
        self.analytics.record(&AnalyticsEvent::CatalogLoaded {
            count: products.len(),
        });
        Ok(products)
    }
}
