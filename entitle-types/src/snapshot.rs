//! The published entitlement snapshot.

use crate::ids::ProductId;
use crate::product::Product;
use crate::purchase::Purchase;
use serde::Serialize;

/// Products and purchases published together.
///
/// Holds at most one purchase per product id. Replaced wholesale on every
/// update so readers never observe a half-updated pair.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EntitlementSnapshot {
    /// The synchronized catalog.
    pub products: Vec<Product>,
    /// Verified purchases.
    pub purchases: Vec<Purchase>,
}

impl EntitlementSnapshot {
    /// Creates a snapshot from its two lists.
    #[must_use]
    pub fn new(products: Vec<Product>, purchases: Vec<Purchase>) -> Self {
        Self {
            products,
            purchases,
        }
    }

    /// Looks up a catalog product.
    #[must_use]
    pub fn product(&self, id: &ProductId) -> Option<&Product> {
        self.products.iter().find(|p| &p.id == id)
    }

    /// Looks up the purchase granting `id`, preferring a purchase keyed on it.
    #[must_use]
    pub fn purchase(&self, id: &ProductId) -> Option<&Purchase> {
        self.purchases
            .iter()
            .find(|p| &p.id == id)
            .or_else(|| self.purchases.iter().find(|p| p.grants(id)))
    }

    /// Returns the product paired with its purchase, or `None` if the
    /// product is not in the catalog.
    #[must_use]
    pub fn get(&self, id: &ProductId) -> Option<(Product, Option<Purchase>)> {
        let product = self.product(id)?;
        Some((product.clone(), self.purchase(id).cloned()))
    }

    /// Returns true if the user is entitled to `id`.
    #[must_use]
    pub fn is_entitled(&self, id: &ProductId) -> bool {
        self.purchase(id).is_some_and(Purchase::is_entitling)
    }

    /// Returns true if neither list has entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.products.is_empty() && self.purchases.is_empty()
    }
}
