//! The published entitlement state.

use crate::reconcile::ReconcileScope;
use entitle_types::{EntitlementSnapshot, Product, ProductId, Purchase};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Holds the current [`EntitlementSnapshot`] and notifies observers when it
/// changes.
///
/// Writers replace the whole snapshot, so a reader holding an `Arc` always
/// sees products and purchases from the same moment. Subscribers are told
/// only about real changes.
#[derive(Debug)]
pub struct EntitlementStore {
    tx: watch::Sender<Arc<EntitlementSnapshot>>,
}

impl Default for EntitlementStore {
    fn default() -> Self {
        Self::new()
    }
}

impl EntitlementStore {
    /// Creates a store holding an empty snapshot.
    pub fn new() -> Self {
        let (tx, _) = watch::channel(Arc::new(EntitlementSnapshot::default()));
        Self { tx }
    }

    /// The current snapshot.
    pub fn snapshot(&self) -> Arc<EntitlementSnapshot> {
        Arc::clone(&self.tx.borrow())
    }

    /// Watches the snapshot. The receiver starts with the current value
    /// marked as seen.
    pub fn subscribe(&self) -> watch::Receiver<Arc<EntitlementSnapshot>> {
        self.tx.subscribe()
    }

    pub fn products(&self) -> Vec<Product> {
        self.snapshot().products.clone()
    }

    pub fn purchases(&self) -> Vec<Purchase> {
        self.snapshot().purchases.clone()
    }

    /// The catalog product paired with its purchase, if any.
    pub fn get(&self, id: &ProductId) -> Option<(Product, Option<Purchase>)> {
        self.snapshot().get(id)
    }

    /// Replaces the catalog. An empty list is refused.
    ///
    /// Returns true if the published snapshot changed.
    pub fn replace_catalog(&self, products: Vec<Product>) -> bool {
        if products.is_empty() {
            warn!("refusing to replace the catalog with an empty list");
            return false;
        }
        let changed = self.tx.send_if_modified(|current| {
            if current.products == products {
                return false;
            }
            *current = Arc::new(EntitlementSnapshot::new(products, current.purchases.clone()));
            true
        });
        if changed {
            debug!("catalog published");
        }
        changed
    }

    /// Applies the purchases of a reconciliation pass.
    ///
    /// A [`ReconcileScope::Full`] pass replaces the list, revoking any
    /// purchase it does not contain, except that an empty full pass never
    /// clears a non-empty list. A [`ReconcileScope::Partial`] pass merges by
    /// product id, the incoming purchase winning.
    ///
    /// Returns true if the published snapshot changed.
    pub fn apply_purchases(&self, scope: ReconcileScope, purchases: Vec<Purchase>) -> bool {
        let changed = self.tx.send_if_modified(|current| {
            let next = match scope {
                ReconcileScope::Full => {
                    if purchases.is_empty() && !current.purchases.is_empty() {
                        warn!(
                            held = current.purchases.len(),
                            "full pass returned no purchases; keeping the previous list"
                        );
                        return false;
                    }
                    let next = dedup_last_wins(current.purchases.len(), purchases);
                    for revoked in current
                        .purchases
                        .iter()
                        .filter(|old| !next.iter().any(|p| p.id == old.id))
                    {
                        info!(product_id = %revoked.id, "purchase no longer reported; revoked");
                    }
                    next
                }
                ReconcileScope::Partial => {
                    let mut merged = current.purchases.clone();
                    for purchase in purchases {
                        upsert(&mut merged, purchase);
                    }
                    merged
                }
            };
            if next == current.purchases {
                return false;
            }
            *current = Arc::new(EntitlementSnapshot::new(current.products.clone(), next));
            true
        });
        if changed {
            debug!(?scope, "purchases published");
        }
        changed
    }
}

fn upsert(list: &mut Vec<Purchase>, purchase: Purchase) {
    match list.iter_mut().find(|p| p.id == purchase.id) {
        Some(slot) => *slot = purchase,
        None => list.push(purchase),
    }
}

fn dedup_last_wins(capacity: usize, purchases: Vec<Purchase>) -> Vec<Purchase> {
    let mut out = Vec::with_capacity(capacity.max(purchases.len()));
    for purchase in purchases {
        upsert(&mut out, purchase);
    }
    out
}
