//! Value types for billing entitlement reconciliation.
//!
//! This crate defines the plain, immutable types shared by the verification
//! and reconciliation layers:
//! - Product identifiers and product types
//! - The billing service's response-code taxonomy
//! - Service-native records (`RawProduct`, `RawPurchase`)
//! - Domain projections (`Product`, `Purchase`) and the published
//!   `EntitlementSnapshot`
//!
//! Nothing here talks to the billing service. Records are projected, never
//! mutated in place: a purchase that becomes acknowledged is replaced by a
//! new `Purchase` value.

mod ids;
mod product;
mod purchase;
mod response;
mod snapshot;

pub use ids::ProductId;
pub use product::{Product, ProductType, RawProduct};
pub use purchase::{Purchase, PurchaseState, RawPurchase};
pub use response::{BillingResult, ResponseCode, ResponsePolicy};
pub use snapshot::EntitlementSnapshot;

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while decoding service records.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid purchase record: {0}")]
    InvalidRecord(String),
}
