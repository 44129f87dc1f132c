//! Purchase records.
//!
//! A [`RawPurchase`] is what the billing service hands us: a signed JSON
//! payload plus its signature. Every projected field is decoded from the
//! signed payload itself, so verifying the signature vouches for all of them.
//!
//! A [`Purchase`] is the domain projection published to the application.

use crate::ids::ProductId;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// State of a purchase as reported by the billing service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PurchaseState {
    /// Payment has not completed yet (e.g. cash payment pending).
    Pending,
    /// Payment completed.
    Purchased,
    /// Cancelled or unspecified.
    Cancelled,
}

impl PurchaseState {
    /// Maps the service's numeric `purchaseState`.
    #[must_use]
    pub fn from_code(code: i32) -> Self {
        match code {
            1 => Self::Purchased,
            2 => Self::Pending,
            _ => Self::Cancelled,
        }
    }

    /// Returns the service's numeric code.
    #[must_use]
    pub fn code(&self) -> i32 {
        match self {
            Self::Cancelled => 0,
            Self::Purchased => 1,
            Self::Pending => 2,
        }
    }
}

/// Wire layout of the signed purchase payload.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignedPayload {
    order_id: Option<String>,
    #[serde(default)]
    product_ids: Vec<String>,
    product_id: Option<String>,
    purchase_time: i64,
    #[serde(default)]
    purchase_state: i32,
    purchase_token: Option<String>,
    token: Option<String>,
    quantity: Option<u32>,
    #[serde(default)]
    acknowledged: bool,
}

/// A purchase record exactly as delivered by the billing service.
#[derive(Clone, PartialEq, Eq)]
pub struct RawPurchase {
    original_json: String,
    signature: String,
    order_id: Option<String>,
    product_ids: Vec<ProductId>,
    purchase_time: DateTime<Utc>,
    state: PurchaseState,
    token: String,
    quantity: u32,
    acknowledged: bool,
}

impl RawPurchase {
    /// Decodes a purchase from its signed JSON payload.
    ///
    /// The signature is kept verbatim; it is not checked here.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload is not valid JSON or lacks a product
    /// id, a purchase token, or a representable purchase time.
    pub fn new(original_json: impl Into<String>, signature: impl Into<String>) -> Result<Self> {
        let original_json = original_json.into();
        let payload: SignedPayload = serde_json::from_str(&original_json)?;

        let mut product_ids: Vec<ProductId> =
            payload.product_ids.into_iter().map(ProductId::from).collect();
        if product_ids.is_empty() {
            if let Some(id) = payload.product_id {
                product_ids.push(ProductId::from(id));
            }
        }
        if product_ids.is_empty() || product_ids.iter().any(ProductId::is_empty) {
            return Err(Error::InvalidRecord("missing product id".to_string()));
        }

        let token = payload
            .token
            .or(payload.purchase_token)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| Error::InvalidRecord("missing purchase token".to_string()))?;

        let purchase_time = DateTime::<Utc>::from_timestamp_millis(payload.purchase_time)
            .ok_or_else(|| {
                Error::InvalidRecord(format!("purchase time out of range: {}", payload.purchase_time))
            })?;

        let quantity = payload.quantity.unwrap_or(1);
        if quantity == 0 {
            return Err(Error::InvalidRecord("quantity must be at least 1".to_string()));
        }

        Ok(Self {
            original_json,
            signature: signature.into(),
            order_id: payload.order_id,
            product_ids,
            purchase_time,
            state: PurchaseState::from_code(payload.purchase_state),
            token,
            quantity,
            acknowledged: payload.acknowledged,
        })
    }

    /// The signed JSON payload.
    #[must_use]
    pub fn original_json(&self) -> &str {
        &self.original_json
    }

    /// Base64 signature over [`Self::original_json`].
    #[must_use]
    pub fn signature(&self) -> &str {
        &self.signature
    }

    /// Order identifier, absent for test purchases.
    #[must_use]
    pub fn order_id(&self) -> Option<&str> {
        self.order_id.as_deref()
    }

    /// All products granted by this transaction (never empty).
    #[must_use]
    pub fn product_ids(&self) -> &[ProductId] {
        &self.product_ids
    }

    /// The first product granted by this transaction.
    #[must_use]
    pub fn primary_product(&self) -> &ProductId {
        &self.product_ids[0]
    }

    /// When the purchase was made.
    #[must_use]
    pub fn purchase_time(&self) -> DateTime<Utc> {
        self.purchase_time
    }

    /// Purchase state.
    #[must_use]
    pub fn state(&self) -> PurchaseState {
        self.state
    }

    /// Opaque purchase token used for acknowledgment.
    #[must_use]
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Quantity purchased (at least 1).
    #[must_use]
    pub fn quantity(&self) -> u32 {
        self.quantity
    }

    /// Whether the service already recorded an acknowledgment.
    #[must_use]
    pub fn is_acknowledged(&self) -> bool {
        self.acknowledged
    }
}

impl fmt::Debug for RawPurchase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawPurchase")
            .field("order_id", &self.order_id)
            .field("product_ids", &self.product_ids)
            .field("purchase_time", &self.purchase_time)
            .field("state", &self.state)
            .field("quantity", &self.quantity)
            .field("acknowledged", &self.acknowledged)
            .finish_non_exhaustive()
    }
}

/// A purchase as published to the application.
///
/// Grants access only when [`Purchase::is_entitling`] holds. The token and
/// signature are kept for acknowledgment bookkeeping; they are never
/// serialized and never printed.
#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct Purchase {
    /// Product this purchase grants (first product of the transaction).
    pub id: ProductId,
    /// Every product in the transaction.
    pub product_ids: Vec<ProductId>,
    /// Quantity purchased.
    pub quantity: u32,
    /// When the purchase was made.
    pub purchase_time: DateTime<Utc>,
    /// Purchase state.
    pub state: PurchaseState,
    /// Whether the purchase has been acknowledged.
    pub acknowledged: bool,
    #[serde(skip)]
    token: String,
    #[serde(skip)]
    signature: String,
}

impl Purchase {
    /// Projects a raw record with the given acknowledgment status.
    #[must_use]
    pub fn from_raw(raw: &RawPurchase, acknowledged: bool) -> Self {
        Self {
            id: raw.primary_product().clone(),
            product_ids: raw.product_ids.clone(),
            quantity: raw.quantity,
            purchase_time: raw.purchase_time,
            state: raw.state,
            acknowledged,
            token: raw.token.clone(),
            signature: raw.signature.clone(),
        }
    }

    /// True iff the purchase is `Purchased` and acknowledged.
    #[must_use]
    pub fn is_entitling(&self) -> bool {
        self.state == PurchaseState::Purchased && self.acknowledged
    }

    /// Returns true if this transaction grants `product_id`.
    #[must_use]
    pub fn grants(&self, product_id: &ProductId) -> bool {
        self.product_ids.contains(product_id)
    }

    /// Opaque purchase token.
    #[must_use]
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Signature of the originating record.
    #[must_use]
    pub fn signature(&self) -> &str {
        &self.signature
    }
}

impl fmt::Debug for Purchase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Purchase")
            .field("id", &self.id)
            .field("product_ids", &self.product_ids)
            .field("quantity", &self.quantity)
            .field("purchase_time", &self.purchase_time)
            .field("state", &self.state)
            .field("acknowledged", &self.acknowledged)
            .finish_non_exhaustive()
    }
}
