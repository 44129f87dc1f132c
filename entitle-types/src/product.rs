//! Catalog products.

use crate::ids::ProductId;
use serde::{Deserialize, Serialize};

/// Product type filter understood by the billing service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProductType {
    /// One-time (non-subscription) products.
    #[default]
    InApp,
    /// Subscriptions.
    Subs,
}

impl ProductType {
    /// Returns the service's wire name for this type.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InApp => "inapp",
            Self::Subs => "subs",
        }
    }
}

/// Product details as returned by the billing service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawProduct {
    /// Catalog identifier.
    pub product_id: ProductId,
    /// The type this product was queried as.
    pub product_type: ProductType,
    /// Title shown in the purchase UI (may include the app name).
    pub title: String,
    /// Short product name.
    pub name: String,
    /// Description.
    pub description: String,
    /// Localized price string (e.g. `"$2.99"`).
    pub formatted_price: Option<String>,
    /// Price in micro-units of the currency.
    pub price_amount_micros: Option<i64>,
    /// ISO 4217 currency code.
    pub price_currency_code: Option<String>,
}

impl RawProduct {
    /// Creates a one-time product with the given title and no price.
    pub fn new(product_id: impl Into<ProductId>, title: impl Into<String>) -> Self {
        let title = title.into();
        Self {
            product_id: product_id.into(),
            product_type: ProductType::InApp,
            name: title.clone(),
            title,
            description: String::new(),
            formatted_price: None,
            price_amount_micros: None,
            price_currency_code: None,
        }
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Sets the localized price.
    #[must_use]
    pub fn with_price(mut self, formatted: impl Into<String>, micros: i64, currency: &str) -> Self {
        self.formatted_price = Some(formatted.into());
        self.price_amount_micros = Some(micros);
        self.price_currency_code = Some(currency.to_string());
        self
    }
}

/// A catalog product as seen by the rest of the application.
///
/// Created wholesale from the service's details; never mutated locally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Product {
    /// Catalog identifier.
    pub id: ProductId,
    /// Display title.
    pub title: String,
    /// Display description.
    pub description: String,
    /// Localized price string, if the service reported one.
    pub formatted_price: Option<String>,
    #[serde(skip_serializing)]
    details: RawProduct,
}

impl Product {
    /// Service-native details, used to build purchase-flow parameters.
    #[must_use]
    pub fn details(&self) -> &RawProduct {
        &self.details
    }
}

impl From<RawProduct> for Product {
    fn from(details: RawProduct) -> Self {
        Self {
            id: details.product_id.clone(),
            title: details.title.clone(),
            description: details.description.clone(),
            formatted_price: details.formatted_price.clone(),
            details,
        }
    }
}
