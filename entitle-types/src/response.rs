//! Billing service response codes and the policy attached to each.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Response code reported by the billing service for every call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseCode {
    /// The request reached its timeout before the service answered.
    ServiceTimeout,
    /// The requested feature is not supported on this device.
    FeatureNotSupported,
    /// The app is not connected to the service.
    ServiceDisconnected,
    /// Success.
    Ok,
    /// The user dismissed the purchase UI.
    UserCancelled,
    /// The service is temporarily unavailable.
    ServiceUnavailable,
    /// Billing is unavailable for this user or device.
    BillingUnavailable,
    /// The requested product is not available for purchase.
    ItemUnavailable,
    /// Invalid arguments or misconfiguration on the developer side.
    DeveloperError,
    /// Fatal error during the call.
    Error,
    /// The user already owns the item.
    ItemAlreadyOwned,
    /// The user does not own the item.
    ItemNotOwned,
    /// A network error occurred.
    NetworkError,
}

/// How a response code is handled by the reconciliation engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResponsePolicy {
    /// Continue with the operation.
    Proceed,
    /// Log and stop; nothing to retry.
    Informational,
    /// Misconfiguration: log loudly, never retry automatically.
    Fatal,
    /// The connection is gone: apply the reconnect policy.
    Reconnect,
    /// Log and treat the call as failed, no state mutation.
    Failed,
}

impl ResponseCode {
    /// Maps the service's numeric code. Unknown codes map to [`ResponseCode::Error`].
    #[must_use]
    pub fn from_code(code: i32) -> Self {
        match code {
            -3 => Self::ServiceTimeout,
            -2 => Self::FeatureNotSupported,
            -1 => Self::ServiceDisconnected,
            0 => Self::Ok,
            1 => Self::UserCancelled,
            2 => Self::ServiceUnavailable,
            3 => Self::BillingUnavailable,
            4 => Self::ItemUnavailable,
            5 => Self::DeveloperError,
            7 => Self::ItemAlreadyOwned,
            8 => Self::ItemNotOwned,
            12 => Self::NetworkError,
            _ => Self::Error,
        }
    }

    /// Returns the service's numeric code.
    #[must_use]
    pub fn code(&self) -> i32 {
        match self {
            Self::ServiceTimeout => -3,
            Self::FeatureNotSupported => -2,
            Self::ServiceDisconnected => -1,
            Self::Ok => 0,
            Self::UserCancelled => 1,
            Self::ServiceUnavailable => 2,
            Self::BillingUnavailable => 3,
            Self::ItemUnavailable => 4,
            Self::DeveloperError => 5,
            Self::Error => 6,
            Self::ItemAlreadyOwned => 7,
            Self::ItemNotOwned => 8,
            Self::NetworkError => 12,
        }
    }

    /// Returns true for [`ResponseCode::Ok`].
    #[must_use]
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok)
    }

    /// Returns the handling policy for this code.
    #[must_use]
    pub fn policy(&self) -> ResponsePolicy {
        match self {
            Self::Ok => ResponsePolicy::Proceed,
            Self::UserCancelled | Self::ItemAlreadyOwned => ResponsePolicy::Informational,
            Self::DeveloperError => ResponsePolicy::Fatal,
            Self::ServiceDisconnected => ResponsePolicy::Reconnect,
            _ => ResponsePolicy::Failed,
        }
    }
}

impl fmt::Display for ResponseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}({})", self.code())
    }
}

/// Outcome of a single billing service call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingResult {
    /// The response code.
    pub code: ResponseCode,
    /// Diagnostic message from the service, possibly empty.
    pub debug_message: String,
}

impl BillingResult {
    /// Creates a result with a diagnostic message.
    pub fn new(code: ResponseCode, debug_message: impl Into<String>) -> Self {
        Self {
            code,
            debug_message: debug_message.into(),
        }
    }

    /// A successful result.
    #[must_use]
    pub fn ok() -> Self {
        Self::new(ResponseCode::Ok, "")
    }

    /// Returns true if the call succeeded.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.code.is_ok()
    }
}

impl From<ResponseCode> for BillingResult {
    fn from(code: ResponseCode) -> Self {
        Self::new(code, "")
    }
}

impl fmt::Display for BillingResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.debug_message.is_empty() {
            write!(f, "{}", self.code)
        } else {
            write!(f, "{} ({})", self.code, self.debug_message)
        }
    }
}
