//! Analytics capability.
//!
//! The host application chooses an implementation at construction time; the
//! engine only ever talks to the trait.

use entitle_types::{ProductId, ResponseCode};
use tracing::debug;

/// Notable engine events worth reporting to an analytics backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnalyticsEvent {
    ConnectionEstablished,
    ConnectionFailed { code: ResponseCode },
    CatalogLoaded { count: usize },
    PurchaseAcknowledged { product_id: ProductId },
    AcknowledgeFailed { product_id: ProductId, code: ResponseCode },
    VerificationFailed { product_id: ProductId },
    PurchaseFlowLaunched { product_id: ProductId },
}

/// Sink for [`AnalyticsEvent`]s. Must not block.
pub trait Analytics: Send + Sync {
    fn record(&self, event: &AnalyticsEvent);
}

/// Writes events to the `tracing` log at debug level. The default.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogAnalytics;

impl Analytics for LogAnalytics {
    fn record(&self, event: &AnalyticsEvent) {
        debug!(?event, "analytics");
    }
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopAnalytics;

impl Analytics for NoopAnalytics {
    fn record(&self, _event: &AnalyticsEvent) {}
}
