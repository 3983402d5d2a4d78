//! CRM integration: the rate-governed gateway every outbound call funnels
//! through, plus the batch, association, line-item and quote endpoints built on
//! top of it.

pub mod associations;
pub mod batch;
pub mod gateway;
pub mod line_items;
pub mod quotes;
pub mod reconcile;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use batch::{BatchOutcome, ChunkFailure};
pub use gateway::{Gateway, GatewayError, RateSnapshot};
pub use line_items::LineItemReadError;
pub use quotes::QuoteLinks;
pub use reconcile::{ReconcileError, ReconcileOutcome, Reconciler};
pub use transport::{ApiRequest, ApiResponse, CrmTransport, HttpTransport, RateQuota, TransportError};
