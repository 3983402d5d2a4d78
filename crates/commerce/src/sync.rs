//! Draft-order synchronization: translate reconciled CRM line items into the
//! commerce system's shape and overwrite the draft order in one call.

use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use quotelink_core::{DraftOrderId, LineItem, OrderLine, Sku};

use crate::client::{CommerceApi, CommerceError};

#[derive(Debug, Error)]
pub enum OrderSyncError {
    #[error("variant lookup failed: {0}")]
    Lookup(#[source] CommerceError),
    #[error("no commerce variant found for sku `{0}`")]
    UnknownSku(String),
    #[error("draft order update failed: {0}")]
    Update(#[source] CommerceError),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OrderSyncResult {
    pub draft_order_id: DraftOrderId,
    pub line_count: usize,
}

#[derive(Clone)]
pub struct OrderSynchronizer {
    api: Arc<dyn CommerceApi>,
}

impl OrderSynchronizer {
    pub fn new(api: Arc<dyn CommerceApi>) -> Self {
        Self { api }
    }

    /// Looks up the foreign variant for every line item's SKU, then replaces
    /// the draft order's full line list. Partial updates are not supported; a
    /// failed update leaves the order in its prior state.
    pub async fn sync_order(
        &self,
        draft_order_id: &DraftOrderId,
        items: &[LineItem],
    ) -> Result<OrderSyncResult, OrderSyncError> {
        let mut skus: Vec<Sku> = Vec::new();
        for item in items {
            if !skus.contains(&item.sku) {
                skus.push(item.sku.clone());
            }
        }

        let variants = self.api.lookup_variants(&skus).await.map_err(OrderSyncError::Lookup)?;

        let lines = items
            .iter()
            .map(|item| {
                let variant_id = variants
                    .get(&item.sku)
                    .cloned()
                    .ok_or_else(|| OrderSyncError::UnknownSku(item.sku.0.clone()))?;
                Ok(OrderLine {
                    variant_id,
                    quantity: item.quantity,
                    discount_percent: item.discount_percent,
                })
            })
            .collect::<Result<Vec<_>, OrderSyncError>>()?;

        self.api
            .put_draft_order(draft_order_id, &lines)
            .await
            .map_err(OrderSyncError::Update)?;

        info!(
            event_name = "commerce.draft_order.synced",
            draft_order_id = %draft_order_id.0,
            line_count = lines.len(),
            "draft order line items overwritten"
        );

        Ok(OrderSyncResult { draft_order_id: draft_order_id.clone(), line_count: lines.len() })
    }
}
