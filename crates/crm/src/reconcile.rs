//! Line-item reconciliation: detach the quote's previous line items, create
//! the replacement set under the parent deal, and attach the new ids.
//!
//! The phase order is fixed. Detach archives the old quote edges first so a
//! re-run after a partial failure starts from a clean association set; create
//! and attach use different relation types than detach and are not its mirror
//! image. If attach fails after create succeeded, the new line items exist
//! unassociated; that window is accepted and surfaced, not rolled back.

use thiserror::Error;
use tracing::info;

use quotelink_core::{DealId, LineItemDraft, LineItemId, QuoteId};

use crate::associations;
use crate::gateway::{Gateway, GatewayError};
use crate::line_items;

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("failed to detach previous line items: {0}")]
    Detach(#[source] GatewayError),
    #[error("failed to create replacement line items: {0}")]
    Create(#[source] GatewayError),
    #[error("created {} line items but failed to attach them: {source}", .created.len())]
    Attach {
        created: Vec<LineItemId>,
        #[source]
        source: GatewayError,
    },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReconcileOutcome {
    pub removed: usize,
    pub added: Vec<LineItemId>,
}

#[derive(Clone)]
pub struct Reconciler {
    gateway: Gateway,
}

impl Reconciler {
    pub fn new(gateway: Gateway) -> Self {
        Self { gateway }
    }

    pub async fn reconcile(
        &self,
        quote_id: &QuoteId,
        deal_id: &DealId,
        old_line_item_ids: &[LineItemId],
        drafts: &[LineItemDraft],
    ) -> Result<ReconcileOutcome, ReconcileError> {
        associations::archive_quote_associations(&self.gateway, quote_id, old_line_item_ids)
            .await
            .map_err(ReconcileError::Detach)?;
        info!(
            event_name = "crm.reconcile.detached",
            quote_id = %quote_id.0,
            removed = old_line_item_ids.len(),
            "previous line items detached"
        );

        let added = line_items::create_line_items(&self.gateway, drafts)
            .await
            .map_err(ReconcileError::Create)?;

        associations::create_quote_associations(&self.gateway, quote_id, &added)
            .await
            .map_err(|source| ReconcileError::Attach { created: added.clone(), source })?;
        associations::create_deal_associations(&self.gateway, deal_id, &added)
            .await
            .map_err(|source| ReconcileError::Attach { created: added.clone(), source })?;
        info!(
            event_name = "crm.reconcile.attached",
            quote_id = %quote_id.0,
            deal_id = %deal_id.0,
            added = added.len(),
            "replacement line items created and attached"
        );

        Ok(ReconcileOutcome { removed: old_line_item_ids.len(), added })
    }
}
