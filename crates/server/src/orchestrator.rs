//! Quote synchronization workflow.
//!
//! One run walks a fixed sequence: reset the quote to DRAFT, replace its line
//! items in the CRM, read the new items back, overwrite the commerce draft
//! order, then advance the quote through APPROVAL to APPROVED. Progress events
//! stream to the caller throughout; the first failing step stops the run and
//! emits a terminal error without reverting anything already done. Recovery is
//! a caller-driven re-run, which the reconciler keeps safe to repeat.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use uuid::Uuid;

use quotelink_commerce::{OrderSyncError, OrderSyncResult, OrderSynchronizer};
use quotelink_core::events::{ProgressEvent, ProgressTracker};
use quotelink_core::{
    DealId, DomainError, DraftOrderId, LineItem, LineItemDraft, LineItemId, Quote, QuoteId,
    QuoteStatus,
};
use quotelink_crm::{
    line_items, quotes, Gateway, GatewayError, LineItemReadError, QuoteLinks, ReconcileError,
    ReconcileOutcome, Reconciler,
};

/// Quote status and link reads/writes against the CRM.
#[async_trait]
pub trait QuoteApi: Send + Sync {
    async fn set_status(&self, quote_id: &QuoteId, status: QuoteStatus) -> Result<(), GatewayError>;

    async fn links(&self, quote_id: &QuoteId) -> Result<QuoteLinks, GatewayError>;
}

/// Line-item replacement and read-back against the CRM.
#[async_trait]
pub trait LineItemSync: Send + Sync {
    async fn reconcile(
        &self,
        quote_id: &QuoteId,
        deal_id: &DealId,
        old_line_item_ids: &[LineItemId],
        drafts: &[LineItemDraft],
    ) -> Result<ReconcileOutcome, ReconcileError>;

    async fn read_back(&self, ids: &[LineItemId]) -> Result<Vec<LineItem>, LineItemReadError>;
}

/// Draft-order overwrite against the commerce system.
#[async_trait]
pub trait OrderSync: Send + Sync {
    async fn sync_order(
        &self,
        draft_order_id: &DraftOrderId,
        items: &[LineItem],
    ) -> Result<OrderSyncResult, OrderSyncError>;
}

#[derive(Clone, Debug)]
pub struct SyncRequest {
    pub quote_id: QuoteId,
    pub deal_id: DealId,
    pub draft_order_id: DraftOrderId,
    pub old_line_item_ids: Vec<LineItemId>,
    pub line_items: Vec<LineItemDraft>,
}

#[derive(Debug, Error)]
enum SyncRunError {
    #[error("synchronization cancelled by caller")]
    Cancelled,
    #[error("quote status sequence violated: {0}")]
    Transition(#[from] DomainError),
    #[error("failed to update quote status: {0}")]
    Status(#[source] GatewayError),
    #[error(transparent)]
    Reconcile(#[from] ReconcileError),
    #[error("failed to read back created line items: {0}")]
    ReadBack(#[from] LineItemReadError),
    #[error(transparent)]
    Order(#[from] OrderSyncError),
    #[error("failed to read quote links: {0}")]
    Links(#[source] GatewayError),
}

pub struct QuoteSyncOrchestrator {
    quotes: Arc<dyn QuoteApi>,
    line_items: Arc<dyn LineItemSync>,
    orders: Arc<dyn OrderSync>,
}

impl QuoteSyncOrchestrator {
    pub fn new(
        quotes: Arc<dyn QuoteApi>,
        line_items: Arc<dyn LineItemSync>,
        orders: Arc<dyn OrderSync>,
    ) -> Self {
        Self { quotes, line_items, orders }
    }

    /// Runs one synchronization to completion, streaming progress into
    /// `events`. The channel always ends with exactly one terminal event.
    pub async fn run(
        &self,
        request: SyncRequest,
        events: mpsc::Sender<ProgressEvent>,
        cancel: CancellationToken,
    ) {
        let correlation_id = Uuid::new_v4().to_string();
        let mut reporter = ProgressReporter::new(events);
        info!(
            event_name = "sync.run.started",
            quote_id = %request.quote_id.0,
            correlation_id = %correlation_id,
            line_items = request.line_items.len(),
            "quote synchronization started"
        );

        match self.execute(&request, &mut reporter, &cancel).await {
            Ok(links) => {
                info!(
                    event_name = "sync.run.completed",
                    quote_id = %request.quote_id.0,
                    correlation_id = %correlation_id,
                    "quote synchronization completed"
                );
                reporter.complete(links, correlation_id).await;
            }
            Err(run_error) => {
                error!(
                    event_name = "sync.run.failed",
                    quote_id = %request.quote_id.0,
                    correlation_id = %correlation_id,
                    error = %run_error,
                    "quote synchronization failed"
                );
                reporter.error(run_error.to_string()).await;
            }
        }
    }

    async fn execute(
        &self,
        request: &SyncRequest,
        reporter: &mut ProgressReporter,
        cancel: &CancellationToken,
    ) -> Result<QuoteLinks, SyncRunError> {
        let mut quote = Quote {
            id: request.quote_id.clone(),
            status: QuoteStatus::Draft,
            amount: request.line_items.iter().map(LineItemDraft::extended_amount).sum(),
            view_url: None,
            pdf_url: None,
        };

        ensure_active(cancel)?;
        reporter.progress("resetting quote status", 5).await;
        self.push_status(&mut quote, QuoteStatus::Draft).await?;

        ensure_active(cancel)?;
        reporter.progress("replacing quote line items", 20).await;
        let outcome = self
            .line_items
            .reconcile(
                &request.quote_id,
                &request.deal_id,
                &request.old_line_item_ids,
                &request.line_items,
            )
            .await?;
        info!(
            event_name = "sync.run.reconciled",
            quote_id = %request.quote_id.0,
            quote_amount = %quote.amount,
            removed = outcome.removed,
            added = outcome.added.len(),
            "quote line items replaced"
        );

        ensure_active(cancel)?;
        reporter.progress("reading back created line items", 50).await;
        let items = self.line_items.read_back(&outcome.added).await?;

        ensure_active(cancel)?;
        reporter.progress("updating commerce draft order", 65).await;
        let order = self.orders.sync_order(&request.draft_order_id, &items).await?;
        info!(
            event_name = "sync.run.order_synced",
            quote_id = %request.quote_id.0,
            draft_order_id = %order.draft_order_id.0,
            line_count = order.line_count,
            "commerce draft order overwritten"
        );

        ensure_active(cancel)?;
        reporter.progress("submitting quote for approval", 85).await;
        self.push_status(&mut quote, QuoteStatus::Approval).await?;

        reporter.progress("approving quote", 95).await;
        self.push_status(&mut quote, QuoteStatus::Approved).await?;

        self.quotes.links(&request.quote_id).await.map_err(SyncRunError::Links)
    }

    /// Advances the local status mirror first so an out-of-order write is
    /// caught before it reaches the CRM.
    async fn push_status(
        &self,
        quote: &mut Quote,
        status: QuoteStatus,
    ) -> Result<(), SyncRunError> {
        quote.transition_to(status)?;
        self.quotes.set_status(&quote.id, status).await.map_err(SyncRunError::Status)
    }
}

fn ensure_active(cancel: &CancellationToken) -> Result<(), SyncRunError> {
    if cancel.is_cancelled() {
        return Err(SyncRunError::Cancelled);
    }
    Ok(())
}

/// Feeds events into the caller's channel, keeping percentages monotonic. A
/// closed channel (caller gone) is not an error here; cancellation is the
/// token's job.
struct ProgressReporter {
    events: mpsc::Sender<ProgressEvent>,
    tracker: ProgressTracker,
}

impl ProgressReporter {
    fn new(events: mpsc::Sender<ProgressEvent>) -> Self {
        Self { events, tracker: ProgressTracker::new() }
    }

    async fn progress(&mut self, label: &str, percent: u8) {
        let event = self.tracker.progress(label, percent);
        let _ = self.events.send(event).await;
    }

    async fn complete(&mut self, links: QuoteLinks, correlation_id: String) {
        let _ = self
            .events
            .send(ProgressEvent::Complete {
                success: true,
                quote_url: links.view_url,
                pdf_url: links.pdf_url,
                correlation_id,
            })
            .await;
    }

    async fn error(&mut self, message: String) {
        let _ = self.events.send(ProgressEvent::Error { message }).await;
    }
}

// Production adapters over the crm and commerce crates.

pub struct CrmQuoteApi {
    gateway: Gateway,
}

impl CrmQuoteApi {
    pub fn new(gateway: Gateway) -> Self {
        Self { gateway }
    }
}

#[async_trait]
impl QuoteApi for CrmQuoteApi {
    async fn set_status(&self, quote_id: &QuoteId, status: QuoteStatus) -> Result<(), GatewayError> {
        quotes::update_status(&self.gateway, quote_id, status).await
    }

    async fn links(&self, quote_id: &QuoteId) -> Result<QuoteLinks, GatewayError> {
        quotes::fetch_links(&self.gateway, quote_id).await
    }
}

pub struct CrmLineItemSync {
    reconciler: Reconciler,
    gateway: Gateway,
    batch_page_size: usize,
}

impl CrmLineItemSync {
    pub fn new(reconciler: Reconciler, gateway: Gateway, batch_page_size: usize) -> Self {
        Self { reconciler, gateway, batch_page_size }
    }
}

#[async_trait]
impl LineItemSync for CrmLineItemSync {
    async fn reconcile(
        &self,
        quote_id: &QuoteId,
        deal_id: &DealId,
        old_line_item_ids: &[LineItemId],
        drafts: &[LineItemDraft],
    ) -> Result<ReconcileOutcome, ReconcileError> {
        self.reconciler.reconcile(quote_id, deal_id, old_line_item_ids, drafts).await
    }

    async fn read_back(&self, ids: &[LineItemId]) -> Result<Vec<LineItem>, LineItemReadError> {
        line_items::fetch_line_items(&self.gateway, ids, self.batch_page_size).await
    }
}

pub struct CommerceOrderSync {
    synchronizer: OrderSynchronizer,
}

impl CommerceOrderSync {
    pub fn new(synchronizer: OrderSynchronizer) -> Self {
        Self { synchronizer }
    }
}

#[async_trait]
impl OrderSync for CommerceOrderSync {
    async fn sync_order(
        &self,
        draft_order_id: &DraftOrderId,
        items: &[LineItem],
    ) -> Result<OrderSyncResult, OrderSyncError> {
        self.synchronizer.sync_order(draft_order_id, items).await
    }
}
