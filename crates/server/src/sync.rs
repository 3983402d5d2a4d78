//! Synchronization endpoint.
//!
//! `POST /api/v1/quotes/{quote_id}/sync` starts one orchestrator run and
//! answers with a server-sent event stream of its progress. The stream closes
//! when the run finishes, success or error alike; there is no buffering or
//! replay. Dropping the response (caller disconnect) cancels the run's token,
//! so the server does not keep working for a caller that is gone.

use std::convert::Infallible;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::{
    extract::{Path, State},
    response::sse::{Event, KeepAlive, KeepAliveStream, Sse},
    routing::post,
    Json, Router,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::Stream;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::info;

use quotelink_core::events::ProgressEvent;
use quotelink_core::{
    DealId, DraftOrderId, LineItemDraft, LineItemId, ProductId, QuoteId, Sku,
};

use crate::orchestrator::{QuoteSyncOrchestrator, SyncRequest};

const EVENT_CHANNEL_CAPACITY: usize = 32;

#[derive(Clone)]
pub struct SyncState {
    orchestrator: Arc<QuoteSyncOrchestrator>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRequestPayload {
    pub deal_id: String,
    pub draft_order_id: String,
    #[serde(default)]
    pub old_line_item_ids: Vec<String>,
    pub line_items: Vec<LineItemPayload>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItemPayload {
    pub product_id: String,
    pub name: String,
    pub sku: String,
    pub quantity: u32,
    pub unit_price: Decimal,
    #[serde(default)]
    pub discount_percent: Decimal,
    #[serde(default)]
    pub image_url: Option<String>,
}

impl SyncRequestPayload {
    fn into_request(self, quote_id: QuoteId) -> SyncRequest {
        SyncRequest {
            quote_id,
            deal_id: DealId(self.deal_id),
            draft_order_id: DraftOrderId(self.draft_order_id),
            old_line_item_ids: self.old_line_item_ids.into_iter().map(LineItemId).collect(),
            line_items: self.line_items.into_iter().map(LineItemPayload::into_draft).collect(),
        }
    }
}

impl LineItemPayload {
    fn into_draft(self) -> LineItemDraft {
        LineItemDraft {
            product_id: ProductId(self.product_id),
            name: self.name,
            sku: Sku(self.sku),
            quantity: self.quantity,
            unit_price: self.unit_price,
            discount_percent: self.discount_percent,
            image_url: self.image_url,
        }
    }
}

pub fn router(orchestrator: Arc<QuoteSyncOrchestrator>) -> Router {
    Router::new()
        .route("/api/v1/quotes/{quote_id}/sync", post(start_sync))
        .with_state(SyncState { orchestrator })
}

pub async fn start_sync(
    State(state): State<SyncState>,
    Path(quote_id): Path<String>,
    Json(payload): Json<SyncRequestPayload>,
) -> Sse<KeepAliveStream<EventStream>> {
    let request = payload.into_request(QuoteId(quote_id));
    info!(
        event_name = "sync.request.accepted",
        quote_id = %request.quote_id.0,
        deal_id = %request.deal_id.0,
        "synchronization request accepted, streaming progress"
    );

    let (events, receiver) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
    let cancel = CancellationToken::new();
    let run_token = cancel.clone();
    let orchestrator = Arc::clone(&state.orchestrator);
    tokio::spawn(async move {
        orchestrator.run(request, events, run_token).await;
    });

    Sse::new(EventStream {
        inner: ReceiverStream::new(receiver),
        _disconnect_guard: cancel.drop_guard(),
    })
    .keep_alive(KeepAlive::default())
}

/// Bridges the orchestrator's channel into the SSE response. Holding the drop
/// guard ties the run's cancellation token to the response body's lifetime.
pub struct EventStream {
    inner: ReceiverStream<ProgressEvent>,
    _disconnect_guard: DropGuard,
}

impl Stream for EventStream {
    type Item = Result<Event, Infallible>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        Pin::new(&mut this.inner)
            .poll_next(cx)
            .map(|maybe| maybe.map(|event| Ok(to_sse_event(event))))
    }
}

fn to_sse_event(event: ProgressEvent) -> Event {
    let data = serde_json::to_string(&event).unwrap_or_else(|_| "{}".to_string());
    Event::default().event(event.kind()).data(data)
}
