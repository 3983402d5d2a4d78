//! Batch association endpoints (CRM v4).
//!
//! Attaching uses HUBSPOT_DEFINED association types; detaching archives the
//! edge wholesale. The quote→line-item and deal→line-item relations carry
//! different type ids and are deliberately not interchangeable.

use quotelink_core::{DealId, LineItemId, QuoteId};
use serde_json::json;

use crate::gateway::{Gateway, GatewayError};
use crate::transport::ApiRequest;

pub const QUOTE_TO_LINE_ITEM: u32 = 67;
pub const DEAL_TO_LINE_ITEM: u32 = 19;

pub async fn create_quote_associations(
    gateway: &Gateway,
    quote_id: &QuoteId,
    line_item_ids: &[LineItemId],
) -> Result<(), GatewayError> {
    create_associations(gateway, "quotes", &quote_id.0, QUOTE_TO_LINE_ITEM, line_item_ids).await
}

pub async fn create_deal_associations(
    gateway: &Gateway,
    deal_id: &DealId,
    line_item_ids: &[LineItemId],
) -> Result<(), GatewayError> {
    create_associations(gateway, "deals", &deal_id.0, DEAL_TO_LINE_ITEM, line_item_ids).await
}

/// Archives the quote→line-item edges for `line_item_ids`. A no-op (zero
/// calls) when the list is empty.
pub async fn archive_quote_associations(
    gateway: &Gateway,
    quote_id: &QuoteId,
    line_item_ids: &[LineItemId],
) -> Result<(), GatewayError> {
    if line_item_ids.is_empty() {
        return Ok(());
    }

    let request = ApiRequest::post(
        "/crm/v4/associations/quotes/line_items/batch/archive".to_string(),
        json!({
            "inputs": [{
                "from": {"id": quote_id.0},
                "to": line_item_ids.iter().map(|id| json!({"id": id.0})).collect::<Vec<_>>(),
            }],
        }),
    );

    gateway.call(request).await.map(|_| ())
}

async fn create_associations(
    gateway: &Gateway,
    from_object: &str,
    from_id: &str,
    association_type_id: u32,
    line_item_ids: &[LineItemId],
) -> Result<(), GatewayError> {
    if line_item_ids.is_empty() {
        return Ok(());
    }

    let inputs: Vec<_> = line_item_ids
        .iter()
        .map(|id| {
            json!({
                "from": {"id": from_id},
                "to": {"id": id.0},
                "types": [{
                    "associationCategory": "HUBSPOT_DEFINED",
                    "associationTypeId": association_type_id,
                }],
            })
        })
        .collect();

    let request = ApiRequest::post(
        format!("/crm/v4/associations/{from_object}/line_items/batch/create"),
        json!({"inputs": inputs}),
    );

    gateway.call(request).await.map(|_| ())
}
