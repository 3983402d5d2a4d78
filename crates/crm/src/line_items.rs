//! Line-item object endpoints: batch create and completeness-checked read-back.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::warn;

use quotelink_core::{LineItem, LineItemDraft, LineItemId, Sku};

use crate::batch;
use crate::gateway::{Gateway, GatewayError};
use crate::transport::ApiRequest;

const OBJECT_PATH: &str = "/crm/v3/objects/line_items";
const READ_PROPERTIES: [&str; 4] = ["hs_sku", "quantity", "price", "hs_discount_percentage"];

#[derive(Debug, Error)]
pub enum LineItemReadError {
    #[error("line items absent from batch read: {}", .ids.join(", "))]
    Missing { ids: Vec<String> },
    #[error("line item `{id}` is malformed: {detail}")]
    Malformed { id: String, detail: String },
}

/// Creates one line item per draft and returns the new ids in the order the
/// CRM reports them.
pub async fn create_line_items(
    gateway: &Gateway,
    drafts: &[LineItemDraft],
) -> Result<Vec<LineItemId>, GatewayError> {
    let inputs: Vec<_> =
        drafts.iter().map(|draft| json!({"properties": draft_properties(draft)})).collect();

    let request = ApiRequest::post(format!("{OBJECT_PATH}/batch/create"), json!({"inputs": inputs}));
    let response = gateway.call(request).await?;

    let ids = response
        .body
        .get("results")
        .and_then(Value::as_array)
        .map(|results| {
            results
                .iter()
                .filter_map(|entry| entry.get("id").and_then(Value::as_str))
                .map(|id| LineItemId(id.to_string()))
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();

    if ids.len() != drafts.len() {
        warn!(
            event_name = "crm.line_items.create_count_mismatch",
            requested = drafts.len(),
            created = ids.len(),
            "crm reported fewer created line items than requested"
        );
    }

    Ok(ids)
}

/// Reads the given line items back in provider-sized chunks. Unlike the raw
/// batch aggregate this path requires completeness: any id the CRM did not
/// return fails the whole read.
pub async fn fetch_line_items(
    gateway: &Gateway,
    ids: &[LineItemId],
    page_size: usize,
) -> Result<Vec<LineItem>, LineItemReadError> {
    let raw_ids: Vec<String> = ids.iter().map(|id| id.0.clone()).collect();
    let outcome = batch::read_batch(gateway, OBJECT_PATH, &READ_PROPERTIES, &raw_ids, page_size).await;

    if !outcome.is_complete() {
        return Err(LineItemReadError::Missing {
            ids: outcome.missing_ids().into_iter().map(str::to_string).collect(),
        });
    }

    let mut items = Vec::with_capacity(ids.len());
    let mut absent = Vec::new();
    for id in ids {
        match outcome.found.get(&id.0) {
            Some(properties) => items.push(parse_line_item(id, properties)?),
            None => absent.push(id.0.clone()),
        }
    }

    if !absent.is_empty() {
        return Err(LineItemReadError::Missing { ids: absent });
    }

    Ok(items)
}

fn draft_properties(draft: &LineItemDraft) -> Value {
    let mut properties = json!({
        "name": draft.name,
        "hs_sku": draft.sku.0,
        "hs_product_id": draft.product_id.0,
        "quantity": draft.quantity.to_string(),
        "price": draft.unit_price.to_string(),
        "hs_discount_percentage": draft.discount_percent.to_string(),
    });
    if let Some(image_url) = &draft.image_url {
        properties["hs_image_url"] = Value::String(image_url.clone());
    }
    properties
}

fn parse_line_item(id: &LineItemId, properties: &Value) -> Result<LineItem, LineItemReadError> {
    let sku = properties
        .get("hs_sku")
        .and_then(Value::as_str)
        .filter(|sku| !sku.is_empty())
        .ok_or_else(|| malformed(id, "missing hs_sku"))?;

    let quantity = number_prop(properties, "quantity")
        .filter(Decimal::is_integer)
        .and_then(|value| value.to_u32())
        .ok_or_else(|| malformed(id, "missing or non-integer quantity"))?;

    let unit_price =
        number_prop(properties, "price").ok_or_else(|| malformed(id, "missing price"))?;
    let discount_percent = number_prop(properties, "hs_discount_percentage").unwrap_or(Decimal::ZERO);

    Ok(LineItem {
        id: id.clone(),
        sku: Sku(sku.to_string()),
        quantity,
        unit_price,
        discount_percent,
    })
}

fn number_prop(properties: &Value, key: &str) -> Option<Decimal> {
    match properties.get(key)? {
        Value::String(raw) => raw.trim().parse().ok(),
        Value::Number(raw) => raw.as_f64().and_then(|value| Decimal::try_from(value).ok()),
        _ => None,
    }
}

fn malformed(id: &LineItemId, detail: &str) -> LineItemReadError {
    LineItemReadError::Malformed { id: id.0.clone(), detail: detail.to_string() }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use quotelink_core::config::GatewayConfig;
    use quotelink_core::{LineItemDraft, LineItemId, ProductId, Sku};
    use rust_decimal::Decimal;
    use serde_json::json;

    use super::{create_line_items, fetch_line_items, LineItemReadError};
    use crate::gateway::Gateway;
    use crate::testing::{ok, status, FnTransport};
    use crate::transport::ApiRequest;

    fn draft(sku: &str, quantity: u32) -> LineItemDraft {
        LineItemDraft {
            product_id: ProductId("prod-1".to_string()),
            name: "Pro plan".to_string(),
            sku: Sku(sku.to_string()),
            quantity,
            unit_price: Decimal::new(10_000, 2),
            discount_percent: Decimal::ZERO,
            image_url: None,
        }
    }

    #[tokio::test]
    async fn create_sends_string_properties_and_returns_new_ids() {
        let requests = Arc::new(Mutex::new(Vec::new()));
        let recorder = Arc::clone(&requests);
        let gateway = Gateway::new(
            Arc::new(FnTransport(move |request: &ApiRequest| {
                recorder.lock().expect("lock").push(request.clone());
                Ok(ok(json!({"results": [{"id": "LI3"}]})))
            })),
            &GatewayConfig { max_concurrency: 4, min_gap_ms: 1, batch_page_size: 100 },
        );

        let ids = create_line_items(&gateway, &[draft("SKU-A", 2)])
            .await
            .expect("create should succeed");

        assert_eq!(ids, vec![LineItemId("LI3".to_string())]);
        let requests = requests.lock().expect("lock");
        assert_eq!(requests[0].path, "/crm/v3/objects/line_items/batch/create");
        let properties = &requests[0].body.as_ref().expect("body")["inputs"][0]["properties"];
        assert_eq!(properties["hs_sku"], "SKU-A");
        assert_eq!(properties["quantity"], "2");
        assert_eq!(properties["price"], "100.00");
    }

    #[tokio::test]
    async fn fetch_parses_string_typed_crm_properties() {
        let gateway = Gateway::new(
            Arc::new(FnTransport(|_request: &ApiRequest| {
                Ok(ok(json!({
                    "results": [{
                        "id": "LI3",
                        "properties": {
                            "hs_sku": "SKU-A",
                            "quantity": "2",
                            "price": "100.00",
                            "hs_discount_percentage": "12.5",
                        },
                    }],
                })))
            })),
            &GatewayConfig { max_concurrency: 4, min_gap_ms: 1, batch_page_size: 100 },
        );

        let items = fetch_line_items(&gateway, &[LineItemId("LI3".to_string())], 100)
            .await
            .expect("fetch should succeed");

        assert_eq!(items.len(), 1);
        assert_eq!(items[0].sku, Sku("SKU-A".to_string()));
        assert_eq!(items[0].quantity, 2);
        assert_eq!(items[0].unit_price, Decimal::new(10_000, 2));
        assert_eq!(items[0].discount_percent, Decimal::new(125, 1));
    }

    #[tokio::test]
    async fn fetch_requires_completeness() {
        let gateway = Gateway::new(
            Arc::new(FnTransport(|_request: &ApiRequest| Ok(status(500)))),
            &GatewayConfig { max_concurrency: 4, min_gap_ms: 1, batch_page_size: 100 },
        );

        let error = fetch_line_items(&gateway, &[LineItemId("LI3".to_string())], 100)
            .await
            .expect_err("should fail on incomplete read");

        assert!(matches!(error, LineItemReadError::Missing { ids } if ids == vec!["LI3"]));
    }

    #[tokio::test]
    async fn fetch_flags_ids_the_crm_silently_dropped() {
        let gateway = Gateway::new(
            Arc::new(FnTransport(|_request: &ApiRequest| Ok(ok(json!({"results": []}))))),
            &GatewayConfig { max_concurrency: 4, min_gap_ms: 1, batch_page_size: 100 },
        );

        let error = fetch_line_items(&gateway, &[LineItemId("LI9".to_string())], 100)
            .await
            .expect_err("should fail on absent id");

        assert!(matches!(error, LineItemReadError::Missing { ids } if ids == vec!["LI9"]));
    }
}
