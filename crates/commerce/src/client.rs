//! Commerce API seam and its Shopify-flavored HTTP implementation.

use std::collections::HashMap;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use thiserror::Error;

use quotelink_core::{DraftOrderId, OrderLine, Sku, VariantId};

const API_VERSION: &str = "2024-07";
const ACCESS_TOKEN_HEADER: &str = "X-Shopify-Access-Token";

#[derive(Debug, Error)]
pub enum CommerceError {
    #[error("commerce request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("commerce request failed with status {status}: {body}")]
    Remote { status: u16, body: String },
}

/// The two commerce operations this core needs. The draft-order update is
/// atomic per call on the provider side; a failed call leaves the order as it
/// was.
#[async_trait]
pub trait CommerceApi: Send + Sync {
    async fn lookup_variants(&self, skus: &[Sku]) -> Result<HashMap<Sku, VariantId>, CommerceError>;

    async fn put_draft_order(
        &self,
        draft_order_id: &DraftOrderId,
        lines: &[OrderLine],
    ) -> Result<(), CommerceError>;
}

pub struct ShopifyClient {
    client: reqwest::Client,
    base_url: String,
    access_token: SecretString,
}

impl ShopifyClient {
    pub fn new(client: reqwest::Client, base_url: String, access_token: SecretString) -> Self {
        let base_url = base_url.trim_end_matches('/').to_string();
        Self { client, base_url, access_token }
    }

    async fn send(
        &self,
        builder: reqwest::RequestBuilder,
    ) -> Result<Value, CommerceError> {
        let response =
            builder.header(ACCESS_TOKEN_HEADER, self.access_token.expose_secret()).send().await?;
        let status = response.status().as_u16();
        let bytes = response.bytes().await?;
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };

        if !(200..300).contains(&status) {
            return Err(CommerceError::Remote { status, body: body.to_string() });
        }

        Ok(body)
    }
}

#[async_trait]
impl CommerceApi for ShopifyClient {
    async fn lookup_variants(&self, skus: &[Sku]) -> Result<HashMap<Sku, VariantId>, CommerceError> {
        let mut variants = HashMap::new();
        for sku in skus {
            if variants.contains_key(sku) {
                continue;
            }

            let url = format!("{}/admin/api/{API_VERSION}/variants.json", self.base_url);
            let body =
                self.send(self.client.get(&url).query(&[("sku", sku.0.as_str())])).await?;

            let variant_id = body["variants"]
                .as_array()
                .and_then(|list| list.first())
                .and_then(|variant| variant.get("id"))
                .map(id_string);
            if let Some(id) = variant_id {
                variants.insert(sku.clone(), VariantId(id));
            }
        }

        Ok(variants)
    }

    async fn put_draft_order(
        &self,
        draft_order_id: &DraftOrderId,
        lines: &[OrderLine],
    ) -> Result<(), CommerceError> {
        let url = format!(
            "{}/admin/api/{API_VERSION}/draft_orders/{}.json",
            self.base_url, draft_order_id.0
        );
        let payload = json!({
            "draft_order": {
                "id": draft_order_id.0,
                "line_items": lines.iter().map(order_line_json).collect::<Vec<_>>(),
            },
        });

        self.send(self.client.put(&url).json(&payload)).await.map(|_| ())
    }
}

fn order_line_json(line: &OrderLine) -> Value {
    let mut entry = json!({
        "variant_id": variant_id_json(&line.variant_id),
        "quantity": line.quantity,
    });
    if !line.discount_percent.is_zero() {
        entry["applied_discount"] = json!({
            "value": line.discount_percent.to_string(),
            "value_type": "percentage",
        });
    }
    entry
}

fn variant_id_json(id: &VariantId) -> Value {
    id.0.parse::<u64>().map(Value::from).unwrap_or_else(|_| Value::String(id.0.clone()))
}

fn id_string(value: &Value) -> String {
    match value {
        Value::String(raw) => raw.clone(),
        other => other.to_string(),
    }
}
