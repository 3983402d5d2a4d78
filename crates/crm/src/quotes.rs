//! Quote object endpoints: status writes and link reads.

use serde_json::{json, Value};

use quotelink_core::{QuoteId, QuoteStatus};

use crate::gateway::{Gateway, GatewayError};
use crate::transport::ApiRequest;

const OBJECT_PATH: &str = "/crm/v3/objects/quotes";

/// External links the CRM renders for a quote, surfaced to the caller in the
/// terminal `complete` event.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct QuoteLinks {
    pub view_url: Option<String>,
    pub pdf_url: Option<String>,
}

pub async fn update_status(
    gateway: &Gateway,
    quote_id: &QuoteId,
    status: QuoteStatus,
) -> Result<(), GatewayError> {
    let request = ApiRequest::patch(
        format!("{OBJECT_PATH}/{}", quote_id.0),
        json!({"properties": {"hs_status": status.as_str()}}),
    );
    gateway.call(request).await.map(|_| ())
}

pub async fn fetch_links(gateway: &Gateway, quote_id: &QuoteId) -> Result<QuoteLinks, GatewayError> {
    let request = ApiRequest::get(format!(
        "{OBJECT_PATH}/{}?properties=hs_quote_link,hs_pdf_download_link",
        quote_id.0
    ));
    let response = gateway.call(request).await?;

    let properties = &response.body["properties"];
    Ok(QuoteLinks {
        view_url: string_prop(properties, "hs_quote_link"),
        pdf_url: string_prop(properties, "hs_pdf_download_link"),
    })
}

fn string_prop(properties: &Value, key: &str) -> Option<String> {
    properties.get(key).and_then(Value::as_str).filter(|value| !value.is_empty()).map(str::to_string)
}
