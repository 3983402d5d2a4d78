use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LineItemId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProductId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Sku(pub String);

/// Caller-submitted description of a line item to create. Line items are never
/// mutated in place: every synchronization run destroys the old set and creates
/// a fresh one from these drafts.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LineItemDraft {
    pub product_id: ProductId,
    pub name: String,
    pub sku: Sku,
    pub quantity: u32,
    pub unit_price: Decimal,
    pub discount_percent: Decimal,
    pub image_url: Option<String>,
}

impl LineItemDraft {
    /// Line total after the per-unit percentage discount.
    pub fn extended_amount(&self) -> Decimal {
        let gross = self.unit_price * Decimal::from(self.quantity);
        gross - gross * self.discount_percent / Decimal::ONE_HUNDRED
    }
}

/// A line item as read back from the CRM after creation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub id: LineItemId,
    pub sku: Sku,
    pub quantity: u32,
    pub unit_price: Decimal,
    pub discount_percent: Decimal,
}
