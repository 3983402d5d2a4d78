pub mod config;
pub mod domain;
pub mod errors;
pub mod events;
pub mod retry;

pub use domain::line_item::{LineItem, LineItemDraft, LineItemId, ProductId, Sku};
pub use domain::order::{DraftOrderId, OrderLine, VariantId};
pub use domain::quote::{DealId, Quote, QuoteId, QuoteStatus};
pub use errors::DomainError;
pub use events::{ProgressEvent, ProgressTracker};
pub use retry::RetryPolicy;
