//! Commerce-platform integration: variant lookup and wholesale draft-order
//! line replacement.

pub mod client;
pub mod sync;

pub use client::{CommerceApi, CommerceError, ShopifyClient};
pub use sync::{OrderSyncError, OrderSyncResult, OrderSynchronizer};
