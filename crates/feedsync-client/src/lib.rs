//! Marketplace feed API client.

pub mod api;
pub mod client;
pub mod error;
pub(crate) mod retry;
pub mod signature;

pub use api::{unregister_confirmed, MarketplaceApi};
#[cfg(any(test, feature = "mocks"))]
pub use api::MockMarketplaceApi;
pub use client::{ApiResponse, ClientOptions, Endpoint, MarketplaceClient};
pub use error::ClientError;
pub use signature::sign;
