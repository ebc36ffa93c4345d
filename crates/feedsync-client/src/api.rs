//! The marketplace operations the sync engine depends on.

use async_trait::async_trait;
#[cfg(any(test, feature = "mocks"))]
use mockall::automock;

use feedsync_core::{AvailabilityRecord, FeedRecord, RegisteredStore, StoreConfig};
use serde_json::Value;

use crate::client::MarketplaceClient;
use crate::error::ClientError;

/// Marketplace calls made by the sync engine.
///
/// Implemented by [`MarketplaceClient`]; a `mockall` mock is exported under
/// the `mocks` feature.
#[cfg_attr(any(test, feature = "mocks"), automock)]
#[async_trait]
pub trait MarketplaceApi: Send + Sync {
    /// Exchanges the store's secret key for a token.
    async fn register(&self, store: &StoreConfig) -> Result<String, ClientError>;

    /// Returns the raw parsed response for the caller to judge.
    async fn unregister(&self, store: &RegisteredStore) -> Result<Option<Value>, ClientError>;

    async fn update_products(
        &self,
        store: &RegisteredStore,
        records: &[FeedRecord],
    ) -> Result<(), ClientError>;

    async fn send_availability(
        &self,
        store: &RegisteredStore,
        records: &[AvailabilityRecord],
    ) -> Result<(), ClientError>;
}

#[async_trait]
impl MarketplaceApi for MarketplaceClient {
    async fn register(&self, store: &StoreConfig) -> Result<String, ClientError> {
        MarketplaceClient::register(self, store).await
    }

    async fn unregister(&self, store: &RegisteredStore) -> Result<Option<Value>, ClientError> {
        MarketplaceClient::unregister(self, store).await
    }

    async fn update_products(
        &self,
        store: &RegisteredStore,
        records: &[FeedRecord],
    ) -> Result<(), ClientError> {
        MarketplaceClient::update_products(self, store, records).await
    }

    async fn send_availability(
        &self,
        store: &RegisteredStore,
        records: &[AvailabilityRecord],
    ) -> Result<(), ClientError> {
        MarketplaceClient::send_availability(self, store, records).await
    }
}

/// Whether an unregister response confirms the store was dropped: a JSON
/// object without an `errors` field.
#[must_use]
pub fn unregister_confirmed(response: Option<&Value>) -> bool {
    matches!(response, Some(Value::Object(map)) if !map.contains_key("errors"))
}
