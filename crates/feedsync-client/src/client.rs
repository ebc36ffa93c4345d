//! HTTP client for the marketplace feed API.
//!
//! Every call is a JSON `POST` to `<base>/<version>/<endpoint>`. Requests made
//! on behalf of a registered store carry the store's domain and merchant code
//! and, when a body is present, an HMAC signature over the exact body bytes.

use std::time::{Duration, Instant};

use feedsync_core::{AppConfig, AvailabilityRecord, FeedRecord, RegisteredStore, StoreConfig};
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Method, Url};
use serde::Serialize;
use serde_json::Value;

use crate::error::ClientError;
use crate::retry::RetryPolicy;
use crate::signature::sign;

pub const HEADER_PLUGIN_PLATFORM: &str = "X-Plugin-Platform";
pub const HEADER_PLUGIN_VERSION: &str = "X-Plugin-Version";
pub const HEADER_STORE_DOMAIN: &str = "X-Store-Domain";
pub const HEADER_MERCHANT_CODE: &str = "X-Merchant-Code";
pub const HEADER_SIGNATURE: &str = "X-Signature";

/// Marketplace API operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Register,
    Availability,
    Products,
    Uninstall,
}

impl Endpoint {
    #[must_use]
    pub fn path(self) -> &'static str {
        match self {
            Endpoint::Register => "register",
            Endpoint::Availability => "availability",
            Endpoint::Products => "products",
            Endpoint::Uninstall => "uninstall",
        }
    }

    /// Registration is the only call made before a token exists, so it
    /// carries neither merchant headers nor a signature.
    #[must_use]
    pub fn is_authenticated(self) -> bool {
        !matches!(self, Endpoint::Register)
    }

    /// Whether a transport failure may be retried. A register call that
    /// timed out may still have been accepted, and repeating it can issue a
    /// second token, so it is left to the next pass.
    #[must_use]
    pub fn is_retryable(self) -> bool {
        !matches!(self, Endpoint::Register)
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.path())
    }
}

/// Tunables for [`MarketplaceClient`].
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub api_version: String,
    pub plugin_platform: String,
    pub plugin_version: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub retry_backoff_base_ms: u64,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            api_version: "v1".to_string(),
            plugin_platform: "feedsync".to_string(),
            plugin_version: env!("CARGO_PKG_VERSION").to_string(),
            timeout_secs: 120,
            max_retries: 2,
            retry_backoff_base_ms: 1_000,
        }
    }
}

impl ClientOptions {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            api_version: config.marketplace_api_version.clone(),
            plugin_platform: config.plugin_platform.clone(),
            plugin_version: config.plugin_version.clone(),
            timeout_secs: config.request_timeout_secs,
            max_retries: config.max_retries,
            retry_backoff_base_ms: config.retry_backoff_base_ms,
        }
    }
}

/// Status and parsed body of one marketplace round trip.
///
/// `body` is `None` when the marketplace sent nothing usable: an empty body,
/// or an unparseable body on an error status.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Option<Value>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RegisterPayload<'a> {
    secret_key: &'a str,
    merchant_code: &'a str,
    domain: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UninstallPayload<'a> {
    merchant_code: &'a str,
    domain: &'a str,
}

#[derive(Serialize)]
struct ProductsPayload<'a> {
    products: &'a [FeedRecord],
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AvailabilityPayload<'a> {
    availability_info: &'a [AvailabilityRecord],
}

/// Client for the marketplace feed API.
///
/// Use [`MarketplaceClient::new`] with the configured base URL; tests point it
/// at a wiremock server.
pub struct MarketplaceClient {
    client: Client,
    base_url: Url,
    options: ClientOptions,
}

impl MarketplaceClient {
    /// # Errors
    ///
    /// Returns [`ClientError::Http`] if the underlying `reqwest::Client`
    /// cannot be constructed, or [`ClientError::InvalidBaseUrl`] if
    /// `base_url` does not parse.
    pub fn new(base_url: &str, options: ClientOptions) -> Result<Self, ClientError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(options.timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .user_agent(format!(
                "{}/{}",
                options.plugin_platform, options.plugin_version
            ))
            .build()?;

        // Exactly one trailing slash so joins append rather than replace the
        // last path segment.
        let normalised = format!("{}/", base_url.trim_end_matches('/'));
        let base_url = Url::parse(&normalised).map_err(|e| ClientError::InvalidBaseUrl {
            url: base_url.to_string(),
            reason: e.to_string(),
        })?;
        if base_url.cannot_be_a_base() {
            return Err(ClientError::InvalidBaseUrl {
                url: base_url.to_string(),
                reason: "URL cannot be used as a base".to_string(),
            });
        }

        Ok(Self {
            client,
            base_url,
            options,
        })
    }

    /// Full URL for `endpoint` under the configured API version.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidBaseUrl`] if the version segment does not
    /// form a valid URL.
    pub fn endpoint_url(&self, endpoint: Endpoint) -> Result<Url, ClientError> {
        let version = self.options.api_version.trim_matches('/');
        self.base_url
            .join(&format!("{version}/{}", endpoint.path()))
            .map_err(|e| ClientError::InvalidBaseUrl {
                url: self.base_url.to_string(),
                reason: e.to_string(),
            })
    }

    /// Registers a store and returns the issued token.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::MissingToken`] when the response carries no
    /// `token`, or a transport error.
    pub async fn register(&self, store: &StoreConfig) -> Result<String, ClientError> {
        let payload = RegisterPayload {
            secret_key: &store.key,
            merchant_code: &store.code,
            domain: &store.domain,
        };
        let response = self
            .request(Method::POST, Endpoint::Register, None, Some(&payload))
            .await?;
        response
            .body
            .as_ref()
            .and_then(|body| body.get("token"))
            .and_then(Value::as_str)
            .filter(|token| !token.is_empty())
            .map(str::to_string)
            .ok_or(ClientError::MissingToken)
    }

    /// Asks the marketplace to drop a store. The parsed response is returned
    /// as-is.
    ///
    /// # Errors
    ///
    /// Returns a transport or serialization error.
    pub async fn unregister(&self, store: &RegisteredStore) -> Result<Option<Value>, ClientError> {
        let payload = UninstallPayload {
            merchant_code: &store.config.code,
            domain: &store.config.domain,
        };
        let response = self
            .request(Method::POST, Endpoint::Uninstall, Some(store), Some(&payload))
            .await?;
        Ok(response.body)
    }

    /// Pushes one batch of product records.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Rejected`] when the response has an `errors`
    /// field, [`ClientError::UnexpectedResponse`] when it is not a JSON
    /// object, or a transport error.
    pub async fn update_products(
        &self,
        store: &RegisteredStore,
        records: &[FeedRecord],
    ) -> Result<(), ClientError> {
        let payload = ProductsPayload { products: records };
        let response = self
            .request(Method::POST, Endpoint::Products, Some(store), Some(&payload))
            .await?;
        check_accepted(Endpoint::Products, &response)
    }

    /// Pushes availability changes.
    ///
    /// # Errors
    ///
    /// Same as [`MarketplaceClient::update_products`].
    pub async fn send_availability(
        &self,
        store: &RegisteredStore,
        records: &[AvailabilityRecord],
    ) -> Result<(), ClientError> {
        let payload = AvailabilityPayload {
            availability_info: records,
        };
        let response = self
            .request(
                Method::POST,
                Endpoint::Availability,
                Some(store),
                Some(&payload),
            )
            .await?;
        check_accepted(Endpoint::Availability, &response)
    }

    /// Sends one request and interprets the response body.
    ///
    /// `store` supplies merchant headers and the signing token; it is ignored
    /// for [`Endpoint::Register`]. The payload is serialized once and the
    /// signature is computed over exactly those bytes.
    ///
    /// # Errors
    ///
    /// - [`ClientError::Serialize`] if the payload cannot be encoded.
    /// - [`ClientError::Http`] on network failure or timeout, after retries.
    /// - [`ClientError::Deserialize`] if a 100/200 response is not valid JSON.
    pub async fn request<P>(
        &self,
        method: Method,
        endpoint: Endpoint,
        store: Option<&RegisteredStore>,
        payload: Option<&P>,
    ) -> Result<ApiResponse, ClientError>
    where
        P: Serialize + ?Sized + Sync,
    {
        let url = self.endpoint_url(endpoint)?;
        let body = payload
            .map(serde_json::to_vec)
            .transpose()
            .map_err(|source| ClientError::Serialize { endpoint, source })?;

        let store = store.filter(|_| endpoint.is_authenticated());
        let signature = match (store, body.as_deref()) {
            (Some(store), Some(bytes)) => Some(sign(bytes, &store.token)?),
            _ => None,
        };

        let max_retries = if endpoint.is_retryable() {
            self.options.max_retries
        } else {
            0
        };
        RetryPolicy::new(max_retries, self.options.retry_backoff_base_ms)
            .run(|| {
                self.send_once(
                    method.clone(),
                    endpoint,
                    &url,
                    store,
                    body.as_deref(),
                    signature.as_deref(),
                )
            })
            .await
    }

    async fn send_once(
        &self,
        method: Method,
        endpoint: Endpoint,
        url: &Url,
        store: Option<&RegisteredStore>,
        body: Option<&[u8]>,
        signature: Option<&str>,
    ) -> Result<ApiResponse, ClientError> {
        let started = Instant::now();
        let mut request = self
            .client
            .request(method, url.clone())
            .header(HEADER_PLUGIN_PLATFORM, &self.options.plugin_platform)
            .header(HEADER_PLUGIN_VERSION, &self.options.plugin_version);
        if let Some(store) = store {
            request = request
                .header(HEADER_STORE_DOMAIN, &store.config.domain)
                .header(HEADER_MERCHANT_CODE, &store.config.code);
        }
        if let Some(signature) = signature {
            request = request.header(HEADER_SIGNATURE, signature);
        }
        if let Some(bytes) = body {
            request = request
                .header(CONTENT_TYPE, "application/json")
                .body(bytes.to_vec());
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(
                    %endpoint,
                    url = %url,
                    elapsed_ms = elapsed_ms(started),
                    error = %e,
                    "marketplace request failed"
                );
                return Err(e.into());
            }
        };
        let status = response.status().as_u16();
        let text = response.text().await?;
        tracing::info!(
            %endpoint,
            url = %url,
            status,
            elapsed_ms = elapsed_ms(started),
            "marketplace request"
        );

        let body = interpret_body(endpoint, status, &text)?;
        Ok(ApiResponse { status, body })
    }
}

/// Parses a response body.
///
/// A 100 or 200 response must be JSON (an empty body reads as absent). Any
/// other status still has a non-empty body parsed so structured errors reach
/// the caller; an unparseable error body reads as absent.
fn interpret_body(endpoint: Endpoint, status: u16, text: &str) -> Result<Option<Value>, ClientError> {
    if text.trim().is_empty() {
        return Ok(None);
    }
    match serde_json::from_str(text) {
        Ok(value) => Ok(Some(value)),
        Err(source) if matches!(status, 100 | 200) => {
            Err(ClientError::Deserialize { endpoint, source })
        }
        Err(_) => Ok(None),
    }
}

/// A push succeeded iff the response is a JSON object without `errors`.
fn check_accepted(endpoint: Endpoint, response: &ApiResponse) -> Result<(), ClientError> {
    match &response.body {
        Some(Value::Object(map)) => match map.get("errors") {
            Some(errors) => Err(ClientError::Rejected {
                endpoint,
                errors: errors.clone(),
            }),
            None => Ok(()),
        },
        _ => Err(ClientError::UnexpectedResponse {
            endpoint,
            status: response.status,
        }),
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
#[path = "client_test.rs"]
mod tests;
