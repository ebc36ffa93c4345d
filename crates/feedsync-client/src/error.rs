use thiserror::Error;

use crate::Endpoint;

/// Errors returned by the marketplace client.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Network, TLS or timeout failure from the underlying HTTP client.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The response body was not valid JSON.
    #[error("invalid JSON from {endpoint}: {source}")]
    Deserialize {
        endpoint: Endpoint,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to serialize {endpoint} payload: {source}")]
    Serialize {
        endpoint: Endpoint,
        #[source]
        source: serde_json::Error,
    },

    /// The marketplace answered with an `errors` field.
    #[error("marketplace rejected {endpoint} request: {errors}")]
    Rejected {
        endpoint: Endpoint,
        errors: serde_json::Value,
    },

    /// The marketplace answered with something other than a JSON object.
    #[error("unexpected response from {endpoint} (HTTP {status})")]
    UnexpectedResponse { endpoint: Endpoint, status: u16 },

    /// Registration response did not carry a `token`.
    #[error("registration response did not include a token")]
    MissingToken,

    #[error("store token cannot be used as a signing key")]
    InvalidSigningKey,

    #[error("invalid marketplace base URL '{url}': {reason}")]
    InvalidBaseUrl { url: String, reason: String },
}
