//! Derivation of logical stores from merchant configuration.
//!
//! A logical store is one store group in one currency. Each storefront view
//! of the group contributes its id to the language it is localized for.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use async_trait::async_trait;
use feedsync_core::{Currency, Language, StoreConfig};
use regex::Regex;

use crate::error::TopologyError;

const TEST_KEY_PREFIX: &str = "sk_test";
const UNKNOWN_DOMAIN: &str = "unknown";

static DOMAIN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)https?://([^/]+)/?").expect("valid domain regex"));

/// A website and its marketplace settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Website {
    pub id: i64,
    pub code: String,
    pub secret_key: Option<String>,
    /// Merchant opted in to sharing the product feed.
    pub share_feed: bool,
}

/// A storefront view with the settings that shape its logical store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreView {
    pub id: i64,
    pub website_id: i64,
    pub group_id: i64,
    pub group_code: String,
    /// Default storefront view of the group.
    pub default_store_id: i64,
    pub locale: String,
    pub base_url: String,
    pub base_currency: String,
    pub available_currencies: Vec<String>,
    /// Split the group into one logical store per available currency.
    pub local_currency: bool,
    /// At least one compatible payment method is active for this view.
    pub payment_active: bool,
}

/// Source of websites and storefront views.
#[async_trait]
pub trait TopologySource: Send + Sync {
    async fn websites(&self) -> Result<Vec<Website>, TopologyError>;

    async fn store_views(&self) -> Result<Vec<StoreView>, TopologyError>;
}

/// Reads the current topology and derives the logical stores to synchronize.
///
/// # Errors
///
/// Returns [`TopologyError`] if the source cannot be read.
pub async fn configured_stores(
    source: &dyn TopologySource,
) -> Result<BTreeMap<String, StoreConfig>, TopologyError> {
    let websites = source.websites().await?;
    let views = source.store_views().await?;
    Ok(derive_store_configs(&websites, &views))
}

/// Builds the logical stores, keyed by store code.
///
/// Websites take part only with a live secret key and feed sharing enabled.
/// Views take part only when a payment method is active for them. Currencies
/// the marketplace does not accept are skipped.
#[must_use]
pub fn derive_store_configs(
    websites: &[Website],
    views: &[StoreView],
) -> BTreeMap<String, StoreConfig> {
    let keys: BTreeMap<i64, &str> = websites
        .iter()
        .filter(|w| w.share_feed)
        .filter_map(|w| {
            let key = w.secret_key.as_deref()?.trim();
            (!key.is_empty() && !is_test_key(key)).then_some((w.id, key))
        })
        .collect();

    let mut configured: BTreeMap<String, StoreConfig> = BTreeMap::new();
    for view in views {
        let Some(key) = keys.get(&view.website_id) else {
            continue;
        };
        if !view.payment_active {
            continue;
        }
        let language = Language::from_locale(&view.locale);

        let targets: Vec<(String, Currency)> = if view.local_currency {
            let mut currencies: Vec<Currency> = Vec::new();
            for code in &view.available_currencies {
                if let Ok(currency) = code.parse::<Currency>() {
                    if !currencies.contains(&currency) {
                        currencies.push(currency);
                    }
                }
            }
            currencies
                .into_iter()
                .map(|c| (format!("{}_{}", view.group_code, c.code()), c))
                .collect()
        } else {
            match view.base_currency.parse::<Currency>() {
                Ok(currency) => vec![(view.group_code.clone(), currency)],
                Err(_) => {
                    tracing::debug!(
                        store_view = view.id,
                        currency = %view.base_currency,
                        "skipping store view with unsupported base currency"
                    );
                    continue;
                }
            }
        };

        for (code, currency) in targets {
            let config = configured.entry(code.clone()).or_insert_with(|| StoreConfig {
                website_id: Some(view.website_id),
                group_id: view.group_id,
                store_id: view.default_store_id,
                code,
                key: (*key).to_string(),
                domain: store_domain(&view.base_url),
                currency,
                languages: feedsync_core::LanguageStores::new(),
            });
            config.languages.add(language, view.id);
        }
    }
    configured
}

/// Keys issued for sandbox accounts.
#[must_use]
pub fn is_test_key(key: &str) -> bool {
    key.starts_with(TEST_KEY_PREFIX)
}

/// Host part of a storefront base URL, or `unknown`.
#[must_use]
pub fn store_domain(base_url: &str) -> String {
    DOMAIN_RE
        .captures(base_url)
        .and_then(|c| c.get(1))
        .map_or_else(|| UNKNOWN_DOMAIN.to_string(), |m| m.as_str().to_string())
}

#[cfg(test)]
#[path = "topology_test.rs"]
mod tests;
