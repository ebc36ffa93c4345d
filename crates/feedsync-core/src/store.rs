//! Logical stores: the unit of registration and synchronization.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{Currency, Language};

/// Catalog-store ids serving each feed language, in discovery order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LanguageStores(BTreeMap<Language, Vec<i64>>);

impl LanguageStores {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `store_id` to the language's list unless it is already there.
    pub fn add(&mut self, language: Language, store_id: i64) {
        let ids = self.0.entry(language).or_default();
        if !ids.contains(&store_id) {
            ids.push(store_id);
        }
    }

    /// The catalog-store used to read text for `language`.
    #[must_use]
    pub fn primary(&self, language: Language) -> Option<i64> {
        self.0.get(&language).and_then(|ids| ids.first().copied())
    }

    /// Languages with at least one catalog-store, paired with their primary id.
    pub fn primaries(&self) -> impl Iterator<Item = (Language, i64)> + '_ {
        self.0
            .iter()
            .filter_map(|(lang, ids)| ids.first().map(|id| (*lang, *id)))
    }

    #[must_use]
    pub fn stores(&self, language: Language) -> &[i64] {
        self.0.get(&language).map_or(&[], Vec::as_slice)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.values().all(Vec::is_empty)
    }
}

/// One synchronization target as derived from merchant configuration.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreConfig {
    /// Absent on records persisted before website tracking was introduced.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website_id: Option<i64>,
    pub group_id: i64,
    /// Default catalog-store of the group; used for catalog listing and prices.
    pub store_id: i64,
    pub code: String,
    pub key: String,
    pub domain: String,
    pub currency: Currency,
    #[serde(default)]
    pub languages: LanguageStores,
}

impl std::fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreConfig")
            .field("website_id", &self.website_id)
            .field("group_id", &self.group_id)
            .field("store_id", &self.store_id)
            .field("code", &self.code)
            .field("key", &"[redacted]")
            .field("domain", &self.domain)
            .field("currency", &self.currency)
            .field("languages", &self.languages)
            .finish()
    }
}

/// A store the marketplace has accepted, together with the token it issued.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisteredStore {
    #[serde(flatten)]
    pub config: StoreConfig,
    pub token: String,
    /// Set at registration, cleared once the whole catalog has been queued.
    #[serde(
        default,
        rename = "initialSyncPending",
        skip_serializing_if = "std::ops::Not::not"
    )]
    pub initial_sync_pending: bool,
}

impl RegisteredStore {
    #[must_use]
    pub fn new(config: StoreConfig, token: String) -> Self {
        Self {
            config,
            token,
            initial_sync_pending: false,
        }
    }

    #[must_use]
    pub fn code(&self) -> &str {
        &self.config.code
    }

    /// Whether catalog changes on `website_id` concern this store.
    #[must_use]
    pub fn serves_website(&self, website_ids: &[i64]) -> bool {
        self.config
            .website_id
            .is_some_and(|id| website_ids.contains(&id))
    }
}

impl std::fmt::Debug for RegisteredStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredStore")
            .field("config", &self.config)
            .field("token", &"[redacted]")
            .field("initial_sync_pending", &self.initial_sync_pending)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_config() -> StoreConfig {
        let mut languages = LanguageStores::new();
        languages.add(Language::Eng, 1);
        languages.add(Language::Ara, 2);
        StoreConfig {
            website_id: Some(1),
            group_id: 1,
            store_id: 1,
            code: "main_AED".to_string(),
            key: "sk_live_secret".to_string(),
            domain: "shop.example.ae".to_string(),
            currency: Currency::Aed,
            languages,
        }
    }

    #[test]
    fn language_stores_add_is_idempotent() {
        let mut stores = LanguageStores::new();
        stores.add(Language::Eng, 3);
        stores.add(Language::Eng, 3);
        stores.add(Language::Eng, 4);
        assert_eq!(stores.stores(Language::Eng), &[3, 4]);
        assert_eq!(stores.primary(Language::Eng), Some(3));
        assert_eq!(stores.primary(Language::Ara), None);
    }

    #[test]
    fn store_config_serializes_camel_case() {
        let json = serde_json::to_value(sample_config()).unwrap();
        assert_eq!(json["websiteId"], 1);
        assert_eq!(json["groupId"], 1);
        assert_eq!(json["storeId"], 1);
        assert_eq!(json["currency"], "AED");
        assert_eq!(json["languages"]["eng"], serde_json::json!([1]));
        assert_eq!(json["languages"]["ara"], serde_json::json!([2]));
    }

    #[test]
    fn registered_store_flattens_config_and_token() {
        let registered = RegisteredStore::new(sample_config(), "tok".to_string());
        let json = serde_json::to_value(&registered).unwrap();
        assert_eq!(json["code"], "main_AED");
        assert_eq!(json["token"], "tok");

        let back: RegisteredStore = serde_json::from_value(json).unwrap();
        assert_eq!(back, registered);
    }

    #[test]
    fn initial_sync_flag_is_persisted_only_while_set() {
        let mut registered = RegisteredStore::new(sample_config(), "tok".to_string());
        let json = serde_json::to_value(&registered).unwrap();
        assert!(json.get("initialSyncPending").is_none());

        registered.initial_sync_pending = true;
        let json = serde_json::to_value(&registered).unwrap();
        assert_eq!(json["initialSyncPending"], true);
        let back: RegisteredStore = serde_json::from_value(json).unwrap();
        assert!(back.initial_sync_pending);
    }

    #[test]
    fn registered_store_without_website_id_deserializes() {
        let json = serde_json::json!({
            "groupId": 1,
            "storeId": 1,
            "code": "main",
            "key": "sk_live_secret",
            "domain": "shop.example.ae",
            "currency": "AED",
            "languages": {"eng": [1]},
            "token": "tok"
        });
        let store: RegisteredStore = serde_json::from_value(json).unwrap();
        assert!(store.config.website_id.is_none());
        assert!(!store.initial_sync_pending);
        assert!(!store.serves_website(&[1]));
    }

    #[test]
    fn debug_output_redacts_secrets() {
        let registered = RegisteredStore::new(sample_config(), "tok-123".to_string());
        let debug = format!("{registered:?}");
        assert!(!debug.contains("sk_live_secret"));
        assert!(!debug.contains("tok-123"));
    }
}
