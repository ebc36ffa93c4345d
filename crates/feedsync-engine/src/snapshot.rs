//! A catalog and store topology loaded from a YAML document.
//!
//! Used by the CLI and server when the merchant catalog is exported as a file,
//! and by tests as a realistic catalog fixture.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use async_trait::async_trait;
use feedsync_core::{Currency, ItemId};
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::catalog::{Catalog, CatalogItem, CustomOption, ItemKind, ItemText};
use crate::error::{CatalogError, SnapshotError, TopologyError};
use crate::topology::{StoreView, TopologySource, Website};

const DEFAULT_PRICE_PATTERN: &str = "{currency} {amount}";

#[derive(Debug, Deserialize)]
struct SnapshotDocument {
    /// Storefront price rendering with `{currency}` and `{amount}` placeholders.
    #[serde(default)]
    price_pattern: Option<String>,
    /// `from` currency → `to` currency → rate.
    #[serde(default)]
    exchange_rates: BTreeMap<String, BTreeMap<String, Decimal>>,
    websites: Vec<WebsiteEntry>,
    groups: Vec<GroupEntry>,
    store_views: Vec<StoreViewEntry>,
    #[serde(default)]
    categories: Vec<CategoryEntry>,
    #[serde(default)]
    products: Vec<ProductEntry>,
}

#[derive(Debug, Clone, Deserialize)]
struct WebsiteEntry {
    id: i64,
    code: String,
    #[serde(default)]
    secret_key: Option<String>,
    #[serde(default)]
    share_feed: bool,
}

#[derive(Debug, Clone, Deserialize)]
struct GroupEntry {
    id: i64,
    code: String,
    website_id: i64,
    default_store_id: i64,
    root_category_id: i64,
}

#[derive(Debug, Clone, Deserialize)]
struct StoreViewEntry {
    id: i64,
    group_id: i64,
    locale: String,
    base_url: String,
    base_currency: String,
    #[serde(default)]
    available_currencies: Vec<String>,
    #[serde(default)]
    local_currency: bool,
    #[serde(default)]
    payment_active: bool,
}

#[derive(Debug, Clone, Deserialize)]
struct CategoryEntry {
    id: i64,
    #[serde(default)]
    parent_id: Option<i64>,
    name: String,
    /// Store view id → localized name.
    #[serde(default)]
    names: BTreeMap<i64, String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct LocalizedEntry {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    short_description: Option<String>,
    #[serde(default)]
    attributes: BTreeMap<String, String>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
struct ProductEntry {
    id: ItemId,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    website_ids: Vec<i64>,
    #[serde(default = "default_true")]
    salable: bool,
    #[serde(default = "default_true")]
    in_stock: bool,
    #[serde(default)]
    price: Option<Decimal>,
    #[serde(default)]
    special_price: Option<Decimal>,
    #[serde(default)]
    media: Vec<String>,
    #[serde(default)]
    category_ids: Vec<i64>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    short_description: Option<String>,
    /// Store view id → overrides.
    #[serde(default)]
    localized: BTreeMap<i64, LocalizedEntry>,
    #[serde(default)]
    url_key: Option<String>,
    #[serde(default)]
    children: Vec<ItemId>,
    #[serde(default)]
    configurable_attributes: Vec<String>,
    /// Attribute code → option label.
    #[serde(default)]
    attributes: BTreeMap<String, String>,
    #[serde(default)]
    custom_options: Vec<CustomOption>,
}

impl ProductEntry {
    fn kind(&self) -> ItemKind {
        match self.kind.as_str() {
            "simple" => ItemKind::Simple,
            "configurable" => ItemKind::Configurable {
                children: self.children.clone(),
                attributes: self.configurable_attributes.clone(),
            },
            other => ItemKind::Other(other.to_string()),
        }
    }

    fn to_item(&self) -> CatalogItem {
        CatalogItem {
            id: self.id,
            kind: self.kind(),
            salable: self.salable,
            price: self.price,
            special_price: self.special_price,
            category_ids: self.category_ids.clone(),
            custom_options: self.custom_options.clone(),
        }
    }
}

/// In-memory catalog and topology parsed from YAML.
#[derive(Debug)]
pub struct CatalogSnapshot {
    price_pattern: String,
    exchange_rates: BTreeMap<String, BTreeMap<String, Decimal>>,
    websites: Vec<WebsiteEntry>,
    groups: BTreeMap<i64, GroupEntry>,
    store_views: BTreeMap<i64, StoreViewEntry>,
    categories: BTreeMap<i64, CategoryEntry>,
    products: BTreeMap<ItemId, ProductEntry>,
}

impl CatalogSnapshot {
    /// Reads and validates a snapshot file.
    ///
    /// # Errors
    ///
    /// Returns [`SnapshotError`] if the file cannot be read, is not valid
    /// YAML, or references groups or websites it does not define.
    pub fn load(path: &Path) -> Result<Self, SnapshotError> {
        let raw = std::fs::read_to_string(path).map_err(|source| SnapshotError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&raw)
    }

    /// # Errors
    ///
    /// Same as [`CatalogSnapshot::load`], minus I/O.
    pub fn from_yaml_str(raw: &str) -> Result<Self, SnapshotError> {
        let doc: SnapshotDocument = serde_yaml::from_str(raw)?;

        let groups: BTreeMap<i64, GroupEntry> =
            doc.groups.into_iter().map(|g| (g.id, g)).collect();
        for group in groups.values() {
            if !doc.websites.iter().any(|w| w.id == group.website_id) {
                return Err(SnapshotError::Invalid(format!(
                    "group {} references unknown website {}",
                    group.id, group.website_id
                )));
            }
        }
        let store_views: BTreeMap<i64, StoreViewEntry> =
            doc.store_views.into_iter().map(|v| (v.id, v)).collect();
        for view in store_views.values() {
            if !groups.contains_key(&view.group_id) {
                return Err(SnapshotError::Invalid(format!(
                    "store view {} references unknown group {}",
                    view.id, view.group_id
                )));
            }
        }

        Ok(Self {
            price_pattern: doc
                .price_pattern
                .unwrap_or_else(|| DEFAULT_PRICE_PATTERN.to_string()),
            exchange_rates: doc.exchange_rates,
            websites: doc.websites,
            groups,
            store_views,
            categories: doc.categories.into_iter().map(|c| (c.id, c)).collect(),
            products: doc.products.into_iter().map(|p| (p.id, p)).collect(),
        })
    }

    fn view(&self, store_id: i64) -> Result<&StoreViewEntry, CatalogError> {
        self.store_views
            .get(&store_id)
            .ok_or(CatalogError::UnknownStore(store_id))
    }

    fn group_of(&self, view: &StoreViewEntry) -> Result<&GroupEntry, CatalogError> {
        self.groups
            .get(&view.group_id)
            .ok_or(CatalogError::UnknownStore(view.id))
    }

    fn product(&self, id: ItemId) -> Result<&ProductEntry, CatalogError> {
        self.products.get(&id).ok_or(CatalogError::ItemNotFound(id))
    }
}

#[async_trait]
impl Catalog for CatalogSnapshot {
    async fn items(&self, _store_id: i64, ids: &[ItemId]) -> Result<Vec<CatalogItem>, CatalogError> {
        Ok(ids
            .iter()
            .filter_map(|id| self.products.get(id))
            .map(ProductEntry::to_item)
            .collect())
    }

    async fn item_ids(&self, store_id: i64) -> Result<Vec<ItemId>, CatalogError> {
        let view = self.view(store_id)?;
        let website_id = self.group_of(view)?.website_id;
        Ok(self
            .products
            .values()
            .filter(|p| p.website_ids.contains(&website_id))
            .map(|p| p.id)
            .collect())
    }

    async fn parent_ids(&self, child_id: ItemId) -> Result<Vec<ItemId>, CatalogError> {
        Ok(self
            .products
            .values()
            .filter(|p| p.kind == "configurable" && p.children.contains(&child_id))
            .map(|p| p.id)
            .collect())
    }

    async fn website_ids(&self, id: ItemId) -> Result<Option<Vec<i64>>, CatalogError> {
        Ok(self.products.get(&id).map(|p| p.website_ids.clone()))
    }

    async fn in_stock(&self, id: ItemId) -> Result<bool, CatalogError> {
        Ok(self.product(id)?.in_stock)
    }

    async fn media_urls(&self, id: ItemId) -> Result<Vec<String>, CatalogError> {
        Ok(self.product(id)?.media.clone())
    }

    async fn text(&self, id: ItemId, store_id: i64) -> Result<ItemText, CatalogError> {
        let product = self.product(id)?;
        let local = product.localized.get(&store_id).cloned().unwrap_or_default();
        Ok(ItemText {
            name: local.name.or_else(|| product.name.clone()),
            description: local.description.or_else(|| product.description.clone()),
            short_description: local
                .short_description
                .or_else(|| product.short_description.clone()),
        })
    }

    async fn category_ancestry(
        &self,
        category_id: i64,
        store_id: i64,
    ) -> Result<Vec<String>, CatalogError> {
        let root = self.group_of(self.view(store_id)?)?.root_category_id;
        let mut names = Vec::new();
        let mut visited = BTreeSet::new();
        let mut current = self
            .categories
            .get(&category_id)
            .ok_or(CatalogError::UnknownCategory(category_id))?;
        while current.id != root {
            let Some(parent_id) = current.parent_id else {
                break;
            };
            if !visited.insert(current.id) {
                return Err(CatalogError::Backend(format!(
                    "category {category_id} has a cyclic parent chain"
                )));
            }
            names.push(
                current
                    .names
                    .get(&store_id)
                    .unwrap_or(&current.name)
                    .clone(),
            );
            match self.categories.get(&parent_id) {
                Some(parent) => current = parent,
                None => break,
            }
        }
        Ok(names)
    }

    async fn option_label(
        &self,
        id: ItemId,
        attribute_code: &str,
        store_id: i64,
    ) -> Result<Option<String>, CatalogError> {
        let product = self.product(id)?;
        Ok(product
            .localized
            .get(&store_id)
            .and_then(|l| l.attributes.get(attribute_code))
            .or_else(|| product.attributes.get(attribute_code))
            .cloned())
    }

    async fn product_url(&self, id: ItemId, store_id: i64) -> Result<String, CatalogError> {
        let product = self.product(id)?;
        let base = self.view(store_id)?.base_url.trim_end_matches('/');
        Ok(match product.url_key.as_deref().filter(|k| !k.is_empty()) {
            Some(key) => format!("{base}/{key}.html"),
            None => format!("{base}/catalog/product/view/id/{id}"),
        })
    }

    async fn base_currency(&self, store_id: i64) -> Result<String, CatalogError> {
        Ok(self.view(store_id)?.base_currency.clone())
    }

    async fn convert(
        &self,
        amount: Decimal,
        from: &str,
        to: Currency,
    ) -> Result<Decimal, CatalogError> {
        if from == to.code() {
            return Ok(amount);
        }
        self.exchange_rates
            .get(from)
            .and_then(|rates| rates.get(to.code()))
            .map(|rate| amount * rate)
            .ok_or_else(|| CatalogError::MissingExchangeRate {
                from: from.to_string(),
                to: to.code().to_string(),
            })
    }

    async fn format_price(
        &self,
        amount: Decimal,
        currency: Currency,
        _store_id: i64,
    ) -> Result<String, CatalogError> {
        let mut rounded = amount.round_dp(currency.minor_units());
        rounded.rescale(currency.minor_units());
        Ok(self
            .price_pattern
            .replace("{currency}", currency.code())
            .replace("{amount}", &rounded.to_string()))
    }
}

#[async_trait]
impl TopologySource for CatalogSnapshot {
    async fn websites(&self) -> Result<Vec<Website>, TopologyError> {
        Ok(self
            .websites
            .iter()
            .map(|w| Website {
                id: w.id,
                code: w.code.clone(),
                secret_key: w.secret_key.clone(),
                share_feed: w.share_feed,
            })
            .collect())
    }

    async fn store_views(&self) -> Result<Vec<StoreView>, TopologyError> {
        self.store_views
            .values()
            .map(|v| {
                let group = self
                    .groups
                    .get(&v.group_id)
                    .ok_or(TopologyError::UnknownGroup(v.group_id))?;
                Ok(StoreView {
                    id: v.id,
                    website_id: group.website_id,
                    group_id: group.id,
                    group_code: group.code.clone(),
                    default_store_id: group.default_store_id,
                    locale: v.locale.clone(),
                    base_url: v.base_url.clone(),
                    base_currency: v.base_currency.clone(),
                    available_currencies: if v.available_currencies.is_empty() {
                        vec![v.base_currency.clone()]
                    } else {
                        v.available_currencies.clone()
                    },
                    local_currency: v.local_currency,
                    payment_active: v.payment_active,
                })
            })
            .collect()
    }
}

#[cfg(test)]
#[path = "snapshot_test.rs"]
mod tests;
