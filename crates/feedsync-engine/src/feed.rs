//! Turns catalog items into marketplace feed records for one logical store.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::{Arc, LazyLock};

use feedsync_core::{Attribute, CategoryPath, FeedRecord, ItemId, LanguageBlock, StoreConfig};
use regex::Regex;
use rust_decimal::Decimal;

use crate::catalog::{Catalog, CatalogItem, ItemText, SellableUnits};
use crate::error::CatalogError;
use crate::fallback::first_non_blank;

static MARKUP_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<[^>]*>").expect("valid markup regex"));

/// Result of turning a list of requested ids into records.
#[derive(Debug, Default)]
pub struct BuildOutcome {
    /// Built records keyed by item id, valid or not.
    pub records: BTreeMap<ItemId, FeedRecord>,
    /// The requested ids with configurable parents replaced by their
    /// variants and ids that can never produce a record removed.
    pub working: BTreeSet<ItemId>,
    /// Ids the catalog does not know or whose type is not synchronized.
    pub dropped: Vec<ItemId>,
    /// Ids whose catalog reads failed; they stay in `working`.
    pub deferred: Vec<ItemId>,
}

/// Builds [`FeedRecord`]s from the catalog.
pub struct FeedBuilder {
    catalog: Arc<dyn Catalog>,
}

impl FeedBuilder {
    pub fn new(catalog: Arc<dyn Catalog>) -> Self {
        Self { catalog }
    }

    /// Expands `ids` into sellable units and builds one record per unit.
    ///
    /// Simple items produce their own record, grouped under their configurable
    /// parent when they have one. Configurable items are replaced
    /// in the working set by their variants, each carrying the parent as
    /// `group_id`. Catalog read failures never abort the build; the affected
    /// id is kept for a later attempt.
    pub async fn build_records(&self, store: &StoreConfig, ids: &[ItemId]) -> BuildOutcome {
        let mut outcome = BuildOutcome {
            working: ids.iter().copied().collect(),
            ..BuildOutcome::default()
        };

        let items = match self.catalog.items(store.store_id, ids).await {
            Ok(items) => items,
            Err(e) => {
                tracing::warn!(
                    store = %store.code,
                    count = ids.len(),
                    error = %e,
                    "catalog lookup failed, leaving items pending"
                );
                outcome.deferred = ids.to_vec();
                return outcome;
            }
        };

        let found: HashSet<ItemId> = items.iter().map(|i| i.id).collect();
        for id in ids {
            if !found.contains(id) && outcome.working.remove(id) {
                tracing::debug!(store = %store.code, item = id, "item no longer in catalog");
                outcome.dropped.push(*id);
            }
        }

        for item in &items {
            match item.kind.sellable_units() {
                SellableUnits::Itself => match self.configurable_parent(store, item.id).await {
                    Ok(parent) => {
                        self.push_record(store, item, parent.as_ref(), &mut outcome)
                            .await;
                    }
                    Err(e) => {
                        tracing::warn!(
                            store = %store.code,
                            item = item.id,
                            error = %e,
                            "failed to look up parent, leaving item pending"
                        );
                        outcome.deferred.push(item.id);
                    }
                },
                SellableUnits::Variants(children) => {
                    let variants = match self.catalog.items(store.store_id, children).await {
                        Ok(variants) => variants,
                        Err(e) => {
                            tracing::warn!(
                                store = %store.code,
                                item = item.id,
                                error = %e,
                                "failed to load variants, leaving parent pending"
                            );
                            outcome.deferred.push(item.id);
                            continue;
                        }
                    };
                    outcome.working.remove(&item.id);
                    for variant in &variants {
                        outcome.working.insert(variant.id);
                        self.push_record(store, variant, Some(item), &mut outcome)
                            .await;
                    }
                }
                SellableUnits::Unsupported => {
                    outcome.working.remove(&item.id);
                    outcome.dropped.push(item.id);
                }
            }
        }
        outcome
    }

    /// The configurable item a variant belongs to, so a variant queued on its
    /// own is still sent with its group.
    async fn configurable_parent(
        &self,
        store: &StoreConfig,
        id: ItemId,
    ) -> Result<Option<CatalogItem>, CatalogError> {
        let parent_ids = self.catalog.parent_ids(id).await?;
        if parent_ids.is_empty() {
            return Ok(None);
        }
        let parents = self.catalog.items(store.store_id, &parent_ids).await?;
        Ok(parents
            .into_iter()
            .find(|p| matches!(p.kind.sellable_units(), SellableUnits::Variants(_))))
    }

    async fn push_record(
        &self,
        store: &StoreConfig,
        item: &CatalogItem,
        parent: Option<&CatalogItem>,
        outcome: &mut BuildOutcome,
    ) {
        // Already built as a variant of a requested parent.
        if outcome
            .records
            .get(&item.id)
            .is_some_and(|r| r.group_id.is_some())
        {
            return;
        }
        match self.build_record(store, item, parent).await {
            Ok(record) => {
                outcome.records.insert(item.id, record);
            }
            Err(e) => {
                tracing::warn!(
                    store = %store.code,
                    item = item.id,
                    error = %e,
                    "failed to build feed record, leaving item pending"
                );
                outcome.deferred.push(item.id);
            }
        }
    }

    /// Builds the record for one sellable item.
    ///
    /// # Errors
    ///
    /// Returns the first [`CatalogError`] hit while reading the item.
    pub async fn build_record(
        &self,
        store: &StoreConfig,
        item: &CatalogItem,
        parent: Option<&CatalogItem>,
    ) -> Result<FeedRecord, CatalogError> {
        let is_available = item.salable && self.catalog.in_stock(item.id).await?;

        let mut images = self.images(item.id).await?;
        if images.is_empty() {
            if let Some(parent) = parent {
                images = self.images(parent.id).await?;
            }
        }

        let base_currency = self.catalog.base_currency(store.store_id).await?;
        let price = match item.price {
            Some(amount) => self.render_price(store, &base_currency, amount).await?,
            None => String::new(),
        };
        let sale_price = match item.special_price {
            Some(amount) if !amount.is_zero() => {
                Some(self.render_price(store, &base_currency, amount).await?)
            }
            _ => None,
        };

        let mut languages = BTreeMap::new();
        for (language, store_id) in store.languages.primaries() {
            let block = self.language_block(item, parent, store_id).await?;
            languages.insert(language, block);
        }

        Ok(FeedRecord {
            id: item.id.to_string(),
            group_id: parent.map(|p| p.id.to_string()),
            is_available,
            images,
            price,
            sale_price,
            languages,
        })
    }

    async fn images(&self, id: ItemId) -> Result<Vec<String>, CatalogError> {
        let mut seen = HashSet::new();
        Ok(self
            .catalog
            .media_urls(id)
            .await?
            .into_iter()
            .filter(|url| seen.insert(url.clone()))
            .collect())
    }

    async fn render_price(
        &self,
        store: &StoreConfig,
        base_currency: &str,
        amount: Decimal,
    ) -> Result<String, CatalogError> {
        let converted = self
            .catalog
            .convert(amount, base_currency, store.currency)
            .await?;
        let formatted = self
            .catalog
            .format_price(converted, store.currency, store.store_id)
            .await?;
        Ok(strip_markup(&formatted))
    }

    async fn language_block(
        &self,
        item: &CatalogItem,
        parent: Option<&CatalogItem>,
        store_id: i64,
    ) -> Result<LanguageBlock, CatalogError> {
        let own = self.catalog.text(item.id, store_id).await?;
        let parent_text = match parent {
            Some(p) if needs_parent_text(&own) => Some(self.catalog.text(p.id, store_id).await?),
            _ => None,
        };
        let inherited = parent_text.as_ref();

        let title = first_non_blank([
            own.name.as_deref(),
            inherited.and_then(|t| t.name.as_deref()),
        ]);
        let description = first_non_blank([
            own.description.as_deref(),
            own.short_description.as_deref(),
            inherited.and_then(|t| t.description.as_deref()),
            inherited.and_then(|t| t.short_description.as_deref()),
        ]);

        let mut categories = self.category_paths(&item.category_ids, store_id).await?;
        if categories.is_empty() {
            if let Some(parent) = parent {
                categories = self.category_paths(&parent.category_ids, store_id).await?;
            }
        }
        if categories.is_empty() {
            categories.push(CategoryPath::uncategorized());
        }

        let attributes = self.attributes(item, parent, store_id).await?;
        let link = self
            .catalog
            .product_url(parent.unwrap_or(item).id, store_id)
            .await?;

        Ok(LanguageBlock {
            title,
            description,
            categories,
            attributes,
            link,
        })
    }

    /// Root-to-leaf name paths. Categories missing from the catalog are skipped.
    async fn category_paths(
        &self,
        category_ids: &[i64],
        store_id: i64,
    ) -> Result<Vec<CategoryPath>, CatalogError> {
        let mut paths = Vec::with_capacity(category_ids.len());
        for &category_id in category_ids {
            let mut names = match self.catalog.category_ancestry(category_id, store_id).await {
                Ok(names) => names,
                Err(CatalogError::UnknownCategory(_)) => continue,
                Err(e) => return Err(e),
            };
            if names.is_empty() {
                continue;
            }
            names.reverse();
            paths.push(CategoryPath::Named { path: names });
        }
        Ok(paths)
    }

    /// Variants describe themselves through the parent's configurable
    /// attributes; standalone items through their choice-type custom options.
    async fn attributes(
        &self,
        item: &CatalogItem,
        parent: Option<&CatalogItem>,
        store_id: i64,
    ) -> Result<Vec<Attribute>, CatalogError> {
        if let Some(parent) = parent {
            let mut attributes = Vec::new();
            for code in parent.kind.configurable_attributes() {
                let label = self
                    .catalog
                    .option_label(item.id, code, store_id)
                    .await?
                    .unwrap_or_default();
                attributes.push(Attribute {
                    name: code.clone(),
                    values: vec![label],
                });
            }
            return Ok(attributes);
        }
        Ok(item
            .custom_options
            .iter()
            .filter(|option| option.kind.is_choice())
            .map(|option| Attribute {
                name: option.title.clone(),
                values: option.values.clone(),
            })
            .collect())
    }
}

fn needs_parent_text(own: &ItemText) -> bool {
    let blank = |s: &Option<String>| s.as_deref().is_none_or(|v| v.trim().is_empty());
    blank(&own.name) || (blank(&own.description) && blank(&own.short_description))
}

/// Removes HTML tags from a storefront price rendering.
#[must_use]
pub fn strip_markup(formatted: &str) -> String {
    MARKUP_RE.replace_all(formatted, "").trim().to_string()
}

#[cfg(test)]
#[path = "feed_test.rs"]
mod tests;
