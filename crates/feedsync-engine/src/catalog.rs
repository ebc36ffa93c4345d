//! The merchant catalog as seen by the feed builder.

use async_trait::async_trait;
use feedsync_core::{Currency, ItemId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::CatalogError;

/// Product type of a catalog item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemKind {
    /// Sold as-is.
    Simple,
    /// A parent whose variants are sold instead of the parent itself.
    Configurable {
        children: Vec<ItemId>,
        /// Attribute codes that distinguish the variants, e.g. `color`.
        attributes: Vec<String>,
    },
    /// Any other product type. Never synchronized.
    Other(String),
}

/// What a requested item stands for in the feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SellableUnits<'a> {
    Itself,
    Variants(&'a [ItemId]),
    Unsupported,
}

impl ItemKind {
    #[must_use]
    pub fn sellable_units(&self) -> SellableUnits<'_> {
        match self {
            ItemKind::Simple => SellableUnits::Itself,
            ItemKind::Configurable { children, .. } => SellableUnits::Variants(children),
            ItemKind::Other(_) => SellableUnits::Unsupported,
        }
    }

    #[must_use]
    pub fn configurable_attributes(&self) -> &[String] {
        match self {
            ItemKind::Configurable { attributes, .. } => attributes,
            ItemKind::Simple | ItemKind::Other(_) => &[],
        }
    }
}

/// Custom option input types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptionKind {
    DropDown,
    Multiple,
    Radio,
    Checkbox,
    Field,
    Area,
    File,
    Date,
    DateTime,
    Time,
}

impl OptionKind {
    /// Options the shopper picks from a fixed list of values.
    #[must_use]
    pub fn is_choice(self) -> bool {
        matches!(
            self,
            OptionKind::DropDown | OptionKind::Multiple | OptionKind::Radio | OptionKind::Checkbox
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomOption {
    pub title: String,
    #[serde(rename = "type")]
    pub kind: OptionKind,
    #[serde(default)]
    pub values: Vec<String>,
}

/// One catalog item with its store-independent data.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogItem {
    pub id: ItemId,
    pub kind: ItemKind,
    pub salable: bool,
    /// Base price in the catalog-store's base currency.
    pub price: Option<Decimal>,
    pub special_price: Option<Decimal>,
    pub category_ids: Vec<i64>,
    pub custom_options: Vec<CustomOption>,
}

/// Store-scoped text of an item.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemText {
    pub name: Option<String>,
    pub description: Option<String>,
    pub short_description: Option<String>,
}

/// Read access to the merchant catalog.
///
/// `store_id` arguments name an underlying catalog-store (a storefront view),
/// not a logical marketplace store.
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Items with the given ids visible in `store_id`. Unknown ids are
    /// omitted from the result.
    async fn items(&self, store_id: i64, ids: &[ItemId]) -> Result<Vec<CatalogItem>, CatalogError>;

    /// Every item id visible in `store_id`.
    async fn item_ids(&self, store_id: i64) -> Result<Vec<ItemId>, CatalogError>;

    /// Configurable parents that list `child_id` as a variant.
    async fn parent_ids(&self, child_id: ItemId) -> Result<Vec<ItemId>, CatalogError>;

    /// Websites the item is assigned to, or `None` for an unknown item.
    async fn website_ids(&self, id: ItemId) -> Result<Option<Vec<i64>>, CatalogError>;

    /// Stock-registry flag.
    async fn in_stock(&self, id: ItemId) -> Result<bool, CatalogError>;

    /// Media gallery image URLs in gallery order.
    async fn media_urls(&self, id: ItemId) -> Result<Vec<String>, CatalogError>;

    async fn text(&self, id: ItemId, store_id: i64) -> Result<ItemText, CatalogError>;

    /// Category names from `category_id` up to, but excluding, the root
    /// category of `store_id` (leaf first).
    async fn category_ancestry(
        &self,
        category_id: i64,
        store_id: i64,
    ) -> Result<Vec<String>, CatalogError>;

    /// Display label of the item's value for `attribute_code`.
    async fn option_label(
        &self,
        id: ItemId,
        attribute_code: &str,
        store_id: i64,
    ) -> Result<Option<String>, CatalogError>;

    /// Canonical storefront URL of the item in `store_id`.
    async fn product_url(&self, id: ItemId, store_id: i64) -> Result<String, CatalogError>;

    /// Base currency code of `store_id`. May be a currency the marketplace
    /// does not accept.
    async fn base_currency(&self, store_id: i64) -> Result<String, CatalogError>;

    /// Converts an amount from `from` into `to`.
    async fn convert(
        &self,
        amount: Decimal,
        from: &str,
        to: Currency,
    ) -> Result<Decimal, CatalogError>;

    /// Storefront rendering of an amount. May contain markup.
    async fn format_price(
        &self,
        amount: Decimal,
        currency: Currency,
        store_id: i64,
    ) -> Result<String, CatalogError>;
}
