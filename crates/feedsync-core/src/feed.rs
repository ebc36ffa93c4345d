//! Marketplace wire shapes for product and availability pushes.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::Language;

/// Category label used when an item has no category of its own or via its parent.
pub const UNCATEGORIZED: &str = "Uncategorized";

/// One product record as transmitted in a `/products` batch.
///
/// Language blocks are flattened into the record under their language code,
/// so a record with English and Arabic text carries top-level `eng` and `ara`
/// objects next to the price and availability fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedRecord {
    pub id: String,
    #[serde(rename = "group_id", default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
    #[serde(rename = "isAvailable")]
    pub is_available: bool,
    pub images: Vec<String>,
    pub price: String,
    #[serde(rename = "salePrice", default, skip_serializing_if = "Option::is_none")]
    pub sale_price: Option<String>,
    #[serde(flatten)]
    pub languages: BTreeMap<Language, LanguageBlock>,
}

impl FeedRecord {
    /// A record may be transmitted only when it has at least one image and a price.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        !self.images.is_empty() && !self.price.trim().is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LanguageBlock {
    pub title: String,
    pub description: String,
    pub categories: Vec<CategoryPath>,
    pub attributes: Vec<Attribute>,
    pub link: String,
}

/// Root-to-leaf category names, or the single-string fallback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CategoryPath {
    Named { path: Vec<String> },
    Fallback { path: String },
}

impl CategoryPath {
    #[must_use]
    pub fn uncategorized() -> Self {
        CategoryPath::Fallback {
            path: UNCATEGORIZED.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    pub name: String,
    pub values: Vec<String>,
}

/// Entry of an `/availability` push.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilityRecord {
    pub id: String,
    #[serde(rename = "isAvailable")]
    pub is_available: bool,
}

impl AvailabilityRecord {
    #[must_use]
    pub fn unavailable(id: i64) -> Self {
        Self {
            id: id.to_string(),
            is_available: false,
        }
    }
}
