//! Manual catalog notifications, for replaying events the webhook missed.

use clap::Subcommand;
use feedsync_core::ItemId;
use feedsync_engine::{DeletedItem, DeletedKind, FeedService, NotifyReport};

/// Sub-commands available under `notify`.
#[derive(Debug, Subcommand)]
pub enum NotifyCommands {
    /// Queue a saved item on the stores of the given websites
    Updated {
        id: ItemId,
        /// Website ids the item is assigned to (comma-separated)
        #[arg(long = "websites", value_delimiter = ',', required = true)]
        website_ids: Vec<i64>,
    },
    /// Mark a deleted item unavailable and drop it from pending sets
    Deleted {
        id: ItemId,
        /// Catalog type code of the deleted item
        #[arg(long = "type", default_value = "simple")]
        kind: String,
        /// Website ids the item was assigned to (comma-separated)
        #[arg(long = "websites", value_delimiter = ',', required = true)]
        website_ids: Vec<i64>,
        /// Variant ids of a deleted configurable item (comma-separated)
        #[arg(long = "children", value_delimiter = ',')]
        child_ids: Vec<ItemId>,
    },
    /// Queue items whose attributes were mass-updated
    Attributes {
        #[arg(required = true, num_args = 1..)]
        ids: Vec<ItemId>,
    },
}

pub(crate) async fn run_notify(service: &FeedService, command: NotifyCommands) -> NotifyReport {
    match command {
        NotifyCommands::Updated { id, website_ids } => {
            service.on_product_updated(id, &website_ids).await
        }
        NotifyCommands::Deleted {
            id,
            kind,
            website_ids,
            child_ids,
        } => {
            let item = DeletedItem {
                id,
                kind: DeletedKind::from_type_code(&kind, child_ids),
                website_ids,
            };
            service.on_product_deleted(&item).await
        }
        NotifyCommands::Attributes { ids } => service.on_product_attributes_updated(&ids).await,
    }
}
