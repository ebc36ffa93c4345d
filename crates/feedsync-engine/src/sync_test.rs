use std::fmt::Write as _;
use std::sync::{Arc, Mutex};

use feedsync_client::{ClientError, Endpoint, MockMarketplaceApi};
use feedsync_core::{Currency, Language, LanguageStores, StoreConfig};
use serde_json::json;

use super::*;
use crate::snapshot::CatalogSnapshot;

const FIXTURE: &str = include_str!("../tests/fixtures/catalog.yaml");

fn registered(code: &str) -> RegisteredStore {
    let mut languages = LanguageStores::new();
    languages.add(Language::Eng, 1);
    RegisteredStore::new(
        StoreConfig {
            website_id: Some(1),
            group_id: 1,
            store_id: 1,
            code: code.to_string(),
            key: "sk_live_base".to_string(),
            domain: "shop.example.ae".to_string(),
            currency: Currency::Aed,
            languages,
        },
        "tok".to_string(),
    )
}

fn fixture_builder() -> FeedBuilder {
    let snapshot = CatalogSnapshot::from_yaml_str(FIXTURE).expect("fixture should parse");
    FeedBuilder::new(Arc::new(snapshot))
}

/// A catalog of `count` valid simple items with ids starting at 1000.
fn bulk_builder(count: i64) -> (FeedBuilder, Vec<ItemId>) {
    let mut yaml = String::from(
        "websites:\n  - id: 1\n    code: base\n    secret_key: sk_live_base\n    share_feed: true\n\
         groups:\n  - id: 1\n    code: main\n    website_id: 1\n    default_store_id: 1\n    root_category_id: 2\n\
         store_views:\n  - id: 1\n    group_id: 1\n    locale: en_US\n    base_url: https://shop.example.ae/\n    base_currency: AED\n    payment_active: true\n\
         products:\n",
    );
    let ids: Vec<ItemId> = (1000..1000 + count).collect();
    for id in &ids {
        writeln!(
            yaml,
            "  - id: {id}\n    type: simple\n    website_ids: [1]\n    price: \"10.00\"\n    media: [https://cdn.example.ae/{id}.jpg]\n    name: Item {id}"
        )
        .unwrap();
    }
    let snapshot = CatalogSnapshot::from_yaml_str(&yaml).expect("generated catalog should parse");
    (FeedBuilder::new(Arc::new(snapshot)), ids)
}

fn rejected() -> ClientError {
    ClientError::Rejected {
        endpoint: Endpoint::Products,
        errors: json!(["signature mismatch"]),
    }
}

#[test]
fn bulk_size_is_a_fifth_within_bounds() {
    assert_eq!(bulk_size(0), 5);
    assert_eq!(bulk_size(3), 5);
    assert_eq!(bulk_size(26), 6);
    assert_eq!(bulk_size(30), 6);
    assert_eq!(bulk_size(499), 100);
    assert_eq!(bulk_size(1000), 100);
    for n in 0..2000 {
        let size = bulk_size(n);
        assert!((MIN_BULK_SIZE..=MAX_BULK_SIZE).contains(&size), "n={n}");
    }
}

#[tokio::test]
async fn accepted_batches_clear_ids_and_invalid_records_stay() {
    let mut api = MockMarketplaceApi::new();
    let sent = Arc::new(Mutex::new(Vec::new()));
    let captured = Arc::clone(&sent);
    api.expect_update_products()
        .times(1)
        .returning(move |_, records| {
            captured
                .lock()
                .unwrap()
                .extend(records.iter().map(|r| r.id.clone()));
            Ok(())
        });

    let outcome = sync_products(&fixture_builder(), &api, &registered("main"), &[10, 20, 30, 40]).await;

    assert_eq!(*sent.lock().unwrap(), vec!["11", "12", "20"]);
    assert_eq!(outcome.residual, BTreeSet::from([30]));
    assert_eq!(outcome.invalid, vec![30]);
    assert_eq!(outcome.dropped, vec![40]);
    assert_eq!(outcome.sent, 3);
    assert_eq!(outcome.batches, 1);
    assert_eq!(outcome.failed_batches, 0);
}

#[tokio::test]
async fn failed_batch_keeps_every_id() {
    let mut api = MockMarketplaceApi::new();
    api.expect_update_products()
        .times(1)
        .returning(|_, _| Err(rejected()));

    let outcome = sync_products(&fixture_builder(), &api, &registered("main"), &[10, 20]).await;

    assert_eq!(outcome.residual, BTreeSet::from([11, 12, 20]));
    assert_eq!(outcome.failed_batches, 1);
    assert_eq!(outcome.sent, 0);
}

#[tokio::test]
async fn second_run_over_empty_residual_is_a_noop() {
    let mut api = MockMarketplaceApi::new();
    api.expect_update_products().times(1).returning(|_, _| Ok(()));
    let builder = fixture_builder();
    let store = registered("main");

    let first = sync_products(&builder, &api, &store, &[10, 20]).await;
    assert!(first.residual.is_empty());

    let again: Vec<ItemId> = first.residual.iter().copied().collect();
    let second = sync_products(&builder, &api, &store, &again).await;
    assert!(second.residual.is_empty());
    assert_eq!(second.batches, 0);
}

#[tokio::test]
async fn records_are_split_into_bulk_sized_batches() {
    let (builder, ids) = bulk_builder(30);
    let sizes = Arc::new(Mutex::new(Vec::new()));
    let captured = Arc::clone(&sizes);
    let mut api = MockMarketplaceApi::new();
    api.expect_update_products()
        .times(5)
        .returning(move |_, records| {
            captured.lock().unwrap().push(records.len());
            Ok(())
        });

    let outcome = sync_products(&builder, &api, &registered("main"), &ids).await;

    assert_eq!(*sizes.lock().unwrap(), vec![6, 6, 6, 6, 6]);
    assert!(outcome.residual.is_empty());
    assert_eq!(outcome.sent, 30);
}

#[tokio::test]
async fn only_the_failed_batch_stays_pending() {
    let (builder, ids) = bulk_builder(12);
    let mut calls = 0;
    let mut api = MockMarketplaceApi::new();
    api.expect_update_products()
        .times(3)
        .returning(move |_, _| {
            calls += 1;
            if calls == 2 {
                Err(rejected())
            } else {
                Ok(())
            }
        });

    let outcome = sync_products(&builder, &api, &registered("main"), &ids).await;

    // 12 ids give batches of 5, 5 and 2; the middle one failed.
    assert_eq!(outcome.residual, (1005..1010).collect::<BTreeSet<_>>());
    assert_eq!(outcome.failed_batches, 1);
    assert_eq!(outcome.sent, 7);
}

#[tokio::test]
async fn nothing_valid_means_no_requests() {
    let api = MockMarketplaceApi::new();
    let outcome = sync_products(&fixture_builder(), &api, &registered("main"), &[30]).await;
    assert_eq!(outcome.residual, BTreeSet::from([30]));
    assert_eq!(outcome.batches, 0);
}
