use feedsync_client::{ClientError, Endpoint, MockMarketplaceApi};
use feedsync_core::{LockError, StateStore};
use serde_json::json;

use super::*;
use crate::memory::{InMemoryLocks, InMemoryStateStore};
use crate::snapshot::CatalogSnapshot;

const FIXTURE: &str = include_str!("../tests/fixtures/catalog.yaml");
const BACKOFF: i64 = 4 * 60 * 60;

struct Harness {
    service: FeedService,
    state: Arc<InMemoryStateStore>,
    locks: Arc<InMemoryLocks>,
    main: StoreConfig,
}

async fn harness(api: MockMarketplaceApi) -> Harness {
    let snapshot = Arc::new(CatalogSnapshot::from_yaml_str(FIXTURE).expect("fixture should parse"));
    let main = configured_stores(snapshot.as_ref())
        .await
        .unwrap()
        .remove("main")
        .expect("fixture configures main");
    let state = Arc::new(InMemoryStateStore::new());
    let locks = Arc::new(InMemoryLocks::new());
    let service = FeedService::new(
        snapshot.clone(),
        snapshot,
        Arc::new(api),
        state.clone(),
        locks.clone(),
        ServiceSettings {
            lock_wait: Duration::from_millis(50),
            registration_backoff_secs: BACKOFF,
        },
    );
    Harness {
        service,
        state,
        locks,
        main,
    }
}

async fn preregister(h: &Harness, stores: Vec<RegisteredStore>) {
    let registry: Registry = stores
        .into_iter()
        .map(|s| (s.code().to_string(), s))
        .collect();
    h.service
        .queue()
        .save_registered_stores(&registry)
        .await
        .unwrap();
}

fn rejected(endpoint: Endpoint) -> ClientError {
    ClientError::Rejected {
        endpoint,
        errors: json!(["rejected"]),
    }
}

#[tokio::test]
async fn new_store_is_registered_and_its_catalog_synced() {
    let mut api = MockMarketplaceApi::new();
    api.expect_register()
        .withf(|config| config.code == "main")
        .times(1)
        .returning(|_| Ok("tok-main".to_string()));
    api.expect_update_products()
        .withf(|store, records| store.token == "tok-main" && records.len() == 3)
        .times(1)
        .returning(|_, _| Ok(()));
    let h = harness(api).await;

    let report = h.service.on_service_requested_at(1_000).await.unwrap();

    assert_eq!(report.registered, vec!["main"]);
    let main = &report.synced["main"];
    assert_eq!(main.sent, 3);
    assert_eq!(main.invalid, 1);
    assert_eq!(main.dropped, 1);
    assert_eq!(main.pending, 1);

    let registry = h.service.queue().registered_stores().await.unwrap();
    assert_eq!(registry["main"].token, "tok-main");
    assert_eq!(
        h.service.queue().pending("main").await.unwrap(),
        BTreeSet::from([30])
    );
}

#[tokio::test]
async fn failed_registration_backs_off() {
    let mut api = MockMarketplaceApi::new();
    api.expect_register()
        .times(2)
        .returning(|_| Err(ClientError::MissingToken));
    let h = harness(api).await;

    let first = h.service.on_service_requested_at(1_000).await.unwrap();
    assert_eq!(first.registration_failed, vec!["main"]);
    assert_eq!(
        h.state.get("store_main").await.unwrap(),
        Some(json!(1_000))
    );

    let within = h.service.on_service_requested_at(1_000 + BACKOFF).await.unwrap();
    assert_eq!(within.registration_deferred, vec!["main"]);

    let after = h
        .service
        .on_service_requested_at(1_001 + BACKOFF)
        .await
        .unwrap();
    assert_eq!(after.registration_failed, vec!["main"]);
    assert!(h.service.queue().registered_stores().await.unwrap().is_empty());
}

#[tokio::test]
async fn rotated_key_reregisters_in_the_same_pass() {
    let mut api = MockMarketplaceApi::new();
    api.expect_unregister()
        .withf(|store| store.token == "old-tok")
        .times(1)
        .returning(|_| Ok(Some(json!({"status": "uninstalled"}))));
    api.expect_register()
        .times(1)
        .returning(|_| Ok("new-tok".to_string()));
    api.expect_update_products().returning(|_, _| Ok(()));
    let h = harness(api).await;

    let mut stale = h.main.clone();
    stale.key = "sk_live_old".to_string();
    preregister(&h, vec![RegisteredStore::new(stale, "old-tok".to_string())]).await;

    let report = h.service.on_service_requested_at(1_000).await.unwrap();

    assert_eq!(report.rotated, vec!["main"]);
    assert_eq!(report.registered, vec!["main"]);
    let registry = h.service.queue().registered_stores().await.unwrap();
    assert_eq!(registry["main"].token, "new-tok");
    assert_eq!(registry["main"].config.key, "sk_live_base");
}

#[tokio::test]
async fn unconfirmed_unregister_keeps_stale_registration() {
    let mut api = MockMarketplaceApi::new();
    api.expect_unregister()
        .times(1)
        .returning(|_| Ok(Some(json!({"errors": ["unknown merchant"]}))));
    let h = harness(api).await;

    let mut stale = h.main.clone();
    stale.key = "sk_live_old".to_string();
    preregister(&h, vec![RegisteredStore::new(stale, "old-tok".to_string())]).await;

    let report = h.service.on_service_requested_at(1_000).await.unwrap();

    assert_eq!(report.unregister_failed, vec!["main"]);
    assert!(report.registered.is_empty());
    let registry = h.service.queue().registered_stores().await.unwrap();
    assert_eq!(registry["main"].config.key, "sk_live_old");
}

#[tokio::test]
async fn removed_store_is_unregistered_and_forgotten() {
    let mut api = MockMarketplaceApi::new();
    api.expect_unregister()
        .withf(|store| store.code() == "gone")
        .times(1)
        .returning(|_| Ok(Some(json!({}))));
    let h = harness(api).await;

    let mut gone = h.main.clone();
    gone.code = "gone".to_string();
    preregister(
        &h,
        vec![
            RegisteredStore::new(h.main.clone(), "tok".to_string()),
            RegisteredStore::new(gone, "tok-gone".to_string()),
        ],
    )
    .await;
    h.service.queue().add_pending("gone", &[20]).await.unwrap();

    let report = h.service.on_service_requested_at(1_000).await.unwrap();

    assert_eq!(report.unregistered, vec!["gone"]);
    let registry = h.service.queue().registered_stores().await.unwrap();
    assert_eq!(registry.keys().collect::<Vec<_>>(), vec!["main"]);
    assert_eq!(h.state.get("store_gone_products").await.unwrap(), None);
}

#[tokio::test]
async fn removed_store_stays_when_unregister_fails() {
    let mut api = MockMarketplaceApi::new();
    api.expect_unregister()
        .times(1)
        .returning(|_| Err(rejected(Endpoint::Uninstall)));
    let h = harness(api).await;

    let mut gone = h.main.clone();
    gone.code = "gone".to_string();
    preregister(
        &h,
        vec![
            RegisteredStore::new(h.main.clone(), "tok".to_string()),
            RegisteredStore::new(gone, "tok-gone".to_string()),
        ],
    )
    .await;

    let report = h.service.on_service_requested_at(1_000).await.unwrap();

    assert_eq!(report.unregister_failed, vec!["gone"]);
    assert!(h
        .service
        .queue()
        .registered_stores()
        .await
        .unwrap()
        .contains_key("gone"));
}

#[tokio::test]
async fn missing_website_id_is_patched_without_reregistering() {
    let h = harness(MockMarketplaceApi::new()).await;
    let mut legacy = h.main.clone();
    legacy.website_id = None;
    preregister(&h, vec![RegisteredStore::new(legacy, "tok".to_string())]).await;

    let report = h.service.on_service_requested_at(1_000).await.unwrap();

    assert_eq!(report.patched, vec!["main"]);
    let registry = h.service.queue().registered_stores().await.unwrap();
    assert_eq!(registry["main"].config.website_id, Some(1));
    assert_eq!(registry["main"].token, "tok");
}

#[tokio::test]
async fn failed_batch_leaves_ids_pending_for_next_pass() {
    let mut api = MockMarketplaceApi::new();
    api.expect_update_products()
        .times(1)
        .returning(|_, _| Err(rejected(Endpoint::Products)));
    let h = harness(api).await;
    preregister(&h, vec![RegisteredStore::new(h.main.clone(), "tok".to_string())]).await;
    h.service.queue().add_pending("main", &[20]).await.unwrap();

    let report = h.service.on_service_requested_at(1_000).await.unwrap();

    assert_eq!(report.synced["main"].failed_batches, 1);
    assert_eq!(
        h.service.queue().pending("main").await.unwrap(),
        BTreeSet::from([20])
    );
}

#[tokio::test]
async fn pass_fails_when_registry_lock_is_held() {
    let h = harness(MockMarketplaceApi::new()).await;
    let _held = h
        .locks
        .lock("installed_stores_lock", Duration::from_millis(50))
        .await
        .unwrap();

    let err = h.service.on_service_requested_at(1_000).await.unwrap_err();
    assert!(matches!(err, SyncError::Lock(LockError::Timeout { .. })));
}

#[tokio::test]
async fn updated_variant_queues_its_parent() {
    let h = harness(MockMarketplaceApi::new()).await;
    preregister(&h, vec![RegisteredStore::new(h.main.clone(), "tok".to_string())]).await;

    let report = h.service.on_product_updated(11, &[1]).await;
    assert_eq!(report.stores, vec!["main"]);
    h.service.on_product_updated(20, &[1]).await;

    assert_eq!(
        h.service.queue().pending("main").await.unwrap(),
        BTreeSet::from([10, 20])
    );
}

#[tokio::test]
async fn update_on_other_website_touches_nothing() {
    let h = harness(MockMarketplaceApi::new()).await;
    preregister(&h, vec![RegisteredStore::new(h.main.clone(), "tok".to_string())]).await;

    let report = h.service.on_product_updated(50, &[2]).await;
    assert!(report.stores.is_empty());
    assert!(h.service.queue().pending("main").await.unwrap().is_empty());
}

#[tokio::test]
async fn update_is_skipped_when_store_lock_is_busy() {
    let h = harness(MockMarketplaceApi::new()).await;
    preregister(&h, vec![RegisteredStore::new(h.main.clone(), "tok".to_string())]).await;
    let _held = h
        .locks
        .lock("store_main_products_lock", Duration::from_millis(50))
        .await
        .unwrap();

    let report = h.service.on_product_updated(20, &[1]).await;
    assert_eq!(report.skipped, vec!["main"]);
}

#[tokio::test]
async fn deleted_configurable_retires_children_and_dequeues_parent() {
    let mut api = MockMarketplaceApi::new();
    api.expect_send_availability()
        .withf(|_, records| {
            records.iter().map(|r| r.id.as_str()).collect::<Vec<_>>() == ["11", "12"]
                && records.iter().all(|r| !r.is_available)
        })
        .times(1)
        .returning(|_, _| Err(rejected(Endpoint::Availability)));
    let h = harness(api).await;
    preregister(&h, vec![RegisteredStore::new(h.main.clone(), "tok".to_string())]).await;
    h.service.queue().add_pending("main", &[10, 20]).await.unwrap();

    let report = h
        .service
        .on_product_deleted(&DeletedItem {
            id: 10,
            kind: DeletedKind::Configurable {
                children: vec![11, 12],
            },
            website_ids: vec![1],
        })
        .await;

    assert_eq!(report.stores, vec!["main"]);
    assert_eq!(
        h.service.queue().pending("main").await.unwrap(),
        BTreeSet::from([20])
    );
}

#[tokio::test]
async fn deleted_bundle_sends_nothing_but_is_dequeued() {
    let h = harness(MockMarketplaceApi::new()).await;
    preregister(&h, vec![RegisteredStore::new(h.main.clone(), "tok".to_string())]).await;
    h.service.queue().add_pending("main", &[40]).await.unwrap();

    h.service
        .on_product_deleted(&DeletedItem {
            id: 40,
            kind: DeletedKind::Other("bundle".to_string()),
            website_ids: vec![1],
        })
        .await;

    assert!(h.service.queue().pending("main").await.unwrap().is_empty());
}

#[tokio::test]
async fn attribute_reindex_resolves_websites_per_item() {
    let h = harness(MockMarketplaceApi::new()).await;
    preregister(&h, vec![RegisteredStore::new(h.main.clone(), "tok".to_string())]).await;

    let report = h.service.on_product_attributes_updated(&[20, 12, 50, 999]).await;

    assert_eq!(report.stores, vec!["main"]);
    assert_eq!(
        h.service.queue().pending("main").await.unwrap(),
        BTreeSet::from([10, 20])
    );
}

#[tokio::test]
async fn status_lists_registered_stores() {
    let h = harness(MockMarketplaceApi::new()).await;
    preregister(&h, vec![RegisteredStore::new(h.main.clone(), "tok".to_string())]).await;
    h.service.queue().add_pending("main", &[20, 30]).await.unwrap();
    h.service
        .queue()
        .note_registration_failed("main", 42)
        .await
        .unwrap();

    let statuses = h.service.status().await.unwrap();
    assert_eq!(
        statuses,
        vec![StoreStatus {
            code: "main".to_string(),
            website_id: Some(1),
            domain: "shop.example.ae".to_string(),
            currency: "AED".to_string(),
            pending: 2,
            last_registration_failure: Some(42),
        }]
    );
}

#[test]
fn deleted_item_availability_records() {
    let simple = DeletedItem {
        id: 20,
        kind: DeletedKind::Simple,
        website_ids: vec![1],
    };
    assert_eq!(
        simple.availability_records(),
        vec![AvailabilityRecord::unavailable(20)]
    );
}

/// In-memory state whose writes of one key always fail, and its reads too
/// when `reads_fail` is set.
struct BrokenKeyState {
    inner: InMemoryStateStore,
    broken: &'static str,
    reads_fail: bool,
}

impl BrokenKeyState {
    fn check(&self, key: &str) -> Result<(), StateError> {
        if key == self.broken {
            return Err(StateError::Backend(format!("{key} unavailable")));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl StateStore for BrokenKeyState {
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>, StateError> {
        if self.reads_fail {
            self.check(key)?;
        }
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: serde_json::Value) -> Result<(), StateError> {
        self.check(key)?;
        self.inner.set(key, value).await
    }

    async fn delete(&self, key: &str) -> Result<(), StateError> {
        self.check(key)?;
        self.inner.delete(key).await
    }
}

/// The fixture with the sandbox website switched to a live key, so both
/// `main` and `sandbox` are configured.
fn two_store_service(api: MockMarketplaceApi, state: Arc<dyn StateStore>) -> FeedService {
    let yaml = FIXTURE.replace("sk_test_sandbox", "sk_live_sandbox");
    let snapshot = Arc::new(CatalogSnapshot::from_yaml_str(&yaml).expect("fixture should parse"));
    FeedService::new(
        snapshot.clone(),
        snapshot,
        Arc::new(api),
        state,
        Arc::new(InMemoryLocks::new()),
        ServiceSettings {
            lock_wait: Duration::from_millis(50),
            registration_backoff_secs: BACKOFF,
        },
    )
}

#[tokio::test]
async fn unreadable_marker_defers_one_store_and_keeps_the_others() {
    let mut api = MockMarketplaceApi::new();
    api.expect_register()
        .withf(|config| config.code == "main")
        .times(1)
        .returning(|_| Ok("tok-main".to_string()));
    api.expect_update_products().returning(|_, _| Ok(()));
    let service = two_store_service(
        api,
        Arc::new(BrokenKeyState {
            inner: InMemoryStateStore::new(),
            broken: "store_sandbox",
            reads_fail: true,
        }),
    );

    let report = service.on_service_requested_at(1_000).await.unwrap();

    assert_eq!(report.registered, vec!["main"]);
    assert_eq!(report.registration_deferred, vec!["sandbox"]);
    let registry = service.queue().registered_stores().await.unwrap();
    assert_eq!(registry.keys().collect::<Vec<_>>(), vec!["main"]);
    assert_eq!(registry["main"].token, "tok-main");
    assert!(report.synced.contains_key("main"));
}

#[tokio::test]
async fn unwritable_failure_marker_still_completes_the_pass() {
    let mut api = MockMarketplaceApi::new();
    api.expect_register()
        .withf(|config| config.code == "main")
        .times(1)
        .returning(|_| Ok("tok-main".to_string()));
    api.expect_register()
        .withf(|config| config.code == "sandbox")
        .times(1)
        .returning(|_| Err(ClientError::MissingToken));
    api.expect_update_products().returning(|_, _| Ok(()));
    let service = two_store_service(
        api,
        Arc::new(BrokenKeyState {
            inner: InMemoryStateStore::new(),
            broken: "store_sandbox",
            reads_fail: false,
        }),
    );

    let report = service.on_service_requested_at(1_000).await.unwrap();

    assert_eq!(report.registered, vec!["main"]);
    assert_eq!(report.registration_failed, vec!["sandbox"]);
    let registry = service.queue().registered_stores().await.unwrap();
    assert_eq!(registry.keys().collect::<Vec<_>>(), vec!["main"]);
}

#[tokio::test]
async fn failed_initial_seed_is_retried_on_the_next_pass() {
    let mut api = MockMarketplaceApi::new();
    api.expect_register()
        .times(1)
        .returning(|_| Ok("tok-main".to_string()));
    api.expect_update_products()
        .withf(|store, records| store.token == "tok-main" && records.len() == 3)
        .times(1)
        .returning(|_, _| Ok(()));
    let h = harness(api).await;

    let held = h
        .locks
        .lock("store_main_products_lock", Duration::from_millis(50))
        .await
        .unwrap();
    let first = h.service.on_service_requested_at(1_000).await.unwrap();
    drop(held);

    assert_eq!(first.registered, vec!["main"]);
    assert!(first.synced.is_empty());
    let registry = h.service.queue().registered_stores().await.unwrap();
    assert!(registry["main"].initial_sync_pending);

    let second = h.service.on_service_requested_at(1_001).await.unwrap();

    assert!(second.registered.is_empty());
    assert_eq!(second.synced["main"].sent, 3);
    let registry = h.service.queue().registered_stores().await.unwrap();
    assert!(!registry["main"].initial_sync_pending);
}
