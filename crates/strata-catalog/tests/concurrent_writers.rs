//! Concurrent indexing against one shared store: duplicate-insert races
//! resolve at the uniqueness constraint, first writer wins, losers no-op.

use std::sync::Arc;

use serde_json::json;

use strata_catalog::memory::MemoryStore;
use strata_catalog::{Catalog, Dataset, Query};
use strata_core::DatasetId;

async fn shared_catalog() -> Arc<Catalog> {
    let catalog = Catalog::new(Arc::new(MemoryStore::new()));
    catalog
        .products()
        .add_document(&json!({
            "name": "scenes",
            "metadata_type": {
                "name": "eo",
                "dataset": {
                    "search_fields": {
                        "platform": { "offset": ["platform", "code"] }
                    }
                }
            }
        }))
        .await
        .expect("product registers");
    Arc::new(catalog)
}

async fn scene(catalog: &Catalog, id: DatasetId) -> Dataset {
    let product = catalog
        .products()
        .get_by_name("scenes")
        .await
        .expect("lookup")
        .expect("registered");
    Dataset::new(
        id,
        product,
        json!({
            "platform": { "code": "LANDSAT_8" },
            "lineage": { "source_datasets": {} }
        }),
        None,
    )
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_adds_of_the_same_dataset_leave_one_record() {
    let catalog = shared_catalog().await;
    let id = DatasetId::generate();
    let dataset = scene(&catalog, id).await;

    let mut handles = Vec::new();
    for _ in 0..8 {
        let catalog = Arc::clone(&catalog);
        let dataset = dataset.clone();
        handles.push(tokio::spawn(async move {
            catalog.datasets().add(&dataset, false).await
        }));
    }
    for handle in handles {
        handle
            .await
            .expect("task completes")
            .expect("losing the race is not an error");
    }

    let count = catalog
        .datasets()
        .count(&Query::new().with_product("scenes"))
        .await
        .expect("count");
    assert_eq!(count, 1, "exactly one record survives the race");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn independent_concurrent_adds_all_land() {
    let catalog = shared_catalog().await;

    let mut handles = Vec::new();
    for _ in 0..16 {
        let catalog = Arc::clone(&catalog);
        handles.push(tokio::spawn(async move {
            let dataset = scene(&catalog, DatasetId::generate()).await;
            catalog.datasets().add(&dataset, false).await.map(|()| dataset.id)
        }));
    }
    let mut ids = Vec::new();
    for handle in handles {
        ids.push(
            handle
                .await
                .expect("task completes")
                .expect("independent adds succeed"),
        );
    }

    for id in ids {
        assert!(catalog.datasets().has(id).await.expect("has"));
    }
    let count = catalog
        .datasets()
        .count(&Query::new().with_product("scenes"))
        .await
        .expect("count");
    assert_eq!(count, 16);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_product_registration_is_idempotent() {
    let catalog = shared_catalog().await;

    let mut handles = Vec::new();
    for _ in 0..4 {
        let catalog = Arc::clone(&catalog);
        handles.push(tokio::spawn(async move {
            catalog
                .products()
                .add_document(&json!({
                    "name": "nbar_scenes",
                    "metadata_type": "eo"
                }))
                .await
        }));
    }

    let mut ids = Vec::new();
    for handle in handles {
        // Re-registration with an unchanged definition is a no-op; a racer
        // may still lose at the store's name constraint, which surfaces as
        // a storage error rather than corrupt state.
        if let Ok(product) = handle.await.expect("task completes") {
            ids.push(product.id());
        }
    }
    assert!(!ids.is_empty());
    assert!(ids.windows(2).all(|pair| pair[0] == pair[1]));
}
