mod common;

use std::collections::HashMap;
use std::sync::Arc;

use chrono::NaiveDateTime;
use serde_json::json;

use catalog_sync_service::catalog::{CatalogSource, MemoryCatalog};
use catalog_sync_service::logging::SyncLogger;
use catalog_sync_service::models::{
    ProductType, SourceProduct, StepName, StepStatus, StockStatus, SyncAction,
    META_LAST_STOCK_SYNC_DATE, META_LAST_SYNC_DATE, META_SYNCED_PRODUCT_ID,
};
use catalog_sync_service::sync::{SyncEngine, SYNC_DATE_FORMAT};
use catalog_sync_service::Config;

use common::MockTarget;

fn engine_with_catalog(target: &MockTarget) -> (SyncEngine, Arc<MemoryCatalog>) {
    let cfg = Config::for_tests(target.base_url.clone());
    let logger = Arc::new(SyncLogger::new(true));
    let catalog = Arc::new(MemoryCatalog::new());
    let engine = SyncEngine::new(cfg, catalog.clone(), logger).expect("engine builds");
    (engine, catalog)
}

fn simple_product(id: i64, name: &str, sku: &str, image_url: Option<String>) -> SourceProduct {
    SourceProduct {
        id,
        name: name.to_string(),
        sku: sku.to_string(),
        product_type: ProductType::Simple,
        regular_price: "117".to_string(),
        sale_price: String::new(),
        stock_status: StockStatus::InStock,
        manage_stock: true,
        stock_quantity: Some(7),
        description: "Opis".to_string(),
        short_description: String::new(),
        categories: Vec::new(),
        tags: Vec::new(),
        attributes: Vec::new(),
        image_url,
        gallery_urls: Vec::new(),
        weight: String::new(),
        meta: HashMap::new(),
    }
}

#[tokio::test]
async fn creates_a_new_product_with_an_ordered_step_trail() {
    let target = MockTarget::spawn().await;
    let (engine, catalog) = engine_with_catalog(&target);
    catalog.insert_product(simple_product(42, "Jakna", "ABC-1", None));

    let report = engine.full_sync(42, false).await.expect("sync succeeds");
    assert!(report.success);
    assert_eq!(report.action, SyncAction::Created);

    let names: Vec<StepName> = report.steps.iter().map(|s| s.name).collect();
    assert_eq!(
        names,
        vec![
            StepName::Images,
            StepName::Product,
            StepName::Prices,
            StepName::Stock
        ]
    );
    assert!(report
        .steps
        .iter()
        .all(|s| s.status == StepStatus::Completed));

    let mapping = catalog
        .get_meta(42, META_SYNCED_PRODUCT_ID)
        .await
        .unwrap()
        .expect("mapping persisted");
    let target_id: i64 = mapping.parse().unwrap();
    let stored = target.stored_product(target_id).expect("product stored");
    assert_eq!(stored["status"], json!("draft"));
    // 117 at rate 58.5 rounds up to 2.
    assert_eq!(stored["regular_price"], json!("2"));
    assert_eq!(stored["stock_quantity"], json!(7));

    let last_sync = catalog
        .get_meta(42, META_LAST_SYNC_DATE)
        .await
        .unwrap()
        .expect("sync date persisted");
    NaiveDateTime::parse_from_str(&last_sync, SYNC_DATE_FORMAT).expect("date format");
}

#[tokio::test]
async fn updates_an_already_mapped_product() {
    let target = MockTarget::spawn().await;
    target.add_product(json!({ "id": 500, "name": "Staro ime", "sku": "ABC-1" }));
    let (engine, catalog) = engine_with_catalog(&target);
    catalog.insert_product(simple_product(42, "Novo ime", "ABC-1", None));
    catalog.put_meta(42, META_SYNCED_PRODUCT_ID, "500");

    let report = engine.full_sync(42, false).await.expect("sync succeeds");
    assert_eq!(report.action, SyncAction::Updated);

    let stored = target.stored_product(500).expect("product kept");
    assert_eq!(stored["name"], json!("Novo ime"));
    // Draft status applies only to newly created products.
    assert_ne!(stored.get("status"), Some(&json!("draft")));
    assert_eq!(target.state.products.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn stock_sync_refuses_a_never_synced_product() {
    let target = MockTarget::spawn().await;
    let (engine, catalog) = engine_with_catalog(&target);
    catalog.insert_product(simple_product(42, "Jakna", "", None));

    let failure = engine.stock_sync(42).await.unwrap_err();
    assert!(failure.message().contains("full sync"));
    assert_eq!(failure.steps.len(), 1);
    assert_eq!(failure.steps[0].name, StepName::Stock);
    assert_eq!(failure.steps[0].status, StepStatus::Error);
}

#[tokio::test]
async fn stock_sync_updates_stock_and_records_the_date() {
    let target = MockTarget::spawn().await;
    target.add_product(json!({ "id": 500, "name": "Jakna", "sku": "ABC-1" }));
    let (engine, catalog) = engine_with_catalog(&target);
    catalog.insert_product(simple_product(42, "Jakna", "ABC-1", None));
    catalog.put_meta(42, META_SYNCED_PRODUCT_ID, "500");

    let report = engine.stock_sync(42).await.expect("stock sync succeeds");
    assert_eq!(report.action, SyncAction::StockUpdated);
    assert_eq!(target.state.request_count("PUT /products/500"), 1);

    let stored = target.stored_product(500).unwrap();
    assert_eq!(stored["stock_quantity"], json!(7));
    assert_eq!(stored["stock_status"], json!("instock"));

    catalog
        .get_meta(42, META_LAST_STOCK_SYNC_DATE)
        .await
        .unwrap()
        .expect("stock sync date persisted");
}

#[tokio::test]
async fn image_rejection_falls_back_to_a_stripped_write() {
    let target = MockTarget::spawn().await;
    target
        .state
        .reject_product_images
        .store(true, std::sync::atomic::Ordering::SeqCst);
    let (engine, catalog) = engine_with_catalog(&target);
    let image_url = format!("{}/images/front.jpg", target.base_url);
    catalog.insert_product(simple_product(42, "Jakna", "ABC-1", Some(image_url)));

    let report = engine.full_sync(42, false).await.expect("sync succeeds");
    assert_eq!(report.action, SyncAction::Created);

    // The write with images burns its full retry budget (three attempts)
    // before the stripped retry goes through.
    assert_eq!(target.state.request_count("POST /products"), 4);
    let mapping = catalog
        .get_meta(42, META_SYNCED_PRODUCT_ID)
        .await
        .unwrap()
        .unwrap();
    let stored = target.stored_product(mapping.parse().unwrap()).unwrap();
    assert!(stored.get("images").is_none());
}

#[tokio::test]
async fn skip_images_never_touches_the_media_endpoints() {
    let target = MockTarget::spawn().await;
    let (engine, catalog) = engine_with_catalog(&target);
    let image_url = format!("{}/images/front.jpg", target.base_url);
    catalog.insert_product(simple_product(42, "Jakna", "ABC-1", Some(image_url)));

    let report = engine.full_sync(42, true).await.expect("sync succeeds");
    assert!(report.success);
    assert_eq!(target.state.request_count("/media"), 0);
}

#[tokio::test]
async fn variable_product_reports_the_variation_count_in_its_step() {
    let target = MockTarget::spawn().await;
    // The first created product receives id 1000 from the mock.
    target.stage_generated_variations(
        1000,
        vec![
            json!({ "id": 5001, "sku": "", "attributes": [{ "id": 1, "name": "Boja", "slug": "pa_boja", "option": "crna" }] }),
            json!({ "id": 5002, "sku": "", "attributes": [{ "id": 1, "name": "Boja", "slug": "pa_boja", "option": "bijela" }] }),
            json!({ "id": 5003, "sku": "", "attributes": [{ "id": 1, "name": "Boja", "slug": "pa_boja", "option": "plava" }] }),
        ],
        2,
    );

    let (engine, catalog) = engine_with_catalog(&target);
    let mut product = simple_product(42, "Patike", "PAR-1", None);
    product.product_type = ProductType::Variable;
    catalog.insert_product(product);
    catalog.insert_variations(
        42,
        ["Crna", "Bijela", "Plava"]
            .iter()
            .enumerate()
            .map(|(i, color)| {
                let mut attributes = HashMap::new();
                attributes.insert("pa_boja".to_string(), color.to_string());
                catalog_sync_service::models::SourceVariation {
                    id: 421 + i as i64,
                    parent_id: 42,
                    sku: String::new(),
                    attributes,
                    regular_price: "117".to_string(),
                    sale_price: String::new(),
                    stock_status: StockStatus::InStock,
                    manage_stock: false,
                    stock_quantity: None,
                    description: String::new(),
                    dimensions: Default::default(),
                    weight: String::new(),
                    image_url: None,
                    gallery_urls: Vec::new(),
                    meta: HashMap::new(),
                }
            })
            .collect(),
    );

    let report = engine.full_sync(42, false).await.expect("sync succeeds");
    let variations_step = report
        .steps
        .iter()
        .find(|s| s.name == StepName::Variations)
        .expect("variations step present");
    assert_eq!(variations_step.status, StepStatus::Completed);
    assert!(variations_step.message.contains('3'));

    let names: Vec<StepName> = report.steps.iter().map(|s| s.name).collect();
    assert_eq!(
        names,
        vec![
            StepName::Images,
            StepName::Product,
            StepName::Variations,
            StepName::Prices,
            StepName::Stock
        ]
    );
}

#[tokio::test]
async fn prices_and_stock_are_always_the_terminal_steps() {
    let target = MockTarget::spawn().await;
    let (engine, catalog) = engine_with_catalog(&target);
    catalog.insert_product(simple_product(42, "Jakna", "ABC-1", None));

    let report = engine.full_sync(42, false).await.expect("sync succeeds");
    let names: Vec<StepName> = report.steps.iter().map(|s| s.name).collect();
    let len = names.len();
    assert!(len >= 2);
    assert_eq!(names[len - 2], StepName::Prices);
    assert_eq!(names[len - 1], StepName::Stock);
}

#[tokio::test]
async fn guard_releases_between_consecutive_runs() {
    let target = MockTarget::spawn().await;
    let (engine, catalog) = engine_with_catalog(&target);
    catalog.insert_product(simple_product(42, "Jakna", "ABC-1", None));

    engine.full_sync(42, false).await.expect("first run");
    engine.full_sync(42, false).await.expect("second run");
}
