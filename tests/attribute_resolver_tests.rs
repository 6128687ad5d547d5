mod common;

use std::sync::Arc;

use serde_json::json;

use catalog_sync_service::clients::TargetStoreClient;
use catalog_sync_service::logging::SyncLogger;
use catalog_sync_service::sync::AttributeResolver;
use catalog_sync_service::Config;

use common::MockTarget;

fn resolver_with(target: &MockTarget, cfg: Config) -> AttributeResolver {
    let logger = Arc::new(SyncLogger::new(true));
    let client = Arc::new(TargetStoreClient::new(&cfg, logger.clone()).expect("client builds"));
    AttributeResolver::new(&cfg, client, logger)
}

fn stage_attribute(target: &MockTarget, id: i64, name: &str, slug: &str) {
    target
        .state
        .attributes
        .lock()
        .unwrap()
        .push(json!({ "id": id, "name": name, "slug": slug }));
}

#[tokio::test]
async fn configured_override_redirects_a_source_name() {
    let target = MockTarget::spawn().await;
    stage_attribute(&target, 1, "Color", "pa_color");

    let mut cfg = Config::for_tests(target.base_url.clone());
    cfg.attribute_name_overrides
        .insert("Boja".to_string(), "Color".to_string());
    let resolver = resolver_with(&target, cfg);

    // Override keys are matched case-insensitively.
    let hit = resolver.resolve_attribute("boja").await.unwrap();
    assert_eq!(hit.map(|a| a.id), Some(1));
}

#[tokio::test]
async fn unmapped_name_matches_by_normalized_name() {
    let target = MockTarget::spawn().await;
    stage_attribute(&target, 2, "Velicina", "pa_velicina");

    let cfg = Config::for_tests(target.base_url.clone());
    let resolver = resolver_with(&target, cfg);

    let hit = resolver.resolve_attribute("VELICINA").await.unwrap();
    assert_eq!(hit.map(|a| a.id), Some(2));
}

#[tokio::test]
async fn terms_resolve_under_their_attribute() {
    let target = MockTarget::spawn().await;
    stage_attribute(&target, 1, "Boja", "pa_boja");
    target
        .state
        .terms
        .lock()
        .unwrap()
        .insert(1, vec![json!({ "id": 9, "name": "Crna", "slug": "crna" })]);

    let cfg = Config::for_tests(target.base_url.clone());
    let resolver = resolver_with(&target, cfg);

    let term = resolver.resolve_term(1, "CRNA").await.unwrap();
    assert_eq!(term.map(|t| t.slug), Some("crna".to_string()));

    let miss = resolver.resolve_term(1, "zelena").await.unwrap();
    assert!(miss.is_none());
}

#[tokio::test]
async fn snapshot_is_reused_within_the_ttl() {
    let target = MockTarget::spawn().await;
    stage_attribute(&target, 1, "Boja", "pa_boja");

    let cfg = Config::for_tests(target.base_url.clone());
    let resolver = resolver_with(&target, cfg);

    resolver.resolve_attribute("boja").await.unwrap();
    resolver.resolve_attribute("boja").await.unwrap();
    assert_eq!(
        target.state.request_count("GET /products/attributes/1/terms"),
        1
    );
}
