use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::models::{Result, SourceProduct, SourceVariation};

/// Read access to the source product catalog plus per-entity metadata
/// persistence. This is the boundary to the source store: the engine reads
/// product data through it and records target-id mappings and sync
/// timestamps behind the same interface.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    async fn get_product(&self, product_id: i64) -> Result<Option<SourceProduct>>;

    /// Variations of a variable product, in catalog order.
    async fn get_variations(&self, product_id: i64) -> Result<Vec<SourceVariation>>;

    /// Arbitrary per-entity metadata; used both for custom fields (EAN, SEO)
    /// and for the engine's own mapping keys.
    async fn get_meta(&self, entity_id: i64, key: &str) -> Result<Option<String>>;

    async fn set_meta(&self, entity_id: i64, key: &str, value: &str) -> Result<()>;

    async fn delete_meta(&self, entity_id: i64, key: &str) -> Result<()>;
}

/// In-memory catalog used by tests and the demo wiring in `main`.
#[derive(Default)]
pub struct MemoryCatalog {
    products: Mutex<HashMap<i64, SourceProduct>>,
    variations: Mutex<HashMap<i64, Vec<SourceVariation>>>,
    meta: Mutex<HashMap<(i64, String), String>>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_product(&self, product: SourceProduct) {
        let mut products = self.products.lock().expect("catalog mutex poisoned");
        products.insert(product.id, product);
    }

    pub fn insert_variations(&self, product_id: i64, variations: Vec<SourceVariation>) {
        let mut map = self.variations.lock().expect("catalog mutex poisoned");
        map.insert(product_id, variations);
    }

    pub fn put_meta(&self, entity_id: i64, key: &str, value: &str) {
        let mut meta = self.meta.lock().expect("catalog mutex poisoned");
        meta.insert((entity_id, key.to_string()), value.to_string());
    }
}

#[async_trait]
impl CatalogSource for MemoryCatalog {
    async fn get_product(&self, product_id: i64) -> Result<Option<SourceProduct>> {
        let products = self.products.lock().expect("catalog mutex poisoned");
        Ok(products.get(&product_id).cloned())
    }

    async fn get_variations(&self, product_id: i64) -> Result<Vec<SourceVariation>> {
        let map = self.variations.lock().expect("catalog mutex poisoned");
        Ok(map.get(&product_id).cloned().unwrap_or_default())
    }

    async fn get_meta(&self, entity_id: i64, key: &str) -> Result<Option<String>> {
        let meta = self.meta.lock().expect("catalog mutex poisoned");
        Ok(meta.get(&(entity_id, key.to_string())).cloned())
    }

    async fn set_meta(&self, entity_id: i64, key: &str, value: &str) -> Result<()> {
        let mut meta = self.meta.lock().expect("catalog mutex poisoned");
        meta.insert((entity_id, key.to_string()), value.to_string());
        Ok(())
    }

    async fn delete_meta(&self, entity_id: i64, key: &str) -> Result<()> {
        let mut meta = self.meta.lock().expect("catalog mutex poisoned");
        meta.remove(&(entity_id, key.to_string()));
        Ok(())
    }
}
