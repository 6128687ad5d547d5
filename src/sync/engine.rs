use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use serde_json::{json, Value};

use crate::catalog::CatalogSource;
use crate::clients::TargetStoreClient;
use crate::config::Config;
use crate::logging::SyncLogger;
use crate::models::{
    RemoteProduct, Result, SourceProduct, StepName, SyncAction, SyncError, SyncFailure,
    SyncReport, SyncStep, META_LAST_STOCK_SYNC_DATE, META_LAST_SYNC_DATE, META_SYNCED_PRODUCT_ID,
    SEO_META_KEYS,
};

use super::attributes::AttributeResolver;
use super::images::ImageSynchronizer;
use super::normalize::normalize_term;
use super::price::PriceConverter;
use super::resolver::EntityResolver;
use super::variations::VariationSynchronizer;

/// Timestamp format stored in the sync-date meta keys.
pub const SYNC_DATE_FORMAT: &str = "%d.%m.%Y. %H:%M";

/// Per-product mutual exclusion. Holding the guard keeps the product id in
/// the shared in-flight set; dropping it releases the slot even when the
/// sync path bails early with `?`.
struct ActiveSyncGuard {
    active: Arc<Mutex<HashSet<i64>>>,
    product_id: i64,
}

impl ActiveSyncGuard {
    fn acquire(active: &Arc<Mutex<HashSet<i64>>>, product_id: i64) -> Option<Self> {
        let mut set = active.lock().ok()?;
        if !set.insert(product_id) {
            return None;
        }
        Some(Self {
            active: active.clone(),
            product_id,
        })
    }
}

impl Drop for ActiveSyncGuard {
    fn drop(&mut self) {
        if let Ok(mut set) = self.active.lock() {
            set.remove(&self.product_id);
        }
    }
}

/// Orchestrates a sync run end to end, recording an ordered step trail that
/// is returned to the caller whether the run succeeds or dies partway.
pub struct SyncEngine {
    config: Config,
    catalog: Arc<dyn CatalogSource>,
    client: Arc<TargetStoreClient>,
    resolver: Arc<EntityResolver>,
    attributes: Arc<AttributeResolver>,
    images: Arc<ImageSynchronizer>,
    variations: VariationSynchronizer,
    prices: PriceConverter,
    logger: Arc<SyncLogger>,
    active: Arc<Mutex<HashSet<i64>>>,
}

impl SyncEngine {
    pub fn new(
        config: Config,
        catalog: Arc<dyn CatalogSource>,
        logger: Arc<SyncLogger>,
    ) -> Result<Self> {
        let client = Arc::new(TargetStoreClient::new(&config, logger.clone())?);
        let resolver = Arc::new(EntityResolver::new(
            client.clone(),
            catalog.clone(),
            logger.clone(),
        ));
        let attributes = Arc::new(AttributeResolver::new(
            &config,
            client.clone(),
            logger.clone(),
        ));
        let images = Arc::new(ImageSynchronizer::new(
            &config,
            client.clone(),
            logger.clone(),
        ));
        let prices = PriceConverter::new(config.exchange_rate);
        let variations = VariationSynchronizer::new(
            &config,
            client.clone(),
            resolver.clone(),
            attributes.clone(),
            images.clone(),
            prices.clone(),
            logger.clone(),
        );
        Ok(Self {
            config,
            catalog,
            client,
            resolver,
            attributes,
            images,
            variations,
            prices,
            logger,
            active: Arc::new(Mutex::new(HashSet::new())),
        })
    }

    pub fn logger(&self) -> Arc<SyncLogger> {
        self.logger.clone()
    }

    pub fn catalog(&self) -> Arc<dyn CatalogSource> {
        self.catalog.clone()
    }

    pub async fn test_connection(&self) -> Result<()> {
        self.client.test_connection().await
    }

    /// Full one-directional sync of one product: images, prices, the
    /// product record itself, then variations for variable products.
    pub async fn full_sync(
        &self,
        product_id: i64,
        skip_images: bool,
    ) -> std::result::Result<SyncReport, SyncFailure> {
        let mut steps = Vec::new();

        let Some(_guard) = ActiveSyncGuard::acquire(&self.active, product_id) else {
            return Err(SyncFailure::new(
                SyncError::Sync(format!("Sync already in progress for product {}", product_id)),
                steps,
            ));
        };

        let product = match self.load_product(product_id).await {
            Ok(p) => p,
            Err(e) => return Err(SyncFailure::new(e, steps)),
        };
        let run_id = uuid::Uuid::new_v4();
        self.logger.info(
            "Starting full sync",
            json!({
                "run_id": run_id.to_string(),
                "product_id": product_id,
                "type": product.product_type.as_str(),
                "skip_images": skip_images,
            }),
        );

        let existing = match self.resolver.resolve_product(&product).await {
            Ok(found) => found,
            Err(e) => return Err(SyncFailure::new(e, steps)),
        };

        // Images.
        let image_ids = if skip_images {
            steps.push(SyncStep::completed(StepName::Images, "Image sync skipped"));
            Vec::new()
        } else {
            steps.push(SyncStep::active(StepName::Images, "Syncing images"));
            match self
                .images
                .sync_product_images(&product, existing.as_ref())
                .await
            {
                Ok(outcome) => {
                    Self::finish_step(
                        &mut steps,
                        SyncStep::completed(
                            StepName::Images,
                            format!(
                                "{} images processed ({} uploaded, {} reused, {} failed)",
                                outcome.total(),
                                outcome.uploaded,
                                outcome.reused,
                                outcome.failed
                            ),
                        ),
                    );
                    outcome.image_ids
                }
                Err(e) => {
                    Self::finish_step(
                        &mut steps,
                        SyncStep::error(StepName::Images, e.user_message()),
                    );
                    return Err(SyncFailure::new(e, steps));
                }
            }
        };

        // Product record.
        steps.push(SyncStep::active(StepName::Product, "Syncing product data"));
        let creating = existing.is_none();
        let payload = match self
            .build_product_payload(&product, creating, &image_ids)
            .await
        {
            Ok(p) => p,
            Err(e) => {
                Self::finish_step(&mut steps, SyncStep::error(StepName::Product, e.user_message()));
                return Err(SyncFailure::new(e, steps));
            }
        };
        let remote = match self.write_product(&existing, payload).await {
            Ok(r) => r,
            Err(e) => {
                Self::finish_step(&mut steps, SyncStep::error(StepName::Product, e.user_message()));
                return Err(SyncFailure::new(e, steps));
            }
        };
        let action = if creating {
            SyncAction::Created
        } else {
            SyncAction::Updated
        };
        Self::finish_step(
            &mut steps,
            SyncStep::completed(
                StepName::Product,
                format!(
                    "Product {} (target id {})",
                    if creating { "created" } else { "updated" },
                    remote.id
                ),
            ),
        );

        if let Err(e) = self.persist_product_meta(product_id, remote.id).await {
            return Err(SyncFailure::new(e, steps));
        }

        // Variations.
        if product.is_variable() {
            steps.push(SyncStep::active(StepName::Variations, "Syncing variations"));
            let source_variations = match self.catalog.get_variations(product_id).await {
                Ok(v) => v,
                Err(e) => {
                    Self::finish_step(
                        &mut steps,
                        SyncStep::error(StepName::Variations, e.user_message()),
                    );
                    return Err(SyncFailure::new(e, steps));
                }
            };
            match self
                .variations
                .sync_variations(&product, &source_variations, &remote)
                .await
            {
                Ok(outcome) => {
                    Self::finish_step(
                        &mut steps,
                        SyncStep::completed(
                            StepName::Variations,
                            format!(
                                "{} variations matched, {} updated",
                                outcome.matched, outcome.updated
                            ),
                        ),
                    );
                }
                Err(e) => {
                    Self::finish_step(
                        &mut steps,
                        SyncStep::error(StepName::Variations, e.user_message()),
                    );
                    return Err(SyncFailure::new(e, steps));
                }
            }
        }

        // Prices and stock travel inside the payloads above; their steps are
        // terminal markers in the trail.
        steps.push(SyncStep::completed(
            StepName::Prices,
            format!("Prices converted at rate {}", self.config.exchange_rate),
        ));
        steps.push(SyncStep::completed(
            StepName::Stock,
            "Stock fields synced with the product data",
        ));

        self.logger.success(
            "Full sync finished",
            json!({
                "run_id": run_id.to_string(),
                "product_id": product_id,
                "target_id": remote.id,
                "action": format!("{:?}", action),
            }),
        );
        Ok(SyncReport {
            success: true,
            action,
            steps,
        })
    }

    /// Stock-only sync. Requires a resolvable target product; a product
    /// never synced before is an error, not an implicit full sync.
    pub async fn stock_sync(
        &self,
        product_id: i64,
    ) -> std::result::Result<SyncReport, SyncFailure> {
        let mut steps = Vec::new();

        let Some(_guard) = ActiveSyncGuard::acquire(&self.active, product_id) else {
            return Err(SyncFailure::new(
                SyncError::Sync(format!("Sync already in progress for product {}", product_id)),
                steps,
            ));
        };

        let product = match self.load_product(product_id).await {
            Ok(p) => p,
            Err(e) => return Err(SyncFailure::new(e, steps)),
        };

        steps.push(SyncStep::active(StepName::Stock, "Updating stock"));
        let remote = match self.resolver.resolve_product(&product).await {
            Ok(Some(r)) => r,
            Ok(None) => {
                let e = SyncError::Validation(format!(
                    "Product {} has never been synced; run a full sync first",
                    product_id
                ));
                Self::finish_step(&mut steps, SyncStep::error(StepName::Stock, e.user_message()));
                return Err(SyncFailure::new(e, steps));
            }
            Err(e) => {
                Self::finish_step(&mut steps, SyncStep::error(StepName::Stock, e.user_message()));
                return Err(SyncFailure::new(e, steps));
            }
        };

        let mut payload = json!({
            "manage_stock": product.manage_stock,
            "stock_status": product.stock_status.as_str(),
        });
        if product.manage_stock {
            if let Some(body) = payload.as_object_mut() {
                body.insert("stock_quantity".to_string(), json!(product.stock_quantity));
            }
        }

        let result: Result<usize> = async {
            self.client.update_product_stock(remote.id, payload).await?;
            let mut variation_count = 0;
            if product.is_variable() {
                let source_variations = self.catalog.get_variations(product_id).await?;
                variation_count = self
                    .variations
                    .sync_variation_stock(&product, &source_variations, &remote)
                    .await?;
            }
            self.catalog
                .set_meta(
                    product_id,
                    META_LAST_STOCK_SYNC_DATE,
                    &Utc::now().format(SYNC_DATE_FORMAT).to_string(),
                )
                .await?;
            Ok(variation_count)
        }
        .await;

        match result {
            Ok(variation_count) => {
                Self::finish_step(
                    &mut steps,
                    SyncStep::completed(
                        StepName::Stock,
                        format!("Stock updated ({} variations)", variation_count),
                    ),
                );
                self.logger.success(
                    "Stock sync finished",
                    json!({ "product_id": product_id, "target_id": remote.id, "variations": variation_count }),
                );
                Ok(SyncReport {
                    success: true,
                    action: SyncAction::StockUpdated,
                    steps,
                })
            }
            Err(e) => {
                Self::finish_step(&mut steps, SyncStep::error(StepName::Stock, e.user_message()));
                Err(SyncFailure::new(e, steps))
            }
        }
    }

    async fn load_product(&self, product_id: i64) -> Result<SourceProduct> {
        self.catalog
            .get_product(product_id)
            .await?
            .ok_or_else(|| SyncError::Validation(format!("Product {} not found", product_id)))
    }

    async fn persist_product_meta(&self, product_id: i64, target_id: i64) -> Result<()> {
        self.catalog
            .set_meta(product_id, META_SYNCED_PRODUCT_ID, &target_id.to_string())
            .await?;
        self.catalog
            .set_meta(
                product_id,
                META_LAST_SYNC_DATE,
                &Utc::now().format(SYNC_DATE_FORMAT).to_string(),
            )
            .await
    }

    /// Create or update the product record. A write that fails on an
    /// image-related error is retried once with the image list stripped;
    /// a product without images beats no product at all.
    async fn write_product(
        &self,
        existing: &Option<RemoteProduct>,
        payload: Value,
    ) -> Result<RemoteProduct> {
        let had_images = payload.get("images").is_some();
        let first = match existing {
            Some(remote) => self.client.update_product(remote.id, payload.clone()).await,
            None => self.client.create_product(payload.clone()).await,
        };
        match first {
            Ok(remote) => Ok(remote),
            Err(e) if had_images && Self::looks_image_related(&e) => {
                self.logger.warning(
                    "Product write failed on images, retrying without them",
                    json!({ "error": e.to_string() }),
                );
                let mut stripped = payload;
                if let Some(body) = stripped.as_object_mut() {
                    body.remove("images");
                }
                match existing {
                    Some(remote) => self.client.update_product(remote.id, stripped).await,
                    None => self.client.create_product(stripped).await,
                }
            }
            Err(e) => Err(e),
        }
    }

    fn looks_image_related(error: &SyncError) -> bool {
        let text = error.to_string().to_lowercase();
        text.contains("image") || text.contains("attachment") || text.contains("media")
    }

    fn finish_step(steps: &mut [SyncStep], step: SyncStep) {
        if let Some(last) = steps.last_mut() {
            *last = step;
        }
    }

    // -- payload building ---------------------------------------------------

    async fn build_product_payload(
        &self,
        product: &SourceProduct,
        creating: bool,
        image_ids: &[i64],
    ) -> Result<Value> {
        let mut payload = json!({
            "name": product.name,
            "type": product.product_type.as_str(),
            "regular_price": self.prices.convert(&product.regular_price),
            "description": product.description,
            "short_description": product.short_description,
            "manage_stock": product.manage_stock,
            "stock_status": product.stock_status.as_str(),
        });
        let body = payload
            .as_object_mut()
            .ok_or_else(|| SyncError::Sync("Payload must be an object".to_string()))?;

        if creating {
            body.insert("status".to_string(), json!("draft"));
        }
        if !product.sku.trim().is_empty() {
            body.insert("sku".to_string(), json!(product.sku.trim()));
        }
        if let Some(sale) = self.prices.convert_opt(&product.sale_price) {
            body.insert("sale_price".to_string(), Value::String(sale));
        }
        if product.manage_stock {
            body.insert("stock_quantity".to_string(), json!(product.stock_quantity));
        }
        if !product.weight.trim().is_empty() {
            body.insert("weight".to_string(), json!(product.weight));
        }

        let categories = self.resolve_categories(product).await?;
        if !categories.is_empty() {
            body.insert("categories".to_string(), Value::Array(categories));
        }
        if !product.tags.is_empty() {
            let tags: Vec<Value> = product
                .tags
                .iter()
                .map(|t| json!({ "name": t.name, "slug": t.slug }))
                .collect();
            body.insert("tags".to_string(), Value::Array(tags));
        }

        let attributes = self.resolve_product_attributes(product).await?;
        if !attributes.is_empty() {
            body.insert("attributes".to_string(), Value::Array(attributes));
        }

        if !image_ids.is_empty() {
            let images: Vec<Value> = image_ids
                .iter()
                .enumerate()
                .map(|(position, id)| json!({ "id": id, "position": position }))
                .collect();
            body.insert("images".to_string(), Value::Array(images));
        }

        let mut meta_data = Vec::new();
        for key in SEO_META_KEYS {
            if let Some(value) = product.meta.get(*key) {
                if !value.is_empty() {
                    meta_data.push(json!({ "key": key, "value": value }));
                }
            }
        }
        if let Some(ean) = product.ean() {
            meta_data.push(json!({ "key": "_alg_ean", "value": ean }));
        }
        if !meta_data.is_empty() {
            body.insert("meta_data".to_string(), Value::Array(meta_data));
        }

        Ok(payload)
    }

    /// Category references for the payload. Slug lookup first, then a name
    /// search accepting an exact normalized match, then a bare name/slug
    /// pair the target may use to create the category.
    async fn resolve_categories(&self, product: &SourceProduct) -> Result<Vec<Value>> {
        let mut out = Vec::new();
        for category in &product.categories {
            if let Some(remote) = self.client.get_category_by_slug(&category.slug).await? {
                out.push(json!({ "id": remote.id }));
                continue;
            }
            let hits = self.client.search_categories(&category.name).await?;
            if let Some(remote) = hits
                .iter()
                .find(|c| normalize_term(&c.name) == normalize_term(&category.name))
            {
                out.push(json!({ "id": remote.id }));
                continue;
            }
            self.logger.info(
                "Category not found on target, sending name and slug",
                json!({ "name": category.name, "slug": category.slug }),
            );
            out.push(json!({ "name": category.name, "slug": category.slug }));
        }
        Ok(out)
    }

    async fn resolve_product_attributes(&self, product: &SourceProduct) -> Result<Vec<Value>> {
        let mut out = Vec::new();
        for attribute in &product.attributes {
            let raw_name = attribute.raw_name();
            let resolved = self.attributes.resolve_attribute(&raw_name).await?;
            let mut entry = match resolved {
                Some(remote) => json!({ "id": remote.id }),
                None => json!({ "name": attribute.name }),
            };
            if let Some(body) = entry.as_object_mut() {
                body.insert("position".to_string(), json!(attribute.position));
                body.insert("visible".to_string(), json!(true));
                body.insert("variation".to_string(), json!(attribute.variation));
                body.insert("options".to_string(), json!(attribute.options));
            }
            out.push(entry);
        }
        Ok(out)
    }
}
