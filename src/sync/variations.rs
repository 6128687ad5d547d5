use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};

use crate::clients::TargetStoreClient;
use crate::config::Config;
use crate::logging::SyncLogger;
use crate::models::{
    RemoteProduct, RemoteVariation, Result, SourceProduct, SourceVariation, SyncError,
    VARIATION_META_KEYS,
};

use super::attributes::AttributeResolver;
use super::images::ImageSynchronizer;
use super::normalize::normalize_sku;
use super::price::PriceConverter;
use super::resolver::EntityResolver;

#[derive(Debug, Default, Clone)]
pub struct VariationOutcome {
    pub matched: usize,
    pub updated: usize,
    pub remote_total: usize,
}

/// Drives variations on the target through four phases: ask the target to
/// generate its variation matrix, wait for the generation to land, fetch the
/// generated set, then match each source variation onto a target one and
/// push its data. Zero matches trigger one regenerate-and-recheck before the
/// configured policy decides between a zero-count completion and a failure.
pub struct VariationSynchronizer {
    client: Arc<TargetStoreClient>,
    resolver: Arc<EntityResolver>,
    attributes: Arc<AttributeResolver>,
    images: Arc<ImageSynchronizer>,
    prices: PriceConverter,
    logger: Arc<SyncLogger>,
    poll_max_attempts: u32,
    poll_base_delay: Duration,
    fail_on_zero_matches: bool,
}

impl VariationSynchronizer {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        cfg: &Config,
        client: Arc<TargetStoreClient>,
        resolver: Arc<EntityResolver>,
        attributes: Arc<AttributeResolver>,
        images: Arc<ImageSynchronizer>,
        prices: PriceConverter,
        logger: Arc<SyncLogger>,
    ) -> Self {
        Self {
            client,
            resolver,
            attributes,
            images,
            prices,
            logger,
            poll_max_attempts: cfg.variation_poll_max_attempts.max(1),
            poll_base_delay: Duration::from_millis(cfg.variation_poll_base_delay_ms),
            fail_on_zero_matches: cfg.fail_on_zero_variation_matches,
        }
    }

    pub async fn sync_variations(
        &self,
        product: &SourceProduct,
        source_variations: &[SourceVariation],
        target: &RemoteProduct,
    ) -> Result<VariationOutcome> {
        if source_variations.is_empty() {
            return Ok(VariationOutcome::default());
        }

        let remote = self.generate_and_fetch(target.id).await?;
        let mut outcome = self
            .match_and_update(product, source_variations, target, &remote)
            .await?;

        if outcome.matched == 0 {
            self.logger.warning(
                "No variations matched, regenerating once",
                json!({ "product_id": product.id, "target_id": target.id, "remote_total": remote.len() }),
            );
            let remote = self.generate_and_fetch(target.id).await?;
            outcome = self
                .match_and_update(product, source_variations, target, &remote)
                .await?;
        }

        if outcome.matched == 0 && self.fail_on_zero_matches {
            return Err(SyncError::Sync(format!(
                "No target variations could be matched for product {}",
                product.id
            )));
        }
        Ok(outcome)
    }

    /// Kick off server-side generation and poll until variations appear.
    /// Sleeps grow linearly with the attempt number; a target still showing
    /// zero variations after the last poll is returned as-is.
    async fn generate_and_fetch(&self, target_id: i64) -> Result<Vec<RemoteVariation>> {
        self.client.generate_variations(target_id).await?;

        for attempt in 1..=self.poll_max_attempts {
            tokio::time::sleep(self.poll_base_delay.saturating_mul(attempt)).await;
            let remote = self.client.list_variations(target_id).await?;
            if !remote.is_empty() {
                if attempt > 1 {
                    self.logger.info(
                        "Variations appeared after polling",
                        json!({ "target_id": target_id, "attempt": attempt, "count": remote.len() }),
                    );
                }
                return Ok(remote);
            }
        }
        Ok(Vec::new())
    }

    async fn match_and_update(
        &self,
        product: &SourceProduct,
        source_variations: &[SourceVariation],
        target: &RemoteProduct,
        remote: &[RemoteVariation],
    ) -> Result<VariationOutcome> {
        let mut outcome = VariationOutcome {
            remote_total: remote.len(),
            ..Default::default()
        };
        if remote.is_empty() {
            return Ok(outcome);
        }

        let parent_sku = normalize_sku(&product.sku);
        let mut claimed: Vec<i64> = Vec::new();

        for source in source_variations {
            let matched = self
                .resolver
                .match_variation(source, &parent_sku, remote)
                .await?;
            let Some(remote_id) = matched else {
                self.logger.warning(
                    "Source variation has no target counterpart",
                    json!({ "variation_id": source.id, "sku": source.sku }),
                );
                continue;
            };
            if claimed.contains(&remote_id) {
                self.logger.warning(
                    "Target variation already claimed in this run",
                    json!({ "variation_id": source.id, "target_variation_id": remote_id }),
                );
                continue;
            }
            claimed.push(remote_id);
            outcome.matched += 1;

            let payload = self.build_payload(product, source, target, &parent_sku).await?;
            match self
                .client
                .update_variation(target.id, remote_id, payload)
                .await
            {
                Ok(updated) => {
                    self.resolver
                        .persist_variation_mapping(source.id, updated.id)
                        .await?;
                    outcome.updated += 1;
                }
                Err(e) => {
                    self.logger.error(
                        "Variation update failed",
                        json!({
                            "variation_id": source.id,
                            "target_variation_id": remote_id,
                            "error": e.to_string(),
                        }),
                    );
                    return Err(e);
                }
            }
        }
        Ok(outcome)
    }

    /// Full variation payload: converted prices, stock, description, weight,
    /// conditional dimensions, resolved attribute bindings, image and
    /// gallery references, and the forwarded meta keys.
    async fn build_payload(
        &self,
        product: &SourceProduct,
        source: &SourceVariation,
        target: &RemoteProduct,
        parent_sku: &str,
    ) -> Result<Value> {
        let mut payload = json!({
            "regular_price": self.prices.convert(&source.regular_price),
            "description": source.description,
            "manage_stock": source.manage_stock,
            "stock_status": source.stock_status.as_str(),
        });
        let body = payload
            .as_object_mut()
            .ok_or_else(|| SyncError::Sync("Payload must be an object".to_string()))?;

        if let Some(sale) = self.prices.convert_opt(&source.sale_price) {
            body.insert("sale_price".to_string(), Value::String(sale));
        }
        if source.manage_stock {
            body.insert("stock_quantity".to_string(), json!(source.stock_quantity));
        }
        if !source.weight.trim().is_empty() {
            body.insert("weight".to_string(), json!(source.weight));
        }
        if source.dimensions.any_axis_set() {
            body.insert(
                "dimensions".to_string(),
                json!({
                    "length": source.dimensions.length.to_string(),
                    "width": source.dimensions.width.to_string(),
                    "height": source.dimensions.height.to_string(),
                }),
            );
        }

        if let Some(sku) = self.usable_sku(source, parent_sku, target).await? {
            body.insert("sku".to_string(), Value::String(sku));
        }

        let attribute_bindings = self.attribute_bindings(&source.attributes).await?;
        if !attribute_bindings.is_empty() {
            body.insert("attributes".to_string(), Value::Array(attribute_bindings));
        }

        if let Some(url) = &source.image_url {
            if let Some(id) = self.images.variation_image_id(url, Some(target)).await {
                body.insert("image".to_string(), json!({ "id": id }));
            }
        }

        let mut meta_data = Vec::new();
        if !source.gallery_urls.is_empty() {
            let mut gallery_ids = Vec::new();
            for url in &source.gallery_urls {
                if let Some(id) = self.images.variation_image_id(url, Some(target)).await {
                    gallery_ids.push(id);
                }
            }
            if !gallery_ids.is_empty() {
                let joined = gallery_ids
                    .iter()
                    .map(|id| id.to_string())
                    .collect::<Vec<_>>()
                    .join(",");
                meta_data.push(json!({ "key": "rtwpvg_images", "value": gallery_ids }));
                meta_data.push(json!({ "key": "_gallery_images", "value": joined }));
            }
        }
        for key in VARIATION_META_KEYS {
            if let Some(value) = source.meta.get(*key) {
                if !value.is_empty() {
                    meta_data.push(json!({ "key": key, "value": value }));
                }
            }
        }
        if let Some(ean) = source.ean() {
            meta_data.push(json!({ "key": "_alg_ean", "value": ean }));
        }
        if !meta_data.is_empty() {
            body.insert("meta_data".to_string(), Value::Array(meta_data));
        }

        Ok(payload)
    }

    /// A variation SKU is only sent when it is non-empty, distinct from the
    /// parent's, and not already claimed by some other product on the
    /// target. `target` is the product being updated; hits under it are not
    /// conflicts.
    async fn usable_sku(
        &self,
        source: &SourceVariation,
        parent_sku: &str,
        target: &RemoteProduct,
    ) -> Result<Option<String>> {
        let normalized = normalize_sku(&source.sku);
        if normalized.is_empty() || normalized == parent_sku {
            return Ok(None);
        }
        let hits = self.client.find_by_sku(&source.sku).await?;
        let conflict = hits
            .iter()
            .any(|h| h.id != target.id && h.parent_id != target.id);
        if conflict {
            self.logger.warning(
                "Variation SKU already in use elsewhere on the target",
                json!({ "variation_id": source.id, "sku": source.sku, "target_id": target.id }),
            );
            return Ok(None);
        }
        Ok(Some(source.sku.trim().to_string()))
    }

    /// Attribute bindings in the target's vocabulary. When the attribute
    /// resolves, the option is rewritten to the registered term's slug so the
    /// target recognizes it; unresolvable names fall back to a plain
    /// name/option pair.
    async fn attribute_bindings(
        &self,
        attributes: &HashMap<String, String>,
    ) -> Result<Vec<Value>> {
        let mut bindings = Vec::new();
        for (key, option) in attributes {
            let raw_name = key.trim_start_matches("pa_");
            match self.attributes.resolve_attribute(raw_name).await? {
                Some(remote_attr) => {
                    let option_value = match self
                        .attributes
                        .resolve_term(remote_attr.id, option)
                        .await?
                    {
                        Some(term) => term.slug,
                        None => option.clone(),
                    };
                    bindings.push(json!({
                        "id": remote_attr.id,
                        "slug": remote_attr.slug,
                        "option": option_value,
                    }));
                }
                None => {
                    bindings.push(json!({ "name": raw_name, "option": option }));
                }
            }
        }
        Ok(bindings)
    }

    /// Stock-only pass: match and push stock fields, nothing else.
    pub async fn sync_variation_stock(
        &self,
        product: &SourceProduct,
        source_variations: &[SourceVariation],
        target: &RemoteProduct,
    ) -> Result<usize> {
        if source_variations.is_empty() {
            return Ok(0);
        }
        let remote = self.client.list_variations(target.id).await?;
        if remote.is_empty() {
            return Ok(0);
        }

        let parent_sku = normalize_sku(&product.sku);
        let mut updated = 0;
        for source in source_variations {
            let Some(remote_id) = self
                .resolver
                .match_variation(source, &parent_sku, &remote)
                .await?
            else {
                continue;
            };
            let mut payload = json!({
                "manage_stock": source.manage_stock,
                "stock_status": source.stock_status.as_str(),
            });
            if source.manage_stock {
                if let Some(body) = payload.as_object_mut() {
                    body.insert("stock_quantity".to_string(), json!(source.stock_quantity));
                }
            }
            self.client
                .update_variation_stock(target.id, remote_id, payload)
                .await?;
            self.resolver
                .persist_variation_mapping(source.id, remote_id)
                .await?;
            updated += 1;
        }
        Ok(updated)
    }
}
