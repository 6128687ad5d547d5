use std::collections::HashMap;
use std::sync::Arc;

use serde_json::json;

use crate::catalog::CatalogSource;
use crate::clients::TargetStoreClient;
use crate::logging::SyncLogger;
use crate::models::{
    RemoteProduct, RemoteVariation, RemoteVariationAttribute, Result, SourceProduct,
    SourceVariation, META_SYNCED_PRODUCT_ID, META_SYNCED_VARIATION_ID,
};

use super::normalize::{normalize_sku, normalize_term, slugify, transliterate};

/// Minimum share of a source variation's attributes that must match a
/// target variation before the two are considered the same entity.
const ATTRIBUTE_OVERLAP_THRESHOLD: f64 = 0.7;

/// Finds the target-side counterpart of a source product or variation.
/// Product resolution runs a fixed strategy chain, cheapest first; whichever
/// strategy hits, the mapping is persisted so the next run starts at the
/// cache. A miss on every strategy means the product does not exist yet.
pub struct EntityResolver {
    client: Arc<TargetStoreClient>,
    catalog: Arc<dyn CatalogSource>,
    logger: Arc<SyncLogger>,
}

impl EntityResolver {
    pub fn new(
        client: Arc<TargetStoreClient>,
        catalog: Arc<dyn CatalogSource>,
        logger: Arc<SyncLogger>,
    ) -> Self {
        Self {
            client,
            catalog,
            logger,
        }
    }

    pub async fn resolve_product(&self, product: &SourceProduct) -> Result<Option<RemoteProduct>> {
        // 1. Persisted mapping, revalidated against the target. A stale id
        //    is deleted so later strategies (and future runs) start clean.
        if let Some(raw) = self
            .catalog
            .get_meta(product.id, META_SYNCED_PRODUCT_ID)
            .await?
        {
            if let Ok(mapped_id) = raw.parse::<i64>() {
                if let Some(remote) = self.client.get_product(mapped_id).await? {
                    return Ok(Some(remote));
                }
                self.logger.warning(
                    "Stored mapping points at a deleted target product",
                    json!({ "product_id": product.id, "mapped_id": mapped_id }),
                );
                self.catalog
                    .delete_meta(product.id, META_SYNCED_PRODUCT_ID)
                    .await?;
            }
        }

        // 2. Same numeric id on the target, accepted only when SKU or name
        //    agrees. Id collisions across unrelated catalogs are real.
        if let Some(candidate) = self.client.get_product(product.id).await? {
            if Self::same_identity(product, &candidate) {
                self.persist_mapping(product.id, candidate.id).await?;
                return Ok(Some(candidate));
            }
        }

        // 3. Exact normalized SKU.
        let own_sku = normalize_sku(&product.sku);
        if !own_sku.is_empty() {
            let hits = self.client.find_by_sku(&product.sku).await?;
            if let Some(hit) = hits
                .into_iter()
                .find(|h| h.parent_id == 0 && normalize_sku(&h.sku) == own_sku)
            {
                self.persist_mapping(product.id, hit.id).await?;
                return Ok(Some(hit));
            }
        }

        // 4. Variation SKU leading to a parent, for variable products whose
        //    own SKU is absent or changed but whose variations kept theirs.
        if product.is_variable() {
            if let Some(remote) = self.resolve_via_variation_skus(product).await? {
                self.persist_mapping(product.id, remote.id).await?;
                return Ok(Some(remote));
            }
        }

        // 5. Name search, accepting only an exact case-insensitive match on
        //    the top product-level hit.
        let hits = self.client.search_products(&product.name).await?;
        if let Some(top) = hits.into_iter().find(|h| h.parent_id == 0) {
            if top.name.to_lowercase() == product.name.to_lowercase() {
                self.persist_mapping(product.id, top.id).await?;
                return Ok(Some(top));
            }
        }

        Ok(None)
    }

    async fn resolve_via_variation_skus(
        &self,
        product: &SourceProduct,
    ) -> Result<Option<RemoteProduct>> {
        let variations = self.catalog.get_variations(product.id).await?;
        for variation in variations {
            let sku = normalize_sku(&variation.sku);
            if sku.is_empty() {
                continue;
            }
            let hits = self.client.find_by_sku(&variation.sku).await?;
            if let Some(hit) = hits
                .iter()
                .find(|h| h.parent_id != 0 && normalize_sku(&h.sku) == sku)
            {
                if let Some(parent) = self.client.get_product(hit.parent_id).await? {
                    self.logger.info(
                        "Resolved product through a variation SKU",
                        json!({
                            "product_id": product.id,
                            "variation_sku": variation.sku,
                            "target_id": parent.id,
                        }),
                    );
                    return Ok(Some(parent));
                }
            }
        }
        Ok(None)
    }

    fn same_identity(product: &SourceProduct, candidate: &RemoteProduct) -> bool {
        let source_sku = normalize_sku(&product.sku);
        let remote_sku = normalize_sku(&candidate.sku);
        if !source_sku.is_empty() && !remote_sku.is_empty() {
            return source_sku == remote_sku;
        }
        candidate.name.to_lowercase() == product.name.to_lowercase()
    }

    async fn persist_mapping(&self, source_id: i64, target_id: i64) -> Result<()> {
        self.catalog
            .set_meta(source_id, META_SYNCED_PRODUCT_ID, &target_id.to_string())
            .await
    }

    /// Target variation id for a source variation. SKU wins, then the
    /// persisted per-variation mapping, then attribute overlap. SKUs equal
    /// to the parent's are treated as absent; such catalogs reuse the parent
    /// SKU as a placeholder.
    pub async fn match_variation(
        &self,
        source: &SourceVariation,
        parent_normalized_sku: &str,
        remote_variations: &[RemoteVariation],
    ) -> Result<Option<i64>> {
        let sku = normalize_sku(&source.sku);
        if !sku.is_empty() && sku != parent_normalized_sku {
            if let Some(remote) = remote_variations
                .iter()
                .find(|rv| normalize_sku(&rv.sku) == sku)
            {
                return Ok(Some(remote.id));
            }
        }

        if let Some(raw) = self
            .catalog
            .get_meta(source.id, META_SYNCED_VARIATION_ID)
            .await?
        {
            if let Ok(mapped_id) = raw.parse::<i64>() {
                if remote_variations.iter().any(|rv| rv.id == mapped_id) {
                    return Ok(Some(mapped_id));
                }
                self.catalog
                    .delete_meta(source.id, META_SYNCED_VARIATION_ID)
                    .await?;
            }
        }

        let mut best: Option<(i64, f64)> = None;
        for remote in remote_variations {
            let score = attribute_overlap(&source.attributes, &remote.attributes);
            let better = match best {
                Some((_, best_score)) => score > best_score,
                None => true,
            };
            if better {
                best = Some((remote.id, score));
            }
        }
        match best {
            Some((id, score)) if score >= ATTRIBUTE_OVERLAP_THRESHOLD => Ok(Some(id)),
            _ => Ok(None),
        }
    }

    pub async fn persist_variation_mapping(&self, source_id: i64, target_id: i64) -> Result<()> {
        self.catalog
            .set_meta(source_id, META_SYNCED_VARIATION_ID, &target_id.to_string())
            .await
    }
}

/// Accepted spellings of a variation attribute key: the key itself, the bare
/// slug, and the `pa_`-prefixed forms of both the slug and its ASCII
/// transliteration.
fn key_variants(key: &str) -> Vec<String> {
    let base = key.trim().to_lowercase();
    let stripped = base.strip_prefix("pa_").unwrap_or(&base).to_string();
    let translit = transliterate(&stripped);
    let mut variants = vec![
        base,
        stripped.clone(),
        format!("pa_{}", stripped),
        format!("pa_{}", translit),
        translit,
    ];
    variants.sort();
    variants.dedup();
    variants
}

fn keys_match(source_key: &str, remote: &RemoteVariationAttribute) -> bool {
    let source_variants = key_variants(source_key);
    let remote_variants = key_variants(remote.slug_or_name());
    source_variants
        .iter()
        .any(|sv| remote_variants.contains(sv))
}

fn options_match(source_value: &str, remote_option: &str) -> bool {
    normalize_term(source_value) == normalize_term(remote_option)
        || slugify(source_value) == slugify(remote_option)
}

/// Fraction of the remote variation's attributes covered by a matching
/// key/option pair on the source side. The denominator is the target's
/// attribute set: a source carrying only one of a target's three attributes
/// must not look like a full match.
pub(crate) fn attribute_overlap(
    source: &HashMap<String, String>,
    remote: &[RemoteVariationAttribute],
) -> f64 {
    if remote.is_empty() || source.is_empty() {
        return 0.0;
    }
    let matched = remote
        .iter()
        .filter(|ra| {
            source
                .iter()
                .any(|(key, value)| keys_match(key, ra) && options_match(value, &ra.option))
        })
        .count();
    matched as f64 / remote.len() as f64
}
