use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde_json::json;

use crate::clients::TargetStoreClient;
use crate::config::Config;
use crate::logging::SyncLogger;
use crate::models::{RemoteAttribute, RemoteTerm, Result};

use super::normalize::{normalize_term, slugify};

/// Point-in-time view of the target's global attribute catalog: every
/// attribute plus the terms registered under it.
#[derive(Debug, Clone)]
pub struct AttributeSnapshot {
    pub attributes: Vec<RemoteAttribute>,
    pub terms: HashMap<i64, Vec<RemoteTerm>>,
    fetched_at: Instant,
}

impl AttributeSnapshot {
    fn is_fresh(&self, ttl: Duration) -> bool {
        self.fetched_at.elapsed() < ttl
    }
}

/// Maps source attribute names and option values onto the target's attribute
/// ids and terms. The target catalog changes rarely, so one snapshot per
/// target URL is cached and reused until its TTL lapses.
pub struct AttributeResolver {
    client: Arc<TargetStoreClient>,
    logger: Arc<SyncLogger>,
    ttl: Duration,
    /// Normalized source name to the target name it should match as.
    name_overrides: HashMap<String, String>,
    snapshots: Mutex<HashMap<String, Arc<AttributeSnapshot>>>,
}

impl AttributeResolver {
    pub fn new(cfg: &Config, client: Arc<TargetStoreClient>, logger: Arc<SyncLogger>) -> Self {
        Self {
            client,
            logger,
            ttl: Duration::from_secs(cfg.attribute_cache_ttl_secs),
            name_overrides: cfg
                .attribute_name_overrides
                .iter()
                .map(|(from, to)| (normalize_term(from), to.clone()))
                .collect(),
            snapshots: Mutex::new(HashMap::new()),
        }
    }

    pub async fn snapshot(&self) -> Result<Arc<AttributeSnapshot>> {
        let key = self.client.base_url().to_string();
        {
            let snapshots = self.snapshots.lock().expect("snapshot mutex poisoned");
            if let Some(snap) = snapshots.get(&key) {
                if snap.is_fresh(self.ttl) {
                    return Ok(snap.clone());
                }
            }
        }

        let attributes = self.client.list_attributes().await?;
        let term_lists = futures::future::join_all(
            attributes
                .iter()
                .map(|a| self.client.list_attribute_terms(a.id)),
        )
        .await;
        let mut terms = HashMap::new();
        for (attribute, list) in attributes.iter().zip(term_lists) {
            terms.insert(attribute.id, list?);
        }
        self.logger.info(
            "Refreshed attribute snapshot",
            json!({ "target": key, "attributes": attributes.len() }),
        );

        let snap = Arc::new(AttributeSnapshot {
            attributes,
            terms,
            fetched_at: Instant::now(),
        });
        let mut snapshots = self.snapshots.lock().expect("snapshot mutex poisoned");
        snapshots.insert(key, snap.clone());
        Ok(snap)
    }

    /// Target attribute for a source attribute name. Configured name
    /// overrides rewrite known-mismatched names before matching; lookups
    /// compare normalized names first, then slugs.
    pub async fn resolve_attribute(&self, source_name: &str) -> Result<Option<RemoteAttribute>> {
        let normalized = normalize_term(source_name);
        let effective = self
            .name_overrides
            .get(&normalized)
            .cloned()
            .unwrap_or_else(|| source_name.to_string());
        let wanted_name = normalize_term(&effective);
        let wanted_slug = slugify(&effective);

        let snap = self.snapshot().await?;
        let hit = snap
            .attributes
            .iter()
            .find(|a| normalize_term(&a.name) == wanted_name)
            .or_else(|| {
                snap.attributes
                    .iter()
                    .find(|a| slugify(a.slug.trim_start_matches("pa_")) == wanted_slug)
            })
            .cloned();

        if hit.is_none() {
            self.logger.warning(
                "No target attribute for source name",
                json!({ "source_name": source_name, "effective": effective }),
            );
        }
        Ok(hit)
    }

    /// Target term under an attribute for a source option value.
    pub async fn resolve_term(
        &self,
        attribute_id: i64,
        option: &str,
    ) -> Result<Option<RemoteTerm>> {
        let wanted_name = normalize_term(option);
        let wanted_slug = slugify(option);

        let snap = self.snapshot().await?;
        let Some(terms) = snap.terms.get(&attribute_id) else {
            return Ok(None);
        };
        let hit = terms
            .iter()
            .find(|t| normalize_term(&t.name) == wanted_name)
            .or_else(|| terms.iter().find(|t| slugify(&t.slug) == wanted_slug))
            .cloned();
        Ok(hit)
    }
}
