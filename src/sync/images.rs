use std::collections::HashMap;
use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde_json::json;
use tempfile::NamedTempFile;

use crate::clients::TargetStoreClient;
use crate::config::Config;
use crate::logging::SyncLogger;
use crate::models::{RemoteMedia, RemoteProduct, Result, SourceProduct, SyncError};

/// Per-run accounting for an image pass. Individual image failures do not
/// abort the pass; the caller decides what a non-zero `failed` means.
#[derive(Debug, Default, Clone)]
pub struct ImageSyncOutcome {
    pub image_ids: Vec<i64>,
    pub reused: usize,
    pub uploaded: usize,
    pub failed: usize,
}

impl ImageSyncOutcome {
    pub fn total(&self) -> usize {
        self.reused + self.uploaded + self.failed
    }
}

/// Deduplicating image pipeline. Before uploading anything it tries, in
/// order: the session cache (this process), the filename cache (TTL-bound,
/// keyed by md5 of the filename), and a live media search on the target.
/// A search hit is only reused when it is verifiably attached to the target
/// product we are updating; filename equality alone is not proof of
/// identity across products.
pub struct ImageSynchronizer {
    client: Arc<TargetStoreClient>,
    logger: Arc<SyncLogger>,
    batch_size: usize,
    batch_pause: Duration,
    upload_retry_delay: Duration,
    cache_ttl: Duration,
    session_cache: Mutex<HashMap<String, i64>>,
    filename_cache: Mutex<HashMap<String, (i64, Instant)>>,
}

impl ImageSynchronizer {
    pub fn new(cfg: &Config, client: Arc<TargetStoreClient>, logger: Arc<SyncLogger>) -> Self {
        Self {
            client,
            logger,
            batch_size: cfg.image_batch_size,
            batch_pause: Duration::from_millis(cfg.image_batch_pause_ms),
            upload_retry_delay: Duration::from_millis(cfg.image_upload_retry_delay_ms),
            cache_ttl: Duration::from_secs(cfg.image_cache_ttl_secs),
            session_cache: Mutex::new(HashMap::new()),
            filename_cache: Mutex::new(HashMap::new()),
        }
    }

    /// Filename component of a URL, query string stripped.
    pub fn filename_from_url(url: &str) -> String {
        let no_query = url.split(['?', '#']).next().unwrap_or(url);
        no_query.rsplit('/').next().unwrap_or(no_query).to_string()
    }

    /// Candidate filenames to search for: the name itself, the `-scaled`
    /// variant the target's media library generates for large uploads, and
    /// the unscaled base when the source already carries the suffix.
    pub fn filename_variants(filename: &str) -> Vec<String> {
        let mut variants = vec![filename.to_string()];
        if let Some(dot) = filename.rfind('.') {
            let (stem, ext) = filename.split_at(dot);
            if let Some(base) = stem.strip_suffix("-scaled") {
                variants.push(format!("{}{}", base, ext));
            } else {
                variants.push(format!("{}-scaled{}", stem, ext));
            }
        }
        variants
    }

    fn cache_key(filename: &str) -> String {
        format!("{:x}", md5::compute(filename.as_bytes()))
    }

    fn cached_id(&self, url: &str, filename: &str) -> Option<i64> {
        if let Ok(session) = self.session_cache.lock() {
            if let Some(id) = session.get(url) {
                return Some(*id);
            }
        }
        let key = Self::cache_key(filename);
        let mut cache = self.filename_cache.lock().ok()?;
        match cache.get(&key) {
            Some((id, stored_at)) if stored_at.elapsed() < self.cache_ttl => Some(*id),
            Some(_) => {
                cache.remove(&key);
                None
            }
            None => None,
        }
    }

    fn remember(&self, url: &str, filename: &str, attachment_id: i64) {
        if let Ok(mut session) = self.session_cache.lock() {
            session.insert(url.to_string(), attachment_id);
        }
        if let Ok(mut cache) = self.filename_cache.lock() {
            cache.insert(Self::cache_key(filename), (attachment_id, Instant::now()));
        }
    }

    fn attached_to(hint: &RemoteProduct, attachment_id: i64) -> bool {
        hint.images.iter().any(|img| img.id == attachment_id)
    }

    fn stem(variant: &str) -> String {
        variant
            .rsplit_once('.')
            .map(|(s, _)| s)
            .unwrap_or(variant)
            .to_string()
    }

    /// Cache hit accepted only when the attachment is verifiably linked to
    /// the target product. The caches span products within one process, so
    /// a bare filename hit proves nothing about ownership.
    fn verified_cache_hit(
        &self,
        url: &str,
        filename: &str,
        target_hint: Option<&RemoteProduct>,
    ) -> Option<i64> {
        let id = self.cached_id(url, filename)?;
        match target_hint {
            Some(hint) if Self::attached_to(hint, id) => Some(id),
            _ => {
                self.logger.info(
                    "Cached attachment not linked to this product, ignoring",
                    json!({ "filename": filename, "attachment_id": id }),
                );
                None
            }
        }
    }

    /// First search hit whose filename matches a variant and which is
    /// attached to the target product.
    fn pick_from_hits(
        &self,
        url: &str,
        filename: &str,
        hits: &[RemoteMedia],
        target_hint: Option<&RemoteProduct>,
    ) -> Option<i64> {
        for variant in Self::filename_variants(filename) {
            for media in hits {
                if media.filename() != variant {
                    continue;
                }
                if let Some(hint) = target_hint {
                    if Self::attached_to(hint, media.id) {
                        self.remember(url, filename, media.id);
                        return Some(media.id);
                    }
                }
                self.logger.info(
                    "Skipped same-named attachment not linked to this product",
                    json!({ "filename": variant, "attachment_id": media.id }),
                );
            }
        }
        None
    }

    /// Existing attachment id for a source URL, or `None` when nothing
    /// reusable is found. Both cache hits and search hits require
    /// attachment verification against `target_hint`.
    pub async fn find_existing(
        &self,
        url: &str,
        target_hint: Option<&RemoteProduct>,
    ) -> Result<Option<i64>> {
        let filename = Self::filename_from_url(url);
        if filename.is_empty() {
            return Ok(None);
        }

        if let Some(id) = self.verified_cache_hit(url, &filename, target_hint) {
            return Ok(Some(id));
        }

        let terms: Vec<String> = Self::filename_variants(&filename)
            .iter()
            .map(|v| Self::stem(v))
            .collect();
        let hits = self.client.search_media_batch(&terms).await?;
        Ok(self.pick_from_hits(url, &filename, &hits, target_hint))
    }

    /// Download the source image and upload it to the target media library.
    /// The download is spooled through a temp file that is dropped as soon
    /// as the upload attempts finish. Up to three attempts with a fixed
    /// delay; the upload must produce a created attachment with an id.
    pub async fn upload(&self, url: &str) -> Result<i64> {
        let filename = Self::filename_from_url(url);
        if filename.is_empty() {
            return Err(SyncError::Validation(format!(
                "Image URL has no filename: {}",
                url
            )));
        }

        let (bytes, content_type) = self.client.fetch_image(url).await?;
        let mut spool = NamedTempFile::new()?;
        spool.write_all(&bytes)?;
        spool.flush()?;
        let staged = std::fs::read(spool.path())?;
        drop(spool);

        let mut last_error = SyncError::Sync("No upload attempts made".to_string());
        for attempt in 1..=3u32 {
            if attempt > 1 {
                tokio::time::sleep(self.upload_retry_delay).await;
            }
            match self
                .client
                .upload_media(staged.clone(), &filename, &content_type)
                .await
            {
                Ok(media) => {
                    self.remember(url, &filename, media.id);
                    self.logger.success(
                        "Uploaded image",
                        json!({ "filename": filename, "attachment_id": media.id, "attempt": attempt }),
                    );
                    return Ok(media.id);
                }
                Err(e) => {
                    self.logger.warning(
                        "Image upload attempt failed",
                        json!({ "filename": filename, "attempt": attempt, "error": e.to_string() }),
                    );
                    last_error = e;
                }
            }
        }
        Err(last_error)
    }

    /// Attachment id for a single URL: reuse when possible, upload otherwise.
    pub async fn resolve_or_upload(
        &self,
        url: &str,
        target_hint: Option<&RemoteProduct>,
    ) -> Result<i64> {
        if let Some(id) = self.find_existing(url, target_hint).await? {
            return Ok(id);
        }
        self.upload(url).await
    }

    /// Full image pass for a product: every primary and gallery URL, handled
    /// in small batches with a pause between them so the media endpoints are
    /// not hammered. Each batch resolves against a single media search that
    /// covers all of its filename variants. Per-image failures are logged
    /// and counted, not fatal.
    pub async fn sync_product_images(
        &self,
        product: &SourceProduct,
        target_hint: Option<&RemoteProduct>,
    ) -> Result<ImageSyncOutcome> {
        let urls = product.all_image_urls();
        let mut outcome = ImageSyncOutcome::default();

        for (batch_index, batch) in urls.chunks(self.batch_size).enumerate() {
            if batch_index > 0 {
                tokio::time::sleep(self.batch_pause).await;
            }

            let mut terms: Vec<String> = Vec::new();
            for url in batch {
                let filename = Self::filename_from_url(url);
                for variant in Self::filename_variants(&filename) {
                    let stem = Self::stem(&variant);
                    if !stem.is_empty() && !terms.contains(&stem) {
                        terms.push(stem);
                    }
                }
            }
            let hits = match self.client.search_media_batch(&terms).await {
                Ok(hits) => hits,
                Err(e) => {
                    self.logger.warning(
                        "Batch media search failed, every image in the batch uploads fresh",
                        json!({ "terms": terms, "error": e.to_string() }),
                    );
                    Vec::new()
                }
            };

            for url in batch {
                let filename = Self::filename_from_url(url);
                let existing = self
                    .verified_cache_hit(url, &filename, target_hint)
                    .or_else(|| self.pick_from_hits(url, &filename, &hits, target_hint));
                if let Some(id) = existing {
                    outcome.image_ids.push(id);
                    outcome.reused += 1;
                    continue;
                }
                match self.upload(url).await {
                    Ok(id) => {
                        outcome.image_ids.push(id);
                        outcome.uploaded += 1;
                    }
                    Err(e) => {
                        outcome.failed += 1;
                        self.logger.error(
                            "Image failed to sync",
                            json!({ "url": url, "product_id": product.id, "error": e.to_string() }),
                        );
                    }
                }
            }
        }

        self.logger.info(
            "Image pass finished",
            json!({
                "product_id": product.id,
                "reused": outcome.reused,
                "uploaded": outcome.uploaded,
                "failed": outcome.failed,
            }),
        );
        Ok(outcome)
    }

    /// Best-effort attachment id for a variation image. Failures downgrade
    /// to `None` so one broken image cannot sink the variation step.
    pub async fn variation_image_id(
        &self,
        url: &str,
        target_hint: Option<&RemoteProduct>,
    ) -> Option<i64> {
        match self.resolve_or_upload(url, target_hint).await {
            Ok(id) => Some(id),
            Err(e) => {
                self.logger.warning(
                    "Variation image skipped",
                    json!({ "url": url, "error": e.to_string() }),
                );
                None
            }
        }
    }
}
