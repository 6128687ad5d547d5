use std::collections::HashMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub port: u16,
    /// Base URL of the target store, e.g. `https://shop.example.ba`.
    pub target_url: String,
    /// Consumer key/secret pair for catalog write endpoints.
    pub consumer_key: String,
    pub consumer_secret: String,
    /// Basic-auth credentials for the media endpoints.
    pub media_username: String,
    pub media_password: String,
    /// Shared token required on every inbound trigger request.
    pub api_token: String,
    /// Source currency units per one target currency unit.
    pub exchange_rate: f64,
    pub logging_enabled: bool,
    pub http_user_agent: String,
    pub http_max_retries: u32,
    pub http_retry_backoff_ms: u64,
    /// Fixed cooldown applied on 429/503 instead of the exponential step.
    pub rate_limit_cooldown_ms: u64,
    pub image_batch_size: usize,
    pub image_batch_pause_ms: u64,
    pub image_upload_retry_delay_ms: u64,
    pub image_cache_ttl_secs: u64,
    pub attribute_cache_ttl_secs: u64,
    pub variation_poll_max_attempts: u32,
    pub variation_poll_base_delay_ms: u64,
    /// Source attribute name to target attribute name, for catalogs whose
    /// attribute names drifted apart. Keys are matched case-insensitively.
    pub attribute_name_overrides: HashMap<String, String>,
    /// When true, a variation sync that matches zero variations (after one
    /// regenerate-and-recheck) fails the step instead of completing with a
    /// zero count.
    pub fail_on_zero_variation_matches: bool,
}

impl Config {
    pub fn from_env() -> Self {
        let get = |k: &str| std::env::var(k).ok();

        let port: u16 = get("PORT").and_then(|s| s.parse().ok()).unwrap_or(8091);
        let target_url = get("TARGET_URL").unwrap_or_else(|| "http://localhost:8080".to_string());
        let consumer_key = get("TARGET_CONSUMER_KEY").unwrap_or_default();
        let consumer_secret = get("TARGET_CONSUMER_SECRET").unwrap_or_default();
        let media_username = get("TARGET_MEDIA_USERNAME").unwrap_or_default();
        let media_password = get("TARGET_MEDIA_PASSWORD").unwrap_or_default();
        let api_token = get("SYNC_API_TOKEN").unwrap_or_default();
        let exchange_rate: f64 = get("EXCHANGE_RATE")
            .and_then(|s| s.parse().ok())
            .unwrap_or(58.5);
        let logging_enabled: bool = get("LOGGING_ENABLED")
            .and_then(|s| s.parse().ok())
            .unwrap_or(true);
        let http_user_agent =
            get("HTTP_USER_AGENT").unwrap_or_else(|| "catalog-sync-service/0.1".to_string());
        let http_max_retries: u32 = get("HTTP_MAX_RETRIES")
            .and_then(|s| s.parse().ok())
            .unwrap_or(3);
        let http_retry_backoff_ms: u64 = get("HTTP_RETRY_BACKOFF_MS")
            .and_then(|s| s.parse().ok())
            .unwrap_or(2000);
        let rate_limit_cooldown_ms: u64 = get("RATE_LIMIT_COOLDOWN_MS")
            .and_then(|s| s.parse().ok())
            .unwrap_or(10_000);
        let image_batch_size: usize = get("IMAGE_BATCH_SIZE")
            .and_then(|s| s.parse().ok())
            .unwrap_or(3)
            .max(1);
        let image_batch_pause_ms: u64 = get("IMAGE_BATCH_PAUSE_MS")
            .and_then(|s| s.parse().ok())
            .unwrap_or(300);
        let image_upload_retry_delay_ms: u64 = get("IMAGE_UPLOAD_RETRY_DELAY_MS")
            .and_then(|s| s.parse().ok())
            .unwrap_or(1000);
        let image_cache_ttl_secs: u64 = get("IMAGE_CACHE_TTL_SECS")
            .and_then(|s| s.parse().ok())
            .unwrap_or(86_400);
        let attribute_cache_ttl_secs: u64 = get("ATTRIBUTE_CACHE_TTL_SECS")
            .and_then(|s| s.parse().ok())
            .unwrap_or(86_400);
        let variation_poll_max_attempts: u32 = get("VARIATION_POLL_MAX_ATTEMPTS")
            .and_then(|s| s.parse().ok())
            .unwrap_or(10);
        let variation_poll_base_delay_ms: u64 = get("VARIATION_POLL_BASE_DELAY_MS")
            .and_then(|s| s.parse().ok())
            .unwrap_or(500);
        let fail_on_zero_variation_matches: bool = get("FAIL_ON_ZERO_VARIATION_MATCHES")
            .and_then(|s| s.parse().ok())
            .unwrap_or(false);
        // Comma-separated "source=target" pairs, e.g. "boja=Color,velicina=Size".
        let attribute_name_overrides: HashMap<String, String> = get("ATTRIBUTE_NAME_OVERRIDES")
            .map(|raw| {
                raw.split(',')
                    .filter_map(|pair| {
                        let (from, to) = pair.split_once('=')?;
                        let (from, to) = (from.trim(), to.trim());
                        if from.is_empty() || to.is_empty() {
                            return None;
                        }
                        Some((from.to_string(), to.to_string()))
                    })
                    .collect()
            })
            .unwrap_or_default();

        Self {
            port,
            target_url,
            consumer_key,
            consumer_secret,
            media_username,
            media_password,
            api_token,
            exchange_rate,
            logging_enabled,
            http_user_agent,
            http_max_retries,
            http_retry_backoff_ms,
            rate_limit_cooldown_ms,
            image_batch_size,
            image_batch_pause_ms,
            image_upload_retry_delay_ms,
            image_cache_ttl_secs,
            attribute_cache_ttl_secs,
            variation_poll_max_attempts,
            variation_poll_base_delay_ms,
            attribute_name_overrides,
            fail_on_zero_variation_matches,
        }
    }

    /// Fast settings for tests: real semantics, millisecond waits.
    pub fn for_tests(target_url: String) -> Self {
        Self {
            port: 0,
            target_url,
            consumer_key: "ck_test".to_string(),
            consumer_secret: "cs_test".to_string(),
            media_username: "media".to_string(),
            media_password: "secret".to_string(),
            api_token: "token".to_string(),
            exchange_rate: 58.5,
            logging_enabled: true,
            http_user_agent: "catalog-sync-service/test".to_string(),
            http_max_retries: 3,
            http_retry_backoff_ms: 5,
            rate_limit_cooldown_ms: 10,
            image_batch_size: 3,
            image_batch_pause_ms: 1,
            image_upload_retry_delay_ms: 1,
            image_cache_ttl_secs: 86_400,
            attribute_cache_ttl_secs: 86_400,
            variation_poll_max_attempts: 10,
            variation_poll_base_delay_ms: 5,
            attribute_name_overrides: HashMap::new(),
            fail_on_zero_variation_matches: false,
        }
    }
}
