use std::sync::Arc;

use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use url::Url;

use crate::config::Config;
use crate::logging::SyncLogger;
use crate::models::{
    RemoteAttribute, RemoteCategory, RemoteMedia, RemoteProduct, RemoteTerm, RemoteVariation,
    Result, SyncError,
};

use super::http::{ApiResponse, EndpointClass, RetryClient, TargetRequest};

const CATALOG_API: &str = "wp-json/wc/v3";
const MEDIA_API: &str = "wp-json/wp/v2";

/// Typed client for the target store's REST API. Catalog endpoints
/// authenticate with consumer key/secret query parameters; media endpoints
/// use basic auth. Write paths go through the retry loop, lookup paths are
/// single-attempt so a miss resolves quickly.
#[derive(Clone)]
pub struct TargetStoreClient {
    http: RetryClient,
    base_url: String,
    consumer_key: String,
    consumer_secret: String,
    media_username: String,
    media_password: String,
}

impl TargetStoreClient {
    pub fn new(cfg: &Config, logger: Arc<SyncLogger>) -> Result<Self> {
        Ok(Self {
            http: RetryClient::new(cfg, logger)?,
            base_url: cfg.target_url.trim_end_matches('/').to_string(),
            consumer_key: cfg.consumer_key.clone(),
            consumer_secret: cfg.consumer_secret.clone(),
            media_username: cfg.media_username.clone(),
            media_password: cfg.media_password.clone(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn catalog_url(&self, path: &str, params: &[(&str, String)]) -> Result<Url> {
        let mut url = Url::parse(&format!("{}/{}/{}", self.base_url, CATALOG_API, path))
            .map_err(|e| SyncError::Configuration(format!("Invalid target URL: {}", e)))?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("consumer_key", &self.consumer_key);
            pairs.append_pair("consumer_secret", &self.consumer_secret);
            for (k, v) in params {
                pairs.append_pair(k, v);
            }
        }
        Ok(url)
    }

    fn media_url(&self, path: &str, params: &[(&str, String)]) -> Result<Url> {
        let mut url = Url::parse(&format!("{}/{}/{}", self.base_url, MEDIA_API, path))
            .map_err(|e| SyncError::Configuration(format!("Invalid target URL: {}", e)))?;
        {
            let mut pairs = url.query_pairs_mut();
            for (k, v) in params {
                pairs.append_pair(k, v);
            }
        }
        Ok(url)
    }

    fn decode<T: DeserializeOwned>(resp: ApiResponse) -> Result<T> {
        if !resp.is_success() {
            return Err(SyncError::Http {
                status: resp.status,
                message: resp.error_message(),
            });
        }
        serde_json::from_value(resp.body).map_err(SyncError::Serialization)
    }

    // -- products ----------------------------------------------------------

    /// Product by target id; `Ok(None)` when the target answers 404.
    pub async fn get_product(&self, product_id: i64) -> Result<Option<RemoteProduct>> {
        let url = self.catalog_url(&format!("products/{}", product_id), &[])?;
        let resp = self.http.get_once(url, EndpointClass::Metadata).await?;
        if resp.status == 404 {
            return Ok(None);
        }
        Self::decode(resp).map(Some)
    }

    /// Products whose SKU matches exactly. Hits can be variations; the
    /// caller inspects `parent_id` to tell them apart.
    pub async fn find_by_sku(&self, sku: &str) -> Result<Vec<RemoteProduct>> {
        let url = self.catalog_url("products", &[("sku", sku.to_string())])?;
        let resp = self.http.get_once(url, EndpointClass::Metadata).await?;
        Self::decode(resp)
    }

    pub async fn search_products(&self, term: &str) -> Result<Vec<RemoteProduct>> {
        let url = self.catalog_url(
            "products",
            &[
                ("search", term.to_string()),
                ("per_page", "20".to_string()),
            ],
        )?;
        let resp = self.http.get_once(url, EndpointClass::Metadata).await?;
        Self::decode(resp)
    }

    pub async fn create_product(&self, payload: Value) -> Result<RemoteProduct> {
        let url = self.catalog_url("products", &[])?;
        let req = TargetRequest::new(Method::POST, url, EndpointClass::ProductCreate).json(payload);
        let resp = self.http.execute(req).await?;
        Self::decode(resp)
    }

    pub async fn update_product(&self, product_id: i64, payload: Value) -> Result<RemoteProduct> {
        let url = self.catalog_url(&format!("products/{}", product_id), &[])?;
        let req = TargetRequest::new(Method::PUT, url, EndpointClass::ProductUpdate).json(payload);
        let resp = self.http.execute(req).await?;
        Self::decode(resp)
    }

    /// Stock-only product update on the short timeout.
    pub async fn update_product_stock(
        &self,
        product_id: i64,
        payload: Value,
    ) -> Result<RemoteProduct> {
        let url = self.catalog_url(&format!("products/{}", product_id), &[])?;
        let req = TargetRequest::new(Method::PUT, url, EndpointClass::StockUpdate).json(payload);
        let resp = self.http.execute(req).await?;
        Self::decode(resp)
    }

    // -- variations --------------------------------------------------------

    pub async fn list_variations(&self, product_id: i64) -> Result<Vec<RemoteVariation>> {
        let url = self.catalog_url(
            &format!("products/{}/variations", product_id),
            &[("per_page", "100".to_string())],
        )?;
        let resp = self.http.get_once(url, EndpointClass::Variations).await?;
        Self::decode(resp)
    }

    /// Ask the target to generate variations from the product's attribute
    /// matrix, keeping whatever already exists.
    pub async fn generate_variations(&self, product_id: i64) -> Result<()> {
        let url = self.catalog_url(&format!("products/{}/variations/generate", product_id), &[])?;
        let req = TargetRequest::new(Method::POST, url, EndpointClass::Variations)
            .json(json!({ "delete": false }));
        self.http.execute(req).await?;
        Ok(())
    }

    pub async fn update_variation(
        &self,
        product_id: i64,
        variation_id: i64,
        payload: Value,
    ) -> Result<RemoteVariation> {
        let url = self.catalog_url(
            &format!("products/{}/variations/{}", product_id, variation_id),
            &[],
        )?;
        let req = TargetRequest::new(Method::PUT, url, EndpointClass::Variations).json(payload);
        let resp = self.http.execute(req).await?;
        Self::decode(resp)
    }

    pub async fn update_variation_stock(
        &self,
        product_id: i64,
        variation_id: i64,
        payload: Value,
    ) -> Result<RemoteVariation> {
        let url = self.catalog_url(
            &format!("products/{}/variations/{}", product_id, variation_id),
            &[],
        )?;
        let req = TargetRequest::new(Method::PUT, url, EndpointClass::StockUpdate).json(payload);
        let resp = self.http.execute(req).await?;
        Self::decode(resp)
    }

    // -- categories, attributes, terms -------------------------------------

    pub async fn get_category_by_slug(&self, slug: &str) -> Result<Option<RemoteCategory>> {
        let url = self.catalog_url("products/categories", &[("slug", slug.to_string())])?;
        let resp = self.http.get_once(url, EndpointClass::Metadata).await?;
        let mut hits: Vec<RemoteCategory> = Self::decode(resp)?;
        Ok(if hits.is_empty() {
            None
        } else {
            Some(hits.remove(0))
        })
    }

    pub async fn search_categories(&self, term: &str) -> Result<Vec<RemoteCategory>> {
        let url = self.catalog_url(
            "products/categories",
            &[
                ("search", term.to_string()),
                ("per_page", "100".to_string()),
            ],
        )?;
        let resp = self.http.get_once(url, EndpointClass::Metadata).await?;
        Self::decode(resp)
    }

    pub async fn list_attributes(&self) -> Result<Vec<RemoteAttribute>> {
        let url = self.catalog_url("products/attributes", &[("per_page", "100".to_string())])?;
        let resp = self.http.get_once(url, EndpointClass::Metadata).await?;
        Self::decode(resp)
    }

    pub async fn list_attribute_terms(&self, attribute_id: i64) -> Result<Vec<RemoteTerm>> {
        let url = self.catalog_url(
            &format!("products/attributes/{}/terms", attribute_id),
            &[("per_page", "100".to_string())],
        )?;
        let resp = self.http.get_once(url, EndpointClass::Metadata).await?;
        Self::decode(resp)
    }

    // -- media --------------------------------------------------------------

    pub async fn search_media(&self, term: &str) -> Result<Vec<RemoteMedia>> {
        let url = self.media_url(
            "media",
            &[
                ("search", term.to_string()),
                ("per_page", "100".to_string()),
            ],
        )?;
        let resp = self
            .http
            .get_once_with_auth(
                url,
                EndpointClass::MediaSearch,
                &self.media_username,
                &self.media_password,
            )
            .await?;
        Self::decode(resp)
    }

    /// One search covering several filename terms at once. The media search
    /// endpoint accepts a comma-separated term list, so a whole batch of
    /// images costs a single round trip.
    pub async fn search_media_batch(&self, terms: &[String]) -> Result<Vec<RemoteMedia>> {
        if terms.is_empty() {
            return Ok(Vec::new());
        }
        self.search_media(&terms.join(",")).await
    }

    /// Single upload attempt. Anything other than 201-with-id is an error;
    /// the image pipeline owns the retry policy around this call.
    pub async fn upload_media(
        &self,
        bytes: Vec<u8>,
        filename: &str,
        content_type: &str,
    ) -> Result<RemoteMedia> {
        let url = self.media_url("media", &[])?;
        let req = TargetRequest::new(Method::POST, url, EndpointClass::MediaUpload)
            .raw(bytes, content_type.to_string(), filename.to_string())
            .with_basic_auth(&self.media_username, &self.media_password);
        let resp = self.http.execute_once(req).await?;
        if resp.status != 201 {
            return Err(SyncError::Http {
                status: resp.status,
                message: format!("Media upload was not created: {}", resp.error_message()),
            });
        }
        let media: RemoteMedia = serde_json::from_value(resp.body)?;
        if media.id <= 0 {
            return Err(SyncError::Sync(
                "Media upload response carried no attachment id".to_string(),
            ));
        }
        Ok(media)
    }

    /// Download an image from its source URL into memory.
    pub async fn fetch_image(&self, image_url: &str) -> Result<(Vec<u8>, String)> {
        let url = Url::parse(image_url)
            .map_err(|e| SyncError::Validation(format!("Invalid image URL: {}", e)))?;
        self.http.download(url, EndpointClass::MediaUpload).await
    }

    // -- connectivity -------------------------------------------------------

    pub async fn test_connection(&self) -> Result<()> {
        let url = self.catalog_url("products", &[("per_page", "1".to_string())])?;
        let resp = self.http.get_once(url, EndpointClass::Metadata).await?;
        if resp.is_success() {
            Ok(())
        } else {
            Err(SyncError::Http {
                status: resp.status,
                message: resp.error_message(),
            })
        }
    }
}
