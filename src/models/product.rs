use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Meta keys the engine persists on the source side. Everything else in a
/// product's metadata map is read-only to the sync engine.
pub const META_SYNCED_PRODUCT_ID: &str = "_synced_product_id";
pub const META_SYNCED_VARIATION_ID: &str = "_synced_variation_id";
pub const META_LAST_SYNC_DATE: &str = "_last_sync_date";
pub const META_LAST_STOCK_SYNC_DATE: &str = "_last_stock_sync_date";

/// SEO meta keys copied verbatim into the product payload when present.
pub const SEO_META_KEYS: &[&str] = &[
    "_yoast_wpseo_title",
    "_yoast_wpseo_metadesc",
    "_yoast_wpseo_focuskw",
    "_yoast_wpseo_meta-robots-noindex",
    "_yoast_wpseo_meta-robots-nofollow",
    "_yoast_wpseo_canonical",
    "_yoast_wpseo_og_title",
    "_yoast_wpseo_og_description",
    "_yoast_wpseo_og_image",
    "_yoast_wpseo_twitter_title",
    "_yoast_wpseo_twitter_description",
    "_yoast_wpseo_twitter_image",
];

/// Meta keys forwarded on variation payloads.
pub const VARIATION_META_KEYS: &[&str] = &["_purchase_price", "_minimum_quantity"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProductType {
    Simple,
    Variable,
}

impl ProductType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProductType::Simple => "simple",
            ProductType::Variable => "variable",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StockStatus {
    InStock,
    OutOfStock,
    OnBackorder,
}

impl StockStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StockStatus::InStock => "instock",
            StockStatus::OutOfStock => "outofstock",
            StockStatus::OnBackorder => "onbackorder",
        }
    }
}

/// A category or tag term on the source side.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceTerm {
    pub id: i64,
    pub name: String,
    pub slug: String,
}

/// A product attribute as exposed by the catalog data source: a display name,
/// an optional taxonomy slug (e.g. `pa_color`), ordered option values, a
/// display position and whether the attribute drives variations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceAttribute {
    pub name: String,
    pub taxonomy: Option<String>,
    pub options: Vec<String>,
    pub position: u32,
    pub variation: bool,
}

impl SourceAttribute {
    /// Raw attribute name with the taxonomy prefix stripped, used for
    /// mapping against the target attribute catalog.
    pub fn raw_name(&self) -> String {
        match &self.taxonomy {
            Some(tax) => tax.trim_start_matches("pa_").to_string(),
            None => self.name.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Dimensions {
    pub length: f64,
    pub width: f64,
    pub height: f64,
}

impl Dimensions {
    /// Dimensions are only sent when at least one axis is explicitly set.
    pub fn any_axis_set(&self) -> bool {
        self.length > 0.0 || self.width > 0.0 || self.height > 0.0
    }
}

/// A product as read from the source catalog. Owned by the catalog
/// collaborator; the engine never mutates it apart from sync meta keys.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceProduct {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub sku: String,
    pub product_type: ProductType,
    #[serde(default)]
    pub regular_price: String,
    #[serde(default)]
    pub sale_price: String,
    pub stock_status: StockStatus,
    pub manage_stock: bool,
    pub stock_quantity: Option<i64>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub short_description: String,
    #[serde(default)]
    pub categories: Vec<SourceTerm>,
    #[serde(default)]
    pub tags: Vec<SourceTerm>,
    #[serde(default)]
    pub attributes: Vec<SourceAttribute>,
    /// Primary image URL, if any.
    pub image_url: Option<String>,
    /// Ordered gallery image URLs.
    #[serde(default)]
    pub gallery_urls: Vec<String>,
    #[serde(default)]
    pub weight: String,
    #[serde(default)]
    pub meta: HashMap<String, String>,
}

impl SourceProduct {
    pub fn is_variable(&self) -> bool {
        self.product_type == ProductType::Variable
    }

    /// Primary + gallery URLs in payload order.
    pub fn all_image_urls(&self) -> Vec<String> {
        let mut urls = Vec::new();
        if let Some(main) = &self.image_url {
            if !main.is_empty() {
                urls.push(main.clone());
            }
        }
        urls.extend(self.gallery_urls.iter().filter(|u| !u.is_empty()).cloned());
        urls
    }

    /// EAN with the legacy key fallback, mirroring the source store's dual
    /// meta convention.
    pub fn ean(&self) -> Option<String> {
        self.meta
            .get("_alg_ean")
            .or_else(|| self.meta.get("_ean"))
            .filter(|v| !v.is_empty())
            .cloned()
    }
}

/// A purchasable variation of a variable product.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceVariation {
    pub id: i64,
    pub parent_id: i64,
    #[serde(default)]
    pub sku: String,
    /// Attribute assignment keyed by the source attribute key
    /// (e.g. `pa_color`), each bound to one option value.
    #[serde(default)]
    pub attributes: HashMap<String, String>,
    #[serde(default)]
    pub regular_price: String,
    #[serde(default)]
    pub sale_price: String,
    pub stock_status: StockStatus,
    pub manage_stock: bool,
    pub stock_quantity: Option<i64>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub dimensions: Dimensions,
    #[serde(default)]
    pub weight: String,
    pub image_url: Option<String>,
    #[serde(default)]
    pub gallery_urls: Vec<String>,
    #[serde(default)]
    pub meta: HashMap<String, String>,
}

impl SourceVariation {
    pub fn ean(&self) -> Option<String> {
        self.meta
            .get("_alg_ean")
            .or_else(|| self.meta.get("_ean"))
            .filter(|v| !v.is_empty())
            .cloned()
    }
}
