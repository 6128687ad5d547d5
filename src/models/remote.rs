use serde::{Deserialize, Serialize};

/// DTOs for the target store's REST API. Only the fields the engine reads
/// are modeled; everything else in a response body is ignored.

#[derive(Debug, Clone, Deserialize)]
pub struct RemoteProduct {
    pub id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub sku: String,
    /// Non-zero when the hit is actually a variation; its parent is the
    /// product-level match.
    #[serde(default)]
    pub parent_id: i64,
    #[serde(default)]
    pub images: Vec<RemoteImageRef>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemoteImageRef {
    pub id: i64,
    #[serde(default)]
    pub src: String,
    #[serde(default)]
    pub position: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemoteVariation {
    pub id: i64,
    #[serde(default)]
    pub sku: String,
    #[serde(default)]
    pub attributes: Vec<RemoteVariationAttribute>,
}

/// A variation's attribute binding as the target reports it. `slug` is
/// usually present on generated variations; `name` always is.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteVariationAttribute {
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub slug: String,
    #[serde(default)]
    pub option: String,
}

impl RemoteVariationAttribute {
    pub fn slug_or_name(&self) -> &str {
        if self.slug.is_empty() {
            &self.name
        } else {
            &self.slug
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemoteCategory {
    pub id: i64,
    pub name: String,
    pub slug: String,
    #[serde(default)]
    pub parent: i64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RemoteAttribute {
    pub id: i64,
    pub name: String,
    pub slug: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RemoteTerm {
    pub id: i64,
    pub name: String,
    pub slug: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemoteMedia {
    pub id: i64,
    #[serde(default)]
    pub source_url: String,
}

impl RemoteMedia {
    /// Filename component of the media item's URL.
    pub fn filename(&self) -> String {
        self.source_url
            .rsplit('/')
            .next()
            .unwrap_or_default()
            .to_string()
    }
}
