#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{any, get, post, put};
use axum::{Json, Router};
use serde_json::{json, Value};

/// Scriptable stand-in for the target store's REST API. Every handler logs
/// `"METHOD path"` into `requests` so tests can assert on call patterns.
pub struct MockState {
    pub products: Mutex<Vec<Value>>,
    pub variations: Mutex<HashMap<i64, Vec<Value>>>,
    staged_variations: Mutex<HashMap<i64, (u32, Vec<Value>)>>,
    pending_empty_polls: Mutex<HashMap<i64, u32>>,
    pub categories: Mutex<Vec<Value>>,
    pub attributes: Mutex<Vec<Value>>,
    pub terms: Mutex<HashMap<i64, Vec<Value>>>,
    pub media: Mutex<Vec<Value>>,
    pub scripted_statuses: Mutex<VecDeque<u16>>,
    pub requests: Mutex<Vec<String>>,
    pub next_id: AtomicI64,
    pub upload_failures: AtomicU32,
    pub reject_product_images: AtomicBool,
}

impl MockState {
    fn new() -> Self {
        Self {
            products: Mutex::new(Vec::new()),
            variations: Mutex::new(HashMap::new()),
            staged_variations: Mutex::new(HashMap::new()),
            pending_empty_polls: Mutex::new(HashMap::new()),
            categories: Mutex::new(Vec::new()),
            attributes: Mutex::new(Vec::new()),
            terms: Mutex::new(HashMap::new()),
            media: Mutex::new(Vec::new()),
            scripted_statuses: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            next_id: AtomicI64::new(1000),
            upload_failures: AtomicU32::new(0),
            reject_product_images: AtomicBool::new(false),
        }
    }

    fn record(&self, method: &str, path: &str) {
        self.requests
            .lock()
            .unwrap()
            .push(format!("{} {}", method, path));
    }

    pub fn request_count(&self, needle: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.contains(needle))
            .count()
    }
}

pub struct MockTarget {
    pub base_url: String,
    pub state: Arc<MockState>,
}

impl MockTarget {
    pub async fn spawn() -> Self {
        let state = Arc::new(MockState::new());

        let app = Router::new()
            .route("/scripted", any(scripted))
            .route("/images/{name}", get(image_bytes))
            .route(
                "/wp-json/wc/v3/products",
                get(products_index).post(product_create),
            )
            .route("/wp-json/wc/v3/products/categories", get(categories_index))
            .route("/wp-json/wc/v3/products/attributes", get(attributes_index))
            .route(
                "/wp-json/wc/v3/products/attributes/{id}/terms",
                get(terms_index),
            )
            .route(
                "/wp-json/wc/v3/products/{id}",
                get(product_get).put(product_update),
            )
            .route(
                "/wp-json/wc/v3/products/{id}/variations",
                get(variations_index),
            )
            .route(
                "/wp-json/wc/v3/products/{id}/variations/generate",
                post(variations_generate),
            )
            .route(
                "/wp-json/wc/v3/products/{id}/variations/{vid}",
                put(variation_update),
            )
            .route("/wp-json/wp/v2/media", get(media_index).post(media_upload))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind mock listener");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });

        Self {
            base_url: format!("http://{}", addr),
            state,
        }
    }

    pub fn add_product(&self, product: Value) {
        self.state.products.lock().unwrap().push(product);
    }

    pub fn add_media(&self, id: i64, source_url: &str) {
        self.state
            .media
            .lock()
            .unwrap()
            .push(json!({ "id": id, "source_url": source_url }));
    }

    pub fn script_statuses(&self, statuses: &[u16]) {
        let mut scripted = self.state.scripted_statuses.lock().unwrap();
        scripted.extend(statuses.iter().copied());
    }

    /// Stage variations that `generate` will install; the listing endpoint
    /// then returns an empty page `empty_polls` times before exposing them.
    pub fn stage_generated_variations(
        &self,
        product_id: i64,
        variations: Vec<Value>,
        empty_polls: u32,
    ) {
        self.state
            .staged_variations
            .lock()
            .unwrap()
            .insert(product_id, (empty_polls, variations));
    }

    pub fn stored_product(&self, id: i64) -> Option<Value> {
        self.state
            .products
            .lock()
            .unwrap()
            .iter()
            .find(|p| p["id"].as_i64() == Some(id))
            .cloned()
    }
}

async fn scripted(State(state): State<Arc<MockState>>) -> impl IntoResponse {
    state.record("ANY", "/scripted");
    let status = state
        .scripted_statuses
        .lock()
        .unwrap()
        .pop_front()
        .unwrap_or(200);
    let code = StatusCode::from_u16(status).unwrap_or(StatusCode::OK);
    if code.is_success() {
        (code, Json(json!({ "ok": true })))
    } else {
        (code, Json(json!({ "message": "scripted failure" })))
    }
}

async fn image_bytes(
    State(state): State<Arc<MockState>>,
    Path(name): Path<String>,
) -> impl IntoResponse {
    state.record("GET", &format!("/images/{}", name));
    (
        [("content-type", "image/jpeg")],
        vec![0xFFu8, 0xD8, 0xFF, 0xE0, 1, 2, 3, 4],
    )
}

async fn products_index(
    State(state): State<Arc<MockState>>,
    Query(params): Query<HashMap<String, String>>,
) -> Json<Value> {
    state.record("GET", "/products");
    let products = state.products.lock().unwrap();

    if let Some(sku) = params.get("sku") {
        let mut hits: Vec<Value> = products
            .iter()
            .filter(|p| p["sku"].as_str() == Some(sku.as_str()))
            .cloned()
            .collect();
        for (parent_id, list) in state.variations.lock().unwrap().iter() {
            for v in list {
                if v["sku"].as_str() == Some(sku.as_str()) {
                    hits.push(json!({
                        "id": v["id"],
                        "sku": v["sku"],
                        "name": "",
                        "parent_id": parent_id,
                    }));
                }
            }
        }
        return Json(Value::Array(hits));
    }

    if let Some(search) = params.get("search") {
        let needle = search.to_lowercase();
        let hits: Vec<Value> = products
            .iter()
            .filter(|p| {
                p["name"]
                    .as_str()
                    .map(|n| n.to_lowercase().contains(&needle))
                    .unwrap_or(false)
            })
            .cloned()
            .collect();
        return Json(Value::Array(hits));
    }

    Json(Value::Array(products.clone()))
}

async fn product_get(
    State(state): State<Arc<MockState>>,
    Path(id): Path<i64>,
) -> impl IntoResponse {
    state.record("GET", &format!("/products/{}", id));
    let products = state.products.lock().unwrap();
    match products.iter().find(|p| p["id"].as_i64() == Some(id)) {
        Some(product) => (StatusCode::OK, Json(product.clone())),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({ "message": "Not found" })),
        ),
    }
}

async fn product_create(
    State(state): State<Arc<MockState>>,
    Json(payload): Json<Value>,
) -> impl IntoResponse {
    state.record("POST", "/products");
    if state.reject_product_images.load(Ordering::SeqCst) && payload.get("images").is_some() {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "message": "Invalid image attachment id" })),
        );
    }
    let id = state.next_id.fetch_add(1, Ordering::SeqCst);
    let mut stored = payload;
    if let Some(body) = stored.as_object_mut() {
        body.insert("id".to_string(), json!(id));
        body.entry("parent_id").or_insert(json!(0));
        body.entry("sku").or_insert(json!(""));
    }
    state.products.lock().unwrap().push(stored.clone());
    (StatusCode::CREATED, Json(stored))
}

async fn product_update(
    State(state): State<Arc<MockState>>,
    Path(id): Path<i64>,
    Json(payload): Json<Value>,
) -> impl IntoResponse {
    state.record("PUT", &format!("/products/{}", id));
    if state.reject_product_images.load(Ordering::SeqCst) && payload.get("images").is_some() {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "message": "Invalid image attachment id" })),
        );
    }
    let mut products = state.products.lock().unwrap();
    match products.iter_mut().find(|p| p["id"].as_i64() == Some(id)) {
        Some(existing) => {
            if let (Some(target), Some(changes)) = (existing.as_object_mut(), payload.as_object()) {
                for (k, v) in changes {
                    target.insert(k.clone(), v.clone());
                }
            }
            (StatusCode::OK, Json(existing.clone()))
        }
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({ "message": "Not found" })),
        ),
    }
}

async fn variations_index(
    State(state): State<Arc<MockState>>,
    Path(id): Path<i64>,
) -> Json<Value> {
    state.record("GET", &format!("/products/{}/variations", id));
    {
        let mut pending = state.pending_empty_polls.lock().unwrap();
        if let Some(remaining) = pending.get_mut(&id) {
            if *remaining > 0 {
                *remaining -= 1;
                return Json(json!([]));
            }
        }
    }
    let variations = state.variations.lock().unwrap();
    Json(Value::Array(variations.get(&id).cloned().unwrap_or_default()))
}

async fn variations_generate(
    State(state): State<Arc<MockState>>,
    Path(id): Path<i64>,
) -> Json<Value> {
    state.record("POST", &format!("/products/{}/variations/generate", id));
    let staged = state.staged_variations.lock().unwrap();
    if let Some((empty_polls, variations)) = staged.get(&id) {
        state
            .variations
            .lock()
            .unwrap()
            .insert(id, variations.clone());
        state
            .pending_empty_polls
            .lock()
            .unwrap()
            .insert(id, *empty_polls);
    }
    Json(json!({ "count": 0 }))
}

async fn variation_update(
    State(state): State<Arc<MockState>>,
    Path((id, vid)): Path<(i64, i64)>,
    Json(payload): Json<Value>,
) -> impl IntoResponse {
    state.record("PUT", &format!("/products/{}/variations/{}", id, vid));
    let mut variations = state.variations.lock().unwrap();
    let list = variations.entry(id).or_default();
    match list.iter_mut().find(|v| v["id"].as_i64() == Some(vid)) {
        Some(existing) => {
            if let (Some(target), Some(changes)) = (existing.as_object_mut(), payload.as_object()) {
                for (k, v) in changes {
                    target.insert(k.clone(), v.clone());
                }
            }
            (StatusCode::OK, Json(existing.clone()))
        }
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({ "message": "No such variation" })),
        ),
    }
}

async fn categories_index(
    State(state): State<Arc<MockState>>,
    Query(params): Query<HashMap<String, String>>,
) -> Json<Value> {
    state.record("GET", "/products/categories");
    let categories = state.categories.lock().unwrap();
    let hits: Vec<Value> = categories
        .iter()
        .filter(|c| {
            if let Some(slug) = params.get("slug") {
                return c["slug"].as_str() == Some(slug.as_str());
            }
            if let Some(search) = params.get("search") {
                let needle = search.to_lowercase();
                return c["name"]
                    .as_str()
                    .map(|n| n.to_lowercase().contains(&needle))
                    .unwrap_or(false);
            }
            true
        })
        .cloned()
        .collect();
    Json(Value::Array(hits))
}

async fn attributes_index(State(state): State<Arc<MockState>>) -> Json<Value> {
    state.record("GET", "/products/attributes");
    Json(Value::Array(state.attributes.lock().unwrap().clone()))
}

async fn terms_index(
    State(state): State<Arc<MockState>>,
    Path(id): Path<i64>,
) -> Json<Value> {
    state.record("GET", &format!("/products/attributes/{}/terms", id));
    let terms = state.terms.lock().unwrap();
    Json(Value::Array(terms.get(&id).cloned().unwrap_or_default()))
}

async fn media_index(
    State(state): State<Arc<MockState>>,
    Query(params): Query<HashMap<String, String>>,
) -> Json<Value> {
    state.record("GET", "/media");
    let media = state.media.lock().unwrap();
    // The search parameter is a comma-separated term list.
    let hits: Vec<Value> = match params.get("search") {
        Some(search) => media
            .iter()
            .filter(|m| {
                m["source_url"]
                    .as_str()
                    .map(|u| search.split(',').any(|term| u.contains(term)))
                    .unwrap_or(false)
            })
            .cloned()
            .collect(),
        None => media.clone(),
    };
    Json(Value::Array(hits))
}

async fn media_upload(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> impl IntoResponse {
    state.record("POST", "/media");
    if body.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "message": "Empty upload" })),
        );
    }
    if state.upload_failures.load(Ordering::SeqCst) > 0 {
        state.upload_failures.fetch_sub(1, Ordering::SeqCst);
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "message": "Upload failed" })),
        );
    }
    let filename = headers
        .get("content-disposition")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split("filename=\"").nth(1))
        .and_then(|v| v.split('"').next())
        .unwrap_or("upload.bin")
        .to_string();
    let id = state.next_id.fetch_add(1, Ordering::SeqCst);
    let media = json!({ "id": id, "source_url": format!("/uploads/{}", filename) });
    state.media.lock().unwrap().push(media.clone());
    (StatusCode::CREATED, Json(media))
}
